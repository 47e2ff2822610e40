//! Authentication module
//!
//! - Session token verification for the API extractors
//! - Phone OTP issuance with per-number rate limiting
//! - Phone identities provisioned in the hosted identity service

mod gotrue;
mod jwt;
mod model;
mod provider;
mod service;
mod twilio;

pub use gotrue::GoTrueClient;
pub use jwt::{issue_session_token, session_claims, JwtError, SessionClaims, SessionVerifier};
pub use model::{OtpResponse, OtpVerification, SendOtpRequest, VerifyOtpRequest};
pub use provider::{IdentityProvider, IdentityUser, Session, VerificationProvider};
pub use service::{OtpService, OTP_MAX_ATTEMPTS, OTP_WINDOW_MINUTES};
pub use twilio::TwilioVerify;
