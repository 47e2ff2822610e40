//! Phone verification service
//!
//! Issues and checks one-time codes, then signs the phone's identity in.
//! Phone identities are ordinary email/password accounts whose password is
//! replaced with a fresh random secret on every successful verification.

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;

use super::model::OtpVerification;
use super::provider::{IdentityProvider, VerificationProvider};
use crate::error::{ApiError, ApiResult};
use crate::models::to_e164;
use crate::store::RateLimitStore;

/// Codes issued per phone within one window
pub const OTP_MAX_ATTEMPTS: i32 = 3;

/// Length of the issuance window
pub const OTP_WINDOW_MINUTES: i64 = 60;

const SECRET_LENGTH: usize = 32;

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

fn check_phone(phone: &str) -> ApiResult<()> {
    if !is_digits(phone, 10) {
        return Err(ApiError::InvalidInput(
            "Phone number must be exactly 10 digits".to_string(),
        ));
    }
    Ok(())
}

/// Random password used once for the sign-in that follows
fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

/// OTP service for phone sign-in
pub struct OtpService {
    rate_limits: Arc<dyn RateLimitStore>,
    verifier: Arc<dyn VerificationProvider>,
    identity: Arc<dyn IdentityProvider>,
    email_domain: String,
}

impl OtpService {
    pub fn new(
        rate_limits: Arc<dyn RateLimitStore>,
        verifier: Arc<dyn VerificationProvider>,
        identity: Arc<dyn IdentityProvider>,
        email_domain: String,
    ) -> Self {
        Self {
            rate_limits,
            verifier,
            identity,
            email_domain,
        }
    }

    /// Canonical identity email for a phone number
    pub fn identity_email(&self, phone: &str) -> String {
        format!("{}@{}", phone, self.email_domain)
    }

    /// Send a code to `phone`.
    ///
    /// The attempt is counted before the provider is called. A provider
    /// failure keeps the counted attempt.
    pub async fn request_code(&self, phone: &str, now: DateTime<Utc>) -> ApiResult<i32> {
        check_phone(phone)?;

        let attempts = self
            .rate_limits
            .reserve_attempt(
                phone,
                OTP_MAX_ATTEMPTS,
                Duration::minutes(OTP_WINDOW_MINUTES),
                now,
            )
            .await?
            .ok_or_else(|| {
                tracing::warn!(phone = %phone, "OTP rate limit reached");
                ApiError::RateLimited(
                    "Too many OTP requests. Please try again later".to_string(),
                )
            })?;

        self.verifier.send_code(&to_e164(phone)).await?;

        tracing::info!(phone = %phone, attempts, "OTP sent");
        Ok(attempts)
    }

    /// Check `code` and, when approved, sign the phone's identity in.
    /// A wrong code is a normal outcome, not an error.
    pub async fn verify_code(&self, phone: &str, code: &str) -> ApiResult<OtpVerification> {
        check_phone(phone)?;
        if !is_digits(code, 6) {
            return Err(ApiError::InvalidInput(
                "Code must be exactly 6 digits".to_string(),
            ));
        }

        if !self.verifier.check_code(&to_e164(phone), code).await? {
            tracing::info!(phone = %phone, "OTP not approved");
            return Ok(OtpVerification::NotVerified);
        }

        let email = self.identity_email(phone);
        let secret = generate_secret();

        let user = match self.identity.find_user_by_email(&email).await? {
            Some(user) => {
                self.identity.set_password(user.id, &secret).await?;
                tracing::debug!(user_id = %user.id, "Rotated identity secret");
                user
            }
            None => {
                let user = self
                    .identity
                    .create_user(&email, &secret, &to_e164(phone))
                    .await?;
                tracing::info!(user_id = %user.id, "Created phone identity");
                user
            }
        };

        let session = self.identity.sign_in(&email, &secret).await?;

        tracing::info!(user_id = %user.id, "Phone verified and signed in");
        Ok(OtpVerification::Verified { session, user })
    }
}
