//! OTP request/response DTOs

use serde::{Deserialize, Serialize};

use super::provider::{IdentityUser, Session};

/// Request DTO for sending a one-time code
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    pub phone_number: String,
}

/// Request DTO for checking a one-time code
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub phone_number: String,
    pub code: String,
}

/// Response DTO for OTP operations
#[derive(Debug, Serialize, PartialEq)]
pub struct OtpResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<IdentityUser>,
}

/// Outcome of checking a one-time code
#[derive(Debug, Clone, PartialEq)]
pub enum OtpVerification {
    Verified {
        session: Session,
        user: IdentityUser,
    },
    /// Wrong or expired code; the caller may retry
    NotVerified,
}

impl From<OtpVerification> for OtpResponse {
    fn from(outcome: OtpVerification) -> Self {
        match outcome {
            OtpVerification::Verified { session, user } => OtpResponse {
                success: true,
                status: Some("approved".to_string()),
                message: None,
                session: Some(session),
                user: Some(user),
            },
            OtpVerification::NotVerified => OtpResponse {
                success: false,
                status: Some("pending".to_string()),
                message: Some("Invalid or expired code".to_string()),
                session: None,
                user: None,
            },
        }
    }
}
