//! External identity collaborators: the SMS challenge provider and the hosted
//! identity service

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProviderError;

/// Sends and checks one-time codes. The code itself never passes through us
/// on the way out.
#[async_trait]
pub trait VerificationProvider: Send + Sync {
    /// Dispatch an SMS challenge to an E.164 number
    async fn send_code(&self, to: &str) -> Result<(), ProviderError>;

    /// Whether `code` is the approved answer to the latest challenge for `to`
    async fn check_code(&self, to: &str, code: &str) -> Result<bool, ProviderError>;
}

/// Account in the identity service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Session minted by a password sign-in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub user: IdentityUser,
}

/// Admin and sign-in operations of the identity service
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<IdentityUser>, ProviderError>;

    /// Create a confirmed account with `phone` in its metadata
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        phone: &str,
    ) -> Result<IdentityUser, ProviderError>;

    async fn set_password(&self, user_id: Uuid, password: &str) -> Result<(), ProviderError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ProviderError>;
}
