//! Shared data models: customer profiles and rentable resource kinds

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Customer profile, one per identity
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub emergency_contact: Option<String>,
    pub id_document_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Profile fields carried on a booking request.
///
/// Only used when the identity has no profile yet; an existing profile is never
/// overwritten.
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
pub struct NewProfile {
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 10, max = 15))]
    pub phone_number: String,
    #[validate(email)]
    pub email: Option<String>,
    pub emergency_contact: Option<String>,
    pub id_document_url: Option<String>,
}

impl NewProfile {
    pub fn into_profile(self, id: Uuid, created_at: DateTime<Utc>) -> Profile {
        Profile {
            id,
            full_name: self.full_name,
            phone_number: self.phone_number,
            email: self.email,
            emergency_contact: self.emergency_contact,
            id_document_url: self.id_document_url,
            created_at,
        }
    }
}

/// Kind of rentable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cycle,
    Accessory,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cycle => "cycle",
            ResourceKind::Accessory => "accessory",
        }
    }
}

/// A request to hold `quantity` units of a resource for a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceClaim {
    pub kind: ResourceKind,
    pub resource_id: Uuid,
    pub quantity: i32,
}

impl ResourceClaim {
    pub fn cycle(resource_id: Uuid) -> Self {
        Self {
            kind: ResourceKind::Cycle,
            resource_id,
            quantity: 1,
        }
    }

    pub fn accessory(resource_id: Uuid, quantity: i32) -> Self {
        Self {
            kind: ResourceKind::Accessory,
            resource_id,
            quantity,
        }
    }

    /// Stable key used to serialize concurrent claims on the same resource
    pub fn lock_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.resource_id)
    }
}

/// OTP issuance counter for one phone number
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct RateLimitRecord {
    pub phone_number: String,
    pub attempts: i32,
    /// Start of the current one-hour window
    pub first_attempt: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
}

impl RateLimitRecord {
    pub fn window_expired(&self, window_start: DateTime<Utc>) -> bool {
        self.first_attempt <= window_start
    }
}

/// Format a phone number for providers: 10-digit local numbers get `+91`
pub fn to_e164(phone_number: &str) -> String {
    let trimmed = phone_number.trim();
    if trimmed.starts_with('+') {
        return trimmed.to_string();
    }
    if trimmed.len() == 10 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return format!("+91{}", trimmed);
    }
    format!("+{}", trimmed)
}
