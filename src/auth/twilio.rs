//! Twilio Verify client for SMS one-time codes

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::provider::VerificationProvider;
use crate::config::TwilioConfig;
use crate::error::ProviderError;

const VERIFY_BASE_URL: &str = "https://verify.twilio.com/v2";

#[derive(Debug, Deserialize)]
struct VerificationCheck {
    status: String,
}

pub struct TwilioVerify {
    account_sid: String,
    auth_token: String,
    service_sid: String,
    base_url: String,
    client: Client,
}

impl TwilioVerify {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            service_sid: config.verify_service_sid.clone(),
            base_url: VERIFY_BASE_URL.to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn service_url(&self, resource: &str) -> String {
        format!("{}/Services/{}/{}", self.base_url, self.service_sid, resource)
    }
}

#[async_trait]
impl VerificationProvider for TwilioVerify {
    async fn send_code(&self, to: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(self.service_url("Verifications"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("Channel", "sms")])
            .send()
            .await?;
        ProviderError::check(response).await?;

        tracing::debug!(to = %to, "Verification code sent");
        Ok(())
    }

    async fn check_code(&self, to: &str, code: &str) -> Result<bool, ProviderError> {
        let response = self
            .client
            .post(self.service_url("VerificationCheck"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("Code", code)])
            .send()
            .await?;

        // No pending verification (expired or already approved)
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let check: VerificationCheck = ProviderError::check(response).await?.json().await?;
        Ok(check.status == "approved")
    }
}
