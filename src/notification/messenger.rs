//! Outbound SMS/WhatsApp delivery

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::{MessageChannel, TwilioConfig};
use crate::error::ProviderError;

/// Sends a text message to one recipient
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), ProviderError>;
}

/// Twilio Messages API client
pub struct TwilioMessenger {
    account_sid: String,
    auth_token: String,
    sender_number: String,
    channel: MessageChannel,
    client: Client,
}

impl TwilioMessenger {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            sender_number: config.sender_number.clone(),
            channel: config.channel,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Channel-specific address, `whatsapp:+91...` for WhatsApp
    fn address(&self, number: &str) -> String {
        match self.channel {
            MessageChannel::Sms => number.to_string(),
            MessageChannel::WhatsApp => format!("whatsapp:{}", number),
        }
    }
}

#[async_trait]
impl MessagingProvider for TwilioMessenger {
    async fn send(&self, to: &str, body: &str) -> Result<(), ProviderError> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let to = self.address(to);
        let from = self.address(&self.sender_number);

        let response = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", body)])
            .send()
            .await?;
        ProviderError::check(response).await?;

        Ok(())
    }
}
