//! Hosted identity service client (GoTrue admin and token endpoints)

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use super::provider::{IdentityProvider, IdentityUser, Session};
use crate::config::IdentityConfig;
use crate::error::ProviderError;

/// Users fetched per admin listing page
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct UserPage {
    users: Vec<IdentityUser>,
}

pub struct GoTrueClient {
    auth_url: String,
    service_key: String,
    client: Client,
}

impl GoTrueClient {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            auth_url: format!("{}/auth/v1", config.base_url.trim_end_matches('/')),
            service_key: config.service_key.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Attach service-role credentials
    fn admin(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<IdentityUser>, ProviderError> {
        let mut page = 1;
        loop {
            let url = format!("{}/admin/users?page={}&per_page={}", self.auth_url, page, PAGE_SIZE);
            let response = self.admin(self.client.get(url)).send().await?;
            let batch: UserPage = ProviderError::check(response).await?.json().await?;

            let fetched = batch.users.len();
            if let Some(user) = batch
                .users
                .into_iter()
                .find(|user| user.email.as_deref().map_or(false, |e| e.eq_ignore_ascii_case(email)))
            {
                return Ok(Some(user));
            }
            if fetched < PAGE_SIZE {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        phone: &str,
    ) -> Result<IdentityUser, ProviderError> {
        let body = json!({
            "email": email,
            "password": password,
            "email_confirm": true,
            "user_metadata": { "phone": phone },
        });
        let response = self
            .admin(self.client.post(format!("{}/admin/users", self.auth_url)))
            .json(&body)
            .send()
            .await?;

        Ok(ProviderError::check(response).await?.json().await?)
    }

    async fn set_password(&self, user_id: Uuid, password: &str) -> Result<(), ProviderError> {
        let response = self
            .admin(
                self.client
                    .put(format!("{}/admin/users/{}", self.auth_url, user_id)),
            )
            .json(&json!({ "password": password }))
            .send()
            .await?;
        ProviderError::check(response).await?;
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        let response = self
            .client
            .post(format!("{}/token?grant_type=password", self.auth_url))
            .header("apikey", &self.service_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        Ok(ProviderError::check(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_url() {
        let client = GoTrueClient::new(&IdentityConfig {
            base_url: "https://project.example.co/".to_string(),
            service_key: "service".to_string(),
            jwt_secret: "secret".to_string(),
            email_domain: "cyclerent.app".to_string(),
        });
        assert_eq!(client.auth_url, "https://project.example.co/auth/v1");
    }

    #[test]
    fn test_user_page_shape() {
        let page: UserPage = serde_json::from_str(
            r#"{"users": [{"id": "8f0c3f8e-6f1a-4c1b-9b7a-1f2e3d4c5b6a", "email": "9876543210@cyclerent.app", "phone": ""}]}"#,
        )
        .unwrap();
        assert_eq!(page.users.len(), 1);
        assert_eq!(page.users[0].email.as_deref(), Some("9876543210@cyclerent.app"));
    }
}
