//! Resend client for transactional email delivery

use crate::config::ResendConfig;
use crate::error::{OutreachError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use outreach_types::OutboundEmail;
use reqwest::Client as HttpClient;

/// Provider-side email dispatch, mockable for tests
#[async_trait]
pub trait EmailGateway: Send + Sync {
    /// Send one email; returns the provider-assigned message id
    async fn send(&self, message: &OutboundEmail) -> Result<String>;
}

pub struct ResendClient {
    config: ResendConfig,
    http_client: HttpClient,
}

impl ResendClient {
    pub fn new(config: ResendConfig) -> Self {
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http_client,
        }
    }

    /// Test connection to the Resend API
    pub async fn test_connection(&self) -> Result<bool> {
        let url = format!("{}/domains", self.config.base_url);
        debug!("Testing Resend connection to: {}", url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    info!("Resend authentication successful");
                    Ok(true)
                } else {
                    let error_text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    warn!("Resend API error ({}): {}", status, error_text);
                    Ok(false)
                }
            }
            Err(e) => {
                warn!("Failed to connect to Resend: {}", e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl EmailGateway for ResendClient {
    async fn send(&self, message: &OutboundEmail) -> Result<String> {
        let url = format!("{}/emails", self.config.base_url);

        let request_body = serde_json::json!({
            "from": self.config.from_address,
            "to": [format!("{} <{}>", message.to_name, message.to_email)],
            "subject": message.subject,
            "html": message.content.replace('\n', "<br>"),
            "text": message.content,
        });

        debug!("Sending email to {}", message.to_email);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OutreachError::Delivery(format!(
                "Resend returned {}: {}",
                status, error_text
            )));
        }

        let result: serde_json::Value = response.json().await?;
        let message_id = result["id"].as_str().unwrap_or("unknown").to_string();

        info!(
            "Email accepted by Resend for {} (message id {})",
            message.to_email, message_id
        );
        Ok(message_id)
    }
}
