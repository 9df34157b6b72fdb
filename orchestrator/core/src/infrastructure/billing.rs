// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Billing collaborator: immediate subscription cancellation.
//!
//! Teardown cancels immediately rather than at period end; the workload
//! is being destroyed, so the tenant must stop being charged even if
//! other cleanup steps fail.

use crate::infrastructure::secrets::SecretStore;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("billing API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("billing request failed: {0}")]
    Transport(String),

    #[error("billing credential unavailable: {0}")]
    Credentials(String),
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Cancel the subscription now, not at period end.
    async fn cancel_subscription_now(&self, subscription_id: &str) -> Result<(), BillingError>;
}

/// Stripe-backed provider. `DELETE /v1/subscriptions/{id}` cancels
/// immediately; the API key is resolved from the secret store per call
/// so rotation does not require a restart.
pub struct StripeBilling {
    client: reqwest::Client,
    base_url: String,
    secrets: Arc<dyn SecretStore>,
    api_key_secret: String,
}

impl StripeBilling {
    pub fn new(
        base_url: impl Into<String>,
        secrets: Arc<dyn SecretStore>,
        api_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secrets,
            api_key_secret: api_key_secret.into(),
        }
    }
}

#[async_trait]
impl BillingProvider for StripeBilling {
    async fn cancel_subscription_now(&self, subscription_id: &str) -> Result<(), BillingError> {
        let api_key = self
            .secrets
            .get_secret(&self.api_key_secret)
            .await
            .map_err(|e| BillingError::Credentials(e.to_string()))?;

        let url = format!("{}/v1/subscriptions/{}", self.base_url, subscription_id);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| BillingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BillingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        info!("subscription {} cancelled", subscription_id);
        Ok(())
    }
}
