// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Identity collaborator: account deletion against the external auth
//! provider's admin API.

use crate::domain::guild::UserId;
use crate::infrastructure::secrets::SecretStore;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("identity API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("identity request failed: {0}")]
    Transport(String),

    #[error("identity credential unavailable: {0}")]
    Credentials(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn delete_user(&self, user_id: &UserId) -> Result<(), IdentityError>;
}

/// HTTP admin-API client. Deleting an already-deleted user returns 404
/// upstream, which is treated as success: the desired end state holds.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    secrets: Arc<dyn SecretStore>,
    admin_token_secret: String,
}

impl HttpIdentityProvider {
    pub fn new(
        base_url: impl Into<String>,
        secrets: Arc<dyn SecretStore>,
        admin_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secrets,
            admin_token_secret: admin_token_secret.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn delete_user(&self, user_id: &UserId) -> Result<(), IdentityError> {
        let token = self
            .secrets
            .get_secret(&self.admin_token_secret)
            .await
            .map_err(|e| IdentityError::Credentials(e.to_string()))?;

        let url = format!("{}/admin/users/{}", self.base_url, user_id);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            info!("identity record for user {} already absent", user_id);
            return Ok(());
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        info!("identity record for user {} deleted", user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::secrets::StaticSecretStore;

    fn provider(base_url: &str) -> HttpIdentityProvider {
        let secrets = Arc::new(StaticSecretStore::new([(
            "IDENTITY_ADMIN_TOKEN".to_string(),
            "admin-token".to_string(),
        )]));
        HttpIdentityProvider::new(base_url, secrets, "IDENTITY_ADMIN_TOKEN")
    }

    #[tokio::test]
    async fn deletes_user() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/admin/users/user-1")
            .match_header("authorization", "Bearer admin-token")
            .with_status(204)
            .create_async()
            .await;

        provider(&server.url())
            .delete_user(&UserId::new("user-1"))
            .await
            .expect("delete");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_user_is_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/admin/users/user-gone")
            .with_status(404)
            .create_async()
            .await;

        provider(&server.url())
            .delete_user(&UserId::new("user-gone"))
            .await
            .expect("idempotent delete");
    }

    #[tokio::test]
    async fn server_error_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/admin/users/user-1")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let err = provider(&server.url())
            .delete_user(&UserId::new("user-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Api { status: 500, .. }));
    }
}
