// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for the remote machines platform.
//!
//! Thin authenticated wrapper: every non-2xx response and every
//! malformed body becomes a typed [`RemoteApiError`] carrying the HTTP
//! status. The API token is resolved from the secret store per request
//! so rotation does not require a restart.

use crate::domain::machine::{CreateMachineSpec, LogEntry, Machine, MachineConfig, VolumeInfo};
use crate::domain::platform::{MachinePlatform, RemoteApiError};
use crate::infrastructure::secrets::SecretStore;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpMachinePlatform {
    client: reqwest::Client,
    base_url: String,
    secrets: Arc<dyn SecretStore>,
    api_token_secret: String,
}

impl HttpMachinePlatform {
    pub fn new(
        base_url: impl Into<String>,
        secrets: Arc<dyn SecretStore>,
        api_token_secret: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secrets,
            api_token_secret: api_token_secret.into(),
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(StatusCode, String), RemoteApiError> {
        let token = self
            .secrets
            .get_secret(&self.api_token_secret)
            .await
            .map_err(|e| RemoteApiError::transport(format!("api token unavailable: {}", e)))?;

        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteApiError::transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteApiError::transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RemoteApiError {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }
        Ok((status, text))
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, RemoteApiError> {
        let (status, text) = self.execute(method, path, body).await?;
        serde_json::from_str(&text).map_err(|e| RemoteApiError {
            status: status.as_u16(),
            message: format!("malformed response body: {}", e),
        })
    }

    async fn request_unit(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), RemoteApiError> {
        self.execute(method, path, body).await.map(|_| ())
    }
}

/// Pull the human-readable message out of an error body, falling back
/// to the raw text when the body is not the expected JSON shape.
fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            return message.to_string();
        }
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }
    body.to_string()
}

#[async_trait]
impl MachinePlatform for HttpMachinePlatform {
    async fn create_app(&self, name: &str) -> Result<(), RemoteApiError> {
        self.request_unit(
            Method::POST,
            "/v1/apps",
            Some(json!({ "app_name": name })),
        )
        .await
    }

    async fn create_volume(
        &self,
        app: &str,
        name: &str,
        region: &str,
        size_gb: u32,
    ) -> Result<VolumeInfo, RemoteApiError> {
        self.request_json(
            Method::POST,
            &format!("/v1/apps/{}/volumes", app),
            Some(json!({ "name": name, "region": region, "size_gb": size_gb })),
        )
        .await
    }

    async fn create_machine(
        &self,
        app: &str,
        spec: &CreateMachineSpec,
        region: &str,
    ) -> Result<Machine, RemoteApiError> {
        let body = json!({
            "name": spec.name,
            "region": region,
            "config": spec.config,
        });
        self.request_json(
            Method::POST,
            &format!("/v1/apps/{}/machines", app),
            Some(body),
        )
        .await
    }

    async fn get_machine(&self, app: &str, id: &str) -> Result<Machine, RemoteApiError> {
        self.request_json(
            Method::GET,
            &format!("/v1/apps/{}/machines/{}", app, id),
            None,
        )
        .await
    }

    async fn update_machine(
        &self,
        app: &str,
        id: &str,
        config: &MachineConfig,
    ) -> Result<(), RemoteApiError> {
        // Update replies vary by platform version; an empty 2xx body is
        // a valid success, so the body is discarded.
        self.request_unit(
            Method::POST,
            &format!("/v1/apps/{}/machines/{}", app, id),
            Some(json!({ "config": config })),
        )
        .await
    }

    async fn restart_machine(&self, app: &str, id: &str) -> Result<(), RemoteApiError> {
        self.request_unit(
            Method::POST,
            &format!("/v1/apps/{}/machines/{}/restart", app, id),
            None,
        )
        .await
    }

    async fn delete_app(&self, app: &str) -> Result<(), RemoteApiError> {
        self.request_unit(Method::DELETE, &format!("/v1/apps/{}?force=true", app), None)
            .await
    }

    async fn machine_logs(&self, app: &str, id: &str) -> Result<Vec<LogEntry>, RemoteApiError> {
        self.request_json(
            Method::GET,
            &format!("/v1/apps/{}/machines/{}/logs", app, id),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::machine::MachineState;
    use crate::infrastructure::secrets::StaticSecretStore;

    fn client(base_url: &str) -> HttpMachinePlatform {
        let secrets = Arc::new(StaticSecretStore::new([(
            "PLATFORM_API_TOKEN".to_string(),
            "tok-123".to_string(),
        )]));
        HttpMachinePlatform::new(base_url, secrets, "PLATFORM_API_TOKEN")
    }

    #[tokio::test]
    async fn create_app_posts_name_with_bearer_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/apps")
            .match_header("authorization", "Bearer tok-123")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"app_name": "guild-123"}),
            ))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        client(&server.url())
            .create_app("guild-123")
            .await
            .expect("create app");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_machine_parses_state_and_config() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/apps/guild-123/machines/m-1")
            .with_status(200)
            .with_body(
                r#"{
                    "id": "m-1",
                    "state": "started",
                    "region": "iad",
                    "config": {"image": "img:v1", "env": {}, "auto_destroy": true}
                }"#,
            )
            .create_async()
            .await;

        let machine = client(&server.url())
            .get_machine("guild-123", "m-1")
            .await
            .expect("get machine");
        assert_eq!(machine.state, MachineState::Started);
        assert_eq!(machine.config.image, "img:v1");
        assert_eq!(
            machine.config.extra.get("auto_destroy"),
            Some(&serde_json::json!(true))
        );
    }

    #[tokio::test]
    async fn non_2xx_becomes_typed_error_with_extracted_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/apps/guild-123/volumes")
            .with_status(422)
            .with_body(r#"{"error": "volume quota exceeded"}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .create_volume("guild-123", "guild_data", "iad", 1)
            .await
            .unwrap_err();
        assert_eq!(err.status, 422);
        assert_eq!(err.message, "volume quota exceeded");
    }

    #[tokio::test]
    async fn malformed_body_becomes_typed_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/apps/guild-123/machines/m-1")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client(&server.url())
            .get_machine("guild-123", "m-1")
            .await
            .unwrap_err();
        assert_eq!(err.status, 200);
        assert!(err.message.contains("malformed response body"));
    }

    #[tokio::test]
    async fn update_machine_accepts_empty_success_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/apps/guild-123/machines/m-1")
            .with_status(204)
            .create_async()
            .await;

        let config = MachineConfig::for_workload("img:v1", Vec::new(), "vol-1");
        client(&server.url())
            .update_machine("guild-123", "m-1", &config)
            .await
            .expect("update machine");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_app_forces_cascade() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/v1/apps/guild-123")
            .match_query(mockito::Matcher::UrlEncoded(
                "force".into(),
                "true".into(),
            ))
            .with_status(202)
            .create_async()
            .await;

        client(&server.url())
            .delete_app("guild-123")
            .await
            .expect("delete app");
        mock.assert_async().await;
    }
}
