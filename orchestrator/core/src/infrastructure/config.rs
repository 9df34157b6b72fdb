// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Orchestrator configuration.
//!
//! YAML file with discovery precedence (explicit path, then
//! `GUILDHOST_CONFIG_PATH`, working directory, system path) and
//! environment overrides for containerized deployments. Secret values
//! are never stored here; the config carries secret *names* resolved
//! through the secret store at call time.

use crate::application::readiness::PollPolicy;
use crate::application::workload::WorkloadSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Remote machines platform.
    pub platform: PlatformConfig,

    /// Workload shape for guild machines.
    pub workload: WorkloadConfig,

    /// HTTP API listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL connection URL. In-memory stores are used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default)]
    pub billing: BillingConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub readiness: ReadinessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the machines API.
    pub base_url: String,

    /// Secret name holding the platform API token.
    #[serde(default = "default_platform_token_secret")]
    pub api_token_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Container image deployed to new guild machines.
    pub image: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_volume_size_gb")]
    pub volume_size_gb: u32,

    /// URL the workload calls back into.
    pub service_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_bot_token_secret")]
    pub bot_token_secret: String,

    #[serde(default = "default_api_key_secret")]
    pub api_key_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_stripe_base_url")]
    pub base_url: String,

    #[serde(default = "default_stripe_key_secret")]
    pub api_key_secret: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            base_url: default_stripe_base_url(),
            api_key_secret: default_stripe_key_secret(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_identity_token_secret")]
    pub admin_token_secret: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            admin_token_secret: default_identity_token_secret(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

fn default_platform_token_secret() -> String {
    "PLATFORM_API_TOKEN".to_string()
}

fn default_region() -> String {
    "iad".to_string()
}

fn default_volume_size_gb() -> u32 {
    1
}

fn default_bot_token_secret() -> String {
    "SHARED_BOT_TOKEN".to_string()
}

fn default_api_key_secret() -> String {
    "SHARED_API_KEY".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_stripe_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_stripe_key_secret() -> String {
    "STRIPE_SECRET_KEY".to_string()
}

fn default_identity_token_secret() -> String {
    "IDENTITY_ADMIN_TOKEN".to_string()
}

fn default_poll_interval_seconds() -> u64 {
    5
}

fn default_max_poll_attempts() -> u32 {
    60
}

impl OrchestratorConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Discover a configuration file:
    /// 1. `GUILDHOST_CONFIG_PATH` environment variable
    /// 2. `./guildhost-config.yaml`
    /// 3. `/etc/guildhost/config.yaml`
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GUILDHOST_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./guildhost-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        let system = PathBuf::from("/etc/guildhost/config.yaml");
        if system.exists() {
            return Some(system);
        }

        None
    }

    /// Load from the explicit path when given, otherwise discover.
    pub fn load(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = match cli_path {
            Some(path) => path,
            None => Self::discover_config().ok_or_else(|| {
                anyhow::anyhow!("no configuration file found in standard locations")
            })?,
        };
        info!("loading configuration from {:?}", path);
        let mut config = Self::from_yaml_file(&path)
            .map_err(|e| anyhow::anyhow!("failed to load config at {:?}: {}", path, e))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Container deployments override file values via environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("GUILDHOST_DATABASE_URL") {
            info!("environment override: GUILDHOST_DATABASE_URL");
            self.database_url = Some(url);
        }
        if let Ok(url) = std::env::var("GUILDHOST_PLATFORM_BASE_URL") {
            info!("environment override: GUILDHOST_PLATFORM_BASE_URL");
            self.platform.base_url = url;
        }
        if let Ok(image) = std::env::var("GUILDHOST_WORKLOAD_IMAGE") {
            info!("environment override: GUILDHOST_WORKLOAD_IMAGE");
            self.workload.image = image;
        }
        if let Ok(port) = std::env::var("GUILDHOST_PORT") {
            match port.parse() {
                Ok(port) => {
                    info!("environment override: GUILDHOST_PORT={}", port);
                    self.server.port = port;
                }
                Err(_) => warn!("invalid value for GUILDHOST_PORT: '{}', ignoring", port),
            }
        }
    }

    pub fn workload_settings(&self) -> WorkloadSettings {
        WorkloadSettings {
            image: self.workload.image.clone(),
            region: self.workload.region.clone(),
            volume_size_gb: self.workload.volume_size_gb,
            service_url: self.workload.service_url.clone(),
            base_url: self.workload.base_url.clone(),
            bot_token_secret: self.workload.bot_token_secret.clone(),
            api_key_secret: self.workload.api_key_secret.clone(),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.readiness.poll_interval_seconds),
            max_attempts: self.readiness.max_poll_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_parses_with_defaults() {
        let yaml = r#"
platform:
  base_url: https://machines.example.com
workload:
  image: registry.example.com/guild-bot:v1
  service_url: https://svc.example.com
"#;
        let config = OrchestratorConfig::from_yaml_str(yaml).expect("parse");
        assert_eq!(config.platform.base_url, "https://machines.example.com");
        assert_eq!(config.platform.api_token_secret, "PLATFORM_API_TOKEN");
        assert_eq!(config.workload.region, "iad");
        assert_eq!(config.workload.volume_size_gb, 1);
        assert_eq!(config.server.port, 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.readiness.max_poll_attempts, 60);
    }

    #[test]
    fn full_yaml_round_trips() {
        let yaml = r#"
platform:
  base_url: https://machines.example.com
  api_token_secret: MACHINES_TOKEN
workload:
  image: registry.example.com/guild-bot:v2
  region: fra
  volume_size_gb: 3
  service_url: https://svc.example.com
  base_url: https://app.example.com
server:
  bind_address: 127.0.0.1
  port: 8081
database_url: postgres://guildhost@localhost/guildhost
readiness:
  poll_interval_seconds: 2
  max_poll_attempts: 30
"#;
        let config = OrchestratorConfig::from_yaml_str(yaml).expect("parse");
        assert_eq!(config.workload.region, "fra");
        assert_eq!(config.server.port, 8081);
        assert_eq!(
            config.poll_policy().interval,
            Duration::from_secs(2)
        );
        assert_eq!(config.poll_policy().max_attempts, 30);
        assert_eq!(
            config.workload_settings().base_url.as_deref(),
            Some("https://app.example.com")
        );
    }
}
