// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Wire models for the remote machines platform.
//!
//! These types mirror the platform's JSON shapes. Fields this
//! orchestrator does not own are carried through untouched via the
//! flattened `extra` map, so a config read-modify-write cycle never
//! drops them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Internal port the workload's HTTP health endpoint listens on.
pub const WORKLOAD_HTTP_PORT: u16 = 8080;

/// Mount path of the guild's persistent volume inside the machine.
pub const DATA_MOUNT_PATH: &str = "/data";

/// Remote machine state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
    Destroyed,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Destroyed => "destroyed",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineMount {
    pub volume: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestResources {
    pub cpu_kind: String,
    pub cpus: u32,
    pub memory_mb: u32,
}

impl GuestResources {
    /// The one standard shape every guild machine is pinned to.
    pub fn standard() -> Self {
        Self {
            cpu_kind: "shared".to_string(),
            cpus: 1,
            memory_mb: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePort {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub interval: String,
    pub timeout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub protocol: String,
    pub internal_port: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<HealthCheck>,
}

impl ServiceSpec {
    /// The fixed HTTP health-check service every guild machine exposes.
    pub fn http_health_check() -> Self {
        Self {
            protocol: "tcp".to_string(),
            internal_port: WORKLOAD_HTTP_PORT,
            ports: vec![ServicePort {
                port: 443,
                handlers: vec!["tls".to_string(), "http".to_string()],
            }],
            checks: vec![HealthCheck {
                kind: "http".to_string(),
                path: "/health".to_string(),
                interval: "15s".to_string(),
                timeout: "5s".to_string(),
            }],
        }
    }
}

/// Machine configuration blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<MachineMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest: Option<GuestResources>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceSpec>,
    /// Platform fields not owned by this orchestrator, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MachineConfig {
    /// Full workload config as created at provisioning time.
    pub fn for_workload(
        image: impl Into<String>,
        env: impl IntoIterator<Item = (String, String)>,
        volume_id: &str,
    ) -> Self {
        Self {
            image: image.into(),
            env: env.into_iter().collect(),
            mounts: vec![MachineMount {
                volume: volume_id.to_string(),
                path: DATA_MOUNT_PATH.to_string(),
            }],
            guest: Some(GuestResources::standard()),
            services: vec![ServiceSpec::http_health_check()],
            extra: serde_json::Map::new(),
        }
    }
}

/// A machine as returned by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub state: MachineState,
    #[serde(default)]
    pub region: Option<String>,
    pub config: MachineConfig,
}

/// A created volume as returned by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub size_gb: Option<u32>,
}

/// Spec submitted when creating a machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMachineSpec {
    pub name: String,
    pub config: MachineConfig,
}

/// One workload log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
}
