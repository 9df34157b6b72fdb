// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Machines-platform seam.
//!
//! The contract the lifecycle services program against. Implemented in
//! `crate::infrastructure::machines_client` over HTTP; test doubles
//! implement it in-process. No retries happen behind this trait: retry
//! policy is a caller concern.

use crate::domain::machine::{CreateMachineSpec, LogEntry, Machine, MachineConfig, VolumeInfo};
use async_trait::async_trait;
use thiserror::Error;

/// Typed failure from the remote machines API.
///
/// `status == 0` means the request never produced an HTTP response
/// (transport failure).
#[derive(Debug, Clone, Error)]
#[error("remote API error (status {status}): {message}")]
pub struct RemoteApiError {
    pub status: u16,
    pub message: String,
}

impl RemoteApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait MachinePlatform: Send + Sync {
    async fn create_app(&self, name: &str) -> Result<(), RemoteApiError>;

    async fn create_volume(
        &self,
        app: &str,
        name: &str,
        region: &str,
        size_gb: u32,
    ) -> Result<VolumeInfo, RemoteApiError>;

    async fn create_machine(
        &self,
        app: &str,
        spec: &CreateMachineSpec,
        region: &str,
    ) -> Result<Machine, RemoteApiError>;

    async fn get_machine(&self, app: &str, id: &str) -> Result<Machine, RemoteApiError>;

    /// Push a full machine config. The response body is not consumed;
    /// platforms may reply with an empty body on success.
    async fn update_machine(
        &self,
        app: &str,
        id: &str,
        config: &MachineConfig,
    ) -> Result<(), RemoteApiError>;

    async fn restart_machine(&self, app: &str, id: &str) -> Result<(), RemoteApiError>;

    /// Deletes the app and cascades to its machines and volumes.
    async fn delete_app(&self, app: &str) -> Result<(), RemoteApiError>;

    async fn machine_logs(&self, app: &str, id: &str) -> Result<Vec<LogEntry>, RemoteApiError>;
}
