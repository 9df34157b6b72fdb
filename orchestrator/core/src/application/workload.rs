// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Shared workload settings and environment resolution.

use crate::domain::environment::{build_environment, EnvironmentParams};
use crate::domain::error::OrchestratorError;
use crate::domain::guild::Guild;
use crate::infrastructure::secrets::SecretStore;
use std::collections::BTreeMap;

/// Static settings every guild workload is provisioned with.
#[derive(Debug, Clone)]
pub struct WorkloadSettings {
    /// Container image (tag included) deployed by default.
    pub image: String,
    /// Platform region guild resources are placed in.
    pub region: String,
    pub volume_size_gb: u32,
    /// Orchestrator-side service URL injected into the workload.
    pub service_url: String,
    pub base_url: Option<String>,
    /// Secret names, resolved through the [`SecretStore`] at use time.
    pub bot_token_secret: String,
    pub api_key_secret: String,
}

/// Resolve shared credentials and build the workload environment.
///
/// Used identically by create, restart, repair, and deploy so the four
/// operations inject the same variables (`domain::environment` is the
/// single source of the variable set).
pub async fn resolve_environment(
    secrets: &dyn SecretStore,
    settings: &WorkloadSettings,
    guild: &Guild,
) -> Result<BTreeMap<String, String>, OrchestratorError> {
    let bot_token = secrets
        .get_secret(&settings.bot_token_secret)
        .await
        .map_err(|e| OrchestratorError::Internal(format!("resolving bot token: {}", e)))?;
    let api_key = secrets
        .get_secret(&settings.api_key_secret)
        .await
        .map_err(|e| OrchestratorError::Internal(format!("resolving API key: {}", e)))?;

    Ok(build_environment(&EnvironmentParams {
        guild_id: guild.id.clone(),
        memory_context_size: guild.memory_context_size,
        memory_retention_months: guild.memory_retention_months,
        bot_token,
        api_key,
        service_url: settings.service_url.clone(),
        base_url: settings.base_url.clone(),
    }))
}
