// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Workload environment builder.
//!
//! Pure and deterministic: create, restart, repair, and deploy all build
//! the injected environment through this one function, so the four
//! operations can never diverge in the variables they inject. Any new
//! required variable is added here, nowhere else.

use crate::domain::guild::GuildId;
use crate::domain::machine::WORKLOAD_HTTP_PORT;
use std::collections::BTreeMap;

/// Inputs to [`build_environment`].
#[derive(Debug, Clone)]
pub struct EnvironmentParams {
    pub guild_id: GuildId,
    pub memory_context_size: u32,
    pub memory_retention_months: u32,
    pub bot_token: String,
    pub api_key: String,
    pub service_url: String,
    pub base_url: Option<String>,
}

/// Build the full environment for a guild workload.
///
/// Returns a `BTreeMap` so iteration order is stable; callers that push
/// the map to the platform replace the remote environment wholesale
/// (never merge), so stale keys cannot survive an update.
pub fn build_environment(params: &EnvironmentParams) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("GUILD_ID".to_string(), params.guild_id.as_str().to_string());
    env.insert("BOT_TOKEN".to_string(), params.bot_token.clone());
    env.insert("SERVICE_API_KEY".to_string(), params.api_key.clone());
    env.insert("SERVICE_URL".to_string(), params.service_url.clone());
    env.insert(
        "MEMORY_CONTEXT_SIZE".to_string(),
        params.memory_context_size.to_string(),
    );
    env.insert(
        "MEMORY_RETENTION_MONTHS".to_string(),
        params.memory_retention_months.to_string(),
    );
    env.insert("PORT".to_string(), WORKLOAD_HTTP_PORT.to_string());
    if let Some(base_url) = &params.base_url {
        env.insert("BASE_URL".to_string(), base_url.clone());
    }
    env
}
