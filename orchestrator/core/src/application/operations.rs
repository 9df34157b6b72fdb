// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Operational commands: restart, repair, deploy-update, status, logs.
//!
//! Restart, repair, and deploy share one "apply desired machine config"
//! primitive parameterized by `{new image tag?, force restart?}` so the
//! three commands can never diverge in the config they converge the
//! machine to. The remote config is the source of truth for fields this
//! orchestrator does not own; everything it does own (env, mounts,
//! guest shape, services, image) is rebuilt here on every application.

use crate::application::ownership::verify_ownership;
use crate::application::workload::{resolve_environment, WorkloadSettings};
use crate::domain::clock::Clock;
use crate::domain::error::OrchestratorError;
use crate::domain::guild::{Guild, GuildId, GuildStatus, RemoteHandles, UserId};
use crate::domain::machine::{
    GuestResources, LogEntry, MachineConfig, MachineMount, MachineState, ServiceSpec,
    DATA_MOUNT_PATH,
};
use crate::domain::platform::MachinePlatform;
use crate::domain::repository::GuildRepository;
use crate::infrastructure::secrets::SecretStore;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Per-command parameters of the shared apply primitive.
#[derive(Debug, Clone, Default)]
pub struct MachineOverrides {
    /// New image tag for deploy-update; `None` keeps the current tag.
    pub image: Option<String>,
    /// Restart/repair issue an explicit restart after the config push
    /// (an update alone does not restart a running machine).
    pub restart_after_update: bool,
}

/// Point-in-time view for `getGuildStatus`.
#[derive(Debug, Clone, Serialize)]
pub struct GuildStatusReport {
    pub guild_id: GuildId,
    pub status: GuildStatus,
    pub error_message: Option<String>,
    /// Live machine state, best effort; `None` when the platform call
    /// fails or the guild has no machine.
    pub machine_state: Option<MachineState>,
    pub last_deployed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait OperationsService: Send + Sync {
    async fn restart(&self, user_id: &UserId, guild_id: &GuildId) -> Result<(), OrchestratorError>;

    async fn repair(&self, user_id: &UserId, guild_id: &GuildId) -> Result<(), OrchestratorError>;

    async fn deploy_update(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
        version: &str,
    ) -> Result<(), OrchestratorError>;

    /// Deploy without the ownership guard, for operator tooling.
    async fn admin_deploy(&self, guild_id: &GuildId, version: &str)
        -> Result<(), OrchestratorError>;

    async fn status(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
    ) -> Result<GuildStatusReport, OrchestratorError>;

    async fn logs(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
    ) -> Result<Vec<LogEntry>, OrchestratorError>;
}

/// Compute the config to converge a guild machine to.
///
/// The environment is fully replaced (never merged, so stale keys cannot
/// survive), the mount is synthesized when the machine lost it but a
/// volume is on record, the guest shape and the HTTP service descriptor
/// are pinned, and unowned fields pass through untouched.
pub fn desired_machine_config(
    mut current: MachineConfig,
    env: BTreeMap<String, String>,
    volume_id: &str,
    image_override: Option<&str>,
) -> MachineConfig {
    current.env = env.into_iter().collect();
    if current.mounts.is_empty() {
        // Known drift bug: machines can lose their mount. Self-heal.
        current.mounts = vec![MachineMount {
            volume: volume_id.to_string(),
            path: DATA_MOUNT_PATH.to_string(),
        }];
    }
    if let Some(tag) = image_override {
        current.image = tag.to_string();
    }
    current.guest = Some(GuestResources::standard());
    current.services = vec![ServiceSpec::http_health_check()];
    current
}

pub struct StandardOperationsService {
    guilds: Arc<dyn GuildRepository>,
    platform: Arc<dyn MachinePlatform>,
    secrets: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    settings: WorkloadSettings,
}

impl StandardOperationsService {
    pub fn new(
        guilds: Arc<dyn GuildRepository>,
        platform: Arc<dyn MachinePlatform>,
        secrets: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
        settings: WorkloadSettings,
    ) -> Self {
        Self {
            guilds,
            platform,
            secrets,
            clock,
            settings,
        }
    }

    /// The shared primitive behind restart, repair, and deploy.
    async fn apply_desired_config(
        &self,
        guild: Guild,
        overrides: MachineOverrides,
    ) -> Result<(), OrchestratorError> {
        let guild_id = guild.id.clone();
        let handles = guild.remote_handles().ok_or_else(|| {
            OrchestratorError::FailedPrecondition(format!(
                "guild {} has no provisioned machine",
                guild_id
            ))
        })?;

        // One command in flight per guild: status writes stay ordered.
        if guild.command_in_flight() {
            return Err(OrchestratorError::FailedPrecondition(format!(
                "guild {} already has a command in flight ({})",
                guild_id, guild.status
            )));
        }

        self.guilds
            .update_status(&guild_id, GuildStatus::Provisioning, None)
            .await?;

        // The activation writes ride the same failure edge as the config
        // push itself: a failed status write must not leave the guild at
        // provisioning either.
        let applied = match self.apply_inner(&guild, &handles, &overrides).await {
            Ok(()) => self.finalize_success(&guild_id, &overrides).await,
            Err(e) => Err(e),
        };

        match applied {
            Ok(()) => {
                info!("guild {} machine config applied", guild_id);
                Ok(())
            }
            Err(e) => {
                // Never leave the guild stuck at provisioning.
                warn!("applying config to guild {} failed: {}", guild_id, e);
                if let Err(write_err) = self
                    .guilds
                    .update_status(&guild_id, GuildStatus::Error, Some(e.to_string()))
                    .await
                {
                    error!(
                        "failed to mark guild {} as errored: {}",
                        guild_id, write_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Post-apply bookkeeping: flip to `active`, stamp the deploy time.
    async fn finalize_success(
        &self,
        guild_id: &GuildId,
        overrides: &MachineOverrides,
    ) -> Result<(), OrchestratorError> {
        self.guilds
            .update_status(guild_id, GuildStatus::Active, None)
            .await?;
        if overrides.image.is_some() {
            if let Some(mut refreshed) = self.guilds.find_by_id(guild_id).await? {
                refreshed.last_deployed_at = Some(self.clock.now());
                refreshed.updated_at = self.clock.now();
                self.guilds.save(&refreshed).await?;
            }
        }
        Ok(())
    }

    async fn apply_inner(
        &self,
        guild: &Guild,
        handles: &RemoteHandles,
        overrides: &MachineOverrides,
    ) -> Result<(), OrchestratorError> {
        let current = self
            .platform
            .get_machine(&handles.app_name, &handles.machine_id)
            .await?;

        let env = resolve_environment(self.secrets.as_ref(), &self.settings, guild).await?;
        let desired = desired_machine_config(
            current.config,
            env,
            &handles.volume_id,
            overrides.image.as_deref(),
        );

        self.platform
            .update_machine(&handles.app_name, &handles.machine_id, &desired)
            .await?;

        if overrides.restart_after_update {
            self.platform
                .restart_machine(&handles.app_name, &handles.machine_id)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl OperationsService for StandardOperationsService {
    async fn restart(&self, user_id: &UserId, guild_id: &GuildId) -> Result<(), OrchestratorError> {
        let guild = verify_ownership(self.guilds.as_ref(), user_id, guild_id).await?;
        self.apply_desired_config(
            guild,
            MachineOverrides {
                image: None,
                restart_after_update: true,
            },
        )
        .await
    }

    async fn repair(&self, user_id: &UserId, guild_id: &GuildId) -> Result<(), OrchestratorError> {
        // Repair is a restart that re-converges config drift; the shared
        // primitive already rebuilds env, mount, guest, and services.
        self.restart(user_id, guild_id).await
    }

    async fn deploy_update(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
        version: &str,
    ) -> Result<(), OrchestratorError> {
        let guild = verify_ownership(self.guilds.as_ref(), user_id, guild_id).await?;
        self.apply_desired_config(
            guild,
            MachineOverrides {
                image: Some(version.to_string()),
                restart_after_update: false,
            },
        )
        .await
    }

    async fn admin_deploy(
        &self,
        guild_id: &GuildId,
        version: &str,
    ) -> Result<(), OrchestratorError> {
        let guild = self
            .guilds
            .find_by_id(guild_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("guild {} not found", guild_id)))?;
        self.apply_desired_config(
            guild,
            MachineOverrides {
                image: Some(version.to_string()),
                restart_after_update: false,
            },
        )
        .await
    }

    async fn status(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
    ) -> Result<GuildStatusReport, OrchestratorError> {
        let guild = verify_ownership(self.guilds.as_ref(), user_id, guild_id).await?;

        let machine_state = match guild.remote_handles() {
            Some(handles) => match self
                .platform
                .get_machine(&handles.app_name, &handles.machine_id)
                .await
            {
                Ok(machine) => Some(machine.state),
                Err(e) => {
                    warn!("fetching live state for guild {} failed: {}", guild_id, e);
                    None
                }
            },
            None => None,
        };

        Ok(GuildStatusReport {
            guild_id: guild.id,
            status: guild.status,
            error_message: guild.error_message,
            machine_state,
            last_deployed_at: guild.last_deployed_at,
        })
    }

    async fn logs(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
    ) -> Result<Vec<LogEntry>, OrchestratorError> {
        let guild = verify_ownership(self.guilds.as_ref(), user_id, guild_id).await?;
        let handles = guild.remote_handles().ok_or_else(|| {
            OrchestratorError::FailedPrecondition(format!(
                "guild {} has no provisioned machine",
                guild_id
            ))
        })?;

        Ok(self
            .platform
            .machine_logs(&handles.app_name, &handles.machine_id)
            .await?)
    }
}
