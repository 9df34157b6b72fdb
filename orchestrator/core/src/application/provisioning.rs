// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Guild Provisioning Application Service
//!
//! Owns the guild status field and the create path of the lifecycle:
//! `pending → provisioning → active`, with `error` on any failure edge.
//! Sequences app → volume → machine creation against the platform,
//! persists the remote handles together with the deployment ledger, and
//! hands the new machine to the detached readiness poller. The caller
//! gets the handles back immediately; `active` is reached asynchronously.

use crate::application::admission::AdmissionController;
use crate::application::readiness::{PollPolicy, ReadinessPoller};
use crate::application::workload::{resolve_environment, WorkloadSettings};
use crate::domain::clock::Clock;
use crate::domain::deployment::DeploymentRecord;
use crate::domain::error::OrchestratorError;
use crate::domain::guild::{
    derive_app_name, Guild, GuildId, GuildStatus, QueryQuota, RemoteHandles, TierLimits,
    DEFAULT_FREE_TIER_QUERIES,
};
use crate::domain::machine::{CreateMachineSpec, Machine, MachineConfig, VolumeInfo};
use crate::domain::platform::MachinePlatform;
use crate::domain::repository::{DeploymentRepository, GuildRepository, SubscriptionStore};
use crate::infrastructure::secrets::SecretStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Volume name shared by every guild app (the app namespaces it).
const GUILD_VOLUME_NAME: &str = "guild_data";

/// Remote handles returned to the caller as soon as creation finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedGuild {
    pub app_name: String,
    pub machine_id: String,
    pub volume_id: String,
    pub region: String,
}

#[async_trait]
pub trait ProvisioningService: Send + Sync {
    /// Provision a guild. Paid tiers are gated on an active subscription;
    /// free-tier guilds are routed through slot admission.
    async fn provision(&self, guild_id: &GuildId) -> Result<ProvisionedGuild, OrchestratorError>;

    /// Provision a free-tier guild behind the slot counter.
    async fn provision_free_tier(
        &self,
        guild_id: &GuildId,
    ) -> Result<ProvisionedGuild, OrchestratorError>;
}

pub struct StandardProvisioningService {
    guilds: Arc<dyn GuildRepository>,
    deployments: Arc<dyn DeploymentRepository>,
    subscriptions: Arc<dyn SubscriptionStore>,
    admission: Arc<AdmissionController>,
    platform: Arc<dyn MachinePlatform>,
    secrets: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    settings: WorkloadSettings,
    poll_policy: PollPolicy,
}

impl StandardProvisioningService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        guilds: Arc<dyn GuildRepository>,
        deployments: Arc<dyn DeploymentRepository>,
        subscriptions: Arc<dyn SubscriptionStore>,
        admission: Arc<AdmissionController>,
        platform: Arc<dyn MachinePlatform>,
        secrets: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
        settings: WorkloadSettings,
        poll_policy: PollPolicy,
    ) -> Self {
        Self {
            guilds,
            deployments,
            subscriptions,
            admission,
            platform,
            secrets,
            clock,
            settings,
            poll_policy,
        }
    }

    /// Load the guild and run the side-effect-free admission guards.
    async fn load_guarded(&self, guild_id: &GuildId) -> Result<Guild, OrchestratorError> {
        let guild = self
            .guilds
            .find_by_id(guild_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("guild {} not found", guild_id)))?;

        match guild.status {
            GuildStatus::Active => Err(OrchestratorError::FailedPrecondition(format!(
                "guild {} is already active",
                guild_id
            ))),
            GuildStatus::Deprovisioning | GuildStatus::Deleted => {
                Err(OrchestratorError::FailedPrecondition(format!(
                    "guild {} is being deleted",
                    guild_id
                )))
            }
            // Pending, Error, Suspended re-provision. Provisioning is
            // handled by the duplicate-trigger absorption in the
            // service entry points, never by a second pipeline.
            _ => Ok(guild),
        }
    }

    async fn require_active_subscription(&self, guild: &Guild) -> Result<(), OrchestratorError> {
        let subscription_id = guild.subscription_id.as_deref().ok_or_else(|| {
            OrchestratorError::FailedPrecondition(format!(
                "{}-tier guild {} has no subscription",
                guild.tier, guild.id
            ))
        })?;

        let subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::FailedPrecondition(format!(
                    "subscription {} not found",
                    subscription_id
                ))
            })?;

        if !subscription.is_active() {
            return Err(OrchestratorError::FailedPrecondition(format!(
                "subscription {} is not active",
                subscription_id
            )));
        }
        Ok(())
    }

    async fn query_quota(&self, guild: &Guild) -> Result<u32, OrchestratorError> {
        match TierLimits::for_tier(guild.tier).query_quota {
            QueryQuota::Fixed(n) => Ok(n),
            QueryQuota::FromCapacityConfig => Ok(self
                .admission
                .queries_per_slot()
                .await?
                .unwrap_or(DEFAULT_FREE_TIER_QUERIES)),
        }
    }

    /// Create remote resources, persist handles + ledger, start the
    /// poller. On failure the guild is marked `error` and the original
    /// error propagates; slot compensation is the free-tier caller's job.
    async fn run_provisioning(
        &self,
        mut guild: Guild,
        query_quota: u32,
    ) -> Result<ProvisionedGuild, OrchestratorError> {
        let guild_id = guild.id.clone();

        // First write, idempotent for duplicate upstream triggers.
        self.guilds
            .update_status(&guild_id, GuildStatus::Provisioning, None)
            .await?;

        let app_name = derive_app_name(&guild_id);
        info!("provisioning guild {} as app {}", guild_id, app_name);

        let (volume, machine) = match self.create_remote_resources(&guild, &app_name).await {
            Ok(created) => created,
            Err(e) => {
                self.mark_error(&guild_id, &e).await;
                return Err(e);
            }
        };

        let region = machine
            .region
            .clone()
            .unwrap_or_else(|| self.settings.region.clone());
        let now = self.clock.now();
        guild.status = GuildStatus::Provisioning;
        guild.error_message = None;
        guild.set_remote_handles(
            RemoteHandles {
                app_name: app_name.clone(),
                machine_id: machine.id.clone(),
                volume_id: volume.id.clone(),
            },
            region.clone(),
            now,
        );
        // The remote resources already exist here, so a persistence
        // failure must still leave the guild legible: orphaned resources
        // are observable, a guild stuck `provisioning` is not.
        if let Err(e) = self.persist_provisioned(&guild, query_quota, now).await {
            self.mark_error(&guild_id, &e).await;
            return Err(e);
        }

        // Detached: the caller never waits on machine readiness.
        ReadinessPoller::new(self.platform.clone(), self.guilds.clone(), self.poll_policy)
            .spawn(guild_id.clone(), app_name.clone(), machine.id.clone());

        info!(
            "guild {} provisioned (machine {}, volume {}, region {})",
            guild_id, machine.id, volume.id, region
        );

        Ok(ProvisionedGuild {
            app_name,
            machine_id: machine.id,
            volume_id: volume.id,
            region,
        })
    }

    async fn create_remote_resources(
        &self,
        guild: &Guild,
        app_name: &str,
    ) -> Result<(VolumeInfo, Machine), OrchestratorError> {
        match self.platform.create_app(app_name).await {
            Ok(()) => {}
            // A previous attempt already created the app; the name is
            // deterministic, so reuse it.
            Err(e) if e.status == 409 => {
                debug!("app {} already exists, reusing", app_name);
            }
            Err(e) => return Err(e.into()),
        }

        let env = resolve_environment(self.secrets.as_ref(), &self.settings, guild).await?;

        let volume = self
            .platform
            .create_volume(
                app_name,
                GUILD_VOLUME_NAME,
                &self.settings.region,
                self.settings.volume_size_gb,
            )
            .await?;

        let spec = CreateMachineSpec {
            name: app_name.to_string(),
            config: MachineConfig::for_workload(self.settings.image.clone(), env, &volume.id),
        };
        let machine = self
            .platform
            .create_machine(app_name, &spec, &self.settings.region)
            .await?;

        Ok((volume, machine))
    }

    /// Persist the handle write and the deployment ledger as one step.
    async fn persist_provisioned(
        &self,
        guild: &Guild,
        query_quota: u32,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        self.guilds.save(guild).await?;
        self.deployments
            .save(&DeploymentRecord::new(guild.id.clone(), query_quota, now))
            .await?;
        Ok(())
    }

    /// A duplicate trigger arriving while a provisioning run is in
    /// flight never starts a second pipeline: hand back the handles once
    /// they are persisted, reject until then.
    fn absorb_duplicate_trigger(
        &self,
        guild: &Guild,
    ) -> Result<ProvisionedGuild, OrchestratorError> {
        match guild.remote_handles() {
            Some(handles) => {
                info!(
                    "guild {} already provisioning, returning existing handles",
                    guild.id
                );
                Ok(ProvisionedGuild {
                    app_name: handles.app_name,
                    machine_id: handles.machine_id,
                    volume_id: handles.volume_id,
                    region: guild
                        .region
                        .clone()
                        .unwrap_or_else(|| self.settings.region.clone()),
                })
            }
            None => Err(OrchestratorError::FailedPrecondition(format!(
                "guild {} is already being provisioned",
                guild.id
            ))),
        }
    }

    /// Best-effort failure write; never masks the original error.
    async fn mark_error(&self, guild_id: &GuildId, cause: &OrchestratorError) {
        warn!("provisioning guild {} failed: {}", guild_id, cause);
        if let Err(e) = self
            .guilds
            .update_status(guild_id, GuildStatus::Error, Some(cause.to_string()))
            .await
        {
            error!("failed to mark guild {} as errored: {}", guild_id, e);
        }
    }
}

#[async_trait]
impl ProvisioningService for StandardProvisioningService {
    async fn provision(&self, guild_id: &GuildId) -> Result<ProvisionedGuild, OrchestratorError> {
        let guild = self.load_guarded(guild_id).await?;

        if guild.status == GuildStatus::Provisioning {
            return self.absorb_duplicate_trigger(&guild);
        }

        if !guild.tier.is_paid() {
            return self.provision_free_tier(guild_id).await;
        }

        self.require_active_subscription(&guild).await?;
        let quota = self.query_quota(&guild).await?;
        self.run_provisioning(guild, quota).await
    }

    async fn provision_free_tier(
        &self,
        guild_id: &GuildId,
    ) -> Result<ProvisionedGuild, OrchestratorError> {
        let guild = self.load_guarded(guild_id).await?;

        if guild.status == GuildStatus::Provisioning {
            return self.absorb_duplicate_trigger(&guild);
        }

        if guild.tier.is_paid() {
            return Err(OrchestratorError::FailedPrecondition(format!(
                "guild {} is on the {} tier, not free",
                guild_id, guild.tier
            )));
        }

        // Reserve before any remote resource exists; compensate on any
        // downstream failure of this same attempt.
        let reservation = self.admission.reserve_free_tier_slot().await?;
        let quota = match self.query_quota(&guild).await {
            Ok(q) => q,
            Err(e) => {
                self.admission.release_slot(reservation).await;
                return Err(e);
            }
        };

        match self.run_provisioning(guild, quota).await {
            Ok(provisioned) => Ok(provisioned),
            Err(e) => {
                self.admission.release_slot(reservation).await;
                Err(e)
            }
        }
    }
}
