// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Teardown: single-guild deprovisioning and cascading account deletion.
//!
//! Remote and billing cleanup are best effort — attempt, log, continue.
//! An orphaned remote app or a failed subscription cancel is observable
//! and recoverable; a guild record stuck un-deletable is not. Local
//! record deletion is the only hard-failure path.

use crate::application::ownership::verify_ownership;
use crate::domain::error::OrchestratorError;
use crate::domain::guild::{Guild, GuildId, GuildStatus, UserId};
use crate::domain::platform::MachinePlatform;
use crate::domain::repository::{DeploymentRepository, GuildRepository, UserRepository};
use crate::infrastructure::billing::BillingProvider;
use crate::infrastructure::identity::IdentityProvider;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of `delete_account`. Partial success is a normal, reportable
/// result, not an exception.
#[derive(Debug, Clone, Serialize)]
pub struct AccountDeletionReport {
    pub deleted_guilds: u32,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait DeprovisioningService: Send + Sync {
    /// Tear down one guild: cancel its subscription, delete the remote
    /// app (cascading to machine and volume), then the local records.
    async fn deprovision(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
    ) -> Result<(), OrchestratorError>;

    /// Tear down every guild the user owns, then the user record and the
    /// external identity record, collecting per-step errors.
    async fn delete_account(
        &self,
        user_id: &UserId,
    ) -> Result<AccountDeletionReport, OrchestratorError>;
}

pub struct StandardDeprovisioningService {
    guilds: Arc<dyn GuildRepository>,
    deployments: Arc<dyn DeploymentRepository>,
    users: Arc<dyn UserRepository>,
    platform: Arc<dyn MachinePlatform>,
    billing: Arc<dyn BillingProvider>,
    identity: Arc<dyn IdentityProvider>,
}

impl StandardDeprovisioningService {
    pub fn new(
        guilds: Arc<dyn GuildRepository>,
        deployments: Arc<dyn DeploymentRepository>,
        users: Arc<dyn UserRepository>,
        platform: Arc<dyn MachinePlatform>,
        billing: Arc<dyn BillingProvider>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            guilds,
            deployments,
            users,
            platform,
            billing,
            identity,
        }
    }

    /// Tear down one guild's resources and records. Returns the warnings
    /// accumulated from best-effort steps; errs only when a local record
    /// cannot be deleted.
    async fn teardown(&self, guild: &Guild) -> Result<Vec<String>, OrchestratorError> {
        let mut warnings = Vec::new();

        if let Some(subscription_id) = guild.subscription_id.as_deref() {
            if let Err(e) = self.billing.cancel_subscription_now(subscription_id).await {
                let message = format!(
                    "guild {}: cancelling subscription {} failed: {}",
                    guild.id, subscription_id, e
                );
                warn!("{}", message);
                warnings.push(message);
            }
        }

        let has_deployment = self.deployments.find_by_guild(&guild.id).await?.is_some();
        if has_deployment {
            if let Some(app_name) = guild.app_name.as_deref() {
                // Deleting the app cascades to its machine and volume.
                if let Err(e) = self.platform.delete_app(app_name).await {
                    let message =
                        format!("guild {}: deleting app {} failed: {}", guild.id, app_name, e);
                    warn!("{}", message);
                    warnings.push(message);
                }
            }
        }

        self.deployments.delete(&guild.id).await?;
        self.guilds.delete(&guild.id).await?;
        info!("guild {} deprovisioned", guild.id);

        Ok(warnings)
    }
}

#[async_trait]
impl DeprovisioningService for StandardDeprovisioningService {
    async fn deprovision(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
    ) -> Result<(), OrchestratorError> {
        let guild = verify_ownership(self.guilds.as_ref(), user_id, guild_id).await?;

        // Duplicate delete requests bounce off the in-flight marker.
        if guild.status == GuildStatus::Deprovisioning {
            return Err(OrchestratorError::FailedPrecondition(format!(
                "guild {} is already being deprovisioned",
                guild_id
            )));
        }

        // Visible before any destructive step, so a half-finished
        // teardown is never retried as a fresh delete.
        self.guilds
            .update_status(guild_id, GuildStatus::Deprovisioning, None)
            .await?;

        self.teardown(&guild).await?;
        Ok(())
    }

    async fn delete_account(
        &self,
        user_id: &UserId,
    ) -> Result<AccountDeletionReport, OrchestratorError> {
        let guilds = self.guilds.find_by_owner(user_id).await?;
        info!(
            "deleting account {} with {} guild(s)",
            user_id,
            guilds.len()
        );

        let mut deleted_guilds = 0u32;
        let mut errors = Vec::new();

        for guild in &guilds {
            if let Err(e) = self
                .guilds
                .update_status(&guild.id, GuildStatus::Deprovisioning, None)
                .await
            {
                warn!("marking guild {} for teardown failed: {}", guild.id, e);
            }
            match self.teardown(guild).await {
                Ok(warnings) => {
                    deleted_guilds += 1;
                    errors.extend(warnings);
                }
                Err(e) => {
                    let message = format!("guild {}: teardown failed: {}", guild.id, e);
                    warn!("{}", message);
                    errors.push(message);
                }
            }
        }

        // The two final steps fail independently; neither blocks the other.
        if let Err(e) = self.users.delete(user_id).await {
            let message = format!("deleting user record {} failed: {}", user_id, e);
            warn!("{}", message);
            errors.push(message);
        }
        if let Err(e) = self.identity.delete_user(user_id).await {
            let message = format!("deleting identity record {} failed: {}", user_id, e);
            warn!("{}", message);
            errors.push(message);
        }

        info!(
            "account {} deleted: {} guild(s) removed, {} error(s)",
            user_id,
            deleted_guilds,
            errors.len()
        );
        Ok(AccountDeletionReport {
            deleted_guilds,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::MockPlatform;
    use crate::domain::deployment::{DeploymentRecord, UserAccount};
    use crate::domain::guild::Tier;
    use crate::infrastructure::billing::BillingError;
    use crate::infrastructure::identity::IdentityError;
    use crate::infrastructure::repositories::memory::{
        InMemoryDeploymentRepository, InMemoryGuildRepository, InMemoryUserRepository,
    };
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBilling {
        cancelled: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl BillingProvider for RecordingBilling {
        async fn cancel_subscription_now(&self, subscription_id: &str) -> Result<(), BillingError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(BillingError::Api {
                    status: 500,
                    message: "stripe unavailable".into(),
                });
            }
            self.cancelled
                .lock()
                .unwrap()
                .push(subscription_id.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingIdentity {
        deleted: Mutex<Vec<UserId>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl IdentityProvider for RecordingIdentity {
        async fn delete_user(&self, user_id: &UserId) -> Result<(), IdentityError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(IdentityError::Transport("connection refused".into()));
            }
            self.deleted.lock().unwrap().push(user_id.clone());
            Ok(())
        }
    }

    struct Fixture {
        service: StandardDeprovisioningService,
        guilds: Arc<InMemoryGuildRepository>,
        deployments: Arc<InMemoryDeploymentRepository>,
        users: Arc<InMemoryUserRepository>,
        platform: Arc<MockPlatform>,
        billing: Arc<RecordingBilling>,
        identity: Arc<RecordingIdentity>,
    }

    fn fixture() -> Fixture {
        let guilds = Arc::new(InMemoryGuildRepository::default());
        let deployments = Arc::new(InMemoryDeploymentRepository::default());
        let users = Arc::new(InMemoryUserRepository::default());
        let platform = Arc::new(MockPlatform::default());
        let billing = Arc::new(RecordingBilling::default());
        let identity = Arc::new(RecordingIdentity::default());
        let service = StandardDeprovisioningService::new(
            guilds.clone(),
            deployments.clone(),
            users.clone(),
            platform.clone(),
            billing.clone(),
            identity.clone(),
        );
        Fixture {
            service,
            guilds,
            deployments,
            users,
            platform,
            billing,
            identity,
        }
    }

    async fn seed_guild(f: &Fixture, id: &str, owner: &str, subscription: Option<&str>) -> GuildId {
        let mut guild = Guild::new(
            GuildId::new(id),
            UserId::new(owner),
            if subscription.is_some() {
                Tier::Pro
            } else {
                Tier::Free
            },
            Utc::now(),
        );
        guild.status = GuildStatus::Active;
        guild.subscription_id = subscription.map(String::from);
        guild.app_name = Some(format!("guild-{}", id));
        guild.machine_id = Some("m-1".into());
        guild.volume_id = Some("vol-1".into());
        f.guilds.save(&guild).await.unwrap();
        f.deployments
            .save(&DeploymentRecord::new(guild.id.clone(), 500, Utc::now()))
            .await
            .unwrap();
        guild.id
    }

    #[tokio::test]
    async fn deprovision_cancels_subscription_and_removes_everything() {
        let f = fixture();
        let id = seed_guild(&f, "g1", "owner", Some("sub_1")).await;

        f.service
            .deprovision(&UserId::new("owner"), &id)
            .await
            .expect("deprovision");

        assert_eq!(f.billing.cancelled.lock().unwrap().as_slice(), ["sub_1"]);
        assert_eq!(f.platform.delete_app_calls.load(Ordering::SeqCst), 1);
        assert!(f.guilds.find_by_id(&id).await.unwrap().is_none());
        assert!(f.deployments.find_by_guild(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_deprovision_is_rejected_without_second_remote_delete() {
        let f = fixture();
        let id = seed_guild(&f, "g1", "owner", None).await;
        f.guilds
            .update_status(&id, GuildStatus::Deprovisioning, None)
            .await
            .unwrap();

        let err = f
            .service
            .deprovision(&UserId::new("owner"), &id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::FailedPrecondition(_)));
        assert_eq!(f.platform.delete_app_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn billing_failure_does_not_abort_deletion() {
        let f = fixture();
        let id = seed_guild(&f, "g1", "owner", Some("sub_1")).await;
        f.billing.fail.store(true, Ordering::SeqCst);

        f.service
            .deprovision(&UserId::new("owner"), &id)
            .await
            .expect("deprovision despite billing failure");

        assert!(f.guilds.find_by_id(&id).await.unwrap().is_none());
        assert_eq!(f.platform.delete_app_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_delete_failure_does_not_abort_deletion() {
        let f = fixture();
        let id = seed_guild(&f, "g1", "owner", None).await;
        f.platform.fail_delete_app("guild-g1");

        f.service
            .deprovision(&UserId::new("owner"), &id)
            .await
            .expect("deprovision despite remote failure");
        assert!(f.guilds.find_by_id(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_owner_cannot_deprovision() {
        let f = fixture();
        let id = seed_guild(&f, "g1", "owner", None).await;

        let err = f
            .service
            .deprovision(&UserId::new("intruder"), &id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PermissionDenied(_)));
        assert!(f.guilds.find_by_id(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn account_deletion_tolerates_one_failing_remote_delete() {
        let f = fixture();
        let owner = UserId::new("owner");
        f.users.insert(UserAccount {
            id: owner.clone(),
            created_at: Utc::now(),
        });
        seed_guild(&f, "g1", "owner", Some("sub_1")).await;
        seed_guild(&f, "g2", "owner", None).await;
        seed_guild(&f, "g3", "owner", None).await;
        f.platform.fail_delete_app("guild-g2");

        let report = f.service.delete_account(&owner).await.expect("delete");

        // All three local guilds removed despite the remote failure.
        assert_eq!(report.deleted_guilds, 3);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("guild-g2"));
        assert!(f
            .guilds
            .find_by_owner(&owner)
            .await
            .unwrap()
            .is_empty());
        assert!(!f.users.contains(&owner));
        assert_eq!(f.identity.deleted.lock().unwrap().as_slice(), [owner]);
    }

    #[tokio::test]
    async fn account_deletion_records_identity_failure_independently() {
        let f = fixture();
        let owner = UserId::new("owner");
        f.users.insert(UserAccount {
            id: owner.clone(),
            created_at: Utc::now(),
        });
        seed_guild(&f, "g1", "owner", None).await;
        f.identity.fail.store(true, Ordering::SeqCst);

        let report = f.service.delete_account(&owner).await.expect("delete");

        assert_eq!(report.deleted_guilds, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("identity"));
        // The user record step still ran.
        assert!(!f.users.contains(&owner));
    }
}
