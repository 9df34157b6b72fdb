// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Background readiness poller.
//!
//! Watches a freshly created machine until it reports a terminal state
//! or the attempt budget is exhausted, then persists the outcome on the
//! guild. Runs detached from the provisioning request: the HTTP caller
//! never waits on machine readiness, and poller failures never cross
//! the spawning boundary. Every exit path ends in a status write — a
//! guild is never left stuck in `provisioning` by this loop.

use crate::domain::guild::{GuildId, GuildStatus};
use crate::domain::machine::MachineState;
use crate::domain::platform::MachinePlatform;
use crate::domain::repository::GuildRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Poll cadence and budget. Defaults give a five-minute ceiling.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

pub struct ReadinessPoller {
    platform: Arc<dyn MachinePlatform>,
    guilds: Arc<dyn GuildRepository>,
    policy: PollPolicy,
}

impl ReadinessPoller {
    pub fn new(
        platform: Arc<dyn MachinePlatform>,
        guilds: Arc<dyn GuildRepository>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            platform,
            guilds,
            policy,
        }
    }

    /// Spawn the detached watch task for one machine.
    pub fn spawn(self, guild_id: GuildId, app_name: String, machine_id: String) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(guild_id, app_name, machine_id).await })
    }

    async fn run(&self, guild_id: GuildId, app_name: String, machine_id: String) {
        for attempt in 1..=self.policy.max_attempts {
            match self.platform.get_machine(&app_name, &machine_id).await {
                Ok(machine) => match machine.state {
                    MachineState::Started => {
                        info!(
                            "guild {} machine {} started after {} poll(s)",
                            guild_id, machine_id, attempt
                        );
                        self.write_status(&guild_id, GuildStatus::Active, None).await;
                        return;
                    }
                    MachineState::Stopped | MachineState::Failed => {
                        let message = format!(
                            "machine {} entered state '{}' during startup",
                            machine_id, machine.state
                        );
                        warn!("guild {}: {}", guild_id, message);
                        self.write_status(&guild_id, GuildStatus::Error, Some(message))
                            .await;
                        return;
                    }
                    other => {
                        // Not terminal yet, keep watching.
                        tracing::debug!(
                            "guild {} machine {} state '{}' (attempt {}/{})",
                            guild_id,
                            machine_id,
                            other,
                            attempt,
                            self.policy.max_attempts
                        );
                    }
                },
                // One flaky call does not abort the watch.
                Err(e) => warn!(
                    "guild {} readiness poll {}/{} failed: {}",
                    guild_id, attempt, self.policy.max_attempts, e
                ),
            }

            tokio::time::sleep(self.policy.interval).await;
        }

        let message = format!(
            "machine {} did not become ready within {} polls",
            machine_id, self.policy.max_attempts
        );
        warn!("guild {}: {}", guild_id, message);
        self.write_status(&guild_id, GuildStatus::Error, Some(message))
            .await;
    }

    async fn write_status(&self, guild_id: &GuildId, status: GuildStatus, message: Option<String>) {
        if let Err(e) = self.guilds.update_status(guild_id, status, message).await {
            // Terminal only to the poller itself; nothing to propagate to.
            error!(
                "failed to persist status '{}' for guild {}: {}",
                status, guild_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::MockPlatform;
    use crate::domain::guild::{Guild, Tier, UserId};
    use crate::infrastructure::repositories::memory::InMemoryGuildRepository;
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(0),
            max_attempts: 60,
        }
    }

    async fn seeded_repo() -> Arc<InMemoryGuildRepository> {
        let repo = Arc::new(InMemoryGuildRepository::default());
        let mut guild = Guild::new(
            GuildId::new("g1"),
            UserId::new("u1"),
            Tier::Free,
            Utc::now(),
        );
        guild.status = GuildStatus::Provisioning;
        repo.save(&guild).await.unwrap();
        repo
    }

    #[tokio::test]
    async fn started_machine_activates_guild() {
        let platform = Arc::new(MockPlatform::default());
        platform.set_machine_state(MachineState::Started);
        let repo = seeded_repo().await;

        ReadinessPoller::new(platform, repo.clone(), fast_policy())
            .spawn(GuildId::new("g1"), "guild-g1".into(), "m-1".into())
            .await
            .unwrap();

        let guild = repo.find_by_id(&GuildId::new("g1")).await.unwrap().unwrap();
        assert_eq!(guild.status, GuildStatus::Active);
        assert!(guild.error_message.is_none());
    }

    #[tokio::test]
    async fn failed_machine_errors_guild() {
        let platform = Arc::new(MockPlatform::default());
        platform.set_machine_state(MachineState::Failed);
        let repo = seeded_repo().await;

        ReadinessPoller::new(platform, repo.clone(), fast_policy())
            .spawn(GuildId::new("g1"), "guild-g1".into(), "m-1".into())
            .await
            .unwrap();

        let guild = repo.find_by_id(&GuildId::new("g1")).await.unwrap().unwrap();
        assert_eq!(guild.status, GuildStatus::Error);
        assert!(guild.error_message.unwrap().contains("failed"));
    }

    #[tokio::test]
    async fn never_ready_machine_errors_after_exactly_sixty_polls() {
        let platform = Arc::new(MockPlatform::default());
        platform.set_machine_state(MachineState::Starting);
        let repo = seeded_repo().await;

        ReadinessPoller::new(platform.clone(), repo.clone(), fast_policy())
            .spawn(GuildId::new("g1"), "guild-g1".into(), "m-1".into())
            .await
            .unwrap();

        assert_eq!(platform.get_machine_calls.load(Ordering::SeqCst), 60);
        let guild = repo.find_by_id(&GuildId::new("g1")).await.unwrap().unwrap();
        assert_eq!(guild.status, GuildStatus::Error);
        assert!(guild.error_message.unwrap().contains("60"));
    }

    #[tokio::test]
    async fn transient_api_errors_do_not_abort_the_watch() {
        let platform = Arc::new(MockPlatform::default());
        platform.fail_get_machine_times(3);
        platform.set_machine_state(MachineState::Started);
        let repo = seeded_repo().await;

        ReadinessPoller::new(platform.clone(), repo.clone(), fast_policy())
            .spawn(GuildId::new("g1"), "guild-g1".into(), "m-1".into())
            .await
            .unwrap();

        // Three failed polls, then the successful one.
        assert_eq!(platform.get_machine_calls.load(Ordering::SeqCst), 4);
        let guild = repo.find_by_id(&GuildId::new("g1")).await.unwrap().unwrap();
        assert_eq!(guild.status, GuildStatus::Active);
    }
}
