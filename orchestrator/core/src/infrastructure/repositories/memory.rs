// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! In-memory repository implementations.
//!
//! Used for development and tests; production deployments select the
//! PostgreSQL implementations at startup. The capacity store performs
//! its check-and-increment under one lock, honoring the atomicity
//! contract the same way the SQL implementation does with a single
//! conditional `UPDATE`.

use crate::domain::deployment::{DeploymentRecord, FreeTierCapacity, Subscription, UserAccount};
use crate::domain::guild::{Guild, GuildId, GuildStatus, UserId};
use crate::domain::repository::{
    CapacityStore, DeploymentRepository, GuildRepository, RepositoryError, SubscriptionStore,
    UserRepository,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

#[derive(Default)]
pub struct InMemoryGuildRepository {
    guilds: Mutex<HashMap<GuildId, Guild>>,
}

#[async_trait]
impl GuildRepository for InMemoryGuildRepository {
    async fn save(&self, guild: &Guild) -> Result<(), RepositoryError> {
        self.guilds
            .lock()
            .unwrap()
            .insert(guild.id.clone(), guild.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &GuildId) -> Result<Option<Guild>, RepositoryError> {
        Ok(self.guilds.lock().unwrap().get(id).cloned())
    }

    async fn find_by_owner(&self, owner: &UserId) -> Result<Vec<Guild>, RepositoryError> {
        Ok(self
            .guilds
            .lock()
            .unwrap()
            .values()
            .filter(|g| &g.owner_user_id == owner)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: &GuildId,
        status: GuildStatus,
        error_message: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut guilds = self.guilds.lock().unwrap();
        let guild = guilds
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("guild {} not found", id)))?;
        guild.status = status;
        guild.error_message = error_message;
        Ok(())
    }

    async fn delete(&self, id: &GuildId) -> Result<(), RepositoryError> {
        self.guilds
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("guild {} not found", id)))
    }
}

#[derive(Default)]
pub struct InMemoryDeploymentRepository {
    records: Mutex<HashMap<GuildId, DeploymentRecord>>,
}

#[async_trait]
impl DeploymentRepository for InMemoryDeploymentRepository {
    async fn save(&self, record: &DeploymentRecord) -> Result<(), RepositoryError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.guild_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_guild(
        &self,
        guild_id: &GuildId,
    ) -> Result<Option<DeploymentRecord>, RepositoryError> {
        Ok(self.records.lock().unwrap().get(guild_id).cloned())
    }

    async fn delete(&self, guild_id: &GuildId) -> Result<(), RepositoryError> {
        self.records.lock().unwrap().remove(guild_id);
        Ok(())
    }
}

/// Single-document counter with lock-held check-and-increment.
pub struct InMemoryCapacityStore {
    capacity: Mutex<Option<FreeTierCapacity>>,
}

impl InMemoryCapacityStore {
    pub fn empty() -> Self {
        Self {
            capacity: Mutex::new(None),
        }
    }

    pub fn with_capacity(capacity: FreeTierCapacity) -> Self {
        Self {
            capacity: Mutex::new(Some(capacity)),
        }
    }
}

#[async_trait]
impl CapacityStore for InMemoryCapacityStore {
    async fn get(&self) -> Result<Option<FreeTierCapacity>, RepositoryError> {
        Ok(*self.capacity.lock().unwrap())
    }

    async fn try_reserve_slot(&self) -> Result<bool, RepositoryError> {
        let mut capacity = self.capacity.lock().unwrap();
        let cap = capacity
            .as_mut()
            .ok_or_else(|| RepositoryError::NotFound("free-tier capacity".to_string()))?;
        if cap.used_slots >= cap.max_slots {
            return Ok(false);
        }
        cap.used_slots += 1;
        Ok(true)
    }

    async fn release_slot(&self) -> Result<(), RepositoryError> {
        let mut capacity = self.capacity.lock().unwrap();
        let cap = capacity
            .as_mut()
            .ok_or_else(|| RepositoryError::NotFound("free-tier capacity".to_string()))?;
        if cap.used_slots == 0 {
            warn!("release_slot called with used_slots already at zero");
            return Ok(());
        }
        cap.used_slots -= 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl InMemorySubscriptionStore {
    pub fn insert(&self, subscription: Subscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Subscription>, RepositoryError> {
        Ok(self.subscriptions.lock().unwrap().get(id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<UserId, UserAccount>>,
}

impl InMemoryUserRepository {
    pub fn insert(&self, user: UserAccount) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    pub fn contains(&self, id: &UserId) -> bool {
        self.users.lock().unwrap().contains_key(id)
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, RepositoryError> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn delete(&self, id: &UserId) -> Result<(), RepositoryError> {
        self.users
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("user {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::guild::Tier;
    use chrono::Utc;

    #[tokio::test]
    async fn guild_round_trip_and_status_update() {
        let repo = InMemoryGuildRepository::default();
        let guild = Guild::new(
            GuildId::new("g1"),
            UserId::new("u1"),
            Tier::Starter,
            Utc::now(),
        );
        repo.save(&guild).await.unwrap();

        repo.update_status(
            &GuildId::new("g1"),
            GuildStatus::Error,
            Some("boom".to_string()),
        )
        .await
        .unwrap();

        let loaded = repo.find_by_id(&GuildId::new("g1")).await.unwrap().unwrap();
        assert_eq!(loaded.status, GuildStatus::Error);
        assert_eq!(loaded.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn capacity_reserve_respects_limit() {
        let store = InMemoryCapacityStore::with_capacity(FreeTierCapacity {
            max_slots: 1,
            used_slots: 0,
            queries_per_slot: None,
        });
        assert!(store.try_reserve_slot().await.unwrap());
        assert!(!store.try_reserve_slot().await.unwrap());
        store.release_slot().await.unwrap();
        assert!(store.try_reserve_slot().await.unwrap());
    }
}
