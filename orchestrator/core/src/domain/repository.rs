// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate, following the repository
//! pattern: one interface per aggregate, defined in the domain layer,
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `GuildRepository` | `Guild` | `InMemoryGuildRepository`, `PostgresGuildRepository` |
//! | `DeploymentRepository` | `DeploymentRecord` | in-memory, Postgres |
//! | `CapacityStore` | `FreeTierCapacity` | in-memory, Postgres |
//! | `SubscriptionStore` | `Subscription` | in-memory, Postgres |
//! | `UserRepository` | `UserAccount` | in-memory, Postgres |
//!
//! Every implementation must support per-document atomic updates; the
//! capacity store additionally requires an atomic check-and-increment
//! (`try_reserve_slot`), never a client-side read-modify-write.

use crate::domain::deployment::{DeploymentRecord, FreeTierCapacity, Subscription, UserAccount};
use crate::domain::guild::{Guild, GuildId, GuildStatus, UserId};
use async_trait::async_trait;

#[async_trait]
pub trait GuildRepository: Send + Sync {
    /// Save guild (create or update).
    async fn save(&self, guild: &Guild) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &GuildId) -> Result<Option<Guild>, RepositoryError>;

    async fn find_by_owner(&self, owner: &UserId) -> Result<Vec<Guild>, RepositoryError>;

    /// Atomic status write; `error_message` replaces the stored message
    /// (pass `None` to clear it).
    async fn update_status(
        &self,
        id: &GuildId,
        status: GuildStatus,
        error_message: Option<String>,
    ) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &GuildId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    async fn save(&self, record: &DeploymentRecord) -> Result<(), RepositoryError>;

    async fn find_by_guild(
        &self,
        guild_id: &GuildId,
    ) -> Result<Option<DeploymentRecord>, RepositoryError>;

    async fn delete(&self, guild_id: &GuildId) -> Result<(), RepositoryError>;
}

/// Free-tier slot counter. One document, many concurrent writers.
#[async_trait]
pub trait CapacityStore: Send + Sync {
    async fn get(&self) -> Result<Option<FreeTierCapacity>, RepositoryError>;

    /// Atomically increment `used_slots` if and only if capacity remains.
    /// Returns `false` when the counter is already at `max_slots`.
    async fn try_reserve_slot(&self) -> Result<bool, RepositoryError>;

    /// Compensating decrement for a failed provisioning attempt.
    async fn release_slot(&self) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Subscription>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, RepositoryError>;

    async fn delete(&self, id: &UserId) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
