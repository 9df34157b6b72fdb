// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL repository implementations.
//!
//! Enum-like fields (status, tier) are stored as text, structured
//! side data as JSONB. The free-tier slot reservation is one conditional
//! `UPDATE` so the check-and-increment is atomic at the database, never
//! a client-side read-modify-write.

use crate::domain::deployment::{DeploymentRecord, FreeTierCapacity, Subscription, UserAccount};
use crate::domain::guild::{Guild, GuildId, GuildStatus, UserId};
use crate::domain::repository::{
    CapacityStore, DeploymentRepository, GuildRepository, RepositoryError, SubscriptionStore,
    UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

pub struct PostgresGuildRepository {
    pool: PgPool,
}

impl PostgresGuildRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuildRepository for PostgresGuildRepository {
    async fn save(&self, guild: &Guild) -> Result<(), RepositoryError> {
        let tier_json = serde_json::to_value(guild.tier)?;
        let status_json = serde_json::to_value(guild.status)?;

        sqlx::query(
            r#"
            INSERT INTO guilds (
                id, owner_user_id, tier, subscription_id, status,
                app_name, machine_id, volume_id, region,
                memory_context_size, memory_retention_months, error_message,
                created_at, updated_at, last_deployed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE SET
                tier = EXCLUDED.tier,
                subscription_id = EXCLUDED.subscription_id,
                status = EXCLUDED.status,
                app_name = EXCLUDED.app_name,
                machine_id = EXCLUDED.machine_id,
                volume_id = EXCLUDED.volume_id,
                region = EXCLUDED.region,
                memory_context_size = EXCLUDED.memory_context_size,
                memory_retention_months = EXCLUDED.memory_retention_months,
                error_message = EXCLUDED.error_message,
                updated_at = EXCLUDED.updated_at,
                last_deployed_at = EXCLUDED.last_deployed_at
            "#,
        )
        .bind(guild.id.as_str())
        .bind(guild.owner_user_id.as_str())
        .bind(tier_json)
        .bind(&guild.subscription_id)
        .bind(status_json)
        .bind(&guild.app_name)
        .bind(&guild.machine_id)
        .bind(&guild.volume_id)
        .bind(&guild.region)
        .bind(guild.memory_context_size as i32)
        .bind(guild.memory_retention_months as i32)
        .bind(&guild.error_message)
        .bind(guild.created_at)
        .bind(guild.updated_at)
        .bind(guild.last_deployed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save guild: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &GuildId) -> Result<Option<Guild>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, owner_user_id, tier, subscription_id, status,
                app_name, machine_id, volume_id, region,
                memory_context_size, memory_retention_months, error_message,
                created_at, updated_at, last_deployed_at
            FROM guilds
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.map(parse_guild_row).transpose()
    }

    async fn find_by_owner(&self, owner: &UserId) -> Result<Vec<Guild>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, owner_user_id, tier, subscription_id, status,
                app_name, machine_id, volume_id, region,
                memory_context_size, memory_retention_months, error_message,
                created_at, updated_at, last_deployed_at
            FROM guilds
            WHERE owner_user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.into_iter().map(parse_guild_row).collect()
    }

    async fn update_status(
        &self,
        id: &GuildId,
        status: GuildStatus,
        error_message: Option<String>,
    ) -> Result<(), RepositoryError> {
        let status_json = serde_json::to_value(status)?;

        let result = sqlx::query(
            r#"
            UPDATE guilds
            SET status = $2, error_message = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(status_json)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Guild {} not found", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: &GuildId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM guilds WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Guild {} not found", id)));
        }
        Ok(())
    }
}

fn parse_guild_row(row: sqlx::postgres::PgRow) -> Result<Guild, RepositoryError> {
    let id: String = row.get("id");
    let owner_user_id: String = row.get("owner_user_id");
    let tier_val: serde_json::Value = row.get("tier");
    let status_val: serde_json::Value = row.get("status");
    let memory_context_size: i32 = row.get("memory_context_size");
    let memory_retention_months: i32 = row.get("memory_retention_months");
    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");
    let last_deployed_at: Option<DateTime<Utc>> = row.get("last_deployed_at");

    Ok(Guild {
        id: GuildId::new(id),
        owner_user_id: UserId::new(owner_user_id),
        tier: serde_json::from_value(tier_val)
            .map_err(|e| RepositoryError::Serialization(format!("Bad tier: {}", e)))?,
        subscription_id: row.get("subscription_id"),
        status: serde_json::from_value(status_val)
            .map_err(|e| RepositoryError::Serialization(format!("Bad status: {}", e)))?,
        app_name: row.get("app_name"),
        machine_id: row.get("machine_id"),
        volume_id: row.get("volume_id"),
        region: row.get("region"),
        memory_context_size: memory_context_size as u32,
        memory_retention_months: memory_retention_months as u32,
        error_message: row.get("error_message"),
        created_at,
        updated_at,
        last_deployed_at,
    })
}

pub struct PostgresDeploymentRepository {
    pool: PgPool,
}

impl PostgresDeploymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeploymentRepository for PostgresDeploymentRepository {
    async fn save(&self, record: &DeploymentRecord) -> Result<(), RepositoryError> {
        let queries_by_type = serde_json::to_value(&record.queries_by_type)?;

        sqlx::query(
            r#"
            INSERT INTO guild_deployments (
                guild_id, queries_total, queries_used, cost_this_period,
                queries_by_type, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (guild_id) DO UPDATE SET
                queries_total = EXCLUDED.queries_total,
                queries_used = EXCLUDED.queries_used,
                cost_this_period = EXCLUDED.cost_this_period,
                queries_by_type = EXCLUDED.queries_by_type,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.guild_id.as_str())
        .bind(record.queries_total as i32)
        .bind(record.queries_used as i32)
        .bind(record.cost_this_period)
        .bind(queries_by_type)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save deployment: {}", e)))?;

        Ok(())
    }

    async fn find_by_guild(
        &self,
        guild_id: &GuildId,
    ) -> Result<Option<DeploymentRecord>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT guild_id, queries_total, queries_used, cost_this_period,
                   queries_by_type, created_at, updated_at
            FROM guild_deployments
            WHERE guild_id = $1
            "#,
        )
        .bind(guild_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.map(|row| {
            let guild_id: String = row.get("guild_id");
            let queries_total: i32 = row.get("queries_total");
            let queries_used: i32 = row.get("queries_used");
            let queries_by_type_val: serde_json::Value = row.get("queries_by_type");

            Ok(DeploymentRecord {
                guild_id: GuildId::new(guild_id),
                queries_total: queries_total as u32,
                queries_used: queries_used as u32,
                cost_this_period: row.get("cost_this_period"),
                queries_by_type: serde_json::from_value(queries_by_type_val).map_err(|e| {
                    RepositoryError::Serialization(format!("Bad queries_by_type: {}", e))
                })?,
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
        })
        .transpose()
    }

    async fn delete(&self, guild_id: &GuildId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM guild_deployments WHERE guild_id = $1")
            .bind(guild_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Single-row counter table (`id = true` enforces the singleton).
pub struct PostgresCapacityStore {
    pool: PgPool,
}

impl PostgresCapacityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CapacityStore for PostgresCapacityStore {
    async fn get(&self) -> Result<Option<FreeTierCapacity>, RepositoryError> {
        let row = sqlx::query(
            "SELECT max_slots, used_slots, queries_per_slot FROM free_tier_capacity WHERE id",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(row.map(|row| {
            let max_slots: i32 = row.get("max_slots");
            let used_slots: i32 = row.get("used_slots");
            let queries_per_slot: Option<i32> = row.get("queries_per_slot");
            FreeTierCapacity {
                max_slots: max_slots as u32,
                used_slots: used_slots as u32,
                queries_per_slot: queries_per_slot.map(|q| q as u32),
            }
        }))
    }

    async fn try_reserve_slot(&self) -> Result<bool, RepositoryError> {
        // Check-and-increment in one statement; concurrent callers
        // racing for the last slot admit exactly one.
        let result = sqlx::query(
            r#"
            UPDATE free_tier_capacity
            SET used_slots = used_slots + 1
            WHERE id AND used_slots < max_slots
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_slot(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE free_tier_capacity
            SET used_slots = used_slots - 1
            WHERE id AND used_slots > 0
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(())
    }
}

pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query("SELECT id, status FROM subscriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.map(|row| {
            let id: String = row.get("id");
            let status_val: serde_json::Value = row.get("status");
            Ok(Subscription {
                id,
                status: serde_json::from_value(status_val).map_err(|e| {
                    RepositoryError::Serialization(format!("Bad subscription status: {}", e))
                })?,
            })
        })
        .transpose()
    }
}

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query("SELECT id, created_at FROM users WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(row.map(|row| {
            let id: String = row.get("id");
            UserAccount {
                id: UserId::new(id),
                created_at: row.get("created_at"),
            }
        }))
    }

    async fn delete(&self, id: &UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }
}
