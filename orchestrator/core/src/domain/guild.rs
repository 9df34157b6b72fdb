// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Guild aggregate: one tenant's provisioned compute unit.
//!
//! The guild record is the source of truth for *what should be running*;
//! the remote machine (see `domain::machine`) is the source of truth for
//! *what is actually running*.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a guild (upstream chat-platform snowflake, opaque here).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuildId(pub String);

impl GuildId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user account (owner of one or more guilds).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription tier of a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Starter,
    Pro,
    Business,
}

impl Tier {
    /// Paid tiers require an active subscription before provisioning;
    /// the free tier goes through slot admission instead.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Starter => write!(f, "starter"),
            Self::Pro => write!(f, "pro"),
            Self::Business => write!(f, "business"),
        }
    }
}

/// Lifecycle status of a guild.
///
/// `Suspended` is reachable but orchestrator-external: billing events set
/// it, the orchestrator only ever reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuildStatus {
    Pending,
    Provisioning,
    Active,
    Error,
    Deprovisioning,
    Deleted,
    Suspended,
}

impl std::fmt::Display for GuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Error => "error",
            Self::Deprovisioning => "deprovisioning",
            Self::Deleted => "deleted",
            Self::Suspended => "suspended",
        };
        write!(f, "{}", s)
    }
}

/// The three remote resource handles composing a guild's compute unit.
///
/// Handles are all-or-none: a guild either has every handle (addressable
/// by operational commands) or none (never partially provisioned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHandles {
    pub app_name: String,
    pub machine_id: String,
    pub volume_id: String,
}

/// Guild aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    pub owner_user_id: UserId,
    pub tier: Tier,
    pub subscription_id: Option<String>,
    pub status: GuildStatus,
    pub app_name: Option<String>,
    pub machine_id: Option<String>,
    pub volume_id: Option<String>,
    pub region: Option<String>,
    pub memory_context_size: u32,
    pub memory_retention_months: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_deployed_at: Option<DateTime<Utc>>,
}

impl Guild {
    /// Create a guild in `pending` with tier-derived config defaults.
    /// Upstream OAuth/checkout collaborators create guilds through this.
    pub fn new(id: GuildId, owner_user_id: UserId, tier: Tier, now: DateTime<Utc>) -> Self {
        let limits = TierLimits::for_tier(tier);
        Self {
            id,
            owner_user_id,
            tier,
            subscription_id: None,
            status: GuildStatus::Pending,
            app_name: None,
            machine_id: None,
            volume_id: None,
            region: None,
            memory_context_size: limits.memory_context_size,
            memory_retention_months: limits.memory_retention_months,
            error_message: None,
            created_at: now,
            updated_at: now,
            last_deployed_at: None,
        }
    }

    /// Remote handles if, and only if, all three are present.
    pub fn remote_handles(&self) -> Option<RemoteHandles> {
        match (&self.app_name, &self.machine_id, &self.volume_id) {
            (Some(app_name), Some(machine_id), Some(volume_id)) => Some(RemoteHandles {
                app_name: app_name.clone(),
                machine_id: machine_id.clone(),
                volume_id: volume_id.clone(),
            }),
            _ => None,
        }
    }

    /// A mutating command is admissible only when no other command is in
    /// flight for this guild.
    pub fn command_in_flight(&self) -> bool {
        matches!(
            self.status,
            GuildStatus::Provisioning | GuildStatus::Deprovisioning
        )
    }

    pub fn set_remote_handles(
        &mut self,
        handles: RemoteHandles,
        region: String,
        now: DateTime<Utc>,
    ) {
        self.app_name = Some(handles.app_name);
        self.machine_id = Some(handles.machine_id);
        self.volume_id = Some(handles.volume_id);
        self.region = Some(region);
        self.updated_at = now;
    }
}

/// Derive the remote app name from the guild id.
///
/// Deterministic by construction: repeated provisioning attempts for the
/// same guild always target the same app. The id is lowercased, stripped
/// of non-alphanumerics, and truncated before prefixing.
pub fn derive_app_name(guild_id: &GuildId) -> String {
    let normalized: String = guild_id
        .as_str()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect();
    format!("guild-{}", normalized)
}

/// Default free-tier query quota when the capacity document carries no
/// `queries_per_slot` value.
pub const DEFAULT_FREE_TIER_QUERIES: u32 = 25;

/// How the per-deployment query quota is derived for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryQuota {
    /// Read `queries_per_slot` from the free-tier capacity document,
    /// falling back to [`DEFAULT_FREE_TIER_QUERIES`].
    FromCapacityConfig,
    Fixed(u32),
}

/// Tier-derived constants, centralized in one lookup so that no call
/// site re-derives them ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub memory_context_size: u32,
    pub memory_retention_months: u32,
    pub query_quota: QueryQuota,
}

impl TierLimits {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                memory_context_size: 5,
                memory_retention_months: 1,
                query_quota: QueryQuota::FromCapacityConfig,
            },
            Tier::Starter => Self {
                memory_context_size: 10,
                memory_retention_months: 3,
                query_quota: QueryQuota::Fixed(500),
            },
            Tier::Pro => Self {
                memory_context_size: 25,
                memory_retention_months: 6,
                query_quota: QueryQuota::Fixed(1200),
            },
            Tier::Business => Self {
                memory_context_size: 50,
                memory_retention_months: 12,
                query_quota: QueryQuota::Fixed(5000),
            },
        }
    }
}
