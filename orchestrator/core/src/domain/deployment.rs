// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Deployment ledger and free-tier capacity value objects.

use crate::domain::guild::GuildId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Usage/billing ledger scoped 1:1 to an active guild.
///
/// Created exactly once at successful provisioning, deleted with the
/// guild. The orchestrator owns writes; billing/metering collaborators
/// only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub guild_id: GuildId,
    pub queries_total: u32,
    pub queries_used: u32,
    pub cost_this_period: f64,
    #[serde(default)]
    pub queries_by_type: HashMap<String, u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn new(guild_id: GuildId, queries_total: u32, now: DateTime<Utc>) -> Self {
        Self {
            guild_id,
            queries_total,
            queries_used: 0,
            cost_this_period: 0.0,
            queries_by_type: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Singleton free-tier capacity counter.
///
/// `used_slots` is monotonically non-decreasing except for the explicit
/// compensating decrement after a failed provisioning attempt. The
/// check-then-increment is atomic on the store side; it never transiently
/// exceeds `max_slots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTierCapacity {
    pub max_slots: u32,
    pub used_slots: u32,
    pub queries_per_slot: Option<u32>,
}

impl FreeTierCapacity {
    pub fn has_capacity(&self) -> bool {
        self.used_slots < self.max_slots
    }
}

/// Billing-provider subscription state, read-only to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Incomplete,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        matches!(self.status, SubscriptionStatus::Active)
    }
}

/// Minimal local user record; the full profile lives with the identity
/// provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: crate::domain::guild::UserId,
    pub created_at: DateTime<Utc>,
}
