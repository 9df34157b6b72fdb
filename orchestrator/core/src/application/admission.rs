// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Free-tier admission control.
//!
//! A slot reservation must happen before any remote resource is created
//! and must be compensated (released) if the same provisioning attempt
//! fails downstream. The release is best-effort: a leaked slot is a
//! detectable cost, a double-spent slot is not acceptable, so only the
//! reservation side is atomic and strict.

use crate::domain::error::OrchestratorError;
use crate::domain::repository::CapacityStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Proof that one free-tier slot was reserved for this attempt.
#[derive(Debug)]
pub struct SlotReservation {
    _private: (),
}

pub struct AdmissionController {
    capacity: Arc<dyn CapacityStore>,
}

impl AdmissionController {
    pub fn new(capacity: Arc<dyn CapacityStore>) -> Self {
        Self { capacity }
    }

    /// Check-and-reserve one free-tier slot.
    ///
    /// Fails `FailedPrecondition` when no capacity document exists and
    /// `ResourceExhausted` when every slot is taken. The increment is a
    /// single atomic operation on the store, so concurrent callers
    /// racing for the last slot admit exactly one.
    pub async fn reserve_free_tier_slot(&self) -> Result<SlotReservation, OrchestratorError> {
        let capacity = self.capacity.get().await?.ok_or_else(|| {
            OrchestratorError::FailedPrecondition(
                "free-tier capacity is not configured".to_string(),
            )
        })?;

        if !capacity.has_capacity() {
            return Err(OrchestratorError::ResourceExhausted(format!(
                "free tier is full ({}/{} slots in use)",
                capacity.used_slots, capacity.max_slots
            )));
        }

        // The pre-check above is advisory; the store enforces the limit.
        let reserved = self.capacity.try_reserve_slot().await?;
        if !reserved {
            return Err(OrchestratorError::ResourceExhausted(
                "free tier filled up while reserving".to_string(),
            ));
        }

        debug!("reserved one free-tier slot");
        Ok(SlotReservation { _private: () })
    }

    /// Best-effort compensating decrement. A failure here is logged and
    /// swallowed so it can never mask the error that triggered it.
    pub async fn release_slot(&self, _reservation: SlotReservation) {
        if let Err(e) = self.capacity.release_slot().await {
            warn!("failed to release free-tier slot (slot leaked): {}", e);
        } else {
            debug!("released one free-tier slot");
        }
    }

    /// Per-slot query quota from the capacity document, if configured.
    pub async fn queries_per_slot(&self) -> Result<Option<u32>, OrchestratorError> {
        Ok(self.capacity.get().await?.and_then(|c| c.queries_per_slot))
    }
}
