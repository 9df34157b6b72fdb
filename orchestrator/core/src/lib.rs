// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Guild lifecycle orchestration core.
//!
//! Provisions, observes, and tears down per-tenant compute workloads on
//! a remote machines platform: app/volume/machine creation, tier-based
//! admission, background readiness polling, idempotent operational
//! commands, and cascading deletion.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
