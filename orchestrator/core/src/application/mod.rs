// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Application services: use-case orchestration over the domain model.

pub mod admission;
pub mod deprovisioning;
pub mod operations;
pub mod ownership;
pub mod provisioning;
pub mod readiness;
pub mod workload;

#[cfg(test)]
pub mod testing;
