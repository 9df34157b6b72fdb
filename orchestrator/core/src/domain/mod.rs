// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Domain layer: aggregates, value objects, and the seams
//! (repositories, platform, clock) the application services depend on.

pub mod clock;
pub mod deployment;
pub mod environment;
pub mod error;
pub mod guild;
pub mod machine;
pub mod platform;
pub mod repository;

pub use error::OrchestratorError;
pub use guild::{Guild, GuildId, GuildStatus, Tier, UserId};
