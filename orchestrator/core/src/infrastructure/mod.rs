// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure adapters: remote machines API, persistence, secrets,
//! billing, and identity collaborators.

pub mod billing;
pub mod config;
pub mod identity;
pub mod machines_client;
pub mod repositories;
pub mod secrets;
