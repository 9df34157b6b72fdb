// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Repository implementations behind the domain persistence traits.

pub mod memory;
pub mod postgres;
