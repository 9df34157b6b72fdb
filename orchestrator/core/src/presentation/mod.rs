// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Presentation layer: the HTTP API surface.

pub mod api;
