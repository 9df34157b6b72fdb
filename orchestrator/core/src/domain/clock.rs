// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Injected wall clock, so services never call `Utc::now()` directly and
//! tests can pin time.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
