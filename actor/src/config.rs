// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system configuration
//!

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Actor system settings.
///
/// Every field has a default, so a partial document deserializes into a complete
/// configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Milliseconds a closed transport stays registered waiting for its peer to reconnect.
    /// Once elapsed, routing to that peer fails as unreachable.
    pub reconnect_grace_ms: u64,
    /// Milliseconds an `ask` waits for its reply when the caller gives no timeout.
    /// `None` waits until the reply, a disconnection or the system stop.
    pub ask_timeout_ms: Option<u64>,
    /// Capacity of the system event channel.
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconnect_grace_ms: 10_000,
            ask_timeout_ms: None,
            event_buffer: 100,
        }
    }
}

impl Config {
    /// Sets the reconnection grace period.
    pub fn with_reconnect_grace(mut self, grace: Duration) -> Self {
        self.reconnect_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Sets the default ask timeout.
    pub fn with_ask_timeout(mut self, timeout: Duration) -> Self {
        self.ask_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Reconnection grace period.
    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_millis(self.reconnect_grace_ms)
    }

    /// Default ask timeout.
    pub fn ask_timeout(&self) -> Option<Duration> {
        self.ask_timeout_ms.map(Duration::from_millis)
    }
}
