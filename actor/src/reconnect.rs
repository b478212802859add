// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Reconnection strategies
//!
//! When the stream of a client channel drops, the channel tries to reach its peer again a
//! bounded number of times. A strategy decides how many attempts are made and how long to wait
//! before each one. It is reset after every successful reconnection, so a later drop starts
//! from the shortest wait again.
//!

use backoff::{
    ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff,
};

use std::{fmt::Debug, time::Duration};

/// Policy followed by a client channel to reach its peer again.
pub trait ReconnectStrategy: Debug + Send + Sync {
    /// Attempts made after a drop before the channel gives up on the peer.
    fn max_retries(&self) -> usize;
    /// Wait before the next attempt. `None` means retry at once.
    fn next_backoff(&mut self) -> Option<Duration>;
    /// Called after a successful reconnection.
    fn reset(&mut self) {}
}

/// Reconnects immediately.
#[derive(Debug, Default)]
pub struct NoIntervalStrategy {
    max_retries: usize,
}

impl NoIntervalStrategy {
    /// Strategy making up to `max_retries` attempts without waiting.
    pub fn new(max_retries: usize) -> Self {
        NoIntervalStrategy { max_retries }
    }
}

impl ReconnectStrategy for NoIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        None
    }
}

/// Reconnects after a fixed wait.
#[derive(Debug, Default)]
pub struct FixedIntervalStrategy {
    max_retries: usize,
    interval: Duration,
}

impl FixedIntervalStrategy {
    /// Strategy making up to `max_retries` attempts, each after waiting `interval`.
    pub fn new(max_retries: usize, interval: Duration) -> Self {
        FixedIntervalStrategy {
            max_retries,
            interval,
        }
    }
}

impl ReconnectStrategy for FixedIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        Some(self.interval)
    }
}

/// First wait of the exponential strategy.
const INITIAL_INTERVAL: Duration = Duration::from_millis(100);
/// Longest wait of the exponential strategy.
const MAX_INTERVAL: Duration = Duration::from_secs(5);
/// Jitter applied around each wait, so peers that dropped together do not retry together.
const RANDOMIZATION: f64 = 0.2;

/// Reconnects with exponentially growing, jittered waits.
///
/// Waits start at 100 ms and double up to 5 s. The number of attempts, not the elapsed time,
/// bounds the reconnection.
#[derive(Debug)]
pub struct ExponentialBackoffStrategy {
    max_retries: usize,
    backoff: ExponentialBackoff,
}

impl ExponentialBackoffStrategy {
    /// Strategy making up to `max_retries` attempts with the default waits.
    pub fn new(max_retries: usize) -> Self {
        Self::with_intervals(max_retries, INITIAL_INTERVAL, MAX_INTERVAL)
    }

    /// Strategy making up to `max_retries` attempts, waiting `initial` first and never more
    /// than `max` between attempts.
    pub fn with_intervals(
        max_retries: usize,
        initial: Duration,
        max: Duration,
    ) -> Self {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(initial)
            .with_max_interval(max.max(initial))
            .with_randomization_factor(RANDOMIZATION)
            .with_max_elapsed_time(None)
            .build();
        ExponentialBackoffStrategy {
            max_retries,
            backoff,
        }
    }
}

impl ReconnectStrategy for ExponentialBackoffStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.backoff.next_backoff()
    }

    fn reset(&mut self) {
        self.backoff.reset();
    }
}
