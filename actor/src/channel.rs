// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Channels
//!
//! A channel is the physical substrate a [`Transport`](crate::Transport) runs on: anything able
//! to send frames and to report received frames, disconnections and reconnections. The runtime
//! ships an in-process channel pair ([`memory`](crate::memory)) and a TCP channel
//! ([`tcp`](crate::tcp)).
//!

use crate::Error;

use async_trait::async_trait;
use tokio::sync::mpsc;

use std::sync::Arc;

/// Notification produced by a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// A frame arrived.
    Frame(Vec<u8>),
    /// The physical connection dropped. The channel may reconnect later.
    Disconnected,
    /// The physical connection came back.
    Reconnected,
}

/// Outbound half of a channel.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    /// Writes one frame. Fails when the connection is down.
    async fn send(&self, frame: Vec<u8>) -> Result<(), Error>;
}

/// Event stream of a channel. The stream ending means the channel is gone for good.
pub type LinkEvents = mpsc::UnboundedReceiver<LinkEvent>;

/// A bidirectional channel: outbound link plus inbound event stream.
pub struct Channel {
    pub(crate) link: Arc<dyn Link>,
    pub(crate) events: LinkEvents,
}

impl Channel {
    /// Builds a channel from its two halves.
    pub fn new(link: impl Link, events: LinkEvents) -> Self {
        Self {
            link: Arc::new(link),
            events,
        }
    }
}
