// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! In-process channel pair.
//!
//! Both ends live in the same process and exchange frames through unbounded queues. A
//! [`MemoryControl`] simulates the physical connection dropping and coming back, which both ends
//! observe as `Disconnected` / `Reconnected` events.
//!

use crate::{
    Error,
    channel::{Channel, Link, LinkEvent},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use tracing::debug;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

struct Shared {
    connected: AtomicBool,
    left: mpsc::UnboundedSender<LinkEvent>,
    right: mpsc::UnboundedSender<LinkEvent>,
}

/// Handle to drop and restore the connection of a memory channel pair.
#[derive(Clone)]
pub struct MemoryControl {
    shared: Arc<Shared>,
}

impl MemoryControl {
    /// Drops the connection. Frames sent while disconnected fail.
    pub fn disconnect(&self) {
        if self.shared.connected.swap(false, Ordering::SeqCst) {
            debug!("Memory channel disconnected.");
            let _ = self.shared.left.send(LinkEvent::Disconnected);
            let _ = self.shared.right.send(LinkEvent::Disconnected);
        }
    }

    /// Restores the connection.
    pub fn reconnect(&self) {
        if !self.shared.connected.swap(true, Ordering::SeqCst) {
            debug!("Memory channel reconnected.");
            let _ = self.shared.left.send(LinkEvent::Reconnected);
            let _ = self.shared.right.send(LinkEvent::Reconnected);
        }
    }

    /// True while connected.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

struct MemoryLink {
    shared: Arc<Shared>,
    /// Event queue of the opposite end.
    peer: mpsc::UnboundedSender<LinkEvent>,
}

#[async_trait]
impl Link for MemoryLink {
    async fn send(&self, frame: Vec<u8>) -> Result<(), Error> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(Error::Transport("memory channel is disconnected".to_owned()));
        }
        self.peer
            .send(LinkEvent::Frame(frame))
            .map_err(|_| Error::Transport("memory channel is closed".to_owned()))
    }
}

/// Creates two connected channel ends and their control handle.
pub fn pair() -> (Channel, Channel, MemoryControl) {
    let (left_sender, left_events) = mpsc::unbounded_channel();
    let (right_sender, right_events) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        connected: AtomicBool::new(true),
        left: left_sender.clone(),
        right: right_sender.clone(),
    });
    let left = Channel::new(
        MemoryLink {
            shared: shared.clone(),
            peer: right_sender,
        },
        left_events,
    );
    let right = Channel::new(
        MemoryLink {
            shared: shared.clone(),
            peer: left_sender,
        },
        right_events,
    );
    (left, right, MemoryControl { shared })
}
