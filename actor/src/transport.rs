// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Transport
//!
//! A `Transport` is the connection of an actor system with one peer system. It starts in
//! `Connecting`, becomes `Open` once the peer's handshake names it, and goes `Closed` when the
//! channel reports a disconnection. A reconnection brings the same transport back to `Open`
//! without forgetting the peer name, so addresses bound to that peer keep working.
//!

use crate::{
    Error,
    channel::{Link, LinkEvent, LinkEvents},
    envelope::Frame,
    system::{SystemEvent, SystemRef},
};

use tokio::{select, sync::watch};
use tracing::{Instrument, debug, info, warn};

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU64, Ordering},
};

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// Connection state of a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    /// Waiting for the peer handshake.
    Connecting,
    /// Handshake done, frames flow.
    Open,
    /// The channel is down.
    Closed,
}

/// Connection with one peer actor system.
pub struct Transport {
    id: u64,
    link: Arc<dyn Link>,
    /// Learned at the first handshake, never changed afterwards.
    peer: OnceLock<String>,
    state: watch::Sender<TransportState>,
    /// Bumped on every disconnection, so stale grace timers know they are stale.
    epoch: AtomicU64,
}

impl Transport {
    pub(crate) fn new(link: Arc<dyn Link>) -> Arc<Self> {
        let (state, _) = watch::channel(TransportState::Connecting);
        Arc::new(Self {
            id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
            link,
            peer: OnceLock::new(),
            state,
            epoch: AtomicU64::new(0),
        })
    }

    /// Process-unique identifier of this transport.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the peer system, once the handshake completed.
    pub fn peer_system_name(&self) -> Option<&str> {
        self.peer.get().map(String::as_str)
    }

    /// Current state.
    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// True while open.
    pub fn is_open(&self) -> bool {
        self.state() == TransportState::Open
    }

    /// Waits until the transport reaches `state`.
    pub async fn wait_state(&self, state: TransportState) {
        let mut receiver = self.state.subscribe();
        // The sender lives in `self`, so the wait can not fail while we borrow it.
        let _ = receiver.wait_for(|current| *current == state).await;
    }

    /// Waits until the handshake completed.
    pub async fn wait_open(&self) {
        self.wait_state(TransportState::Open).await
    }

    /// Writes a frame on the channel.
    pub(crate) async fn send(&self, frame: &Frame) -> Result<(), Error> {
        let bytes = frame.encode()?;
        self.link.send(bytes).await
    }

    /// Event loop of the transport. Runs until the channel is gone or the system stops.
    pub(crate) async fn run(self: Arc<Self>, system: SystemRef, mut events: LinkEvents) {
        debug!("Starting transport {}.", self.id);
        self.handshake(&system).await;
        let token = system.token();
        loop {
            let event = select! {
                _ = token.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Some(LinkEvent::Frame(bytes)) => self.on_frame(&bytes, &system).await,
                Some(LinkEvent::Disconnected) => {
                    if self.on_disconnect(&system).await {
                        self.schedule_unbind(&system);
                    }
                }
                Some(LinkEvent::Reconnected) => {
                    debug!("Transport {} reconnected, sending handshake.", self.id);
                    self.state.send_replace(TransportState::Connecting);
                    self.handshake(&system).await;
                }
                None => {
                    self.on_disconnect(&system).await;
                    if let Some(peer) = self.peer_system_name() {
                        system.unbind(peer, self.id).await;
                    }
                    break;
                }
            }
        }
        self.state.send_replace(TransportState::Closed);
        debug!("Transport {} stopped.", self.id);
    }

    async fn handshake(&self, system: &SystemRef) {
        let frame = Frame::Handshake {
            system_name: system.name().to_owned(),
        };
        if let Err(error) = self.send(&frame).await {
            warn!("Transport {} can not send handshake: {}", self.id, error);
        }
    }

    async fn on_frame(self: &Arc<Self>, bytes: &[u8], system: &SystemRef) {
        match Frame::decode(bytes) {
            Err(error) => {
                warn!("Transport {} dropping malformed frame: {}", self.id, error)
            }
            Ok(Frame::Handshake { system_name }) => {
                self.on_handshake(system_name, system).await
            }
            Ok(frame) => {
                if self.is_open() {
                    system.receive(self, frame).await;
                } else {
                    warn!(
                        "Transport {} dropping frame received before handshake.",
                        self.id
                    );
                }
            }
        }
    }

    async fn on_handshake(self: &Arc<Self>, name: String, system: &SystemRef) {
        if name == system.name() {
            warn!("Transport {} peer claims our own name '{}'.", self.id, name);
            return;
        }
        match self.peer.get() {
            None => {
                let _ = self.peer.set(name.clone());
            }
            Some(peer) if *peer == name => {}
            Some(peer) => {
                warn!(
                    "Transport {} bound to '{}' dropping handshake from '{}'.",
                    self.id, peer, name
                );
                return;
            }
        }
        // Routable before anyone waiting on `Open` wakes up.
        system.bind(&name, self.clone()).await;
        self.state.send_replace(TransportState::Open);
        info!("Connected with actor system '{}'.", name);
        system.emit(SystemEvent::PeerConnected(name));
    }

    /// Marks the transport closed and fails the asks that left through it. Returns true if a
    /// bound transport was open until now.
    async fn on_disconnect(&self, system: &SystemRef) -> bool {
        let previous = self.state.send_replace(TransportState::Closed);
        if previous == TransportState::Closed {
            return false;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let Some(peer) = self.peer_system_name() else {
            debug!("Transport {} closed before handshake.", self.id);
            return false;
        };
        warn!("Lost connection with actor system '{}'.", peer);
        system.fail_pending(self.id, peer).await;
        system.emit(SystemEvent::PeerDisconnected(peer.to_owned()));
        true
    }

    /// Forgets the peer binding unless the transport reopens within the grace period.
    fn schedule_unbind(self: &Arc<Self>, system: &SystemRef) {
        let Some(peer) = self.peer_system_name().map(str::to_owned) else {
            return;
        };
        let epoch = self.epoch.load(Ordering::SeqCst);
        let grace = system.config().reconnect_grace();
        let transport = self.clone();
        let system_clone = system.clone();
        tokio::spawn(
            async move {
                tokio::time::sleep(grace).await;
                if transport.state() != TransportState::Open
                    && transport.epoch.load(Ordering::SeqCst) == epoch
                {
                    debug!("Actor system '{}' did not reconnect in time.", peer);
                    system_clone.unbind(&peer, transport.id).await;
                }
            }
            .instrument(system.span().clone()),
        );
    }
}
