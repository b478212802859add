// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # TCP channels
//!
//! Frames travel length-delimited over a TCP stream. The connecting side owns the reconnection:
//! when the stream drops it reports `Disconnected`, retries following its
//! [`ReconnectStrategy`] and reports `Reconnected` on success. The accepting side reports
//! `Disconnected` and ends; the peer's next connection arrives as a new channel.
//!

use crate::{
    Error,
    channel::{Channel, Link, LinkEvent},
    reconnect::ReconnectStrategy,
    system::SystemRef,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{Instrument, debug, info, warn};

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

struct TcpLink {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl Link for TcpLink {
    async fn send(&self, frame: Vec<u8>) -> Result<(), Error> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::Transport("tcp channel is disconnected".to_owned()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| Error::Transport("tcp channel is closed".to_owned()))
    }
}

/// Why a connection stopped pumping frames.
enum Ended {
    /// The stream failed or the peer closed it.
    Peer,
    /// Our side of the channel is gone.
    Local,
}

async fn pump(
    stream: TcpStream,
    outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> Ended {
    let (mut sink, mut stream) =
        Framed::new(stream, LengthDelimitedCodec::new()).split();
    loop {
        select! {
            frame = stream.next() => match frame {
                Some(Ok(bytes)) => {
                    if events.send(LinkEvent::Frame(bytes.to_vec())).is_err() {
                        return Ended::Local;
                    }
                }
                Some(Err(error)) => {
                    warn!("TCP read failed: {}", error);
                    return Ended::Peer;
                }
                None => return Ended::Peer,
            },
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(error) = sink.send(Bytes::from(frame)).await {
                        warn!("TCP write failed: {}", error);
                        return Ended::Peer;
                    }
                }
                None => return Ended::Local,
            },
        }
    }
}

fn channel(
    connected: Arc<AtomicBool>,
) -> (
    Channel,
    mpsc::UnboundedReceiver<Vec<u8>>,
    mpsc::UnboundedSender<LinkEvent>,
) {
    let (outbound, outbound_receiver) = mpsc::unbounded_channel();
    let (events, events_receiver) = mpsc::unbounded_channel();
    let link = TcpLink {
        outbound,
        connected,
    };
    (Channel::new(link, events_receiver), outbound_receiver, events)
}

/// Connects to `address` and returns the channel. Once connected, a dropped stream is retried
/// following `strategy`; when retries run out the channel ends.
pub async fn connect(
    address: &str,
    strategy: Box<dyn ReconnectStrategy>,
) -> Result<Channel, Error> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;
    debug!("Connected to {}.", address);
    let connected = Arc::new(AtomicBool::new(true));
    let (channel, outbound, events) = channel(connected.clone());
    tokio::spawn(client(
        address.to_owned(),
        stream,
        strategy,
        outbound,
        events,
        connected,
    ));
    Ok(channel)
}

async fn client(
    address: String,
    mut stream: TcpStream,
    mut strategy: Box<dyn ReconnectStrategy>,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    connected: Arc<AtomicBool>,
) {
    loop {
        if let Ended::Local = pump(stream, &mut outbound, &events).await {
            return;
        }
        connected.store(false, Ordering::SeqCst);
        if events.send(LinkEvent::Disconnected).is_err() {
            return;
        }
        // Frames queued while the stream was failing are lost with it.
        while outbound.try_recv().is_ok() {}

        stream = match reconnect(&address, strategy.as_mut()).await {
            Some(stream) => stream,
            None => {
                warn!("Giving up reconnecting to {}.", address);
                return;
            }
        };
        strategy.reset();
        connected.store(true, Ordering::SeqCst);
        if events.send(LinkEvent::Reconnected).is_err() {
            return;
        }
    }
}

async fn reconnect(
    address: &str,
    strategy: &mut dyn ReconnectStrategy,
) -> Option<TcpStream> {
    debug!("Reconnecting with strategy: {:?}", strategy);
    for attempt in 1..=strategy.max_retries() {
        if let Some(duration) = strategy.next_backoff() {
            debug!("Backoff for {:?}", &duration);
            tokio::time::sleep(duration).await;
        }
        match TcpStream::connect(address).await {
            Ok(stream) => {
                info!("Reconnected to {} at attempt {}.", address, attempt);
                return Some(stream);
            }
            Err(error) => {
                debug!("Attempt {} to reach {} failed: {}", attempt, address, error)
            }
        }
    }
    None
}

/// Accepting side of TCP channels.
pub struct Listener {
    listener: TcpListener,
}

/// Binds a listener on `address`.
pub async fn bind(address: &str) -> Result<Listener, Error> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;
    Ok(Listener { listener })
}

impl Listener {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.listener
            .local_addr()
            .map_err(|e| Error::Transport(e.to_string()))
    }

    /// Waits for the next connection and returns its channel.
    pub async fn accept(&self) -> Result<Channel, Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        debug!("Accepted connection from {}.", peer);
        let connected = Arc::new(AtomicBool::new(true));
        let (channel, mut outbound, events) = channel(connected.clone());
        tokio::spawn(async move {
            if let Ended::Peer = pump(stream, &mut outbound, &events).await {
                connected.store(false, Ordering::SeqCst);
                let _ = events.send(LinkEvent::Disconnected);
            }
        });
        Ok(channel)
    }
}

/// Accepts connections until the system stops, registering each one with `system`.
pub fn serve(system: SystemRef, listener: Listener) -> JoinHandle<()> {
    let token = system.token();
    let span = system.span().clone();
    tokio::spawn(
        async move {
            loop {
                select! {
                    _ = token.cancelled() => break,
                    channel = listener.accept() => match channel {
                        Ok(channel) => {
                            system.register(channel);
                        }
                        Err(error) => warn!("Can not accept connection: {}", error),
                    },
                }
            }
            debug!("Listener stopped.");
        }
        .instrument(span),
    )
}
