// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the `ActorSystem` type. An actor system is a named registry of
//! local actors plus the transports connecting it with peer systems. It routes every envelope:
//! to a local mailbox when the destination lives here, through the transport bound to the
//! destination's system otherwise. It also keeps the table of asks waiting for a remote reply.
//!

use crate::{
    Actor, ActorRef, Address, Config, Error, Handler,
    channel::Channel,
    envelope::{Envelope, Frame, Kind},
    handler::{Deliver, ReplyTo},
    runner::ActorRunner,
    transport::Transport,
};

use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use tracing::{Instrument, Span, debug, error, info, info_span, warn};
use uuid::Uuid;

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

/// Actor system.
///
pub struct ActorSystem {}

/// Default implementation for `ActorSystem`.
impl ActorSystem {
    /// Create a new actor system.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the system. Peers address its actors as `local@name`.
    /// * `config` - System settings.
    /// * `token` - Cancelling it stops the system.
    ///
    /// # Returns
    ///
    /// Returns a tuple with the system reference and the system runner.
    pub fn create(
        name: &str,
        config: Config,
        token: CancellationToken,
    ) -> (SystemRef, SystemRunner) {
        let (event_sender, event_receiver) =
            mpsc::channel(config.event_buffer.max(1));
        let system = SystemRef::new(name, config, event_sender, token);
        let runner = SystemRunner::new(event_receiver);
        (system, runner)
    }
}

/// System event.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// A peer system completed its handshake.
    PeerConnected(String),
    /// The transport of a peer system went down.
    PeerDisconnected(String),
    /// Stop the actor system.
    StopSystem,
}

/// An ask waiting for its remote reply.
struct PendingAsk {
    sender: oneshot::Sender<Result<Vec<u8>, Error>>,
    /// Transport the ask left through.
    transport: u64,
}

/// System reference.
///
#[derive(Clone)]
pub struct SystemRef {
    name: Arc<str>,

    config: Arc<Config>,

    /// The actors running in this actor system, by local address.
    actors: Arc<RwLock<HashMap<String, Arc<dyn Deliver>>>>,

    /// Transports bound to peer systems, by peer name.
    remotes: Arc<RwLock<HashMap<String, Arc<Transport>>>>,

    /// Asks waiting for a remote reply, by correlation id.
    pending: Arc<Mutex<HashMap<String, PendingAsk>>>,

    event_sender: mpsc::Sender<SystemEvent>,

    token: CancellationToken,

    span: Span,
}

impl SystemRef {
    /// Create system reference.
    fn new(
        name: &str,
        config: Config,
        event_sender: mpsc::Sender<SystemEvent>,
        token: CancellationToken,
    ) -> Self {
        let span = info_span!("actor_system", name = %name);
        let system = SystemRef {
            name: Arc::from(name),
            config: Arc::new(config),
            actors: Arc::new(RwLock::new(HashMap::new())),
            remotes: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            event_sender,
            token,
            span,
        };

        let stopping = system.clone();
        tokio::spawn(
            async move {
                stopping.token.cancelled().await;
                debug!("Stopping actor system...");
                stopping.shutdown().await;
            }
            .instrument(system.span.clone()),
        );

        system
    }

    /// Name of this system.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings of this system.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cancellation token of this system.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Creates an actor in this actor system under `local_address`.
    ///
    /// Resolves once the actor's `pre_start` hook succeeded.
    ///
    /// # Error
    ///
    /// Returns `Error::DuplicateAddress` if the address is taken, and `Error::Start` if the
    /// actor failed to start.
    ///
    pub async fn create_actor<A>(
        &self,
        local_address: &str,
        actor: A,
    ) -> Result<ActorRef<A>, Error>
    where
        A: Actor + Handler<A>,
    {
        let address = Address::new(self.name(), local_address);
        let (runner, helper) = ActorRunner::create(address.clone(), actor);
        {
            let mut actors = self.actors.write().await;
            if actors.contains_key(local_address) {
                error!("Actor '{}' already exists!", &address);
                return Err(Error::DuplicateAddress(address));
            }
            actors.insert(local_address.to_owned(), Arc::new(helper));
        }

        let (sender, receiver) = oneshot::channel();
        tokio::spawn(
            runner
                .init(self.clone(), sender)
                .instrument(self.span.clone()),
        );

        match receiver.await {
            Ok(Ok(())) => Ok(ActorRef::new(address, self.clone(), None)),
            Ok(Err(error)) => {
                self.remove_actor(local_address).await;
                Err(error)
            }
            Err(_) => {
                self.remove_actor(local_address).await;
                Err(Error::Start(format!("Runner can not init {}", address)))
            }
        }
    }

    /// Remove an actor from this actor system.
    /// If the actor does not exist, nothing happens.
    pub(crate) async fn remove_actor(&self, local_address: &str) {
        let mut actors = self.actors.write().await;
        actors.remove(local_address);
    }

    /// True if a live actor is registered under `local_address`.
    pub async fn contains_actor(&self, local_address: &str) -> bool {
        let actors = self.actors.read().await;
        actors
            .get(local_address)
            .is_some_and(|actor| !actor.is_closed())
    }

    /// Typed reference to the actor at `address`, local or remote. Nothing is checked until
    /// a message is routed.
    pub fn actor_ref<A>(&self, address: Address) -> ActorRef<A>
    where
        A: Actor + Handler<A>,
    {
        ActorRef::new(address, self.clone(), None)
    }

    /// Sends an encoded fire-and-forget message.
    ///
    /// Resolves once a local mailbox accepted it or the transport wrote it.
    ///
    /// # Error
    ///
    /// `Error::Unreachable` if the destination actor or its system is unknown, or the
    /// transport to it is not open.
    pub async fn tell(
        &self,
        destination: &Address,
        message_type: &str,
        payload: Vec<u8>,
        sender: Option<Address>,
    ) -> Result<(), Error> {
        debug!("Sending '{}' to {}.", message_type, destination);
        self.route(destination, Envelope::send(message_type, payload, sender))
            .await
    }

    /// Sends an encoded request and waits for the encoded response, with the default timeout.
    pub async fn ask(
        &self,
        destination: &Address,
        message_type: &str,
        payload: Vec<u8>,
        sender: Option<Address>,
    ) -> Result<Vec<u8>, Error> {
        self.request(
            destination,
            message_type,
            payload,
            sender,
            self.config.ask_timeout(),
        )
        .await
    }

    /// Sends an encoded request and waits at most `timeout` for the encoded response.
    pub async fn ask_with_timeout(
        &self,
        destination: &Address,
        message_type: &str,
        payload: Vec<u8>,
        sender: Option<Address>,
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        self.request(destination, message_type, payload, sender, Some(timeout))
            .await
    }

    pub(crate) async fn request(
        &self,
        destination: &Address,
        message_type: &str,
        payload: Vec<u8>,
        sender: Option<Address>,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, Error> {
        let correlation_id = Uuid::new_v4().to_string();
        debug!(
            "Asking '{}' to {} ({}).",
            message_type, destination, correlation_id
        );
        let envelope = Envelope::ask(
            message_type,
            payload,
            sender,
            correlation_id.clone(),
        );
        let (reply_sender, reply_receiver) = oneshot::channel();

        if destination.is_local_to(&self.name) {
            self.deliver_local(
                destination,
                envelope,
                ReplyTo::Local(reply_sender),
            )
            .await?;
            let reply = async {
                match reply_receiver.await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Send(destination.to_string())),
                }
            };
            return with_timeout(timeout, reply).await;
        }

        let transport = self.open_transport(destination).await?;
        let peer = destination.system_name().to_owned();
        self.pending.lock().await.insert(
            correlation_id.clone(),
            PendingAsk {
                sender: reply_sender,
                transport: transport.id(),
            },
        );
        // The transport may have closed between the lookup and the insertion, after its
        // pending asks were failed.
        if !transport.is_open() {
            self.pending.lock().await.remove(&correlation_id);
            return Err(Error::Disconnected(peer));
        }
        let frame = Frame::Deliver {
            destination: destination.clone(),
            envelope,
        };
        // The link may drop before the transport task sees the disconnection.
        if let Err(error) = transport.send(&frame).await {
            debug!("Ask {} to {} not sent: {}", correlation_id, destination, error);
            self.pending.lock().await.remove(&correlation_id);
            return Err(Error::Disconnected(peer));
        }

        let reply = async {
            match reply_receiver.await {
                Ok(result) => result,
                Err(_) => Err(Error::Disconnected(peer.clone())),
            }
        };
        let result = with_timeout(timeout, reply).await;
        if matches!(result, Err(Error::Timeout))
            && self.pending.lock().await.remove(&correlation_id).is_some()
        {
            debug!("Ask {} to {} timed out.", correlation_id, destination);
        }
        result
    }

    /// Routes an envelope that expects no reply.
    async fn route(
        &self,
        destination: &Address,
        envelope: Envelope,
    ) -> Result<(), Error> {
        if destination.is_local_to(&self.name) {
            return self
                .deliver_local(destination, envelope, ReplyTo::Nobody)
                .await;
        }
        let transport = self.open_transport(destination).await?;
        transport
            .send(&Frame::Deliver {
                destination: destination.clone(),
                envelope,
            })
            .await
            .map_err(|error| {
                debug!("Envelope to {} not sent: {}", destination, error);
                Error::Unreachable(destination.clone())
            })
    }

    async fn deliver_local(
        &self,
        destination: &Address,
        envelope: Envelope,
        reply: ReplyTo,
    ) -> Result<(), Error> {
        let actor = self
            .actors
            .read()
            .await
            .get(destination.local_address())
            .cloned();
        match actor {
            Some(actor) if !actor.is_closed() => actor.deliver(envelope, reply),
            _ => {
                debug!("Actor {} not found.", destination);
                Err(Error::Unreachable(destination.clone()))
            }
        }
    }

    async fn open_transport(
        &self,
        destination: &Address,
    ) -> Result<Arc<Transport>, Error> {
        let transport = self
            .remotes
            .read()
            .await
            .get(destination.system_name())
            .cloned();
        match transport {
            Some(transport) if transport.is_open() => Ok(transport),
            _ => {
                debug!(
                    "No open transport to system '{}'.",
                    destination.system_name()
                );
                Err(Error::Unreachable(destination.clone()))
            }
        }
    }

    /// Handles a frame received from the peer of `transport`.
    pub(crate) async fn receive(&self, transport: &Transport, frame: Frame) {
        let Frame::Deliver {
            destination,
            envelope,
        } = frame
        else {
            return;
        };
        let Some(peer) = transport.peer_system_name() else {
            return;
        };

        match envelope.kind() {
            Kind::Send => {
                let result = if destination.is_local_to(&self.name) {
                    self.deliver_local(&destination, envelope, ReplyTo::Nobody)
                        .await
                } else {
                    Err(Error::Unreachable(destination.clone()))
                };
                if let Err(error) = result {
                    warn!(
                        "Dropping message from '{}' for {}: {}",
                        peer, destination, error
                    );
                }
            }
            Kind::Ask => {
                let correlation_id =
                    envelope.correlation_id().unwrap_or_default().to_owned();
                let reply_to = match envelope.sender() {
                    Some(sender) if sender.system_name() == peer => {
                        sender.clone()
                    }
                    _ => Address::new(peer, ""),
                };
                let result = if destination.is_local_to(&self.name) {
                    let reply = ReplyTo::Remote {
                        reply_to: reply_to.clone(),
                        correlation_id: correlation_id.clone(),
                    };
                    self.deliver_local(&destination, envelope, reply).await
                } else {
                    Err(Error::Unreachable(destination.clone()))
                };
                if let Err(error) = result {
                    debug!(
                        "Ask {} from '{}' rejected: {}",
                        correlation_id, peer, error
                    );
                    self.reply(&reply_to, &correlation_id, Err(error)).await;
                }
            }
            Kind::Reply | Kind::ReplyError => {
                let Some(correlation_id) =
                    envelope.correlation_id().map(str::to_owned)
                else {
                    return;
                };
                let pending = self.pending.lock().await.remove(&correlation_id);
                match pending {
                    Some(ask) => {
                        let _ = ask.sender.send(envelope.into_reply_result());
                    }
                    None => debug!("Dropping late reply {}.", correlation_id),
                }
            }
        }
    }

    /// Sends the outcome of a remote ask back to its caller.
    pub(crate) async fn reply(
        &self,
        reply_to: &Address,
        correlation_id: &str,
        result: Result<Vec<u8>, Error>,
    ) {
        let envelope = match Envelope::reply(correlation_id, result, None) {
            Ok(envelope) => envelope,
            Err(error) => {
                error!("Can not encode reply {}: {}", correlation_id, error);
                return;
            }
        };
        if let Err(error) = self.route(reply_to, envelope).await {
            warn!(
                "Can not deliver reply {} to {}: {}",
                correlation_id, reply_to, error
            );
        }
    }

    /// Rejects every ask that left through `transport` with `Error::Disconnected`.
    pub(crate) async fn fail_pending(&self, transport: u64, peer: &str) {
        let mut pending = self.pending.lock().await;
        let failed: Vec<String> = pending
            .iter()
            .filter(|(_, ask)| ask.transport == transport)
            .map(|(id, _)| id.clone())
            .collect();
        for id in failed {
            if let Some(ask) = pending.remove(&id) {
                debug!("Ask {} to '{}' lost its transport.", id, peer);
                let _ = ask.sender.send(Err(Error::Disconnected(peer.to_owned())));
            }
        }
    }

    /// Registers a channel with a peer system and starts its transport.
    ///
    /// The transport sends our handshake right away and binds itself to the peer name once the
    /// peer's handshake arrives.
    pub fn register(&self, channel: Channel) -> Arc<Transport> {
        let Channel { link, events } = channel;
        let transport = Transport::new(link);
        debug!("Registering transport {}.", transport.id());
        tokio::spawn(
            transport
                .clone()
                .run(self.clone(), events)
                .instrument(self.span.clone()),
        );
        transport
    }

    /// Transport bound to the peer system `name`, if any.
    pub async fn remote(&self, name: &str) -> Option<Arc<Transport>> {
        let remotes = self.remotes.read().await;
        remotes.get(name).cloned()
    }

    pub(crate) async fn bind(&self, peer: &str, transport: Arc<Transport>) {
        let mut remotes = self.remotes.write().await;
        if let Some(previous) = remotes.insert(peer.to_owned(), transport.clone()) {
            if previous.id() != transport.id() {
                warn!(
                    "Transport {} replaces transport {} for system '{}'.",
                    transport.id(),
                    previous.id(),
                    peer
                );
            }
        }
    }

    /// Forgets the binding of `peer`, if it still points at transport `id`.
    pub(crate) async fn unbind(&self, peer: &str, id: u64) {
        let mut remotes = self.remotes.write().await;
        if remotes.get(peer).is_some_and(|transport| transport.id() == id) {
            remotes.remove(peer);
            info!("Actor system '{}' is no longer reachable.", peer);
        }
    }

    pub(crate) fn emit(&self, event: SystemEvent) {
        if let Err(error) = self.event_sender.try_send(event) {
            debug!("System event dropped: {}", error);
        }
    }

    /// Stops the system: actors stop, transports close and pending asks fail.
    pub fn stop_system(&self) {
        self.token.cancel();
    }

    async fn shutdown(&self) {
        self.actors.write().await.clear();
        self.remotes.write().await.clear();
        let pending: Vec<(String, PendingAsk)> =
            self.pending.lock().await.drain().collect();
        for (_, ask) in pending {
            let _ = ask
                .sender
                .send(Err(Error::Disconnected(self.name.to_string())));
        }
        let _ = self.event_sender.send(SystemEvent::StopSystem).await;
    }
}

async fn with_timeout<F>(
    timeout: Option<Duration>,
    reply: F,
) -> Result<Vec<u8>, Error>
where
    F: Future<Output = Result<Vec<u8>, Error>>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, reply)
            .await
            .unwrap_or(Err(Error::Timeout)),
        None => reply.await,
    }
}

/// System runner.
pub struct SystemRunner {
    /// The event receiver.
    event_receiver: mpsc::Receiver<SystemEvent>,
}

impl SystemRunner {
    /// Create a new system runner.
    pub(crate) fn new(event_receiver: mpsc::Receiver<SystemEvent>) -> Self {
        Self { event_receiver }
    }

    /// Run the actor system until it stops, logging peer events.
    pub async fn run(&mut self) {
        debug!("Running actor system...");
        while let Some(event) = self.event_receiver.recv().await {
            match event {
                SystemEvent::PeerConnected(name) => {
                    debug!("Peer '{}' connected.", name)
                }
                SystemEvent::PeerDisconnected(name) => {
                    debug!("Peer '{}' disconnected.", name)
                }
                SystemEvent::StopSystem => {
                    debug!("Actor system stopped.");
                    break;
                }
            }
        }
    }

    /// Next system event, for callers that drive the runner themselves.
    pub async fn next_event(&mut self) -> Option<SystemEvent> {
        self.event_receiver.recv().await
    }
}
