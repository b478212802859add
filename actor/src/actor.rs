// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` trait and the `ActorRef` type. The `Actor` trait is the
//! main trait that actors must implement. The `ActorRef` type is a reference to an actor that can
//! be used to send messages to him, wherever he lives.
//!

use crate::{
    Address, Error,
    envelope::{decode, encode},
    handler::Mail,
    system::SystemRef,
    task::BoxedTask,
};

use async_trait::async_trait;

use serde::{Serialize, de::DeserializeOwned};

use tokio_util::sync::CancellationToken;

use tracing::debug;

use std::{collections::VecDeque, fmt::Debug, marker::PhantomData, time::Duration};

/// Actor execution context.
///
/// The `ActorContext` is handed to handlers and hooks. It gives read access to the actor's
/// mailbox, to the message currently being processed, and to the actor system, and it is the
/// only way to request cancellation of the running handler.
///
/// The mailbox seen through the context is the queue of messages waiting behind the current
/// one. New arrivals become visible at step boundaries.
pub struct ActorContext<A: Actor + Handler<A>> {
    /// Address of this actor.
    address: Address,
    /// Reference to the actor system for routing operations.
    system: SystemRef,
    /// Pending messages, in arrival order.
    mailbox: VecDeque<Mail<A>>,
    /// Message being processed and its cancellation token.
    current: Option<Current<A>>,
}

struct Current<A: Actor> {
    message: A::Message,
    sender: Option<Address>,
    token: CancellationToken,
}

impl<A> ActorContext<A>
where
    A: Actor + Handler<A>,
{
    /// Creates a new actor context.
    pub(crate) fn new(address: Address, system: SystemRef) -> Self {
        Self {
            address,
            system,
            mailbox: VecDeque::new(),
            current: None,
        }
    }

    /// Address of this actor.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The actor system this actor lives in.
    pub fn system(&self) -> &SystemRef {
        &self.system
    }

    /// Reference to this actor.
    pub fn reference(&self) -> ActorRef<A> {
        ActorRef::new(
            self.address.clone(),
            self.system.clone(),
            Some(self.address.clone()),
        )
    }

    /// Reference to any actor, local or remote, sending as this actor.
    ///
    /// Replies to asks made through this reference come back to the caller directly; the sender
    /// address is what the receiving handler observes.
    pub fn actor_ref<B>(&self, address: Address) -> ActorRef<B>
    where
        B: Actor + Handler<B>,
    {
        ActorRef::new(address, self.system.clone(), Some(self.address.clone()))
    }

    /// Messages waiting in the mailbox, oldest first. Read only.
    pub fn mailbox(&self) -> &VecDeque<Mail<A>> {
        &self.mailbox
    }

    /// True if a message of the given type waits in the mailbox.
    pub fn has_queued(&self, message_type: &str) -> bool {
        self.mailbox
            .iter()
            .any(|mail| mail.message.message_type() == message_type)
    }

    /// Message whose handler is running, if any.
    pub fn current_message(&self) -> Option<&A::Message> {
        self.current.as_ref().map(|current| &current.message)
    }

    /// Sender of the message whose handler is running, if any.
    pub fn current_sender(&self) -> Option<&Address> {
        self.current.as_ref().and_then(|current| current.sender.as_ref())
    }

    /// Requests cancellation of the running handler. It stops before its next step and
    /// settles as cancelled. No-op when no handler is running.
    pub fn cancel_current_execution(&self) {
        if let Some(current) = &self.current {
            debug!("Cancelling current execution of {}.", self.address);
            current.token.cancel();
        }
    }

    /// True if cancellation of the running handler was requested.
    pub fn is_cancelled(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| current.token.is_cancelled())
    }

    pub(crate) fn push(&mut self, mail: Mail<A>) {
        self.mailbox.push_back(mail);
    }

    pub(crate) fn pop(&mut self) -> Option<Mail<A>> {
        self.mailbox.pop_front()
    }

    pub(crate) fn begin(
        &mut self,
        message: A::Message,
        sender: Option<Address>,
        token: CancellationToken,
    ) {
        self.current = Some(Current {
            message,
            sender,
            token,
        });
    }

    pub(crate) fn finish(&mut self) {
        self.current = None;
    }
}

/// The fundamental actor trait.
///
/// An actor is a state type with a closed set of messages (`Message`, usually an enum) and a
/// handler building one [`Task`](crate::Task) per message. The runtime guarantees that at most
/// one task of an actor runs at a time.
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// enum CounterMessage { Increment }
///
/// impl Message for CounterMessage {
///     fn message_type(&self) -> &'static str { "increment" }
/// }
///
/// #[async_trait]
/// impl Actor for Counter {
///     type Message = CounterMessage;
///     type Response = ();
/// }
/// ```
#[async_trait]
pub trait Actor: Send + Sync + Sized + 'static + Handler<Self> {
    /// The message type that this actor can receive and process.
    type Message: Message;

    /// The response type returned to asks.
    type Response: Response;

    /// Called once before the actor processes its first message. An error aborts the
    /// creation of the actor.
    async fn pre_start(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called once when the actor system stops.
    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called once per message enqueued while a handler is running, at the next step
    /// boundary of that handler. The message is already in the mailbox.
    ///
    /// Use `ctx.cancel_current_execution()` to let the new message supersede the running one.
    fn on_new_message(
        &mut self,
        _message: &Self::Message,
        _sender: Option<&Address>,
        _ctx: &mut ActorContext<Self>,
    ) {
    }
}

/// Messages accepted by an actor.
///
/// Messages travel encoded, so they are serializable. `message_type` is the tag used to
/// dispatch and to announce the message on the wire; every variant of a message enum should
/// have its own tag.
pub trait Message:
    Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static
{
    /// Tag of this message.
    fn message_type(&self) -> &'static str;
}

/// Responses returned by an actor to asks.
pub trait Response:
    Serialize + DeserializeOwned + Debug + Send + Sync + 'static
{
}

impl<T> Response for T where
    T: Serialize + DeserializeOwned + Debug + Send + Sync + 'static
{
}

/// Message dispatch.
pub trait Handler<A: Actor + Handler<A>>: Send + Sync {
    /// Builds the task processing `msg`. Called when the message reaches the head of the
    /// mailbox; the task then runs step by step.
    fn handle_message(
        &mut self,
        sender: Option<Address>,
        msg: A::Message,
        ctx: &mut ActorContext<A>,
    ) -> BoxedTask<A>;
}

/// Typed reference to an actor.
///
/// The reference holds an [`Address`] and the [`SystemRef`] that routes for it, so the same type
/// reaches local actors and actors of connected systems.
pub struct ActorRef<A>
where
    A: Actor + Handler<A>,
{
    address: Address,
    system: SystemRef,
    sender: Option<Address>,
    _phantom: PhantomData<fn() -> A>,
}

impl<A> ActorRef<A>
where
    A: Actor + Handler<A>,
{
    /// Creates a new actor reference.
    pub(crate) fn new(
        address: Address,
        system: SystemRef,
        sender: Option<Address>,
    ) -> Self {
        Self {
            address,
            system,
            sender,
            _phantom: PhantomData,
        }
    }

    /// Address of the referenced actor.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Sends a fire-and-forget message.
    ///
    /// Resolves once the message was accepted by the local mailbox or handed to the transport;
    /// it does not wait for the handler.
    pub async fn tell(&self, message: A::Message) -> Result<(), Error> {
        let payload = encode(&message)?;
        self.system
            .tell(
                &self.address,
                message.message_type(),
                payload,
                self.sender.clone(),
            )
            .await
    }

    /// Sends a request and waits for the response, with the system default timeout.
    pub async fn ask(&self, message: A::Message) -> Result<A::Response, Error> {
        let timeout = self.system.config().ask_timeout();
        self.request(message, timeout).await
    }

    /// Sends a request and waits at most `timeout` for the response.
    pub async fn ask_with_timeout(
        &self,
        message: A::Message,
        timeout: Duration,
    ) -> Result<A::Response, Error> {
        self.request(message, Some(timeout)).await
    }

    async fn request(
        &self,
        message: A::Message,
        timeout: Option<Duration>,
    ) -> Result<A::Response, Error> {
        let payload = encode(&message)?;
        let response = self
            .system
            .request(
                &self.address,
                message.message_type(),
                payload,
                self.sender.clone(),
                timeout,
            )
            .await?;
        decode(&response)
    }
}

impl<A> Clone for ActorRef<A>
where
    A: Actor + Handler<A>,
{
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            system: self.system.clone(),
            sender: self.sender.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<A> Debug for ActorRef<A>
where
    A: Actor + Handler<A>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRef")
            .field("address", &self.address)
            .finish()
    }
}
