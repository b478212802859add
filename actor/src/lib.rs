// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runtime
//!
//! A location-transparent actor runtime. Actors live in named actor systems; an actor anywhere
//! is reached through an [`Address`] made of its system name and its local name. Systems in
//! different processes are joined by transports running over channels (an in-process pair for
//! tests and embedding, TCP otherwise), and the same [`ActorRef`] API reaches local and remote
//! actors alike.
//!
//! ## Execution model
//!
//! Every actor owns a FIFO mailbox and processes at most one message at a time. A handler is
//! a [`Task`]: a sequence of explicit steps driven by the runtime. Between two steps the actor
//! is told about newly enqueued messages through [`Actor::on_new_message`] and may call
//! [`ActorContext::cancel_current_execution`]; the running task then stops before its next step
//! and its caller receives [`Error::Cancelled`]. Steps that already started always complete.
//!
//! ## Messaging
//!
//! - `tell` is fire-and-forget. It resolves once the message is accepted by the destination
//!   mailbox or written to the transport.
//! - `ask` waits for the handler's outcome. Remote asks are correlated by id; if the transport
//!   drops while waiting, the ask fails with [`Error::Disconnected`].
//!
//! ## Getting started
//!
//! ```ignore
//! use actor::{Actor, ActorContext, ActorSystem, Address, Config, Handler, Message, task};
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! enum CounterMessage { Increment, Get }
//!
//! impl Message for CounterMessage {
//!     fn message_type(&self) -> &'static str {
//!         match self { Self::Increment => "increment", Self::Get => "get" }
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Counter { value: u64 }
//!
//! #[async_trait]
//! impl Actor for Counter {
//!     type Message = CounterMessage;
//!     type Response = u64;
//! }
//!
//! impl Handler<Counter> for Counter {
//!     fn handle_message(
//!         &mut self,
//!         _sender: Option<Address>,
//!         msg: CounterMessage,
//!         _ctx: &mut ActorContext<Self>,
//!     ) -> actor::BoxedTask<Self> {
//!         if let CounterMessage::Increment = msg { self.value += 1; }
//!         task::ready(Ok(self.value))
//!     }
//! }
//!
//! let (system, mut runner) = ActorSystem::create("a", Config::default(), CancellationToken::new());
//! tokio::spawn(async move { runner.run().await });
//! let counter = system.create_actor("counter", Counter::default()).await?;
//! counter.tell(CounterMessage::Increment).await?;
//! assert_eq!(counter.ask(CounterMessage::Get).await?, 1);
//! ```
//!
//! ## Connecting systems
//!
//! ```ignore
//! let (left, right, _control) = actor::memory::pair();
//! system_a.register(left);
//! let transport = system_b.register(right);
//! transport.wait_open().await;
//! let remote: ActorRef<Counter> = system_b.actor_ref(Address::new("a", "counter"));
//! ```
//!

mod actor;
mod address;
mod channel;
mod config;
mod envelope;
mod error;
mod handler;
pub mod memory;
mod reconnect;
mod runner;
mod system;
pub mod task;
pub mod tcp;
mod transport;

//
// Core Actor Types
//

/// The fundamental actor trait: message and response types plus lifecycle hooks.
pub use actor::Actor;

/// Execution context handed to handlers, tasks and hooks.
///
/// Gives read access to the mailbox and the current message, and carries the cancellation
/// request of the running handler.
pub use actor::ActorContext;

/// Typed, location-transparent reference to an actor.
pub use actor::ActorRef;

/// Builds the task processing each message.
pub use actor::Handler;

/// Trait implemented by all messages that can be sent to actors.
pub use actor::Message;

/// Trait implemented by responses returned to asks.
pub use actor::Response;

/// A message waiting in a mailbox, as seen through [`ActorContext::mailbox`].
pub use handler::Mail;

//
// Tasks
//

pub use task::{BoxedTask, CancellableTask, Outcome, Step, Task};

//
// Addressing and Wire Format
//

/// Location of an actor: system name plus local name.
pub use address::Address;

/// Unit of communication between actors, and the frame carrying it between systems.
pub use envelope::{Envelope, Frame, Kind};

/// Payload codec used for messages and responses.
pub use envelope::{decode, encode};

//
// Error Handling
//

/// Error type for all actor system operations.
pub use error::Error;

//
// Configuration
//

/// Actor system settings.
pub use config::Config;

/// Reconnection policies for client channels.
pub use reconnect::{
    ExponentialBackoffStrategy, FixedIntervalStrategy, NoIntervalStrategy,
    ReconnectStrategy,
};

//
// Transports and Channels
//

/// Physical substrate of a transport.
pub use channel::{Channel, Link, LinkEvent, LinkEvents};

/// Connection with a peer system.
pub use transport::{Transport, TransportState};

//
// System Management
//

/// Entry point creating actor systems.
pub use system::ActorSystem;

/// System-level events: peer connections and shutdown.
pub use system::SystemEvent;

/// Reference to an actor system: actor creation, routing and transports.
pub use system::SystemRef;

/// Drives the system event loop. Execute using `runner.run().await` in a dedicated task.
pub use system::SystemRunner;
