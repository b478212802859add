// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

use crate::{
    Address, Error,
    actor::{Actor, Message},
    envelope::{Envelope, Kind, decode},
};

use tokio::sync::{mpsc, oneshot};

use tracing::debug;

/// Where the outcome of a handler goes once it settles.
pub(crate) enum ReplyTo {
    /// Fire-and-forget: nobody waits for the outcome.
    Nobody,
    /// A caller of this same system, waiting on a oneshot channel.
    Local(oneshot::Sender<Result<Vec<u8>, Error>>),
    /// A caller on another system, answered with a reply envelope.
    Remote {
        /// Address the reply is routed to.
        reply_to: Address,
        /// Correlation id of the ask.
        correlation_id: String,
    },
}

/// A message sitting in an actor's mailbox.
pub struct Mail<A: Actor> {
    pub(crate) message: A::Message,
    pub(crate) sender: Option<Address>,
    pub(crate) reply: ReplyTo,
}

impl<A: Actor> Mail<A> {
    /// The queued message.
    pub fn message(&self) -> &A::Message {
        &self.message
    }

    /// The sender of the queued message, if any.
    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }
}

/// Mailbox receiver side, owned by the actor runner.
pub(crate) type MailboxReceiver<A> = mpsc::UnboundedReceiver<Mail<A>>;

/// Mailbox sender side.
pub(crate) type MailboxSender<A> = mpsc::UnboundedSender<Mail<A>>;

/// Complete mailbox tuple containing both sender and receiver sides.
pub(crate) type Mailbox<A> = (MailboxSender<A>, MailboxReceiver<A>);

/// Creates a new unbounded mailbox for an actor.
/// Enqueueing never blocks, so a `send` resolves as soon as the message is accepted.
pub(crate) fn mailbox<A: Actor>() -> Mailbox<A> {
    mpsc::unbounded_channel()
}

/// Type-erased entry point of a local actor, stored in the system registry.
pub(crate) trait Deliver: Send + Sync {
    /// Decodes the envelope and appends it to the mailbox.
    fn deliver(&self, envelope: Envelope, reply: ReplyTo) -> Result<(), Error>;

    /// True once the actor stopped.
    fn is_closed(&self) -> bool;
}

/// Handle helper for sending messages to an actor.
/// Wraps the mailbox sender and turns envelopes into typed mail.
pub(crate) struct HandleHelper<A: Actor> {
    /// Address of the actor, for error reporting.
    address: Address,
    /// The underlying mailbox sender for this actor.
    sender: MailboxSender<A>,
}

impl<A: Actor> HandleHelper<A> {
    /// Creates a new handle helper from a mailbox sender.
    pub(crate) fn new(address: Address, sender: MailboxSender<A>) -> Self {
        debug!("Creating new handle reference for {}.", address);
        Self { address, sender }
    }
}

impl<A: Actor> Deliver for HandleHelper<A> {
    fn deliver(&self, envelope: Envelope, reply: ReplyTo) -> Result<(), Error> {
        if !matches!(envelope.kind(), Kind::Send | Kind::Ask) {
            return Err(Error::Protocol(format!(
                "{:?} envelopes can not be enqueued",
                envelope.kind()
            )));
        }
        let message: A::Message = decode(envelope.payload())?;
        if message.message_type() != envelope.message_type() {
            return Err(Error::Protocol(format!(
                "payload of type '{}' announced as '{}'",
                message.message_type(),
                envelope.message_type()
            )));
        }
        let mail = Mail {
            message,
            sender: envelope.sender().cloned(),
            reply,
        };
        if self.sender.send(mail).is_err() {
            debug!("Failed to enqueue message for {}.", self.address);
            return Err(Error::Send(self.address.to_string()));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<A: Actor> Clone for HandleHelper<A> {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            sender: self.sender.clone(),
        }
    }
}
