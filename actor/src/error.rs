// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use crate::Address;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor system.
///
/// The type is serializable because handler failures travel back to remote callers inside
/// `ReplyError` envelopes.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The destination actor or system does not exist, or has no open transport.
    #[error("Actor {0} is unreachable.")]
    Unreachable(Address),
    /// The transport owning a pending request was closed.
    #[error("Connection with actor system '{0}' was lost.")]
    Disconnected(String),
    /// The handler was cancelled before finishing.
    #[error("Handler execution was cancelled.")]
    Cancelled,
    /// The handler failed.
    #[error("Handler failed: {0}")]
    Handler(String),
    /// An actor with the same address already exists.
    #[error("Actor {0} already exists.")]
    DuplicateAddress(Address),
    /// Malformed or unexpected frame, payload or envelope.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// No reply arrived in time.
    #[error("Timed out waiting for a reply.")]
    Timeout,
    /// An error occurred while sending a message to an actor.
    #[error("An error occurred while sending a message to actor: {0}.")]
    Send(String),
    /// An error occurred while starting an actor.
    #[error("An error occurred while starting actor: {0}.")]
    Start(String),
    /// The underlying channel failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Wraps any error raised inside a handler step as a handler error.
    /// Cancellations and errors already wrapped are kept as they are.
    pub(crate) fn into_handler_error(self) -> Self {
        match self {
            Error::Cancelled | Error::Handler(_) => self,
            other => Error::Handler(other.to_string()),
        }
    }
}
