// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Envelopes and wire frames
//!
//! An [`Envelope`] is the immutable record every message travels in, locally and across
//! transports. A [`Frame`] is what a transport actually writes on a channel: either the
//! handshake carrying the system name, or an envelope together with its destination.
//!
//! Frames and payloads are encoded with `bincode`.
//!

use crate::{Address, Error};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Delivery style of an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    /// Fire-and-forget.
    Send,
    /// Request expecting a reply.
    Ask,
    /// Successful answer to an ask.
    Reply,
    /// Failed answer to an ask. The payload is an encoded [`Error`].
    ReplyError,
}

impl Kind {
    /// True for the kinds that carry a correlation id.
    pub fn is_correlated(&self) -> bool {
        !matches!(self, Kind::Send)
    }
}

/// Immutable message record.
///
/// The correlation id is present if and only if the kind is `Ask`, `Reply` or `ReplyError`;
/// the constructors are the only way to build an envelope and they keep that invariant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    message_type: String,
    payload: Vec<u8>,
    sender: Option<Address>,
    correlation_id: Option<String>,
    kind: Kind,
}

impl Envelope {
    /// Fire-and-forget envelope.
    pub fn send(
        message_type: impl Into<String>,
        payload: Vec<u8>,
        sender: Option<Address>,
    ) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            sender,
            correlation_id: None,
            kind: Kind::Send,
        }
    }

    /// Request envelope awaiting a reply under `correlation_id`.
    pub fn ask(
        message_type: impl Into<String>,
        payload: Vec<u8>,
        sender: Option<Address>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            sender,
            correlation_id: Some(correlation_id.into()),
            kind: Kind::Ask,
        }
    }

    /// Answer to the ask identified by `correlation_id`.
    pub fn reply(
        correlation_id: impl Into<String>,
        result: Result<Vec<u8>, Error>,
        sender: Option<Address>,
    ) -> Result<Self, Error> {
        let (kind, payload) = match result {
            Ok(payload) => (Kind::Reply, payload),
            Err(error) => (Kind::ReplyError, encode(&error)?),
        };
        Ok(Self {
            message_type: String::new(),
            payload,
            sender,
            correlation_id: Some(correlation_id.into()),
            kind,
        })
    }

    /// Message type tag, used to dispatch to a handler.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Encoded message.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Address of the sending actor, if the message was sent from inside an actor.
    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    /// Correlation id of asks and replies.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Delivery style.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Interprets a `Reply` or `ReplyError` envelope as the result of the ask.
    pub fn into_reply_result(self) -> Result<Vec<u8>, Error> {
        match self.kind {
            Kind::Reply => Ok(self.payload),
            Kind::ReplyError => Err(decode::<Error>(&self.payload)?),
            kind => Err(Error::Protocol(format!(
                "envelope of kind {:?} is not a reply",
                kind
            ))),
        }
    }

    /// Checks the correlation id invariant.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.kind.is_correlated() != self.correlation_id.is_some() {
            return Err(Error::Protocol(format!(
                "envelope of kind {:?} with correlation id {:?}",
                self.kind, self.correlation_id
            )));
        }
        Ok(())
    }
}

/// Unit written on a channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// First frame after a (re)connection, naming the sending system.
    Handshake {
        /// Name of the sending actor system.
        system_name: String,
    },
    /// An envelope for an actor of the receiving system.
    Deliver {
        /// Target actor. Replies are correlated and only use it for logging.
        destination: Address,
        /// The message.
        envelope: Envelope,
    },
}

impl Frame {
    /// Encodes the frame.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        encode(self)
    }

    /// Decodes and validates a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let frame: Frame = decode(bytes)?;
        if let Frame::Deliver { envelope, .. } = &frame {
            envelope.validate()?;
        }
        Ok(frame)
    }
}

/// Encodes a payload value.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    bincode::serialize(value).map_err(|e| Error::Protocol(e.to_string()))
}

/// Decodes a payload value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    bincode::deserialize(bytes).map_err(|e| Error::Protocol(e.to_string()))
}
