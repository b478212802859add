// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor address
//!
//! The `address` module provides the `Address` type. An `Address` names exactly one actor in
//! exactly one named actor system, no matter whether that system runs in this process or on the
//! other side of a transport.
//!

use serde::{Deserialize, Serialize};

use std::{fmt, str::FromStr};

/// Location-transparent identity of an actor.
///
/// An address is the pair `(system_name, local_address)`. Two addresses are equal only when both
/// fields are equal. An empty `system_name` stands for "the system doing the routing", which lets
/// callers address local actors without knowing the name of their own system.
///
/// The textual form is `local_address@system_name`, or just `local_address` when the system name
/// is empty.
///
/// ```ignore
/// use actor::Address;
///
/// let remote = Address::new("server", "serverActor");
/// assert_eq!(remote.to_string(), "serverActor@server");
///
/// let local: Address = "counter".parse().unwrap();
/// assert!(local.is_local_to("whatever"));
/// ```
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    system_name: String,
    local_address: String,
}

impl Address {
    /// Creates an address of the actor `local_address` living in `system_name`.
    pub fn new(
        system_name: impl Into<String>,
        local_address: impl Into<String>,
    ) -> Self {
        Self {
            system_name: system_name.into(),
            local_address: local_address.into(),
        }
    }

    /// Creates an address without system name, resolved against the routing system.
    pub fn local(local_address: impl Into<String>) -> Self {
        Self::new(String::new(), local_address)
    }

    /// Name of the actor system the actor lives in. Empty when unspecified.
    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    /// Name of the actor inside its system.
    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    /// True if this address resolves inside the system called `system_name`.
    pub fn is_local_to(&self, system_name: &str) -> bool {
        self.system_name.is_empty() || self.system_name == system_name
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.system_name.is_empty() {
            write!(f, "{}", self.local_address)
        } else {
            write!(f, "{}@{}", self.local_address, self.system_name)
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for Address {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.rsplit_once('@') {
            Some((local, system)) => Address::new(system, local),
            None => Address::local(s),
        })
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(address) => address,
            Err(never) => match never {},
        }
    }
}
