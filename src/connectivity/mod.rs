// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Phone/watch pairing: discovery, messaging and the per-role connectors.

pub mod connector;
pub mod discovery;
pub mod messaging;

pub use connector::{PhoneToWatchConnector, WatchToPhoneConnector};
pub use discovery::{CapabilityTransport, NodeDiscovery};
pub use messaging::{IncomingMessage, MessageTransport, MessagingClient, TransportError};
