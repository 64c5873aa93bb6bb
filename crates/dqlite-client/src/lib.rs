//! # dqlite-client: Connection layer and RPC client for dqlite nodes
//!
//! This crate talks to a single dqlite node over TCP or a Unix-domain socket
//! using the wire protocol defined in `dqlite-wire`.
//!
//! ## Layers
//!
//! - [`Client`] dials, performs the version handshake, and offers domain
//!   operations such as [`Client::dump`].
//! - [`Protocol`] owns the connection and runs one exchange at a time. The
//!   first transport error is latched and returned by every later call; the
//!   owner must discard the protocol and dial again.
//! - [`Connection`] and [`DialFunc`] abstract the socket, so tests and
//!   custom transports can be plugged in.
//!
//! There is no retry, reconnection or leader discovery here. Those belong to
//! a connection pool built on top.
//!
//! ## Usage
//!
//! ```ignore
//! use std::time::Duration;
//! use dqlite_client::{Client, ClientConfig, Context};
//!
//! // Addresses starting with '@' are Unix sockets.
//! let client = Client::new(&Context::background(), "@dqlite-node-1", ClientConfig::default())?;
//!
//! let ctx = Context::with_timeout(Duration::from_secs(30));
//! for file in client.dump(&ctx, "app.db")? {
//!     println!("{}: {} bytes", file.name, file.data.len());
//! }
//! ```

mod client;
mod connection;
mod context;
mod error;
mod protocol;

pub use client::{Client, ClientConfig, File, LivenessProbe};
pub use connection::{
    Connection, DialFunc, UNIX_ADDRESS_PREFIX, default_dial_func, select_dial, tcp_dial, unix_dial,
};
pub use context::Context;
pub use error::{ClientError, ClientResult, NoProgress, Phase};
pub use protocol::{
    DEFAULT_CONTEXT_TIMEOUT, DEFAULT_INTERRUPT_TIMEOUT, MAX_CONSECUTIVE_EMPTY_READS, Protocol,
    ShutdownSignal,
};

// Re-export useful types from dependencies
pub use dqlite_wire::{Message, PROTOCOL_VERSION_LEGACY, ServerInfo, WireError};
