//! # dqlite-wire: Binary wire protocol for dqlite nodes
//!
//! This crate defines the message framing and codec used between a client
//! and a dqlite node. It performs no I/O; see `dqlite-client` for the
//! connection layer.
//!
//! ## Message Format
//!
//! ```text
//! ┌──────────────┬────────┬────────┬──────────┬──────────────────────┐
//! │  Word count  │  Type  │ Flags  │  Extra   │        Body          │
//! │  (4 B, LE)   │ (1 B)  │ (1 B)  │ (2 B, LE)│  (word count × 8 B)  │
//! └──────────────┴────────┴────────┴──────────┴──────────────────────┘
//! ```
//!
//! - **Integers**: little-endian 64-bit words
//! - **Strings**: nul-terminated, zero-padded to the next word
//! - **Blobs**: 64-bit length followed by the bytes, zero-padded
//!
//! ## Buffers
//!
//! A [`Message`] keeps a fixed-capacity primary buffer for the common small
//! case and spills larger bodies into an overflow buffer allocated on demand.

mod codec;
mod error;
mod header;
mod message;

pub use codec::{
    Files, RequestType, ResponseType, ServerInfo, decode_dump, decode_empty, decode_failure,
    decode_files, decode_heartbeat, decode_interrupt, decode_leader, decode_server,
    decode_servers, encode_dump, encode_empty, encode_failure, encode_files, encode_heartbeat,
    encode_interrupt, encode_leader, encode_server, encode_servers,
};
pub use error::{WireError, WireResult};
pub use header::{HEADER_SIZE, Header, PROTOCOL_VERSION_LEGACY, WORD_SIZE};
pub use message::Message;

#[cfg(test)]
mod tests;
