//! RPC client for dqlite nodes.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dqlite_wire::{
    Message, PROTOCOL_VERSION_LEGACY, ServerInfo, decode_files, decode_server, decode_servers,
    encode_dump, encode_heartbeat, encode_leader,
};
use tracing::debug;

use crate::connection::{Connection, DialFunc, default_dial_func, write_full};
use crate::context::Context;
use crate::error::{ClientError, ClientResult};
use crate::protocol::{DEFAULT_CONTEXT_TIMEOUT, DEFAULT_INTERRUPT_TIMEOUT, Protocol};

/// Primary buffer size for requests.
const REQUEST_CAPACITY: usize = 16;

/// Primary buffer size for responses.
const RESPONSE_CAPACITY: usize = 512;

/// Configuration for the client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Function used to establish the network connection.
    pub dial: DialFunc,
    /// Deadline for calls whose context has none.
    pub context_timeout: Duration,
    /// Deadline for interrupts whose context has none.
    pub interrupt_timeout: Duration,
}

impl ClientConfig {
    /// Sets the dial function.
    pub fn with_dial_func(mut self, dial: DialFunc) -> Self {
        self.dial = dial;
        self
    }

    /// Sets the default call deadline.
    pub fn with_context_timeout(mut self, timeout: Duration) -> Self {
        self.context_timeout = timeout;
        self
    }

    /// Sets the default interrupt deadline.
    pub fn with_interrupt_timeout(mut self, timeout: Duration) -> Self {
        self.interrupt_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dial: default_dial_func(),
            context_timeout: DEFAULT_CONTEXT_TIMEOUT,
            interrupt_timeout: DEFAULT_INTERRUPT_TIMEOUT,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("context_timeout", &self.context_timeout)
            .field("interrupt_timeout", &self.interrupt_timeout)
            .finish_non_exhaustive()
    }
}

/// Content of a single database file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// File name.
    pub name: String,
    /// File content.
    pub data: Bytes,
}

/// Periodic liveness check a connection pool can run against a node.
///
/// The client does not probe on its own; whoever owns the connection decides
/// when to probe and what to do with the membership it learns.
pub trait LivenessProbe {
    /// Sends one heartbeat and returns the cluster members reported back.
    fn probe(&self, ctx: &Context) -> ClientResult<Vec<ServerInfo>>;
}

/// RPC client for a dqlite node.
///
/// # Example
///
/// ```ignore
/// use dqlite_client::{Client, ClientConfig, Context};
///
/// let client = Client::new(&Context::background(), "127.0.0.1:9001", ClientConfig::default())?;
///
/// // The main database file comes first, then its WAL.
/// let files = client.dump(&Context::background(), "app.db")?;
/// ```
#[derive(Debug)]
pub struct Client {
    protocol: Protocol,
}

impl Client {
    /// Connects to the node at `address` and performs the handshake.
    ///
    /// On failure the connection is closed and no client is returned.
    pub fn new(ctx: &Context, address: &str, config: ClientConfig) -> ClientResult<Self> {
        let conn = (config.dial)(ctx, address).map_err(|e| {
            debug!(address, error = %e, "dial failed");
            ClientError::dial(address, e)
        })?;
        debug!(address, "dialed");

        if let Err(err) = handshake(ctx, conn.as_ref()) {
            if let Err(close_err) = conn.close() {
                debug!(address, error = %close_err, "failed to close connection after handshake error");
            }
            return Err(err);
        }
        debug!(address, version = PROTOCOL_VERSION_LEGACY, "handshake sent");

        let protocol = Protocol::new(PROTOCOL_VERSION_LEGACY, conn)
            .with_context_timeout(config.context_timeout)
            .with_interrupt_timeout(config.interrupt_timeout);

        Ok(Self { protocol })
    }

    /// Dumps the files of the database with the given name.
    ///
    /// The main database file comes first, followed by its WAL file (named
    /// after the database with a `-wal` suffix).
    pub fn dump(&self, ctx: &Context, dbname: &str) -> ClientResult<Vec<File>> {
        let mut request = Message::with_capacity(REQUEST_CAPACITY);
        let mut response = Message::with_capacity(RESPONSE_CAPACITY);

        encode_dump(&mut request, dbname)?;
        self.protocol.call(ctx, &request, &mut response)?;

        let files = decode_files(&mut response)?
            .map(|entry| entry.map(|(name, data)| File { name, data }))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(files)
    }

    /// Returns the address of the current leader as known by the node, or
    /// `None` if the node knows of no leader.
    pub fn leader(&self, ctx: &Context) -> ClientResult<Option<String>> {
        let mut request = Message::with_capacity(REQUEST_CAPACITY);
        let mut response = Message::with_capacity(RESPONSE_CAPACITY);

        encode_leader(&mut request)?;
        self.protocol.call(ctx, &request, &mut response)?;

        let address = decode_server(&mut response)?;
        Ok((!address.is_empty()).then_some(address))
    }

    /// Returns the underlying protocol, for commands built on top of it.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Closes the connection.
    pub fn close(self) -> ClientResult<()> {
        self.protocol.close()
    }
}

impl LivenessProbe for Client {
    fn probe(&self, ctx: &Context) -> ClientResult<Vec<ServerInfo>> {
        let mut request = Message::with_capacity(REQUEST_CAPACITY);
        let mut response = Message::with_capacity(RESPONSE_CAPACITY);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        encode_heartbeat(&mut request, timestamp)?;
        self.protocol.call(ctx, &request, &mut response)?;

        Ok(decode_servers(&mut response)?)
    }
}

/// Writes the protocol version. The node sends nothing back.
fn handshake(ctx: &Context, conn: &dyn Connection) -> ClientResult<()> {
    let to_handshake_err = |e| ClientError::Handshake(Arc::new(e));

    if let Some(deadline) = ctx.deadline() {
        conn.set_deadline(deadline).map_err(to_handshake_err)?;
    }
    write_full(conn, &PROTOCOL_VERSION_LEGACY.to_le_bytes()).map_err(to_handshake_err)
}
