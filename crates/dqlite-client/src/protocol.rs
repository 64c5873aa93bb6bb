//! Request/response exchange over a single connection.
//!
//! A [`Protocol`] owns one connection and serializes exchanges on it: the
//! node does not pipeline requests, so [`Protocol::call`] and
//! [`Protocol::interrupt`] take an instance mutex for the whole exchange.
//!
//! # Failure latching
//!
//! The first transport error observed by `call` is latched. From then on
//! every `call` and `interrupt` returns that same error without touching the
//! connection. A broken protocol is never repaired; the owner drops it and
//! dials a new connection.
//!
//! # Deadlines
//!
//! Each exchange applies the context deadline, or a default timeout, to the
//! connection before the first write. Deadlines are only observed at I/O
//! boundaries; an operation in progress is not preempted.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dqlite_wire::{HEADER_SIZE, Message, ResponseType, encode_interrupt};
use tracing::{debug, trace, warn};

use crate::connection::{Connection, write_full};
use crate::context::Context;
use crate::error::{ClientError, ClientResult, NoProgress, Phase};

/// Default deadline for [`Protocol::call`] when the context has none.
pub const DEFAULT_CONTEXT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for [`Protocol::interrupt`] when the context has none.
pub const DEFAULT_INTERRUPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive empty reads tolerated before a read fails with [`NoProgress`].
pub const MAX_CONSECUTIVE_EMPTY_READS: usize = 100;

/// Database ID carried by interrupt requests.
const INTERRUPT_DB_ID: u64 = 0;

/// Sends requests and receives responses on one connection.
#[derive(Debug)]
pub struct Protocol {
    version: u64,
    conn: Box<dyn Connection>,
    context_timeout: Duration,
    interrupt_timeout: Duration,
    /// Latched transport error. The lock also serializes exchanges.
    net_err: Mutex<Option<ClientError>>,
    shutdown: ShutdownSignal,
}

impl Protocol {
    /// Wraps a connection on which the handshake for `version` was sent.
    pub fn new(version: u64, conn: Box<dyn Connection>) -> Self {
        Self {
            version,
            conn,
            context_timeout: DEFAULT_CONTEXT_TIMEOUT,
            interrupt_timeout: DEFAULT_INTERRUPT_TIMEOUT,
            net_err: Mutex::new(None),
            shutdown: ShutdownSignal::default(),
        }
    }

    /// Sets the deadline used by `call` when the context has none.
    pub fn with_context_timeout(mut self, timeout: Duration) -> Self {
        self.context_timeout = timeout;
        self
    }

    /// Sets the deadline used by `interrupt` when the context has none.
    pub fn with_interrupt_timeout(mut self, timeout: Duration) -> Self {
        self.interrupt_timeout = timeout;
        self
    }

    /// Returns the protocol version negotiated by the handshake.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the latched transport error, if any.
    pub fn net_err(&self) -> Option<ClientError> {
        self.lock().clone()
    }

    /// Returns a signal that fires when the protocol is closed.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Sends `request` and receives one message into `response`.
    ///
    /// A transport error breaks the protocol for good.
    pub fn call(&self, ctx: &Context, request: &Message, response: &mut Message) -> ClientResult<()> {
        let mut net_err = self.lock();
        if let Some(err) = net_err.as_ref() {
            return Err(err.clone());
        }

        self.apply_deadline(ctx.deadline_or(self.context_timeout))?;

        let result = self.send(request).and_then(|()| self.recv(response));
        if let Err(err) = &result {
            if err.is_transport() {
                warn!(phase = ?err.phase(), error = %err, "connection broken, latching error");
                *net_err = Some(err.clone());
            }
        }
        result
    }

    /// Receives one more message of a multi-response stream.
    ///
    /// This takes no lock and neither checks nor updates the latched error.
    /// The caller must know that a previous [`Protocol::call`] started a
    /// stream that is still producing responses, and must not run `call` or
    /// `interrupt` on this instance concurrently.
    ///
    /// The context deadline is applied if present; otherwise the deadline of
    /// the call that started the stream stays in force.
    pub fn more(&self, ctx: &Context, response: &mut Message) -> ClientResult<()> {
        if let Some(deadline) = ctx.deadline() {
            self.apply_deadline(deadline)?;
        }
        self.recv(response)
    }

    /// Interrupts a streaming response and drains it.
    ///
    /// Sends an interrupt request, then receives and discards messages until
    /// an empty response arrives. Both messages are reset on return.
    pub fn interrupt(
        &self,
        ctx: &Context,
        request: &mut Message,
        response: &mut Message,
    ) -> ClientResult<()> {
        let net_err = self.lock();
        if let Some(err) = net_err.as_ref() {
            return Err(err.clone());
        }

        let result = self.drain(ctx, request, response);
        request.reset();
        response.reset();
        result
    }

    /// Signals shutdown and closes the connection.
    pub fn close(self) -> ClientResult<()> {
        self.shutdown.notify();
        debug!(version = self.version, "closing connection");
        self.conn
            .close()
            .map_err(|e| ClientError::Close(Arc::new(e)))
    }

    fn drain(&self, ctx: &Context, request: &mut Message, response: &mut Message) -> ClientResult<()> {
        self.apply_deadline(ctx.deadline_or(self.interrupt_timeout))?;

        request.reset();
        encode_interrupt(request, INTERRUPT_DB_ID)?;
        self.send(request)?;

        let mut discarded = 0usize;
        loop {
            self.recv(response)?;
            let mtype = response.mtype();
            response.reset();

            if mtype == u8::from(ResponseType::Empty) {
                break;
            }
            discarded += 1;
            trace!(mtype, "discarded response while draining");
        }

        debug!(discarded, "interrupt drained stream");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<ClientError>> {
        self.net_err.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_deadline(&self, deadline: Instant) -> ClientResult<()> {
        self.conn
            .set_deadline(deadline)
            .map_err(|e| ClientError::Deadline(Arc::new(e)))
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    fn send(&self, request: &Message) -> ClientResult<()> {
        write_full(self.conn.as_ref(), &request.header_bytes())
            .map_err(|e| ClientError::transport(Phase::SendHeader, e))?;

        let (primary, overflow) = request.body_parts();
        write_full(self.conn.as_ref(), primary)
            .map_err(|e| ClientError::transport(Phase::SendBody, e))?;
        if let Some(overflow) = overflow {
            write_full(self.conn.as_ref(), overflow)
                .map_err(|e| ClientError::transport(Phase::SendBody, e))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Receiving
    // ------------------------------------------------------------------

    fn recv(&self, response: &mut Message) -> ClientResult<()> {
        let mut header = [0u8; HEADER_SIZE];
        self.read_full(&mut header)
            .map_err(|e| ClientError::transport(Phase::ReceiveHeader, e))?;
        response.set_received_header(&header);

        let (primary, overflow) = response.body_buffers();
        self.read_full(primary)
            .map_err(|e| ClientError::transport(Phase::ReceiveBody, e))?;
        if let Some(overflow) = overflow {
            self.read_full(overflow)
                .map_err(|e| ClientError::transport(Phase::ReceiveBody, e))?;
        }
        Ok(())
    }

    /// Reads until `buf` is full.
    fn read_full(&self, buf: &mut [u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < buf.len() {
            offset += self.read_some(&mut buf[offset..])?;
        }
        Ok(())
    }

    /// Reads at least one byte, tolerating a bounded number of empty reads.
    fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        for _ in 0..MAX_CONSECUTIVE_EMPTY_READS {
            match self.conn.read(buf) {
                Ok(0) => {}
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::other(NoProgress {
            attempts: MAX_CONSECUTIVE_EMPTY_READS,
        }))
    }
}

/// One-shot notification that a [`Protocol`] was closed.
///
/// Background tasks tied to a connection, such as a pool's periodic liveness
/// probe, wait on this to know when to stop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    /// Returns true once the protocol has been closed.
    pub fn is_shutdown(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits up to `timeout` for shutdown. Returns true if it happened.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (closed, cvar) = &*self.inner;
        let guard = closed.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |closed| !*closed)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    fn notify(&self) {
        let (closed, cvar) = &*self.inner;
        *closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }
}
