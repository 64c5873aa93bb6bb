//! Request encoders and response decoders.
//!
//! Each encoder resets nothing: callers pass a fresh or reset [`Message`].
//! Response encoders are provided as well so that fake nodes and tests can
//! produce byte-exact responses.

use bytes::Bytes;

use crate::error::{WireError, WireResult};
use crate::message::Message;

/// Request message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestType {
    /// Ask the node for the current leader.
    Leader = 0,
    /// Liveness probe.
    Heartbeat = 2,
    /// Stop a streaming response.
    Interrupt = 10,
    /// Dump a database's files.
    Dump = 15,
}

/// Response message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseType {
    /// Request failed on the node.
    Failure = 0,
    /// Single server address.
    Server = 1,
    /// Cluster membership.
    Servers = 3,
    /// No payload; also terminates a drained stream.
    Empty = 8,
    /// Database files.
    Files = 9,
}

impl From<RequestType> for u8 {
    fn from(value: RequestType) -> Self {
        value as u8
    }
}

impl From<ResponseType> for u8 {
    fn from(value: ResponseType) -> Self {
        value as u8
    }
}

/// A cluster member as reported by a servers response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Node ID.
    pub id: u64,
    /// Node network address.
    pub address: String,
}

// ============================================================================
// Requests
// ============================================================================

/// Encodes a leader request.
pub fn encode_leader(request: &mut Message) -> WireResult<()> {
    request.put_u64(0);
    request.put_header(RequestType::Leader.into(), 0)
}

/// Encodes a heartbeat request carrying a Unix timestamp.
pub fn encode_heartbeat(request: &mut Message, timestamp: u64) -> WireResult<()> {
    request.put_u64(timestamp);
    request.put_header(RequestType::Heartbeat.into(), 0)
}

/// Encodes an interrupt request for the given database.
pub fn encode_interrupt(request: &mut Message, db_id: u64) -> WireResult<()> {
    request.put_u64(db_id);
    request.put_header(RequestType::Interrupt.into(), 0)
}

/// Encodes a dump request for the database with the given name.
pub fn encode_dump(request: &mut Message, name: &str) -> WireResult<()> {
    request.put_string(name)?;
    request.put_header(RequestType::Dump.into(), 0)
}

/// Decodes the body of a leader request, returning nothing of interest.
pub fn decode_leader(request: &mut Message) -> WireResult<()> {
    expect_type(request, RequestType::Leader.into())?;
    request.get_u64().map(drop)
}

/// Decodes a heartbeat request, returning its timestamp.
pub fn decode_heartbeat(request: &mut Message) -> WireResult<u64> {
    expect_type(request, RequestType::Heartbeat.into())?;
    request.get_u64()
}

/// Decodes an interrupt request, returning the database ID.
pub fn decode_interrupt(request: &mut Message) -> WireResult<u64> {
    expect_type(request, RequestType::Interrupt.into())?;
    request.get_u64()
}

/// Decodes a dump request, returning the database name.
pub fn decode_dump(request: &mut Message) -> WireResult<String> {
    expect_type(request, RequestType::Dump.into())?;
    request.get_string()
}

// ============================================================================
// Responses
// ============================================================================

/// Encodes a failure response.
pub fn encode_failure(response: &mut Message, code: u64, message: &str) -> WireResult<()> {
    response.put_u64(code);
    response.put_string(message)?;
    response.put_header(ResponseType::Failure.into(), 0)
}

/// Encodes a server response.
pub fn encode_server(response: &mut Message, address: &str) -> WireResult<()> {
    response.put_string(address)?;
    response.put_header(ResponseType::Server.into(), 0)
}

/// Encodes a servers response.
pub fn encode_servers(response: &mut Message, servers: &[ServerInfo]) -> WireResult<()> {
    response.put_u64(servers.len() as u64);
    for server in servers {
        response.put_u64(server.id);
        response.put_string(&server.address)?;
    }
    response.put_header(ResponseType::Servers.into(), 0)
}

/// Encodes an empty response.
pub fn encode_empty(response: &mut Message) -> WireResult<()> {
    response.put_u64(0);
    response.put_header(ResponseType::Empty.into(), 0)
}

/// Encodes a files response.
pub fn encode_files<N, D>(response: &mut Message, files: &[(N, D)]) -> WireResult<()>
where
    N: AsRef<str>,
    D: AsRef<[u8]>,
{
    response.put_u64(files.len() as u64);
    for (name, data) in files {
        response.put_string(name.as_ref())?;
        response.put_blob(data.as_ref());
    }
    response.put_header(ResponseType::Files.into(), 0)
}

/// Decodes a server response, returning the address.
pub fn decode_server(response: &mut Message) -> WireResult<String> {
    expect_response(response, ResponseType::Server)?;
    response.get_string()
}

/// Decodes a servers response.
pub fn decode_servers(response: &mut Message) -> WireResult<Vec<ServerInfo>> {
    expect_response(response, ResponseType::Servers)?;

    let count = response.get_u64()?;
    let mut servers = Vec::new();
    for _ in 0..count {
        let id = response.get_u64()?;
        let address = response.get_string()?;
        servers.push(ServerInfo { id, address });
    }
    Ok(servers)
}

/// Decodes an empty response.
pub fn decode_empty(response: &mut Message) -> WireResult<()> {
    expect_response(response, ResponseType::Empty)?;
    response.get_u64().map(drop)
}

/// Decodes a files response into a lazy iterator over `(name, data)` pairs.
///
/// Iteration stops after the announced number of files or at the first
/// empty name. The response is reset when the iterator is dropped.
pub fn decode_files(response: &mut Message) -> WireResult<Files<'_>> {
    expect_response(response, ResponseType::Files)?;
    let remaining = response.get_u64()?;
    Ok(Files {
        message: response,
        remaining,
    })
}

/// Decodes a failure response into a [`WireError::Failure`].
pub fn decode_failure(response: &mut Message) -> WireResult<WireError> {
    expect_type(response, ResponseType::Failure.into())?;
    let code = response.get_u64()?;
    let message = response.get_string()?;
    Ok(WireError::Failure { code, message })
}

/// Lazy iterator over the files of a files response.
#[derive(Debug)]
pub struct Files<'a> {
    message: &'a mut Message,
    remaining: u64,
}

impl Iterator for Files<'_> {
    type Item = WireResult<(String, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let entry = self.message.get_string().and_then(|name| {
            if name.is_empty() {
                return Ok(None);
            }
            let data = self.message.get_blob()?;
            Ok(Some((name, data)))
        });

        match entry {
            Ok(Some(file)) => Some(Ok(file)),
            Ok(None) => {
                self.remaining = 0;
                None
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

impl Drop for Files<'_> {
    fn drop(&mut self) {
        self.message.reset();
    }
}

/// Checks the response type, turning a failure response into an error.
fn expect_response(response: &mut Message, expected: ResponseType) -> WireResult<()> {
    if response.mtype() == u8::from(ResponseType::Failure) && expected != ResponseType::Failure {
        return Err(decode_failure(response)?);
    }
    expect_type(response, expected.into())
}

fn expect_type(message: &Message, expected: u8) -> WireResult<()> {
    let actual = message.mtype();
    if actual != expected {
        return Err(WireError::UnexpectedType { expected, actual });
    }
    Ok(())
}
