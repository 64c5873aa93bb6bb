//! Network connections and dial functions.
//!
//! A [`Connection`] is a byte stream with deadline support whose operations
//! take `&self`, like the standard library's socket types (`&TcpStream`
//! implements `Read` and `Write`). This lets one reader continue a stream
//! while the owner of the connection holds no lock.
//!
//! Addresses starting with [`UNIX_ADDRESS_PREFIX`] are Unix-domain sockets
//! (abstract namespace on Linux); everything else is dialed over TCP.

use std::fmt::Debug;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::Context;

/// Address prefix selecting a Unix-domain socket.
pub const UNIX_ADDRESS_PREFIX: char = '@';

/// A bidirectional byte stream to a node.
pub trait Connection: Debug + Send + Sync {
    /// Reads into `buf`, returning the number of bytes read.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes from `buf`, returning the number of bytes written.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Bounds all subsequent reads and writes by `deadline`.
    fn set_deadline(&self, deadline: Instant) -> io::Result<()>;

    /// Shuts the connection down in both directions.
    fn close(&self) -> io::Result<()>;
}

/// Function establishing a connection to an address.
pub type DialFunc = Arc<dyn Fn(&Context, &str) -> io::Result<Box<dyn Connection>> + Send + Sync>;

/// Returns the dial function used when none is configured.
pub fn default_dial_func() -> DialFunc {
    select_dial(unix_dial, tcp_dial)
}

/// Builds a dial function routing `@`-prefixed addresses to `unix` and all
/// others to `tcp`.
pub fn select_dial<U, T>(unix: U, tcp: T) -> DialFunc
where
    U: Fn(&Context, &str) -> io::Result<Box<dyn Connection>> + Send + Sync + 'static,
    T: Fn(&Context, &str) -> io::Result<Box<dyn Connection>> + Send + Sync + 'static,
{
    Arc::new(move |ctx: &Context, address: &str| {
        if address.starts_with(UNIX_ADDRESS_PREFIX) {
            unix(ctx, address)
        } else {
            tcp(ctx, address)
        }
    })
}

/// Dials a TCP address, using the context deadline as connect timeout.
pub fn tcp_dial(ctx: &Context, address: &str) -> io::Result<Box<dyn Connection>> {
    let mut last_err = None;

    for addr in address.to_socket_addrs()? {
        let result = match ctx.deadline() {
            Some(deadline) => TcpStream::connect_timeout(&addr, remaining(deadline)?),
            None => TcpStream::connect(addr),
        };

        match result {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(Box::new(stream));
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("could not resolve address {address}"),
        )
    }))
}

/// Dials a Unix-domain socket.
///
/// On Linux, `@name` refers to `name` in the abstract socket namespace.
#[cfg(unix)]
pub fn unix_dial(_ctx: &Context, address: &str) -> io::Result<Box<dyn Connection>> {
    Ok(Box::new(connect_unix(address)?))
}

#[cfg(target_os = "linux")]
fn connect_unix(address: &str) -> io::Result<UnixStream> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::SocketAddr;

    match address.strip_prefix(UNIX_ADDRESS_PREFIX) {
        Some(name) => UnixStream::connect_addr(&SocketAddr::from_abstract_name(name.as_bytes())?),
        None => UnixStream::connect(address),
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn connect_unix(address: &str) -> io::Result<UnixStream> {
    UnixStream::connect(address)
}

/// Dials a Unix-domain socket.
#[cfg(not(unix))]
pub fn unix_dial(_ctx: &Context, address: &str) -> io::Result<Box<dyn Connection>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("unix sockets are not supported on this platform: {address}"),
    ))
}

/// Returns the time left until `deadline`, failing if it has passed.
pub(crate) fn remaining(deadline: Instant) -> io::Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
    }
    Ok(left)
}

impl Connection for TcpStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        eof_as_error(Read::read(&mut &*self, buf)?, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self, buf)
    }

    fn set_deadline(&self, deadline: Instant) -> io::Result<()> {
        let timeout = remaining(deadline)?;
        self.set_read_timeout(Some(timeout))?;
        self.set_write_timeout(Some(timeout))
    }

    fn close(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

#[cfg(unix)]
impl Connection for UnixStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        eof_as_error(Read::read(&mut &*self, buf)?, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self, buf)
    }

    fn set_deadline(&self, deadline: Instant) -> io::Result<()> {
        let timeout = remaining(deadline)?;
        self.set_read_timeout(Some(timeout))?;
        self.set_write_timeout(Some(timeout))
    }

    fn close(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Socket reads return 0 only at end of stream.
fn eof_as_error(n: usize, buf: &[u8]) -> io::Result<usize> {
    if n == 0 && !buf.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        ));
    }
    Ok(n)
}

/// Writes all of `buf`, failing on a zero-length write.
pub(crate) fn write_full(conn: &dyn Connection, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match conn.write(buf) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "short write")),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod connection_tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug)]
    struct NullConnection;

    impl Connection for NullConnection {
        fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn set_deadline(&self, _deadline: Instant) -> io::Result<()> {
            Ok(())
        }

        fn close(&self) -> io::Result<()> {
            Ok(())
        }
    }

    fn recording(
        label: &'static str,
        calls: Arc<Mutex<Vec<(&'static str, String)>>>,
    ) -> impl Fn(&Context, &str) -> io::Result<Box<dyn Connection>> + Send + Sync + 'static {
        move |_ctx: &Context, address: &str| -> io::Result<Box<dyn Connection>> {
            calls.lock().unwrap().push((label, address.to_string()));
            Ok(Box::new(NullConnection))
        }
    }

    #[test]
    fn test_dial_selection() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dial = select_dial(
            recording("unix", Arc::clone(&calls)),
            recording("tcp", Arc::clone(&calls)),
        );

        let ctx = Context::background();
        dial(&ctx, "@mysocket").unwrap();
        dial(&ctx, "127.0.0.1:9000").unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ("unix", "@mysocket".to_string()),
                ("tcp", "127.0.0.1:9000".to_string()),
            ]
        );
    }

    #[test]
    fn test_remaining_rejects_past_deadline() {
        let past = Instant::now() - Duration::from_millis(1);
        let err = remaining(past).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        let future = Instant::now() + Duration::from_secs(10);
        assert!(remaining(future).unwrap() > Duration::from_secs(9));
    }

    #[test]
    fn test_tcp_read_after_peer_hang_up() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let conn = tcp_dial(&Context::with_timeout(Duration::from_secs(5)), &address).unwrap();
        drop(listener.accept().unwrap());

        let mut buf = [0u8; 8];
        let err = conn.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(conn.read(&mut []).unwrap(), 0);
    }

    #[test]
    fn test_tcp_dial_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let ctx = Context::with_timeout(Duration::from_secs(1));
        assert!(tcp_dial(&ctx, &format!("127.0.0.1:{port}")).is_err());
    }
}
