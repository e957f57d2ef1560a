//! Connection handle abstraction
//!
//! The match logic only ever needs three things from a client connection:
//! send bytes, receive one chunk of bytes, and close. `Connection` captures
//! that as an object-safe trait so the registry can hold `Arc<dyn Connection>`
//! and a session can wait on both participants at once.

use std::io;
use std::net::Shutdown;
use std::sync::Arc;

use async_trait::async_trait;
use socket2::SockRef;
use tokio::net::TcpStream;
use tracing::debug;

/// Shared handle to a client connection
pub type SharedConnection = Arc<dyn Connection>;

/// Opaque bidirectional byte stream
///
/// All methods take `&self` so a connection can be shared between the
/// registry and the session that drives it. `recv` must be cancel safe:
/// dropping the future before it completes must not lose any bytes.
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Write all of `data`
    async fn send(&self, data: &[u8]) -> io::Result<()>;

    /// Read one chunk into `buf`, returning the number of bytes read
    ///
    /// `Ok(0)` means the peer closed the connection.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Shut the connection down in both directions
    fn close(&self);

    /// Peer address for logging
    fn peer_addr(&self) -> String {
        "unknown".to_string()
    }
}

#[async_trait]
impl Connection for TcpStream {
    async fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < data.len() {
            self.writable().await?;
            match self.try_write(&data[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.readable().await?;
            match self.try_read(buf) {
                Ok(n) => return Ok(n),
                // Spurious readiness
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&self) {
        if let Err(e) = SockRef::from(self).shutdown(Shutdown::Both) {
            // Already closed by the peer
            debug!("Shutdown of {} failed: {}", Connection::peer_addr(self), e);
        }
    }

    fn peer_addr(&self) -> String {
        TcpStream::peer_addr(self)
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

/// Whether a receive error means the peer went away
///
/// Anything else is treated as a failure of the wait itself.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

/// Connection doubles shared by the unit tests
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use tokio::net::TcpListener;
    use tokio::sync::{mpsc, Mutex};

    use super::*;

    /// Accepted server side and connected client side of a loopback socket
    pub async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    /// Connection whose inbound chunks are pushed by the test and whose
    /// outbound bytes are collected for inspection
    #[derive(Debug)]
    pub struct MemoryConnection {
        inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
        outbound: StdMutex<Vec<u8>>,
        closed: AtomicBool,
    }

    impl MemoryConnection {
        /// Returns the connection plus the sender feeding its `recv`
        pub fn new() -> (Arc<Self>, mpsc::UnboundedSender<Vec<u8>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let conn = Arc::new(Self {
                inbound: Mutex::new(rx),
                outbound: StdMutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            });
            (conn, tx)
        }

        pub fn sent_text(&self) -> String {
            String::from_utf8_lossy(&self.outbound.lock().unwrap()).into_owned()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connection for MemoryConnection {
        async fn send(&self, data: &[u8]) -> io::Result<()> {
            if self.is_closed() {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.outbound.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            let mut inbound = self.inbound.lock().await;
            match inbound.recv().await {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                None => Ok(0),
            }
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}
