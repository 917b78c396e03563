//! TCP transport over tokio.
//!
//! [`TcpTransport`] adapts a tokio `TcpStream` to the session's
//! non-blocking [`Transport`](rtls_core::Transport) contract with
//! `try_read`/`try_write`. [`TlsConnection`] drives a session over it,
//! awaiting readiness in whichever direction the session last blocked on.

use crate::{Error, Result};
use rtls_core::{
    Credentials, HandshakeStatus, IoDirection, Role, Session, SessionConfig, ShutdownMode,
};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Non-blocking byte transport on a TCP stream.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Wrap a connected stream.
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Underlying stream.
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Wait until the stream is ready in `direction`.
    pub async fn ready(&self, direction: IoDirection) -> io::Result<()> {
        match direction {
            IoDirection::Read => self.stream.readable().await,
            IoDirection::Write => self.stream.writable().await,
        }
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.try_read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A TLS session on a TCP connection.
pub struct TlsConnection {
    session: Session<TcpTransport>,
}

impl TlsConnection {
    /// Wrap a connected stream; the handshake is not started.
    pub fn new(role: Role, config: SessionConfig, credentials: Credentials, stream: TcpStream) -> Self {
        let mut session = Session::new(role, config, TcpTransport::new(stream));
        *session.credentials_mut() = credentials;
        Self { session }
    }

    /// Underlying session.
    pub fn session(&self) -> &Session<TcpTransport> {
        &self.session
    }

    /// Mutable underlying session.
    pub fn session_mut(&mut self) -> &mut Session<TcpTransport> {
        &mut self.session
    }

    // borrows only the transport across the await; the session is not Sync
    async fn wait(&mut self) -> Result<()> {
        let direction = self.session.direction();
        let transport: &TcpTransport = self.session.get_ref();
        transport.ready(direction).await?;
        Ok(())
    }

    /// Run the handshake to completion.
    ///
    /// # Errors
    /// Any fatal protocol error; warning alerts are surfaced too.
    pub async fn handshake(&mut self) -> Result<()> {
        loop {
            match self.session.continue_handshake()? {
                HandshakeStatus::Done => return Ok(()),
                HandshakeStatus::WouldBlock => self.wait().await?,
            }
        }
    }

    /// Send one record's worth of `data`, returning the bytes consumed.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize> {
        loop {
            match self.session.send(data) {
                Ok(n) => return Ok(n),
                Err(e) if e.is_transient() => self.wait().await?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send all of `data`.
    pub async fn send_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = self.send(data).await?;
            data = &data[n..];
        }
        Ok(())
    }

    /// Receive application data; `0` means the peer closed.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.session.recv(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.is_transient() => self.wait().await?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Close the session.
    pub async fn shutdown(&mut self, mode: ShutdownMode) -> Result<()> {
        loop {
            match self.session.shutdown(mode) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => self.wait().await?,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// TCP endpoint producing handshaken [`TlsConnection`]s.
///
/// # Example
///
/// ```no_run
/// use rtls_core::{Credentials, SessionConfig};
/// use rtls_transport::tcp::TcpEndpoint;
///
/// # async fn run(creds: Credentials) -> rtls_transport::Result<()> {
/// let server = TcpEndpoint::server("127.0.0.1:4433", SessionConfig::default(), creds).await?;
/// let mut conn = server.accept().await?;
/// conn.send_all(b"hello").await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpEndpoint {
    listener: Option<TcpListener>,
    config: SessionConfig,
    credentials: Credentials,
}

impl TcpEndpoint {
    /// Client endpoint.
    pub fn client(config: SessionConfig, credentials: Credentials) -> Self {
        Self {
            listener: None,
            config,
            credentials,
        }
    }

    /// Server endpoint bound to `addr`.
    ///
    /// # Errors
    /// `ConnectionFailed` for a bad address or a failed bind.
    pub async fn server(addr: &str, config: SessionConfig, credentials: Credentials) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::ConnectionFailed(format!("Invalid address: {}", e)))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::ConnectionFailed(format!("Server bind failed: {}", e)))?;
        tracing::debug!("TCP: listening on {}", addr);
        Ok(Self {
            listener: Some(listener),
            config,
            credentials,
        })
    }

    /// Bound address (server only).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .as_ref()
            .ok_or_else(|| Error::ConnectionFailed("Client has no local address".into()))?
            .local_addr()
            .map_err(Error::Io)
    }

    /// Connect and run the client handshake.
    pub async fn connect(&self, addr: &str) -> Result<TlsConnection> {
        if self.listener.is_some() {
            return Err(Error::ConnectionFailed("Only client can connect".into()));
        }
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::ConnectionFailed(format!("Connect to {} failed: {}", addr, e)))?;
        tracing::debug!("TCP: connected to {}", addr);
        self.start(Role::Client, stream).await
    }

    /// Accept one connection and run the server handshake.
    pub async fn accept(&self) -> Result<TlsConnection> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| Error::ConnectionFailed("Only server can accept".into()))?;
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| Error::ConnectionFailed(format!("TCP accept failed: {}", e)))?;
        tracing::debug!("TCP: accepted {}", peer);
        self.start(Role::Server, stream).await
    }

    async fn start(&self, role: Role, stream: TcpStream) -> Result<TlsConnection> {
        stream.set_nodelay(true)?;
        let mut conn = TlsConnection::new(role, self.config.clone(), self.credentials.clone(), stream);
        conn.handshake().await?;
        Ok(conn)
    }
}
