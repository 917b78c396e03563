//! Session management and handshake state machine.
//!
//! Implements:
//! - Full and abbreviated (resumed) handshakes for both roles
//! - Rehandshake requests, acceptance and declines
//! - Application data over the record layer
//! - Orderly shutdown with close_notify
//!
//! A session never blocks. Each handshake step records its state before any
//! transport call; when the transport reports `WouldBlock` the partial input
//! and queued output are kept and the next call resumes at the same step. A
//! send step whose message was already built (the `again` flag) only
//! flushes on resumption.

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::cache::{unix_time, ResumptionData, SessionCache};
use crate::credentials::{AuthInfo, Credentials};
use crate::extensions::{
    find_extension, parse_server_name, plaintext_limit, server_name_extension, Extension, MaxFragmentLength,
    EXT_MAX_FRAGMENT_LENGTH, EXT_SERVER_NAME,
};
use crate::handshake::{
    encode_certificate_list, encode_handshake, ClientHello, HandshakeHeader, HandshakeType, ServerHello,
    HANDSHAKE_HEADER_LEN, MAX_SESSION_ID_LEN,
};
use crate::kx::{KeyExchange, KxContext};
use crate::negotiate::{
    check_server_version, compute_offered_suites, find_pk_algorithms, negotiate_version, select_compression,
    select_suite, Priorities,
};
use crate::record::{ConnectionState, ContentType, DirectionStatus, RecordHeader, RecordLayer, RECORD_HEADER_LEN};
use crate::transcript::HandshakeTranscript;
use crate::transport::Transport;
use crate::{Error, Result};
use rtls_crypto::cipher::Direction;
use rtls_crypto::prf::{derive_key_material, derive_master_secret, MASTER_SECRET_LEN, RANDOM_LEN};
use rtls_crypto::suite::CompressionMethod;
use rtls_crypto::{CipherSuite, CryptoProvider, ProtocolVersion, RustCryptoProvider, SuiteId};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Default limit on a single handshake message body.
pub const DEFAULT_MAX_HANDSHAKE_PACKET: usize = 48 * 1024;

/// Default limit on application data buffered while a handshake runs.
pub const DEFAULT_MAX_BUFFERED_APP_DATA: usize = 64 * 1024;

/// Transport read size.
const READ_CHUNK: usize = 4096;

/// Builds a [`KxContext`] from a session's fields and binds the session's
/// key exchange, borrowing both disjointly.
macro_rules! with_kx {
    ($s:ident, |$kx:ident, $ctx:ident| $body:expr) => {{
        let $ctx = KxContext {
            version: $s.params.version,
            client_version: $s.client_version,
            client_random: &$s.params.client_random,
            server_random: &$s.params.server_random,
            credentials: &$s.credentials,
            provider: &*$s.config.provider,
        };
        let $kx = $s.kx.as_mut().ok_or(Error::InvalidState)?;
        $body
    }};
}

/// Session role (Client or Server).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client role (initiates handshake).
    Client,
    /// Server role (accepts handshake).
    Server,
}

impl Role {
    /// The other side.
    pub fn peer(self) -> Self {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

/// Whether a server asks for client certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientCertPolicy {
    /// Never send a CertificateRequest.
    #[default]
    Ignore,
    /// Ask, but accept a client without one.
    Request,
    /// Ask, and fail the handshake without one.
    Require,
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No handshake in progress.
    Initial,
    /// ClientHello.
    Hello,
    /// ServerHello.
    HelloReply,
    /// Server Certificate.
    ServerCertificate,
    /// ServerKeyExchange.
    ServerKeyExchange,
    /// CertificateRequest.
    CertificateRequest,
    /// ServerHelloDone.
    ServerHelloDone,
    /// Client Certificate.
    ClientCertificate,
    /// ClientKeyExchange.
    ClientKeyExchange,
    /// CertificateVerify.
    CertificateVerify,
    /// Sending ChangeCipherSpec.
    SendChangeCipherSpec,
    /// Sending Finished.
    SendFinished,
    /// Waiting for ChangeCipherSpec.
    RecvChangeCipherSpec,
    /// Waiting for Finished.
    RecvFinished,
    /// Server sending HelloRequest.
    HelloRequest,
    /// Handshake complete.
    Done,
}

/// Outcome of [`Session::continue_handshake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// The handshake completed.
    Done,
    /// The transport is not ready; call again later.
    WouldBlock,
}

/// Which transport direction the session last waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    /// Waiting to receive.
    Read,
    /// Waiting to send.
    Write,
}

/// How far [`Session::shutdown`] goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Send close_notify and stop writing.
    Write,
    /// Also wait for the peer's close_notify.
    Both,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Algorithm and version preferences.
    pub priorities: Priorities,
    /// Add random extra block-cipher padding (TLS only).
    pub random_padding: bool,
    /// Accept an SSLv2-compatible ClientHello (server only).
    pub allow_v2_hello: bool,
    /// Largest handshake message body accepted, in bytes.
    pub max_handshake_packet: usize,
    /// Application data held back while a rehandshake runs, in bytes.
    pub max_buffered_app_data: usize,
    /// Host name sent in the server_name extension (client only).
    pub server_name: Option<String>,
    /// Record size limit requested with max_fragment_length (client only).
    pub max_fragment_length: Option<MaxFragmentLength>,
    /// How long cached sessions stay resumable.
    pub cache_expiration: Duration,
    /// Client certificate request policy (server only).
    pub client_cert_policy: ClientCertPolicy,
    /// Cryptographic backend.
    pub provider: Arc<dyn CryptoProvider>,
    /// Server-side resumption cache.
    pub session_cache: Option<Arc<dyn SessionCache>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            priorities: Priorities::default(),
            random_padding: false,
            allow_v2_hello: true,
            max_handshake_packet: DEFAULT_MAX_HANDSHAKE_PACKET,
            max_buffered_app_data: DEFAULT_MAX_BUFFERED_APP_DATA,
            server_name: None,
            max_fragment_length: None,
            cache_expiration: Duration::from_secs(3600),
            client_cert_policy: ClientCertPolicy::Ignore,
            provider: Arc::new(RustCryptoProvider),
            session_cache: None,
        }
    }
}

/// Parameters negotiated by the last handshake.
#[derive(Clone)]
pub struct SecurityParameters {
    /// Our role.
    pub role: Role,
    /// Protocol version.
    pub version: ProtocolVersion,
    /// Cipher suite (`0x0000` before the first handshake).
    pub suite: SuiteId,
    /// Compression method.
    pub compression: CompressionMethod,
    /// Client random.
    pub client_random: [u8; RANDOM_LEN],
    /// Server random.
    pub server_random: [u8; RANDOM_LEN],
    /// Session id.
    pub session_id: Vec<u8>,
    /// Master secret.
    pub master_secret: Zeroizing<[u8; MASTER_SECRET_LEN]>,
    /// When the session was established, in UNIX seconds.
    pub timestamp: u64,
}

impl SecurityParameters {
    fn new(role: Role, version: ProtocolVersion) -> Self {
        Self {
            role,
            version,
            suite: SuiteId([0, 0]),
            compression: CompressionMethod::Null,
            client_random: [0; RANDOM_LEN],
            server_random: [0; RANDOM_LEN],
            session_id: Vec::new(),
            master_secret: Zeroizing::new([0; MASTER_SECRET_LEN]),
            timestamp: 0,
        }
    }

    /// Registry entry of the negotiated suite.
    pub fn cipher_suite(&self) -> Option<&'static CipherSuite> {
        CipherSuite::by_id(self.suite)
    }
}

impl fmt::Debug for SecurityParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityParameters")
            .field("role", &self.role)
            .field("version", &self.version)
            .field("suite", &self.suite)
            .field("compression", &self.compression)
            .field("session_id", &self.session_id)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// One TLS connection over a transport.
pub struct Session<T: Transport> {
    role: Role,
    config: SessionConfig,
    transport: T,
    record: RecordLayer,
    params: SecurityParameters,
    pending_read: Option<ConnectionState>,
    pending_write: Option<ConnectionState>,
    transcript: HandshakeTranscript,
    credentials: Credentials,
    auth_info: Option<AuthInfo>,
    kx: Option<KeyExchange>,
    state: HandshakeState,
    again: bool,
    resumed: bool,
    /// Client: session offered for resumption.
    resumption: Option<ResumptionData>,
    client_version: [u8; 2],
    offered_suites: Vec<SuiteId>,
    offered_extensions: Vec<u16>,
    server_name: Option<String>,
    fragment_length: Option<MaxFragmentLength>,
    cert_requested: bool,
    cert_acceptable: bool,
    client_cert_sent: bool,
    hello_done_seen: bool,
    initial_done: bool,
    awaiting_client_hello: bool,
    invalid: bool,
    out_buf: Vec<u8>,
    in_buf: Vec<u8>,
    hs_buf: Vec<u8>,
    app_buf: VecDeque<u8>,
    pending_send: Option<usize>,
    decline_queued: bool,
    direction: IoDirection,
    close_sent: bool,
    peer_closed: bool,
    finished: Vec<u8>,
    peer_finished: Vec<u8>,
}

impl<T: Transport> Session<T> {
    /// Create a session; the handshake starts with the first
    /// [`continue_handshake`](Self::continue_handshake).
    pub fn new(role: Role, config: SessionConfig, transport: T) -> Self {
        let version = config.priorities.max_version().unwrap_or(ProtocolVersion::Tls1_0);
        let record = RecordLayer::new(config.provider.clone(), version, config.random_padding);
        Self {
            role,
            record,
            params: SecurityParameters::new(role, version),
            config,
            transport,
            pending_read: None,
            pending_write: None,
            transcript: HandshakeTranscript::new(),
            credentials: Credentials::new(),
            auth_info: None,
            kx: None,
            state: HandshakeState::Initial,
            again: false,
            resumed: false,
            resumption: None,
            client_version: version.to_wire(),
            offered_suites: Vec::new(),
            offered_extensions: Vec::new(),
            server_name: None,
            fragment_length: None,
            cert_requested: false,
            cert_acceptable: false,
            client_cert_sent: false,
            hello_done_seen: false,
            initial_done: false,
            awaiting_client_hello: false,
            invalid: false,
            out_buf: Vec::new(),
            in_buf: Vec::new(),
            hs_buf: Vec::new(),
            app_buf: VecDeque::new(),
            pending_send: None,
            decline_queued: false,
            direction: IoDirection::Read,
            close_sent: false,
            peer_closed: false,
            finished: Vec::new(),
            peer_finished: Vec::new(),
        }
    }

    /// Host name from the server_name extension: the one sent by a client,
    /// or the one a server received in the last ClientHello.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Fragment length agreed in the last handshake, if any.
    pub fn max_fragment_length(&self) -> Option<MaxFragmentLength> {
        self.fragment_length
    }

    /// Our role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current handshake state.
    pub fn handshake_state(&self) -> HandshakeState {
        self.state
    }

    /// Whether a handshake has completed on this session.
    pub fn is_established(&self) -> bool {
        self.initial_done && !self.invalid
    }

    /// Whether the last handshake resumed a cached session.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Transport direction the last `WouldBlock` came from.
    pub fn direction(&self) -> IoDirection {
        self.direction
    }

    /// Negotiated parameters.
    pub fn security_parameters(&self) -> &SecurityParameters {
        &self.params
    }

    /// Authentication result of the last full handshake.
    pub fn auth_info(&self) -> Option<&AuthInfo> {
        self.auth_info.as_ref()
    }

    /// Session credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Mutable session credentials.
    pub fn credentials_mut(&mut self) -> &mut Credentials {
        &mut self.credentials
    }

    /// Own Finished verify data from the last handshake.
    pub fn finished(&self) -> &[u8] {
        &self.finished
    }

    /// Peer's Finished verify data from the last handshake.
    pub fn peer_finished(&self) -> &[u8] {
        &self.peer_finished
    }

    /// Underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Mutable underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Data needed to resume this session later, once established.
    pub fn resumption_data(&self) -> Option<ResumptionData> {
        if !self.initial_done || self.params.session_id.is_empty() {
            return None;
        }
        Some(ResumptionData {
            session_id: self.params.session_id.clone(),
            version: self.params.version,
            suite: self.params.suite,
            compression: self.params.compression,
            master_secret: self.params.master_secret.clone(),
            timestamp: self.params.timestamp,
        })
    }

    /// Offer `data` for resumption in the next ClientHello.
    ///
    /// # Errors
    /// `InvalidRequest` on a server.
    pub fn set_resumption_data(&mut self, data: ResumptionData) -> Result<()> {
        if self.role != Role::Client {
            return Err(Error::InvalidRequest("only clients resume sessions"));
        }
        self.resumption = Some(data);
        Ok(())
    }

    /// Drive the handshake as far as the transport allows.
    ///
    /// # Returns
    /// `Done` once the handshake completed, `WouldBlock` if the transport
    /// is not ready (see [`direction`](Self::direction)).
    ///
    /// # Errors
    /// Fatal errors invalidate the session after a best-effort alert.
    /// `WarningAlert` and `GotApplicationData` are recoverable.
    pub fn continue_handshake(&mut self) -> Result<HandshakeStatus> {
        if self.invalid {
            return Err(Error::InvalidSession);
        }
        match self.run_handshake() {
            Ok(()) => Ok(HandshakeStatus::Done),
            Err(e) if e.is_transient() => Ok(HandshakeStatus::WouldBlock),
            Err(e) => Err(self.on_error(e)),
        }
    }

    /// Ask the client for a new handshake (server only).
    ///
    /// Sends HelloRequest; the new handshake then runs through
    /// [`continue_handshake`](Self::continue_handshake).
    pub fn request_rehandshake(&mut self) -> Result<()> {
        if self.role != Role::Server {
            return Err(Error::InvalidRequest("only servers request rehandshakes"));
        }
        if self.invalid {
            return Err(Error::InvalidSession);
        }
        if !self.initial_done {
            return Err(Error::InvalidState);
        }
        match self.state {
            HandshakeState::Initial => {
                self.state = HandshakeState::HelloRequest;
                self.again = false;
            }
            HandshakeState::HelloRequest => {}
            _ => return Err(Error::InvalidState),
        }
        match self.send_step(Self::send_hello_request) {
            Ok(()) => {
                self.state = HandshakeState::Initial;
                self.awaiting_client_hello = true;
                Ok(())
            }
            Err(e) => Err(self.on_error(e)),
        }
    }

    /// Refuse a server's rehandshake request (client only).
    ///
    /// Sends a `no_renegotiation` warning.
    pub fn decline_rehandshake(&mut self) -> Result<()> {
        if self.role != Role::Client {
            return Err(Error::InvalidRequest("only clients decline rehandshakes"));
        }
        if self.invalid {
            return Err(Error::InvalidSession);
        }
        if !self.initial_done {
            return Err(Error::InvalidState);
        }
        let result = (|| {
            if !self.decline_queued {
                self.queue_alert(Alert::warning(AlertDescription::NoRenegotiation))?;
                self.decline_queued = true;
            }
            self.flush()?;
            self.decline_queued = false;
            Ok(())
        })();
        result.map_err(|e| self.on_error(e))
    }

    /// Send application data.
    ///
    /// At most one record ([`MAX_RECORD_SIZE`](crate::record::MAX_RECORD_SIZE) bytes, less after a
    /// max_fragment_length negotiation) is sent per call.
    /// After `WouldBlock` the record stays queued: call again with the same
    /// data and the queued record is flushed instead of a new one.
    ///
    /// # Returns
    /// Bytes of `data` consumed.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        if self.invalid {
            return Err(Error::InvalidSession);
        }
        if !self.initial_done {
            return Err(Error::InvalidState);
        }
        if self.close_sent {
            return Err(Error::InvalidRequest("write side is shut down"));
        }
        self.send_inner(data).map_err(|e| self.on_error(e))
    }

    /// Receive application data.
    ///
    /// # Returns
    /// Bytes written into `buf`; `0` once the peer sent close_notify.
    ///
    /// # Errors
    /// - `Rehandshake` when the peer asks for a new handshake
    /// - `WarningAlert` for a warning other than close_notify
    /// - `ShortBuffer` for an empty `buf`
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.invalid {
            return Err(Error::InvalidSession);
        }
        if !self.initial_done {
            return Err(Error::InvalidState);
        }
        if buf.is_empty() {
            return Err(Error::ShortBuffer);
        }
        self.recv_inner(buf).map_err(|e| self.on_error(e))
    }

    /// Close the connection.
    ///
    /// Calling it again after it completed is a no-op.
    pub fn shutdown(&mut self, mode: ShutdownMode) -> Result<()> {
        if self.invalid {
            return Ok(());
        }
        self.shutdown_inner(mode).map_err(|e| self.on_error(e))
    }

    fn send_inner(&mut self, data: &[u8]) -> Result<usize> {
        let n = match self.pending_send {
            Some(n) => n,
            None => {
                if data.is_empty() {
                    return Ok(0);
                }
                let n = data.len().min(self.record.max_plaintext());
                self.queue_record(ContentType::ApplicationData, &data[..n])?;
                self.pending_send = Some(n);
                n
            }
        };
        self.flush()?;
        self.pending_send = None;
        Ok(n)
    }

    fn recv_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if !self.app_buf.is_empty() {
                let n = buf.len().min(self.app_buf.len());
                for (dst, src) in buf.iter_mut().zip(self.app_buf.drain(..n)) {
                    *dst = src;
                }
                return Ok(n);
            }
            if self.peer_closed {
                return Ok(0);
            }
            match self.read_content(ContentType::ApplicationData)? {
                Some(data) => self.app_buf.extend(data),
                None => return Ok(0),
            }
        }
    }

    fn shutdown_inner(&mut self, mode: ShutdownMode) -> Result<()> {
        if !self.close_sent {
            if self.record.write_state().status() != DirectionStatus::Closed {
                self.queue_alert(Alert::warning(AlertDescription::CloseNotify))?;
            }
            self.close_sent = true;
        }
        self.flush()?;
        self.record.close_write();
        if mode == ShutdownMode::Both {
            while !self.peer_closed && self.record.read_state().status() != DirectionStatus::Closed {
                // anything still in flight is discarded
                if self.read_content(ContentType::ApplicationData)?.is_none() {
                    break;
                }
            }
            self.record.close_read();
            self.release();
        }
        Ok(())
    }

    fn release(&mut self) {
        self.transcript.reset();
        self.credentials.clear();
        self.auth_info = None;
        self.kx = None;
        self.pending_read = None;
        self.pending_write = None;
        self.hs_buf.clear();
    }

    fn on_error(&mut self, err: Error) -> Error {
        if self.awaiting_client_hello
            && matches!(
                err,
                Error::GotApplicationData | Error::WarningAlert(AlertDescription::NoRenegotiation)
            )
        {
            tracing::debug!("HSK: client declined the rehandshake");
            self.awaiting_client_hello = false;
            self.state = HandshakeState::Initial;
            self.again = false;
        }
        if err.is_fatal() {
            self.fail(&err);
        }
        err
    }

    fn fail(&mut self, err: &Error) {
        tracing::warn!("HSK: fatal error in {:?}: {}", self.state, err);
        if let Some(desc) = err.alert() {
            if self.record.write_state().status() != DirectionStatus::Closed
                && self.queue_alert(Alert::fatal(desc)).is_ok()
            {
                // best effort; the session is dead either way
                let _ = self.flush();
            }
        }
        self.record.close();
        self.invalid = true;
    }

    // ---- handshake driver ----

    fn run_handshake(&mut self) -> Result<()> {
        loop {
            let next = self.step()?;
            tracing::trace!("HSK: {:?} -> {:?}", self.state, next);
            self.state = next;
            if next == HandshakeState::Done {
                self.finish_handshake();
                self.state = HandshakeState::Initial;
                return Ok(());
            }
        }
    }

    fn step(&mut self) -> Result<HandshakeState> {
        use HandshakeState as S;
        match self.state {
            S::Initial => {
                self.begin_handshake();
                Ok(S::Hello)
            }
            S::SendChangeCipherSpec => {
                self.send_step(Self::send_change_cipher_spec)?;
                Ok(S::SendFinished)
            }
            S::SendFinished => {
                self.send_step(Self::send_finished)?;
                Ok(if self.recv_first() { S::Done } else { S::RecvChangeCipherSpec })
            }
            S::RecvChangeCipherSpec => {
                self.recv_change_cipher_spec()?;
                Ok(S::RecvFinished)
            }
            S::RecvFinished => {
                self.recv_finished()?;
                Ok(if self.recv_first() { S::SendChangeCipherSpec } else { S::Done })
            }
            S::Done => Ok(S::Done),
            state => match self.role {
                Role::Client => self.client_step(state),
                Role::Server => self.server_step(state),
            },
        }
    }

    fn client_step(&mut self, state: HandshakeState) -> Result<HandshakeState> {
        use HandshakeState as S;
        Ok(match state {
            S::Hello => {
                self.send_step(Self::send_client_hello)?;
                S::HelloReply
            }
            S::HelloReply => {
                self.recv_server_hello()?;
                if self.resumed {
                    self.final_phase()
                } else {
                    S::ServerCertificate
                }
            }
            S::ServerCertificate => {
                self.recv_server_certificate()?;
                S::ServerKeyExchange
            }
            S::ServerKeyExchange => {
                self.recv_server_key_exchange()?;
                S::CertificateRequest
            }
            S::CertificateRequest => {
                self.recv_certificate_request()?;
                S::ServerHelloDone
            }
            S::ServerHelloDone => {
                self.recv_server_hello_done()?;
                S::ClientCertificate
            }
            S::ClientCertificate => {
                self.send_step(Self::send_client_certificate)?;
                S::ClientKeyExchange
            }
            S::ClientKeyExchange => {
                self.send_step(Self::send_client_key_exchange)?;
                S::CertificateVerify
            }
            S::CertificateVerify => {
                self.send_step(Self::send_certificate_verify)?;
                self.final_phase()
            }
            _ => return Err(Error::InvalidState),
        })
    }

    fn server_step(&mut self, state: HandshakeState) -> Result<HandshakeState> {
        use HandshakeState as S;
        Ok(match state {
            S::HelloRequest => {
                self.send_step(Self::send_hello_request)?;
                self.awaiting_client_hello = true;
                S::Initial
            }
            S::Hello => {
                self.recv_client_hello()?;
                S::HelloReply
            }
            S::HelloReply => {
                self.send_step(Self::send_server_hello)?;
                if self.resumed {
                    self.final_phase()
                } else {
                    S::ServerCertificate
                }
            }
            S::ServerCertificate => {
                self.send_step(Self::send_server_certificate)?;
                S::ServerKeyExchange
            }
            S::ServerKeyExchange => {
                self.send_step(Self::send_server_key_exchange)?;
                S::CertificateRequest
            }
            S::CertificateRequest => {
                self.send_step(Self::send_certificate_request)?;
                S::ServerHelloDone
            }
            S::ServerHelloDone => {
                self.send_step(|s| s.queue_handshake(HandshakeType::ServerHelloDone, &[]))?;
                S::ClientCertificate
            }
            S::ClientCertificate => {
                self.recv_client_certificate()?;
                S::ClientKeyExchange
            }
            S::ClientKeyExchange => {
                self.recv_client_key_exchange()?;
                S::CertificateVerify
            }
            S::CertificateVerify => {
                self.recv_certificate_verify()?;
                self.final_phase()
            }
            _ => return Err(Error::InvalidState),
        })
    }

    /// Client resuming or server not resuming: receive first.
    fn recv_first(&self) -> bool {
        self.resumed == (self.role == Role::Client)
    }

    fn final_phase(&self) -> HandshakeState {
        if self.recv_first() {
            HandshakeState::RecvChangeCipherSpec
        } else {
            HandshakeState::SendChangeCipherSpec
        }
    }

    fn begin_handshake(&mut self) {
        tracing::debug!(
            "HSK: starting {} as {:?}",
            if self.initial_done { "rehandshake" } else { "handshake" },
            self.role
        );
        self.transcript.reset();
        self.kx = None;
        self.resumed = false;
        self.cert_requested = false;
        self.cert_acceptable = false;
        self.client_cert_sent = false;
        self.hello_done_seen = false;
        self.offered_suites.clear();
        self.offered_extensions.clear();
        self.pending_read = None;
        self.pending_write = None;
        self.again = false;
    }

    fn finish_handshake(&mut self) {
        self.initial_done = true;
        if self.resumed {
            if self.auth_info.is_none() {
                if let Some(suite) = self.params.cipher_suite() {
                    self.auth_info = Some(AuthInfo::new(suite.kx.credential_type(self.role == Role::Server)));
                }
            }
        } else {
            if let Some(kx) = &self.kx {
                self.auth_info = Some(kx.auth_info(self.role));
            }
            self.params.timestamp = unix_time();
            if self.role == Role::Server {
                if let (Some(cache), Some(data)) = (&self.config.session_cache, self.resumption_data()) {
                    cache.store(data);
                }
            }
        }
        self.kx = None;
        self.transcript.reset();
        self.resumption = None;
        tracing::debug!(
            "HSK: handshake complete: {} {:?} resumed={}",
            self.params.version,
            self.params.cipher_suite().map(|s| s.name),
            self.resumed
        );
    }

    /// Run `build` once, then flush; on resumption only flush.
    fn send_step(&mut self, build: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if !self.again {
            build(self)?;
            self.again = true;
        }
        self.flush()?;
        self.again = false;
        Ok(())
    }

    fn make_random(&self) -> Result<[u8; RANDOM_LEN]> {
        let mut random = [0u8; RANDOM_LEN];
        random[..4].copy_from_slice(&(unix_time() as u32).to_be_bytes());
        self.config.provider.random(&mut random[4..])?;
        Ok(random)
    }

    fn derive_pending_states(&mut self) -> Result<()> {
        let suite = self.params.cipher_suite().ok_or(Error::NoAcceptableCipherSuite)?;
        let version = self.params.version;
        let km = derive_key_material(
            version,
            suite.cipher,
            suite.mac,
            self.params.master_secret.as_slice(),
            &self.params.client_random,
            &self.params.server_random,
        )?;
        let provider = &*self.config.provider;
        let client = |dir| {
            ConnectionState::new(
                provider,
                version,
                suite.cipher,
                suite.mac,
                &km.client_key,
                &km.client_iv,
                &km.client_mac,
                dir,
            )
        };
        let server = |dir| {
            ConnectionState::new(
                provider,
                version,
                suite.cipher,
                suite.mac,
                &km.server_key,
                &km.server_iv,
                &km.server_mac,
                dir,
            )
        };
        let (read, write) = match self.role {
            Role::Client => (server(Direction::Decrypt)?, client(Direction::Encrypt)?),
            Role::Server => (client(Direction::Decrypt)?, server(Direction::Encrypt)?),
        };
        self.pending_read = Some(read);
        self.pending_write = Some(write);
        Ok(())
    }

    fn set_master_secret(&mut self, premaster: &[u8]) -> Result<()> {
        self.params.master_secret = derive_master_secret(
            self.params.version,
            premaster,
            &self.params.client_random,
            &self.params.server_random,
        )?;
        self.derive_pending_states()
    }

    fn kx_ref(&self) -> Result<&KeyExchange> {
        self.kx.as_ref().ok_or(Error::InvalidState)
    }

    // ---- client steps ----

    fn send_client_hello(&mut self) -> Result<()> {
        let max = self.config.priorities.max_version().ok_or(Error::UnsupportedVersion)?;
        let resume = self
            .resumption
            .as_ref()
            .filter(|r| self.config.priorities.supports_version(r.version));
        let (version, session_id) = match resume {
            Some(r) => (r.version, r.session_id.clone()),
            None => (max, Vec::new()),
        };
        self.client_version = version.to_wire();
        self.params.client_random = self.make_random()?;
        self.offered_suites = compute_offered_suites(version, &self.config.priorities, &self.credentials, Role::Client);
        if self.offered_suites.is_empty() {
            return Err(Error::InsufficientCredentials);
        }
        let extensions = if version >= ProtocolVersion::Tls1_0 {
            self.client_extensions()
        } else {
            Vec::new()
        };
        self.offered_extensions = extensions.iter().map(|e| e.ext_type).collect();
        let hello = ClientHello {
            version: self.client_version,
            random: self.params.client_random,
            session_id,
            cipher_suites: self.offered_suites.clone(),
            compression_methods: self.config.priorities.compression.iter().map(|c| c.to_wire()).collect(),
            extensions,
        };
        self.queue_handshake(HandshakeType::ClientHello, &hello.serialize())
    }

    fn recv_server_hello(&mut self) -> Result<()> {
        let (_, body) = self.read_handshake(&[HandshakeType::ServerHello])?;
        let hello = ServerHello::parse(&body)?;
        let version = check_server_version(hello.version, &self.config.priorities.versions)?;
        self.record.set_version(version);
        self.params.version = version;
        self.params.server_random = hello.random;
        self.process_server_extensions(&hello.extensions, version)?;

        let resumed = match &self.resumption {
            Some(r) => !hello.session_id.is_empty() && hello.session_id == r.session_id,
            None => false,
        };
        if let Some(r) = self.resumption.clone().filter(|_| resumed) {
            if r.version != version {
                return Err(Error::UnsupportedVersion);
            }
            if r.suite != hello.cipher_suite || r.compression.to_wire() != hello.compression_method {
                return Err(Error::NoAcceptableCipherSuite);
            }
            self.params.suite = r.suite;
            self.params.compression = r.compression;
            self.params.session_id = r.session_id;
            self.params.master_secret = r.master_secret;
            self.params.timestamp = r.timestamp;
            self.resumed = true;
            tracing::debug!("HSK: server resumed session");
            return self.derive_pending_states();
        }

        if !self.offered_suites.contains(&hello.cipher_suite) {
            return Err(Error::NoAcceptableCipherSuite);
        }
        let suite = CipherSuite::by_id(hello.cipher_suite)
            .filter(|s| s.is_compatible(version))
            .ok_or(Error::NoAcceptableCipherSuite)?;
        let compression = CompressionMethod::from_wire(hello.compression_method)
            .filter(|c| self.config.priorities.compression.contains(c))
            .ok_or(Error::UnknownCompression)?;
        self.params.suite = suite.id;
        self.params.compression = compression;
        self.params.session_id = hello.session_id;
        self.kx = Some(KeyExchange::new(suite.kx));
        tracing::debug!("HSK: negotiated {} with {}", version, suite.name);
        Ok(())
    }

    fn client_extensions(&mut self) -> Vec<Extension> {
        let mut extensions = Vec::new();
        self.server_name = self.config.server_name.clone();
        if let Some(host) = &self.server_name {
            extensions.push(server_name_extension(host));
        }
        if let Some(mfl) = self.config.max_fragment_length {
            extensions.push(mfl.to_extension());
        }
        extensions
    }

    /// Check the server's extensions against what was offered and apply
    /// the fragment length it agreed to.
    fn process_server_extensions(&mut self, extensions: &[Extension], version: ProtocolVersion) -> Result<()> {
        let mut mfl = None;
        if version >= ProtocolVersion::Tls1_0 {
            for ext in extensions {
                if !self.offered_extensions.contains(&ext.ext_type) {
                    return Err(Error::UnsupportedExtension(ext.ext_type));
                }
                if ext.ext_type == EXT_MAX_FRAGMENT_LENGTH {
                    let echoed = MaxFragmentLength::parse(&ext.data)?;
                    if Some(echoed) != self.config.max_fragment_length {
                        return Err(Error::IllegalParameter("max_fragment_length"));
                    }
                    mfl = Some(echoed);
                }
            }
        }
        if let Some(m) = mfl {
            tracing::debug!("HSK: records limited to {} bytes", m.limit());
        }
        self.fragment_length = mfl;
        self.record.set_max_plaintext(plaintext_limit(mfl));
        Ok(())
    }

    fn recv_server_certificate(&mut self) -> Result<()> {
        if !self.kx_ref()?.uses_certificates() {
            return Ok(());
        }
        let (_, body) = self.read_handshake(&[HandshakeType::Certificate])?;
        with_kx!(self, |kx, ctx| kx.process_server_certificate(&ctx, &body))
    }

    fn recv_server_key_exchange(&mut self) -> Result<()> {
        if !self.kx_ref()?.has_server_key_exchange() {
            return Ok(());
        }
        let (_, body) = self.read_handshake(&[HandshakeType::ServerKeyExchange])?;
        with_kx!(self, |kx, ctx| kx.process_server_key_exchange(&ctx, &body))
    }

    fn recv_certificate_request(&mut self) -> Result<()> {
        if !self.kx_ref()?.uses_certificates() {
            return Ok(());
        }
        let (ty, body) =
            self.read_handshake(&[HandshakeType::CertificateRequest, HandshakeType::ServerHelloDone])?;
        if ty == HandshakeType::ServerHelloDone {
            self.hello_done_seen = true;
            return check_empty(&body);
        }
        self.cert_acceptable = with_kx!(self, |kx, ctx| kx.process_certificate_request(&ctx, &body))?;
        self.cert_requested = true;
        Ok(())
    }

    fn recv_server_hello_done(&mut self) -> Result<()> {
        if self.hello_done_seen {
            return Ok(());
        }
        let (_, body) = self.read_handshake(&[HandshakeType::ServerHelloDone])?;
        self.hello_done_seen = true;
        check_empty(&body)
    }

    fn send_client_certificate(&mut self) -> Result<()> {
        if !self.cert_requested {
            return Ok(());
        }
        let acceptable = self.cert_acceptable;
        let has_cert = self.credentials.certificate().is_some_and(|c| c.has_certificate());
        match with_kx!(self, |kx, ctx| kx.generate_client_certificate(&ctx, acceptable))? {
            Some(body) => {
                self.client_cert_sent = acceptable && has_cert;
                self.queue_handshake(HandshakeType::Certificate, &body)
            }
            None => {
                tracing::debug!("HSK: no client certificate, sending no_certificate");
                self.queue_alert(Alert::warning(AlertDescription::NoCertificate))
            }
        }
    }

    fn send_client_key_exchange(&mut self) -> Result<()> {
        let (body, premaster) = with_kx!(self, |kx, ctx| kx.generate_client_key_exchange(&ctx))?;
        self.queue_handshake(HandshakeType::ClientKeyExchange, &body)?;
        self.set_master_secret(&premaster)
    }

    fn send_certificate_verify(&mut self) -> Result<()> {
        if !self.client_cert_sent {
            return Ok(());
        }
        let digest = self
            .transcript
            .certificate_verify_digest(self.params.version, self.params.master_secret.as_slice())?;
        if let Some(body) = with_kx!(self, |kx, ctx| kx.generate_certificate_verify(&ctx, &digest))? {
            self.queue_handshake(HandshakeType::CertificateVerify, &body)?;
        }
        Ok(())
    }

    // ---- server steps ----

    fn send_hello_request(&mut self) -> Result<()> {
        self.queue_handshake(HandshakeType::HelloRequest, &[])
    }

    fn read_client_hello(&mut self) -> Result<ClientHello> {
        if self.config.allow_v2_hello && !self.initial_done && self.hs_buf.is_empty() {
            self.fill_in(1)?;
            if self.in_buf[0] & 0x80 != 0 {
                return self.read_v2_client_hello();
            }
        }
        let (_, body) = self.read_handshake(&[HandshakeType::ClientHello])?;
        ClientHello::parse(&body)
    }

    /// SSLv2-compatible hello: two-byte header with the top bit set, then
    /// the message hashed from its type byte on.
    fn read_v2_client_hello(&mut self) -> Result<ClientHello> {
        self.fill_in(2)?;
        let len = (usize::from(self.in_buf[0] & 0x7f) << 8) | usize::from(self.in_buf[1]);
        if len > self.config.max_handshake_packet {
            return Err(Error::HandshakePacketTooLarge(len));
        }
        self.fill_in(2 + len)?;
        let body: Vec<u8> = self.in_buf.drain(..2 + len).skip(2).collect();
        self.record.skip_read_record()?;
        let hello = ClientHello::parse_v2(&body)?;
        self.transcript.update(&body);
        tracing::debug!("HSK: received SSLv2 ClientHello ({} bytes)", len);
        Ok(hello)
    }

    fn recv_client_hello(&mut self) -> Result<()> {
        let hello = self.read_client_hello()?;
        self.awaiting_client_hello = false;
        let version = negotiate_version(hello.version, &self.config.priorities.versions)?;
        self.client_version = hello.version;
        self.params.version = version;
        self.record.set_version(version);
        self.params.client_random = hello.random;
        self.params.server_random = self.make_random()?;
        self.process_client_extensions(&hello.extensions, version)?;

        if let Some(entry) = self.lookup_session(&hello, version) {
            self.params.suite = entry.suite;
            self.params.compression = entry.compression;
            self.params.session_id = entry.session_id;
            self.params.master_secret = entry.master_secret;
            self.params.timestamp = entry.timestamp;
            self.resumed = true;
            tracing::debug!("HSK: resuming cached session");
            return self.derive_pending_states();
        }

        let acceptable = compute_offered_suites(version, &self.config.priorities, &self.credentials, Role::Server);
        if acceptable.is_empty() {
            return Err(Error::InsufficientCredentials);
        }
        tracing::trace!(
            "HSK: client suites need {:?} certificates",
            find_pk_algorithms(&hello.cipher_suites)
        );
        let suite_id = select_suite(&hello.cipher_suites, &acceptable)?;
        let suite = CipherSuite::by_id(suite_id).ok_or(Error::NoAcceptableCipherSuite)?;
        let compression = select_compression(&hello.compression_methods, &self.config.priorities.compression)?;
        let mut session_id = vec![0u8; MAX_SESSION_ID_LEN];
        self.config.provider.random(&mut session_id)?;

        self.params.suite = suite.id;
        self.params.compression = compression;
        self.params.session_id = session_id;
        self.kx = Some(KeyExchange::new(suite.kx));
        tracing::debug!("HSK: negotiated {} with {}", version, suite.name);
        Ok(())
    }

    fn process_client_extensions(&mut self, extensions: &[Extension], version: ProtocolVersion) -> Result<()> {
        self.server_name = None;
        self.fragment_length = None;
        if version < ProtocolVersion::Tls1_0 {
            return Ok(());
        }
        if let Some(data) = find_extension(extensions, EXT_SERVER_NAME) {
            self.server_name = parse_server_name(data)?;
            tracing::debug!("HSK: client asked for {:?}", self.server_name);
        }
        if let Some(data) = find_extension(extensions, EXT_MAX_FRAGMENT_LENGTH) {
            self.fragment_length = Some(MaxFragmentLength::parse(data)?);
        }
        Ok(())
    }

    fn lookup_session(&self, hello: &ClientHello, version: ProtocolVersion) -> Option<ResumptionData> {
        if hello.session_id.is_empty() {
            return None;
        }
        let cache = self.config.session_cache.as_ref()?;
        let entry = cache.retrieve(&hello.session_id)?;
        if entry.is_expired(unix_time(), self.config.cache_expiration) {
            cache.remove(&hello.session_id);
            return None;
        }
        let usable = entry.version == version
            && hello.cipher_suites.contains(&entry.suite)
            && hello.compression_methods.contains(&entry.compression.to_wire());
        usable.then_some(entry)
    }

    fn send_server_hello(&mut self) -> Result<()> {
        let hello = ServerHello {
            version: self.params.version.to_wire(),
            random: self.params.server_random,
            session_id: self.params.session_id.clone(),
            cipher_suite: self.params.suite,
            compression_method: self.params.compression.to_wire(),
            extensions: self.fragment_length.map(|m| vec![m.to_extension()]).unwrap_or_default(),
        };
        self.queue_handshake(HandshakeType::ServerHello, &hello.serialize())?;
        // everything after the ServerHello honors the agreed limit
        self.record.set_max_plaintext(plaintext_limit(self.fragment_length));
        Ok(())
    }

    fn send_server_certificate(&mut self) -> Result<()> {
        if let Some(body) = with_kx!(self, |kx, ctx| kx.generate_server_certificate(&ctx))? {
            self.queue_handshake(HandshakeType::Certificate, &body)?;
        }
        Ok(())
    }

    fn send_server_key_exchange(&mut self) -> Result<()> {
        if let Some(body) = with_kx!(self, |kx, ctx| kx.generate_server_key_exchange(&ctx))? {
            self.queue_handshake(HandshakeType::ServerKeyExchange, &body)?;
        }
        Ok(())
    }

    fn send_certificate_request(&mut self) -> Result<()> {
        if self.config.client_cert_policy == ClientCertPolicy::Ignore {
            return Ok(());
        }
        if let Some(body) = with_kx!(self, |kx, ctx| kx.generate_certificate_request(&ctx))? {
            self.cert_requested = true;
            self.queue_handshake(HandshakeType::CertificateRequest, &body)?;
        }
        Ok(())
    }

    fn recv_client_certificate(&mut self) -> Result<()> {
        if !self.cert_requested {
            return Ok(());
        }
        let body = match self.read_handshake(&[HandshakeType::Certificate]) {
            Ok((_, body)) => body,
            Err(Error::WarningAlert(AlertDescription::NoCertificate)) if self.params.version.is_ssl3() => {
                tracing::debug!("HSK: client has no certificate");
                encode_certificate_list(&[])
            }
            Err(e) => return Err(e),
        };
        let policy = self.config.client_cert_policy;
        with_kx!(self, |kx, ctx| kx.process_client_certificate(&ctx, &body, policy))
    }

    fn recv_client_key_exchange(&mut self) -> Result<()> {
        let (_, body) = self.read_handshake(&[HandshakeType::ClientKeyExchange])?;
        let premaster = with_kx!(self, |kx, ctx| kx.process_client_key_exchange(&ctx, &body))?;
        self.set_master_secret(&premaster)
    }

    fn recv_certificate_verify(&mut self) -> Result<()> {
        if !self.kx_ref()?.peer_authenticated() {
            return Ok(());
        }
        // the digest covers everything before this message
        let digest = self
            .transcript
            .certificate_verify_digest(self.params.version, self.params.master_secret.as_slice())?;
        let (_, body) = self.read_handshake(&[HandshakeType::CertificateVerify])?;
        with_kx!(self, |kx, ctx| kx.process_certificate_verify(&ctx, &body, &digest))
    }

    // ---- final phase ----

    fn send_change_cipher_spec(&mut self) -> Result<()> {
        let pending = self.pending_write.take().ok_or(Error::InvalidState)?;
        self.queue_record(ContentType::ChangeCipherSpec, &[1])?;
        self.record.install_write(pending);
        tracing::debug!("HSK: sent ChangeCipherSpec");
        Ok(())
    }

    fn send_finished(&mut self) -> Result<()> {
        let data = self
            .transcript
            .finished(self.params.version, self.role, self.params.master_secret.as_slice())?;
        self.queue_handshake(HandshakeType::Finished, &data)?;
        self.finished = data;
        Ok(())
    }

    fn recv_change_cipher_spec(&mut self) -> Result<()> {
        if !self.hs_buf.is_empty() {
            return Err(Error::UnexpectedPacket);
        }
        let data = self.read_content(ContentType::ChangeCipherSpec)?.ok_or_else(closed_during_handshake)?;
        if data != [1] {
            return Err(Error::UnexpectedPacket);
        }
        let pending = self.pending_read.take().ok_or(Error::InvalidState)?;
        self.record.install_read(pending);
        tracing::debug!("HSK: received ChangeCipherSpec");
        Ok(())
    }

    fn recv_finished(&mut self) -> Result<()> {
        let expected = self.transcript.finished(
            self.params.version,
            self.role.peer(),
            self.params.master_secret.as_slice(),
        )?;
        let (_, body) = self.read_handshake(&[HandshakeType::Finished])?;
        let ok: bool = expected.as_slice().ct_eq(&body).into();
        if !ok {
            return Err(Error::FinishedMismatch);
        }
        self.peer_finished = body;
        Ok(())
    }

    // ---- record plumbing ----

    fn queue_record(&mut self, content_type: ContentType, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            let record = self.record.encrypt(content_type, data)?;
            self.out_buf.extend_from_slice(&record);
            return Ok(());
        }
        for chunk in data.chunks(self.record.max_plaintext()) {
            let record = self.record.encrypt(content_type, chunk)?;
            self.out_buf.extend_from_slice(&record);
        }
        Ok(())
    }

    fn queue_handshake(&mut self, msg_type: HandshakeType, body: &[u8]) -> Result<()> {
        let msg = encode_handshake(msg_type, body);
        if msg_type != HandshakeType::HelloRequest {
            self.transcript.update(&msg);
        }
        tracing::debug!("HSK: sending {} ({} bytes)", msg_type.name(), body.len());
        self.queue_record(ContentType::Handshake, &msg)
    }

    fn queue_alert(&mut self, alert: Alert) -> Result<()> {
        tracing::debug!("HSK: sending {:?} alert {:?}", alert.level, alert.description);
        self.queue_record(ContentType::Alert, &alert.serialize())
    }

    fn flush(&mut self) -> Result<()> {
        while !self.out_buf.is_empty() {
            self.direction = IoDirection::Write;
            let n = self.transport.send(&self.out_buf)?;
            if n == 0 {
                return Err(Error::Transport(io::Error::from(io::ErrorKind::WriteZero)));
            }
            self.out_buf.drain(..n);
        }
        Ok(())
    }

    fn fill_in(&mut self, want: usize) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        while self.in_buf.len() < want {
            self.direction = IoDirection::Read;
            let n = self.transport.recv(&mut chunk)?;
            if n == 0 {
                return Err(Error::Transport(io::Error::from(io::ErrorKind::UnexpectedEof)));
            }
            self.in_buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    fn read_record(&mut self) -> Result<(ContentType, Vec<u8>)> {
        self.fill_in(RECORD_HEADER_LEN)?;
        let header = RecordHeader::parse(&self.in_buf[..RECORD_HEADER_LEN])?;
        let total = RECORD_HEADER_LEN + header.length;
        self.fill_in(total)?;
        let fragment: Vec<u8> = self.in_buf.drain(..total).skip(RECORD_HEADER_LEN).collect();
        let data = self.record.decrypt(&header, &fragment)?;
        Ok((header.content_type, data))
    }

    /// Next record payload of type `expect`, or `None` on close_notify.
    ///
    /// Alerts surface as errors. Application data met during a rehandshake
    /// is buffered for `recv`. Handshake data met while expecting
    /// application data is a rehandshake.
    fn read_content(&mut self, expect: ContentType) -> Result<Option<Vec<u8>>> {
        loop {
            let (content_type, data) = self.read_record()?;
            match content_type {
                ContentType::Alert => {
                    let alert = Alert::parse(&data)?;
                    if alert.description == AlertDescription::CloseNotify {
                        tracing::debug!("HSK: peer sent close_notify");
                        self.peer_closed = true;
                        return Ok(None);
                    }
                    return Err(match alert.level {
                        AlertLevel::Fatal => {
                            tracing::warn!("HSK: received fatal alert {:?}", alert.description);
                            Error::FatalAlert(alert.description)
                        }
                        AlertLevel::Warning => {
                            tracing::debug!("HSK: received warning alert {:?}", alert.description);
                            Error::WarningAlert(alert.description)
                        }
                    });
                }
                ct if ct == expect => return Ok(Some(data)),
                ContentType::ApplicationData if self.initial_done => {
                    let buffered = self.app_buf.len() + data.len();
                    if buffered > self.config.max_buffered_app_data {
                        return Err(Error::AppDataBufferFull(buffered));
                    }
                    self.app_buf.extend(data);
                    if self.awaiting_client_hello {
                        return Err(Error::GotApplicationData);
                    }
                }
                ContentType::Handshake if expect == ContentType::ApplicationData => {
                    let buffered = self.hs_buf.len() + data.len();
                    if buffered > self.config.max_handshake_packet + HANDSHAKE_HEADER_LEN {
                        return Err(Error::HandshakePacketTooLarge(buffered));
                    }
                    self.hs_buf.extend_from_slice(&data);
                    if self.role == Role::Server {
                        tracing::debug!("HSK: client started a rehandshake");
                        return Err(Error::Rehandshake);
                    }
                    if self.hs_buf.len() >= HANDSHAKE_HEADER_LEN {
                        let header = HandshakeHeader::parse(&self.hs_buf)?;
                        if header.msg_type != HandshakeType::HelloRequest.to_u8() {
                            return Err(Error::UnexpectedHandshakePacket {
                                expected: HandshakeType::HelloRequest.name(),
                                got: header.msg_type,
                            });
                        }
                        if header.length != 0 {
                            return Err(Error::UnexpectedPacketLength);
                        }
                        self.hs_buf.drain(..HANDSHAKE_HEADER_LEN);
                        tracing::debug!("HSK: server requested a rehandshake");
                        return Err(Error::Rehandshake);
                    }
                }
                _ => return Err(Error::UnexpectedPacket),
            }
        }
    }

    /// Next complete handshake message of one of the `expected` types.
    ///
    /// Returns the type and body; the message (header included) is added to
    /// the transcript. A client skips HelloRequest messages mid-handshake.
    fn read_handshake(&mut self, expected: &[HandshakeType]) -> Result<(HandshakeType, Vec<u8>)> {
        loop {
            if self.hs_buf.len() >= HANDSHAKE_HEADER_LEN {
                let header = HandshakeHeader::parse(&self.hs_buf)?;
                if header.length > self.config.max_handshake_packet {
                    return Err(Error::HandshakePacketTooLarge(header.length));
                }
                let total = HANDSHAKE_HEADER_LEN + header.length;
                if self.hs_buf.len() >= total {
                    let msg: Vec<u8> = self.hs_buf.drain(..total).collect();
                    let msg_type = HandshakeType::from_u8(header.msg_type);
                    if msg_type == Some(HandshakeType::HelloRequest) && self.role == Role::Client {
                        tracing::debug!("HSK: ignoring HelloRequest during handshake");
                        continue;
                    }
                    let msg_type = match msg_type {
                        Some(t) if expected.contains(&t) => t,
                        _ => {
                            return Err(Error::UnexpectedHandshakePacket {
                                expected: expected.first().map_or("handshake", |t| t.name()),
                                got: header.msg_type,
                            })
                        }
                    };
                    if header.length == 0 && msg_type != HandshakeType::ServerHelloDone {
                        return Err(Error::UnexpectedPacketLength);
                    }
                    self.transcript.update(&msg);
                    tracing::debug!("HSK: received {} ({} bytes)", msg_type.name(), header.length);
                    return Ok((msg_type, msg[HANDSHAKE_HEADER_LEN..].to_vec()));
                }
            }
            match self.read_content(ContentType::Handshake)? {
                Some(data) => self.hs_buf.extend_from_slice(&data),
                None => return Err(closed_during_handshake()),
            }
        }
    }
}

fn check_empty(body: &[u8]) -> Result<()> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(Error::UnexpectedPacketLength)
    }
}

fn closed_during_handshake() -> Error {
    Error::Transport(io::Error::new(io::ErrorKind::UnexpectedEof, "close_notify during handshake"))
}
