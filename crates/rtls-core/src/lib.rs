//! Protocol engine for SSL 3.0 and TLS 1.0 to 1.2.
//!
//! This crate implements the connection-level machinery:
//! - Record layer encode/decode with per-direction connection states
//! - Handshake message codec (including the SSLv2-compatible ClientHello)
//! - Hello extensions: server_name and max_fragment_length
//! - Cipher suite, version and compression negotiation
//! - Key exchange orchestration (RSA, RSA_EXPORT, DHE_RSA, DHE_DSS, anonymous DH)
//! - The resumable handshake state machine and the `Session` API
//! - Server-side session resumption cache
//!
//! I/O goes through the [`Transport`] trait and never blocks inside the
//! engine: a `WouldBlock` from the transport surfaces as
//! [`HandshakeStatus::WouldBlock`] or [`Error::WouldBlock`], and the caller
//! retries once the transport is ready.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod alert;
pub mod cache;
pub mod credentials;
pub mod error;
pub mod extensions;
pub mod handshake;
pub mod kx;
pub mod negotiate;
pub mod record;
pub mod session;
pub mod transcript;
pub mod transport;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use cache::{MemorySessionCache, ResumptionData, SessionCache};
pub use credentials::{
    AnonymousCredentials, AuthInfo, CertificateCredentials, CertificateVerifier, Credential, Credentials,
    PinnedKeyVerifier,
};
pub use error::{Error, Result};
pub use extensions::MaxFragmentLength;
pub use negotiate::Priorities;
pub use session::{
    ClientCertPolicy, HandshakeState, HandshakeStatus, IoDirection, Role, SecurityParameters, Session,
    SessionConfig, ShutdownMode,
};
pub use transport::Transport;

pub use rtls_crypto::suite::{BulkCipher, CompressionMethod, KxAlgorithm, MacAlgorithm};
pub use rtls_crypto::{CipherSuite, ProtocolVersion, SuiteId};
