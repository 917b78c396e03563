//! Error types for protocol operations.

use crate::alert::AlertDescription;
use std::io;
use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Protocol operation errors.
///
/// [`Error::is_fatal`] splits these into errors that invalidate the session
/// and errors the caller can recover from.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport has no data or no room; retry later.
    #[error("Operation would block")]
    WouldBlock,

    /// The transport call was interrupted; retry.
    #[error("Operation interrupted")]
    Interrupted,

    /// Record decryption, padding or MAC check failed.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// A record of the wrong content type arrived.
    #[error("Unexpected packet")]
    UnexpectedPacket,

    /// A message or record had an invalid length.
    #[error("Unexpected packet length")]
    UnexpectedPacketLength,

    /// A handshake message arrived out of order.
    #[error("Unexpected handshake packet: expected {expected}, got type {got}")]
    UnexpectedHandshakePacket {
        /// Message the state machine was waiting for.
        expected: &'static str,
        /// Wire type of the message received.
        got: u8,
    },

    /// No protocol version both sides support.
    #[error("Unsupported protocol version")]
    UnsupportedVersion,

    /// The sequence number for a direction is exhausted.
    #[error("Record sequence number limit reached")]
    RecordLimitReached,

    /// A record exceeded the maximum size.
    #[error("Record overflow")]
    RecordOverflow,

    /// No cipher suite both sides accept.
    #[error("No acceptable cipher suite")]
    NoAcceptableCipherSuite,

    /// No compression method both sides accept.
    #[error("Unknown compression method")]
    UnknownCompression,

    /// The credentials required by the negotiated key exchange are missing.
    #[error("Insufficient credentials")]
    InsufficientCredentials,

    /// A required certificate was not sent.
    #[error("No certificate found")]
    NoCertificateFound,

    /// The peer's Finished message did not verify.
    #[error("Finished message mismatch")]
    FinishedMismatch,

    /// The peer certificate was rejected.
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// A hello field or extension carried a value outside its range.
    #[error("Illegal parameter: {0}")]
    IllegalParameter(&'static str),

    /// The server answered with an extension the client never offered.
    #[error("Unsupported extension: type {0}")]
    UnsupportedExtension(u16),

    /// Application data interleaved with a handshake exceeded the buffer limit.
    #[error("Application data buffer full: {0} bytes")]
    AppDataBufferFull(usize),

    /// A handshake message exceeded the configured maximum size.
    #[error("Handshake packet too large: {0} bytes")]
    HandshakePacketTooLarge(usize),

    /// The peer sent a fatal alert.
    #[error("Fatal alert received: {0:?}")]
    FatalAlert(AlertDescription),

    /// The peer sent a warning alert.
    #[error("Warning alert received: {0:?}")]
    WarningAlert(AlertDescription),

    /// The session was invalidated by an earlier fatal error.
    #[error("Invalid session")]
    InvalidSession,

    /// The peer asked for a new handshake.
    #[error("Rehandshake requested")]
    Rehandshake,

    /// Application data arrived where a ClientHello was expected.
    #[error("Got application data")]
    GotApplicationData,

    /// The call is not valid for this role or session phase.
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),

    /// The session is in the wrong state for the call.
    #[error("Invalid state")]
    InvalidState,

    /// The caller's buffer is too small.
    #[error("Short buffer")]
    ShortBuffer,

    /// Cryptographic failure.
    #[error("Crypto error: {0}")]
    Crypto(#[from] rtls_crypto::Error),

    /// Transport failure other than would-block or interrupt.
    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::Interrupted => Error::Interrupted,
            _ => Error::Transport(err),
        }
    }
}

impl Error {
    /// Whether this error invalidates the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::WouldBlock
                | Error::Interrupted
                | Error::WarningAlert(_)
                | Error::Rehandshake
                | Error::GotApplicationData
                | Error::InvalidRequest(_)
                | Error::InvalidState
                | Error::ShortBuffer
        )
    }

    /// Whether the operation can simply be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::WouldBlock | Error::Interrupted)
    }

    /// Alert to send the peer for a fatal error, if any.
    ///
    /// Errors caused by the peer's own fatal alert, or by a dead transport,
    /// map to `None`.
    pub fn alert(&self) -> Option<AlertDescription> {
        let desc = match self {
            Error::DecryptionFailed => AlertDescription::BadRecordMac,
            Error::UnexpectedPacket | Error::UnexpectedHandshakePacket { .. } => {
                AlertDescription::UnexpectedMessage
            }
            Error::UnexpectedPacketLength => AlertDescription::DecodeError,
            Error::UnsupportedVersion => AlertDescription::ProtocolVersion,
            Error::RecordOverflow => AlertDescription::RecordOverflow,
            Error::NoAcceptableCipherSuite
            | Error::InsufficientCredentials
            | Error::NoCertificateFound
            | Error::FinishedMismatch => AlertDescription::HandshakeFailure,
            Error::UnknownCompression | Error::IllegalParameter(_) => AlertDescription::IllegalParameter,
            Error::UnsupportedExtension(_) => AlertDescription::UnsupportedExtension,
            Error::CertificateError(_) => AlertDescription::BadCertificate,
            Error::HandshakePacketTooLarge(_) | Error::AppDataBufferFull(_) => AlertDescription::UnexpectedMessage,
            Error::Crypto(rtls_crypto::Error::Signature(_)) => AlertDescription::DecryptError,
            Error::Crypto(rtls_crypto::Error::InvalidPublicKey(_)) => AlertDescription::IllegalParameter,
            Error::Crypto(_) | Error::RecordLimitReached => AlertDescription::InternalError,
            _ => return None,
        };
        Some(desc)
    }
}
