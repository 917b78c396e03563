//! Hello extensions (RFC 3546).
//!
//! Implements:
//! - The extension block trailing ClientHello / ServerHello bodies
//! - server_name (type 0), host_name entries
//! - max_fragment_length (type 1)
//!
//! Extensions are only acted on once TLS 1.0 or later is negotiated.

use crate::handshake::{put_vec16, Reader};
use crate::record::MAX_RECORD_SIZE;
use crate::{Error, Result};

/// server_name extension type.
pub const EXT_SERVER_NAME: u16 = 0;

/// max_fragment_length extension type.
pub const EXT_MAX_FRAGMENT_LENGTH: u16 = 1;

/// host_name entry in a server_name list.
const NAME_TYPE_HOST_NAME: u8 = 0;

/// One hello extension, body kept opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Wire type.
    pub ext_type: u16,
    /// Extension body.
    pub data: Vec<u8>,
}

impl Extension {
    /// Extension with the given type and body.
    pub fn new(ext_type: u16, data: Vec<u8>) -> Self {
        Self { ext_type, data }
    }
}

/// Parse the extension block that follows the hello's fixed fields.
///
/// An empty `block` means the peer sent no extensions. Otherwise the block
/// must be exactly one two-byte-length vector of well-formed entries, each
/// type appearing at most once.
///
/// # Errors
/// - `UnexpectedPacketLength` on a truncated or overlong block
/// - `IllegalParameter` on a repeated extension type
pub fn parse_extensions(block: &[u8]) -> Result<Vec<Extension>> {
    if block.is_empty() {
        return Ok(Vec::new());
    }
    let mut outer = Reader::new(block);
    let list = outer.vec16()?;
    outer.expect_end()?;

    let mut r = Reader::new(list);
    let mut exts: Vec<Extension> = Vec::new();
    while r.remaining() > 0 {
        let ext_type = r.u16()?;
        let data = r.vec16()?;
        if exts.iter().any(|e| e.ext_type == ext_type) {
            return Err(Error::IllegalParameter("duplicate extension"));
        }
        exts.push(Extension::new(ext_type, data.to_vec()));
    }
    Ok(exts)
}

/// Append the extension block for `exts`; nothing when the list is empty.
pub fn encode_extensions(out: &mut Vec<u8>, exts: &[Extension]) {
    if exts.is_empty() {
        return;
    }
    let mut list = Vec::new();
    for ext in exts {
        list.extend_from_slice(&ext.ext_type.to_be_bytes());
        put_vec16(&mut list, &ext.data);
    }
    put_vec16(out, &list);
}

/// Body of the extension of type `ext_type`, if present.
pub fn find_extension(exts: &[Extension], ext_type: u16) -> Option<&[u8]> {
    exts.iter().find(|e| e.ext_type == ext_type).map(|e| e.data.as_slice())
}

/// Negotiable record plaintext limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxFragmentLength {
    /// 2^9 bytes (code 1).
    Bytes512,
    /// 2^10 bytes (code 2).
    Bytes1024,
    /// 2^11 bytes (code 3).
    Bytes2048,
    /// 2^12 bytes (code 4).
    Bytes4096,
}

impl MaxFragmentLength {
    /// Convert from the wire code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Bytes512),
            2 => Some(Self::Bytes1024),
            3 => Some(Self::Bytes2048),
            4 => Some(Self::Bytes4096),
            _ => None,
        }
    }

    /// Convert to the wire code.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Bytes512 => 1,
            Self::Bytes1024 => 2,
            Self::Bytes2048 => 3,
            Self::Bytes4096 => 4,
        }
    }

    /// Plaintext limit in bytes.
    pub fn limit(self) -> usize {
        1 << (8 + usize::from(self.to_u8()))
    }

    /// The extension carrying this limit.
    pub fn to_extension(self) -> Extension {
        Extension::new(EXT_MAX_FRAGMENT_LENGTH, vec![self.to_u8()])
    }

    /// Parse a max_fragment_length body.
    ///
    /// # Errors
    /// `IllegalParameter` for a code outside 1..=4 or a body that is not one byte.
    pub fn parse(data: &[u8]) -> Result<Self> {
        match data {
            [code] => Self::from_u8(*code).ok_or(Error::IllegalParameter("max_fragment_length")),
            _ => Err(Error::IllegalParameter("max_fragment_length")),
        }
    }
}

/// Record plaintext limit for an optional negotiated fragment length.
pub fn plaintext_limit(mfl: Option<MaxFragmentLength>) -> usize {
    mfl.map_or(MAX_RECORD_SIZE, MaxFragmentLength::limit)
}

/// server_name extension naming one host.
pub fn server_name_extension(host: &str) -> Extension {
    let mut entry = vec![NAME_TYPE_HOST_NAME];
    put_vec16(&mut entry, host.as_bytes());
    let mut data = Vec::with_capacity(entry.len() + 2);
    put_vec16(&mut data, &entry);
    Extension::new(EXT_SERVER_NAME, data)
}

/// First host name in a server_name body.
///
/// Entries of other name types are skipped. An empty body (the server's
/// acknowledgement) yields `None`.
///
/// # Errors
/// - `UnexpectedPacketLength` on a malformed list
/// - `IllegalParameter` on an empty or non-UTF-8 host name
pub fn parse_server_name(data: &[u8]) -> Result<Option<String>> {
    if data.is_empty() {
        return Ok(None);
    }
    let mut outer = Reader::new(data);
    let list = outer.vec16()?;
    outer.expect_end()?;

    let mut r = Reader::new(list);
    let mut host = None;
    while r.remaining() > 0 {
        let name_type = r.u8()?;
        let name = r.vec16()?;
        if name_type != NAME_TYPE_HOST_NAME || host.is_some() {
            continue;
        }
        if name.is_empty() {
            return Err(Error::IllegalParameter("server_name"));
        }
        let name = std::str::from_utf8(name).map_err(|_| Error::IllegalParameter("server_name"))?;
        host = Some(name.to_owned());
    }
    Ok(host)
}
