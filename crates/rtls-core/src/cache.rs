//! Session resumption storage.

use rtls_crypto::prf::MASTER_SECRET_LEN;
use rtls_crypto::suite::CompressionMethod;
use rtls_crypto::{ProtocolVersion, SuiteId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

/// Everything needed to resume a session with an abbreviated handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct ResumptionData {
    /// Session id (1 to 32 bytes).
    pub session_id: Vec<u8>,
    /// Negotiated version.
    pub version: ProtocolVersion,
    /// Negotiated suite.
    pub suite: SuiteId,
    /// Negotiated compression.
    pub compression: CompressionMethod,
    /// Master secret.
    pub master_secret: Zeroizing<[u8; MASTER_SECRET_LEN]>,
    /// Seconds since the UNIX epoch when the session was established.
    pub timestamp: u64,
}

impl fmt::Debug for ResumptionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumptionData")
            .field("session_id", &self.session_id)
            .field("version", &self.version)
            .field("suite", &self.suite)
            .field("compression", &self.compression)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

impl ResumptionData {
    /// Whether the entry is older than `lifetime` at `now` (UNIX seconds).
    pub fn is_expired(&self, now: u64, lifetime: Duration) -> bool {
        now.saturating_sub(self.timestamp) > lifetime.as_secs()
    }
}

/// Current time in UNIX seconds (0 if the clock is before the epoch).
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Server-side store of resumable sessions, keyed by session id.
pub trait SessionCache: Send + Sync + fmt::Debug {
    /// Remember a session.
    fn store(&self, data: ResumptionData);

    /// Look a session up.
    fn retrieve(&self, session_id: &[u8]) -> Option<ResumptionData>;

    /// Forget a session.
    fn remove(&self, session_id: &[u8]);
}

/// In-process [`SessionCache`] bounded to a fixed number of entries.
#[derive(Debug)]
pub struct MemorySessionCache {
    entries: Mutex<HashMap<Vec<u8>, ResumptionData>>,
    capacity: usize,
}

impl Default for MemorySessionCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MemorySessionCache {
    /// Cache holding at most `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionCache for MemorySessionCache {
    fn store(&self, data: ResumptionData) {
        if self.capacity == 0 || data.session_id.is_empty() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity && !entries.contains_key(&data.session_id) {
            // evict the oldest entry
            let oldest = entries
                .iter()
                .min_by_key(|(_, v)| v.timestamp)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }
        entries.insert(data.session_id.clone(), data);
    }

    fn retrieve(&self, session_id: &[u8]) -> Option<ResumptionData> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
    }

    fn remove(&self, session_id: &[u8]) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).remove(session_id);
    }
}
