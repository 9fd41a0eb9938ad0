use std::time::Duration;

use crate::error::CacheError;
use crate::utils::{deadline_after, now_ms};

/// Size of the expiry header prepended by [`Entry::to_bytes`].
pub const HEADER_LEN: usize = 8;

/// A persisted value together with its optional expiry.
///
/// Stores that have no native TTL support keep this pair and enforce the
/// deadline themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The encoded value.
    pub value: Vec<u8>,

    /// Unix timestamp in milliseconds after which the entry is gone.
    /// `None` means the entry lives until it is deleted.
    pub expires_at: Option<i64>,
}

impl Entry {
    /// Create an entry that expires `ttl` from now. A zero ttl never expires.
    pub fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Entry {
            value,
            expires_at: deadline_after(ttl),
        }
    }

    /// Check if the entry has expired and should not be used.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(deadline) if now_ms >= deadline)
    }

    /// Push the deadline to `ttl` from now, keeping the value.
    ///
    /// A zero ttl leaves the current deadline unchanged.
    pub fn renew(&mut self, ttl: Duration) {
        if let Some(deadline) = deadline_after(ttl) {
            self.expires_at = Some(deadline);
        }
    }

    /// Remaining lifetime: `Duration::ZERO` for entries without expiry.
    pub fn remaining(&self) -> Duration {
        match self.expires_at {
            Some(deadline) => Duration::from_millis((deadline - now_ms()).max(1) as u64),
            None => Duration::ZERO,
        }
    }

    /// Serialize as `[8-byte big-endian deadline, 0 = none][value]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.value.len());
        out.extend_from_slice(&self.expires_at.unwrap_or(0).to_be_bytes());
        out.extend_from_slice(&self.value);
        out
    }

    /// Parse the layout produced by [`Entry::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(CacheError::decoding(format!(
                "entry header needs {} bytes, got {}",
                HEADER_LEN,
                bytes.len()
            )));
        }
        let (header, value) = bytes.split_at(HEADER_LEN);
        let mut deadline = [0u8; HEADER_LEN];
        deadline.copy_from_slice(header);
        let deadline = i64::from_be_bytes(deadline);

        Ok(Entry {
            value: value.to_vec(),
            expires_at: (deadline != 0).then_some(deadline),
        })
    }
}
