//! Source content fingerprints.
//!
//! A fingerprint is a cheap, comparable signature of a partition's source
//! content, computed from probe metadata (etag, size, last-modified) without
//! transferring the partition itself. Two equal fingerprints mean the source
//! has not changed since the last committed load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A comparable signature of a partition's source content.
///
/// Internally a sha256 hex digest over the canonical probe material, so the
/// stored form is stable regardless of which metadata fields the source
/// exposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes a fingerprint from probe metadata.
    ///
    /// Any subset of the fields may be present; absent fields hash as an
    /// explicit marker so `(etag=None, size=5)` never collides with
    /// `(etag="5", size=None)`.
    #[must_use]
    pub fn from_probe(etag: &str, size: u64, last_modified: Option<DateTime<Utc>>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"etag=");
        hasher.update(etag.as_bytes());
        hasher.update(b";size=");
        hasher.update(size.to_string().as_bytes());
        hasher.update(b";mtime=");
        match last_modified {
            Some(ts) => hasher.update(ts.to_rfc3339().as_bytes()),
            None => hasher.update(b"null"),
        }
        Self(hex_string(&hasher.finalize()))
    }

    /// Computes a fingerprint over arbitrary canonical bytes.
    ///
    /// Used when the source exposes its own opaque version token rather than
    /// object metadata.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hex_string(&hasher.finalize()))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hex_string(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_probe_same_fingerprint() {
        let a = Fingerprint::from_probe("etag-1", 100, None);
        let b = Fingerprint::from_probe("etag-1", 100, None);
        assert_eq!(a, b);
    }

    #[test]
    fn different_probe_different_fingerprint() {
        let a = Fingerprint::from_probe("etag-1", 100, None);
        let b = Fingerprint::from_probe("etag-1", 101, None);
        let c = Fingerprint::from_probe("etag-2", 100, None);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn absent_fields_do_not_collide() {
        // etag "100;size=" vs size 100 must hash differently
        let a = Fingerprint::from_probe("", 100, None);
        let b = Fingerprint::from_probe("100", 0, None);
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_hex_sha256() {
        let fp = Fingerprint::from_bytes(b"hello");
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
