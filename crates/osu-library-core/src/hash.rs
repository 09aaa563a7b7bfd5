//! The fixed-size MD5 digest record used as the primary key for
//! beatmaps and score groups across every database format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An MD5 digest stored as 32 lowercase hex characters.
///
/// All on-disk formats persist the digest in this textual form, so the
/// bytes are kept as-is rather than packed back into 16 raw bytes. A
/// default-constructed hash is all zero bytes, which no real digest can
/// produce; stale database entries are detected that way.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Hash([u8; 32]);

impl Md5Hash {
    /// Build from the 32-character hex representation.
    ///
    /// Returns `None` unless the input is exactly 32 ASCII characters.
    pub fn from_hex_str(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 32 || !bytes.iter().all(|b| b.is_ascii()) {
            return None;
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(bytes);
        Some(Self(buf))
    }

    /// Build from a raw 16-byte MD5 digest.
    pub fn from_digest(digest: &[u8; 16]) -> Self {
        let hex = hex::encode(digest);
        let mut buf = [0u8; 32];
        buf.copy_from_slice(hex.as_bytes());
        Self(buf)
    }

    /// Compute the hash of a byte buffer (used when loading raw `.osu`
    /// files that have no database entry yet).
    pub fn of_contents(data: &[u8]) -> Self {
        use md5::{Digest, Md5};
        let digest: [u8; 16] = Md5::digest(data).into();
        Self::from_digest(&digest)
    }

    /// A zeroed hash marks an entry that never had a digest (stale or
    /// corrupt database rows).
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Only constructed from ASCII, so this cannot fail.
        std::str::from_utf8(&self.0).unwrap_or("")
    }
}

impl Default for Md5Hash {
    fn default() -> Self {
        Self([0u8; 32])
    }
}

impl fmt::Display for Md5Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for Md5Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Md5Hash({})", self.as_str())
    }
}

impl Serialize for Md5Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Md5Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Md5Hash::from_hex_str(&s)
            .ok_or_else(|| serde::de::Error::custom("expected a 32-character hash string"))
    }
}
