//! Bucket identifiers.
//!
//! A bucket is addressed by a fixed six byte token drawn from the ascii
//! alphanumerics. The token doubles as the bucket's file name, so anything
//! arriving from the wire is validated before it reaches the filesystem.
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::{LoftError, Result};

/// Number of bytes in a bucket identifier.
pub const IDENTIFIER_LEN: usize = 6;

/// Opaque six byte bucket name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BucketId([u8; IDENTIFIER_LEN]);

impl BucketId {
    /// Draw a fresh random identifier.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Draw an identifier from the given rng.
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; IDENTIFIER_LEN];
        for (slot, b) in bytes.iter_mut().zip(rng.sample_iter(Alphanumeric)) {
            *slot = b;
        }
        Self(bytes)
    }

    /// Wrap raw wire bytes without validating them.
    pub fn from_bytes(bytes: [u8; IDENTIFIER_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw bytes as they travel on the wire.
    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_LEN] {
        &self.0
    }

    /// Whether every byte is an ascii alphanumeric, i.e. safe to use as a file name.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(u8::is_ascii_alphanumeric)
    }

    /// The identifier as text; only meaningful when [`BucketId::is_valid`].
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("<invalid>")
    }
}

impl FromStr for BucketId {
    type Err = LoftError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; IDENTIFIER_LEN] = s
            .as_bytes()
            .try_into()
            .map_err(|_| LoftError::InvalidIdentifier(s.to_string()))?;
        let id = Self(bytes);
        if !id.is_valid() {
            return Err(LoftError::InvalidIdentifier(s.to_string()));
        }
        Ok(id)
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            f.write_str(self.as_str())
        } else {
            write!(f, "{:02x?}", self.0)
        }
    }
}

impl fmt::Debug for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketId({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid() {
        for _ in 0..100 {
            let id = BucketId::generate();
            assert!(id.is_valid(), "{id:?}");
            assert_eq!(id.as_str().len(), IDENTIFIER_LEN);
        }
    }

    #[test]
    fn parse_accepts_alphanumerics() {
        let id: BucketId = "aB3xZ9".parse().unwrap();
        assert_eq!(id.as_bytes(), b"aB3xZ9");
        assert_eq!(id.to_string(), "aB3xZ9");
    }

    #[test]
    fn parse_rejects_bad_input() {
        for s in ["", "abc", "abcdefg", "../abc", "ab cde", "abcdé"] {
            assert!(s.parse::<BucketId>().is_err(), "{s}");
        }
    }

    #[test]
    fn raw_bytes_can_be_invalid() {
        let id = BucketId::from_bytes(*b"../etc");
        assert!(!id.is_valid());
        assert_eq!(id.to_string(), format!("{:02x?}", b"../etc"));
    }
}
