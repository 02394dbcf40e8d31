//! Declaration fingerprints.
//!
//! A fingerprint is a content-derived identifier the compiler attaches to a
//! declaration. When it changes between builds, users of the declaration are
//! invalidated. Fingerprints travel through JSON summaries as hex strings.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use rustc_hash::FxHasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A content fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Create a fingerprint from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Fingerprint a string.
    #[must_use]
    pub fn of_str(s: &str) -> Self {
        let mut hasher = FxHasher::default();
        s.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Fingerprint raw bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = FxHasher::default();
        bytes.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Combine several fingerprints, order-sensitively.
    #[must_use]
    pub fn combine(parts: &[Fingerprint]) -> Self {
        let mut hasher = FxHasher::default();
        for part in parts {
            part.0.hash(&mut hasher);
        }
        Self(hasher.finish())
    }

    /// Format as a 16-digit hex string.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        u64::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x})", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| format!("invalid fingerprint `{s}`"))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let hex = String::deserialize(deserializer)?;
            hex.parse().map_err(serde::de::Error::custom)
        } else {
            u64::deserialize(deserializer).map(Self)
        }
    }
}
