//! Strongly-typed identifiers for engine records.
//!
//! Every identifier except [`SessionId`] is a 32-byte Blake3 digest of the
//! record's defining content, so identical submissions always map to the same
//! identity. Identifiers serialize as lowercase hex strings and order
//! lexicographically by their raw bytes, which is the same order as their hex
//! encoding; the canonical resolver relies on that for its deterministic
//! tiebreak.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::{HASH_SIZE, Hash};

/// Errors that can occur when parsing an identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdParseError {
    /// The input was not valid hex.
    #[error("invalid hex in identifier: {0}")]
    InvalidHex(String),

    /// The decoded value had the wrong length.
    #[error("identifier has wrong length: expected {expected} bytes, got {actual}")]
    WrongLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes decoded.
        actual: usize,
    },
}

macro_rules! hash_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Hash);

        impl $name {
            /// Wraps a raw 32-byte hash.
            #[must_use]
            pub const fn from_bytes(bytes: Hash) -> Self {
                Self(bytes)
            }

            /// Returns the raw hash bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &Hash {
                &self.0
            }

            /// Returns the lowercase hex encoding.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Short prefix keeps log lines readable.
                write!(f, concat!(stringify!($name), "({}..)"), &self.to_hex()[..8])
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes =
                    hex::decode(s).map_err(|e| IdParseError::InvalidHex(e.to_string()))?;
                let arr: Hash =
                    bytes
                        .try_into()
                        .map_err(|v: Vec<u8>| IdParseError::WrongLength {
                            expected: HASH_SIZE,
                            actual: v.len(),
                        })?;
                Ok(Self(arr))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hash_id! {
    /// Identity of an immutable hrönir content blob (Blake3 of its text).
    HronirId
}

hash_id! {
    /// Identity of a path (DAG edge), derived from its position,
    /// predecessor, and successor.
    PathId
}

hash_id! {
    /// One-time voting authorization attached to a qualified path.
    MandateId
}

hash_id! {
    /// Identity of an appended vote record.
    VoteId
}

hash_id! {
    /// Identity of a ledger transaction (chain-linked content hash).
    TxId
}

/// Identity of a voting session.
///
/// Sessions are the only records without content-derived identity: they are
/// minted once per mandate activation, so a random UUID is the natural fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Mints a fresh session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let id = PathId::from_bytes([0xab; 32]);
        let parsed: PathId = id.to_hex().parse().expect("round trip");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            "zz".parse::<PathId>(),
            Err(IdParseError::InvalidHex(_))
        ));
        assert!(matches!(
            "abcd".parse::<PathId>(),
            Err(IdParseError::WrongLength { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn test_ordering_matches_hex_ordering() {
        let a = PathId::from_bytes([0x01; 32]);
        let b = PathId::from_bytes([0x02; 32]);
        assert!(a < b);
        assert!(a.to_hex() < b.to_hex());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let id = TxId::from_bytes([0x0f; 32]);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: TxId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, back);
    }
}
