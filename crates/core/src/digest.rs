//! Fixed-length digests: pseudonymous patient references and consent hashes.
//!
//! The ledger never hashes raw identifiers or documents itself; callers hand in
//! the 32-byte digest. The all-zero digest is the "missing" sentinel and is
//! rejected wherever a digest is required.

use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

/// Byte length of every digest stored by the ledger.
pub const DIGEST_LEN: usize = 32;

/// Opaque pseudonymous patient identifier (never raw patient identity).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatientRef([u8; DIGEST_LEN]);

/// Digest of an externally stored signed-consent document.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsentHash([u8; DIGEST_LEN]);

macro_rules! impl_digest_newtype {
    ($t:ident, $name:literal) => {
        impl $t {
            pub const ZERO: $t = $t([0u8; DIGEST_LEN]);

            pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
                Self(bytes)
            }

            /// Build from a slice, which must be exactly `DIGEST_LEN` bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, DomainError> {
                let arr: [u8; DIGEST_LEN] = bytes.try_into().map_err(|_| {
                    DomainError::invalid_id(format!(
                        "{}: expected {} bytes, got {}",
                        $name,
                        DIGEST_LEN,
                        bytes.len()
                    ))
                })?;
                Ok(Self(arr))
            }

            pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl core::fmt::Debug for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}({})", $name, self.to_hex())
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $t {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_digest_newtype!(PatientRef, "PatientRef");
impl_digest_newtype!(ConsentHash, "ConsentHash");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_with_or_without_prefix() {
        let hex = "ab".repeat(DIGEST_LEN);
        let a: PatientRef = hex.parse().unwrap();
        let b: PatientRef = format!("0x{hex}").parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), hex);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = "abcd".parse::<ConsentHash>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }

    #[test]
    fn zero_sentinel_is_detected() {
        assert!(ConsentHash::ZERO.is_zero());
        let mut bytes = [0u8; DIGEST_LEN];
        bytes[31] = 1;
        assert!(!ConsentHash::from_bytes(bytes).is_zero());
    }

    #[test]
    fn serializes_as_hex_string() {
        let r = PatientRef::from_bytes([7u8; DIGEST_LEN]);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(DIGEST_LEN)));
        let back: PatientRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
