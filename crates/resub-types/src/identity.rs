use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Method prefix shared by every identifier this substrate issues.
pub const DID_PREFIX: &str = "did:resub:";

/// Number of hex characters in the method-specific part of a [`Did`].
const DID_HEX_LEN: usize = 32;

/// Decentralized identifier derived from an Ed25519 public key.
///
/// A `Did` is derived deterministically from the raw key bytes using a
/// domain-separated BLAKE3 digest truncated to 128 bits, so the same key
/// always yields the same identifier. Serialized as its string form,
/// e.g. `did:resub:3f0c…`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Derive a `Did` from raw public key bytes.
    pub fn derive(public_key: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"resub-did-v1:");
        hasher.update(public_key);
        let digest = hasher.finalize();
        Self(format!(
            "{DID_PREFIX}{}",
            hex::encode(&digest.as_bytes()[..DID_HEX_LEN / 2])
        ))
    }

    /// Parse and validate a DID string.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let suffix = s
            .strip_prefix(DID_PREFIX)
            .ok_or_else(|| TypeError::InvalidDid(s.to_string()))?;
        if suffix.len() != DID_HEX_LEN {
            return Err(TypeError::InvalidLength {
                expected: DID_HEX_LEN,
                actual: suffix.len(),
            });
        }
        hex::decode(suffix).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if suffix.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(TypeError::InvalidDid(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The full identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short identifier for logs (method-specific part, first 8 hex chars).
    pub fn short_id(&self) -> String {
        let suffix = &self.0[DID_PREFIX.len()..];
        format!("did:{}", &suffix[..8])
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.short_id())
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let key = [42u8; 32];
        assert_eq!(Did::derive(&key), Did::derive(&key));
    }

    #[test]
    fn different_keys_produce_different_dids() {
        assert_ne!(Did::derive(&[1; 32]), Did::derive(&[2; 32]));
    }

    #[test]
    fn derived_did_has_method_prefix() {
        let did = Did::derive(&[7; 32]);
        assert!(did.as_str().starts_with(DID_PREFIX));
        assert_eq!(did.as_str().len(), DID_PREFIX.len() + DID_HEX_LEN);
    }

    #[test]
    fn parse_roundtrip() {
        let did = Did::derive(&[9; 32]);
        let parsed: Did = did.as_str().parse().unwrap();
        assert_eq!(did, parsed);
    }

    #[test]
    fn parse_rejects_foreign_method() {
        let err = Did::parse("did:web:example.com").unwrap_err();
        assert!(matches!(err, TypeError::InvalidDid(_)));
    }

    #[test]
    fn parse_rejects_bad_length() {
        let err = Did::parse("did:resub:abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: DID_HEX_LEN,
                actual: 4
            }
        );
    }

    #[test]
    fn parse_rejects_non_hex() {
        let bad = format!("{DID_PREFIX}{}", "z".repeat(DID_HEX_LEN));
        assert!(matches!(Did::parse(&bad), Err(TypeError::InvalidHex(_))));
    }

    #[test]
    fn short_id_format() {
        let did = Did::derive(&[0; 32]);
        let short = did.short_id();
        assert!(short.starts_with("did:"));
        assert_eq!(short.len(), 12);
    }

    #[test]
    fn serde_roundtrip_as_string() {
        let did = Did::derive(&[10; 32]);
        let json = serde_json::to_string(&did).unwrap();
        assert_eq!(json, format!("\"{}\"", did.as_str()));
        let parsed: Did = serde_json::from_str(&json).unwrap();
        assert_eq!(did, parsed);
    }

    #[test]
    fn serde_rejects_invalid_string() {
        let result: Result<Did, _> = serde_json::from_str("\"not-a-did\"");
        assert!(result.is_err());
    }
}
