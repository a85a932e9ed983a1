use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use resub_types::Did;

use crate::canonical::{self, CanonicalError};

/// Ed25519 public key. Serialized as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

/// Ed25519 signature. Serialized as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

/// A signing identity.
///
/// Implementations sign raw message bytes; callers that sign structured
/// data go through [`sign_payload`], which always signs the canonical
/// encoding. Any alternate backend must keep that contract or previously
/// signed data becomes unverifiable.
pub trait Signer: Send + Sync {
    /// Identifier derived from [`Signer::public_key`].
    fn did(&self) -> Did;

    /// The verifying half of this identity.
    fn public_key(&self) -> PublicKey;

    /// Sign raw message bytes.
    fn sign_message(&self, message: &[u8]) -> Signature;
}

/// Sign the canonical encoding of `payload`.
pub fn sign_payload<T: Serialize + ?Sized>(
    signer: &dyn Signer,
    payload: &T,
) -> Result<Signature, CanonicalError> {
    let encoded = canonical::encode(payload)?;
    Ok(signer.sign_message(encoded.as_bytes()))
}

/// Check a signature over the canonical encoding of `payload`.
///
/// Returns `false` for payloads that cannot be encoded.
pub fn verify_payload<T: Serialize + ?Sized>(
    public_key: &PublicKey,
    payload: &T,
    signature: &Signature,
) -> bool {
    match canonical::encode(payload) {
        Ok(encoded) => public_key.verify(encoded.as_bytes(), signature).is_ok(),
        Err(_) => false,
    }
}

impl PublicKey {
    /// Create from raw bytes, rejecting points that are not valid keys.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignatureError> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes).map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s).map_err(|_| SignatureError::InvalidKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::InvalidKey)?;
        Self::from_bytes(arr)
    }

    /// The DID this key identifies.
    pub fn did(&self) -> Did {
        Did::derive(&self.0)
    }

    /// Verify a signature on raw message bytes.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| SignatureError::InvalidKey)?;
        key.verify(message, &ed25519_dalek::Signature::from_bytes(&signature.0))
            .map_err(|_| SignatureError::InvalidSignature)
    }
}

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s).map_err(|_| SignatureError::InvalidSignature)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidSignature)?;
        Ok(Self(arr))
    }
}

/// Ed25519 identity backed by an in-memory secret key.
pub struct Ed25519Identity {
    key: ed25519_dalek::SigningKey,
    did: Did,
}

impl Ed25519Identity {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self::from_key(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from a raw 32-byte secret.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_key(ed25519_dalek::SigningKey::from_bytes(&seed))
    }

    fn from_key(key: ed25519_dalek::SigningKey) -> Self {
        let did = Did::derive(&key.verifying_key().to_bytes());
        Self { key, did }
    }
}

impl Signer for Ed25519Identity {
    fn did(&self) -> Did {
        self.did.clone()
    }

    fn public_key(&self) -> PublicKey {
        PublicKey(self.key.verifying_key().to_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer as _;
        Signature(self.key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Ed25519Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Identity({}, <redacted>)", self.did.short_id())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0[..8]))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid key")]
    InvalidKey,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sign_and_verify_payload() {
        let id = Ed25519Identity::generate();
        let payload = json!({"action": "upload", "data": {"id": 1}});
        let sig = sign_payload(&id, &payload).unwrap();
        assert!(verify_payload(&id.public_key(), &payload, &sig));
    }

    #[test]
    fn verification_ignores_key_order() {
        let id = Ed25519Identity::from_seed([3; 32]);
        let sig = sign_payload(&id, &json!({"a": 1, "b": 2})).unwrap();
        let mut reordered = std::collections::HashMap::new();
        reordered.insert("b", 2);
        reordered.insert("a", 1);
        assert!(verify_payload(&id.public_key(), &reordered, &sig));
    }

    #[test]
    fn verify_fails_on_changed_payload() {
        let id = Ed25519Identity::generate();
        let sig = sign_payload(&id, &json!({"n": 1})).unwrap();
        assert!(!verify_payload(&id.public_key(), &json!({"n": 2}), &sig));
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let a = Ed25519Identity::generate();
        let b = Ed25519Identity::generate();
        let sig = sign_payload(&a, &json!({"n": 1})).unwrap();
        assert!(!verify_payload(&b.public_key(), &json!({"n": 1}), &sig));
    }

    #[test]
    fn seeded_identity_is_deterministic() {
        let a = Ed25519Identity::from_seed([7; 32]);
        let b = Ed25519Identity::from_seed([7; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.did(), b.did());
        assert_eq!(a.did(), a.public_key().did());
    }

    #[test]
    fn public_key_hex_roundtrip() {
        let key = Ed25519Identity::generate().public_key();
        assert_eq!(PublicKey::from_hex(&key.to_hex()).unwrap(), key);
        assert_eq!(
            PublicKey::from_hex("abcd"),
            Err(SignatureError::InvalidKey)
        );
    }

    #[test]
    fn signature_serde_is_hex_string() {
        let id = Ed25519Identity::generate();
        let sig = id.sign_message(b"test");
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, format!("\"{}\"", sig.to_hex()));
        let parsed: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(sig, parsed);
    }

    #[test]
    fn public_key_serde_roundtrip() {
        let key = Ed25519Identity::generate().public_key();
        let json = serde_json::to_string(&key).unwrap();
        let parsed: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn debug_redacts_secret() {
        let id = Ed25519Identity::generate();
        assert!(format!("{id:?}").contains("redacted"));
    }
}
