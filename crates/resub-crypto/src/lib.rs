//! Cryptographic primitives for the reputation substrate.
//!
//! Provides the canonical encoding every hash and signature is computed
//! over, BLAKE3 content digests, and Ed25519 identities that sign the
//! canonical form of a payload.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod canonical;
pub mod signer;

pub use canonical::{digest_str, encode, hash, CanonicalError};
pub use signer::{
    sign_payload, verify_payload, Ed25519Identity, PublicKey, Signature, SignatureError, Signer,
};
