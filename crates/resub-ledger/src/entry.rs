use serde::{Deserialize, Serialize};
use serde_json::Value;

use resub_crypto::{canonical, sign_payload, verify_payload, PublicKey, Signature, Signer};
use resub_types::{Did, Pulse};

use crate::error::LedgerError;

/// A signed, content-addressed ledger record.
///
/// The signature covers `{action, data, pulse, did}` and the hash covers
/// `{action, data, signature, publicKey, pulse}`, so the hash binds the
/// signer's identity to the content. Fields are private; an entry never
/// changes after construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    action: String,
    data: Value,
    signature: Signature,
    public_key: PublicKey,
    pulse: Pulse,
    hash: String,
}

/// What the signer commits to.
#[derive(Serialize)]
struct SignedContent<'a> {
    action: &'a str,
    data: &'a Value,
    pulse: Pulse,
    did: &'a Did,
}

/// What the entry hash covers.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedContent<'a> {
    action: &'a str,
    data: &'a Value,
    signature: &'a Signature,
    public_key: &'a PublicKey,
    pulse: Pulse,
}

impl LedgerEntry {
    /// Sign `{action, data, pulse}` with `signer` and seal the result.
    pub fn create(
        signer: &dyn Signer,
        action: impl Into<String>,
        data: Value,
        pulse: Pulse,
    ) -> Result<Self, LedgerError> {
        let action = action.into();
        let did = signer.did();
        let signature = sign_payload(
            signer,
            &SignedContent {
                action: &action,
                data: &data,
                pulse,
                did: &did,
            },
        )?;
        Self::from_parts(action, data, signature, signer.public_key(), pulse)
    }

    /// Rebuild an entry from stored fields. The hash is always recomputed,
    /// never taken on trust.
    pub fn from_parts(
        action: impl Into<String>,
        data: Value,
        signature: Signature,
        public_key: PublicKey,
        pulse: Pulse,
    ) -> Result<Self, LedgerError> {
        let mut entry = Self {
            action: action.into(),
            data,
            signature,
            public_key,
            pulse,
            hash: String::new(),
        };
        entry.hash = entry.recompute_hash()?;
        Ok(entry)
    }

    /// Hash of the entry's current fields.
    pub fn recompute_hash(&self) -> Result<String, LedgerError> {
        Ok(canonical::hash(&HashedContent {
            action: &self.action,
            data: &self.data,
            signature: &self.signature,
            public_key: &self.public_key,
            pulse: self.pulse,
        })?)
    }

    /// Check the signature against the embedded public key.
    ///
    /// The DID in the signed payload is re-derived from the key rather than
    /// stored, so an entry cannot claim someone else's identity.
    pub fn verify(&self) -> bool {
        let did = self.signer_did();
        verify_payload(
            &self.public_key,
            &SignedContent {
                action: &self.action,
                data: &self.data,
                pulse: self.pulse,
                did: &did,
            },
            &self.signature,
        )
    }

    pub fn signer_did(&self) -> Did {
        self.public_key.did()
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn pulse(&self) -> Pulse {
        self.pulse
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}
