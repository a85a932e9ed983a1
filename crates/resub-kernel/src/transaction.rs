use serde::{Deserialize, Serialize};
use serde_json::Value;

use resub_crypto::{
    canonical, sign_payload, verify_payload, CanonicalError, PublicKey, Signature, Signer,
};
use resub_types::Pulse;

/// A hashed, optionally signed state change.
///
/// The hash covers `{type, payload, nonce, pulse}`; the signature covers
/// `{hash, nonce}`. Transactions are never modified after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    tx_type: String,
    payload: Value,
    nonce: String,
    pulse: Pulse,
    hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<Signature>,
}

#[derive(Serialize)]
struct HashedContent<'a> {
    #[serde(rename = "type")]
    tx_type: &'a str,
    payload: &'a Value,
    nonce: &'a str,
    pulse: Pulse,
}

#[derive(Serialize)]
struct SignedContent<'a> {
    hash: &'a str,
    nonce: &'a str,
}

/// Outcome of a successful execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub success: bool,
    pub transaction: Transaction,
    pub state_hash: String,
    pub transaction_count: u64,
}

impl Transaction {
    /// Build an unsigned transaction and compute its hash.
    pub fn new(
        tx_type: impl Into<String>,
        payload: Value,
        nonce: impl Into<String>,
        pulse: Pulse,
    ) -> Result<Self, CanonicalError> {
        let mut tx = Self {
            tx_type: tx_type.into(),
            payload,
            nonce: nonce.into(),
            pulse,
            hash: String::new(),
            signature: None,
        };
        tx.hash = tx.content_hash()?;
        Ok(tx)
    }

    /// Hash of the transaction's current content.
    pub fn content_hash(&self) -> Result<String, CanonicalError> {
        canonical::hash(&HashedContent {
            tx_type: &self.tx_type,
            payload: &self.payload,
            nonce: &self.nonce,
            pulse: self.pulse,
        })
    }

    pub(crate) fn sign(mut self, signer: &dyn Signer) -> Result<Self, CanonicalError> {
        let signature = sign_payload(
            signer,
            &SignedContent {
                hash: &self.hash,
                nonce: &self.nonce,
            },
        )?;
        self.signature = Some(signature);
        Ok(self)
    }

    /// Check the signature against `public_key`. Unsigned transactions never
    /// verify.
    pub fn verify_signature(&self, public_key: &PublicKey) -> bool {
        self.signature.as_ref().is_some_and(|signature| {
            verify_payload(
                public_key,
                &SignedContent {
                    hash: &self.hash,
                    nonce: &self.nonce,
                },
                signature,
            )
        })
    }

    /// Length in bytes of the canonical encoding.
    pub fn canonical_size(&self) -> Result<usize, CanonicalError> {
        Ok(canonical::encode(self)?.len())
    }

    pub fn tx_type(&self) -> &str {
        &self.tx_type
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn pulse(&self) -> Pulse {
        self.pulse
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }
}
