use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use resub_crypto::{canonical, PublicKey, Signature, Signer};
use resub_types::{Did, Pulse};

use crate::error::{FabricError, Result};

/// Closed set of event categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Kernel,
    Ledger,
    Identity,
    Economic,
    Governance,
    Messaging,
    Federation,
    App,
    ReputationScoring,
    System,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Self::Kernel,
        Self::Ledger,
        Self::Identity,
        Self::Economic,
        Self::Governance,
        Self::Messaging,
        Self::Federation,
        Self::App,
        Self::ReputationScoring,
        Self::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::Ledger => "ledger",
            Self::Identity => "identity",
            Self::Economic => "economic",
            Self::Governance => "governance",
            Self::Messaging => "messaging",
            Self::Federation => "federation",
            Self::App => "app",
            Self::ReputationScoring => "reputation-scoring",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| FabricError::InvalidCategory(s.to_string()))
    }
}

/// Dispatch urgency. Lower sorts first: `Critical < High < Normal < Low`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

/// Event identifier, `evt-{timestamp}-{nonce}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(timestamp: Pulse, nonce: &str) -> Self {
        Self(format!("evt-{timestamp}-{nonce}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options accepted by [`EventFabric::emit`](crate::EventFabric::emit).
#[derive(Clone, Debug, Default)]
pub struct EmitOptions {
    pub priority: Priority,
    pub metadata: BTreeMap<String, Value>,
}

impl EmitOptions {
    pub fn priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Default::default()
        }
    }
}

/// Changes applied by [`FabricEvent::evolve`].
#[derive(Clone, Debug, Default)]
pub struct EventPatch {
    pub payload: Option<Value>,
    pub priority: Option<Priority>,
    /// Merged over the existing metadata; later keys win.
    pub metadata: BTreeMap<String, Value>,
}

/// A single event flowing through the fabric.
///
/// Fields are private; an emitted event is never modified. Use
/// [`FabricEvent::evolve`] to derive a changed copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FabricEvent {
    id: EventId,
    category: Category,
    #[serde(rename = "type")]
    event_type: String,
    payload: Value,
    #[serde(default)]
    source: Option<Did>,
    timestamp: Pulse,
    priority: Priority,
    #[serde(default)]
    signature: Option<Signature>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

/// The signed portion of an event.
#[derive(Serialize)]
struct SignedContent<'a> {
    category: Category,
    #[serde(rename = "type")]
    event_type: &'a str,
    payload: &'a Value,
    source: &'a Option<Did>,
    timestamp: Pulse,
}

impl FabricEvent {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: EventId,
        category: Category,
        event_type: String,
        payload: Value,
        source: Option<Did>,
        timestamp: Pulse,
        priority: Priority,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            id,
            category,
            event_type,
            payload,
            source,
            timestamp,
            priority,
            signature: None,
            metadata,
        }
    }

    /// Canonical digest of the signed fields.
    pub fn content_digest(&self) -> Result<String> {
        Ok(canonical::hash(&SignedContent {
            category: self.category,
            event_type: &self.event_type,
            payload: &self.payload,
            source: &self.source,
            timestamp: self.timestamp,
        })?)
    }

    pub(crate) fn sign(mut self, signer: &dyn Signer) -> Result<Self> {
        let digest = self.content_digest()?;
        self.signature = Some(signer.sign_message(digest.as_bytes()));
        Ok(self)
    }

    /// Check the attached signature against `public_key`. Unsigned events
    /// never verify.
    pub fn verify_signature(&self, public_key: &PublicKey) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        match self.content_digest() {
            Ok(digest) => public_key.verify(digest.as_bytes(), signature).is_ok(),
            Err(_) => false,
        }
    }

    /// Derive a new event with `patch` applied.
    ///
    /// The signature is dropped when the payload changes, since it no
    /// longer covers the content.
    pub fn evolve(&self, patch: EventPatch) -> FabricEvent {
        let mut next = self.clone();
        if let Some(payload) = patch.payload {
            if payload != next.payload {
                next.signature = None;
            }
            next.payload = payload;
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        next.metadata.extend(patch.metadata);
        next
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn source(&self) -> Option<&Did> {
        self.source.as_ref()
    }

    pub fn timestamp(&self) -> Pulse {
        self.timestamp
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }
}
