//! Event fabric for the reputation substrate.
//!
//! An in-process publish/subscribe bus that decouples producers from
//! consumers. Events are validated, stamped with logical time, optionally
//! signed, retained permanently, and dispatched to pattern-matched
//! subscribers in priority order. The retained log can be replayed to the
//! current subscribers at any time.
//!
//! [`EventFabric`] is a cheap handle; clone it and pass it to whoever
//! needs to publish or subscribe.

pub mod config;
pub mod error;
pub mod event;
pub mod fabric;
pub mod metrics;
pub mod pattern;
pub mod subscription;

pub use config::FabricConfig;
pub use error::{FabricError, Result};
pub use event::{Category, EmitOptions, EventId, EventPatch, FabricEvent, Priority};
pub use fabric::{EventFabric, FabricExport, ReplaySummary, FABRIC_VERSION};
pub use metrics::FabricMetrics;
pub use pattern::Pattern;
pub use subscription::{Delivery, SubscribeOptions, SubscriptionHandle};
