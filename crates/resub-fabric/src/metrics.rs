use serde::{Deserialize, Serialize};

/// Counters maintained by the fabric.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FabricMetrics {
    pub events_emitted: u64,
    /// Successful live handler invocations.
    pub events_delivered: u64,
    pub events_replayed: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_errors: u64,
    pub rate_limited_skips: u64,
    pub batches_dispatched: u64,
    /// Live subscriptions at the time the metrics were read.
    pub active_subscriptions: usize,
}
