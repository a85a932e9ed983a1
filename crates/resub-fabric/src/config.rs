use serde::{Deserialize, Serialize};

/// Configuration for the [`EventFabric`](crate::EventFabric).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Number of pending events delivered per dispatch batch.
    pub batch_size: usize,
    /// Maximum number of live subscriptions.
    pub max_subscriptions: usize,
    /// Sign emitted events when an identity is attached.
    pub sign_events: bool,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_subscriptions: 1000,
            sign_events: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: FabricConfig = serde_json::from_str(r#"{"batch_size": 5}"#).unwrap();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_subscriptions, 1000);
        assert!(config.sign_events);
    }
}
