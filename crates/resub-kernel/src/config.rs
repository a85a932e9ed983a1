use std::path::Path;

use serde::{Deserialize, Serialize};

use resub_fabric::FabricConfig;

use crate::error::ConfigError;

/// Configuration for the [`Kernel`](crate::Kernel).
///
/// Every field has a default, so a config file only needs the keys it
/// changes:
///
/// ```toml
/// max_transaction_bytes = 65536
///
/// [fabric]
/// batch_size = 10
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Reject transactions whose nonce is already recorded.
    pub replay_protection: bool,
    /// Sign each transaction with the kernel identity.
    pub sign_transactions: bool,
    /// Upper bound on a transaction's canonical encoding.
    pub max_transaction_bytes: usize,
    /// Start the fabric during boot so events dispatch as they are emitted.
    pub start_fabric: bool,
    /// Settings for a fabric built from this config.
    pub fabric: FabricConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            replay_protection: true,
            sign_transactions: true,
            max_transaction_bytes: 1_048_576,
            start_fabric: true,
            fabric: FabricConfig::default(),
        }
    }
}

impl KernelConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        assert_eq!(KernelConfig::from_toml_str("").unwrap(), KernelConfig::default());
    }

    #[test]
    fn partial_config_overrides_only_given_keys() {
        let config = KernelConfig::from_toml_str(
            "sign_transactions = false\n[fabric]\nbatch_size = 7\n",
        )
        .unwrap();
        assert!(!config.sign_transactions);
        assert!(config.replay_protection);
        assert_eq!(config.max_transaction_bytes, 1_048_576);
        assert_eq!(config.fabric.batch_size, 7);
        assert_eq!(config.fabric.max_subscriptions, 1000);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = KernelConfig::from_toml_str("replay_protection = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_transaction_bytes = 512").unwrap();
        let config = KernelConfig::load(file.path()).unwrap();
        assert_eq!(config.max_transaction_bytes, 512);
    }

    #[test]
    fn load_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        match KernelConfig::load(&path) {
            Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected read error, got {other:?}"),
        }
    }
}
