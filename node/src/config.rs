//! Node configuration: endpoints from the CLI, consensus parameters from
//! the TOML file.

use ember_types::ChainParams;

use crate::error::NodeError;

/// Everything a node needs to start.
///
/// The chain parameters come from the `--config` TOML file; the rest from
/// CLI flags. The whole value is immutable after startup.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Human-readable node name, tagged onto every log line.
    pub name: String,
    /// Host peers use to reach the WebSocket endpoint.
    pub websocket_host: String,
    /// WebSocket listening port (0 picks an ephemeral port).
    pub websocket_port: u16,
    /// HTTP API host.
    pub http_host: String,
    /// HTTP API port (0 picks an ephemeral port).
    pub http_port: u16,
    /// Consensus parameters.
    pub chain: ChainParams,
}

impl NodeConfig {
    /// Parse the `[block_gen]` / `[transaction]` sections from a TOML file.
    /// An unreadable or unparsable file is fatal.
    pub fn load_chain_params(path: &str) -> Result<ChainParams, NodeError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(format!("{path}: {e}")))?;
        Self::parse_chain_params(&contents)
    }

    pub fn parse_chain_params(toml_str: &str) -> Result<ChainParams, NodeError> {
        toml::from_str(toml_str).map_err(|e| NodeError::Config(e.to_string()))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "ember".to_string(),
            websocket_host: "127.0.0.1".to_string(),
            websocket_port: 0,
            http_host: "127.0.0.1".to_string(),
            http_port: 0,
            chain: ChainParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_disables_both_features() {
        let params = NodeConfig::parse_chain_params("").unwrap();
        assert!(!params.pow_enabled());
        assert!(!params.transactions_enabled());
    }

    #[test]
    fn full_config_parses_both_sections() {
        let params = NodeConfig::parse_chain_params(
            r#"
            [block_gen]
            time_expected = 10
            difficulty_init = 2.0
            difficulty_adjust_after = 10
            difficulty_adjust_factor_limit = 16.0

            [transaction]
            reward_amount = 50
            "#,
        )
        .unwrap();
        assert!(params.pow_enabled());
        assert_eq!(params.transaction.unwrap().reward_amount, 50);
    }

    #[test]
    fn malformed_config_is_fatal() {
        let err = NodeConfig::parse_chain_params("[block_gen]\ntime_expected = \"soon\"")
            .unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = NodeConfig::load_chain_params("/nonexistent/ember.toml").unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
