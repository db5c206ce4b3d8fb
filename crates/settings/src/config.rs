//! Configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Result, SettingsError};

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Nodes under test
    #[serde(default)]
    pub cluster: ClusterSettings,

    /// Scenario constants and timeouts
    #[serde(default)]
    pub scenario: ScenarioSettings,
}

impl Settings {
    /// Load settings from a specific path, or create defaults
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let settings: Settings =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            info!("Loaded settings from {:?}", path);
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Check node roles refer to configured nodes and constants are usable
    pub fn validate(&self) -> Result<()> {
        let cluster = &self.cluster;
        for name in &cluster.default_nodes {
            if cluster.node(name).is_none() {
                return Err(SettingsError::Invalid(format!(
                    "default node {} is not configured",
                    name
                )));
            }
        }
        if let Some(passive) = &cluster.passive_node {
            if cluster.node(passive).is_none() {
                return Err(SettingsError::Invalid(format!(
                    "passive node {} is not configured",
                    passive
                )));
            }
        }
        if cluster.default_nodes.len() < 2 {
            return Err(SettingsError::Invalid(
                "at least two default nodes are required".to_string(),
            ));
        }
        if self.scenario.poll_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.scenario.aggregation_threshold == 0 {
            return Err(SettingsError::Invalid(
                "aggregation_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// API endpoint of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    /// Fixture name ("1".."5")
    pub name: String,

    /// Base URL of the REST API, e.g. `http://127.0.0.1:13301`
    pub api_url: String,

    #[serde(default)]
    pub api_token: String,
}

/// Cluster layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    #[serde(default = "default_nodes")]
    pub nodes: Vec<NodeEndpoint>,

    /// Routable set used for random pair and route selection
    #[serde(default = "default_node_names")]
    pub default_nodes: Vec<String>,

    /// Node running no automatic ticket strategy
    #[serde(default = "default_passive_node")]
    pub passive_node: Option<String>,
}

impl ClusterSettings {
    pub fn node(&self, name: &str) -> Option<&NodeEndpoint> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

fn default_nodes() -> Vec<NodeEndpoint> {
    (1..=5)
        .map(|i| NodeEndpoint {
            name: i.to_string(),
            api_url: format!("http://127.0.0.1:{}", 13300 + i),
            api_token: String::new(),
        })
        .collect()
}

fn default_node_names() -> Vec<String> {
    (1..=4).map(|i| i.to_string()).collect()
}

fn default_passive_node() -> Option<String> {
    Some("5".to_string())
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            default_nodes: default_node_names(),
            passive_node: default_passive_node(),
        }
    }
}

/// Scenario constants; timeouts in seconds unless suffixed otherwise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSettings {
    /// Funding of channels opened by the scenarios
    pub funding_value: u128,
    /// Fallback ticket price when the node does not report one
    pub ticket_price_per_hop: u128,
    /// Ticket count at which nodes aggregate automatically (T)
    pub aggregation_threshold: u32,
    pub poll_interval_ms: u64,
    pub channel_status_timeout_secs: u64,
    /// Pause between the two close requests of a channel
    pub closure_cooldown_secs: u64,
    pub delivery_timeout_secs: u64,
    pub extended_delivery_timeout_secs: u64,
    pub unredeemed_timeout_secs: u64,
    pub redemption_timeout_secs: u64,
    pub action_retry_timeout_secs: u64,
    pub connectivity_timeout_secs: u64,
    /// Pause letting late tickets arrive before redeeming
    pub aggregation_settle_secs: u64,
    pub auto_redeem_timeout_secs: u64,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            funding_value: 1000,
            ticket_price_per_hop: 100,
            aggregation_threshold: 100,
            poll_interval_ms: 500,
            channel_status_timeout_secs: 10,
            closure_cooldown_secs: 15,
            delivery_timeout_secs: 30,
            extended_delivery_timeout_secs: 60,
            unredeemed_timeout_secs: 30,
            redemption_timeout_secs: 120,
            action_retry_timeout_secs: 20,
            connectivity_timeout_secs: 60,
            aggregation_settle_secs: 10,
            auto_redeem_timeout_secs: 60,
            request_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.cluster.nodes.len(), 5);
        assert_eq!(settings.cluster.default_nodes.len(), 4);
        assert_eq!(settings.cluster.passive_node.as_deref(), Some("5"));
        assert_eq!(settings.scenario.closure_cooldown_secs, 15);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let json = r#"{"scenario": {"funding_value": 5000}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.scenario.funding_value, 5000);
        assert_eq!(settings.scenario.poll_interval_ms, 500);
        assert_eq!(settings.cluster.nodes[0].api_url, "http://127.0.0.1:13301");
    }

    #[test]
    fn test_no_passive_node() {
        let json = r#"{"cluster": {"passive_node": null}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert!(settings.cluster.passive_node.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_default_node() {
        let mut settings = Settings::default();
        settings.cluster.default_nodes.push("9".to_string());
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("default node 9"));
    }

    #[test]
    fn test_validate_needs_two_default_nodes() {
        let mut settings = Settings::default();
        settings.cluster.default_nodes.truncate(1);
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut settings = Settings::default();
        settings.scenario.poll_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("relaycheck-settings-{}", std::process::id()));
        let path = dir.join("settings.json");
        let mut settings = Settings::default();
        settings.scenario.aggregation_threshold = 7;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.scenario.aggregation_threshold, 7);
        assert_eq!(loaded.cluster.nodes, settings.cluster.nodes);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = PathBuf::from("/nonexistent/relaycheck/settings.json");
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.scenario, ScenarioSettings::default());
    }
}
