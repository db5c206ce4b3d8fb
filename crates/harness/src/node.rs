//! Nodes under test and the cluster they form

use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use rand::seq::SliceRandom;
use tracing::info;

use relaycheck_api::mock::{MockCluster, MockClusterConfig};
use relaycheck_api::{HttpNodeApi, NodeApi};
use relaycheck_core::{Address, AddressKind, PeerId};
use relaycheck_settings::ClusterSettings;

use crate::config::Timeouts;
use crate::{CheckError, Result};

/// A node with its identities resolved
#[derive(Clone)]
pub struct Node {
    /// Fixture name ("1".."5")
    pub name: String,
    /// On-chain address
    pub address: Address,
    /// Network identity
    pub peer_id: PeerId,
    pub api: Arc<dyn NodeApi>,
}

impl Node {
    /// Resolve both identities of the node behind `api`
    pub async fn connect(name: &str, api: Arc<dyn NodeApi>) -> Result<Self> {
        let (address, peer_id) = futures::try_join!(
            api.address(AddressKind::Native),
            api.address(AddressKind::Hopr)
        )?;
        info!("Node {}: address {} peer {}", name, address, peer_id);
        Ok(Self {
            name: name.to_string(),
            address,
            peer_id,
            api,
        })
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("peer_id", &self.peer_id)
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.name)
    }
}

/// Named node set with its roles
#[derive(Debug, Clone)]
pub struct Cluster {
    nodes: Vec<Node>,
    default_nodes: Vec<String>,
    passive_node: Option<String>,
}

impl Cluster {
    pub fn new(
        nodes: Vec<Node>,
        default_nodes: Vec<String>,
        passive_node: Option<String>,
    ) -> Result<Self> {
        let known = |name: &String| nodes.iter().any(|n| &n.name == name);
        if let Some(missing) = default_nodes.iter().chain(passive_node.iter()).find(|n| !known(*n)) {
            return Err(CheckError::UnknownNode(missing.clone()));
        }
        if default_nodes.len() < 2 {
            return Err(CheckError::Config(
                "at least two default nodes are required".to_string(),
            ));
        }
        Ok(Self {
            nodes,
            default_nodes,
            passive_node,
        })
    }

    /// Connect to the live nodes listed in the settings
    pub async fn connect(settings: &ClusterSettings, timeouts: &Timeouts) -> Result<Self> {
        let nodes = try_join_all(settings.nodes.iter().map(|endpoint| async move {
            let token = (!endpoint.api_token.is_empty()).then(|| endpoint.api_token.clone());
            let api = HttpNodeApi::new(&endpoint.api_url, token, timeouts.request)?;
            Node::connect(&endpoint.name, Arc::new(api)).await
        }))
        .await?;
        Self::new(
            nodes,
            settings.default_nodes.clone(),
            settings.passive_node.clone(),
        )
    }

    /// Five simulated nodes: "1".."4" routable, "5" passive
    pub async fn simulated(config: MockClusterConfig) -> Result<(MockCluster, Self)> {
        let (mock, handles) = MockCluster::standard(config);
        let nodes = try_join_all(handles.into_iter().map(|handle| async move {
            let name = handle.name().to_string();
            Node::connect(&name, Arc::new(handle)).await
        }))
        .await?;
        let defaults = ["1", "2", "3", "4"].iter().map(|n| n.to_string()).collect();
        let cluster = Self::new(nodes, defaults, Some("5".to_string()))?;
        Ok((mock, cluster))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| CheckError::UnknownNode(name.to_string()))
    }

    /// The routable nodes, in configured order
    pub fn default_nodes(&self) -> Vec<&Node> {
        self.default_nodes
            .iter()
            .filter_map(|name| self.nodes.iter().find(|n| &n.name == name))
            .collect()
    }

    pub fn passive_node(&self) -> Result<&Node> {
        let name = self
            .passive_node
            .as_deref()
            .ok_or_else(|| CheckError::Config("no passive node configured".to_string()))?;
        self.node(name)
    }

    pub fn random_default_node(&self) -> Result<&Node> {
        self.default_nodes()
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or_else(|| CheckError::Config("no default nodes".to_string()))
    }

    pub fn random_node(&self) -> Result<&Node> {
        self.nodes
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| CheckError::Config("empty cluster".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_cluster_roles() {
        let (_mock, cluster) = Cluster::simulated(MockClusterConfig::default()).await.unwrap();
        assert_eq!(cluster.nodes().len(), 5);
        assert_eq!(cluster.default_nodes().len(), 4);
        assert_eq!(cluster.passive_node().unwrap().name, "5");
        assert!(cluster.node("9").is_err());

        let node = cluster.node("1").unwrap();
        assert!(node.address.starts_with("0x"));
        assert_ne!(node.address, node.peer_id);
        assert_ne!(cluster.random_default_node().unwrap().name, "5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_role_names_rejected() {
        let (_mock, cluster) = Cluster::simulated(MockClusterConfig::default()).await.unwrap();
        let nodes = cluster.nodes().to_vec();

        let err = Cluster::new(nodes.clone(), vec!["1".into(), "7".into()], None).unwrap_err();
        assert!(matches!(err, CheckError::UnknownNode(name) if name == "7"));

        let err = Cluster::new(nodes.clone(), vec!["1".into()], None).unwrap_err();
        assert!(matches!(err, CheckError::Config(_)));

        let cluster = Cluster::new(nodes, vec!["1".into(), "2".into()], None).unwrap();
        assert!(cluster.passive_node().is_err());
    }
}
