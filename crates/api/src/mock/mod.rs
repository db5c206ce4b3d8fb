//! In-process simulated cluster
//!
//! Lets the harness run every scenario without live nodes. The cluster
//! keeps one authoritative state behind a mutex; each [`MockNode`] is a
//! handle answering [`NodeApi`] calls from its own point of view.
//!
//! Timing uses `tokio::time::Instant`, so tests running with a paused
//! clock advance through index delays, delivery delays and the closure
//! window without real waiting.

mod state;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{Duration, Instant};
use tracing::info;

use relaycheck_core::{
    AddressKind, Balances, ChannelId, ChannelStatus, ChannelView, ChannelsListing, MessageBatch,
    PeerId, PeerInfo, PingResponse, ReceivedMessage, Ticket, TicketStatistics,
};

use crate::{NodeApi, Result};
use state::ClusterState;

/// Behaviour knobs of the simulated network
#[derive(Debug, Clone)]
pub struct MockClusterConfig {
    /// Price of one relayed packet, per hop
    pub ticket_price: u128,
    /// Unredeemed ticket count at which auto-strategy nodes aggregate and redeem
    pub aggregation_threshold: u32,
    /// Delay before the channel source indexes a transition
    pub source_index_delay: Duration,
    /// Delay before every other node indexes a transition
    pub counterparty_index_delay: Duration,
    /// Per-hop delivery delay
    pub hop_delay: Duration,
    /// Minimum time between the two close requests of a channel
    pub closure_window: Duration,
    /// Time for a redemption request to settle
    pub redeem_delay: Duration,
    /// After the last incoming ticket, redeem/aggregate requests are refused
    pub busy_window: Duration,
    /// Time until nodes see each other as peers
    pub discovery_delay: Duration,
    pub initial_native_balance: u128,
    pub initial_safe_balance: u128,
    /// Native balance consumed by a funding transaction
    pub fund_gas_cost: u128,
}

impl Default for MockClusterConfig {
    fn default() -> Self {
        Self {
            ticket_price: 100,
            aggregation_threshold: 100,
            source_index_delay: Duration::from_millis(200),
            counterparty_index_delay: Duration::from_millis(1200),
            hop_delay: Duration::from_millis(300),
            closure_window: Duration::from_secs(10),
            redeem_delay: Duration::from_secs(2),
            busy_window: Duration::from_secs(1),
            discovery_delay: Duration::from_secs(1),
            initial_native_balance: 1_000_000_000_000_000_000,
            initial_safe_balance: 10_000_000,
            fund_gas_cost: 1_000_000,
        }
    }
}

/// Shared simulated network
#[derive(Clone)]
pub struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MockCluster {
    pub fn new(config: MockClusterConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClusterState::new(config))),
        }
    }

    /// Five nodes named "1".."5"; the first four run the auto-redeem
    /// strategy, node "5" stays passive
    pub fn standard(config: MockClusterConfig) -> (Self, Vec<MockNode>) {
        let cluster = Self::new(config);
        let nodes = (1..=5)
            .map(|i| cluster.add_node(&i.to_string(), i != 5))
            .collect();
        info!("Mock cluster started with 5 nodes");
        (cluster, nodes)
    }

    pub fn add_node(&self, name: &str, auto_strategy: bool) -> MockNode {
        let index = self
            .state
            .lock()
            .add_node(name, auto_strategy, Instant::now());
        MockNode {
            index,
            name: name.to_string(),
            state: self.state.clone(),
        }
    }

    pub fn config(&self) -> MockClusterConfig {
        self.state.lock().config.clone()
    }

    /// On-chain status of every channel ever opened, ignoring index delays
    pub fn channel_statuses(&self) -> Vec<(ChannelId, ChannelStatus)> {
        self.state.lock().channel_statuses()
    }

    /// Channels not yet closed on-chain
    pub fn unclosed_channels(&self) -> usize {
        self.channel_statuses()
            .iter()
            .filter(|(_, status)| *status != ChannelStatus::Closed)
            .count()
    }
}

/// One node of a [`MockCluster`]
#[derive(Clone)]
pub struct MockNode {
    index: usize,
    name: String,
    state: Arc<Mutex<ClusterState>>,
}

impl MockNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ClusterState, usize, Instant) -> R) -> R {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.settle(now);
        f(&mut state, self.index, now)
    }
}

impl std::fmt::Debug for MockNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNode")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish()
    }
}

#[async_trait]
impl NodeApi for MockNode {
    async fn open_channel(&self, destination: &str, amount: u128) -> Result<Option<ChannelId>> {
        Ok(self.with_state(|s, me, now| s.open_channel(me, destination, amount, now)))
    }

    async fn close_channel(&self, channel_id: &str) -> Result<bool> {
        Ok(self.with_state(|s, me, now| s.close_channel(me, channel_id, now)))
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelView>> {
        Ok(self.with_state(|s, me, now| s.get_channel(me, channel_id, now)))
    }

    async fn all_channels(&self, include_closed: bool) -> Result<ChannelsListing> {
        Ok(self.with_state(|s, me, now| s.all_channels(me, include_closed, now)))
    }

    async fn fund_channel(&self, channel_id: &str, amount: u128) -> Result<bool> {
        Ok(self.with_state(|s, me, _| s.fund_channel(me, channel_id, amount)))
    }

    async fn send_message(
        &self,
        destination: &str,
        body: &str,
        path: &[PeerId],
        tag: u16,
    ) -> Result<bool> {
        Ok(self.with_state(|s, me, now| s.send_message(me, destination, body, path, tag, now)))
    }

    async fn messages_pop(&self, tag: u16) -> Result<Option<ReceivedMessage>> {
        Ok(self.with_state(|s, me, now| s.messages_pop(me, tag, now)))
    }

    async fn messages_peek_all(&self, tag: u16) -> Result<Option<MessageBatch>> {
        Ok(Some(self.with_state(|s, me, now| s.messages_peek_all(me, tag, now))))
    }

    async fn tickets_statistics(&self) -> Result<TicketStatistics> {
        Ok(self.with_state(|s, me, _| s.tickets_statistics(me)))
    }

    async fn channel_tickets(&self, channel_id: &str) -> Result<Vec<Ticket>> {
        Ok(self.with_state(|s, me, _| s.channel_tickets(me, channel_id)))
    }

    async fn channel_redeem_tickets(&self, channel_id: &str) -> Result<bool> {
        Ok(self.with_state(|s, me, now| s.redeem_tickets(me, Some(channel_id), now)))
    }

    async fn redeem_all_tickets(&self) -> Result<bool> {
        Ok(self.with_state(|s, me, now| s.redeem_tickets(me, None, now)))
    }

    async fn channel_aggregate_tickets(&self, channel_id: &str) -> Result<bool> {
        Ok(self.with_state(|s, me, now| s.aggregate_tickets(me, channel_id, now)))
    }

    async fn peers(&self) -> Result<Vec<PeerInfo>> {
        Ok(self.with_state(|s, me, now| s.peers(me, now)))
    }

    async fn ping(&self, peer_id: &str) -> Result<Option<PingResponse>> {
        Ok(self.with_state(|s, me, now| s.ping(me, peer_id, now)))
    }

    async fn balances(&self) -> Result<Balances> {
        Ok(self.with_state(|s, me, _| s.balances(me)))
    }

    async fn address(&self, kind: AddressKind) -> Result<String> {
        Ok(self.with_state(|s, me, _| s.address(me, kind)))
    }

    async fn ticket_price(&self) -> Result<Option<u128>> {
        Ok(self.with_state(|s, _, _| Some(s.config.ticket_price)))
    }

    async fn set_alias(&self, alias: &str, peer_id: &str) -> Result<bool> {
        Ok(self.with_state(|s, me, _| s.set_alias(me, alias, peer_id)))
    }

    async fn get_alias(&self, alias: &str) -> Result<Option<PeerId>> {
        Ok(self.with_state(|s, me, _| s.get_alias(me, alias)))
    }

    async fn remove_alias(&self, alias: &str) -> Result<bool> {
        Ok(self.with_state(|s, me, _| s.remove_alias(me, alias)))
    }
}
