//! Scenario catalogue and session
//!
//! A [`Session`] is prepared once per run: it waits until the routable
//! nodes see each other and probes the ticket price, then runs scenarios
//! one after another. A failing scenario is reported and the next one
//! still runs.

mod basic;
mod channels;
mod tickets;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use futures::future::try_join_all;
use tokio::time::{Duration, Instant};
use tracing::{error, info};

use relaycheck_core::PeerId;

use crate::config::ScenarioConfig;
use crate::delivery::ReadMode;
use crate::node::{Cluster, Node};
use crate::poll::{poll_until, Probe};
use crate::route::random_distinct_pairs;
use crate::{CheckError, Result};

/// Every scenario the harness knows, by stable name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    CheckBalances,
    AliasPeers,
    PingPeers,
    PingSelfTimesOut,
    NoUnredeemedWithoutTraffic,
    ZeroHopPop,
    ZeroHopPeek,
    FundChannel,
    RedeemInChannel,
    OutOfFunding,
    OneHopToSelf,
    AggregateInChannel,
    NHop,
    CloseWithUnredeemed,
    OpenCloseWithoutTickets,
    AutoAggregation,
    ChannelStatusSanity,
    TicketPrice,
}

impl ScenarioKind {
    /// All scenarios in run order
    pub const ALL: [ScenarioKind; 18] = [
        Self::CheckBalances,
        Self::AliasPeers,
        Self::PingPeers,
        Self::PingSelfTimesOut,
        Self::NoUnredeemedWithoutTraffic,
        Self::ZeroHopPop,
        Self::ZeroHopPeek,
        Self::FundChannel,
        Self::RedeemInChannel,
        Self::OutOfFunding,
        Self::OneHopToSelf,
        Self::AggregateInChannel,
        Self::NHop,
        Self::CloseWithUnredeemed,
        Self::OpenCloseWithoutTickets,
        Self::AutoAggregation,
        Self::ChannelStatusSanity,
        Self::TicketPrice,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckBalances => "check-balances",
            Self::AliasPeers => "alias-peers",
            Self::PingPeers => "ping-peers",
            Self::PingSelfTimesOut => "ping-self-times-out",
            Self::NoUnredeemedWithoutTraffic => "no-unredeemed-without-traffic",
            Self::ZeroHopPop => "zero-hop-pop",
            Self::ZeroHopPeek => "zero-hop-peek",
            Self::FundChannel => "fund-channel",
            Self::RedeemInChannel => "redeem-in-channel",
            Self::OutOfFunding => "out-of-funding",
            Self::OneHopToSelf => "one-hop-to-self",
            Self::AggregateInChannel => "aggregate-in-channel",
            Self::NHop => "n-hop",
            Self::CloseWithUnredeemed => "close-with-unredeemed",
            Self::OpenCloseWithoutTickets => "open-close-without-tickets",
            Self::AutoAggregation => "auto-aggregation",
            Self::ChannelStatusSanity => "channel-status-sanity",
            Self::TicketPrice => "ticket-price",
        }
    }

    /// One-line description for listings
    pub fn summary(&self) -> &'static str {
        match self {
            Self::CheckBalances => "addresses are well-formed and balances are positive",
            Self::AliasPeers => "aliases can be set, read and removed",
            Self::PingPeers => "nodes of the same network answer pings",
            Self::PingSelfTimesOut => "pinging self yields no response",
            Self::NoUnredeemedWithoutTraffic => "no unredeemed tickets before any traffic",
            Self::ZeroHopPop => "0-hop messages arrive, read with pop",
            Self::ZeroHopPeek => "0-hop messages arrive, peek leaves them in place",
            Self::FundChannel => "funding a channel moves exactly the funded amount",
            Self::RedeemInChannel => "tickets earned in a channel can be redeemed",
            Self::OutOfFunding => "relaying over an exhausted channel rejects the ticket",
            Self::OneHopToSelf => "1-hop loop creates one redeemable ticket per message",
            Self::AggregateInChannel => "channel tickets aggregate into one on request",
            Self::NHop => "multi-hop routing pays the first relay",
            Self::CloseWithUnredeemed => "channels close despite unredeemed tickets",
            Self::OpenCloseWithoutTickets => "a channel opens and closes cleanly",
            Self::AutoAggregation => "the strategy aggregates and redeems at the threshold",
            Self::ChannelStatusSanity => "closed channels remain listed",
            Self::TicketPrice => "the node reports a positive ticket price",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| CheckError::Config(format!("unknown scenario: {}", s)))
    }
}

/// Outcome of one scenario
#[derive(Debug)]
pub struct ScenarioReport {
    pub kind: ScenarioKind,
    pub elapsed: Duration,
    pub result: Result<()>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// A prepared cluster plus the frozen scenario configuration
pub struct Session {
    cluster: Cluster,
    config: ScenarioConfig,
}

impl Session {
    /// Wait for connectivity between the routable nodes, then probe the
    /// ticket price
    pub async fn prepare(cluster: Cluster, config: ScenarioConfig) -> Result<Self> {
        await_connectivity(&cluster, &config).await?;

        let price = cluster.random_node()?.api.ticket_price().await?;
        let config = config.with_probed_price(price);
        info!(
            "Session ready: {} nodes, ticket price {}, threshold {}",
            cluster.nodes().len(),
            config.ticket_price,
            config.aggregation_threshold
        );
        Ok(Self { cluster, config })
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// A random ordered pair of distinct default nodes
    fn random_default_pair(&self) -> Result<(&Node, &Node)> {
        let names: Vec<&str> = self
            .cluster
            .default_nodes()
            .into_iter()
            .map(|n| n.name.as_str())
            .collect();
        let (left, right) = random_distinct_pairs(&names, 1)?
            .pop()
            .ok_or_else(|| CheckError::Config("no default node pair".to_string()))?;
        Ok((self.cluster.node(left)?, self.cluster.node(right)?))
    }

    pub async fn run(&self, kind: ScenarioKind) -> Result<()> {
        match kind {
            ScenarioKind::CheckBalances => basic::check_balances(self).await,
            ScenarioKind::AliasPeers => basic::alias_peers(self).await,
            ScenarioKind::PingPeers => basic::ping_peers(self).await,
            ScenarioKind::PingSelfTimesOut => basic::ping_self_times_out(self).await,
            ScenarioKind::NoUnredeemedWithoutTraffic => basic::no_unredeemed_without_traffic(self).await,
            ScenarioKind::ZeroHopPop => basic::zero_hop(self, ReadMode::Pop).await,
            ScenarioKind::ZeroHopPeek => basic::zero_hop(self, ReadMode::Peek).await,
            ScenarioKind::FundChannel => channels::fund_channel(self).await,
            ScenarioKind::RedeemInChannel => tickets::redeem_in_channel(self).await,
            ScenarioKind::OutOfFunding => tickets::out_of_funding(self).await,
            ScenarioKind::OneHopToSelf => tickets::one_hop_to_self(self).await,
            ScenarioKind::AggregateInChannel => tickets::aggregate_in_channel(self).await,
            ScenarioKind::NHop => tickets::n_hop(self).await,
            ScenarioKind::CloseWithUnredeemed => channels::close_with_unredeemed(self).await,
            ScenarioKind::OpenCloseWithoutTickets => channels::open_close_without_tickets(self).await,
            ScenarioKind::AutoAggregation => tickets::auto_aggregation(self).await,
            ScenarioKind::ChannelStatusSanity => basic::channel_status_sanity(self).await,
            ScenarioKind::TicketPrice => basic::ticket_price(self).await,
        }
    }

    /// Run `kinds` in order; every scenario runs regardless of earlier failures
    pub async fn run_all(&self, kinds: &[ScenarioKind]) -> Vec<ScenarioReport> {
        let mut reports = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            info!("Scenario {} started", kind);
            let started = Instant::now();
            let result = self.run(kind).await;
            let elapsed = started.elapsed();

            match &result {
                Ok(()) => info!("Scenario {} passed in {:.1?}", kind, elapsed),
                Err(e) => error!("Scenario {} failed after {:.1?}: {}", kind, elapsed, e),
            }
            reports.push(ScenarioReport {
                kind,
                elapsed,
                result,
            });
        }
        reports
    }
}

/// Every routable node must list every other routable node as a peer
async fn await_connectivity(cluster: &Cluster, config: &ScenarioConfig) -> Result<()> {
    let defaults = cluster.default_nodes();
    let timeouts = &config.timeouts;

    try_join_all(defaults.iter().map(|me| {
        let others: Vec<PeerId> = defaults
            .iter()
            .filter(|n| n.name != me.name)
            .map(|n| n.peer_id.clone())
            .collect();
        await_peers(me, others, timeouts.connectivity, timeouts.poll_interval)
    }))
    .await?;

    info!("All {} default nodes are connected", defaults.len());
    Ok(())
}

async fn await_peers(
    node: &Node,
    expected: Vec<PeerId>,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let what = format!("{} to see {} peers", node, expected.len());
    poll_until(&what, timeout, interval, || missing_peers(node, &expected)).await
}

async fn missing_peers(node: &Node, expected: &[PeerId]) -> Result<Probe<()>> {
    let peers = node.api.peers().await?;
    let seen: HashSet<&str> = peers.iter().map(|p| p.peer_id.as_str()).collect();
    let missing: Vec<&str> = expected
        .iter()
        .map(String::as_str)
        .filter(|p| !seen.contains(p))
        .collect();

    if missing.is_empty() {
        Ok(Probe::Ready(()))
    } else {
        Ok(Probe::Pending(format!("missing {}", missing.join(", "))))
    }
}
