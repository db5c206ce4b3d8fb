//! Authoritative state of the simulated cluster
//!
//! Every query first settles the state up to "now" (finished
//! redemptions, automatic aggregation) and then answers from the point
//! of view of the calling node: channel transitions only become visible
//! to a node once its index delay has passed, inbox entries once their
//! delivery delay has passed.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::{Duration, Instant};
use tracing::debug;

use relaycheck_core::{
    format_balance, Address, AddressKind, Balances, ChannelId, ChannelStatus, ChannelView,
    ChannelsListing, MessageBatch, PeerId, PeerInfo, PingResponse, ReceivedMessage, Ticket,
    TicketStatistics, NATIVE_UNIT, TOKEN_UNIT,
};

use super::MockClusterConfig;

#[derive(Debug, Clone, Copy)]
struct Transition {
    status: ChannelStatus,
    source_sees_at: Instant,
    others_see_at: Instant,
}

#[derive(Debug)]
struct ChannelRecord {
    id: ChannelId,
    source: usize,
    destination: usize,
    balance: u128,
    history: Vec<Transition>,
    closure_started: Option<Instant>,
}

impl ChannelRecord {
    /// Status as recorded on-chain, regardless of indexing
    fn status(&self) -> ChannelStatus {
        self.history
            .last()
            .map(|t| t.status)
            .unwrap_or(ChannelStatus::Closed)
    }

    /// Status as indexed by `node` at `now`, `None` if not indexed yet
    fn seen_by(&self, node: usize, now: Instant) -> Option<ChannelStatus> {
        self.history
            .iter()
            .rev()
            .find(|t| {
                let at = if node == self.source {
                    t.source_sees_at
                } else {
                    t.others_see_at
                };
                at <= now
            })
            .map(|t| t.status)
    }
}

#[derive(Debug, Clone)]
struct HeldTicket {
    channel_id: ChannelId,
    amount: u128,
    index: u64,
    index_offset: u32,
    /// Set once redemption was requested; the ticket is gone after this
    redeem_at: Option<Instant>,
}

impl HeldTicket {
    fn to_ticket(&self) -> Ticket {
        Ticket {
            channel_id: self.channel_id.clone(),
            amount: format_balance(self.amount, TOKEN_UNIT),
            index: self.index,
            index_offset: self.index_offset,
            win_prob: Some(1.0),
        }
    }
}

/// Merge tickets of one channel into a single aggregated ticket
fn merge_tickets(batch: Vec<HeldTicket>) -> Option<HeldTicket> {
    let mut iter = batch.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |mut acc, t| {
        acc.amount += t.amount;
        acc.index = acc.index.min(t.index);
        acc.index_offset += t.index_offset;
        acc
    }))
}

#[derive(Debug)]
struct InboxEntry {
    tag: u16,
    body: String,
    visible_at: Instant,
    received_at: u64,
}

impl InboxEntry {
    fn to_message(&self) -> ReceivedMessage {
        ReceivedMessage {
            tag: self.tag,
            body: self.body.clone(),
            received_at: self.received_at,
        }
    }
}

#[derive(Debug)]
struct NodeState {
    name: String,
    address: Address,
    peer_id: PeerId,
    joined_at: Instant,
    auto_strategy: bool,
    native: u128,
    safe_hopr: u128,
    safe_allowance: u128,
    aliases: HashMap<String, PeerId>,
    inbox: Vec<InboxEntry>,
    tickets: Vec<HeldTicket>,
    redeemed: u64,
    redeemed_value: u128,
    rejected: u64,
    rejected_value: u128,
    neglected: u64,
    neglected_value: u128,
    last_ticket_at: Option<Instant>,
}

impl NodeState {
    /// Tickets still arriving: aggregation and redemption are refused
    fn busy(&self, now: Instant, window: Duration) -> bool {
        self.last_ticket_at.is_some_and(|at| now < at + window)
    }

    fn unredeemed_value(&self) -> u128 {
        self.tickets.iter().map(|t| t.amount).sum()
    }

    /// Aggregate and redeem every channel whose tickets reached the threshold
    fn run_strategy(&mut self, threshold: u32, redeem_delay: Duration, now: Instant) {
        let mut counts: HashMap<ChannelId, u32> = HashMap::new();
        for ticket in self.tickets.iter().filter(|t| t.redeem_at.is_none()) {
            *counts.entry(ticket.channel_id.clone()).or_default() += ticket.index_offset;
        }

        for (channel_id, count) in counts {
            if count < threshold {
                continue;
            }
            let (batch, rest): (Vec<HeldTicket>, Vec<HeldTicket>) = self
                .tickets
                .drain(..)
                .partition(|t| t.channel_id == channel_id && t.redeem_at.is_none());
            self.tickets = rest;
            if let Some(mut merged) = merge_tickets(batch) {
                debug!(
                    "{}: strategy aggregated {} tickets on {}",
                    self.name, merged.index_offset, channel_id
                );
                merged.redeem_at = Some(now + redeem_delay);
                self.tickets.push(merged);
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn mock_address(index: usize) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0x5a;
    bytes[12..].copy_from_slice(&(index as u64 + 1).to_be_bytes());
    format!("0x{}", hex::encode(bytes))
}

fn mock_peer_id(index: usize) -> PeerId {
    format!("12D3KooWMock{}", hex::encode((index as u32 + 1).to_be_bytes()))
}

pub(crate) struct ClusterState {
    pub(crate) config: MockClusterConfig,
    nodes: Vec<NodeState>,
    channels: Vec<ChannelRecord>,
    next_channel: u64,
    next_ticket_index: u64,
}

impl ClusterState {
    pub(crate) fn new(config: MockClusterConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            channels: Vec::new(),
            next_channel: 0,
            next_ticket_index: 0,
        }
    }

    pub(crate) fn add_node(&mut self, name: &str, auto_strategy: bool, now: Instant) -> usize {
        let index = self.nodes.len();
        self.nodes.push(NodeState {
            name: name.to_string(),
            address: mock_address(index),
            peer_id: mock_peer_id(index),
            joined_at: now,
            auto_strategy,
            native: self.config.initial_native_balance,
            safe_hopr: self.config.initial_safe_balance,
            safe_allowance: self.config.initial_safe_balance,
            aliases: HashMap::new(),
            inbox: Vec::new(),
            tickets: Vec::new(),
            redeemed: 0,
            redeemed_value: 0,
            rejected: 0,
            rejected_value: 0,
            neglected: 0,
            neglected_value: 0,
            last_ticket_at: None,
        });
        index
    }

    pub(crate) fn channel_statuses(&self) -> Vec<(ChannelId, ChannelStatus)> {
        self.channels
            .iter()
            .map(|c| (c.id.clone(), c.status()))
            .collect()
    }

    fn index_of_address(&self, address: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.address == address)
    }

    fn index_of_peer(&self, peer_id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.peer_id == peer_id)
    }

    fn transition(&self, status: ChannelStatus, now: Instant) -> Transition {
        Transition {
            status,
            source_sees_at: now + self.config.source_index_delay,
            others_see_at: now + self.config.counterparty_index_delay,
        }
    }

    fn view(&self, channel: &ChannelRecord, status: ChannelStatus) -> ChannelView {
        ChannelView {
            channel_id: channel.id.clone(),
            source_address: self.nodes[channel.source].address.clone(),
            destination_address: self.nodes[channel.destination].address.clone(),
            status,
            balance: format_balance(channel.balance, TOKEN_UNIT),
        }
    }

    fn discovered(&self, a: usize, b: usize, now: Instant) -> bool {
        let joined = self.nodes[a].joined_at.max(self.nodes[b].joined_at);
        joined + self.config.discovery_delay <= now
    }

    /// Apply everything that became due by `now`
    pub(crate) fn settle(&mut self, now: Instant) {
        let threshold = self.config.aggregation_threshold.max(1);
        let redeem_delay = self.config.redeem_delay;

        for node in &mut self.nodes {
            let (due, pending): (Vec<HeldTicket>, Vec<HeldTicket>) = node
                .tickets
                .drain(..)
                .partition(|t| t.redeem_at.is_some_and(|at| at <= now));
            node.tickets = pending;
            for ticket in due {
                node.redeemed += 1;
                node.redeemed_value += ticket.amount;
            }

            if node.auto_strategy {
                node.run_strategy(threshold, redeem_delay, now);
            }
        }
    }

    // =====================================================================
    // Channels
    // =====================================================================

    pub(crate) fn open_channel(
        &mut self,
        me: usize,
        destination: &str,
        amount: u128,
        now: Instant,
    ) -> Option<ChannelId> {
        let Some(to) = self.index_of_address(destination) else {
            debug!("{}: open refused, unknown destination {}", self.nodes[me].name, destination);
            return None;
        };
        if to == me {
            return None;
        }
        let already_open = self
            .channels
            .iter()
            .any(|c| c.source == me && c.destination == to && c.status() != ChannelStatus::Closed);
        if already_open {
            debug!("{}: open refused, channel to {} exists", self.nodes[me].name, self.nodes[to].name);
            return None;
        }

        let node = &mut self.nodes[me];
        if node.safe_hopr < amount || node.safe_allowance < amount {
            debug!("{}: open refused, insufficient funds", node.name);
            return None;
        }
        node.safe_hopr -= amount;
        node.safe_allowance -= amount;

        self.next_channel += 1;
        let id = format!("0x{:064x}", self.next_channel);
        let transition = self.transition(ChannelStatus::Open, now);
        self.channels.push(ChannelRecord {
            id: id.clone(),
            source: me,
            destination: to,
            balance: amount,
            history: vec![transition],
            closure_started: None,
        });
        Some(id)
    }

    pub(crate) fn close_channel(&mut self, me: usize, channel_id: &str, now: Instant) -> bool {
        let Some(pos) = self.channels.iter().position(|c| c.id == channel_id) else {
            return false;
        };
        if self.channels[pos].source != me {
            return false;
        }

        match self.channels[pos].status() {
            ChannelStatus::Open => {
                let transition = self.transition(ChannelStatus::PendingToClose, now);
                let channel = &mut self.channels[pos];
                channel.history.push(transition);
                channel.closure_started = Some(now);
                true
            }
            ChannelStatus::PendingToClose => {
                let started = self.channels[pos].closure_started.unwrap_or(now);
                if now < started + self.config.closure_window {
                    debug!("{}: closure window of {} not elapsed", self.nodes[me].name, channel_id);
                    return false;
                }

                let transition = self.transition(ChannelStatus::Closed, now);
                let channel = &mut self.channels[pos];
                channel.history.push(transition);
                let refund = std::mem::take(&mut channel.balance);
                let destination = channel.destination;

                self.nodes[me].safe_hopr += refund;

                // Tickets not yet submitted for redemption are lost with the channel
                let (mut count, mut value) = (0u64, 0u128);
                self.nodes[destination].tickets.retain(|t| {
                    if t.channel_id == channel_id && t.redeem_at.is_none() {
                        count += 1;
                        value += t.amount;
                        false
                    } else {
                        true
                    }
                });
                let node = &mut self.nodes[destination];
                node.neglected += count;
                node.neglected_value += value;
                true
            }
            ChannelStatus::Closed => false,
        }
    }

    pub(crate) fn get_channel(&self, me: usize, channel_id: &str, now: Instant) -> Option<ChannelView> {
        let channel = self.channels.iter().find(|c| c.id == channel_id)?;
        let status = channel.seen_by(me, now)?;
        Some(self.view(channel, status))
    }

    pub(crate) fn all_channels(&self, me: usize, include_closed: bool, now: Instant) -> ChannelsListing {
        let all = self
            .channels
            .iter()
            .filter_map(|c| c.seen_by(me, now).map(|status| (c, status)))
            .filter(|(_, status)| include_closed || *status != ChannelStatus::Closed)
            .map(|(c, status)| self.view(c, status))
            .collect();
        ChannelsListing { all }
    }

    pub(crate) fn fund_channel(&mut self, me: usize, channel_id: &str, amount: u128) -> bool {
        let gas = self.config.fund_gas_cost;
        let Some(channel) = self
            .channels
            .iter_mut()
            .find(|c| c.id == channel_id && c.source == me)
        else {
            return false;
        };
        if channel.status() != ChannelStatus::Open {
            return false;
        }

        let node = &mut self.nodes[me];
        if node.safe_hopr < amount || node.safe_allowance < amount || node.native < gas {
            return false;
        }
        node.safe_hopr -= amount;
        node.safe_allowance -= amount;
        node.native -= gas;
        channel.balance += amount;
        true
    }

    // =====================================================================
    // Messages
    // =====================================================================

    pub(crate) fn send_message(
        &mut self,
        me: usize,
        destination: &str,
        body: &str,
        path: &[PeerId],
        tag: u16,
        now: Instant,
    ) -> bool {
        let Some(to) = self.index_of_peer(destination) else {
            return false;
        };
        let mut relays = Vec::with_capacity(path.len());
        for peer in path {
            match self.index_of_peer(peer) {
                Some(index) => relays.push(index),
                None => return false,
            }
        }

        let price = self.config.ticket_price;
        let mut previous = me;
        for &relay in &relays {
            let Some(channel) = self.channels.iter_mut().find(|c| {
                c.source == previous && c.destination == relay && c.status() == ChannelStatus::Open
            }) else {
                debug!(
                    "no open channel {} -> {}, packet dropped",
                    self.nodes[previous].name, self.nodes[relay].name
                );
                return true;
            };

            if channel.balance < price {
                let node = &mut self.nodes[relay];
                node.rejected += 1;
                node.rejected_value += price;
                debug!("{}: rejected unfunded ticket on {}", node.name, channel.id);
                return true;
            }
            channel.balance -= price;
            let channel_id = channel.id.clone();

            self.next_ticket_index += 1;
            let node = &mut self.nodes[relay];
            node.tickets.push(HeldTicket {
                channel_id,
                amount: price,
                index: self.next_ticket_index,
                index_offset: 1,
                redeem_at: None,
            });
            node.last_ticket_at = Some(now);
            previous = relay;
        }

        let visible_at = now + self.config.hop_delay * (relays.len() as u32 + 1);
        self.nodes[to].inbox.push(InboxEntry {
            tag,
            body: body.to_string(),
            visible_at,
            received_at: unix_millis(),
        });
        true
    }

    pub(crate) fn messages_pop(&mut self, me: usize, tag: u16, now: Instant) -> Option<ReceivedMessage> {
        let inbox = &mut self.nodes[me].inbox;
        let pos = inbox
            .iter()
            .enumerate()
            .filter(|(_, m)| m.tag == tag && m.visible_at <= now)
            .min_by_key(|(_, m)| m.visible_at)
            .map(|(i, _)| i)?;
        Some(inbox.remove(pos).to_message())
    }

    pub(crate) fn messages_peek_all(&self, me: usize, tag: u16, now: Instant) -> MessageBatch {
        let mut visible: Vec<&InboxEntry> = self.nodes[me]
            .inbox
            .iter()
            .filter(|m| m.tag == tag && m.visible_at <= now)
            .collect();
        visible.sort_by_key(|m| m.visible_at);
        MessageBatch {
            messages: visible.into_iter().map(InboxEntry::to_message).collect(),
        }
    }

    // =====================================================================
    // Tickets
    // =====================================================================

    pub(crate) fn tickets_statistics(&self, me: usize) -> TicketStatistics {
        let node = &self.nodes[me];
        TicketStatistics {
            unredeemed: node.tickets.len() as u64,
            unredeemed_value: format_balance(node.unredeemed_value(), TOKEN_UNIT),
            redeemed: node.redeemed,
            redeemed_value: format_balance(node.redeemed_value, TOKEN_UNIT),
            rejected: node.rejected,
            rejected_value: format_balance(node.rejected_value, TOKEN_UNIT),
            neglected: node.neglected,
            neglected_value: format_balance(node.neglected_value, TOKEN_UNIT),
        }
    }

    pub(crate) fn channel_tickets(&self, me: usize, channel_id: &str) -> Vec<Ticket> {
        self.nodes[me]
            .tickets
            .iter()
            .filter(|t| t.channel_id == channel_id)
            .map(HeldTicket::to_ticket)
            .collect()
    }

    pub(crate) fn redeem_tickets(&mut self, me: usize, channel_id: Option<&str>, now: Instant) -> bool {
        let redeem_at = now + self.config.redeem_delay;
        let node = &mut self.nodes[me];
        if node.busy(now, self.config.busy_window) {
            debug!("{}: redemption refused, tickets still arriving", node.name);
            return false;
        }
        for ticket in node
            .tickets
            .iter_mut()
            .filter(|t| t.redeem_at.is_none())
            .filter(|t| channel_id.map_or(true, |id| t.channel_id == id))
        {
            ticket.redeem_at = Some(redeem_at);
        }
        true
    }

    pub(crate) fn aggregate_tickets(&mut self, me: usize, channel_id: &str, now: Instant) -> bool {
        if !self.channels.iter().any(|c| c.id == channel_id) {
            return false;
        }
        let node = &mut self.nodes[me];
        if node.busy(now, self.config.busy_window) {
            debug!("{}: aggregation refused, tickets still arriving", node.name);
            return false;
        }

        let (batch, rest): (Vec<HeldTicket>, Vec<HeldTicket>) = node
            .tickets
            .drain(..)
            .partition(|t| t.channel_id == channel_id && t.redeem_at.is_none());
        node.tickets = rest;
        if let Some(merged) = merge_tickets(batch) {
            node.tickets.push(merged);
        }
        true
    }

    // =====================================================================
    // Peers, account, aliases
    // =====================================================================

    pub(crate) fn peers(&self, me: usize, now: Instant) -> Vec<PeerInfo> {
        (0..self.nodes.len())
            .filter(|&other| other != me && self.discovered(me, other, now))
            .map(|other| PeerInfo {
                peer_id: self.nodes[other].peer_id.clone(),
                peer_address: Some(self.nodes[other].address.clone()),
                quality: 1.0,
            })
            .collect()
    }

    pub(crate) fn ping(&self, me: usize, peer_id: &str, now: Instant) -> Option<PingResponse> {
        let target = self.index_of_peer(peer_id)?;
        if target == me || !self.discovered(me, target, now) {
            return None;
        }
        Some(PingResponse {
            latency: 5 + target as u64,
        })
    }

    pub(crate) fn balances(&self, me: usize) -> Balances {
        let node = &self.nodes[me];
        Balances {
            native: format_balance(node.native, NATIVE_UNIT),
            hopr: format_balance(0, TOKEN_UNIT),
            safe_native: format_balance(0, NATIVE_UNIT),
            safe_hopr: format_balance(node.safe_hopr, TOKEN_UNIT),
            safe_hopr_allowance: format_balance(node.safe_allowance, TOKEN_UNIT),
        }
    }

    pub(crate) fn address(&self, me: usize, kind: AddressKind) -> String {
        match kind {
            AddressKind::Native => self.nodes[me].address.clone(),
            AddressKind::Hopr => self.nodes[me].peer_id.clone(),
        }
    }

    pub(crate) fn set_alias(&mut self, me: usize, alias: &str, peer_id: &str) -> bool {
        self.nodes[me]
            .aliases
            .insert(alias.to_string(), peer_id.to_string());
        true
    }

    pub(crate) fn get_alias(&self, me: usize, alias: &str) -> Option<PeerId> {
        self.nodes[me].aliases.get(alias).cloned()
    }

    pub(crate) fn remove_alias(&mut self, me: usize, alias: &str) -> bool {
        self.nodes[me].aliases.remove(alias);
        true
    }
}
