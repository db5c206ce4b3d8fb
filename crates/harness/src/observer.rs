//! Bilateral channel status observation
//!
//! A channel transition is only trusted once both ends report it in the
//! same polling round. A one-sided read is never enough: the two nodes
//! index chain events independently and may lag each other.

use tokio::time::Duration;

use relaycheck_core::{ChannelStatus, ChannelView, ChannelsListing};

use crate::node::Node;
use crate::poll::{poll_until, Probe};
use crate::Result;

/// Which channel to observe
#[derive(Debug, Clone, Copy)]
pub struct ChannelQuery<'a> {
    pub source: &'a Node,
    pub destination: &'a Node,
    /// Exact channel, when known; otherwise the first channel between the pair
    pub channel_id: Option<&'a str>,
}

impl<'a> ChannelQuery<'a> {
    pub fn between(source: &'a Node, destination: &'a Node) -> Self {
        Self {
            source,
            destination,
            channel_id: None,
        }
    }

    pub fn with_id(mut self, channel_id: &'a str) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    /// Pick the observed channel out of a listing
    pub fn select<'l>(&self, listing: &'l ChannelsListing) -> Option<&'l ChannelView> {
        listing.all.iter().find(|c| {
            c.connects(&self.source.address, &self.destination.address)
                && self.channel_id.map_or(true, |id| c.channel_id == id)
        })
    }

    fn describe(&self) -> String {
        match self.channel_id {
            Some(id) => format!("channel {} ({} -> {})", id, self.source.name, self.destination.name),
            None => format!("channel {} -> {}", self.source.name, self.destination.name),
        }
    }
}

fn observed(view: Option<&ChannelView>) -> String {
    view.map(|c| c.status.to_string())
        .unwrap_or_else(|| "<absent>".to_string())
}

/// Wait until source and destination both report `expected` for the pair
pub async fn await_channel_status(
    source: &Node,
    destination: &Node,
    expected: ChannelStatus,
    timeout: Duration,
    interval: Duration,
) -> Result<ChannelView> {
    await_channel_status_of(&ChannelQuery::between(source, destination), expected, timeout, interval).await
}

/// Wait until both ends of `query` report `expected` in the same round
///
/// Returns the source's view of the channel.
pub async fn await_channel_status_of(
    query: &ChannelQuery<'_>,
    expected: ChannelStatus,
    timeout: Duration,
    interval: Duration,
) -> Result<ChannelView> {
    let include_closed = expected == ChannelStatus::Closed;
    let what = format!("{} to be {} on both ends", query.describe(), expected);

    poll_until(&what, timeout, interval, || {
        probe_both_sides(query, include_closed, expected)
    })
    .await
}

async fn probe_both_sides(
    query: &ChannelQuery<'_>,
    include_closed: bool,
    expected: ChannelStatus,
) -> Result<Probe<ChannelView>> {
    let (seen_by_source, seen_by_destination) = futures::try_join!(
        query.source.api.all_channels(include_closed),
        query.destination.api.all_channels(include_closed)
    )?;

    let source_view = query.select(&seen_by_source);
    let destination_view = query.select(&seen_by_destination);

    match (source_view, destination_view) {
        (Some(s), Some(d)) if s.status == expected && d.status == expected => {
            Ok(Probe::Ready(s.clone()))
        }
        _ => Ok(Probe::Pending(format!(
            "source={} destination={}",
            observed(source_view),
            observed(destination_view)
        ))),
    }
}
