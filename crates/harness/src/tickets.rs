//! Ticket accounting checks
//!
//! Each wait polls the node's own statistics only; ticket accounting is
//! local to the node that earned the tickets.

use tokio::time::Duration;
use tracing::info;

use relaycheck_core::TicketStatistics;

use crate::node::Node;
use crate::poll::{poll_until, retry_action, Probe};
use crate::{CheckError, Result};

/// Change in redeemed tickets between two statistics snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionDelta {
    pub count: u64,
    pub value: u128,
}

impl RedemptionDelta {
    pub fn between(before: &TicketStatistics, after: &TicketStatistics) -> Result<Self> {
        Ok(Self {
            count: after.redeemed.saturating_sub(before.redeemed),
            value: after
                .redeemed_amount()?
                .saturating_sub(before.redeemed_amount()?),
        })
    }
}

/// Wait until the node's unredeemed value reaches `target`
pub async fn await_unredeemed_value(
    node: &Node,
    target: u128,
    timeout: Duration,
    interval: Duration,
) -> Result<TicketStatistics> {
    let what = format!("unredeemed value >= {} on {}", target, node);
    poll_until(&what, timeout, interval, || async move {
        let stats = node.api.tickets_statistics().await?;
        let value = stats.unredeemed_amount()?;
        if value >= target {
            Ok(Probe::Ready(stats))
        } else {
            Ok(Probe::Pending(format!("unredeemed value {}", value)))
        }
    })
    .await
}

/// Wait until the node counted at least `target` rejected tickets
pub async fn await_rejected_count(
    node: &Node,
    target: u64,
    timeout: Duration,
    interval: Duration,
) -> Result<TicketStatistics> {
    let what = format!("rejected tickets >= {} on {}", target, node);
    poll_until(&what, timeout, interval, || async move {
        let stats = node.api.tickets_statistics().await?;
        if stats.rejected >= target {
            Ok(Probe::Ready(stats))
        } else {
            Ok(Probe::Pending(format!("rejected {}", stats.rejected)))
        }
    })
    .await
}

/// Wait until no tickets are left in `channel_id`, or on the whole node
pub async fn await_all_tickets_redeemed(
    node: &Node,
    channel_id: Option<&str>,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let what = match channel_id {
        Some(id) => format!("all tickets in {} redeemed on {}", id, node),
        None => format!("all tickets redeemed on {}", node),
    };
    poll_until(&what, timeout, interval, || async move {
        let remaining = match channel_id {
            Some(id) => node.api.channel_tickets(id).await?.len() as u64,
            None => node.api.tickets_statistics().await?.unredeemed,
        };
        if remaining == 0 {
            Ok(Probe::Ready(()))
        } else {
            Ok(Probe::Pending(format!("{} tickets unredeemed", remaining)))
        }
    })
    .await
}

/// Wait until the redeemed value grew by `target` since `baseline`
pub async fn await_redeemed_value_increase(
    node: &Node,
    baseline: &TicketStatistics,
    target: u128,
    timeout: Duration,
    interval: Duration,
) -> Result<RedemptionDelta> {
    let what = format!("redeemed value +{} on {}", target, node);
    poll_until(&what, timeout, interval, || async move {
        let stats = node.api.tickets_statistics().await?;
        let delta = RedemptionDelta::between(baseline, &stats)?;
        if delta.value >= target {
            Ok(Probe::Ready(delta))
        } else {
            Ok(Probe::Pending(format!(
                "redeemed +{} tickets worth {}",
                delta.count, delta.value
            )))
        }
    })
    .await
}

/// Ask the node to redeem the tickets of one channel until it accepts
pub async fn redeem_channel_tickets(
    node: &Node,
    channel_id: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let what = format!("redeem tickets in {} on {}", channel_id, node);
    retry_action(&what, timeout, interval, || async move {
        Ok(node.api.channel_redeem_tickets(channel_id).await?)
    })
    .await?;
    info!("{}: accepted", what);
    Ok(())
}

/// Ask the node to redeem all its tickets until it accepts
pub async fn redeem_all_tickets(node: &Node, timeout: Duration, interval: Duration) -> Result<()> {
    let what = format!("redeem all tickets on {}", node);
    retry_action(&what, timeout, interval, || async move {
        Ok(node.api.redeem_all_tickets().await?)
    })
    .await?;
    info!("{}: accepted", what);
    Ok(())
}

/// Ask the node to aggregate the tickets of one channel until it accepts
pub async fn aggregate_channel_tickets(
    node: &Node,
    channel_id: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let what = format!("aggregate tickets in {} on {}", channel_id, node);
    retry_action(&what, timeout, interval, || async move {
        Ok(node.api.channel_aggregate_tickets(channel_id).await?)
    })
    .await?;
    info!("{}: accepted", what);
    Ok(())
}

/// Redeemed ticket count must match `value / aggregated_value` within
/// the relative `tolerance`
pub fn check_aggregation_ratio(
    delta: &RedemptionDelta,
    aggregated_value: u128,
    tolerance: f64,
) -> Result<()> {
    if aggregated_value == 0 {
        return Err(CheckError::Config("aggregated ticket value is zero".to_string()));
    }
    let expected = delta.value as f64 / aggregated_value as f64;
    let actual = delta.count as f64;
    if (actual - expected).abs() <= expected * tolerance {
        Ok(())
    } else {
        Err(CheckError::assertion(format!(
            "redeemed {} tickets worth {}, expected about {:.1} aggregated tickets of {}",
            delta.count, delta.value, expected, aggregated_value
        )))
    }
}
