//! Channel lifecycle scenarios

use tracing::info;

use relaycheck_core::{parse_balance, Balances};

use super::Session;
use crate::channel::{with_channel, with_channels};
use crate::delivery::{numbered_packets, send_and_check, ReadMode};
use crate::node::Node;
use crate::route::{intermediate_peers, route_pairs, shuffled_route};
use crate::tickets::await_unredeemed_value;
use crate::{CheckError, Result};

struct Funds {
    native: u128,
    safe: u128,
    allowance: u128,
}

impl Funds {
    fn read(balances: &Balances) -> Result<Self> {
        Ok(Self {
            native: parse_balance(&balances.native)?,
            safe: parse_balance(&balances.safe_hopr)?,
            allowance: parse_balance(&balances.safe_hopr_allowance)?,
        })
    }
}

pub(super) async fn fund_channel(session: &Session) -> Result<()> {
    let cluster = session.cluster();
    let config = session.config();
    let source = cluster.passive_node()?;
    let destination = cluster.random_default_node()?;
    let amount = config.funding;

    with_channel(source, destination, config.ticket_price, config, |channel| async move {
        let before = Funds::read(&source.api.balances().await?)?;
        if !source.api.fund_channel(&channel.channel_id, amount).await? {
            return Err(CheckError::rejected("fund channel", channel.channel_id.clone()));
        }
        let after = Funds::read(&source.api.balances().await?)?;

        if before.safe.checked_sub(after.safe) != Some(amount) {
            return Err(CheckError::assertion(format!(
                "safe balance went {} -> {}, expected -{}",
                before.safe, after.safe, amount
            )));
        }
        if before.allowance.checked_sub(after.allowance) != Some(amount) {
            return Err(CheckError::assertion(format!(
                "safe allowance went {} -> {}, expected -{}",
                before.allowance, after.allowance, amount
            )));
        }
        if after.native >= before.native {
            return Err(CheckError::assertion(format!(
                "native balance went {} -> {}, expected a decrease",
                before.native, after.native
            )));
        }
        info!("Channel {} funded with {}", channel.channel_id, amount);
        Ok(())
    })
    .await
}

pub(super) async fn open_close_without_tickets(session: &Session) -> Result<()> {
    let config = session.config();
    let (source, destination) = session.random_default_pair()?;

    with_channel(source, destination, config.funding, config, |_channel| async {
        Ok(())
    })
    .await
}

/// Leaves tickets on the first relay unredeemed; the scope still closes
/// both channels
pub(super) async fn close_with_unredeemed(session: &Session) -> Result<()> {
    let config = session.config();
    let timeouts = &config.timeouts;
    let defaults = session.cluster().default_nodes();
    let nodes: Vec<Node> = shuffled_route(&defaults, 3)?.into_iter().cloned().collect();
    let route = nodes.as_slice();
    let pairs = route_pairs(route);
    let ticket_count = 2;

    with_channels(&pairs, config.funding_for(ticket_count), config, |_handles| async move {
        let (source, relay, destination) = (&route[0], &route[1], &route[2]);
        let baseline = relay.api.tickets_statistics().await?.unredeemed_amount()?;
        let packets = numbered_packets(
            &format!("Channel unredeemed check: {} - {} - {}", source.name, relay.name, destination.name),
            ticket_count,
        );

        send_and_check(
            &packets,
            source,
            destination,
            &intermediate_peers(route),
            ReadMode::Pop,
            timeouts.delivery,
            timeouts.poll_interval,
        )
        .await?;

        await_unredeemed_value(
            relay,
            baseline + config.funding_for(ticket_count),
            timeouts.unredeemed,
            timeouts.poll_interval,
        )
        .await?;
        Ok(())
    })
    .await
}
