//! Ticket accounting scenarios: earning, rejection, aggregation, redemption

use tokio::time::sleep;
use tracing::info;

use relaycheck_core::TicketStatistics;

use super::Session;
use crate::channel::{with_channel, with_channels};
use crate::delivery::{numbered_packets, random_tag, send_and_check, ReadMode};
use crate::node::Node;
use crate::route::{intermediate_peers, route_pairs, shuffled_route};
use crate::tickets::{
    aggregate_channel_tickets, await_all_tickets_redeemed, await_redeemed_value_increase,
    await_rejected_count, await_unredeemed_value, check_aggregation_ratio, redeem_all_tickets,
    redeem_channel_tickets,
};
use crate::{CheckError, Result};

/// Tolerance on the redeemed count of automatically aggregated tickets
const AGGREGATION_TOLERANCE: f64 = 0.1;

async fn channel_ticket_count(node: &Node, channel_id: &str) -> Result<usize> {
    Ok(node.api.channel_tickets(channel_id).await?.len())
}

fn expect_ticket_count(node: &Node, channel_id: &str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(CheckError::assertion(format!(
            "{} holds {} tickets in {}, expected {}",
            node, actual, channel_id, expected
        )))
    }
}

pub(super) async fn redeem_in_channel(session: &Session) -> Result<()> {
    let cluster = session.cluster();
    let config = session.config();
    let timeouts = &config.timeouts;
    let source = cluster.random_default_node()?;
    let relay = cluster.passive_node()?;
    let ticket_count = 2;

    with_channel(source, relay, config.funding_for(ticket_count), config, |channel| async move {
        let packets = numbered_packets(
            &format!("Channel redeem on 1-hop: {} - {} - {}", source.name, relay.name, source.name),
            ticket_count,
        );
        send_and_check(
            &packets,
            source,
            source,
            &[relay.peer_id.clone()],
            ReadMode::Pop,
            timeouts.delivery,
            timeouts.poll_interval,
        )
        .await?;

        await_unredeemed_value(
            relay,
            config.funding_for(ticket_count),
            timeouts.unredeemed,
            timeouts.poll_interval,
        )
        .await?;

        redeem_channel_tickets(relay, &channel.channel_id, timeouts.action_retry, timeouts.poll_interval)
            .await?;
        await_all_tickets_redeemed(relay, None, timeouts.redemption, timeouts.poll_interval).await?;

        let left = channel_ticket_count(relay, &channel.channel_id).await?;
        expect_ticket_count(relay, &channel.channel_id, left, 0)
    })
    .await
}

/// A third message over a channel funded for two is relayed without
/// payment coverage; the relay rejects its ticket
pub(super) async fn out_of_funding(session: &Session) -> Result<()> {
    let cluster = session.cluster();
    let config = session.config();
    let timeouts = &config.timeouts;
    let source = cluster.passive_node()?;
    let relay = cluster.random_default_node()?;
    let ticket_count = 2;
    let pairs = [(source, relay), (relay, source)];

    with_channels(&pairs, config.funding_for(ticket_count), config, |_handles| async move {
        let baseline = relay.api.tickets_statistics().await?;
        let packets = numbered_packets(
            &format!("Channel out of funding on 1-hop: {} - {} - {}", source.name, relay.name, source.name),
            ticket_count,
        );
        let path = [relay.peer_id.clone()];

        send_and_check(
            &packets,
            source,
            source,
            &path,
            ReadMode::Pop,
            timeouts.delivery,
            timeouts.poll_interval,
        )
        .await?;

        // the send is accepted; only the relay notices the missing funds
        if !source
            .api
            .send_message(&source.peer_id, "THIS MSG IS NOT COVERED", &path, random_tag())
            .await?
        {
            return Err(CheckError::rejected(
                "send message",
                format!("uncovered message {} -> {}", source.name, source.name),
            ));
        }

        await_unredeemed_value(
            relay,
            baseline.unredeemed_amount()? + config.funding_for(ticket_count),
            timeouts.unredeemed,
            timeouts.poll_interval,
        )
        .await?;
        await_rejected_count(
            relay,
            baseline.rejected + 1,
            timeouts.redemption,
            timeouts.poll_interval,
        )
        .await?;

        sleep(timeouts.aggregation_settle).await;

        redeem_all_tickets(relay, timeouts.action_retry, timeouts.poll_interval).await?;
        await_all_tickets_redeemed(relay, None, timeouts.redemption, timeouts.poll_interval).await
    })
    .await
}

pub(super) async fn one_hop_to_self(session: &Session) -> Result<()> {
    let cluster = session.cluster();
    let config = session.config();
    let timeouts = &config.timeouts;
    let source = cluster.random_default_node()?;
    let relay = cluster.passive_node()?;
    let ticket_count = config.tenth_of_threshold() * 9;

    with_channel(source, relay, config.funding_for(ticket_count), config, |channel| async move {
        let id = channel.channel_id.as_str();
        let before = relay.api.tickets_statistics().await?;
        let held = channel_ticket_count(relay, id).await?;
        expect_ticket_count(relay, id, held, 0)?;

        let packets = numbered_packets(
            &format!("1 hop message to self via {}", relay.name),
            ticket_count,
        );
        send_and_check(
            &packets,
            source,
            source,
            &[relay.peer_id.clone()],
            ReadMode::Pop,
            timeouts.extended_delivery,
            timeouts.poll_interval,
        )
        .await?;

        let earned = await_unredeemed_value(
            relay,
            before.unredeemed_amount()? + config.funding_for(ticket_count),
            timeouts.unredeemed,
            timeouts.poll_interval,
        )
        .await?;
        let (value_before, value_after) = (before.unredeemed_amount()?, earned.unredeemed_amount()?);
        if value_after.checked_sub(value_before) != Some(config.funding_for(ticket_count)) {
            return Err(CheckError::assertion(format!(
                "unredeemed value went {} -> {}, expected +{}",
                value_before,
                value_after,
                config.funding_for(ticket_count)
            )));
        }
        check_counts(
            &before,
            &earned,
            0,
            ticket_count as u64,
            "after relaying",
        )?;
        let held = channel_ticket_count(relay, id).await?;
        expect_ticket_count(relay, id, held, ticket_count)?;

        redeem_channel_tickets(relay, id, timeouts.action_retry, timeouts.poll_interval).await?;
        await_all_tickets_redeemed(relay, Some(id), timeouts.redemption, timeouts.poll_interval)
            .await?;

        let after = relay.api.tickets_statistics().await?;
        if after.redeemed.saturating_sub(earned.redeemed) != ticket_count as u64 {
            return Err(CheckError::assertion(format!(
                "redeemed went {} -> {}, expected +{}",
                earned.redeemed, after.redeemed, ticket_count
            )));
        }
        if after.unredeemed != 0 {
            return Err(CheckError::assertion(format!(
                "{} still holds {} unredeemed tickets",
                relay, after.unredeemed
            )));
        }
        info!("{} redeemed {} tickets in {}", relay, ticket_count, id);
        Ok(())
    })
    .await
}

/// Statistics deltas: redeemed by `redeemed`, unredeemed by `unredeemed`
fn check_counts(
    before: &TicketStatistics,
    after: &TicketStatistics,
    redeemed: u64,
    unredeemed: u64,
    when: &str,
) -> Result<()> {
    let redeemed_delta = after.redeemed.saturating_sub(before.redeemed);
    let unredeemed_delta = after.unredeemed.saturating_sub(before.unredeemed);
    if redeemed_delta != redeemed || unredeemed_delta != unredeemed {
        return Err(CheckError::assertion(format!(
            "{}: redeemed +{} unredeemed +{}, expected +{} and +{}",
            when, redeemed_delta, unredeemed_delta, redeemed, unredeemed
        )));
    }
    Ok(())
}

pub(super) async fn aggregate_in_channel(session: &Session) -> Result<()> {
    let cluster = session.cluster();
    let config = session.config();
    let timeouts = &config.timeouts;
    let source = cluster.random_default_node()?;
    let relay = cluster.passive_node()?;
    let ticket_count = 2;

    with_channel(source, relay, config.funding_for(ticket_count), config, |channel| async move {
        let id = channel.channel_id.as_str();
        let baseline = relay.api.tickets_statistics().await?.unredeemed_amount()?;
        let packets = numbered_packets(
            &format!("Channel agg and redeem on 1-hop: {} - {} - {}", source.name, relay.name, source.name),
            ticket_count,
        );
        send_and_check(
            &packets,
            source,
            source,
            &[relay.peer_id.clone()],
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

        let held = channel_ticket_count(relay, id).await?;
        expect_ticket_count(relay, id, held, ticket_count)?;

        aggregate_channel_tickets(relay, id, timeouts.action_retry, timeouts.poll_interval).await?;
        let held = channel_ticket_count(relay, id).await?;
        expect_ticket_count(relay, id, held, 1)?;

        redeem_channel_tickets(relay, id, timeouts.action_retry, timeouts.poll_interval).await?;
        await_all_tickets_redeemed(relay, None, timeouts.redemption, timeouts.poll_interval).await?;

        let held = channel_ticket_count(relay, id).await?;
        expect_ticket_count(relay, id, held, 0)
    })
    .await
}

/// Only the first relay of a route earns tickets; later hops are paid
/// through the packet itself
pub(super) async fn n_hop(session: &Session) -> Result<()> {
    let config = session.config();
    let timeouts = &config.timeouts;
    let nodes: Vec<Node> = shuffled_route(&session.cluster().default_nodes(), 3)?
        .into_iter()
        .cloned()
        .collect();
    let route = nodes.as_slice();
    let pairs = route_pairs(route);
    let ticket_count = config.tenth_of_threshold();

    with_channels(&pairs, config.funding_for(ticket_count), config, |_handles| async move {
        let (source, relay, destination) = (&route[0], &route[1], &route[2]);
        let baseline = relay.api.tickets_statistics().await?.unredeemed_amount()?;
        let packets = numbered_packets(
            &format!("hopr message {} - {} - {}", source.name, relay.name, destination.name),
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

        sleep(timeouts.aggregation_settle).await;

        redeem_all_tickets(relay, timeouts.action_retry, timeouts.poll_interval).await?;
        await_all_tickets_redeemed(relay, None, timeouts.redemption, timeouts.poll_interval).await
    })
    .await
}

/// Sending a full threshold of messages makes the relay's own strategy
/// aggregate and redeem without being asked
pub(super) async fn auto_aggregation(session: &Session) -> Result<()> {
    let config = session.config();
    let timeouts = &config.timeouts;
    let nodes: Vec<Node> = shuffled_route(&session.cluster().default_nodes(), 3)?
        .into_iter()
        .cloned()
        .collect();
    let route = nodes.as_slice();
    let pairs = route_pairs(route);
    let ticket_count = config.aggregation_threshold as usize;
    let aggregated_value = config.aggregated_ticket_value();

    with_channels(&pairs, config.funding_for(ticket_count), config, |_handles| async move {
        let (source, relay, destination) = (&route[0], &route[1], &route[2]);
        let before = relay.api.tickets_statistics().await?;
        let packets = numbered_packets(
            &format!("multihop message {} - {} - {}", source.name, relay.name, destination.name),
            ticket_count,
        );
        send_and_check(
            &packets,
            source,
            destination,
            &intermediate_peers(route),
            ReadMode::Pop,
            timeouts.extended_delivery,
            timeouts.poll_interval,
        )
        .await?;

        let delta = await_redeemed_value_increase(
            relay,
            &before,
            aggregated_value,
            timeouts.auto_redeem,
            timeouts.poll_interval,
        )
        .await?;
        info!(
            "{} redeemed {} tickets worth {} on its own",
            relay, delta.count, delta.value
        );
        check_aggregation_ratio(&delta, aggregated_value, AGGREGATION_TOLERANCE)
    })
    .await
}
