//! Node surface scenarios: identity, balances, aliases, ping, 0-hop messaging

use regex::Regex;
use tracing::info;

use relaycheck_core::{parse_balance, AddressKind, ChannelStatus};

use super::Session;
use crate::delivery::{numbered_packets, send_and_check, ReadMode};
use crate::{CheckError, Result};

const NATIVE_ADDRESS_PATTERN: &str = r"^0x[0-9a-fA-F]{40}$";

pub(super) async fn check_balances(session: &Session) -> Result<()> {
    let pattern = Regex::new(NATIVE_ADDRESS_PATTERN)
        .map_err(|e| CheckError::Config(format!("address pattern: {}", e)))?;

    for node in session.cluster().nodes() {
        let address = node.api.address(AddressKind::Native).await?;
        if !pattern.is_match(&address) {
            return Err(CheckError::assertion(format!(
                "{} has malformed native address {:?}",
                node, address
            )));
        }

        let balances = node.api.balances().await?;
        if parse_balance(&balances.native)? == 0 {
            return Err(CheckError::assertion(format!("{} has no native balance", node)));
        }
        if parse_balance(&balances.safe_hopr)? == 0 {
            return Err(CheckError::assertion(format!("{} has no safe token balance", node)));
        }
    }
    Ok(())
}

pub(super) async fn alias_peers(session: &Session) -> Result<()> {
    let cluster = session.cluster();
    let node = cluster.random_default_node()?;
    let target = cluster.random_default_node()?;
    let alias = format!("alias-{}", target.name);

    // setting the same alias twice is accepted both times
    for _ in 0..2 {
        if !node.api.set_alias(&alias, &target.peer_id).await? {
            return Err(CheckError::rejected("set alias", alias.clone()));
        }
    }

    let resolved = node.api.get_alias(&alias).await?;
    if resolved.as_deref() != Some(target.peer_id.as_str()) {
        return Err(CheckError::assertion(format!(
            "alias {} on {} resolved to {:?}, expected {}",
            alias, node, resolved, target.peer_id
        )));
    }

    if !node.api.remove_alias(&alias).await? {
        return Err(CheckError::rejected("remove alias", alias.clone()));
    }
    if let Some(stale) = node.api.get_alias(&alias).await? {
        return Err(CheckError::assertion(format!(
            "alias {} on {} still resolves to {} after removal",
            alias, node, stale
        )));
    }
    Ok(())
}

pub(super) async fn ping_peers(session: &Session) -> Result<()> {
    let (source, destination) = session.random_default_pair()?;
    match source.api.ping(&destination.peer_id).await? {
        Some(response) if response.latency > 0 => {
            info!("{} -> {}: {} ms", source.name, destination.name, response.latency);
            Ok(())
        }
        other => Err(CheckError::assertion(format!(
            "ping {} -> {} returned {:?}",
            source.name, destination.name, other
        ))),
    }
}

pub(super) async fn ping_self_times_out(session: &Session) -> Result<()> {
    let node = session.cluster().random_default_node()?;
    match node.api.ping(&node.peer_id).await? {
        None => Ok(()),
        Some(response) => Err(CheckError::assertion(format!(
            "{} answered its own ping in {} ms",
            node, response.latency
        ))),
    }
}

pub(super) async fn no_unredeemed_without_traffic(session: &Session) -> Result<()> {
    for node in session.cluster().default_nodes() {
        let stats = node.api.tickets_statistics().await?;
        let value = stats.unredeemed_amount()?;
        if value != 0 || stats.unredeemed != 0 {
            return Err(CheckError::assertion(format!(
                "{} holds {} unredeemed tickets worth {} before any traffic",
                node, stats.unredeemed, value
            )));
        }
    }
    Ok(())
}

pub(super) async fn zero_hop(session: &Session, mode: ReadMode) -> Result<()> {
    let config = session.config();
    let (source, destination) = session.random_default_pair()?;
    let packets = numbered_packets("0 hop message", config.tenth_of_threshold());

    send_and_check(
        &packets,
        source,
        destination,
        &[],
        mode,
        config.timeouts.delivery,
        config.timeouts.poll_interval,
    )
    .await?;
    Ok(())
}

pub(super) async fn ticket_price(session: &Session) -> Result<()> {
    let node = session.cluster().random_default_node()?;
    match node.api.ticket_price().await? {
        Some(price) if price > 0 => {
            info!("{} reports ticket price {}", node, price);
            Ok(())
        }
        other => Err(CheckError::assertion(format!(
            "{} reports ticket price {:?}",
            node, other
        ))),
    }
}

pub(super) async fn channel_status_sanity(session: &Session) -> Result<()> {
    let node = session
        .cluster()
        .default_nodes()
        .first()
        .copied()
        .ok_or_else(|| CheckError::Config("no default nodes".to_string()))?;

    let open = node.api.all_channels(false).await?;
    let everything = node.api.all_channels(true).await?;

    if everything.all.len() < open.all.len() {
        return Err(CheckError::assertion(format!(
            "{} lists {} channels including closed, {} without",
            node,
            everything.all.len(),
            open.all.len()
        )));
    }
    let finished = everything
        .all
        .iter()
        .any(|c| matches!(c.status, ChannelStatus::Closed | ChannelStatus::PendingToClose));
    if !finished {
        return Err(CheckError::assertion(format!(
            "{} lists no closed or closing channel",
            node
        )));
    }
    Ok(())
}
