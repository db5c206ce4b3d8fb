//! Message delivery checks
//!
//! Packets are sent under a fresh random tag so concurrent flows never
//! read each other's messages. Delivery is verified as a multiset: order
//! across a mixnet is not preserved, duplicates in the payload are fine.

use parking_lot::Mutex;
use rand::Rng;
use tokio::time::Duration;
use tracing::{debug, info};

use relaycheck_core::{PeerId, MAX_APPLICATION_TAG, MIN_APPLICATION_TAG};

use crate::node::Node;
use crate::poll::{poll_until, Probe};
use crate::{CheckError, Result};

/// How the destination inbox is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Remove messages while reading
    Pop,
    /// Read the whole inbox for the tag, leaving it untouched
    Peek,
}

/// Pick a tag from the application range
pub fn random_tag() -> u16 {
    rand::thread_rng().gen_range(MIN_APPLICATION_TAG..=MAX_APPLICATION_TAG)
}

/// Numbered packet bodies, `"<prefix> #00000000"` onwards
pub fn numbered_packets(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{} #{:08}", prefix, i)).collect()
}

/// Send `packets` from `source` to `destination` over `path` and verify
/// they all arrive; returns the tag used
pub async fn send_and_check(
    packets: &[String],
    source: &Node,
    destination: &Node,
    path: &[PeerId],
    mode: ReadMode,
    timeout: Duration,
    interval: Duration,
) -> Result<u16> {
    let tag = random_tag();
    info!(
        "Sending {} packets {} -> {} over {} hops (tag {})",
        packets.len(),
        source.name,
        destination.name,
        path.len(),
        tag
    );

    for packet in packets {
        if !source
            .api
            .send_message(&destination.peer_id, packet, path, tag)
            .await?
        {
            return Err(CheckError::rejected(
                "send message",
                format!("{} -> {}: {}", source.name, destination.name, packet),
            ));
        }
    }

    let received = check_received(destination, tag, packets, mode, timeout, interval).await?;

    if mode == ReadMode::Peek {
        // peeking leaves the inbox untouched, so a second read sees the same
        let again = check_received(destination, tag, packets, mode, timeout, interval).await?;
        if again != received {
            return Err(CheckError::assertion(format!(
                "second peek on {} returned {:?}, first returned {:?}",
                destination.name, again, received
            )));
        }
    }

    Ok(tag)
}

/// Read `node`'s inbox for `tag` until as many messages as expected
/// arrived, then compare contents; returns the sorted bodies
pub async fn check_received(
    node: &Node,
    tag: u16,
    expected: &[String],
    mode: ReadMode,
    timeout: Duration,
    interval: Duration,
) -> Result<Vec<String>> {
    let what = format!("{} messages with tag {} on {}", expected.len(), tag, node);
    let wanted = expected.len();

    let mut received = match mode {
        ReadMode::Pop => {
            let popped = Mutex::new(Vec::with_capacity(wanted));
            poll_until(&what, timeout, interval, || pop_available(node, tag, wanted, &popped))
                .await?;
            popped.into_inner()
        }
        ReadMode::Peek => {
            poll_until(&what, timeout, interval, || peek_all(node, tag, wanted)).await?
        }
    };

    let mut expected = expected.to_vec();
    expected.sort();
    received.sort();

    if received != expected {
        return Err(CheckError::assertion(format!(
            "{} received {:?}, expected {:?}",
            node.name, received, expected
        )));
    }
    Ok(received)
}

/// Pop messages one call at a time while they keep coming
async fn pop_available(
    node: &Node,
    tag: u16,
    wanted: usize,
    popped: &Mutex<Vec<String>>,
) -> Result<Probe<()>> {
    loop {
        if popped.lock().len() >= wanted {
            return Ok(Probe::Ready(()));
        }
        match node.api.messages_pop(tag).await? {
            Some(message) => {
                debug!("{} popped {:?}", node.name, message.body);
                popped.lock().push(message.body);
            }
            None => {
                let count = popped.lock().len();
                return Ok(Probe::Pending(format!("{} of {} messages", count, wanted)));
            }
        }
    }
}

async fn peek_all(node: &Node, tag: u16, wanted: usize) -> Result<Probe<Vec<String>>> {
    match node.api.messages_peek_all(tag).await? {
        Some(batch) if batch.messages.len() == wanted => Ok(Probe::Ready(batch.bodies())),
        Some(batch) => Ok(Probe::Pending(format!(
            "{} of {} messages",
            batch.messages.len(),
            wanted
        ))),
        None => Ok(Probe::Pending("no inbox".to_string())),
    }
}
