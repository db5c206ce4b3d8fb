//! Channels owned by a scope
//!
//! A channel opened for a check is closed when the check ends, whatever
//! its outcome. The two-step close (request, cool-down, finalize) is
//! verified on both ends at every step.
//!
//! ## Fan-out
//!
//! [`with_channels`] opens several channels concurrently in two phases.
//! Every open request runs to completion and each accepted channel is
//! registered in the [`ChannelStack`]; only then do the waits for
//! bilateral Open start. A failing wait cancels its siblings, but a
//! request the node may already have committed is never dropped, so
//! every accepted channel is closed at the end.

use std::future::Future;

use futures::future::{join_all, try_join_all};
use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use relaycheck_core::{ChannelId, ChannelStatus};

use crate::config::ScenarioConfig;
use crate::node::Node;
use crate::observer::{await_channel_status_of, ChannelQuery};
use crate::{CheckError, Result};

/// Lifecycle of a channel owned by a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Open request accepted, not yet seen Open on both ends
    Requested,
    Open,
    PendingToClose,
    Closed,
}

/// What a scope body gets to see of its channel
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    pub channel_id: ChannelId,
    pub source: Node,
    pub destination: Node,
    pub funding: u128,
}

impl ChannelHandle {
    pub fn query(&self) -> ChannelQuery<'_> {
        ChannelQuery::between(&self.source, &self.destination).with_id(&self.channel_id)
    }
}

/// Issue the open request; a refusal is final
async fn request_open(source: &Node, destination: &Node, funding: u128) -> Result<ChannelHandle> {
    let channel_id = source
        .api
        .open_channel(&destination.address, funding)
        .await?
        .ok_or_else(|| {
            CheckError::rejected(
                "open channel",
                format!("{} -> {} with funding {}", source.name, destination.name, funding),
            )
        })?;
    info!(
        "Channel {} requested: {} -> {} ({})",
        channel_id, source.name, destination.name, funding
    );
    Ok(ChannelHandle {
        channel_id,
        source: source.clone(),
        destination: destination.clone(),
        funding,
    })
}

/// A channel this scope is responsible for closing
#[derive(Debug)]
pub struct ScopedChannel {
    handle: ChannelHandle,
    state: ChannelState,
}

impl ScopedChannel {
    /// Open a channel and wait until both ends see it Open
    pub async fn open(
        source: &Node,
        destination: &Node,
        funding: u128,
        config: &ScenarioConfig,
    ) -> Result<Self> {
        let mut channel = Self::requested(request_open(source, destination, funding).await?);
        channel.await_open(config).await?;
        Ok(channel)
    }

    fn requested(handle: ChannelHandle) -> Self {
        Self {
            handle,
            state: ChannelState::Requested,
        }
    }

    async fn await_open(&mut self, config: &ScenarioConfig) -> Result<()> {
        let timeouts = &config.timeouts;
        await_channel_status_of(
            &self.handle.query(),
            ChannelStatus::Open,
            timeouts.channel_status,
            timeouts.poll_interval,
        )
        .await?;
        self.state = ChannelState::Open;
        info!("Channel {} open on both ends", self.handle.channel_id);
        Ok(())
    }

    pub fn handle(&self) -> &ChannelHandle {
        &self.handle
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Close the channel and verify every step on both ends
    ///
    /// The cool-down between the two close requests is always waited in
    /// full, even when PendingToClose shows up early.
    pub async fn close(mut self, config: &ScenarioConfig) -> Result<()> {
        let timeouts = &config.timeouts;
        let handle = &self.handle;
        let query = handle.query();

        if !handle.source.api.close_channel(&handle.channel_id).await? {
            return Err(CheckError::rejected("close channel", handle.channel_id.clone()));
        }
        await_channel_status_of(
            &query,
            ChannelStatus::PendingToClose,
            timeouts.channel_status,
            timeouts.poll_interval,
        )
        .await?;
        self.state = ChannelState::PendingToClose;

        sleep(timeouts.closure_cooldown).await;

        if !handle.source.api.close_channel(&handle.channel_id).await? {
            return Err(CheckError::rejected(
                "finalize channel closure",
                handle.channel_id.clone(),
            ));
        }
        await_channel_status_of(
            &query,
            ChannelStatus::Closed,
            timeouts.channel_status,
            timeouts.poll_interval,
        )
        .await?;
        self.state = ChannelState::Closed;
        info!("Channel {} closed", handle.channel_id);
        Ok(())
    }
}

/// Run `body` with an open channel, closing it afterwards in every case
pub async fn with_channel<T, F, Fut>(
    source: &Node,
    destination: &Node,
    funding: u128,
    config: &ScenarioConfig,
    body: F,
) -> Result<T>
where
    F: FnOnce(ChannelHandle) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut channel = ScopedChannel::requested(request_open(source, destination, funding).await?);
    let outcome = match channel.await_open(config).await {
        Ok(()) => body(channel.handle().clone()).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &outcome {
        warn!("Scope on channel {} failed: {}", channel.handle().channel_id, e);
    }

    let cleanup = channel.close(config).await;
    CheckError::scoped(outcome, cleanup)
}

/// Channels opened by one fan-out, closed together
#[derive(Debug, Default)]
pub struct ChannelStack {
    registered: Mutex<Vec<ChannelHandle>>,
}

impl ChannelStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels accepted so far, in registration order
    pub fn registered(&self) -> Vec<ChannelHandle> {
        self.registered.lock().clone()
    }

    /// Issue an open request and register the channel once accepted
    pub async fn request(
        &self,
        source: &Node,
        destination: &Node,
        funding: u128,
    ) -> Result<ChannelHandle> {
        let handle = request_open(source, destination, funding).await?;
        self.registered.lock().push(handle.clone());
        Ok(handle)
    }

    /// Close every registered channel concurrently
    ///
    /// All closes run to completion; every failure is reported.
    pub async fn close_all(self, config: &ScenarioConfig) -> Result<()> {
        let handles = self.registered.into_inner();
        let results = join_all(
            handles
                .into_iter()
                .map(|handle| ScopedChannel::requested(handle).close(config)),
        )
        .await;

        let mut failures: Vec<CheckError> = results.into_iter().filter_map(|r| r.err()).collect();
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(CheckError::Teardown(failures)),
        }
    }
}

async fn await_both_open(handle: ChannelHandle, config: &ScenarioConfig) -> Result<ChannelHandle> {
    let mut channel = ScopedChannel::requested(handle);
    channel.await_open(config).await?;
    Ok(channel.handle)
}

/// Run `body` with one open channel per `(source, destination)` pair
///
/// Open requests all run to completion; a refused one skips the body.
/// The waits for Open run concurrently and the first failure cancels the
/// others. The body sees the handles in pair order.
pub async fn with_channels<T, F, Fut>(
    pairs: &[(&Node, &Node)],
    funding: u128,
    config: &ScenarioConfig,
    body: F,
) -> Result<T>
where
    F: FnOnce(Vec<ChannelHandle>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let stack = ChannelStack::new();
    let requested = join_all(
        pairs
            .iter()
            .map(|(source, destination)| stack.request(source, destination, funding)),
    )
    .await;

    let outcome = match requested.into_iter().collect::<Result<Vec<_>>>() {
        Ok(handles) => {
            match try_join_all(handles.into_iter().map(|handle| await_both_open(handle, config))).await {
                Ok(handles) => body(handles).await,
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    };
    if let Err(e) = &outcome {
        warn!("Scope on {} channels failed: {}", pairs.len(), e);
    }

    let cleanup = stack.close_all(config).await;
    CheckError::scoped(outcome, cleanup)
}
