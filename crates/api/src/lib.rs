//! RelayCheck Node API
//!
//! The capability surface the harness consumes from a relay node, plus
//! two implementations of it:
//!
//! - **HttpNodeApi**: REST/JSON binding to a live node (`/api/v3`)
//! - **mock::MockCluster**: in-process cluster that reproduces the
//!   eventual consistency of a live network (delayed channel indexing,
//!   delayed delivery, closure window, asynchronous redemption)
//!
//! ## Outcome mapping
//!
//! Operations the node may refuse synchronously (open, close, send,
//! redeem, aggregate, fund) report refusal as `false`/`None`. Transport
//! failures and server errors are `ApiError`.

mod client;
pub mod mock;
mod protocol;

pub use client::{HttpNodeApi, AUTH_HEADER};
pub use protocol::*;

use async_trait::async_trait;
use thiserror::Error;

use relaycheck_core::{
    AddressKind, Balances, ChannelId, ChannelView, ChannelsListing, MessageBatch, PeerId,
    PeerInfo, PingResponse, ReceivedMessage, Ticket, TicketStatistics,
};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Node returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::RequestFailed(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::InvalidResponse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Operations a relay node exposes to the harness
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Open an outgoing channel funded with `amount`; `None` if refused
    async fn open_channel(&self, destination: &str, amount: u128) -> Result<Option<ChannelId>>;

    /// Request closure of an outgoing channel
    async fn close_channel(&self, channel_id: &str) -> Result<bool>;

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelView>>;

    async fn all_channels(&self, include_closed: bool) -> Result<ChannelsListing>;

    async fn fund_channel(&self, channel_id: &str, amount: u128) -> Result<bool>;

    /// Send `body` to `destination` through the explicit relay `path`
    async fn send_message(
        &self,
        destination: &str,
        body: &str,
        path: &[PeerId],
        tag: u16,
    ) -> Result<bool>;

    /// Remove and return the oldest message for `tag`
    async fn messages_pop(&self, tag: u16) -> Result<Option<ReceivedMessage>>;

    /// Return every message for `tag` without removing them
    async fn messages_peek_all(&self, tag: u16) -> Result<Option<MessageBatch>>;

    async fn tickets_statistics(&self) -> Result<TicketStatistics>;

    async fn channel_tickets(&self, channel_id: &str) -> Result<Vec<Ticket>>;

    async fn channel_redeem_tickets(&self, channel_id: &str) -> Result<bool>;

    async fn redeem_all_tickets(&self) -> Result<bool>;

    async fn channel_aggregate_tickets(&self, channel_id: &str) -> Result<bool>;

    async fn peers(&self) -> Result<Vec<PeerInfo>>;

    /// Ping a peer; `None` when the node got no answer
    async fn ping(&self, peer_id: &str) -> Result<Option<PingResponse>>;

    async fn balances(&self) -> Result<Balances>;

    async fn address(&self, kind: AddressKind) -> Result<String>;

    async fn ticket_price(&self) -> Result<Option<u128>>;

    async fn set_alias(&self, alias: &str, peer_id: &str) -> Result<bool>;

    async fn get_alias(&self, alias: &str) -> Result<Option<PeerId>>;

    async fn remove_alias(&self, alias: &str) -> Result<bool>;
}
