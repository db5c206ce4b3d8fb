//! REST client for a single relay node

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use relaycheck_core::{
    parse_balance, AccountAddresses, AddressKind, Balances, ChannelId, ChannelView,
    ChannelsListing, MessageBatch, PeerId, PeerInfo, PingResponse, ReceivedMessage, Ticket,
    TicketStatistics,
};

use crate::protocol::{
    AliasResponse, ErrorBody, FundChannelRequest, OpenChannelRequest, OpenChannelResponse,
    PeersResponse, SendMessageRequest, SetAliasRequest, TagRequest, TicketPriceResponse,
};
use crate::{ApiError, NodeApi, Result};

/// Header carrying the API token
pub const AUTH_HEADER: &str = "x-auth-token";

/// Raw reply: status plus body text
struct Reply {
    status: StatusCode,
    body: String,
}

impl Reply {
    fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    fn error(&self) -> ApiError {
        ApiError::Status {
            status: self.status.as_u16(),
            message: ErrorBody::describe(&self.body),
        }
    }

    /// 2xx → decoded body, anything else → error
    fn expect_json<T: DeserializeOwned>(self) -> Result<T> {
        if self.status.is_success() {
            self.json()
        } else {
            Err(self.error())
        }
    }

    /// 2xx → decoded body, 4xx → `None`, 5xx → error
    fn optional_json<T: DeserializeOwned>(self) -> Result<Option<T>> {
        if self.status.is_success() {
            self.json().map(Some)
        } else if self.status.is_client_error() {
            debug!("Node refused ({}): {}", self.status, ErrorBody::describe(&self.body));
            Ok(None)
        } else {
            Err(self.error())
        }
    }

    /// 2xx → `true`, 4xx → `false`, 5xx → error
    fn accepted(self) -> Result<bool> {
        if self.status.is_success() {
            Ok(true)
        } else if self.status.is_client_error() {
            debug!("Node refused ({}): {}", self.status, ErrorBody::describe(&self.body));
            Ok(false)
        } else {
            Err(self.error())
        }
    }
}

/// HTTP binding of [`NodeApi`] for a live node
pub struct HttpNodeApi {
    base_url: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpNodeApi {
    /// Create a client for the node whose API listens at `api_url`
    ///
    /// Note: no request is made here; use [`NodeApi::address`] to probe.
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let root = format!("{}/api/v3/", api_url.trim_end_matches('/'));
        let base_url = Url::parse(&root).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", api_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(api_url.to_string()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            token,
            http,
        })
    }

    /// Base URL all endpoints are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from path segments (each segment is escaped)
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Reply> {
        let url = self.endpoint(segments)?;
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.token {
            request = request.header(AUTH_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("-> {} {}", status, body.trim());

        Ok(Reply { status, body })
    }

    async fn get(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Reply> {
        self.call::<()>(Method::GET, segments, query, None).await
    }

    async fn post<B: Serialize + ?Sized>(&self, segments: &[&str], body: Option<&B>) -> Result<Reply> {
        self.call(Method::POST, segments, &[], body).await
    }

    async fn delete(&self, segments: &[&str]) -> Result<Reply> {
        self.call::<()>(Method::DELETE, segments, &[], None).await
    }
}

#[async_trait]
impl NodeApi for HttpNodeApi {
    async fn open_channel(&self, destination: &str, amount: u128) -> Result<Option<ChannelId>> {
        let body = OpenChannelRequest {
            destination: destination.to_string(),
            amount: amount.to_string(),
        };
        let reply = self.post(&["channels"], Some(&body)).await?;
        Ok(reply
            .optional_json::<OpenChannelResponse>()?
            .map(|r| r.channel_id))
    }

    async fn close_channel(&self, channel_id: &str) -> Result<bool> {
        self.delete(&["channels", channel_id]).await?.accepted()
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelView>> {
        self.get(&["channels", channel_id], &[]).await?.optional_json()
    }

    async fn all_channels(&self, include_closed: bool) -> Result<ChannelsListing> {
        let include_closed = if include_closed { "true" } else { "false" };
        self.get(
            &["channels"],
            &[("includingClosed", include_closed), ("fullTopology", "true")],
        )
        .await?
        .expect_json()
    }

    async fn fund_channel(&self, channel_id: &str, amount: u128) -> Result<bool> {
        let body = FundChannelRequest {
            amount: amount.to_string(),
        };
        self.post(&["channels", channel_id, "fund"], Some(&body))
            .await?
            .accepted()
    }

    async fn send_message(
        &self,
        destination: &str,
        body: &str,
        path: &[PeerId],
        tag: u16,
    ) -> Result<bool> {
        let request = SendMessageRequest {
            tag,
            body: body.to_string(),
            peer_id: destination.to_string(),
            path: path.to_vec(),
        };
        self.post(&["messages"], Some(&request)).await?.accepted()
    }

    async fn messages_pop(&self, tag: u16) -> Result<Option<ReceivedMessage>> {
        self.post(&["messages", "pop"], Some(&TagRequest { tag }))
            .await?
            .optional_json()
    }

    async fn messages_peek_all(&self, tag: u16) -> Result<Option<MessageBatch>> {
        self.post(&["messages", "peek-all"], Some(&TagRequest { tag }))
            .await?
            .optional_json()
    }

    async fn tickets_statistics(&self) -> Result<TicketStatistics> {
        self.get(&["tickets", "statistics"], &[]).await?.expect_json()
    }

    async fn channel_tickets(&self, channel_id: &str) -> Result<Vec<Ticket>> {
        // 404 means the node holds no tickets for this channel
        Ok(self
            .get(&["channels", channel_id, "tickets"], &[])
            .await?
            .optional_json()?
            .unwrap_or_default())
    }

    async fn channel_redeem_tickets(&self, channel_id: &str) -> Result<bool> {
        self.post::<()>(&["channels", channel_id, "tickets", "redeem"], None)
            .await?
            .accepted()
    }

    async fn redeem_all_tickets(&self) -> Result<bool> {
        self.post::<()>(&["tickets", "redeem"], None).await?.accepted()
    }

    async fn channel_aggregate_tickets(&self, channel_id: &str) -> Result<bool> {
        self.post::<()>(&["channels", channel_id, "tickets", "aggregate"], None)
            .await?
            .accepted()
    }

    async fn peers(&self) -> Result<Vec<PeerInfo>> {
        let response: PeersResponse = self.get(&["node", "peers"], &[]).await?.expect_json()?;
        Ok(response.connected)
    }

    async fn ping(&self, peer_id: &str) -> Result<Option<PingResponse>> {
        self.post::<()>(&["peers", peer_id, "ping"], None)
            .await?
            .optional_json()
    }

    async fn balances(&self) -> Result<Balances> {
        self.get(&["account", "balances"], &[]).await?.expect_json()
    }

    async fn address(&self, kind: AddressKind) -> Result<String> {
        let addresses: AccountAddresses = self.get(&["account", "addresses"], &[]).await?.expect_json()?;
        Ok(addresses.get(kind).to_string())
    }

    async fn ticket_price(&self) -> Result<Option<u128>> {
        let response: Option<TicketPriceResponse> =
            self.get(&["network", "price"], &[]).await?.optional_json()?;
        response
            .map(|r| parse_balance(&r.price).map_err(|e| ApiError::InvalidResponse(e.to_string())))
            .transpose()
    }

    async fn set_alias(&self, alias: &str, peer_id: &str) -> Result<bool> {
        let body = SetAliasRequest {
            peer_id: peer_id.to_string(),
            alias: alias.to_string(),
        };
        self.post(&["aliases"], Some(&body)).await?.accepted()
    }

    async fn get_alias(&self, alias: &str) -> Result<Option<PeerId>> {
        let response: Option<AliasResponse> = self.get(&["aliases", alias], &[]).await?.optional_json()?;
        Ok(response.map(|r| r.peer_id))
    }

    async fn remove_alias(&self, alias: &str) -> Result<bool> {
        self.delete(&["aliases", alias]).await?.accepted()
    }
}
