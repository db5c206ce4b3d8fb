//! REST request and response bodies of the node API

use serde::{Deserialize, Serialize};

use relaycheck_core::{ChannelId, ChannelStatus, PeerId, PeerInfo};

/// Body of `POST /channels`
#[derive(Debug, Clone, Serialize)]
pub struct OpenChannelRequest {
    pub destination: String,
    pub amount: String,
}

/// Response of `POST /channels`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelResponse {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub transaction_receipt: Option<String>,
}

/// Response of `DELETE /channels/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseChannelResponse {
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub channel_status: Option<ChannelStatus>,
}

/// Body of `POST /channels/{id}/fund`
#[derive(Debug, Clone, Serialize)]
pub struct FundChannelRequest {
    pub amount: String,
}

/// Body of `POST /messages`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub tag: u16,
    pub body: String,
    pub peer_id: PeerId,
    pub path: Vec<PeerId>,
}

/// Body of `POST /messages/pop` and `POST /messages/peek-all`
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TagRequest {
    pub tag: u16,
}

/// Response of `GET /node/peers`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeersResponse {
    #[serde(default)]
    pub connected: Vec<PeerInfo>,
}

/// Response of `GET /network/price`
#[derive(Debug, Clone, Deserialize)]
pub struct TicketPriceResponse {
    pub price: String,
}

/// Body of `POST /aliases`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAliasRequest {
    pub peer_id: PeerId,
    pub alias: String,
}

/// Response of `GET /aliases/{alias}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasResponse {
    pub peer_id: PeerId,
}

/// Error body returned by the node on non-2xx responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Best-effort human readable message from a raw error body
    pub fn describe(raw: &str) -> String {
        match serde_json::from_str::<ErrorBody>(raw) {
            Ok(ErrorBody {
                status: Some(status),
                error: Some(error),
            }) => format!("{}: {}", status, error),
            Ok(ErrorBody {
                status: Some(status),
                error: None,
            }) => status,
            Ok(ErrorBody {
                status: None,
                error: Some(error),
            }) => error,
            _ => raw.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_request_serialization() {
        let request = SendMessageRequest {
            tag: 1234,
            body: "hello".to_string(),
            peer_id: "peerB".to_string(),
            path: vec!["peerR".to_string()],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"peerId\":\"peerB\""));
        assert!(json.contains("\"path\":[\"peerR\"]"));
        assert!(json.contains("\"tag\":1234"));
    }

    #[test]
    fn test_open_channel_response() {
        let json = r#"{"channelId":"0x01","transactionReceipt":"0xabc"}"#;
        let response: OpenChannelResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.channel_id, "0x01");
    }

    #[test]
    fn test_close_channel_response() {
        let json = r#"{"receipt":"0xabc","channelStatus":"PendingToClose"}"#;
        let response: CloseChannelResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.channel_status, Some(ChannelStatus::PendingToClose));
    }

    #[test]
    fn test_peers_response() {
        let json = r#"{"connected":[{"peerId":"a","peerAddress":"0x1","quality":1.0}],"announced":[]}"#;
        let response: PeersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.connected.len(), 1);
        assert_eq!(response.connected[0].peer_id, "a");
    }

    #[test]
    fn test_error_body_describe() {
        assert_eq!(
            ErrorBody::describe(r#"{"status":"CHANNEL_ALREADY_OPEN","error":"exists"}"#),
            "CHANNEL_ALREADY_OPEN: exists"
        );
        assert_eq!(ErrorBody::describe(r#"{"status":"TIMEOUT"}"#), "TIMEOUT");
        assert_eq!(ErrorBody::describe("plain text\n"), "plain text");
    }
}
