use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// On-chain identity of a node (`0x` + 40 hex chars)
pub type Address = String;

/// Network identity of a node
pub type PeerId = String;

/// Channel identifier as reported by the node (`0x` + 64 hex chars)
pub type ChannelId = String;

/// Channel lifecycle status as seen by one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelStatus {
    Open,
    PendingToClose,
    Closed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::PendingToClose => "PendingToClose",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "PendingToClose" => Ok(Self::PendingToClose),
            "Closed" => Ok(Self::Closed),
            other => Err(CoreError::InvalidChannelStatus(other.to_string())),
        }
    }
}

/// One node's view of a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub channel_id: ChannelId,
    pub source_address: Address,
    pub destination_address: Address,
    pub status: ChannelStatus,
    /// Remaining channel balance (`"<int> <unit>"`)
    #[serde(default)]
    pub balance: String,
}

impl ChannelView {
    /// Whether this channel runs from `source` to `destination`
    pub fn connects(&self, source: &str, destination: &str) -> bool {
        self.source_address == source && self.destination_address == destination
    }
}

/// Result of listing channels on a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelsListing {
    #[serde(default)]
    pub all: Vec<ChannelView>,
}

/// A connected peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub peer_id: PeerId,
    #[serde(default)]
    pub peer_address: Option<Address>,
    #[serde(default)]
    pub quality: f64,
}

/// Successful ping response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    /// Round trip time in milliseconds
    pub latency: u64,
}

/// Account balances (`"<int> <unit>"` strings)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balances {
    pub native: String,
    #[serde(default)]
    pub hopr: String,
    #[serde(default)]
    pub safe_native: String,
    pub safe_hopr: String,
    pub safe_hopr_allowance: String,
}

/// Which of the node's addresses to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// On-chain address
    Native,
    /// Network (peer) identity
    Hopr,
}

impl AddressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Hopr => "hopr",
        }
    }
}

impl FromStr for AddressKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(Self::Native),
            "hopr" => Ok(Self::Hopr),
            other => Err(CoreError::InvalidAddressKind(other.to_string())),
        }
    }
}

/// Both addresses of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAddresses {
    pub native: Address,
    pub hopr: PeerId,
}

impl AccountAddresses {
    pub fn get(&self, kind: AddressKind) -> &str {
        match kind {
            AddressKind::Native => &self.native,
            AddressKind::Hopr => &self.hopr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_status_round_trip_through_str() {
        for status in [
            ChannelStatus::Open,
            ChannelStatus::PendingToClose,
            ChannelStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<ChannelStatus>().unwrap(), status);
        }
        assert!("Opening".parse::<ChannelStatus>().is_err());
    }

    #[test]
    fn test_channel_view_deserialization() {
        let json = r#"{
            "channelId": "0x01",
            "sourceAddress": "0xaa",
            "destinationAddress": "0xbb",
            "status": "PendingToClose",
            "balance": "100 wxHOPR",
            "ticketIndex": "3"
        }"#;
        let view: ChannelView = serde_json::from_str(json).unwrap();
        assert_eq!(view.channel_id, "0x01");
        assert_eq!(view.status, ChannelStatus::PendingToClose);
        assert!(view.connects("0xaa", "0xbb"));
        assert!(!view.connects("0xbb", "0xaa"));
    }

    #[test]
    fn test_channels_listing_ignores_other_sections() {
        let json = r#"{"all": [], "incoming": [], "outgoing": []}"#;
        let listing: ChannelsListing = serde_json::from_str(json).unwrap();
        assert!(listing.all.is_empty());
    }

    #[test]
    fn test_balances_deserialization() {
        let json = r#"{
            "native": "10 xDai",
            "hopr": "0 wxHOPR",
            "safeNative": "1 xDai",
            "safeHopr": "500 wxHOPR",
            "safeHoprAllowance": "500 wxHOPR"
        }"#;
        let balances: Balances = serde_json::from_str(json).unwrap();
        assert_eq!(balances.safe_hopr, "500 wxHOPR");
        assert_eq!(balances.safe_hopr_allowance, "500 wxHOPR");
    }

    #[test]
    fn test_address_kind() {
        assert_eq!("native".parse::<AddressKind>().unwrap(), AddressKind::Native);
        assert_eq!(AddressKind::Hopr.as_str(), "hopr");
        assert!("ipv4".parse::<AddressKind>().is_err());

        let addresses = AccountAddresses {
            native: "0xaa".to_string(),
            hopr: "12D3KooW".to_string(),
        };
        assert_eq!(addresses.get(AddressKind::Native), "0xaa");
        assert_eq!(addresses.get(AddressKind::Hopr), "12D3KooW");
    }
}
