//! Ticket accounting types

use serde::{Deserialize, Serialize};

use crate::{parse_balance, ChannelId, Result};

/// Aggregate ticket statistics reported by a node about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatistics {
    #[serde(default)]
    pub unredeemed: u64,
    #[serde(default)]
    pub unredeemed_value: String,
    #[serde(default)]
    pub redeemed: u64,
    #[serde(default)]
    pub redeemed_value: String,
    #[serde(default)]
    pub rejected: u64,
    #[serde(default)]
    pub rejected_value: String,
    #[serde(default)]
    pub neglected: u64,
    #[serde(default)]
    pub neglected_value: String,
}

impl TicketStatistics {
    pub fn unredeemed_amount(&self) -> Result<u128> {
        parse_value(&self.unredeemed_value)
    }

    pub fn redeemed_amount(&self) -> Result<u128> {
        parse_value(&self.redeemed_value)
    }

    pub fn rejected_amount(&self) -> Result<u128> {
        parse_value(&self.rejected_value)
    }
}

/// Empty value fields are treated as zero; some node versions omit them.
fn parse_value(value: &str) -> Result<u128> {
    if value.trim().is_empty() {
        return Ok(0);
    }
    parse_balance(value)
}

/// A ticket held by a node for one of its incoming channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub channel_id: ChannelId,
    pub amount: String,
    #[serde(default)]
    pub index: u64,
    /// Number of tickets merged into this one (1 for unaggregated)
    #[serde(default = "default_index_offset")]
    pub index_offset: u32,
    #[serde(default)]
    pub win_prob: Option<f64>,
}

fn default_index_offset() -> u32 {
    1
}

impl Ticket {
    pub fn amount_value(&self) -> Result<u128> {
        parse_balance(&self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_deserialization() {
        let json = r#"{
            "unredeemed": 2,
            "unredeemedValue": "200 wxHOPR",
            "redeemed": 5,
            "redeemedValue": "500 wxHOPR",
            "losingTickets": 0,
            "winProportion": 1.0,
            "neglected": 0,
            "neglectedValue": "0 wxHOPR",
            "rejected": 1,
            "rejectedValue": "100 wxHOPR"
        }"#;
        let stats: TicketStatistics = serde_json::from_str(json).unwrap();
        assert_eq!(stats.unredeemed, 2);
        assert_eq!(stats.unredeemed_amount().unwrap(), 200);
        assert_eq!(stats.redeemed_amount().unwrap(), 500);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.rejected_amount().unwrap(), 100);
    }

    #[test]
    fn test_missing_values_count_as_zero() {
        let stats = TicketStatistics::default();
        assert_eq!(stats.unredeemed_amount().unwrap(), 0);
        assert_eq!(stats.redeemed_amount().unwrap(), 0);
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let stats = TicketStatistics {
            unredeemed_value: "lots".to_string(),
            ..Default::default()
        };
        assert!(stats.unredeemed_amount().is_err());
    }

    #[test]
    fn test_ticket_defaults() {
        let json = r#"{"channelId": "0x01", "amount": "100 wxHOPR"}"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.index, 0);
        assert_eq!(ticket.index_offset, 1);
        assert_eq!(ticket.amount_value().unwrap(), 100);
    }
}
