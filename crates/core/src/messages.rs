use serde::{Deserialize, Serialize};

/// Lowest tag the harness hands out; smaller tags are reserved
pub const MIN_APPLICATION_TAG: u16 = 10;

/// Highest tag the harness hands out
pub const MAX_APPLICATION_TAG: u16 = 65530;

/// A message read from a node's inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    pub tag: u16,
    pub body: String,
    /// Unix timestamp (milliseconds)
    #[serde(default)]
    pub received_at: u64,
}

/// All messages currently in the inbox for one tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBatch {
    #[serde(default)]
    pub messages: Vec<ReceivedMessage>,
}

impl MessageBatch {
    pub fn bodies(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.body.clone()).collect()
    }
}
