//! relaycheck harness
//!
//! Drives a cluster of relay nodes through end-to-end checks. Everything a
//! node reports is eventually consistent, so the building blocks here wait
//! for conditions under hard deadlines instead of asserting on first read:
//!
//! - [`poll`] - deadline poller and retried actions
//! - [`observer`] - bilateral channel status agreement
//! - [`channel`] - channels owned by a scope, closed on every exit path
//! - [`tickets`] - ticket accounting waits and redemption requests
//! - [`delivery`] - tagged message delivery checks
//! - [`scenario`] - the scenario catalogue and the session running it

pub mod channel;
pub mod config;
pub mod delivery;
pub mod error;
pub mod node;
pub mod observer;
pub mod poll;
pub mod route;
pub mod scenario;
pub mod tickets;

pub use channel::{with_channel, with_channels, ChannelHandle, ChannelStack, ChannelState, ScopedChannel};
pub use config::{ScenarioConfig, Timeouts};
pub use delivery::{send_and_check, ReadMode};
pub use error::{CheckError, Result};
pub use node::{Cluster, Node};
pub use observer::{await_channel_status, ChannelQuery};
pub use poll::{poll_until, retry_action, Probe};
pub use scenario::{ScenarioKind, ScenarioReport, Session};
