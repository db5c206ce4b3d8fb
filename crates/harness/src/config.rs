//! Scenario constants and timeouts
//!
//! Built once from the settings file, refined once with the ticket price
//! reported by the cluster, then shared read-only by every component.

use std::time::Duration;

use tracing::{info, warn};

use relaycheck_settings::ScenarioSettings;

/// Deadlines and pauses used by the scenarios
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub poll_interval: Duration,
    pub channel_status: Duration,
    pub closure_cooldown: Duration,
    pub delivery: Duration,
    pub extended_delivery: Duration,
    pub unredeemed: Duration,
    pub redemption: Duration,
    pub action_retry: Duration,
    pub connectivity: Duration,
    pub aggregation_settle: Duration,
    pub auto_redeem: Duration,
    pub request: Duration,
}

impl Timeouts {
    pub fn from_settings(settings: &ScenarioSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            channel_status: Duration::from_secs(settings.channel_status_timeout_secs),
            closure_cooldown: Duration::from_secs(settings.closure_cooldown_secs),
            delivery: Duration::from_secs(settings.delivery_timeout_secs),
            extended_delivery: Duration::from_secs(settings.extended_delivery_timeout_secs),
            unredeemed: Duration::from_secs(settings.unredeemed_timeout_secs),
            redemption: Duration::from_secs(settings.redemption_timeout_secs),
            action_retry: Duration::from_secs(settings.action_retry_timeout_secs),
            connectivity: Duration::from_secs(settings.connectivity_timeout_secs),
            aggregation_settle: Duration::from_secs(settings.aggregation_settle_secs),
            auto_redeem: Duration::from_secs(settings.auto_redeem_timeout_secs),
            request: Duration::from_secs(settings.request_timeout_secs),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_settings(&ScenarioSettings::default())
    }
}

/// Immutable configuration of a verification session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    /// Funding of channels opened without a ticket budget (F)
    pub funding: u128,
    /// Price of one relayed packet per hop (p)
    pub ticket_price: u128,
    /// Ticket count that triggers automatic aggregation (T)
    pub aggregation_threshold: u32,
    pub timeouts: Timeouts,
}

impl ScenarioConfig {
    pub fn from_settings(settings: &ScenarioSettings) -> Self {
        Self {
            funding: settings.funding_value,
            ticket_price: settings.ticket_price_per_hop,
            aggregation_threshold: settings.aggregation_threshold,
            timeouts: Timeouts::from_settings(settings),
        }
    }

    /// Adopt the price reported by the cluster, keeping the configured
    /// one when the node reports none
    pub fn with_probed_price(mut self, probed: Option<u128>) -> Self {
        match probed {
            Some(price) if price > 0 => {
                info!("Using ticket price {} reported by the cluster", price);
                self.ticket_price = price;
            }
            _ => warn!(
                "Could not get ticket price from the cluster, using {}",
                self.ticket_price
            ),
        }
        self
    }

    /// Value of one ticket aggregated at the threshold (T × p)
    pub fn aggregated_ticket_value(&self) -> u128 {
        u128::from(self.aggregation_threshold) * self.ticket_price
    }

    /// Funding covering `tickets` relayed packets on one hop
    pub fn funding_for(&self, tickets: usize) -> u128 {
        tickets as u128 * self.ticket_price
    }

    /// A tenth of the aggregation threshold, at least one
    pub fn tenth_of_threshold(&self) -> usize {
        (self.aggregation_threshold as usize / 10).max(1)
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::from_settings(&ScenarioSettings::default())
    }
}
