//! Balance strings
//!
//! Nodes report token amounts as `"<int> <unit>"` (e.g. `"200 wxHOPR"`).
//! Only the numeric prefix is meaningful for accounting; the unit is
//! discarded.

use crate::{CoreError, Result};

/// Unit suffix used for safe/ticket token amounts
pub const TOKEN_UNIT: &str = "wxHOPR";

/// Unit suffix used for native (gas) amounts
pub const NATIVE_UNIT: &str = "xDai";

/// Parse the numeric prefix of a balance string.
///
/// Accepts both `"123 unit"` and a bare `"123"`.
pub fn parse_balance(balance: &str) -> Result<u128> {
    let amount = balance.trim().split(' ').next().unwrap_or_default();
    amount
        .parse::<u128>()
        .map_err(|_| CoreError::InvalidBalance(balance.to_string()))
}

/// Format an amount the way nodes report it
pub fn format_balance(amount: u128, unit: &str) -> String {
    format!("{} {}", amount, unit)
}
