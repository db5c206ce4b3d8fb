//! Deadline-bounded polling
//!
//! Every wait in the harness goes through [`poll_until`]: a probe runs at
//! a constant interval until it reports [`Probe::Ready`] or the deadline
//! passes. The last pending observation is kept so a timeout says what
//! was seen, not just that nothing happened.
//!
//! Both helpers are plain futures. Dropping one (a sibling failed in a
//! fan-out, an enclosing timeout fired) stops the polling; nothing keeps
//! running in the background.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::time::{sleep, timeout_at, Duration, Instant};
use tracing::{debug, warn};

use crate::{CheckError, Result};

/// Outcome of one probe iteration
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    /// Condition met; polling stops with this value
    Ready(T),
    /// Not yet; carries a description of the observed state
    Pending(String),
}

/// Run `probe` every `interval` until it is ready or `timeout` elapses
///
/// Errors returned by the probe abort polling immediately.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>>>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    let mut last_observed = String::from("<nothing>");
    let mut iterations = 0u32;

    loop {
        iterations += 1;
        let outcome = match timeout_at(deadline, probe()).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                debug!("{}: probe still running at deadline", what);
                break;
            }
        };

        match outcome {
            Probe::Ready(value) => {
                debug!("{}: ready after {} polls", what, iterations);
                return Ok(value);
            }
            Probe::Pending(observed) => {
                debug!("{}: pending ({})", what, observed);
                last_observed = observed;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(interval.min(deadline - now)).await;
    }

    Err(CheckError::Timeout {
        what: what.to_string(),
        waited: started.elapsed(),
        last_observed,
    })
}

/// Repeat a mutating `action` until the node accepts it
///
/// Only for actions that are safe to repeat (redeem, aggregate).
pub async fn retry_action<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut action: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let refusals = AtomicU32::new(0);
    poll_until(what, timeout, interval, || {
        let attempt = action();
        let refusals = &refusals;
        async move {
            match attempt.await {
                Ok(true) => Ok(Probe::Ready(())),
                Ok(false) => {
                    let count = refusals.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!("{} refused by the node, retrying", what);
                    Ok(Probe::Pending(format!("refused {} times", count)))
                }
                Err(e) => Err(e),
            }
        }
    })
    .await
}
