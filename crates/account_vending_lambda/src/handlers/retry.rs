use account_vending_core::retry::RetryPolicy;
use tracing::warn;

use crate::adapters::sleep::Sleeper;
use crate::error::{ProviderError, ProvisioningError};

/// Runs `attempt_fn` until it succeeds, retrying transient provider errors
/// with the delays of `policy`. The closure receives the 1-based attempt
/// number. Permanent errors are returned immediately.
pub fn retry_transient<T>(
    operation: &'static str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut attempt_fn: impl FnMut(u32) -> Result<T, ProviderError>,
) -> Result<T, ProvisioningError> {
    let mut delays = policy.delays();
    let mut attempt = 1u32;

    loop {
        match attempt_fn(attempt) {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() => {
                let Some(delay) = delays.next() else {
                    return Err(ProvisioningError::RetriesExhausted {
                        operation,
                        attempts: attempt,
                        last_error: error,
                    });
                };
                warn!(
                    component = "retry",
                    event = "transient_failure",
                    operation,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %error
                );
                sleeper.sleep(delay);
                attempt = attempt.saturating_add(1);
            }
            Err(error) => return Err(error.into()),
        }
    }
}

/// Calls `check` until it yields a value, sleeping between polls. Transient
/// errors count as "not ready yet".
pub fn poll_until<T>(
    operation: &'static str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut check: impl FnMut() -> Result<Option<T>, ProviderError>,
) -> Result<T, ProvisioningError> {
    let mut delays = policy.delays();
    let mut polls = 0u32;

    loop {
        polls = polls.saturating_add(1);
        match check() {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(error) if error.is_transient() => {
                warn!(
                    component = "poller",
                    event = "transient_poll_failure",
                    operation,
                    poll = polls,
                    error = %error
                );
            }
            Err(error) => return Err(error.into()),
        }

        let Some(delay) = delays.next() else {
            return Err(ProvisioningError::PollTimedOut { operation, polls });
        };
        sleeper.sleep(delay);
    }
}
