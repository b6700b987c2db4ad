//! Waking the host and waiting for it to come up: wake burst, then a bounded
//! probe loop over a shared sleep budget, with one mid-budget re-wake.

use tokio_util::sync::CancellationToken;

use crate::config::{HostCredentials, Timings};
use crate::error::LifecycleError;
use crate::net::HostNetwork;
use crate::probe;
use crate::progress::Progress;
use crate::support::sleep_cancellable;
use crate::wake;

/// Wake the host and probe until it answers or the budget runs out.
///
/// Exactly `boot_attempts` progress ticks are emitted on success no matter
/// which probe succeeds: failed iterations tick as they go, and the remainder
/// is emitted in one burst so the caller's bar reaches its end. Halfway
/// through the budget a `WakeRetry` signal (not a bar step) precedes a second
/// wake burst.
pub async fn boot_host<N: HostNetwork>(
    net: &N,
    credentials: &HostCredentials,
    timings: &Timings,
    progress: &Progress,
    cancel: &CancellationToken,
) -> Result<(), LifecycleError> {
    tracing::debug!("waking host");
    wake::wake(net, credentials, timings, cancel).await;
    progress.tick();

    let attempts = timings.boot_attempts.max(1);
    let slice = timings.boot_budget / attempts;

    for attempt in 0..attempts {
        sleep_cancellable(slice, cancel).await?;

        if probe::probe(net, credentials, timings).await.host_reachable {
            tracing::debug!(attempt = attempt + 1, "host is reachable");
            for _ in (attempt + 1)..attempts {
                progress.tick();
            }
            return Ok(());
        }

        if attempt == attempts / 2 {
            // Still nothing at the halfway mark; tell the caller and wake again.
            progress.wake_retry();
            wake::wake(net, credentials, timings, cancel).await;
        }

        progress.tick();
        tracing::warn!(
            attempt = attempt + 1,
            attempts,
            "could not reach host, trying again"
        );
    }

    Err(LifecycleError::HostBootTimeout { attempts })
}
