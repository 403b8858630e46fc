//! Bounded polling against an eventually-consistent condition.
//!
//! External processes settle into a desired state some unknown time after
//! being poked. Asserting on that state immediately makes tests flaky;
//! waiting a fixed amount makes them slow. `wait_until` samples a
//! caller-supplied predicate at a fixed interval until it reports the
//! expected value or a deadline expires, and returns the last observed
//! value either way. A timeout is not an error: the caller distinguishes
//! success from giving up by comparing the result against what it
//! expected, or by using [`wait_until_outcome`] which reports it
//! explicitly.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Result of a bounded wait.
///
/// `value` is the last observation the predicate produced. `timed_out`
/// disambiguates "observed the opposite of what we wanted" from "the
/// deadline fired first"; the two are otherwise indistinguishable when
/// only the boolean is returned. `checks` counts predicate invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    pub value: bool,
    pub timed_out: bool,
    pub checks: u32,
}

/// Polls `predicate` every `poll_interval` until it returns `expected` or
/// `timeout` elapses, returning the last observed value.
///
/// The predicate is evaluated once immediately, before any sleep, so an
/// already-satisfied condition returns without waiting a full interval.
/// With a zero timeout exactly one observation is made. The first
/// observation always runs to completion; after that the deadline wins the
/// race against any in-flight poll, which is dropped where it stands and
/// never retried.
pub async fn wait_until<F, Fut>(
    predicate: F,
    expected: bool,
    poll_interval: Duration,
    timeout: Duration,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    wait_until_outcome(predicate, expected, poll_interval, timeout)
        .await
        .value
}

/// Same as [`wait_until`] but reports whether the deadline fired.
pub async fn wait_until_outcome<F, Fut>(
    mut predicate: F,
    expected: bool,
    poll_interval: Duration,
    timeout: Duration,
) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = try_wait_until::<_, _, std::convert::Infallible>(
        || {
            let check = predicate();
            async move { Ok(check.await) }
        },
        expected,
        poll_interval,
        timeout,
    )
    .await;
    match result {
        Ok(outcome) => outcome,
        Err(never) => match never {},
    }
}

/// Fallible form of [`wait_until`]: the predicate may fail, and a failure
/// ends the wait immediately with that error. A timeout is still not an
/// error and yields `Ok` with the last observed value.
pub async fn try_wait_until<F, Fut, E>(
    mut predicate: F,
    expected: bool,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<WaitOutcome, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    // First observation happens unconditionally, before any sleep.
    let mut current = predicate().await?;
    let mut checks = 1u32;

    while current != expected {
        tokio::select! {
            biased;
            _ = &mut deadline => {
                debug!(expected, last_observed = current, checks, "wait timed out");
                return Ok(WaitOutcome { value: current, timed_out: true, checks });
            }
            observed = async {
                tokio::time::sleep(poll_interval).await;
                predicate().await
            } => {
                current = observed?;
                checks += 1;
            }
        }
    }

    debug!(expected, checks, "wait satisfied");
    Ok(WaitOutcome {
        value: current,
        timed_out: false,
        checks,
    })
}
