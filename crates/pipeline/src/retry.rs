//! Bounded retry for flaky UI interactions.
//!
//! The primitive only reports what happened; each caller decides whether an
//! exhausted retry is fatal, logged or ignored.

use flightbot_core::{Error, Result};
use flightbot_tools::Browser;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRetry {
    attempts: u32,
    pause: Duration,
}

/// Drop-down confirmation clicks: ten immediate attempts.
pub const DROP_DOWN_CONFIRM: BoundedRetry = BoundedRetry::immediate(10);

/// Clearing a location field: ten checks, half a second apart.
pub const FIELD_CLEAR: BoundedRetry = BoundedRetry::with_pause(10, Duration::from_millis(500));

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempt: u32 },
    Exhausted { attempts: u32, last_error: Option<Error> },
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

impl BoundedRetry {
    pub const fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            pause: Duration::ZERO,
        }
    }

    pub const fn with_pause(attempts: u32, pause: Duration) -> Self {
        Self { attempts, pause }
    }

    /// Run `op` against `target` until it succeeds or the attempts run out.
    /// Errors from individual attempts are not surfaced except as the last one.
    pub async fn run<S, T, F>(&self, target: &mut S, mut op: F) -> RetryOutcome<T>
    where
        S: ?Sized,
        F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<T>>,
    {
        let mut last_error = None;
        for attempt in 1..=self.attempts {
            match op(&mut *target).await {
                Ok(value) => return RetryOutcome::Succeeded { value, attempt },
                Err(e) => {
                    debug!(attempt, error = %e, "attempt failed");
                    last_error = Some(e);
                }
            }
            if attempt < self.attempts && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }
        RetryOutcome::Exhausted {
            attempts: self.attempts,
            last_error,
        }
    }
}

/// Click `locator` until a click goes through.
pub async fn click_until_registered(
    browser: &mut dyn Browser,
    locator: &str,
    policy: BoundedRetry,
) -> RetryOutcome<()> {
    policy
        .run(browser, |b| {
            let locator = locator.to_string();
            async move { b.click(&locator).await }.boxed()
        })
        .await
}
