//! Connection supervisor - retries the store on a fixed cadence until a deadline

use crate::error::{Error, StoreError};
use crate::store::Connector;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Retries [`Connector::connect`] every `retry_interval` until it succeeds or
/// `overall_timeout` elapses.
///
/// The interval is fixed: the expected outage is a store that is still
/// starting up, not an overloaded one.
pub struct ConnectionSupervisor<C> {
    connector: C,
    retry_interval: Duration,
    overall_timeout: Duration,
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn new(connector: C, retry_interval: Duration, overall_timeout: Duration) -> Self {
        Self {
            connector,
            retry_interval,
            overall_timeout,
        }
    }

    /// Acquire a health-checked store handle.
    ///
    /// The first attempt is immediate. An attempt still in flight when the
    /// deadline fires is dropped.
    pub async fn acquire(&self) -> Result<C::Store, Error> {
        let started = Instant::now();
        let deadline = tokio::time::sleep(self.overall_timeout);
        tokio::pin!(deadline);

        let mut ticker = tokio::time::interval(self.retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => return Err(self.timed_out(started, attempt)),
                _ = ticker.tick() => {}
            }

            attempt += 1;
            tokio::select! {
                biased;
                _ = &mut deadline => return Err(self.timed_out(started, attempt)),
                result = self.connector.connect() => match result {
                    Ok(store) => {
                        info!(attempt, elapsed = ?started.elapsed(), "Connected to store");
                        return Ok(store);
                    }
                    Err(StoreError::Server { code, message, trace }) => {
                        warn!(
                            attempt,
                            code = %code,
                            message = %message,
                            trace = trace.as_deref().unwrap_or(""),
                            "Store rejected connection, retrying"
                        );
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Failed to connect to store, retrying");
                    }
                },
            }
        }
    }

    fn timed_out(&self, started: Instant, attempts: u32) -> Error {
        let elapsed = started.elapsed();
        warn!(attempts, elapsed = ?elapsed, timeout = ?self.overall_timeout, "Giving up on store connection");
        Error::ConnectionTimeout { elapsed }
    }
}
