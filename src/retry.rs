use {
    crate::{Error, Result},
    serde::{Deserialize, Deserializer},
    std::{future::Future, time::Duration},
    tokio::time::sleep,
    tracing::{debug, warn},
};

/// Fixed-interval, bounded polling.
///
/// A probe is run at most `max_attempts` times. Between two unsuccessful
/// probes the policy waits exactly `interval`; there is no backoff. An
/// optional `initial_delay` is slept once before the first probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, bon::Builder, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(deserialize_with = "humantime_duration")]
    pub interval: Duration,
    #[builder(default = Duration::ZERO)]
    #[serde(default, deserialize_with = "humantime_duration")]
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            initial_delay: Duration::ZERO,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Runs `probe` until it yields a value.
    ///
    /// * `Ok(Some(v))` stops polling and returns `v`
    /// * `Ok(None)` counts as an unsuccessful attempt
    /// * `Err(e)` aborts immediately with `e`
    ///
    /// When every attempt came back empty, the error built by `on_exhausted`
    /// (given the number of attempts made) is returned.
    pub async fn poll<T, F, Fut, E>(&self, what: &str, mut probe: F, on_exhausted: E) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
        E: FnOnce(u32) -> Error,
    {
        if !self.initial_delay.is_zero() {
            debug!(what, delay = ?self.initial_delay, "initial wait");
            sleep(self.initial_delay).await;
        }
        for attempt in 1..=self.max_attempts {
            if let Some(value) = probe(attempt).await? {
                debug!(what, attempt, "ready");
                return Ok(value);
            }
            if attempt < self.max_attempts {
                warn!(what, attempt, max = self.max_attempts, "not ready, waiting {:?}", self.interval);
                sleep(self.interval).await;
            }
        }
        warn!(what, attempts = self.max_attempts, "giving up");
        Err(on_exhausted(self.max_attempts))
    }
}

pub(crate) fn humantime_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}
