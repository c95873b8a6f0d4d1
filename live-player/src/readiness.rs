use std::sync::Arc;
use std::time::Duration;
use common::{CameraId, CameraStreamConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::api::{CameraApi, ReadyAnswer};
use crate::config::ReadinessConfig;
use crate::errors::PlayerError;

/// Bounded retry schedule for readiness polling
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&ReadinessConfig::default())
    }
}

impl From<&ReadinessConfig> for RetryPolicy {
    fn from(config: &ReadinessConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_delay,
            backoff_multiplier: config.backoff_multiplier,
            max_delay: config.max_delay,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            backoff_multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// Total readiness requests allowed; `max_retries == 0` still makes one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

/// Polls `/cameras/{id}/ready` until the camera has a publishable playlist.
///
/// The poller owns its retry counter; `poll` takes `&mut self`, so a session
/// can never have two polls in flight.
pub struct ReadinessPoller {
    api: Arc<dyn CameraApi>,
    policy: RetryPolicy,
    retries: u32,
    requests: u32,
}

impl ReadinessPoller {
    pub fn new(api: Arc<dyn CameraApi>, policy: RetryPolicy) -> Self {
        Self {
            api,
            policy,
            retries: 0,
            requests: 0,
        }
    }

    /// Requests issued by the last `poll`
    pub fn requests_made(&self) -> u32 {
        self.requests
    }

    pub fn retries_used(&self) -> u32 {
        self.retries
    }

    /// Resolves with the first publishable config, `NotReady` once the retry
    /// budget is spent, or `Cancelled` as soon as `cancel` fires.
    pub async fn poll(
        &mut self,
        camera_id: CameraId,
        cancel: &CancellationToken,
    ) -> Result<CameraStreamConfig, PlayerError> {
        self.retries = 0;
        self.requests = 0;

        loop {
            self.requests += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PlayerError::Cancelled),
                outcome = self.api.check_ready(camera_id) => outcome,
            };

            let reason = match outcome {
                Ok(ReadyAnswer::Ready(config)) if config.is_publishable() => {
                    info!(
                        camera_id,
                        requests = self.requests,
                        playlist = config.playlist().unwrap_or_default(),
                        "Camera stream is ready"
                    );
                    return Ok(config);
                }
                Ok(ReadyAnswer::Ready(_)) => "no active playlist yet".to_string(),
                Ok(ReadyAnswer::NotReady { status }) => format!("status {}", status),
                Err(e) => e.to_string(),
            };

            if self.requests >= self.policy.max_attempts() {
                warn!(camera_id, attempts = self.requests, "Readiness retries exhausted: {}", reason);
                return Err(PlayerError::NotReady {
                    camera_id,
                    attempts: self.requests,
                    last_error: reason,
                });
            }

            self.retries += 1;
            let delay = self.policy.delay_for(self.retries);
            debug!(camera_id, retry = self.retries, ?delay, "Camera not ready ({}), retrying", reason);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PlayerError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
