use crate::powerbi::client::PowerBiError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// How long to wait for a long-running operation and how often to check it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollSettings {
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Metadata scans: 600s, checked every 10s.
    pub const fn scan() -> Self {
        Self::new(Duration::from_secs(600), Duration::from_secs(10))
    }

    /// Scans of a full 100-workspace chunk can take up to 15 minutes.
    pub const fn large_batch_scan() -> Self {
        Self::new(Duration::from_secs(900), Duration::from_secs(10))
    }

    /// Item definitions: 300s, checked every 5s.
    pub const fn definition() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(5))
    }

    pub fn max_attempts(&self) -> u64 {
        let interval = self.interval.as_millis().max(1);
        (self.timeout.as_millis() / interval) as u64
    }
}

pub enum PollState<T> {
    Pending,
    Done(T),
}

/// Calls `check` until it reports `Done`, an error, or the timeout elapses.
/// `check` receives the 1-based attempt number.
pub async fn poll_until<T, F, Fut>(
    settings: PollSettings,
    operation: &str,
    mut check: F,
) -> Result<T, PowerBiError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<PollState<T>, PowerBiError>>,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        if let PollState::Done(value) = check(attempt).await? {
            log::info!("{} completed (attempt {})", operation, attempt);
            return Ok(value);
        }

        if started.elapsed() >= settings.timeout {
            return Err(PowerBiError::Timeout {
                operation: operation.to_string(),
                seconds: settings.timeout.as_secs(),
            });
        }

        log::info!(
            "{} in progress... (attempt {}/{})",
            operation,
            attempt,
            settings.max_attempts()
        );
        tokio::time::sleep(settings.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PollSettings {
        PollSettings::new(Duration::from_millis(50), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn returns_value_once_done() {
        let result = poll_until(fast(), "test", |attempt| async move {
            if attempt < 3 {
                Ok(PollState::Pending)
            } else {
                Ok(PollState::Done(attempt))
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn times_out_when_never_done() {
        let err = poll_until(fast(), "Scan", |_| async { Ok(PollState::<()>::Pending) })
            .await
            .unwrap_err();
        match err {
            PowerBiError::Timeout { operation, .. } => assert_eq!(operation, "Scan"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn check_errors_stop_polling() {
        let err = poll_until(fast(), "Scan", |_| async {
            Err::<PollState<()>, _>(PowerBiError::OperationFailed("boom".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PowerBiError::OperationFailed(_)));
    }

    #[test]
    fn max_attempts_matches_timeout_over_interval() {
        assert_eq!(PollSettings::definition().max_attempts(), 60);
        assert_eq!(PollSettings::scan().max_attempts(), 60);
    }
}
