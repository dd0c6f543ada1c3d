//! Error taxonomy shared by every monitor component

use std::future::Future;
use std::time::Duration;

/// Default outer bound for a single backend call
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors produced by the monitor pipeline
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Malformed notification; the record is skipped and the batch continues
    #[error("malformed notification: {0}")]
    Parse(String),

    /// Remediation found nothing to evict
    #[error("bucket {source_name} has no objects to evict")]
    EmptyStore { source_name: String },

    /// Reporting found no snapshots in the window
    #[error("no snapshots recorded for {source_name}")]
    NoData { source_name: String },

    /// Storage, time-series or artifact backend failed or timed out
    #[error("{backend} unavailable: {message}")]
    BackendUnavailable {
        backend: &'static str,
        message: String,
    },

    /// Chart rendering or image encoding failed
    #[error("failed to render chart: {0}")]
    Render(String),

    /// A required setting is absent
    #[error("missing required configuration: {0}")]
    ConfigurationMissing(String),
}

impl MonitorError {
    pub fn parse(message: impl Into<String>) -> Self {
        MonitorError::Parse(message.into())
    }

    pub fn backend(backend: &'static str, message: impl std::fmt::Display) -> Self {
        MonitorError::BackendUnavailable {
            backend,
            message: message.to_string(),
        }
    }

    /// Whether the caller should treat this as a failed invocation
    pub fn is_invocation_failure(&self) -> bool {
        matches!(
            self,
            MonitorError::BackendUnavailable { .. }
                | MonitorError::Render(_)
                | MonitorError::ConfigurationMissing(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Run a backend call under a hard timeout.
///
/// Expiry maps to `BackendUnavailable`; the call is not retried here.
pub async fn bounded<T, F>(backend: &'static str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(MonitorError::backend(
            backend,
            format!("timed out after {}s", limit.as_secs_f64()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_through_result() {
        let value = bounded("object store", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded("object store", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(MonitorError::BackendUnavailable { backend, message }) => {
                assert_eq!(backend, "object store");
                assert!(message.contains("timed out"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_invocation_failure_classification() {
        assert!(MonitorError::backend("artifact store", "down").is_invocation_failure());
        assert!(MonitorError::ConfigurationMissing("plot_bucket".into()).is_invocation_failure());
        assert!(!MonitorError::parse("bad json").is_invocation_failure());
        assert!(!MonitorError::EmptyStore {
            source_name: "b".into()
        }
        .is_invocation_failure());
    }
}
