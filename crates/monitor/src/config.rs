//! Monitor configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use monitor_lib::alarm::AlarmRule;
use monitor_lib::error::MonitorError;
use monitor_lib::storage::S3StoreConfig;
use serde::Deserialize;

/// Environment prefix for every setting
pub const ENV_PREFIX: &str = "MONITOR";

/// Where bucket objects and chart artifacts live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectBackend {
    /// In-process store; uploads through the API drive the pipeline
    #[default]
    Memory,
    S3,
}

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Bucket whose size is tracked
    #[serde(default)]
    pub source_bucket: String,

    /// Bucket receiving the rendered chart
    #[serde(default)]
    pub plot_bucket: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub object_backend: ObjectBackend,

    /// Directory for the file-backed time series; in-memory when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_alarm_threshold_bytes")]
    pub alarm_threshold_bytes: i64,

    #[serde(default = "default_window_secs")]
    pub alarm_window_secs: u64,

    #[serde(default = "default_window_secs")]
    pub report_window_secs: u64,

    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,

    #[serde(default = "default_aws_region")]
    pub aws_region: String,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[serde(default)]
    pub s3_endpoint_url: Option<String>,

    #[serde(default)]
    pub s3_force_path_style: bool,
}

fn default_api_port() -> u16 {
    8080
}

fn default_alarm_threshold_bytes() -> i64 {
    monitor_lib::alarm::DEFAULT_THRESHOLD_BYTES
}

fn default_window_secs() -> u64 {
    10
}

fn default_backend_timeout_secs() -> u64 {
    300
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

impl MonitorConfig {
    /// Load configuration from `MONITOR_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot start with
    pub fn validate(&self) -> std::result::Result<(), MonitorError> {
        if self.source_bucket.trim().is_empty() {
            return Err(MonitorError::ConfigurationMissing("source_bucket".into()));
        }
        if self.plot_bucket.trim().is_empty() {
            return Err(MonitorError::ConfigurationMissing("plot_bucket".into()));
        }
        if self.alarm_window_secs == 0 {
            return Err(MonitorError::ConfigurationMissing("alarm_window_secs".into()));
        }
        Ok(())
    }

    pub fn alarm_rule(&self) -> AlarmRule {
        AlarmRule {
            threshold_bytes: self.alarm_threshold_bytes,
            window: Duration::from_secs(self.alarm_window_secs),
        }
    }

    pub fn report_window(&self) -> Duration {
        Duration::from_secs(self.report_window_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn s3(&self) -> S3StoreConfig {
        S3StoreConfig {
            region: self.aws_region.clone(),
            endpoint_url: self.s3_endpoint_url.clone(),
            force_path_style: self.s3_force_path_style,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<MonitorConfig> {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::from_environment(
            config::Environment::with_prefix(ENV_PREFIX).source(Some(source)),
        )
    }

    #[test]
    fn test_defaults() {
        let config = from_vars(&[
            ("MONITOR_SOURCE_BUCKET", "uploads"),
            ("MONITOR_PLOT_BUCKET", "plots"),
        ])
        .unwrap();

        assert_eq!(config.source_bucket, "uploads");
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.object_backend, ObjectBackend::Memory);
        assert_eq!(config.alarm_rule(), AlarmRule::default());
        assert_eq!(config.report_window(), Duration::from_secs(10));
        assert_eq!(config.backend_timeout(), Duration::from_secs(300));
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_vars(&[
            ("MONITOR_SOURCE_BUCKET", "uploads"),
            ("MONITOR_PLOT_BUCKET", "plots"),
            ("MONITOR_OBJECT_BACKEND", "s3"),
            ("MONITOR_ALARM_THRESHOLD_BYTES", "1024"),
            ("MONITOR_API_PORT", "9000"),
            ("MONITOR_S3_ENDPOINT_URL", "http://localhost:9000"),
            ("MONITOR_S3_FORCE_PATH_STYLE", "true"),
        ])
        .unwrap();

        assert_eq!(config.object_backend, ObjectBackend::S3);
        assert_eq!(config.alarm_rule().threshold_bytes, 1024);
        assert_eq!(config.api_port, 9000);
        let s3 = config.s3();
        assert_eq!(s3.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert!(s3.force_path_style);
    }

    #[test]
    fn test_missing_bucket_is_rejected() {
        let err = from_vars(&[("MONITOR_PLOT_BUCKET", "plots")]).unwrap_err();

        match err.downcast_ref::<MonitorError>() {
            Some(MonitorError::ConfigurationMissing(field)) => assert_eq!(field, "source_bucket"),
            other => panic!("expected missing source bucket, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_alarm_window_is_rejected() {
        let err = from_vars(&[
            ("MONITOR_SOURCE_BUCKET", "uploads"),
            ("MONITOR_PLOT_BUCKET", "plots"),
            ("MONITOR_ALARM_WINDOW_SECS", "0"),
        ])
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<MonitorError>(),
            Some(MonitorError::ConfigurationMissing(field)) if field == "alarm_window_secs"
        ));
    }
}
