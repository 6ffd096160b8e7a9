pub mod cancel;
pub mod fetch;
pub mod orchestrator;
pub mod rate_limit;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::settings::Account;
use crate::storage::{repository, Database};

pub const CONFIG_API_BASE_URL: &str = "api_base_url";
pub const CONFIG_REQUEST_INTERVAL_MS: &str = "request_interval_ms";
pub const CONFIG_DUB_CAP_MULTIPLIER: &str = "dub_cap_multiplier";
pub const CONFIG_REFERENCE_DATA_PATH: &str = "reference_data_path";

pub const DEFAULT_DUB_CAP_MULTIPLIER: f64 = 1.7;

/// Job states, in the order a successful job passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    FetchingSnapshot,
    FetchingMissions,
    Exporting,
    Succeeded,
    Failed,
    Interrupted,
}

impl SyncState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SyncState::Succeeded | SyncState::Failed | SyncState::Interrupted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionProgress {
    pub total: usize,
    pub finished: usize,
    /// e.g. `12.5%`
    pub finished_percentage: String,
    pub expected_finish_at: DateTime<Utc>,
}

/// Receives the ordered event stream of a sync job.
pub trait SyncProgress: Send + Sync {
    fn on_state(&self, _state: SyncState) {}
    fn on_mission_progress(&self, _progress: &MissionProgress) {}
    fn on_message(&self, _message: &str, _is_error: bool) {}
    fn on_known_accounts(&self, _accounts: &[Account]) {}
    fn on_exported_files(&self, _files: &[String]) {}
}

/// No-op progress reporter for non-interactive use.
pub struct NoopProgress;

impl SyncProgress for NoopProgress {}

/// Report returned after a sync job reaches a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub account_id: String,
    pub status: SyncStatus,
    pub missions_total: usize,
    pub missions_fetched: usize,
    pub missions_failed: usize,
    pub exported_files: Vec<String>,
    pub export_reused: bool,
    pub error: Option<String>,
}

impl SyncReport {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            status: SyncStatus::Failed,
            missions_total: 0,
            missions_fetched: 0,
            missions_failed: 0,
            exported_files: Vec::new(),
            export_reused: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    Failed,
    Interrupted,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
            SyncStatus::Interrupted => "interrupted",
        }
    }

    pub fn state(self) -> SyncState {
        match self {
            SyncStatus::Success => SyncState::Succeeded,
            SyncStatus::Failed => SyncState::Failed,
            SyncStatus::Interrupted => SyncState::Interrupted,
        }
    }
}

/// Effective tunables, read from `app_config` with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub api_base_url: Option<String>,
    pub request_interval: Duration,
    pub dub_cap_multiplier: f64,
    pub reference_data_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_interval: rate_limit::DEFAULT_REQUEST_INTERVAL,
            dub_cap_multiplier: DEFAULT_DUB_CAP_MULTIPLIER,
            reference_data_path: None,
        }
    }
}

impl SyncConfig {
    pub async fn load(db: &Database) -> Result<Self> {
        let values = db.reader().call(|conn| repository::list_config(conn)).await?;
        Self::from_pairs(&values)
    }

    pub fn from_pairs(values: &[(String, String)]) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in values {
            let value = value.trim();
            match key.as_str() {
                CONFIG_API_BASE_URL if !value.is_empty() => {
                    config.api_base_url = Some(value.to_string());
                }
                CONFIG_REQUEST_INTERVAL_MS => {
                    let ms: u64 = value.parse().map_err(|_| {
                        Error::Config(format!("{CONFIG_REQUEST_INTERVAL_MS} must be an integer, got {value:?}"))
                    })?;
                    if ms == 0 {
                        return Err(Error::Config(format!(
                            "{CONFIG_REQUEST_INTERVAL_MS} must be positive"
                        )));
                    }
                    config.request_interval = Duration::from_millis(ms);
                }
                CONFIG_DUB_CAP_MULTIPLIER => {
                    let multiplier: f64 = value.parse().map_err(|_| {
                        Error::Config(format!("{CONFIG_DUB_CAP_MULTIPLIER} must be a number, got {value:?}"))
                    })?;
                    if !multiplier.is_finite() || multiplier <= 0.0 {
                        return Err(Error::Config(format!(
                            "{CONFIG_DUB_CAP_MULTIPLIER} must be positive"
                        )));
                    }
                    config.dub_cap_multiplier = multiplier;
                }
                CONFIG_REFERENCE_DATA_PATH if !value.is_empty() => {
                    config.reference_data_path = Some(PathBuf::from(value));
                }
                _ => {}
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(values: &[(&str, &str)]) -> Vec<(String, String)> {
        values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_pairs(&[]).unwrap();
        assert_eq!(config.request_interval, Duration::from_secs(3));
        assert_eq!(config.dub_cap_multiplier, 1.7);
        assert_eq!(config.api_base_url, None);
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_pairs(&pairs(&[
            (CONFIG_API_BASE_URL, "http://localhost:8080"),
            (CONFIG_REQUEST_INTERVAL_MS, "250"),
            (CONFIG_DUB_CAP_MULTIPLIER, "2"),
            (CONFIG_REFERENCE_DATA_PATH, "/tmp/params.json"),
            ("unrelated", "x"),
        ]))
        .unwrap();
        assert_eq!(config.api_base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.request_interval, Duration::from_millis(250));
        assert_eq!(config.dub_cap_multiplier, 2.0);
        assert_eq!(config.reference_data_path, Some(PathBuf::from("/tmp/params.json")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (key, value) in [
            (CONFIG_REQUEST_INTERVAL_MS, "0"),
            (CONFIG_REQUEST_INTERVAL_MS, "soon"),
            (CONFIG_DUB_CAP_MULTIPLIER, "-1"),
            (CONFIG_DUB_CAP_MULTIPLIER, "NaN"),
        ] {
            let err = SyncConfig::from_pairs(&pairs(&[(key, value)])).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{key}={value}");
        }
    }

    #[tokio::test]
    async fn test_load_from_database() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| repository::set_config(conn, CONFIG_REQUEST_INTERVAL_MS, "1000"))
            .await
            .unwrap();
        let config = SyncConfig::load(&db).await.unwrap();
        assert_eq!(config.request_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_terminal_states() {
        assert!(SyncState::Interrupted.is_terminal());
        assert!(!SyncState::Exporting.is_terminal());
        assert_eq!(SyncStatus::Failed.state(), SyncState::Failed);
    }
}
