//! Account registry and small advisory settings, kept in a JSON file.
//!
//! Reads and read-modify-write sequences happen under one lock. Setters
//! persist in the background after releasing it; callers that need the file
//! on disk (tests, shutdown) call [`Settings::flush`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    pub id: String,
    pub nickname: String,
    /// Earnings bonus formatted for display, e.g. `1.23K`.
    pub eb_string: String,
    pub role: String,
    /// Hex color of the role, without `#`.
    pub color: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsData {
    pub known_accounts: Vec<Account>,
    pub last_update_check_at: Option<DateTime<Utc>>,
    pub known_latest_version: String,
    pub auto_refresh_reference_data: bool,
}

struct Inner {
    path: PathBuf,
    data: Mutex<SettingsData>,
    // Serializes writers so an older snapshot never lands after a newer one.
    persist: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct Settings {
    inner: Arc<Inner>,
}

impl Settings {
    /// Load settings from `path`. A missing or unreadable file yields defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                error!("error parsing {}: {e}", path.display());
                SettingsData::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SettingsData::default(),
            Err(e) => {
                error!("error loading {}: {e}", path.display());
                SettingsData::default()
            }
        };
        Self {
            inner: Arc::new(Inner {
                path,
                data: Mutex::new(data),
                persist: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn lock(&self) -> MutexGuard<'_, SettingsData> {
        self.inner.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SettingsData {
        self.lock().clone()
    }

    /// Most recently synced first.
    pub fn known_accounts(&self) -> Vec<Account> {
        self.lock().known_accounts.clone()
    }

    /// Insert or replace `account` and move it to the front of the list.
    pub fn add_known_account(&self, account: Account) {
        {
            let mut data = self.lock();
            let mut accounts = Vec::with_capacity(data.known_accounts.len() + 1);
            let id = account.id.clone();
            accounts.push(account);
            let mut seen = std::collections::HashSet::from([id]);
            for a in data.known_accounts.drain(..) {
                if seen.insert(a.id.clone()) {
                    accounts.push(a);
                }
            }
            data.known_accounts = accounts;
        }
        self.persist_in_background();
    }

    // No update checker runs in this crate; the fields round-trip from disk.
    #[cfg(test)]
    pub(crate) fn set_update_check(&self, latest_version: &str) {
        {
            let mut data = self.lock();
            data.last_update_check_at = Some(Utc::now());
            data.known_latest_version = latest_version.to_string();
        }
        self.persist_in_background();
    }

    pub fn auto_refresh_reference_data(&self) -> bool {
        self.lock().auto_refresh_reference_data
    }

    pub fn set_auto_refresh_reference_data(&self, flag: bool) {
        self.lock().auto_refresh_reference_data = flag;
        self.persist_in_background();
    }

    fn persist_in_background(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let settings = self.clone();
                handle.spawn(async move {
                    if let Err(e) = settings.persist().await {
                        warn!("error writing {}: {e}", settings.path().display());
                    }
                });
            }
            Err(_) => {
                if let Err(e) = write_file(&self.inner.path, &self.snapshot()) {
                    warn!("error writing {}: {e}", self.inner.path.display());
                }
            }
        }
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.inner.persist.lock().await;
        let data = self.snapshot();
        let path = self.inner.path.clone();
        tokio::task::spawn_blocking(move || write_file(&path, &data))
            .await
            .map_err(|e| crate::error::Error::Other(format!("settings writer panicked: {e}")))?
    }

    /// Write the current state and wait for it to reach disk.
    pub async fn flush(&self) -> Result<()> {
        self.persist().await
    }
}

fn write_file(path: &Path, data: &SettingsData) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let encoded = serde_json::to_vec_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, encoded)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
