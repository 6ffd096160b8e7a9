pub mod api;
pub mod date_util;
pub mod error;
pub mod export;
pub mod reference;
pub mod settings;
pub mod storage;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

pub use api::{GameApi, MissionRecord, Snapshot};
pub use error::{Error, Result};
pub use export::row::MissionRow;
pub use reference::ReferenceData;
pub use settings::{Account, Settings};
pub use storage::repository::SyncRun;
pub use storage::Database;
pub use sync::{
    MissionProgress, NoopProgress, SyncConfig, SyncProgress, SyncReport, SyncState, SyncStatus,
};

use api::http::HttpGameApi;
use export::row::build_rows;
use export::Exporter;
use storage::repository;
use sync::orchestrator::Syncer;

/// A known account together with what is stored locally for it.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub account: Account,
    pub mission_count: i64,
    pub last_run: Option<SyncRun>,
}

/// Main entry point: wires the database, settings, reference data and the
/// sync orchestrator together.
pub struct EggLedger {
    db: Database,
    root_dir: PathBuf,
    settings: Settings,
    reference: Arc<ReferenceData>,
    config: SyncConfig,
    syncer: Option<Syncer>,
}

impl EggLedger {
    /// Open with the HTTP game API from `api_base_url`. Sync is unavailable
    /// until that key is set; everything else works without it.
    pub async fn open(db: Database, root_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut ledger = Self::load(db, root_dir.into()).await?;
        if let Some(base_url) = ledger.config.api_base_url.clone() {
            let api = HttpGameApi::new(&base_url)?;
            ledger.syncer = Some(ledger.build_syncer(Arc::new(api)));
        }
        Ok(ledger)
    }

    /// Open with an explicit game API implementation.
    pub async fn with_api(
        db: Database,
        root_dir: impl Into<PathBuf>,
        api: Arc<dyn GameApi>,
    ) -> Result<Self> {
        let mut ledger = Self::load(db, root_dir.into()).await?;
        ledger.syncer = Some(ledger.build_syncer(api));
        Ok(ledger)
    }

    async fn load(db: Database, root_dir: PathBuf) -> Result<Self> {
        let config = SyncConfig::load(&db).await?;
        let reference = match &config.reference_data_path {
            Some(path) => ReferenceData::load(path)?,
            None => ReferenceData::bundled()?,
        };
        let settings = Settings::load(root_dir.join("internal").join("storage.json"));
        Ok(Self {
            db,
            root_dir,
            settings,
            reference: Arc::new(reference),
            config,
            syncer: None,
        })
    }

    fn build_syncer(&self, api: Arc<dyn GameApi>) -> Syncer {
        let exporter = Exporter::new(
            &self.root_dir,
            Arc::clone(&self.reference),
            self.config.dub_cap_multiplier,
        );
        Syncer::new(
            self.db.clone(),
            api,
            self.settings.clone(),
            Arc::new(exporter),
            self.config.request_interval,
        )
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn syncer(&self) -> Result<&Syncer> {
        self.syncer.as_ref().ok_or_else(|| {
            Error::Config(
                "api_base_url is not set. Run: eggledger config set api_base_url <URL>".into(),
            )
        })
    }

    // ── Sync ───────────────────────────────────────────────────────

    /// Start syncing `account_id` in the background.
    pub fn start_sync(
        &self,
        account_id: &str,
        progress: Arc<dyn SyncProgress>,
    ) -> Result<JoinHandle<SyncReport>> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(Error::Config("account id must not be empty".into()));
        }
        self.syncer()?.start(account_id, progress)
    }

    pub async fn sync(&self, account_id: &str, progress: Arc<dyn SyncProgress>) -> Result<SyncReport> {
        self.start_sync(account_id, progress)?
            .await
            .map_err(|e| Error::Other(format!("sync task failed: {e}")))
    }

    /// Cancel the running sync. Does nothing when idle.
    pub fn cancel_sync(&self) {
        if let Some(syncer) = &self.syncer {
            syncer.cancel();
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncer.as_ref().is_some_and(Syncer::is_busy)
    }

    // ── Stored data ────────────────────────────────────────────────

    /// Known accounts, most recently synced first, with local mission counts.
    pub async fn existing_data(&self) -> Result<Vec<AccountSummary>> {
        let accounts = self.settings.known_accounts();
        let summaries = self
            .db
            .reader()
            .call(move |conn| {
                accounts
                    .into_iter()
                    .map(|account| {
                        let mission_count = repository::count_missions(conn, &account.id)?;
                        let last_run = repository::last_sync_run(conn, &account.id)?;
                        Ok(AccountSummary {
                            account,
                            mission_count,
                            last_run,
                        })
                    })
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            })
            .await?;
        Ok(summaries)
    }

    pub async fn mission_ids(&self, account_id: &str) -> Result<Vec<String>> {
        let account_id = account_id.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::list_mission_ids(conn, &account_id))
            .await?)
    }

    pub async fn mission(&self, account_id: &str, mission_id: &str) -> Result<MissionRecord> {
        let (account, mission) = (account_id.to_string(), mission_id.to_string());
        self.db
            .reader()
            .call(move |conn| repository::get_mission_record(conn, &account, &mission))
            .await?
            .ok_or_else(|| Error::NotFound(format!("mission {mission_id} of {account_id}")))
    }

    /// Stored missions flattened the same way they are exported.
    pub async fn mission_rows(&self, account_id: &str) -> Result<Vec<MissionRow>> {
        let account_id = account_id.to_string();
        let records = self
            .db
            .reader()
            .call(move |conn| repository::list_mission_records(conn, &account_id))
            .await?;
        Ok(build_rows(
            &records,
            &self.reference,
            self.config.dub_cap_multiplier,
        ))
    }

    pub async fn sync_runs(&self) -> Result<Vec<SyncRun>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::latest_sync_runs(conn))
            .await?)
    }

    // ── Config ─────────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await?)
    }

    /// Validate and store a tunable. Takes effect on the next open.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.config_list().await?;
        values.retain(|(k, _)| k != key);
        values.push((key.to_string(), value.to_string()));
        SyncConfig::from_pairs(&values)?;

        let (key, value) = (key.to_string(), value.to_string());
        self.db
            .writer()
            .call(move |conn| repository::set_config(conn, &key, &value))
            .await?;
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?)
    }
}
