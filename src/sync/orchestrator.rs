//! Sync orchestrator: one job at a time, snapshot → missing missions →
//! export, with every state change reported in order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Utc};
use log::{error, info, warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use super::cancel::CancelToken;
use super::fetch::{FetchStage, PendingMission};
use super::{SyncProgress, SyncReport, SyncState, SyncStatus};
use crate::api::GameApi;
use crate::date_util::{from_unix_seconds, humanize_age};
use crate::error::{Error, Result};
use crate::export::Exporter;
use crate::reference::rank::derive_rank;
use crate::settings::{Account, Settings};
use crate::storage::{repository, Database};

const BUSY_MESSAGE: &str = "already fetching player data, cannot accept new work";

pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub struct Syncer {
    db: Database,
    api: Arc<dyn GameApi>,
    settings: Settings,
    exporter: Arc<Exporter>,
    request_interval: Duration,
    clock: Clock,
    gate: Arc<Semaphore>,
    current: Arc<Mutex<Option<CancelToken>>>,
}

impl Syncer {
    pub fn new(
        db: Database,
        api: Arc<dyn GameApi>,
        settings: Settings,
        exporter: Arc<Exporter>,
        request_interval: Duration,
    ) -> Self {
        Self {
            db,
            api,
            settings,
            exporter,
            request_interval,
            clock: Arc::new(|| Local::now().naive_local()),
            gate: Arc::new(Semaphore::new(1)),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Override the source of export timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// True while a job holds the gate.
    pub fn is_busy(&self) -> bool {
        self.gate.available_permits() == 0
    }

    /// Start a job in the background. Rejected with [`Error::Busy`] while
    /// another job is in flight; nothing is queued.
    pub fn start(
        &self,
        account_id: &str,
        progress: Arc<dyn SyncProgress>,
    ) -> Result<JoinHandle<SyncReport>> {
        let permit = match Arc::clone(&self.gate).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("{BUSY_MESSAGE}");
                progress.on_message(BUSY_MESSAGE, true);
                return Err(Error::Busy);
            }
        };

        let token = CancelToken::new();
        *self.lock_current() = Some(token.clone());

        let job = Job {
            db: self.db.clone(),
            api: Arc::clone(&self.api),
            settings: self.settings.clone(),
            exporter: Arc::clone(&self.exporter),
            request_interval: self.request_interval,
            clock: Arc::clone(&self.clock),
            account_id: account_id.to_string(),
            progress,
            token,
        };
        let current = Arc::clone(&self.current);
        Ok(tokio::spawn(async move {
            let report = job.run().await;
            release(current, permit);
            report
        }))
    }

    /// Start a job and wait for its report.
    pub async fn run(&self, account_id: &str, progress: Arc<dyn SyncProgress>) -> Result<SyncReport> {
        self.start(account_id, progress)?
            .await
            .map_err(|e| Error::Other(format!("sync task failed: {e}")))
    }

    /// Cancel the running job, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.lock_current().as_ref() {
            info!("cancelling sync");
            token.cancel();
        }
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<CancelToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn release(current: Arc<Mutex<Option<CancelToken>>>, permit: OwnedSemaphorePermit) {
    *current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    drop(permit);
}

struct Job {
    db: Database,
    api: Arc<dyn GameApi>,
    settings: Settings,
    exporter: Arc<Exporter>,
    request_interval: Duration,
    clock: Clock,
    account_id: String,
    progress: Arc<dyn SyncProgress>,
    token: CancelToken,
}

impl Job {
    async fn run(self) -> SyncReport {
        let run_id = self.begin_run().await;
        let mut report = SyncReport::new(&self.account_id);

        let status = match self.execute(&mut report).await {
            Ok(()) => SyncStatus::Success,
            Err(e) if e.is_interrupted() || self.token.is_cancelled() => {
                info!("sync of {} interrupted", self.account_id);
                self.progress.on_message("interrupted", false);
                SyncStatus::Interrupted
            }
            Err(e @ Error::MissionsFailed { .. }) => {
                report.error = Some(e.to_string());
                SyncStatus::Failed
            }
            Err(e) => {
                error!("sync of {} failed: {e}", self.account_id);
                self.progress.on_message(&e.user_message(), true);
                report.error = Some(e.to_string());
                SyncStatus::Failed
            }
        };
        report.status = status;

        if let Some(run_id) = run_id {
            self.finish_run(run_id, &report).await;
        }
        self.progress.on_state(status.state());
        report
    }

    async fn execute(&self, report: &mut SyncReport) -> Result<()> {
        self.progress.on_state(SyncState::FetchingSnapshot);
        let snapshot = self
            .api
            .fetch_account_snapshot(&self.token, &self.account_id)
            .await
            .map_err(|e| {
                if self.token.is_cancelled() {
                    Error::Interrupted
                } else {
                    e
                }
            })?;
        self.token.check()?;

        let earnings_bonus = snapshot.earnings_bonus();
        let rank = derive_rank(earnings_bonus);
        let mut msg = format!("successfully fetched backup for {}", self.account_id);
        if !snapshot.nickname.is_empty() {
            msg.push_str(&format!(" ({})", snapshot.nickname));
        }
        self.info(&msg);
        self.info(&format!(
            "updated local database EB to {}, role to {}",
            rank.display, rank.name
        ));

        let now = Utc::now();
        match snapshot
            .last_backup_time
            .filter(|t| *t > 0.0)
            .and_then(from_unix_seconds)
        {
            Some(backup_at) => {
                self.info(&format!("backup is from {}", humanize_age(backup_at.min(now), now)))
            }
            None => self.error("backup is from unknown time"),
        }

        self.settings.add_known_account(Account {
            id: self.account_id.clone(),
            nickname: snapshot.nickname.clone(),
            eb_string: rank.display.clone(),
            role: rank.name.to_string(),
            color: rank.color.to_string(),
            last_synced_at: Some(now),
        });
        self.progress
            .on_known_accounts(&self.settings.known_accounts());
        self.token.check()?;

        let completed = snapshot.completed_missions();
        let in_progress = snapshot.in_progress_missions();
        let existing: HashSet<String> = self
            .db
            .reader()
            .call({
                let account_id = self.account_id.clone();
                move |conn| repository::list_mission_ids(conn, &account_id)
            })
            .await?
            .into_iter()
            .collect();
        let pending: Vec<PendingMission> = completed
            .iter()
            .filter(|m| !existing.contains(&m.identifier))
            .map(|m| PendingMission {
                id: m.identifier.clone(),
                start_timestamp: m.start_timestamp,
            })
            .collect();
        self.info(&format!(
            "found {} completed missions, {} in-progress missions, {} to fetch",
            completed.len(),
            in_progress.len(),
            pending.len()
        ));

        let total = pending.len();
        report.missions_total = total;
        if total > 0 {
            self.progress.on_state(SyncState::FetchingMissions);
            let stage = FetchStage {
                db: self.db.clone(),
                api: Arc::clone(&self.api),
                progress: Arc::clone(&self.progress),
                interval: self.request_interval,
            };
            let outcome = stage.fetch_all(&self.token, &self.account_id, pending).await;
            report.missions_fetched = outcome.fetched;
            report.missions_failed = outcome.failed;
            self.token.check()?;

            if outcome.failed > 0 {
                let err = Error::MissionsFailed {
                    failed: outcome.failed,
                    total,
                };
                self.error(&err.to_string());
                self.info("(performing another fetch will fetch the failed missions most of the time)");
                return Err(err);
            }
            self.info(&format!("successfully fetched {total} missions"));
        }

        self.progress.on_state(SyncState::Exporting);
        let outcome = self
            .exporter
            .export(&self.db, &self.account_id, &self.token, (self.clock)())
            .await?;
        if outcome.reused {
            self.info("exports identical with existing data files, reusing");
        }
        report.exported_files = outcome.files.clone();
        report.export_reused = outcome.reused;
        self.progress.on_exported_files(&outcome.files);
        self.info("done.");
        Ok(())
    }

    fn info(&self, msg: &str) {
        info!("{msg}");
        self.progress.on_message(msg, false);
    }

    fn error(&self, msg: &str) {
        error!("{msg}");
        self.progress.on_message(msg, true);
    }

    async fn begin_run(&self) -> Option<i64> {
        let account_id = self.account_id.clone();
        match self
            .db
            .writer()
            .call(move |conn| repository::insert_sync_run(conn, &account_id))
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("cannot record sync run: {e}");
                None
            }
        }
    }

    async fn finish_run(&self, run_id: i64, report: &SyncReport) {
        let report = report.clone();
        let result = self
            .db
            .writer()
            .call(move |conn| {
                repository::finish_sync_run(
                    conn,
                    run_id,
                    report.status.as_str(),
                    report.missions_total,
                    report.missions_fetched,
                    report.missions_failed,
                    report.error.as_deref(),
                    &report.exported_files,
                )
            })
            .await;
        if let Err(e) = result {
            warn!("cannot record sync run result: {e}");
        }
    }
}
