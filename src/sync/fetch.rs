//! Rate-limited fan-out over the missions that are not stored yet.
//!
//! Submissions are spaced by [`Pacer`]; each submitted fetch runs as its own
//! task and writes its record as soon as it arrives. Tasks only ever push a
//! completion onto a channel, and a single collector counts them and reports
//! progress, so nothing else shares counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::cancel::CancelToken;
use super::rate_limit::{estimate_progress, Pacer};
use super::SyncProgress;
use crate::api::GameApi;
use crate::error::{Error, Result};
use crate::storage::{repository, Database};

#[derive(Debug, Clone, PartialEq)]
pub struct PendingMission {
    pub id: String,
    pub start_timestamp: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub total: usize,
    pub submitted: usize,
    pub fetched: usize,
    pub failed: usize,
    pub cancelled: bool,
}

enum Completion {
    Fetched,
    Failed { mission_id: String, error: Error },
}

pub struct FetchStage {
    pub db: Database,
    pub api: Arc<dyn GameApi>,
    pub progress: Arc<dyn SyncProgress>,
    pub interval: Duration,
}

impl FetchStage {
    /// Attempt every mission once. Individual failures are reported and
    /// counted but never stop the stage; cancellation stops new submissions
    /// and lets the submitted ones drain.
    pub async fn fetch_all(
        &self,
        token: &CancelToken,
        account_id: &str,
        missions: Vec<PendingMission>,
    ) -> FetchOutcome {
        let total = missions.len();
        let mut outcome = FetchOutcome {
            total,
            ..Default::default()
        };
        if total == 0 {
            return outcome;
        }

        let (tx, rx) = mpsc::channel::<Completion>(total);
        self.progress
            .on_mission_progress(&estimate_progress(total, 0, self.interval, Utc::now()));
        let collector = tokio::spawn(collect(
            rx,
            total,
            self.interval,
            Arc::clone(&self.progress),
            token.clone(),
        ));

        let mut pacer = Pacer::new(self.interval);
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(total);
        for mission in missions {
            if !pacer.ready(token).await {
                debug!("fetch stage cancelled after {} submissions", handles.len());
                break;
            }
            let task = MissionTask {
                db: self.db.clone(),
                api: Arc::clone(&self.api),
                token: token.clone(),
                account_id: account_id.to_string(),
                mission,
            };
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let completion = task.run().await;
                // Capacity equals the mission count, so this never waits.
                let _ = tx.send(completion).await;
            }));
        }
        outcome.submitted = handles.len();
        drop(tx);

        let mut panicked = 0;
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("mission fetch task failed: {e}");
                panicked += 1;
            }
        }

        let (fetched, failed) = match collector.await {
            Ok(counts) => counts,
            Err(e) => {
                warn!("progress collector failed: {e}");
                (0, outcome.submitted)
            }
        };
        outcome.fetched = fetched;
        outcome.failed = failed + panicked;
        outcome.cancelled = token.is_cancelled();
        outcome
    }
}

struct MissionTask {
    db: Database,
    api: Arc<dyn GameApi>,
    token: CancelToken,
    account_id: String,
    mission: PendingMission,
}

impl MissionTask {
    async fn run(self) -> Completion {
        match self.fetch_and_store().await {
            Ok(()) => Completion::Fetched,
            Err(error) => Completion::Failed {
                mission_id: self.mission.id,
                error,
            },
        }
    }

    async fn fetch_and_store(&self) -> Result<()> {
        let record = self
            .api
            .fetch_mission_record(
                &self.token,
                &self.account_id,
                &self.mission.id,
                self.mission.start_timestamp,
            )
            .await?;
        if record.identifier != self.mission.id {
            return Err(Error::api(format!(
                "requested mission {} but received {}",
                self.mission.id, record.identifier
            )));
        }
        let account_id = self.account_id.clone();
        self.db
            .writer()
            .call(move |conn| repository::put_mission_record(conn, &account_id, &record))
            .await?;
        Ok(())
    }
}

/// Counts completions in arrival order and reports progress after each.
async fn collect(
    mut rx: mpsc::Receiver<Completion>,
    total: usize,
    interval: Duration,
    progress: Arc<dyn SyncProgress>,
    token: CancelToken,
) -> (usize, usize) {
    let (mut fetched, mut failed) = (0, 0);
    while let Some(completion) = rx.recv().await {
        match completion {
            Completion::Fetched => fetched += 1,
            Completion::Failed { mission_id, error } => {
                failed += 1;
                if error.is_interrupted() || token.is_cancelled() {
                    debug!("mission {mission_id} interrupted");
                } else {
                    warn!("error fetching mission {mission_id}: {error}");
                    progress.on_message(
                        &format!("error fetching mission {mission_id}: {}", error.user_message()),
                        true,
                    );
                }
            }
        }
        progress.on_mission_progress(&estimate_progress(
            total,
            fetched + failed,
            interval,
            Utc::now(),
        ));
    }
    (fetched, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mission_record, FakeGameApi, ProgressEvent, RecordingProgress};
    use tokio::time::Instant;

    fn pending(ids: &[&str]) -> Vec<PendingMission> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| PendingMission {
                id: id.to_string(),
                start_timestamp: i as f64 * 100.0,
            })
            .collect()
    }

    async fn stage(api: FakeGameApi, interval: Duration) -> (FetchStage, Arc<FakeGameApi>, Arc<RecordingProgress>) {
        let api = Arc::new(api);
        let progress = Arc::new(RecordingProgress::default());
        let stage = FetchStage {
            db: Database::open_memory().await.unwrap(),
            api: api.clone(),
            progress: progress.clone(),
            interval,
        };
        (stage, api, progress)
    }

    async fn stored_ids(db: &Database, account_id: &str) -> Vec<String> {
        let account_id = account_id.to_string();
        db.reader()
            .call(move |conn| repository::list_mission_ids(conn, &account_id))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_missions_one_failure() {
        let ids = ["M1", "M2", "M3", "M4", "M5"];
        let mut api = FakeGameApi::default();
        for (i, id) in ids.iter().enumerate() {
            api = api.with_record(mission_record(id, i as f64 * 100.0));
        }
        let api = api.failing("M3");
        let (stage, api, progress) = stage(api, Duration::from_secs(3)).await;
        let token = CancelToken::new();

        let start = Instant::now();
        let outcome = stage.fetch_all(&token, "EI1", pending(&ids)).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.fetched, 4);
        assert_eq!(outcome.submitted, 5);
        assert!(!outcome.cancelled);
        assert!(start.elapsed() >= Duration::from_secs(12));
        assert_eq!(api.mission_calls(), vec!["M1", "M2", "M3", "M4", "M5"]);

        let mut stored = stored_ids(&stage.db, "EI1").await;
        stored.sort();
        assert_eq!(stored, vec!["M1", "M2", "M4", "M5"]);

        let finished: Vec<usize> = progress
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress(p) => Some(p.finished),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(progress.error_messages().len(), 1);
        assert!(progress.error_messages()[0].contains("M3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_new_submissions() {
        let ids = ["M1", "M2", "M3", "M4"];
        let mut api = FakeGameApi::default();
        for id in ids {
            api = api.with_record(mission_record(id, 0.0));
        }
        let (stage, api, _progress) = stage(api, Duration::from_secs(3)).await;
        let token = CancelToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(4)).await;
                token.cancel();
            })
        };
        let outcome = stage.fetch_all(&token, "EI1", pending(&ids)).await;
        canceller.await.unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.submitted, 2);
        assert_eq!(api.mission_calls(), vec!["M1", "M2"]);
        assert_eq!(stored_ids(&stage.db, "EI1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_list_is_a_no_op() {
        let (stage, api, progress) = stage(FakeGameApi::default(), Duration::from_secs(3)).await;
        let outcome = stage.fetch_all(&CancelToken::new(), "EI1", Vec::new()).await;
        assert_eq!(outcome, FetchOutcome::default());
        assert!(api.mission_calls().is_empty());
        assert!(progress.events().is_empty());
    }
}
