//! Scripted collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ArtifactDrop, GameApi, MissionRecord, MissionStatus, MissionSummary, Snapshot};
use crate::error::{Error, Result};
use crate::reference::items::Rarity;
use crate::reference::{DurationType, Ship};
use crate::settings::Account;
use crate::sync::cancel::CancelToken;
use crate::sync::{MissionProgress, SyncProgress, SyncState};

pub fn mission_record(id: &str, start_timestamp: f64) -> MissionRecord {
    MissionRecord {
        identifier: id.to_string(),
        ship: Ship::Henerprise,
        duration_type: DurationType::Epic,
        level: 0,
        capacity: 40,
        start_timestamp,
        duration_seconds: 172_800.0,
        target: None,
        drops: vec![ArtifactDrop {
            name: "SOLAR_TITANIUM".to_string(),
            level: 1,
            rarity: Rarity::Common,
        }],
    }
}

pub fn completed_summary(id: &str, start_timestamp: f64) -> MissionSummary {
    MissionSummary {
        identifier: id.to_string(),
        status: MissionStatus::Archived,
        ship: Ship::Henerprise,
        duration_type: DurationType::Epic,
        level: 0,
        capacity: 40,
        start_timestamp,
        duration_seconds: 172_800.0,
        target: None,
    }
}

/// Snapshot listing `ids` as completed, in order, 100s apart.
pub fn snapshot_with(ids: &[&str]) -> Snapshot {
    Snapshot {
        nickname: "tester".to_string(),
        soul_eggs: 1e6,
        eggs_of_prophecy: 0,
        epic_research: Vec::new(),
        last_backup_time: None,
        mission_archive: ids
            .iter()
            .enumerate()
            .map(|(i, id)| completed_summary(id, 1_704_000_000.0 + i as f64 * 100.0))
            .collect(),
        active_missions: Vec::new(),
    }
}

#[derive(Default)]
pub struct FakeGameApi {
    snapshot: Mutex<Option<Snapshot>>,
    records: Mutex<HashMap<String, MissionRecord>>,
    failing: Mutex<HashSet<String>>,
    snapshot_delay: Duration,
    mission_delay: Duration,
    snapshot_calls: Mutex<usize>,
    mission_calls: Mutex<Vec<String>>,
}

impl FakeGameApi {
    pub fn with_snapshot(self, snapshot: Snapshot) -> Self {
        *self.snapshot.lock().unwrap() = Some(snapshot);
        self
    }

    pub fn with_record(self, record: MissionRecord) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(record.identifier.clone(), record);
        self
    }

    /// Records for every completed mission of the snapshot.
    pub fn with_records_for_snapshot(self) -> Self {
        let summaries: Vec<MissionSummary> = self
            .snapshot
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.completed_missions().into_iter().cloned().collect())
            .unwrap_or_default();
        summaries.into_iter().fold(self, |api, s| {
            api.with_record(mission_record(&s.identifier, s.start_timestamp))
        })
    }

    pub fn failing(self, mission_id: &str) -> Self {
        self.set_failing(&[mission_id]);
        self
    }

    pub fn with_snapshot_delay(mut self, delay: Duration) -> Self {
        self.snapshot_delay = delay;
        self
    }

    pub fn with_mission_delay(mut self, delay: Duration) -> Self {
        self.mission_delay = delay;
        self
    }

    pub fn set_failing(&self, mission_ids: &[&str]) {
        let mut failing = self.failing.lock().unwrap();
        failing.clear();
        failing.extend(mission_ids.iter().map(|id| id.to_string()));
    }

    pub fn set_snapshot(&self, snapshot: Option<Snapshot>) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn snapshot_calls(&self) -> usize {
        *self.snapshot_calls.lock().unwrap()
    }

    pub fn mission_calls(&self) -> Vec<String> {
        self.mission_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GameApi for FakeGameApi {
    async fn fetch_account_snapshot(&self, token: &CancelToken, _account_id: &str) -> Result<Snapshot> {
        *self.snapshot_calls.lock().unwrap() += 1;
        if !self.snapshot_delay.is_zero() {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Interrupted),
                _ = tokio::time::sleep(self.snapshot_delay) => {}
            }
        }
        token.check()?;
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Api {
                status: Some(500),
                message: "snapshot unavailable".to_string(),
            })
    }

    async fn fetch_mission_record(
        &self,
        token: &CancelToken,
        _account_id: &str,
        mission_id: &str,
        _start_timestamp: f64,
    ) -> Result<MissionRecord> {
        self.mission_calls
            .lock()
            .unwrap()
            .push(mission_id.to_string());
        if !self.mission_delay.is_zero() {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Interrupted),
                _ = tokio::time::sleep(self.mission_delay) => {}
            }
        }
        token.check()?;
        if self.failing.lock().unwrap().contains(mission_id) {
            return Err(Error::Api {
                status: Some(503),
                message: format!("simulated failure for {mission_id}"),
            });
        }
        self.records
            .lock()
            .unwrap()
            .get(mission_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("mission {mission_id}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    State(SyncState),
    Progress(MissionProgress),
    Message { text: String, is_error: bool },
    KnownAccounts(Vec<String>),
    ExportedFiles(Vec<String>),
}

#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<SyncState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Message {
                    text,
                    is_error: true,
                } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn exported_files(&self) -> Option<Vec<String>> {
        self.events().into_iter().rev().find_map(|e| match e {
            ProgressEvent::ExportedFiles(files) => Some(files),
            _ => None,
        })
    }

    fn push(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl SyncProgress for RecordingProgress {
    fn on_state(&self, state: SyncState) {
        self.push(ProgressEvent::State(state));
    }

    fn on_mission_progress(&self, progress: &MissionProgress) {
        self.push(ProgressEvent::Progress(progress.clone()));
    }

    fn on_message(&self, message: &str, is_error: bool) {
        self.push(ProgressEvent::Message {
            text: message.to_string(),
            is_error,
        });
    }

    fn on_known_accounts(&self, accounts: &[Account]) {
        self.push(ProgressEvent::KnownAccounts(
            accounts.iter().map(|a| a.id.clone()).collect(),
        ));
    }

    fn on_exported_files(&self, files: &[String]) {
        self.push(ProgressEvent::ExportedFiles(files.to_vec()));
    }
}
