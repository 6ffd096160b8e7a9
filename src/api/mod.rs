//! Remote game service contract and the data it returns.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reference::items::Rarity;
use crate::reference::rank::earnings_bonus;
use crate::reference::{DurationType, Ship};
use crate::sync::cancel::CancelToken;

/// Epic research ids feeding the earnings bonus.
pub const SOUL_EGG_RESEARCH: &str = "soul_eggs";
pub const PROPHECY_RESEARCH: &str = "prophecy_bonus";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    Fueling,
    PrepareToLaunch,
    Exploring,
    Returned,
    Analyzing,
    Complete,
    Archived,
}

impl MissionStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, MissionStatus::Complete | MissionStatus::Archived)
    }

    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            MissionStatus::Exploring | MissionStatus::Fueling | MissionStatus::PrepareToLaunch
        )
    }
}

/// Mission as listed inside a snapshot. Carries no drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSummary {
    pub identifier: String,
    pub status: MissionStatus,
    pub ship: Ship,
    pub duration_type: DurationType,
    #[serde(default)]
    pub level: u32,
    pub capacity: u32,
    pub start_timestamp: f64,
    pub duration_seconds: f64,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicResearch {
    pub id: String,
    pub level: u32,
}

/// One remote read of an account's save state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub soul_eggs: f64,
    #[serde(default)]
    pub eggs_of_prophecy: u64,
    #[serde(default)]
    pub epic_research: Vec<EpicResearch>,
    /// Unix seconds of the backup this snapshot was read from.
    #[serde(default)]
    pub last_backup_time: Option<f64>,
    #[serde(default)]
    pub mission_archive: Vec<MissionSummary>,
    #[serde(default)]
    pub active_missions: Vec<MissionSummary>,
}

impl Snapshot {
    /// Completed missions from the archive then the active list, first
    /// occurrence of each identifier kept, stably sorted by start time.
    pub fn completed_missions(&self) -> Vec<&MissionSummary> {
        let mut seen = std::collections::HashSet::new();
        let mut completed: Vec<&MissionSummary> = self
            .mission_archive
            .iter()
            .chain(self.active_missions.iter())
            .filter(|m| m.status.is_completed())
            .filter(|m| seen.insert(m.identifier.as_str()))
            .collect();
        completed.sort_by(|a, b| a.start_timestamp.total_cmp(&b.start_timestamp));
        completed
    }

    pub fn in_progress_missions(&self) -> Vec<&MissionSummary> {
        let mut active: Vec<&MissionSummary> = self
            .active_missions
            .iter()
            .filter(|m| m.status.is_in_progress())
            .collect();
        active.sort_by(|a, b| a.start_timestamp.total_cmp(&b.start_timestamp));
        active
    }

    fn research_level(&self, id: &str) -> u32 {
        self.epic_research
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.level)
            .unwrap_or(0)
    }

    pub fn earnings_bonus(&self) -> f64 {
        earnings_bonus(
            self.soul_eggs,
            self.eggs_of_prophecy,
            self.research_level(SOUL_EGG_RESEARCH),
            self.research_level(PROPHECY_RESEARCH),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDrop {
    pub name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub rarity: Rarity,
}

/// Immutable result of one completed mission, as stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionRecord {
    pub identifier: String,
    pub ship: Ship,
    pub duration_type: DurationType,
    #[serde(default)]
    pub level: u32,
    pub capacity: u32,
    pub start_timestamp: f64,
    pub duration_seconds: f64,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub drops: Vec<ArtifactDrop>,
}

impl MissionRecord {
    pub fn return_timestamp(&self) -> f64 {
        self.start_timestamp + self.duration_seconds
    }
}

/// The two remote operations the sync pipeline needs. Implementations must
/// return `Error::Interrupted` promptly once `token` is cancelled.
#[async_trait]
pub trait GameApi: Send + Sync {
    async fn fetch_account_snapshot(&self, token: &CancelToken, account_id: &str)
        -> Result<Snapshot>;

    async fn fetch_mission_record(
        &self,
        token: &CancelToken,
        account_id: &str,
        mission_id: &str,
        start_timestamp: f64,
    ) -> Result<MissionRecord>;
}
