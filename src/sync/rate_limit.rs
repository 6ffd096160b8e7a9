use std::time::Duration;

use chrono::{DateTime, Utc};

use super::cancel::CancelToken;
use super::MissionProgress;

pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_secs(3);

/// Spaces submissions a fixed interval apart. Spacing is measured between
/// submissions, not completions.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    submitted: usize,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            submitted: 0,
        }
    }

    /// Wait for the next submission slot. The first slot is immediate.
    /// Returns `false` as soon as the token is cancelled.
    pub async fn ready(&mut self, token: &CancelToken) -> bool {
        if token.is_cancelled() {
            return false;
        }
        if self.submitted > 0 {
            tokio::select! {
                biased;
                _ = token.cancelled() => return false,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        self.submitted += 1;
        true
    }
}

/// Progress snapshot with the finish time extrapolated from the remaining
/// count and the submission interval.
pub fn estimate_progress(
    total: usize,
    finished: usize,
    interval: Duration,
    now: DateTime<Utc>,
) -> MissionProgress {
    let remaining = u32::try_from(total.saturating_sub(finished)).unwrap_or(u32::MAX);
    // Saturates on overflow.
    let expected_finish_at = interval
        .checked_mul(remaining)
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .and_then(|eta| now.checked_add_signed(eta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let percentage = if total == 0 {
        100.0
    } else {
        finished as f64 / total as f64 * 100.0
    };
    MissionProgress {
        total,
        finished,
        finished_percentage: format!("{percentage:.1}%"),
        expected_finish_at,
    }
}
