//! Export stage: render the full mission history of an account to a
//! spreadsheet + CSV pair, reusing the previous pair when nothing changed.

pub mod compare;
pub mod csv;
pub mod pair;
pub mod row;
pub mod xlsx;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use log::{error, info, warn};

use self::pair::{find_last_pair, ArtifactPair};
use self::row::{build_rows, MissionRow};
use crate::error::{Error, Result};
use crate::reference::ReferenceData;
use crate::storage::{repository, Database};
use crate::sync::cancel::CancelToken;

/// Suffix of files that are still being written.
const STAGING_SUFFIX: &str = "partial";

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub pair: ArtifactPair,
    /// Pair paths relative to the application root, spreadsheet first.
    pub files: Vec<String>,
    /// True when the previous pair was identical and is reported instead.
    pub reused: bool,
    pub mission_count: usize,
}

pub struct Exporter {
    root_dir: PathBuf,
    export_dir: PathBuf,
    reference: Arc<ReferenceData>,
    dub_cap_multiplier: f64,
}

impl Exporter {
    pub fn new(root_dir: impl Into<PathBuf>, reference: Arc<ReferenceData>, dub_cap_multiplier: f64) -> Self {
        let root_dir = root_dir.into();
        Self {
            export_dir: root_dir.join("exports").join("missions"),
            root_dir,
            reference,
            dub_cap_multiplier,
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Export every stored mission of `account_id`. The token is checked
    /// between steps; a cancelled export leaves no new files behind.
    pub async fn export(
        &self,
        db: &Database,
        account_id: &str,
        token: &CancelToken,
        generated_at: NaiveDateTime,
    ) -> Result<ExportOutcome> {
        token.check()?;
        let records = db
            .reader()
            .call({
                let account_id = account_id.to_string();
                move |conn| repository::list_mission_records(conn, &account_id)
            })
            .await?;
        token.check()?;

        let rows = build_rows(&records, &self.reference, self.dub_cap_multiplier);
        let job = ExportJob {
            root_dir: self.root_dir.clone(),
            export_dir: self.export_dir.clone(),
            account_id: account_id.to_string(),
            generated_at,
            token: token.clone(),
        };
        tokio::task::spawn_blocking(move || job.run(&rows))
            .await
            .map_err(|e| Error::Export(format!("export task failed: {e}")))?
    }
}

struct ExportJob {
    root_dir: PathBuf,
    export_dir: PathBuf,
    account_id: String,
    generated_at: NaiveDateTime,
    token: CancelToken,
}

/// Removes staged files that were not renamed into place.
struct Staged(Vec<PathBuf>);

impl Drop for Staged {
    fn drop(&mut self) {
        for path in &self.0 {
            if path.is_file() {
                if let Err(e) = std::fs::remove_file(path) {
                    error!("error removing {}: {e}", path.display());
                }
            }
        }
    }
}

impl ExportJob {
    fn run(&self, rows: &[MissionRow]) -> Result<ExportOutcome> {
        std::fs::create_dir_all(&self.export_dir)
            .map_err(|e| Error::Export(format!("failed to create export directory: {e}")))?;

        let previous = find_last_pair(&self.export_dir, &self.account_id).unwrap_or_else(|e| {
            error!("error locating last exported pair: {e}");
            None
        });

        let target = ArtifactPair::at(&self.export_dir, &self.account_id, self.generated_at);
        let staged_xlsx = staging_path(&target.xlsx);
        let staged_csv = staging_path(&target.csv);
        let staged = Staged(vec![staged_xlsx.clone(), staged_csv.clone()]);

        std::fs::write(&staged_xlsx, xlsx::encode_xlsx(rows)?)?;
        self.token.check()?;
        std::fs::write(&staged_csv, self::csv::encode_csv(rows)?)?;
        self.token.check()?;

        if let Some(previous) = previous {
            if self.unchanged(&staged_xlsx, &staged_csv, &previous) {
                info!("exports unchanged, using last exported files and deleting new ones");
                drop(staged);
                return Ok(self.outcome(previous, true, rows.len()));
            }
        }

        let mut target = target;
        while target.exists() {
            let next = target.timestamp + chrono::Duration::seconds(1);
            target = ArtifactPair::at(&self.export_dir, &self.account_id, next);
        }
        self.token.check()?;

        std::fs::rename(&staged_xlsx, &target.xlsx)?;
        if let Err(e) = std::fs::rename(&staged_csv, &target.csv) {
            if let Err(cleanup) = std::fs::remove_file(&target.xlsx) {
                warn!("error removing {}: {cleanup}", target.xlsx.display());
            }
            return Err(e.into());
        }
        drop(staged);
        info!(
            "exported {} missions to {}",
            rows.len(),
            target.xlsx.with_extension("").display()
        );
        Ok(self.outcome(target, false, rows.len()))
    }

    fn unchanged(&self, xlsx: &Path, csv: &Path, previous: &ArtifactPair) -> bool {
        let xlsx_unchanged = compare::zip_contents_identical(xlsx, &previous.xlsx).unwrap_or_else(|e| {
            error!("error comparing {}: {e}", previous.xlsx.display());
            false
        });
        if !xlsx_unchanged {
            return false;
        }
        compare::files_identical(csv, &previous.csv).unwrap_or_else(|e| {
            error!("error comparing {}: {e}", previous.csv.display());
            false
        })
    }

    fn outcome(&self, pair: ArtifactPair, reused: bool, mission_count: usize) -> ExportOutcome {
        let files = vec![
            relative_to(&self.root_dir, &pair.xlsx),
            relative_to(&self.root_dir, &pair.csv),
        ];
        ExportOutcome {
            pair,
            files,
            reused,
            mission_count,
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(STAGING_SUFFIX);
    path.with_file_name(name)
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .trim()
        .to_string()
}
