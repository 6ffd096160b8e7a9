use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use regex::Regex;

use crate::date_util::{filename_timestamp, parse_filename_timestamp};
use crate::error::{Error, Result};

pub const XLSX_EXT: &str = "xlsx";
pub const CSV_EXT: &str = "csv";

/// Spreadsheet and delimited-text files generated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPair {
    pub xlsx: PathBuf,
    pub csv: PathBuf,
    pub timestamp: NaiveDateTime,
}

impl ArtifactPair {
    pub fn at(dir: &Path, account_id: &str, timestamp: NaiveDateTime) -> Self {
        Self {
            xlsx: artifact_path(dir, account_id, timestamp, XLSX_EXT),
            csv: artifact_path(dir, account_id, timestamp, CSV_EXT),
            timestamp,
        }
    }

    pub fn exists(&self) -> bool {
        self.xlsx.exists() || self.csv.exists()
    }
}

pub fn artifact_path(dir: &Path, account_id: &str, timestamp: NaiveDateTime, ext: &str) -> PathBuf {
    dir.join(format!("{account_id}.{}.{ext}", filename_timestamp(timestamp)))
}

fn artifact_pattern(account_id: &str) -> Result<Regex> {
    Regex::new(&format!(
        r"^{}\.(\d{{8}}_\d{{6}})\.({XLSX_EXT}|{CSV_EXT})$",
        regex::escape(account_id)
    ))
    .map_err(|e| Error::Export(format!("bad filename pattern: {e}")))
}

/// The most recent pair for `account_id` in `dir`. The latest spreadsheet and
/// the latest text file must share a timestamp, otherwise there is no pair.
pub fn find_last_pair(dir: &Path, account_id: &str) -> Result<Option<ArtifactPair>> {
    let pattern = artifact_pattern(account_id)?;
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut latest: HashMap<String, NaiveDateTime> = HashMap::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(caps) = pattern.captures(name) else {
            continue;
        };
        let Some(timestamp) = parse_filename_timestamp(&caps[1]) else {
            continue;
        };
        let ext = caps[2].to_string();
        latest
            .entry(ext)
            .and_modify(|t| *t = (*t).max(timestamp))
            .or_insert(timestamp);
    }

    match (latest.get(XLSX_EXT), latest.get(CSV_EXT)) {
        (Some(x), Some(c)) if x == c => Ok(Some(ArtifactPair::at(dir, account_id, *x))),
        _ => Ok(None),
    }
}
