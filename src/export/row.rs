use serde::Serialize;

use crate::api::MissionRecord;
use crate::date_util::{duration_string, format_unix_seconds};
use crate::reference::items;
use crate::reference::ReferenceData;

/// Launch window during which the game handed out inflated capacities.
const BUGGED_CAPACITY_AFTER: f64 = 1_712_721_600.0;
const BUGGED_CAPACITY_BEFORE: f64 = 1_713_286_800.0;

pub const HEADERS: [&str; 14] = [
    "ID",
    "Ship",
    "Duration Type",
    "Level",
    "Launched at",
    "Returned at",
    "Duration",
    "Capacity",
    "Nominal Capacity",
    "Double Capacity",
    "Bugged Capacity",
    "Target",
    "Drops",
    "Drop Details",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl Cell {
    /// Delimited-text rendering.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

/// One flattened mission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionRow {
    pub id: String,
    pub ship: String,
    pub duration_type: String,
    pub level: u32,
    pub launched_at: String,
    pub returned_at: String,
    pub duration: String,
    pub capacity: u32,
    pub nominal_capacity: Option<f64>,
    pub is_dub_cap: bool,
    pub is_bugged_cap: bool,
    pub target: String,
    pub drop_count: usize,
    pub drop_details: String,
    #[serde(skip)]
    pub launched_timestamp: f64,
}

impl MissionRow {
    pub fn from_record(
        record: &MissionRecord,
        reference: &ReferenceData,
        dub_cap_multiplier: f64,
    ) -> Self {
        let nominal_capacity =
            reference.nominal_capacity(record.ship, record.duration_type, record.level);
        let capacity = f64::from(record.capacity);
        let is_dub_cap = nominal_capacity
            .map(|nominal| nominal > 0.0 && capacity >= nominal * dub_cap_multiplier)
            .unwrap_or(false);
        let launched = record.start_timestamp;
        let is_bugged_cap = launched > BUGGED_CAPACITY_AFTER && launched < BUGGED_CAPACITY_BEFORE;

        let drop_details = record
            .drops
            .iter()
            .map(|d| items::display(&d.name, d.level, d.rarity))
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            id: record.identifier.clone(),
            ship: record.ship.name().to_string(),
            duration_type: record.duration_type.display().to_string(),
            level: record.level,
            launched_at: format_unix_seconds(launched),
            returned_at: format_unix_seconds(record.return_timestamp()),
            duration: duration_string(record.duration_seconds),
            capacity: record.capacity,
            nominal_capacity,
            is_dub_cap,
            is_bugged_cap,
            target: record
                .target
                .as_deref()
                .map(items::cased_name)
                .unwrap_or_default(),
            drop_count: record.drops.len(),
            drop_details,
            launched_timestamp: launched,
        }
    }

    pub fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.id.clone()),
            Cell::Text(self.ship.clone()),
            Cell::Text(self.duration_type.clone()),
            Cell::Number(f64::from(self.level)),
            Cell::Text(self.launched_at.clone()),
            Cell::Text(self.returned_at.clone()),
            Cell::Text(self.duration.clone()),
            Cell::Number(f64::from(self.capacity)),
            self.nominal_capacity.map(Cell::Number).unwrap_or(Cell::Empty),
            Cell::Bool(self.is_dub_cap),
            Cell::Bool(self.is_bugged_cap),
            Cell::Text(self.target.clone()),
            Cell::Number(self.drop_count as f64),
            Cell::Text(self.drop_details.clone()),
        ]
    }
}

/// Flatten every record, ordered by launch time. Ties keep store order.
pub fn build_rows(
    records: &[MissionRecord],
    reference: &ReferenceData,
    dub_cap_multiplier: f64,
) -> Vec<MissionRow> {
    let mut rows: Vec<MissionRow> = records
        .iter()
        .map(|r| MissionRow::from_record(r, reference, dub_cap_multiplier))
        .collect();
    rows.sort_by(|a, b| a.launched_timestamp.total_cmp(&b.launched_timestamp));
    rows
}
