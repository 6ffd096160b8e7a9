//! Read-only game reference data: ship and duration classes, the nominal
//! capacity table derived from the mission-parameters document, rank
//! derivation and item display helpers.

pub mod items;
pub mod rank;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const BUNDLED_MISSION_PARAMETERS: &str = include_str!("../../data/mission-parameters.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ship {
    ChickenOne,
    ChickenNine,
    ChickenHeavy,
    Bcr,
    MilleniumChicken,
    CorellihenCorvette,
    Galeggtica,
    Chickfiant,
    Voyegger,
    Henerprise,
    Atreggies,
}

impl Ship {
    pub const ALL: [Ship; 11] = [
        Ship::ChickenOne,
        Ship::ChickenNine,
        Ship::ChickenHeavy,
        Ship::Bcr,
        Ship::MilleniumChicken,
        Ship::CorellihenCorvette,
        Ship::Galeggtica,
        Ship::Chickfiant,
        Ship::Voyegger,
        Ship::Henerprise,
        Ship::Atreggies,
    ];

    /// Stable code used on the wire and in the database.
    pub fn code(self) -> &'static str {
        match self {
            Ship::ChickenOne => "CHICKEN_ONE",
            Ship::ChickenNine => "CHICKEN_NINE",
            Ship::ChickenHeavy => "CHICKEN_HEAVY",
            Ship::Bcr => "BCR",
            Ship::MilleniumChicken => "MILLENIUM_CHICKEN",
            Ship::CorellihenCorvette => "CORELLIHEN_CORVETTE",
            Ship::Galeggtica => "GALEGGTICA",
            Ship::Chickfiant => "CHICKFIANT",
            Ship::Voyegger => "VOYEGGER",
            Ship::Henerprise => "HENERPRISE",
            Ship::Atreggies => "ATREGGIES",
        }
    }

    pub fn from_code(code: &str) -> Option<Ship> {
        Ship::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Display name as shown in game.
    pub fn name(self) -> &'static str {
        match self {
            Ship::ChickenOne => "Chicken One",
            Ship::ChickenNine => "Chicken Nine",
            Ship::ChickenHeavy => "Chicken Heavy",
            Ship::Bcr => "BCR",
            Ship::MilleniumChicken => "Quintillion Chicken",
            Ship::CorellihenCorvette => "Cornish-Hen Corvette",
            Ship::Galeggtica => "Galeggtica",
            Ship::Chickfiant => "Defihent",
            Ship::Voyegger => "Voyegger",
            Ship::Henerprise => "Henerprise",
            Ship::Atreggies => "Atreggies Henliner",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DurationType {
    Short,
    Long,
    Epic,
    Tutorial,
}

impl DurationType {
    pub const ALL: [DurationType; 4] = [
        DurationType::Short,
        DurationType::Long,
        DurationType::Epic,
        DurationType::Tutorial,
    ];

    pub fn code(self) -> &'static str {
        match self {
            DurationType::Short => "SHORT",
            DurationType::Long => "LONG",
            DurationType::Epic => "EPIC",
            DurationType::Tutorial => "TUTORIAL",
        }
    }

    pub fn from_code(code: &str) -> Option<DurationType> {
        DurationType::ALL.into_iter().find(|d| d.code() == code)
    }

    pub fn display(self) -> &'static str {
        match self {
            DurationType::Short => "Short",
            DurationType::Long => "Standard",
            DurationType::Epic => "Extended",
            DurationType::Tutorial => "Tutorial",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MissionParametersDocument {
    mission_parameters: Vec<ShipParameters>,
}

/// Per-ship entry of the mission-parameters document.
#[derive(Debug, Clone, Deserialize)]
pub struct ShipParameters {
    pub ship: Ship,
    #[serde(default)]
    pub level_mission_requirements: Vec<u32>,
    pub durations: Vec<DurationParameters>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DurationParameters {
    pub duration_type: DurationType,
    pub seconds: f64,
    pub capacity: u32,
    #[serde(default)]
    pub level_capacity_bump: u32,
}

/// Static lookup tables, immutable after load.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    ships: Vec<ShipParameters>,
    nominal_capacities: HashMap<(Ship, DurationType), Vec<f64>>,
}

impl ReferenceData {
    /// The mission-parameters document shipped with the binary.
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_MISSION_PARAMETERS)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::ReferenceData(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: MissionParametersDocument = serde_json::from_str(raw)
            .map_err(|e| Error::ReferenceData(format!("invalid mission parameters: {e}")))?;
        Ok(Self::from_parameters(doc.mission_parameters))
    }

    /// Builds the nominal capacity table: `capacity + bump * level` for
    /// every level from 0 through the number of level requirements.
    pub fn from_parameters(ships: Vec<ShipParameters>) -> Self {
        let mut nominal_capacities = HashMap::new();
        for params in &ships {
            let levels = params.level_mission_requirements.len();
            for duration in &params.durations {
                let base = f64::from(duration.capacity);
                let capacities = if levels == 0 {
                    vec![base]
                } else {
                    (0..=levels)
                        .map(|level| base + f64::from(duration.level_capacity_bump) * level as f64)
                        .collect()
                };
                nominal_capacities.insert((params.ship, duration.duration_type), capacities);
            }
        }
        Self {
            ships,
            nominal_capacities,
        }
    }

    pub fn ships(&self) -> &[ShipParameters] {
        &self.ships
    }

    /// Nominal capacity for a ship/duration/level, `None` when the table has no entry.
    pub fn nominal_capacity(&self, ship: Ship, duration: DurationType, level: u32) -> Option<f64> {
        self.nominal_capacities
            .get(&(ship, duration))
            .and_then(|caps| caps.get(level as usize))
            .copied()
    }

    pub fn max_level(&self, ship: Ship) -> Option<u32> {
        self.ships
            .iter()
            .find(|p| p.ship == ship)
            .map(|p| p.level_mission_requirements.len() as u32)
    }
}
