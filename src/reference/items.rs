use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn code(self) -> &'static str {
        match self {
            Rarity::Common => "COMMON",
            Rarity::Rare => "RARE",
            Rarity::Epic => "EPIC",
            Rarity::Legendary => "LEGENDARY",
        }
    }

    pub fn from_code(code: &str) -> Option<Rarity> {
        [Rarity::Common, Rarity::Rare, Rarity::Epic, Rarity::Legendary]
            .into_iter()
            .find(|r| r.code() == code)
    }

    pub fn display(self) -> &'static str {
        match self {
            Rarity::Common => "Common",
            Rarity::Rare => "Rare",
            Rarity::Epic => "Epic",
            Rarity::Legendary => "Legendary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemFamily {
    Artifact,
    Stone,
    StoneFragment,
    Ingredient,
}

const INGREDIENTS: [&str; 3] = ["GOLD_METEORITE", "SOLAR_TITANIUM", "TAU_CETI_GEODE"];

/// Classify an item by its identifier, e.g. `SOUL_STONE_FRAGMENT`.
pub fn family(name: &str) -> ItemFamily {
    if name.contains("_FRAGMENT") {
        ItemFamily::StoneFragment
    } else if name.contains("_STONE") {
        ItemFamily::Stone
    } else if INGREDIENTS.contains(&name) {
        ItemFamily::Ingredient
    } else {
        ItemFamily::Artifact
    }
}

/// In-game tier number for a drop at the given zero-based level.
pub fn tier_number(name: &str, level: u32) -> u32 {
    match family(name) {
        ItemFamily::Artifact | ItemFamily::Ingredient => level + 1,
        // Fragments are T1, so stones start at T2.
        ItemFamily::Stone => level + 2,
        ItemFamily::StoneFragment => 1,
    }
}

/// Human-readable name, e.g. `BOOK_OF_BASAN` -> `Book of Basan`.
pub fn cased_name(name: &str) -> String {
    let spaced = match name {
        "VIAL_MARTIAN_DUST" => "vial of martian dust".to_string(),
        "ORNATE_GUSSET" => "gusset".to_string(),
        "MERCURYS_LENS" => "mercury's lens".to_string(),
        other => other.replace('_', " ").to_lowercase(),
    };
    let mut cased = String::with_capacity(spaced.len());
    let mut chars = spaced.chars();
    if let Some(first) = chars.next() {
        cased.extend(first.to_uppercase());
        cased.push_str(chars.as_str());
    }
    for (word, proper) in [
        ("demeters", "Demeters"),
        ("midas", "Midas"),
        ("eggendil", "Eggendil"),
        ("martian", "Martian"),
        ("basan", "Basan"),
        ("aurelian", "Aurelian"),
        ("mercury", "Mercury"),
        ("tau ceti", "Tau Ceti"),
        ("Tau ceti", "Tau Ceti"),
    ] {
        cased = cased.replace(word, proper);
    }
    cased
}

/// `Name (T3)` with the rarity appended when above common.
pub fn display(name: &str, level: u32, rarity: Rarity) -> String {
    let mut s = format!("{} (T{})", cased_name(name), tier_number(name, level));
    if rarity != Rarity::Common {
        s.push_str(", ");
        s.push_str(rarity.display());
    }
    s
}
