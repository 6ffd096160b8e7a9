use serde::Serialize;

/// Role names and hex colors indexed by order of magnitude (0..=51).
const ROLES: [(&str, &str); 52] = [
    ("Farmer", "d43500"),
    ("Farmer II", "d14400"),
    ("Farmer III", "cd5500"),
    ("Kilofarmer", "ca6800"),
    ("Kilofarmer II", "c77a00"),
    ("Kilofarmer III", "c58a00"),
    ("Megafarmer", "c49400"),
    ("Megafarmer II", "c39f00"),
    ("Megafarmer III", "c3a900"),
    ("Gigafarmer", "c2b100"),
    ("Gigafarmer II", "c2ba00"),
    ("Gigafarmer III", "c2c200"),
    ("Terafarmer", "aec300"),
    ("Terafarmer II", "99c400"),
    ("Terafarmer III", "85c600"),
    ("Petafarmer", "51ce00"),
    ("Petafarmer II", "16dc00"),
    ("Petafarmer III", "00ec2e"),
    ("Exafarmer", "00fa68"),
    ("Exafarmer II", "0afc9c"),
    ("Exafarmer III", "1cf7ca"),
    ("Zettafarmer", "2af3eb"),
    ("Zettafarmer II", "35d9f0"),
    ("Zettafarmer III", "40bced"),
    ("Yottafarmer", "46a8eb"),
    ("Yottafarmer II", "4a9aea"),
    ("Yottafarmer III", "4e8dea"),
    ("Xennafarmer", "527ce9"),
    ("Xennafarmer II", "5463e8"),
    ("Xennafarmer III", "6155e8"),
    ("Weccafarmer", "7952e9"),
    ("Weccafarmer II", "8b4fe9"),
    ("Weccafarmer III", "9d4aeb"),
    ("Vendafarmer", "b343ec"),
    ("Vendafarmer II", "d636ef"),
    ("Vendafarmer III", "f327e5"),
    ("Uadafarmer", "f915ba"),
    ("Uadafarmer II", "fc0a9c"),
    ("Uadafarmer III", "ff007d"),
    ("Treidafarmer", "f7005d"),
    ("Treidafarmer II", "f61fd2"),
    ("Treidafarmer III", "9c4aea"),
    ("Quadafarmer", "5559e8"),
    ("Quadafarmer II", "4a9deb"),
    ("Quadafarmer III", "2df0f2"),
    ("Pendafarmer", "00f759"),
    ("Pendafarmer II", "7ec700"),
    ("Pendafarmer III", "c2bf00"),
    ("Exedafarmer", "c3a000"),
    ("Exedafarmer II", "c87200"),
    ("Exedafarmer III", "d43500"),
    ("Infinifarmer", "546e7a"),
];

const SUFFIXES: [&str; 21] = [
    "", "K", "M", "B", "T", "q", "Q", "s", "S", "o", "N", "d", "U", "D", "Td", "qd", "Qd", "sd",
    "Sd", "od", "Nd",
];

/// Maximum number of divisions by 1000 before the staircase saturates.
const MAX_DIVISIONS: usize = 17;

/// Presentational tier derived from a large magnitude.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rank {
    pub name: &'static str,
    pub color: &'static str,
    /// Value scaled to at most three significant digits with its suffix, e.g. `1.23K`.
    pub display: String,
}

fn suffix(divisions: usize) -> &'static str {
    SUFFIXES.get(divisions).copied().unwrap_or("!")
}

/// Map a magnitude onto the role staircase: divide by 1000 while the value
/// is at least 1000 (at most 17 times), choose 2/1/0 decimals for values
/// below 10/100/1000, and pick the role at `3 * divisions - decimals`.
pub fn derive_rank(magnitude: f64) -> Rank {
    let mut scaled = if magnitude.is_finite() && magnitude > 0.0 {
        magnitude
    } else {
        0.0
    };
    let mut divisions = 0usize;
    while scaled >= 1e3 && divisions < MAX_DIVISIONS {
        scaled /= 1e3;
        divisions += 1;
    }

    let precision = if scaled < 10.0 {
        2
    } else if scaled < 100.0 {
        1
    } else {
        0
    };

    let index = (divisions * 3)
        .saturating_sub(precision)
        .min(ROLES.len() - 1);
    let (name, color) = ROLES[index];

    Rank {
        name,
        color,
        display: format!("{scaled:.precision$}{}", suffix(divisions)),
    }
}

/// Earnings bonus from soul eggs, eggs of prophecy and the two epic research levels.
pub fn earnings_bonus(
    soul_eggs: f64,
    eggs_of_prophecy: u64,
    soul_egg_research_level: u32,
    prophecy_research_level: u32,
) -> f64 {
    let soul_egg_bonus = f64::from(soul_egg_research_level) + 10.0;
    let prophecy_bonus = (f64::from(prophecy_research_level) + 5.0) / 100.0 + 1.0;
    soul_eggs * soul_egg_bonus * prophecy_bonus.powf(eggs_of_prophecy as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_values_are_farmer() {
        let rank = derive_rank(5.0);
        assert_eq!(rank.name, "Farmer");
        assert_eq!(rank.color, "d43500");
        assert_eq!(rank.display, "5.00");

        assert_eq!(derive_rank(0.0).name, "Farmer");
        assert_eq!(derive_rank(f64::NAN).display, "0.00");
    }

    #[test]
    fn test_staircase_within_a_magnitude() {
        assert_eq!(derive_rank(1_234.0).name, "Farmer II");
        assert_eq!(derive_rank(1_234.0).display, "1.23K");
        assert_eq!(derive_rank(12_345.0).name, "Farmer III");
        assert_eq!(derive_rank(12_345.0).display, "12.3K");
        assert_eq!(derive_rank(123_456.0).name, "Kilofarmer");
        assert_eq!(derive_rank(123_456.0).display, "123K");
    }

    #[test]
    fn test_megafarmer() {
        let rank = derive_rank(1.5e8);
        assert_eq!(rank.name, "Megafarmer");
        assert_eq!(rank.display, "150M");
    }

    #[test]
    fn test_saturates_at_infinifarmer() {
        let rank = derive_rank(1e60);
        assert_eq!(rank.name, "Infinifarmer");
        assert!(rank.display.ends_with("sd"));
    }

    #[test]
    fn test_monotone() {
        let mut last = 0;
        let mut value = 1.0;
        for _ in 0..60 {
            let name = derive_rank(value).name;
            let index = ROLES.iter().position(|(n, _)| *n == name).unwrap();
            assert!(index >= last, "rank went down at {value}");
            last = index;
            value *= 10.0;
        }
    }

    #[test]
    fn test_earnings_bonus() {
        assert_eq!(earnings_bonus(1e6, 0, 140, 0), 1.5e8);
        let with_prophecy = earnings_bonus(100.0, 2, 0, 0);
        assert!((with_prophecy - 100.0 * 10.0 * 1.05 * 1.05).abs() < 1e-9);
        let maxed = earnings_bonus(100.0, 1, 0, 5);
        assert!((maxed - 100.0 * 10.0 * 1.10).abs() < 1e-9);
    }
}
