//! Coordinate and direction extraction from transcripts

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// World map bounds, inclusive
const MAX_COORD: u16 = 7000;

static SEPARATOR_WORDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(to|at|into|through)\b").expect("valid regex"));
static PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-,]+").expect("valid regex"));
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));
static PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{3,4})\s+(\d{3,4})\b").expect("valid regex"));
static DIRECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(north(?:east|west)?|south(?:east|west)?|east|west)\b").expect("valid regex")
});

/// A validated map coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coords {
    x: u16,
    y: u16,
}

impl Coords {
    /// Build a coordinate pair, rejecting anything outside the map bounds
    #[must_use]
    pub fn new(x: u16, y: u16) -> Option<Self> {
        (x <= MAX_COORD && y <= MAX_COORD).then_some(Self { x, y })
    }

    #[must_use]
    pub const fn x(&self) -> u16 {
        self.x
    }

    #[must_use]
    pub const fn y(&self) -> u16 {
        self.y
    }

    /// Parse a "x y" string as produced by LLM extraction
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let x = parts.next()?.parse().ok()?;
        let y = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Self::new(x, y)
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.x, self.y)
    }
}

/// Extract a coordinate pair from free text.
///
/// Normalizes common spoken separators ("3200 to 2100", "3200-2100",
/// "3200, 2100") before looking for two 3- or 4-digit numbers. Pairs outside
/// the map bounds are rejected.
#[must_use]
pub fn extract_coords(text: &str) -> Option<Coords> {
    let lowered = text.to_lowercase();
    let cleaned = SEPARATOR_WORDS_RE.replace_all(&lowered, " ");
    let cleaned = PUNCT_RE.replace_all(&cleaned, " ");
    let cleaned = SPACES_RE.replace_all(cleaned.trim(), " ");

    let captures = PAIR_RE.captures(&cleaned)?;
    let x = captures[1].parse().ok()?;
    let y = captures[2].parse().ok()?;
    Coords::new(x, y)
}

/// Extract a compass direction if one is mentioned
#[must_use]
pub fn extract_direction(text: &str) -> Option<String> {
    DIRECTION_RE
        .find(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_pair() {
        let coords = extract_coords("we are at 3200 2100").unwrap();
        assert_eq!(coords.to_string(), "3200 2100");
    }

    #[test]
    fn normalizes_separators() {
        assert!(extract_coords("moving to 3200, 2100 now").is_some());
        assert!(extract_coords("3200-2100").is_some());
        assert!(extract_coords("going through 980 760").is_some());
    }

    #[test]
    fn rejects_out_of_bounds_and_garbage() {
        assert!(extract_coords("meet me at 9999 9999").is_none());
        assert!(extract_coords("12 34").is_none());
        assert!(extract_coords("no numbers here").is_none());
        assert!(Coords::new(7001, 100).is_none());
    }

    #[test]
    fn parses_llm_output() {
        assert_eq!(Coords::parse("3400 2500").map(|c| c.x()), Some(3400));
        assert!(Coords::parse("3400").is_none());
        assert!(Coords::parse("3400 2500 100").is_none());
    }

    #[test]
    fn direction_words() {
        assert_eq!(extract_direction("heading NorthEast fast"), Some("northeast".into()));
        assert_eq!(extract_direction("going west"), Some("west".into()));
        assert_eq!(extract_direction("standing still"), None);
    }
}
