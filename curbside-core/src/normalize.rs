//! Canonical street keys.
//!
//! Every lookup and deduplication in curbside goes through [`StreetNormalizer::normalize`],
//! so two spellings of one street ("Boston Rd.", "boston road") must map to the same key.

use std::collections::HashMap;
use std::sync::LazyLock;

use tracing::warn;

/// Street-suffix abbreviations expanded on the last token only.
pub const DEFAULT_SUFFIXES: &[(&str, &str)] = &[
    ("rd", "road"),
    ("st", "street"),
    ("ave", "avenue"),
    ("av", "avenue"),
    ("blvd", "boulevard"),
    ("dr", "drive"),
    ("ln", "lane"),
    ("ct", "court"),
    ("cir", "circle"),
    ("hwy", "highway"),
    ("pkwy", "parkway"),
    ("pl", "place"),
    ("ter", "terrace"),
    ("trl", "trail"),
    ("wy", "way"),
    ("way", "way"),
];

/// Directional abbreviations expanded wherever they appear.
pub const DEFAULT_DIRECTIONALS: &[(&str, &str)] = &[
    ("n", "north"),
    ("s", "south"),
    ("e", "east"),
    ("w", "west"),
    ("ne", "northeast"),
    ("nw", "northwest"),
    ("se", "southeast"),
    ("sw", "southwest"),
];

static DEFAULT_NORMALIZER: LazyLock<StreetNormalizer> = LazyLock::new(StreetNormalizer::default);

/// Normalize with the default tables.
#[must_use]
pub fn normalize_street_name(raw: &str) -> String {
    DEFAULT_NORMALIZER.normalize(raw)
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Street-name canonicalizer with replaceable abbreviation tables.
pub struct StreetNormalizer {
    suffixes: HashMap<String, String>,
    directionals: HashMap<String, String>,
}

impl Default for StreetNormalizer {
    fn default() -> Self {
        Self {
            suffixes: owned_table(DEFAULT_SUFFIXES),
            directionals: owned_table(DEFAULT_DIRECTIONALS),
        }
    }
}

impl StreetNormalizer {
    /// Build a normalizer. `None` keeps the corresponding default table.
    ///
    /// Both sides of every entry are cleaned like street text. Entries that could never
    /// match (empty or multi-word keys) and expansions that a second pass would expand
    /// again are dropped with a warning, so normalizing stays idempotent.
    #[must_use]
    pub fn new(
        suffixes: Option<HashMap<String, String>>,
        directionals: Option<HashMap<String, String>>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            suffixes: suffixes.map_or(defaults.suffixes, canonical_table),
            directionals: directionals.map_or(defaults.directionals, canonical_table),
        }
        .without_reexpanding_entries()
    }

    /// Turn free text into the canonical street key. Empty or punctuation-only input gives `""`.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> String {
        let cleaned = clean(raw);
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        let last = tokens.len().saturating_sub(1);

        tokens
            .iter()
            .enumerate()
            .map(|(position, token)| {
                if let Some(expanded) = self.directionals.get(*token) {
                    return expanded.as_str();
                }
                if position == last
                    && let Some(expanded) = self.suffixes.get(*token)
                {
                    return expanded.as_str();
                }
                *token
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Keep only entries whose expansion is a fixed point of both tables.
    fn without_reexpanding_entries(mut self) -> Self {
        let suffixes = self.suffixes.clone();
        let directionals = self.directionals.clone();
        let settled = |long: &str| {
            let tokens: Vec<&str> = long.split(' ').collect();
            tokens.iter().all(|token| {
                directionals
                    .get(*token)
                    .is_none_or(|again| again == token)
            }) && tokens
                .last()
                .is_none_or(|token| suffixes.get(*token).is_none_or(|again| again == token))
        };
        self.suffixes.retain(|short, long| {
            let keep = settled(long);
            if !keep {
                warn!(%short, %long, "dropping suffix expansion that expands again");
            }
            keep
        });
        self.directionals.retain(|short, long| {
            let keep = settled(long);
            if !keep {
                warn!(%short, %long, "dropping directional expansion that expands again");
            }
            keep
        });
        self
    }
}

fn owned_table(table: &[(&str, &str)]) -> HashMap<String, String> {
    table
        .iter()
        .map(|&(short, long)| (short.to_owned(), long.to_owned()))
        .collect()
}

/// Lowercase ASCII alphanumerics, everything else a single space, trimmed.
fn clean(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn canonical_table(table: HashMap<String, String>) -> HashMap<String, String> {
    table
        .into_iter()
        .filter_map(|(short, long)| {
            let key = clean(&short);
            let value = clean(&long);
            if key.is_empty() || key.contains(' ') || value.is_empty() {
                warn!(%short, %long, "ignoring abbreviation that cannot match");
                return None;
            }
            Some((key, value))
        })
        .collect()
}
