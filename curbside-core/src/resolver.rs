//! Street + house number to collection route.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{Database, RouteEntry};
use crate::normalize::{StreetNormalizer, normalize_street_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Knobs for the "did you mean" suggestions.
pub struct ResolverSettings {
    /// Maximum number of suggestions returned.
    pub suggestion_limit: usize,
    /// Minimum similarity on a 0-100 scale.
    pub fuzzy_threshold: u8,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            suggestion_limit: 10,
            fuzzy_threshold: 85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Why a street could not be resolved.
pub enum ResolveErrorKind {
    /// Street text normalizes to nothing.
    InvalidInput,
    /// No route exists for the street.
    NotFound,
    /// Street is split by house number and none was given.
    AmbiguousRequiresNumber,
    /// The given house number fits no part of the street.
    NoMatch,
}

impl fmt::Display for ResolveErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolveErrorKind::InvalidInput => "invalid input",
            ResolveErrorKind::NotFound => "not found",
            ResolveErrorKind::AmbiguousRequiresNumber => "requires number",
            ResolveErrorKind::NoMatch => "no match",
        };
        write!(formatter, "{label}")
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
/// Structured resolution failure.
pub struct ResolveError {
    /// Failure category.
    pub kind: ResolveErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Similar street names, best first. Only filled for [`ResolveErrorKind::NotFound`].
    pub suggestions: Vec<String>,
}

impl ResolveError {
    fn new(kind: ResolveErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_owned(),
            suggestions: Vec::new(),
        }
    }

    /// Whether supplying a house number could resolve the street.
    #[must_use]
    pub fn requires_number(&self) -> bool {
        self.kind == ResolveErrorKind::AmbiguousRequiresNumber
    }
}

/// Resolve with the default normalizer tables.
///
/// # Errors
///
/// Returns a [`ResolveError`] describing why no single route applies.
pub fn resolve<'db>(
    db: &'db Database,
    street: &str,
    number: Option<u32>,
    settings: ResolverSettings,
) -> Result<&'db RouteEntry, ResolveError> {
    let canonical = normalize_street_name(street);
    resolve_key(db, street, &canonical, number, settings)
}

/// Resolve using a town-specific normalizer.
///
/// The normalizer must be the one the database was built with.
///
/// # Errors
///
/// Returns a [`ResolveError`] describing why no single route applies.
pub fn resolve_with<'db>(
    normalizer: &StreetNormalizer,
    db: &'db Database,
    street: &str,
    number: Option<u32>,
    settings: ResolverSettings,
) -> Result<&'db RouteEntry, ResolveError> {
    let canonical = normalizer.normalize(street);
    resolve_key(db, street, &canonical, number, settings)
}

fn resolve_key<'db>(
    db: &'db Database,
    street: &str,
    normalized: &str,
    number: Option<u32>,
    settings: ResolverSettings,
) -> Result<&'db RouteEntry, ResolveError> {
    if normalized.is_empty() {
        return Err(ResolveError::new(
            ResolveErrorKind::InvalidInput,
            "Invalid street",
        ));
    }

    // One hop only: an alias pointing at another alias is not followed.
    let canonical = db
        .aliases
        .get(normalized)
        .map_or(normalized, String::as_str);

    let candidates = candidates(db, canonical);
    if candidates.is_empty() {
        let mut error = ResolveError::new(ResolveErrorKind::NotFound, "Street not found");
        error.suggestions = suggest_streets(
            street,
            &db.display_streets(),
            settings.suggestion_limit,
            settings.fuzzy_threshold,
        );
        debug!(street, canonical, suggestions = error.suggestions.len(), "street not found");
        return Err(error);
    }

    if let Some(route) = candidates
        .iter()
        .copied()
        .find(|route| route.matches_number(number))
    {
        debug!(street, canonical, ?number, "route resolved");
        return Ok(route);
    }

    if number.is_none() {
        // Only reachable when some candidate has constraints; unconstrained ones match above.
        return Err(ResolveError::new(
            ResolveErrorKind::AmbiguousRequiresNumber,
            "Street requires a house number for disambiguation",
        ));
    }

    Err(ResolveError::new(
        ResolveErrorKind::NoMatch,
        "No matching route for house number",
    ))
}

/// Routes whose canonical street equals `canonical`, in database order.
fn candidates<'db>(db: &'db Database, canonical: &str) -> Vec<&'db RouteEntry> {
    if let Some(positions) = db
        .street_index
        .as_ref()
        .and_then(|index| index.get(canonical))
    {
        return positions
            .iter()
            .filter_map(|&position| {
                let route = db.routes.get(position);
                if route.is_none() {
                    warn!(position, canonical, "street index points past the route list");
                }
                route
            })
            .collect();
    }

    db.routes
        .iter()
        .filter(|route| route.street_normalized == canonical)
        .collect()
}

/// Rank `streets` by similarity to `query`, keeping at most `limit` scoring at least `threshold`.
///
/// Scores are Jaro-Winkler similarity scaled to 0-100. Equal scores keep the order of `streets`.
#[must_use]
pub fn suggest_streets(query: &str, streets: &[&str], limit: usize, threshold: u8) -> Vec<String> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(f64, &str)> = streets
        .iter()
        .map(|&street| {
            let score = strsim::jaro_winkler(&needle, &street.trim().to_lowercase()) * 100.0;
            (score, street)
        })
        .filter(|&(score, _)| score >= f64::from(threshold))
        .collect();

    // Stable sort keeps input order among ties.
    scored.sort_by(|left, right| right.0.total_cmp(&left.0));

    scored
        .into_iter()
        .take(limit)
        .map(|(_, street)| street.to_owned())
        .collect()
}
