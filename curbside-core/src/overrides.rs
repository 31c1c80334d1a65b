//! Hand-maintained corrections applied on top of parsed route and holiday data.
//!
//! Every override is a pure function from the old records to new ones.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{HolidayPolicy, Parity, RecyclingColor, RouteConstraint, RouteEntry, Weekday};
use crate::normalize::StreetNormalizer;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Route overrides that cannot be applied.
pub enum OverrideError {
    /// A `delete`, `patch` or `add` entry has no usable street.
    #[error("Override entry must include street ({section} #{index})")]
    MissingStreet {
        /// `delete`, `patch` or `add`.
        section: &'static str,
        /// Position of the entry in its list, from 0.
        index: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
/// Raw alias spelling to raw canonical spelling.
pub struct AliasOverrides(pub BTreeMap<String, String>);

impl AliasOverrides {
    /// Add these aliases, normalizing both sides. Existing aliases with the same key are replaced.
    #[must_use]
    pub fn apply(
        &self,
        mut aliases: HashMap<String, String>,
        normalizer: &StreetNormalizer,
    ) -> HashMap<String, String> {
        for (raw_alias, raw_target) in &self.0 {
            let alias = normalizer.normalize(raw_alias);
            let target = normalizer.normalize(raw_target);
            info!(alias, target, "alias override");
            aliases.insert(alias, target);
        }
        aliases
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
/// A shift holiday, written either as a bare date or with a name.
pub enum ShiftHoliday {
    /// `2025-05-26`
    Date(NaiveDate),
    /// `{ date: 2025-05-26, name: Memorial Day }`
    Named {
        /// Holiday date.
        date: NaiveDate,
        /// Display name, informational only.
        #[serde(default)]
        name: Option<String>,
    },
}

impl ShiftHoliday {
    /// Holiday date.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        match self {
            ShiftHoliday::Date(date) | ShiftHoliday::Named { date, .. } => *date,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Replacement holiday lists. A present list replaces the policy's list wholesale.
pub struct HolidayOverrides {
    /// New cancellation dates.
    #[serde(default)]
    pub no_collection_dates: Option<Vec<NaiveDate>>,
    /// New shift holidays.
    #[serde(default)]
    pub shift_holidays: Option<Vec<ShiftHoliday>>,
}

impl HolidayOverrides {
    /// Policy with the overridden lists swapped in.
    #[must_use]
    pub fn apply(&self, mut policy: HolidayPolicy) -> HolidayPolicy {
        if let Some(dates) = &self.no_collection_dates {
            policy.no_collection_dates = dates.iter().copied().collect();
            info!(count = dates.len(), "holiday override: replaced no_collection_dates");
        }
        if let Some(holidays) = &self.shift_holidays {
            policy.shift_holidays = holidays.iter().map(ShiftHoliday::date).collect();
            info!(count = holidays.len(), "holiday override: replaced shift_holidays");
        }
        policy
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Selects routes by street and, optionally, by their other fields.
pub struct RouteMatcher {
    /// Street in any spelling; compared after normalization.
    pub street: String,
    /// Only routes on this weekday.
    #[serde(default)]
    pub weekday: Option<Weekday>,
    /// Only routes of this color.
    #[serde(default)]
    pub recycling_color: Option<RecyclingColor>,
    /// Only routes holding a constraint with exactly this parity.
    #[serde(default)]
    pub parity: Option<Parity>,
    /// Only routes holding a constraint with exactly these bounds.
    #[serde(default)]
    pub range: Option<(u32, u32)>,
    /// Only routes with this flag value.
    #[serde(default)]
    pub no_collection: Option<bool>,
}

impl RouteMatcher {
    fn compile(
        &self,
        normalizer: &StreetNormalizer,
        section: &'static str,
        index: usize,
    ) -> Result<CompiledMatcher<'_>, OverrideError> {
        let street_normalized = normalizer.normalize(&self.street);
        if street_normalized.is_empty() {
            return Err(OverrideError::MissingStreet { section, index });
        }
        Ok(CompiledMatcher {
            street_normalized,
            source: self,
        })
    }
}

struct CompiledMatcher<'src> {
    street_normalized: String,
    source: &'src RouteMatcher,
}

impl CompiledMatcher<'_> {
    fn matches(&self, route: &RouteEntry) -> bool {
        let wanted = self.source;
        if route.street_normalized != self.street_normalized {
            return false;
        }
        if wanted.weekday.is_some_and(|day| route.weekday != Some(day)) {
            return false;
        }
        if wanted
            .recycling_color
            .is_some_and(|color| route.recycling_color != Some(color))
        {
            return false;
        }
        if wanted
            .no_collection
            .is_some_and(|flag| route.no_collection != flag)
        {
            return false;
        }
        if wanted.parity.is_none() && wanted.range.is_none() {
            return true;
        }
        route.constraints.iter().any(|constraint| {
            wanted
                .parity
                .is_none_or(|parity| constraint.parity == Some(parity))
                && wanted.range.is_none_or(|(min, max)| {
                    constraint.range_min == Some(min) && constraint.range_max == Some(max)
                })
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Field values written by a patch. Unset fields are left alone.
pub struct RouteChanges {
    /// New weekday.
    #[serde(default)]
    pub weekday: Option<Weekday>,
    /// New color.
    #[serde(default)]
    pub recycling_color: Option<RecyclingColor>,
    /// New flag value.
    #[serde(default)]
    pub no_collection: Option<bool>,
    /// New note.
    #[serde(default)]
    pub notes: Option<String>,
}

impl RouteChanges {
    fn write_to(&self, route: &mut RouteEntry) {
        if let Some(day) = self.weekday {
            route.weekday = Some(day);
        }
        if let Some(color) = self.recycling_color {
            route.recycling_color = Some(color);
        }
        if let Some(flag) = self.no_collection {
            route.no_collection = flag;
        }
        if let Some(notes) = &self.notes {
            route.notes = Some(notes.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Patch every route selected by `matcher`.
pub struct RoutePatch {
    /// Which routes to change.
    #[serde(rename = "match")]
    pub matcher: RouteMatcher,
    /// What to write.
    pub set: RouteChanges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A route missing from the parsed data.
pub struct RouteAddition {
    /// Display street name.
    pub street: String,
    /// Pickup weekday.
    #[serde(default)]
    pub weekday: Option<Weekday>,
    /// Recycling color.
    #[serde(default)]
    pub recycling_color: Option<RecyclingColor>,
    /// No municipal pickup.
    #[serde(default)]
    pub no_collection: bool,
    /// House-number parity the route covers.
    #[serde(default)]
    pub parity: Option<Parity>,
    /// Inclusive house-number bounds the route covers.
    #[serde(default)]
    pub range: Option<(u32, u32)>,
    /// Free-form note.
    #[serde(default)]
    pub notes: Option<String>,
}

impl RouteAddition {
    fn to_route(
        &self,
        normalizer: &StreetNormalizer,
        index: usize,
    ) -> Result<RouteEntry, OverrideError> {
        let street = self.street.trim().to_owned();
        let street_normalized = normalizer.normalize(&street);
        if street_normalized.is_empty() {
            return Err(OverrideError::MissingStreet {
                section: "add",
                index,
            });
        }
        let constraint = RouteConstraint {
            parity: self.parity,
            range_min: self.range.map(|(min, _)| min),
            range_max: self.range.map(|(_, max)| max),
        };
        Ok(RouteEntry {
            street_normalized,
            street,
            weekday: self.weekday,
            recycling_color: self.recycling_color,
            no_collection: self.no_collection,
            constraints: if constraint.is_empty() {
                Vec::new()
            } else {
                vec![constraint]
            },
            notes: self.notes.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Route edits, applied as delete, then patch, then add.
pub struct RouteOverrides {
    /// Routes to drop.
    #[serde(default)]
    pub delete: Vec<RouteMatcher>,
    /// Routes to change in place.
    #[serde(default)]
    pub patch: Vec<RoutePatch>,
    /// Routes appended after all existing ones.
    #[serde(default)]
    pub add: Vec<RouteAddition>,
}

/// Counts of what [`RouteOverrides::apply`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideReport {
    /// Routes removed.
    pub deleted: usize,
    /// Route patches written; a route hit by two patches counts twice.
    pub patched: usize,
    /// Routes appended.
    pub added: usize,
}

impl RouteOverrides {
    /// True when there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.patch.is_empty() && self.add.is_empty()
    }

    /// Fold the edits over `routes` and return the new list.
    ///
    /// Additions go to the end so parsed routes keep first-match precedence in the resolver.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::MissingStreet`] when an entry's street normalizes to nothing.
    pub fn apply(
        &self,
        routes: Vec<RouteEntry>,
        normalizer: &StreetNormalizer,
    ) -> Result<(Vec<RouteEntry>, OverrideReport), OverrideError> {
        let mut report = OverrideReport::default();

        let mut routes = routes;
        for (index, matcher) in self.delete.iter().enumerate() {
            let compiled = matcher.compile(normalizer, "delete", index)?;
            let before = routes.len();
            routes.retain(|route| !compiled.matches(route));
            let removed = before - routes.len();
            report.deleted += removed;
            info!(street = %compiled.street_normalized, removed, "route override delete");
        }

        for (index, patch) in self.patch.iter().enumerate() {
            let compiled = patch.matcher.compile(normalizer, "patch", index)?;
            for route in routes.iter_mut().filter(|route| compiled.matches(route)) {
                patch.set.write_to(route);
                report.patched += 1;
                info!(street = %compiled.street_normalized, "route override patch");
            }
        }

        for (index, addition) in self.add.iter().enumerate() {
            let route = addition.to_route(normalizer, index)?;
            info!(street = %route.street_normalized, "route override add");
            routes.push(route);
            report.added += 1;
        }

        Ok((routes, report))
    }
}

/// Distinct dates, sorted.
#[must_use]
pub fn date_set(dates: &[NaiveDate]) -> BTreeSet<NaiveDate> {
    dates.iter().copied().collect()
}
