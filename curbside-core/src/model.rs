//! Domain data structures for towns, collection routes, policies, and pickup schedules.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Version of the serialized [`Database`] layout.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Identifier for a town known to curbside.
pub struct TownId(pub String);

impl fmt::Display for TownId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Metadata describing a town and its human-friendly name.
pub struct TownMeta {
    /// Unique identifier.
    pub id: TownId,
    /// Display name.
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Collection weekdays. Curbside pickups only run Monday through Friday.
pub enum Weekday {
    /// Monday.
    #[serde(alias = "monday", alias = "MONDAY")]
    Monday,
    /// Tuesday.
    #[serde(alias = "tuesday", alias = "TUESDAY")]
    Tuesday,
    /// Wednesday.
    #[serde(alias = "wednesday", alias = "WEDNESDAY")]
    Wednesday,
    /// Thursday.
    #[serde(alias = "thursday", alias = "THURSDAY")]
    Thursday,
    /// Friday.
    #[serde(alias = "friday", alias = "FRIDAY")]
    Friday,
}

impl Weekday {
    /// All collection weekdays in calendar order.
    pub const ALL: [Weekday; 5] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
    ];

    /// Number of days after the week's Sunday.
    #[must_use]
    pub fn offset_from_sunday(self) -> u64 {
        match self {
            Weekday::Monday => 1,
            Weekday::Tuesday => 2,
            Weekday::Wednesday => 3,
            Weekday::Thursday => 4,
            Weekday::Friday => 5,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
        };
        write!(formatter, "{name}")
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Raised when text does not name a known enum value.
#[error("Unknown {kind}: {value}")]
pub struct UnknownValue {
    /// What was being parsed.
    pub kind: &'static str,
    /// Offending input.
    pub value: String,
}

impl FromStr for Weekday {
    type Err = UnknownValue;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        Weekday::ALL
            .into_iter()
            .find(|day| day.to_string().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownValue {
                kind: "weekday",
                value: raw.to_owned(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
/// Bin colors used by alternating-week recycling.
pub enum RecyclingColor {
    /// Blue week.
    #[serde(alias = "blue", alias = "Blue")]
    Blue,
    /// Green week.
    #[serde(alias = "green", alias = "Green")]
    Green,
}

impl RecyclingColor {
    /// The color of the following week.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            RecyclingColor::Blue => RecyclingColor::Green,
            RecyclingColor::Green => RecyclingColor::Blue,
        }
    }
}

impl fmt::Display for RecyclingColor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecyclingColor::Blue => "BLUE",
            RecyclingColor::Green => "GREEN",
        };
        write!(formatter, "{name}")
    }
}

impl FromStr for RecyclingColor {
    type Err = UnknownValue;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BLUE" => Ok(RecyclingColor::Blue),
            "GREEN" => Ok(RecyclingColor::Green),
            _ => Err(UnknownValue {
                kind: "recycling color",
                value: raw.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// House-number parity.
pub enum Parity {
    /// 1, 3, 5, ...
    Odd,
    /// 0, 2, 4, ...
    Even,
}

impl Parity {
    /// Parity of a house number.
    #[must_use]
    pub fn of(number: u32) -> Self {
        if number % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Parity and/or house-number range narrowing which part of a split street a route covers.
pub struct RouteConstraint {
    /// Required parity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parity: Option<Parity>,
    /// Inclusive lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_min: Option<u32>,
    /// Inclusive upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_max: Option<u32>,
}

impl RouteConstraint {
    /// True when no field is set. Such a constraint never matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parity.is_none() && self.range_min.is_none() && self.range_max.is_none()
    }

    /// Whether `number` satisfies every field set on this constraint.
    #[must_use]
    pub fn is_satisfied_by(&self, number: u32) -> bool {
        if self.is_empty() {
            return false;
        }
        self.parity.is_none_or(|parity| Parity::of(number) == parity)
            && self.range_min.is_none_or(|min| number >= min)
            && self.range_max.is_none_or(|max| number <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One collection route record for a street or a part of it.
pub struct RouteEntry {
    /// Street name as printed by the town.
    pub street: String,
    /// Canonical lookup key produced by the normalizer.
    #[serde(default)]
    pub street_normalized: String,
    /// Pickup weekday; absent for streets without municipal pickup.
    #[serde(default)]
    pub weekday: Option<Weekday>,
    /// Recycling week color.
    #[serde(default)]
    pub recycling_color: Option<RecyclingColor>,
    /// Serviced address without municipal pickup.
    #[serde(default)]
    pub no_collection: bool,
    /// Any one constraint matching selects this route. Empty means unconditional.
    #[serde(default)]
    pub constraints: Vec<RouteConstraint>,
    /// Free-form note from the source document.
    #[serde(default)]
    pub notes: Option<String>,
}

impl RouteEntry {
    /// Whether this route applies to the given house number.
    #[must_use]
    pub fn matches_number(&self, number: Option<u32>) -> bool {
        if self.constraints.is_empty() {
            return true;
        }
        let Some(number) = number else {
            return false;
        };
        self.constraints
            .iter()
            .any(|constraint| constraint.is_satisfied_by(number))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How recycling pickups are scheduled.
pub enum RecyclingMode {
    /// Blue and green weeks alternate, counted from an anchor week.
    AlternatingWeek,
    /// Recycling dates are published explicitly.
    FixedDates,
    /// No recycling pickup.
    #[default]
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Town-wide recycling calendar.
pub struct CalendarPolicy {
    /// Scheduling mode.
    pub recycling_mode: RecyclingMode,
    /// A Sunday starting a week of `anchor_color`.
    #[serde(default)]
    pub anchor_week_sunday: Option<NaiveDate>,
    /// Color collected during the anchor week.
    #[serde(default)]
    pub anchor_color: Option<RecyclingColor>,
}

impl CalendarPolicy {
    /// Alternating-week policy anchored at `sunday`.
    #[must_use]
    pub fn alternating(sunday: NaiveDate, color: RecyclingColor) -> Self {
        Self {
            recycling_mode: RecyclingMode::AlternatingWeek,
            anchor_week_sunday: Some(sunday),
            anchor_color: Some(color),
        }
    }

    /// Both anchor fields, when both are set.
    #[must_use]
    pub fn anchor(&self) -> Option<(NaiveDate, RecyclingColor)> {
        self.anchor_week_sunday.zip(self.anchor_color)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Holiday cancellations and shift rules.
pub struct HolidayPolicy {
    /// Dates without any pickup.
    #[serde(default)]
    pub no_collection_dates: BTreeSet<NaiveDate>,
    /// Holidays that push the rest of their week one day later.
    #[serde(default)]
    pub shift_holidays: BTreeSet<NaiveDate>,
    /// Sundays of weeks whose pickups are delayed.
    #[serde(default)]
    pub delay_anchor_week_sundays: BTreeSet<NaiveDate>,
    /// Global switch for holiday shifting.
    #[serde(default = "default_true")]
    pub shift_by_one_day: bool,
}

impl Default for HolidayPolicy {
    fn default() -> Self {
        Self {
            no_collection_dates: BTreeSet::new(),
            shift_holidays: BTreeSet::new(),
            delay_anchor_week_sundays: BTreeSet::new(),
            shift_by_one_day: true,
        }
    }
}

impl HolidayPolicy {
    /// Every date whose week triggers a one-day shift.
    pub fn shift_triggers(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.shift_holidays
            .iter()
            .chain(&self.delay_anchor_week_sundays)
            .copied()
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Provenance of one downloaded or parsed source document.
pub struct SourceMeta {
    /// Where the document came from.
    pub url: String,
    /// Hex SHA-256 of the document bytes.
    pub sha256: String,
    /// HTTP entity tag, when known.
    #[serde(default)]
    pub etag: Option<String>,
    /// HTTP `Last-Modified`, when known.
    #[serde(default)]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Build information stamped on a database snapshot.
pub struct DatabaseMeta {
    /// Build time.
    pub generated_at: DateTime<Utc>,
    /// Town the snapshot belongs to.
    pub town_id: TownId,
    /// Documents the snapshot was built from, keyed by role.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceMeta>,
    /// Commit of the build pipeline.
    #[serde(default)]
    pub git_commit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Immutable snapshot of a town's routes and policies.
pub struct Database {
    /// Layout version.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Build information.
    #[serde(default)]
    pub meta: Option<DatabaseMeta>,
    /// Recycling calendar.
    #[serde(default)]
    pub calendar_policy: CalendarPolicy,
    /// Holiday rules.
    #[serde(default)]
    pub holiday_policy: HolidayPolicy,
    /// Normalized alias to normalized canonical street.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Routes in tie-break order.
    pub routes: Vec<RouteEntry>,
    /// Canonical street to route indices.
    #[serde(default)]
    pub street_index: Option<HashMap<String, Vec<usize>>>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Database {
    /// Snapshot with only routes and default policies.
    #[must_use]
    pub fn from_routes(routes: Vec<RouteEntry>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            meta: None,
            calendar_policy: CalendarPolicy::default(),
            holiday_policy: HolidayPolicy::default(),
            aliases: HashMap::new(),
            routes,
            street_index: None,
        }
    }

    /// Distinct display street names, sorted.
    #[must_use]
    pub fn display_streets(&self) -> Vec<&str> {
        self.routes
            .iter()
            .map(|route| route.street.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Map each canonical street to the positions of its routes.
#[must_use]
pub fn build_street_index(routes: &[RouteEntry]) -> HashMap<String, Vec<usize>> {
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (position, route) in routes.iter().enumerate() {
        index
            .entry(route.street_normalized.clone())
            .or_default()
            .push(position);
    }
    index
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Kinds of curbside pickup.
pub enum CollectionType {
    /// Household trash.
    Trash,
    /// Recycling.
    Recycling,
}

impl fmt::Display for CollectionType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CollectionType::Trash => "trash",
            CollectionType::Recycling => "recycling",
        };
        write!(formatter, "{label}")
    }
}

impl FromStr for CollectionType {
    type Err = UnknownValue;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trash" => Ok(CollectionType::Trash),
            "recycling" => Ok(CollectionType::Recycling),
            _ => Err(UnknownValue {
                kind: "collection type",
                value: raw.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Pickups happening on one date.
pub struct ScheduleEvent {
    /// Pickup date.
    pub date: NaiveDate,
    /// What is collected. Never empty.
    pub types: BTreeSet<CollectionType>,
}

impl ScheduleEvent {
    /// Whether this date carries the given pickup.
    #[must_use]
    pub fn has(&self, kind: CollectionType) -> bool {
        self.types.contains(&kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Inclusive start/end range for requested schedules.
pub struct DateRange {
    /// Start date (inclusive).
    pub start: NaiveDate,
    /// End date (inclusive).
    pub end: NaiveDate,
}

impl DateRange {
    /// Whether `date` lies within the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
