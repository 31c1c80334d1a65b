//! Per-town configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::model::{RecyclingColor, RecyclingMode, TownId, TownMeta};
use crate::normalize::StreetNormalizer;
use crate::resolver::ResolverSettings;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Invalid town configuration.
pub enum ConfigError {
    /// A required text field is blank.
    #[error("{0} must be non-empty")]
    Empty(&'static str),
    /// The timezone is not an IANA name.
    #[error("Unknown timezone: {0}")]
    Timezone(String),
    /// A numeric setting is outside its allowed range.
    #[error("{field} {reason}")]
    OutOfRange {
        /// Setting name.
        field: &'static str,
        /// Allowed range.
        reason: &'static str,
    },
    /// Only one of the two recycling anchor fields is set.
    #[error("anchor_week_sunday and anchor_color must both be provided if one is set")]
    PartialAnchor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Everything curbside needs to know about one town.
pub struct TownConfig {
    /// Stable identifier, used in paths and snapshot metadata.
    pub town_id: String,
    /// Display name.
    pub town_name: String,
    /// IANA timezone that decides what "today" is.
    pub timezone: String,
    /// Schedule window defaults.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Recycling and holiday rules that win over parsed data.
    pub rules: RulesConfig,
    /// Override files, relative to the town directory.
    #[serde(default)]
    pub overrides_paths: OverridesPaths,
    /// Suggestion settings.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Snapshot reload settings.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Replacement abbreviation tables.
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    /// Database snapshot location, relative to the town directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Default and maximum schedule lengths.
pub struct ScheduleConfig {
    /// Days generated when a request names none.
    #[serde(default = "default_days")]
    pub default_days_ahead: u32,
    /// Upper bound for requested days.
    #[serde(default = "default_days")]
    pub max_days_ahead: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_days_ahead: default_days(),
            max_days_ahead: default_days(),
        }
    }
}

fn default_days() -> u32 {
    365
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Rule blocks.
pub struct RulesConfig {
    /// Recycling calendar.
    pub recycling: RecyclingRules,
    /// Holiday handling.
    #[serde(default)]
    pub holidays: HolidayRules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Recycling calendar rules.
pub struct RecyclingRules {
    /// Scheduling mode.
    pub mode: RecyclingMode,
    /// Anchor Sunday; falls back to the parsed schedule when unset.
    #[serde(default)]
    pub anchor_week_sunday: Option<NaiveDate>,
    /// Anchor color; falls back to the parsed schedule when unset.
    #[serde(default)]
    pub anchor_color: Option<RecyclingColor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Holiday rules. Empty lists fall back to the parsed schedule.
pub struct HolidayRules {
    /// Dates without pickup.
    #[serde(default)]
    pub no_collection_dates: Vec<NaiveDate>,
    /// Holidays shifting the rest of their week.
    #[serde(default)]
    pub shift_holidays: Vec<NaiveDate>,
    /// Sundays of delayed weeks.
    #[serde(default)]
    pub delay_anchor_week_sundays: Vec<NaiveDate>,
    /// Global switch for holiday shifting.
    #[serde(default = "default_true")]
    pub shift_by_one_day: bool,
}

impl Default for HolidayRules {
    fn default() -> Self {
        Self {
            no_collection_dates: Vec::new(),
            shift_holidays: Vec::new(),
            delay_anchor_week_sundays: Vec::new(),
            shift_by_one_day: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Override file locations.
pub struct OverridesPaths {
    /// Street alias map.
    #[serde(default)]
    pub street_aliases_yaml: Option<PathBuf>,
    /// Holiday date replacements.
    #[serde(default, alias = "holiday_rules_yaml")]
    pub holiday_overrides_yaml: Option<PathBuf>,
    /// Route delete/patch/add edits.
    #[serde(default)]
    pub route_overrides_yaml: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Suggestion settings as written in the config file.
pub struct ResolverConfig {
    /// Maximum suggestions, greater than zero.
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
    /// Minimum similarity, 0 to 100.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: u8,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            suggestion_limit: default_suggestion_limit(),
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

fn default_suggestion_limit() -> usize {
    10
}

fn default_fuzzy_threshold() -> u8 {
    85
}

impl From<ResolverConfig> for ResolverSettings {
    fn from(config: ResolverConfig) -> Self {
        Self {
            suggestion_limit: config.suggestion_limit,
            fuzzy_threshold: config.fuzzy_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Snapshot reload settings.
pub struct ServiceConfig {
    /// Minimum seconds between modification checks, at least one.
    #[serde(default = "default_reload_interval")]
    pub reload_interval_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            reload_interval_seconds: default_reload_interval(),
        }
    }
}

fn default_reload_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Abbreviation tables replacing the built-in ones.
pub struct NormalizerConfig {
    /// Street suffixes.
    #[serde(default)]
    pub suffixes: Option<HashMap<String, String>>,
    /// Directionals.
    #[serde(default)]
    pub directionals: Option<HashMap<String, String>>,
}

impl NormalizerConfig {
    /// Normalizer using these tables.
    #[must_use]
    pub fn build(&self) -> StreetNormalizer {
        StreetNormalizer::new(self.suffixes.clone(), self.directionals.clone())
    }
}

impl TownConfig {
    /// Check every rule a config file can break.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("town_id", &self.town_id),
            ("town_name", &self.town_name),
            ("timezone", &self.timezone),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(field));
            }
        }
        self.tz()?;

        if self.schedule.default_days_ahead == 0 {
            return Err(ConfigError::OutOfRange {
                field: "default_days_ahead",
                reason: "must be > 0",
            });
        }
        if self.schedule.max_days_ahead == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_days_ahead",
                reason: "must be > 0",
            });
        }
        if self.schedule.default_days_ahead > self.schedule.max_days_ahead {
            return Err(ConfigError::OutOfRange {
                field: "default_days_ahead",
                reason: "cannot exceed max_days_ahead",
            });
        }

        let recycling = &self.rules.recycling;
        if recycling.mode == RecyclingMode::AlternatingWeek
            && recycling.anchor_week_sunday.is_some() != recycling.anchor_color.is_some()
        {
            return Err(ConfigError::PartialAnchor);
        }

        if self.resolver.suggestion_limit == 0 {
            return Err(ConfigError::OutOfRange {
                field: "suggestion_limit",
                reason: "must be > 0",
            });
        }
        if self.resolver.fuzzy_threshold > 100 {
            return Err(ConfigError::OutOfRange {
                field: "fuzzy_threshold",
                reason: "must be between 0 and 100",
            });
        }
        if self.service.reload_interval_seconds == 0 {
            return Err(ConfigError::OutOfRange {
                field: "reload_interval_seconds",
                reason: "must be >= 1",
            });
        }
        Ok(())
    }

    /// The town's timezone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Timezone`] for names unknown to the tz database.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_parse_error| ConfigError::Timezone(self.timezone.clone()))
    }

    /// Identifier and display name.
    #[must_use]
    pub fn meta(&self) -> TownMeta {
        TownMeta {
            id: TownId(self.town_id.clone()),
            name: self.town_name.clone(),
        }
    }

    /// Snapshot path relative to the town directory.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            PathBuf::from("data")
                .join("generated")
                .join(format!("{}.json", self.town_id))
        })
    }
}
