//! Assembling a [`Database`] snapshot from parsed records, town rules, and overrides.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::TownConfig;
use crate::model::{
    CalendarPolicy, Database, DatabaseMeta, HolidayPolicy, RecyclingMode, RouteEntry,
    SCHEMA_VERSION, SourceMeta, TownId, build_street_index,
};
use crate::normalize::StreetNormalizer;
use crate::overrides::{
    AliasOverrides, HolidayOverrides, OverrideError, RouteOverrides, date_set,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors that can occur while building a snapshot.
pub enum BuildError {
    /// The parsers reported problems with the source documents.
    #[error("Parsing errors:\n{}", bullet_list(.0))]
    Parse(Vec<String>),
    /// Alternating-week recycling without a complete anchor.
    #[error("Missing anchor data for alternating_week recycling mode")]
    MissingAnchor,
    /// A route override could not be applied.
    #[error(transparent)]
    Override(#[from] OverrideError),
}

fn bullet_list(problems: &[String]) -> String {
    problems
        .iter()
        .map(|problem| format!("- {problem}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Output of a route-list parser.
pub struct RoutesParseResult {
    /// Parsed routes in document order.
    pub routes: Vec<RouteEntry>,
    /// Problems the parser could not recover from.
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Output of a schedule-guide parser.
pub struct ScheduleParseResult {
    /// Recycling calendar found in the guide.
    #[serde(default)]
    pub calendar_policy: CalendarPolicy,
    /// Holiday rules found in the guide.
    #[serde(default)]
    pub holiday_policy: HolidayPolicy,
    /// Problems the parser could not recover from.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Overrides applied during a build.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    /// Street aliases.
    pub aliases: AliasOverrides,
    /// Holiday list replacements.
    pub holidays: HolidayOverrides,
    /// Route edits.
    pub routes: RouteOverrides,
}

/// Builds a snapshot for one town.
#[derive(Debug)]
pub struct DatabaseBuilder<'cfg> {
    config: &'cfg TownConfig,
    normalizer: StreetNormalizer,
    overrides: BuildOverrides,
    sources: BTreeMap<String, SourceMeta>,
    git_commit: Option<String>,
    generated_at: Option<DateTime<Utc>>,
}

impl<'cfg> DatabaseBuilder<'cfg> {
    /// Builder using the town's rules and normalizer tables.
    #[must_use]
    pub fn new(config: &'cfg TownConfig) -> Self {
        Self {
            config,
            normalizer: config.normalizer.build(),
            overrides: BuildOverrides::default(),
            sources: BTreeMap::new(),
            git_commit: None,
            generated_at: None,
        }
    }

    /// Apply these overrides.
    #[must_use]
    pub fn overrides(mut self, overrides: BuildOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Record a source document under `role` ("routes", "schedule").
    #[must_use]
    pub fn source(mut self, role: &str, meta: SourceMeta) -> Self {
        self.sources.insert(role.to_owned(), meta);
        self
    }

    /// Stamp the pipeline commit.
    #[must_use]
    pub fn git_commit(mut self, commit: Option<String>) -> Self {
        self.git_commit = commit;
        self
    }

    /// Fix the build time instead of using the clock.
    #[must_use]
    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Combine parsed records with rules and overrides.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Parse`] when either parser reported errors and
    /// [`BuildError::MissingAnchor`] when alternating-week recycling ends up without an anchor,
    /// and [`BuildError::Override`] for route overrides without a street.
    pub fn build(
        self,
        routes_result: RoutesParseResult,
        schedule_result: ScheduleParseResult,
    ) -> Result<Database, BuildError> {
        let problems: Vec<String> = routes_result
            .errors
            .iter()
            .chain(&schedule_result.errors)
            .cloned()
            .collect();
        if !problems.is_empty() {
            error!(count = problems.len(), "parsers reported errors");
            return Err(BuildError::Parse(problems));
        }

        let calendar_policy = self.calendar_policy(&schedule_result.calendar_policy);
        if calendar_policy.recycling_mode == RecyclingMode::AlternatingWeek
            && calendar_policy.anchor().is_none()
        {
            return Err(BuildError::MissingAnchor);
        }

        let holiday_policy = self
            .overrides
            .holidays
            .apply(self.holiday_policy(schedule_result.holiday_policy));
        let aliases = self
            .overrides
            .aliases
            .apply(HashMap::new(), &self.normalizer);

        // Parser keys may come from a different normalizer; override matchers need ours.
        let mut parsed_routes = routes_result.routes;
        for route in &mut parsed_routes {
            route.street_normalized = self.normalizer.normalize(&route.street);
        }
        let (routes, report) = self.overrides.routes.apply(parsed_routes, &self.normalizer)?;

        info!(
            town = %self.config.town_id,
            routes = routes.len(),
            aliases = aliases.len(),
            deleted = report.deleted,
            patched = report.patched,
            added = report.added,
            "database built"
        );

        Ok(Database {
            schema_version: SCHEMA_VERSION,
            meta: Some(DatabaseMeta {
                generated_at: self.generated_at.unwrap_or_else(Utc::now),
                town_id: TownId(self.config.town_id.clone()),
                sources: self.sources,
                git_commit: self.git_commit,
            }),
            calendar_policy,
            holiday_policy,
            aliases,
            street_index: Some(build_street_index(&routes)),
            routes,
        })
    }

    /// Mode from the config; anchors from the config, else from the parsed guide.
    fn calendar_policy(&self, parsed: &CalendarPolicy) -> CalendarPolicy {
        let rules = &self.config.rules.recycling;
        CalendarPolicy {
            recycling_mode: rules.mode,
            anchor_week_sunday: rules.anchor_week_sunday.or(parsed.anchor_week_sunday),
            anchor_color: rules.anchor_color.or(parsed.anchor_color),
        }
    }

    /// Each configured list wins when non-empty.
    fn holiday_policy(&self, parsed: HolidayPolicy) -> HolidayPolicy {
        let rules = &self.config.rules.holidays;
        let pick = |configured: &[NaiveDate], from_guide: BTreeSet<NaiveDate>| {
            if configured.is_empty() {
                from_guide
            } else {
                date_set(configured)
            }
        };
        HolidayPolicy {
            no_collection_dates: pick(&rules.no_collection_dates, parsed.no_collection_dates),
            shift_holidays: pick(&rules.shift_holidays, parsed.shift_holidays),
            delay_anchor_week_sundays: pick(
                &rules.delay_anchor_week_sundays,
                parsed.delay_anchor_week_sundays,
            ),
            shift_by_one_day: rules.shift_by_one_day,
        }
    }
}
