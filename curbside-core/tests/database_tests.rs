//! Building snapshots from parser output, town rules, and overrides.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate};
use curbside_core::{
    AliasOverrides, BuildError, BuildOverrides, DatabaseBuilder, HolidayOverrides, HolidayRules,
    NormalizerConfig, OverrideError, OverridesPaths, RecyclingColor, RecyclingMode, RecyclingRules,
    ResolverConfig, ResolverSettings, RouteChanges, RouteMatcher, RouteOverrides, RoutePatch,
    RoutesParseResult, RulesConfig, SCHEMA_VERSION, ScheduleConfig, ScheduleParseResult,
    ServiceConfig, ShiftHoliday, SourceMeta, TownConfig, TownId, Weekday, resolve,
};

fn day(year: i32, month: u32, date: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, date).expect("valid date")
}

fn config(mode: RecyclingMode) -> TownConfig {
    TownConfig {
        town_id: "westford".to_owned(),
        town_name: "Westford".to_owned(),
        timezone: "America/New_York".to_owned(),
        schedule: ScheduleConfig::default(),
        rules: RulesConfig {
            recycling: RecyclingRules {
                mode,
                anchor_week_sunday: None,
                anchor_color: None,
            },
            holidays: HolidayRules::default(),
        },
        overrides_paths: OverridesPaths::default(),
        resolver: ResolverConfig::default(),
        service: ServiceConfig::default(),
        normalizer: NormalizerConfig::default(),
        database_path: None,
    }
}

/// Parser output as written by the route-list extractor.
fn routes() -> RoutesParseResult {
    serde_json::from_str(
        r#"{
            "routes": [
                {"street": "Boston Rd", "street_normalized": "stale", "weekday": "THURSDAY",
                 "recycling_color": "BLUE", "constraints": [{"parity": "odd"}]},
                {"street": "Boston Rd", "weekday": "friday", "recycling_color": "green",
                 "constraints": [{"parity": "even"}]},
                {"street": "Main St", "weekday": "Monday", "recycling_color": "BLUE"},
                {"street": "Old Mill Ln", "weekday": "Tuesday", "recycling_color": "GREEN"}
            ]
        }"#,
    )
    .expect("routes json")
}

fn schedule() -> ScheduleParseResult {
    serde_json::from_str(
        r#"{
            "calendar_policy": {
                "recycling_mode": "alternating_week",
                "anchor_week_sunday": "2025-04-06",
                "anchor_color": "BLUE"
            },
            "holiday_policy": {
                "no_collection_dates": ["2025-12-25"],
                "shift_holidays": ["2025-05-26", "2025-07-04"]
            }
        }"#,
    )
    .expect("schedule json")
}

#[test]
fn parser_errors_abort_the_build() {
    let town = config(RecyclingMode::AlternatingWeek);
    let mut broken_routes = routes();
    broken_routes.errors.push("page 3: unreadable table".to_owned());
    let mut broken_schedule = schedule();
    broken_schedule.errors.push("no anchor sentence".to_owned());

    let err = DatabaseBuilder::new(&town)
        .build(broken_routes, broken_schedule)
        .expect_err("parse errors");
    assert_eq!(
        err,
        BuildError::Parse(vec![
            "page 3: unreadable table".to_owned(),
            "no anchor sentence".to_owned()
        ])
    );
    assert_eq!(
        err.to_string(),
        "Parsing errors:\n- page 3: unreadable table\n- no anchor sentence"
    );
}

#[test]
fn alternating_mode_without_any_anchor_fails() {
    let town = config(RecyclingMode::AlternatingWeek);
    let err = DatabaseBuilder::new(&town)
        .build(routes(), ScheduleParseResult::default())
        .expect_err("missing anchor");
    assert_eq!(err, BuildError::MissingAnchor);
}

#[test]
fn disabled_mode_needs_no_anchor() {
    let town = config(RecyclingMode::Disabled);
    let db = DatabaseBuilder::new(&town)
        .build(routes(), ScheduleParseResult::default())
        .expect("built");
    assert_eq!(db.calendar_policy.recycling_mode, RecyclingMode::Disabled);
}

#[test]
fn anchor_falls_back_to_parsed_guide() {
    let town = config(RecyclingMode::AlternatingWeek);
    let db = DatabaseBuilder::new(&town)
        .build(routes(), schedule())
        .expect("built");
    assert_eq!(
        db.calendar_policy.anchor(),
        Some((day(2025, 4, 6), RecyclingColor::Blue))
    );
}

#[test]
fn configured_rules_win_over_parsed_guide() {
    let mut town = config(RecyclingMode::AlternatingWeek);
    town.rules.recycling.anchor_week_sunday = Some(day(2025, 4, 13));
    town.rules.recycling.anchor_color = Some(RecyclingColor::Green);
    town.rules.holidays.shift_holidays = vec![day(2025, 9, 1)];
    town.rules.holidays.shift_by_one_day = false;

    let db = DatabaseBuilder::new(&town)
        .build(routes(), schedule())
        .expect("built");
    assert_eq!(
        db.calendar_policy.anchor(),
        Some((day(2025, 4, 13), RecyclingColor::Green))
    );
    assert_eq!(db.holiday_policy.shift_holidays, BTreeSet::from([day(2025, 9, 1)]));
    assert_eq!(
        db.holiday_policy.no_collection_dates,
        BTreeSet::from([day(2025, 12, 25)]),
        "empty configured list falls back to the guide"
    );
    assert!(!db.holiday_policy.shift_by_one_day, "switch comes from config");
}

#[test]
fn normalized_keys_are_recomputed_and_indexed() {
    let town = config(RecyclingMode::AlternatingWeek);
    let db = DatabaseBuilder::new(&town)
        .build(routes(), schedule())
        .expect("built");

    let keys: Vec<&str> = db
        .routes
        .iter()
        .map(|route| route.street_normalized.as_str())
        .collect();
    assert_eq!(keys, vec!["boston road", "boston road", "main street", "old mill lane"]);

    let index = db.street_index.as_ref().expect("index built");
    assert_eq!(index.get("boston road"), Some(&vec![0, 1]));
    assert_eq!(index.get("old mill lane"), Some(&vec![3]));
    assert_eq!(db.schema_version, SCHEMA_VERSION);
}

#[test]
fn overrides_are_applied_before_indexing() {
    let town = config(RecyclingMode::AlternatingWeek);
    let overrides = BuildOverrides {
        aliases: AliasOverrides(BTreeMap::from([(
            "Rt 225".to_owned(),
            "Main Street".to_owned(),
        )])),
        holidays: HolidayOverrides {
            no_collection_dates: Some(Vec::new()),
            shift_holidays: Some(vec![ShiftHoliday::Named {
                date: day(2025, 10, 13),
                name: Some("Columbus Day".to_owned()),
            }]),
        },
        routes: RouteOverrides {
            delete: vec![RouteMatcher {
                street: "Old Mill Lane".to_owned(),
                weekday: None,
                recycling_color: None,
                parity: None,
                range: None,
                no_collection: None,
            }],
            patch: vec![RoutePatch {
                matcher: RouteMatcher {
                    street: "main street".to_owned(),
                    weekday: Some(Weekday::Monday),
                    recycling_color: None,
                    parity: None,
                    range: None,
                    no_collection: None,
                },
                set: RouteChanges {
                    weekday: Some(Weekday::Wednesday),
                    ..RouteChanges::default()
                },
            }],
            add: Vec::new(),
        },
    };

    let db = DatabaseBuilder::new(&town)
        .overrides(overrides)
        .build(routes(), schedule())
        .expect("built");

    assert_eq!(db.routes.len(), 3);
    assert!(
        db.street_index
            .as_ref()
            .is_some_and(|index| !index.contains_key("old mill lane")),
        "deleted route still indexed"
    );
    assert!(db.holiday_policy.no_collection_dates.is_empty());
    assert_eq!(db.holiday_policy.shift_holidays, BTreeSet::from([day(2025, 10, 13)]));

    let via_alias = resolve(&db, "RT 225", None, ResolverSettings::default()).expect("alias");
    assert_eq!(via_alias.weekday, Some(Weekday::Wednesday));
}

#[test]
fn route_override_without_street_fails_the_build() {
    let town = config(RecyclingMode::AlternatingWeek);
    let overrides = BuildOverrides {
        routes: RouteOverrides {
            patch: vec![RoutePatch {
                matcher: RouteMatcher {
                    street: String::new(),
                    weekday: Some(Weekday::Monday),
                    recycling_color: None,
                    parity: None,
                    range: None,
                    no_collection: None,
                },
                set: RouteChanges::default(),
            }],
            ..RouteOverrides::default()
        },
        ..BuildOverrides::default()
    };

    let err = DatabaseBuilder::new(&town)
        .overrides(overrides)
        .build(routes(), schedule())
        .expect_err("blank street");
    assert_eq!(
        err,
        BuildError::Override(OverrideError::MissingStreet {
            section: "patch",
            index: 0,
        })
    );
}

#[test]
fn meta_records_provenance() {
    let town = config(RecyclingMode::AlternatingWeek);
    let built_at = DateTime::from_timestamp(1_750_000_000, 0).expect("timestamp");
    let db = DatabaseBuilder::new(&town)
        .source("routes", SourceMeta {
            url: "https://example.org/routes.pdf".to_owned(),
            sha256: "ab".repeat(32),
            etag: None,
            last_modified: None,
        })
        .git_commit(Some("4f2c9e1".to_owned()))
        .generated_at(built_at)
        .build(routes(), schedule())
        .expect("built");

    let meta = db.meta.expect("meta");
    assert_eq!(meta.town_id, TownId("westford".to_owned()));
    assert_eq!(meta.generated_at, built_at);
    assert_eq!(meta.git_commit.as_deref(), Some("4f2c9e1"));
    assert!(meta.sources.contains_key("routes"), "routes source recorded");
}
