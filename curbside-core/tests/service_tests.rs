//! Service facade behavior over an in-memory snapshot source.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use curbside_core::{
    CalendarPolicy, CollectionService, CollectionType, Database, DatabaseMeta, HolidayPolicy,
    HolidayRules, NormalizerConfig, OverridesPaths, RecyclingColor, RecyclingMode,
    RecyclingRules, ResolveErrorKind, ResolverConfig, RouteEntry, RouteQuery, RulesConfig,
    SCHEMA_VERSION, ScheduleConfig, ScheduleRequest, ScheduleTarget, ServiceConfig, ServiceError,
    SnapshotReloader, SnapshotSource, SourceError, TownConfig, TownId, TownPlugin, TownRegistry,
    Weekday, normalize_street_name,
};

/// Snapshot source whose contents and stamp the test can swap.
struct MemorySource {
    db: Mutex<Option<Database>>,
    stamp: Mutex<Option<SystemTime>>,
    loads: AtomicUsize,
}

impl MemorySource {
    fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(Some(db)),
            stamp: Mutex::new(Some(SystemTime::UNIX_EPOCH)),
            loads: AtomicUsize::new(0),
        }
    }

    fn publish(&self, db: Option<Database>, stamp: SystemTime) {
        *self.db.lock().expect("db lock") = db;
        *self.stamp.lock().expect("stamp lock") = Some(stamp);
    }
}

#[async_trait]
impl SnapshotSource for MemorySource {
    fn describe(&self) -> String {
        "memory".to_owned()
    }

    async fn load(&self) -> Result<Database, SourceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        // Let other callers run while this load is in flight.
        tokio::task::yield_now().await;
        self.db
            .lock()
            .expect("db lock")
            .clone()
            .ok_or_else(|| SourceError::Missing("memory".to_owned()))
    }

    async fn modified(&self) -> Result<Option<SystemTime>, SourceError> {
        Ok(*self.stamp.lock().expect("stamp lock"))
    }
}

fn day(year: i32, month: u32, date: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, date).expect("valid date")
}

fn route(street: &str, weekday: Option<Weekday>, no_collection: bool) -> RouteEntry {
    RouteEntry {
        street: street.to_owned(),
        street_normalized: normalize_street_name(street),
        weekday,
        recycling_color: Some(RecyclingColor::Blue),
        no_collection,
        constraints: Vec::new(),
        notes: None,
    }
}

fn westford_db() -> Database {
    let mut db = Database::from_routes(vec![
        route("Main Street", Some(Weekday::Monday), false),
        route("Private Way", Some(Weekday::Tuesday), true),
        route("Unknown Lane", None, false),
    ]);
    db.calendar_policy = CalendarPolicy::alternating(day(2025, 4, 6), RecyclingColor::Blue);
    db.holiday_policy = HolidayPolicy::default();
    db
}

fn westford_config() -> TownConfig {
    TownConfig {
        town_id: "westford".to_owned(),
        town_name: "Westford".to_owned(),
        timezone: "America/New_York".to_owned(),
        schedule: ScheduleConfig {
            default_days_ahead: 14,
            max_days_ahead: 60,
        },
        rules: RulesConfig {
            recycling: RecyclingRules {
                mode: RecyclingMode::AlternatingWeek,
                anchor_week_sunday: Some(day(2025, 4, 6)),
                anchor_color: Some(RecyclingColor::Blue),
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

fn service() -> CollectionService {
    service_over(westford_db())
}

fn service_over(db: Database) -> CollectionService {
    let source = Arc::new(MemorySource::new(db));
    let registry = TownRegistry::new(vec![TownPlugin::new(westford_config(), source)]);
    CollectionService::new(Arc::new(registry))
}

fn westford() -> TownId {
    TownId("westford".to_owned())
}

fn request(street: &str) -> ScheduleRequest {
    ScheduleRequest {
        start: Some(day(2025, 4, 6)),
        ..ScheduleRequest::for_address(RouteQuery::new(street, Some(12)))
    }
}

#[tokio::test]
async fn lists_configured_towns() {
    let towns = service().towns();
    assert_eq!(towns.len(), 1);
    assert_eq!(towns.first().map(|town| town.name.as_str()), Some("Westford"));
}

#[tokio::test]
async fn unknown_town_is_reported() {
    let err = service()
        .resolve(&TownId("lowell".to_owned()), &RouteQuery::new("Main St", None))
        .await
        .expect_err("unknown town");
    assert!(matches!(err, ServiceError::UnknownTown(TownId(ref id)) if id == "lowell"));
}

#[tokio::test]
async fn resolve_returns_route() {
    let found = service()
        .resolve(&westford(), &RouteQuery::new("main st", Some(5)))
        .await
        .expect("route");
    assert_eq!(found.street, "Main Street");
    assert_eq!(found.weekday, Some(Weekday::Monday));
}

#[tokio::test]
async fn resolve_errors_pass_through_with_suggestions() {
    let err = service()
        .resolve(&westford(), &RouteQuery::new("Mainn Street", None))
        .await
        .expect_err("typo");
    let ServiceError::Resolve(resolve) = err else {
        panic!("expected resolve error, got {err:?}");
    };
    assert_eq!(resolve.kind, ResolveErrorKind::NotFound);
    assert!(
        resolve.suggestions.iter().any(|street| street == "Main Street"),
        "suggestions: {:?}",
        resolve.suggestions
    );
}

#[tokio::test]
async fn no_collection_route_is_an_error() {
    let err = service()
        .resolve(&westford(), &RouteQuery::new("Private Way", None))
        .await
        .expect_err("no pickup");
    assert!(matches!(err, ServiceError::NoCollection));
    assert_eq!(err.to_string(), "No municipal collection for this address");
}

#[tokio::test]
async fn route_without_weekday_cannot_be_scheduled() {
    let err = service()
        .schedule(&westford(), &request("Unknown Lane"))
        .await
        .expect_err("no weekday");
    assert!(matches!(err, ServiceError::MissingWeekday));
}

#[tokio::test]
async fn default_window_comes_from_config() {
    let schedule = service()
        .schedule(&westford(), &request("Main Street"))
        .await
        .expect("schedule");
    assert_eq!(schedule.days, 14);
    assert_eq!(schedule.start, day(2025, 4, 6));
    assert_eq!(
        schedule.events.iter().map(|event| event.date).collect::<Vec<_>>(),
        vec![day(2025, 4, 7), day(2025, 4, 14)]
    );
    assert_eq!(
        schedule.route.as_ref().map(|route| route.street.as_str()),
        Some("Main Street")
    );
}

#[tokio::test]
async fn requested_days_are_clamped_to_maximum() {
    let schedule = service()
        .schedule(&westford(), &ScheduleRequest {
            days: Some(1000),
            ..request("Main Street")
        })
        .await
        .expect("schedule");
    assert_eq!(schedule.days, 60);
}

#[tokio::test]
async fn zero_days_is_invalid() {
    let err = service()
        .schedule(&westford(), &ScheduleRequest {
            days: Some(0),
            ..request("Main Street")
        })
        .await
        .expect_err("zero days");
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}

#[tokio::test]
async fn empty_types_is_invalid() {
    let err = service()
        .schedule(&westford(), &ScheduleRequest {
            types: BTreeSet::new(),
            ..request("Main Street")
        })
        .await
        .expect_err("no types");
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}

#[tokio::test]
async fn recycling_only_drops_trash_only_weeks() {
    let schedule = service()
        .schedule(&westford(), &ScheduleRequest {
            days: Some(27),
            types: BTreeSet::from([CollectionType::Recycling]),
            ..request("Main Street")
        })
        .await
        .expect("schedule");
    assert_eq!(
        schedule.events.iter().map(|event| event.date).collect::<Vec<_>>(),
        vec![day(2025, 4, 7), day(2025, 4, 21)]
    );
    assert!(
        schedule
            .events
            .iter()
            .all(|event| event.types == BTreeSet::from([CollectionType::Recycling])),
        "trash leaked into a recycling-only schedule"
    );
}

#[tokio::test]
async fn direct_target_skips_resolution() {
    let schedule = service()
        .schedule(&westford(), &ScheduleRequest {
            target: ScheduleTarget::Direct {
                weekday: Weekday::Friday,
                color: RecyclingColor::Green,
            },
            start: Some(day(2025, 4, 6)),
            days: Some(13),
            types: BTreeSet::from([CollectionType::Trash, CollectionType::Recycling]),
        })
        .await
        .expect("schedule");
    assert!(schedule.route.is_none(), "direct request has no route");
    let recycling: Vec<bool> = schedule
        .events
        .iter()
        .map(|event| event.has(CollectionType::Recycling))
        .collect();
    assert_eq!(recycling, vec![false, true]);
}

#[tokio::test]
async fn reloader_picks_up_newer_snapshot() {
    let source = Arc::new(MemorySource::new(westford_db()));
    let reloader = SnapshotReloader::new(source.clone(), Duration::ZERO);
    let first = reloader.current().await.expect("initial load");
    assert_eq!(first.routes.len(), 3);

    let smaller = Database::from_routes(vec![route("Elm Street", Some(Weekday::Friday), false)]);
    source.publish(Some(smaller), SystemTime::UNIX_EPOCH + Duration::from_secs(60));
    let second = reloader.current().await.expect("reload");
    assert_eq!(second.routes.len(), 1);
    assert_eq!(first.routes.len(), 3, "old readers keep their snapshot");
}

#[tokio::test]
async fn failed_reload_keeps_previous_snapshot() {
    let source = Arc::new(MemorySource::new(westford_db()));
    let reloader = SnapshotReloader::new(source.clone(), Duration::ZERO);
    reloader.current().await.expect("initial load");

    source.publish(None, SystemTime::UNIX_EPOCH + Duration::from_secs(60));
    let current = reloader.current().await.expect("stale snapshot served");
    assert_eq!(current.routes.len(), 3);
}

#[tokio::test]
async fn first_load_failure_is_reported() {
    let source = Arc::new(MemorySource::new(westford_db()));
    source.publish(None, SystemTime::UNIX_EPOCH);
    let reloader = SnapshotReloader::new(source, Duration::ZERO);
    assert!(
        matches!(reloader.current().await, Err(SourceError::Missing(_))),
        "missing snapshot accepted"
    );
}

#[tokio::test]
async fn concurrent_first_reads_share_one_load() {
    let source = Arc::new(MemorySource::new(westford_db()));
    let reloader = SnapshotReloader::new(source.clone(), Duration::from_secs(3600));
    let (first, second) = tokio::join!(reloader.current(), reloader.current());
    assert_eq!(first.expect("first reader").routes.len(), 3);
    assert_eq!(second.expect("second reader").routes.len(), 3);
    assert_eq!(source.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn streets_are_listed_sorted_and_counted() {
    let mut db = westford_db();
    db.routes.push(route("Main St", Some(Weekday::Thursday), false));
    let streets = service_over(db).streets(&westford()).await.expect("streets");
    assert_eq!(
        streets.streets,
        vec!["Main St", "Main Street", "Private Way", "Unknown Lane"]
    );
    assert_eq!(streets.count, 3, "spellings of one street count once");
}

#[tokio::test]
async fn snapshot_info_reports_build_stamp() {
    let built_at = DateTime::from_timestamp(1_750_000_000, 0).expect("timestamp");
    let mut db = westford_db();
    db.meta = Some(DatabaseMeta {
        generated_at: built_at,
        town_id: westford(),
        sources: BTreeMap::new(),
        git_commit: Some("4f2c9e1".to_owned()),
    });

    let info = service_over(db)
        .snapshot_info(&westford())
        .await
        .expect("info");
    assert_eq!(info.schema_version, SCHEMA_VERSION);
    assert_eq!(info.routes, 3);
    let meta = info.meta.expect("meta");
    assert_eq!(meta.generated_at, built_at);
    assert_eq!(meta.git_commit.as_deref(), Some("4f2c9e1"));

    let bare = service().snapshot_info(&westford()).await.expect("info");
    assert!(bare.meta.is_none(), "hand-built snapshot has no stamp");
}

#[tokio::test]
async fn street_list_for_unknown_town_fails() {
    let err = service()
        .streets(&TownId("lowell".to_owned()))
        .await
        .expect_err("unknown town");
    assert!(matches!(err, ServiceError::UnknownTown(_)));
}
