//! High-level service facade combining route resolution and schedule generation.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::model::{
    CollectionType, Database, DatabaseMeta, RecyclingColor, RouteEntry, ScheduleEvent, TownId,
    TownMeta, Weekday,
};
use crate::plugin::{TownPlugin, TownRegistry};
use crate::ports::SourceError;
use crate::resolver::{ResolveError, resolve_with};
use crate::schedule::{ScheduleError, generate};

#[derive(thiserror::Error, Debug)]
/// Errors returned by [`CollectionService`].
pub enum ServiceError {
    /// No town is registered under this id.
    #[error("Unknown town: {0}")]
    UnknownTown(TownId),
    /// The address could not be mapped to a route.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The address is serviced but has no municipal pickup.
    #[error("No municipal collection for this address")]
    NoCollection,
    /// The resolved route has no pickup weekday.
    #[error("Resolved route missing weekday")]
    MissingWeekday,
    /// The request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The town's policies cannot produce a schedule.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    /// The town's configuration is broken.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The town's database could not be loaded.
    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Street and optional house number, already split by the caller.
pub struct RouteQuery {
    /// Street text in any spelling.
    pub street: String,
    /// House number, when known.
    pub number: Option<u32>,
}

impl RouteQuery {
    /// Construct a new query.
    #[must_use]
    pub fn new<S: Into<String>>(street: S, number: Option<u32>) -> Self {
        Self {
            street: street.into(),
            number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// What to build a schedule for.
pub enum ScheduleTarget {
    /// Look the route up by address.
    Address(RouteQuery),
    /// Skip resolution and use a known weekday and color.
    Direct {
        /// Pickup weekday.
        weekday: Weekday,
        /// Recycling color.
        color: RecyclingColor,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Parameters of a schedule request.
pub struct ScheduleRequest {
    /// Address or direct weekday/color.
    pub target: ScheduleTarget,
    /// First day; today in the town's timezone when absent.
    pub start: Option<NaiveDate>,
    /// Window length; the town default when absent, clamped to the town maximum.
    pub days: Option<u32>,
    /// Pickup kinds to include. Must not be empty.
    pub types: BTreeSet<CollectionType>,
}

impl ScheduleRequest {
    /// Request every pickup kind for an address with town defaults.
    #[must_use]
    pub fn for_address(query: RouteQuery) -> Self {
        Self {
            target: ScheduleTarget::Address(query),
            start: None,
            days: None,
            types: BTreeSet::from([CollectionType::Trash, CollectionType::Recycling]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A generated schedule and what it was generated for.
pub struct RouteSchedule {
    /// Resolved route; `None` for direct requests.
    pub route: Option<RouteEntry>,
    /// Pickup weekday used.
    pub weekday: Weekday,
    /// Recycling color used.
    pub recycling_color: Option<RecyclingColor>,
    /// First day of the window.
    pub start: NaiveDate,
    /// Window length after clamping.
    pub days: u32,
    /// Pickups, sorted by date.
    pub events: Vec<ScheduleEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Streets a town's snapshot knows about.
pub struct StreetList {
    /// Distinct canonical street keys.
    pub count: usize,
    /// Distinct display names, sorted.
    pub streets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Version and provenance of the snapshot currently served for a town.
pub struct SnapshotInfo {
    /// Snapshot layout version.
    pub schema_version: u32,
    /// Build stamp; absent for snapshots assembled by hand.
    pub meta: Option<DatabaseMeta>,
    /// Number of routes.
    pub routes: usize,
}

/// Public entry point for resolving addresses and generating schedules.
pub struct CollectionService {
    registry: Arc<TownRegistry>,
}

impl CollectionService {
    /// Create a new service bound to the provided registry.
    #[must_use]
    pub fn new(registry: Arc<TownRegistry>) -> Self {
        Self { registry }
    }

    /// List all configured towns.
    #[must_use]
    pub fn towns(&self) -> Vec<TownMeta> {
        self.registry.towns()
    }

    /// Streets served for `town`.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the town is unknown or its database cannot be loaded.
    pub async fn streets(&self, town: &TownId) -> Result<StreetList, ServiceError> {
        let db = self.registry.town(town)?.snapshots.current().await?;
        let count = db
            .routes
            .iter()
            .map(|route| route.street_normalized.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        Ok(StreetList {
            count,
            streets: db.display_streets().into_iter().map(str::to_owned).collect(),
        })
    }

    /// Schema version and build stamp of the snapshot served for `town`.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the town is unknown or its database cannot be loaded.
    pub async fn snapshot_info(&self, town: &TownId) -> Result<SnapshotInfo, ServiceError> {
        let db = self.registry.town(town)?.snapshots.current().await?;
        Ok(SnapshotInfo {
            schema_version: db.schema_version,
            meta: db.meta.clone(),
            routes: db.routes.len(),
        })
    }

    /// Resolve an address to its collection route.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the town is unknown, its database cannot be loaded,
    /// the address does not resolve, or the address has no municipal pickup.
    pub async fn resolve(
        &self,
        town: &TownId,
        query: &RouteQuery,
    ) -> Result<RouteEntry, ServiceError> {
        let plugin = self.registry.town(town)?;
        let db = plugin.snapshots.current().await?;
        resolve_route(plugin, &db, query)
    }

    /// Generate upcoming pickups.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request is malformed, the address cannot be
    /// resolved, or the town's policies are inconsistent.
    pub async fn schedule(
        &self,
        town: &TownId,
        request: &ScheduleRequest,
    ) -> Result<RouteSchedule, ServiceError> {
        let plugin = self.registry.town(town)?;

        if request.types.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "types must be trash and/or recycling".to_owned(),
            ));
        }
        let days = clamp_days(request.days, plugin)?;
        let start = match request.start {
            Some(start) => start,
            None => Utc::now().with_timezone(&plugin.config.tz()?).date_naive(),
        };

        // Resolution and generation read the same snapshot.
        let db = plugin.snapshots.current().await?;
        let (route, weekday, recycling_color) = match &request.target {
            ScheduleTarget::Direct { weekday, color } => (None, *weekday, Some(*color)),
            ScheduleTarget::Address(query) => {
                let route = resolve_route(plugin, &db, query)?;
                let weekday = route.weekday.ok_or(ServiceError::MissingWeekday)?;
                let color = route.recycling_color;
                (Some(route), weekday, color)
            }
        };

        let wants_recycling = request.types.contains(&CollectionType::Recycling);
        let events = generate(
            start,
            days,
            weekday,
            recycling_color.filter(|_| wants_recycling),
            &db.calendar_policy,
            &db.holiday_policy,
        )?
        .into_iter()
        .filter_map(|event| {
            let types: BTreeSet<CollectionType> =
                event.types.intersection(&request.types).copied().collect();
            (!types.is_empty()).then_some(ScheduleEvent {
                date: event.date,
                types,
            })
        })
        .collect();

        Ok(RouteSchedule {
            route,
            weekday,
            recycling_color,
            start,
            days,
            events,
        })
    }
}

fn resolve_route(
    plugin: &TownPlugin,
    db: &Database,
    query: &RouteQuery,
) -> Result<RouteEntry, ServiceError> {
    let route = resolve_with(
        &plugin.normalizer,
        db,
        &query.street,
        query.number,
        plugin.config.resolver.into(),
    )?;
    if route.no_collection {
        debug!(street = %route.street, "address has no municipal collection");
        return Err(ServiceError::NoCollection);
    }
    Ok(route.clone())
}

fn clamp_days(requested: Option<u32>, plugin: &TownPlugin) -> Result<u32, ServiceError> {
    let limits = plugin.config.schedule;
    match requested {
        None => Ok(limits.default_days_ahead),
        Some(0) => Err(ServiceError::InvalidRequest("days must be > 0".to_owned())),
        Some(days) => Ok(days.min(limits.max_days_ahead)),
    }
}
