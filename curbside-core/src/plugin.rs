//! Registry for all configured towns and their snapshot sources.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TownConfig;
use crate::model::{TownId, TownMeta};
use crate::normalize::StreetNormalizer;
use crate::ports::SnapshotSource;
use crate::service::ServiceError;
use crate::snapshot::SnapshotReloader;

/// Everything the service needs to answer requests for one town.
pub struct TownPlugin {
    /// Static metadata describing the town.
    pub meta: TownMeta,
    /// Validated town configuration.
    pub config: TownConfig,
    /// Normalizer the town's database was built with.
    pub normalizer: StreetNormalizer,
    /// Current database snapshot.
    pub snapshots: Arc<SnapshotReloader>,
}

impl TownPlugin {
    /// Bundle a town config with the source of its snapshots.
    #[must_use]
    pub fn new(config: TownConfig, source: Arc<dyn SnapshotSource>) -> Self {
        let interval = Duration::from_secs(config.service.reload_interval_seconds);
        Self::with_reloader(config, Arc::new(SnapshotReloader::new(source, interval)))
    }

    /// Bundle a town config with an existing reloader.
    #[must_use]
    pub fn with_reloader(config: TownConfig, snapshots: Arc<SnapshotReloader>) -> Self {
        Self {
            meta: config.meta(),
            normalizer: config.normalizer.build(),
            config,
            snapshots,
        }
    }
}

/// Registry that resolves towns by identifier.
pub struct TownRegistry {
    towns: BTreeMap<TownId, TownPlugin>,
}

impl TownRegistry {
    /// Build a registry from the provided town list.
    #[must_use]
    pub fn new(towns: Vec<TownPlugin>) -> Self {
        let towns = towns
            .into_iter()
            .map(|town| (town.meta.id.clone(), town))
            .collect();
        Self { towns }
    }

    /// Return metadata for all registered towns, ordered by id.
    #[must_use]
    pub fn towns(&self) -> Vec<TownMeta> {
        self.towns_iter().cloned().collect()
    }

    /// Iterator over town metadata.
    pub fn towns_iter(&self) -> impl Iterator<Item = &TownMeta> {
        self.towns.values().map(|town| &town.meta)
    }

    /// Look up a registered town.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownTown`] when no town is registered under `id`.
    pub fn town(&self, id: &TownId) -> Result<&TownPlugin, ServiceError> {
        self.towns
            .get(id)
            .ok_or_else(|| ServiceError::UnknownTown(id.clone()))
    }
}
