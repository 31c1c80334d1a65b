//! Shared, atomically replaceable database snapshots.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::model::Database;
use crate::ports::{SnapshotSource, SourceError};

/// Holds the current snapshot. Readers get an `Arc` and keep a consistent view while a
/// replacement is swapped in.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Database>>,
}

impl SnapshotStore {
    /// Store starting with `db`.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            current: RwLock::new(Arc::new(db)),
        }
    }

    /// The snapshot in effect right now.
    #[must_use]
    pub fn current(&self) -> Arc<Database> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Make `db` the current snapshot.
    pub fn replace(&self, db: Database) {
        let fresh = Arc::new(db);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }
}

#[derive(Debug, Default)]
struct ReloadState {
    last_check: Option<Instant>,
    last_modified: Option<SystemTime>,
}

/// Lazily loads a snapshot and picks up changes at most once per interval.
///
/// Concurrent first callers share a single load.
pub struct SnapshotReloader {
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
    store: OnceCell<SnapshotStore>,
    state: Mutex<ReloadState>,
}

impl SnapshotReloader {
    /// Reloader over `source`, checking for changes every `interval`.
    #[must_use]
    pub fn new(source: Arc<dyn SnapshotSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            store: OnceCell::new(),
            state: Mutex::new(ReloadState::default()),
        }
    }

    /// Current snapshot, loading or refreshing it from the source when due.
    ///
    /// A failed refresh keeps serving the previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when no snapshot has ever been loaded and loading fails.
    pub async fn current(&self) -> Result<Arc<Database>, SourceError> {
        let Some(store) = self.store.get() else {
            let store = self.store.get_or_try_init(|| self.initial_load()).await?;
            return Ok(store.current());
        };

        if self.check_due() {
            match self.source.modified().await {
                Ok(modified) => {
                    if self.is_newer(modified) {
                        match self.source.load().await {
                            Ok(db) => {
                                info!(source = %self.source.describe(), "database reloaded");
                                store.replace(db);
                                self.remember(modified);
                            }
                            Err(err) => {
                                warn!(
                                    source = %self.source.describe(),
                                    %err,
                                    "reload failed, keeping previous database"
                                );
                            }
                        }
                    } else {
                        debug!(source = %self.source.describe(), "database unchanged");
                    }
                }
                Err(err) => {
                    warn!(
                        source = %self.source.describe(),
                        %err,
                        "could not check database for changes"
                    );
                }
            }
        }

        Ok(store.current())
    }

    async fn initial_load(&self) -> Result<SnapshotStore, SourceError> {
        let modified = self.source.modified().await?;
        let db = self.source.load().await?;
        info!(source = %self.source.describe(), routes = db.routes.len(), "database loaded");

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.last_check = Some(Instant::now());
        state.last_modified = modified;
        Ok(SnapshotStore::new(db))
    }

    /// Record a check attempt if the interval has elapsed.
    fn check_due(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let due = state
            .last_check
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            state.last_check = Some(now);
        }
        due
    }

    fn is_newer(&self, modified: Option<SystemTime>) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match (state.last_modified, modified) {
            (Some(known), Some(seen)) => seen > known,
            // No stamp to compare against: reload to be safe.
            _ => true,
        }
    }

    fn remember(&self, modified: Option<SystemTime>) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_modified = modified;
    }
}
