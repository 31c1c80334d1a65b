//! File-backed town configuration, overrides and database snapshots.
//!
//! A town lives in a directory holding `town.yaml`, optional override files and the
//! generated database JSON. Paths inside `town.yaml` are relative to that directory.

use std::ffi::OsString;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::SystemTime;
use std::{env, fs};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use sha2::{Digest, Sha256};
use tokio::fs as async_fs;
use tracing::{debug, info, warn};

use curbside_core::{
    AliasOverrides, BuildError, BuildOverrides, ConfigError, Database, DatabaseBuilder,
    HolidayOverrides, RouteOverrides, RoutesParseResult, ScheduleParseResult, SnapshotSource,
    SourceError, SourceMeta, TownConfig, TownPlugin,
};

#[derive(thiserror::Error, Debug)]
/// Errors raised while reading or writing town files.
pub enum FileError {
    /// A file could not be read or written.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// A YAML document is malformed or has the wrong shape.
    #[error("Invalid YAML in {}: {source}", .path.display())]
    Yaml {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_yaml::Error,
    },
    /// A JSON document is malformed or has the wrong shape.
    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// The top level of a YAML document is not a mapping.
    #[error("{} must contain a mapping", .0.display())]
    NotMapping(PathBuf),
    /// The town configuration failed validation.
    #[error("Invalid town config {}: {source}", .path.display())]
    Config {
        /// File involved.
        path: PathBuf,
        /// Validation failure.
        source: ConfigError,
    },
    /// The snapshot could not be assembled.
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// A validated town configuration and the directory its relative paths start from.
#[derive(Debug, Clone)]
pub struct TownFiles {
    /// Validated configuration.
    pub config: TownConfig,
    /// Directory containing `town.yaml`.
    pub dir: PathBuf,
}

impl TownFiles {
    /// Absolute-or-relative path to the town's database snapshot.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.dir.join(self.config.database_path())
    }

    /// Load every override file the config names.
    ///
    /// # Errors
    ///
    /// Returns a [`FileError`] when an override file exists but cannot be used.
    pub fn overrides(&self) -> Result<BuildOverrides, FileError> {
        let paths = &self.config.overrides_paths;
        let resolve = |relative: Option<&Path>| relative.map(|path| self.dir.join(path));

        Ok(BuildOverrides {
            aliases: match resolve(paths.street_aliases_yaml.as_deref()) {
                Some(path) => load_alias_overrides(&path)?,
                None => AliasOverrides::default(),
            },
            holidays: match resolve(paths.holiday_overrides_yaml.as_deref()) {
                Some(path) => load_holiday_overrides(&path)?,
                None => HolidayOverrides::default(),
            },
            routes: match resolve(paths.route_overrides_yaml.as_deref()) {
                Some(path) => load_route_overrides(&path)?,
                None => RouteOverrides::default(),
            },
        })
    }
}

/// Read and validate `town.yaml`.
///
/// # Errors
///
/// Returns a [`FileError`] when the file is unreadable, not a YAML mapping, or fails
/// validation.
pub fn load_town_config(path: &Path) -> Result<TownFiles, FileError> {
    let document = read_yaml(path)?.ok_or_else(|| FileError::NotMapping(path.to_path_buf()))?;
    let config: TownConfig = from_yaml(path, document)?;
    config.validate().map_err(|source| FileError::Config {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    debug!(town = %config.town_id, dir = %dir.display(), "town config loaded");
    Ok(TownFiles { config, dir })
}

/// Read a street alias file. A missing or empty file means no aliases.
///
/// # Errors
///
/// Returns a [`FileError`] when the file exists but is not a mapping of names.
pub fn load_alias_overrides(path: &Path) -> Result<AliasOverrides, FileError> {
    load_overrides(path)
}

/// Read a holiday override file. A missing or empty file changes nothing.
///
/// # Errors
///
/// Returns a [`FileError`] when the file exists but is malformed.
pub fn load_holiday_overrides(path: &Path) -> Result<HolidayOverrides, FileError> {
    load_overrides(path)
}

/// Read a route override file. A missing or empty file changes nothing.
///
/// # Errors
///
/// Returns a [`FileError`] when the file exists but is malformed.
pub fn load_route_overrides(path: &Path) -> Result<RouteOverrides, FileError> {
    load_overrides(path)
}

fn load_overrides<T: DeserializeOwned + Default>(path: &Path) -> Result<T, FileError> {
    if !path.exists() {
        debug!(path = %path.display(), "override file absent");
        return Ok(T::default());
    }
    match read_yaml(path)? {
        Some(document) => from_yaml(path, document),
        None => Ok(T::default()),
    }
}

/// Parse a YAML file into a mapping. `None` for an empty document.
fn read_yaml(path: &Path) -> Result<Option<Value>, FileError> {
    let text = fs::read_to_string(path).map_err(|source| FileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: Value = serde_yaml::from_str(&text).map_err(|source| FileError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    match document {
        Value::Null => Ok(None),
        Value::Mapping(_) => Ok(Some(document)),
        _ => Err(FileError::NotMapping(path.to_path_buf())),
    }
}

fn from_yaml<T: DeserializeOwned>(path: &Path, document: Value) -> Result<T, FileError> {
    serde_yaml::from_value(document).map_err(|source| FileError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Database snapshot stored as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    /// Source reading `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<Database, SourceError> {
        let bytes = match async_fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SourceError::Missing(self.describe()));
            }
            Err(err) => return Err(SourceError::Io(err)),
        };
        serde_json::from_slice(&bytes).map_err(|err| SourceError::Format(err.to_string()))
    }

    async fn modified(&self) -> Result<Option<SystemTime>, SourceError> {
        match async_fs::metadata(&self.path).await {
            Ok(metadata) => Ok(metadata.modified().ok()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SourceError::Io(err)),
        }
    }
}

/// Build the plugin bundle for the town configured at `config_path`.
///
/// # Errors
///
/// Returns a [`FileError`] when the town config cannot be loaded.
pub fn plugin(config_path: &Path) -> Result<TownPlugin, FileError> {
    let files = load_town_config(config_path)?;
    let source = Arc::new(FileSnapshotSource::new(files.database_path()));
    Ok(TownPlugin::new(files.config, source))
}

/// Write `db` as pretty JSON, replacing `path` only once the new file is complete.
///
/// # Errors
///
/// Returns a [`FileError`] when the directory or file cannot be written.
pub fn write_database(path: &Path, db: &Database) -> Result<(), FileError> {
    let io_error = |source: io::Error| FileError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let json = serde_json::to_vec_pretty(db).map_err(|source| FileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json).map_err(io_error)?;
    fs::rename(&tmp, path).map_err(io_error)?;

    info!(path = %path.display(), routes = db.routes.len(), "database written");
    Ok(())
}

/// Build a town's database from parser output files.
///
/// `routes_json` and `schedule_json` hold a serialized [`RoutesParseResult`] and
/// [`ScheduleParseResult`]. With `validate_only` nothing is written.
///
/// # Errors
///
/// Returns a [`FileError`] when any input is unreadable or invalid, the build fails,
/// or the output cannot be written.
pub fn build_database_files(
    town_config_path: &Path,
    routes_json: &Path,
    schedule_json: &Path,
    out: &Path,
    validate_only: bool,
) -> Result<Database, FileError> {
    let files = load_town_config(town_config_path)?;
    let overrides = files.overrides()?;

    let (routes, routes_meta): (RoutesParseResult, _) = read_parse_result(routes_json)?;
    let (schedule, schedule_meta): (ScheduleParseResult, _) = read_parse_result(schedule_json)?;

    let db = DatabaseBuilder::new(&files.config)
        .overrides(overrides)
        .source("routes", routes_meta)
        .source("schedule", schedule_meta)
        .git_commit(git_commit())
        .build(routes, schedule)?;

    if validate_only {
        info!(town = %files.config.town_id, "validation passed, nothing written");
    } else {
        write_database(out, &db)?;
    }
    Ok(db)
}

fn read_parse_result<T: DeserializeOwned>(path: &Path) -> Result<(T, SourceMeta), FileError> {
    let bytes = fs::read(path).map_err(|source| FileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = serde_json::from_slice(&bytes).map_err(|source| FileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let meta = SourceMeta {
        url: path.display().to_string(),
        sha256: sha256_hex(&bytes),
        etag: None,
        last_modified: None,
    };
    Ok((parsed, meta))
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// `GIT_COMMIT` from the environment, else `git rev-parse HEAD`.
fn git_commit() -> Option<String> {
    if let Ok(commit) = env::var("GIT_COMMIT")
        && !commit.trim().is_empty()
    {
        return Some(commit.trim().to_owned());
    }
    match Command::new("git").args(["rev-parse", "HEAD"]).output() {
        Ok(output) if output.status.success() => {
            let commit = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            (!commit.is_empty()).then_some(commit)
        }
        Ok(_) => None,
        Err(err) => {
            warn!(%err, "git unavailable, database will carry no commit");
            None
        }
    }
}
