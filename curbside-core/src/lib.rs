//! Core types and service wiring for the curbside trash and recycling calendar.

/// Per-town configuration.
pub mod config;
/// Snapshot assembly from parsed records and overrides.
pub mod database;
/// Domain models shared by every crate.
pub mod model;
/// Street-name canonicalization.
pub mod normalize;
/// Declarative corrections to parsed data.
pub mod overrides;
/// Registry of configured towns.
pub mod plugin;
/// Traits describing snapshot backends.
pub mod ports;
/// Street and house number to collection route.
pub mod resolver;
/// Recurring pickup date generation.
pub mod schedule;
/// High-level service facade used by clients.
pub mod service;
/// Atomically replaceable snapshots.
pub mod snapshot;

pub use config::*;
pub use database::*;
pub use model::*;
pub use normalize::*;
pub use overrides::*;
pub use plugin::*;
pub use ports::*;
pub use resolver::*;
pub use schedule::*;
pub use service::*;
pub use snapshot::*;
