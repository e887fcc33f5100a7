//! `apptopo-recon` — application topology matching and reconciliation engine.
//!
//! Pure engine crate: turns CSV rows into applications, matches their members
//! against the platform's VM inventory and decides create vs. update for each
//! BusinessApplication. All I/O goes through the [`CsvSource`] and
//! [`PlatformClient`] traits; no HTTP or CLI dependencies.

pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod inventory;
pub mod ipset;
pub mod matcher;
pub mod model;
pub mod platform;
pub mod reconcile;
pub mod source;

pub use config::{CsvLocation, FieldMap, RunConfig};
pub use engine::{sync, RunReport, SyncOptions};
pub use error::ReconError;
pub use ipset::IpSet;
pub use model::{Application, Member, PlatformVm, TopologyDefinition, TopologyPayload};
pub use platform::{PlatformClient, PlatformError};
pub use source::{CsvSource, RetryPolicy, SourceError};
