//! Management platform API client.
//!
//! Implements [`apptopo_recon::PlatformClient`] over the platform's v3 REST
//! API: session login, VM search and supply-chain detail calls, topology
//! definition reads and writes.
//!
//! Blocking, no retries. Failed calls are classified into
//! [`PlatformError`](apptopo_recon::PlatformError) variants and the engine
//! decides what is recoverable.

mod auth;
mod client;

pub use auth::PlatformCredentials;
pub use client::{PlatformApi, API_PREFIX};
