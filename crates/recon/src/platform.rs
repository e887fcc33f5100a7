//! The management-platform capability the engine drives.
//!
//! Transport, auth and session handling belong to the implementor
//! (see the `apptopo-platform` crate); the engine only sees these calls
//! and the error classification below.

use thiserror::Error;

use crate::model::{PlatformId, PlatformVm, TopologyDefinition, TopologyPayload};

#[derive(Debug, Error)]
pub enum PlatformError {
    /// Remote server error (5xx).
    #[error("platform server error ({status}): {body}")]
    Server { status: u16, body: String },
    /// Credentials rejected (401/403).
    #[error("platform authentication failed ({status}): {body}")]
    Auth { status: u16, body: String },
    /// Entity does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),
    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Connection, TLS or timeout failure.
    #[error("network error: {0}")]
    Network(String),
    /// Response body was not what we expected.
    #[error("parse error: {0}")]
    Parse(String),
}

impl PlatformError {
    /// Bulk failures of this kind fall back to per-item retrieval.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// A single VM failing this way is skipped rather than aborting the fetch.
    pub fn is_item_recoverable(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::NotFound(_) | Self::Parse(_))
    }
}

pub trait PlatformClient {
    /// All VM identifiers (compact listing).
    fn list_vm_ids(&self) -> Result<Vec<PlatformId>, PlatformError>;

    /// Name + IP details for a window of VMs in one call.
    fn get_vm_details_bulk(&self, ids: &[PlatformId]) -> Result<Vec<PlatformVm>, PlatformError>;

    /// Name + IP details for one VM.
    fn get_vm_details_single(&self, id: &str) -> Result<PlatformVm, PlatformError>;

    fn list_topology_definitions(&self) -> Result<Vec<TopologyDefinition>, PlatformError>;

    /// Returns the new definition's id when the platform reports one.
    fn create_topology_definition(
        &self,
        payload: &TopologyPayload,
    ) -> Result<Option<PlatformId>, PlatformError>;

    /// Replace the static connections of definition `id`.
    fn update_topology_definition(
        &self,
        id: &str,
        payload: &TopologyPayload,
    ) -> Result<Option<PlatformId>, PlatformError>;

    /// Where this client points, for log lines.
    fn target(&self) -> String {
        "platform".to_string()
    }
}
