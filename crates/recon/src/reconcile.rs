//! Create-vs-update decisions against existing topology definitions.
//!
//! [`plan`] is pure; [`apply`] performs the writes in plan order and stops at
//! the first failure. Writes already made stay committed.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ReconError;
use crate::ingest::Applications;
use crate::model::{PlatformId, TopologyDefinition, TopologyPayload};
use crate::platform::PlatformClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    Skip {
        application: String,
        reason: String,
    },
    Create {
        application: String,
        payload: TopologyPayload,
        /// Unmatched members dropped before submission.
        pruned: usize,
    },
    Update {
        application: String,
        definition_id: PlatformId,
        payload: TopologyPayload,
        pruned: usize,
    },
}

impl PlannedAction {
    pub fn application(&self) -> &str {
        match self {
            Self::Skip { application, .. }
            | Self::Create { application, .. }
            | Self::Update { application, .. } => application,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub pruned_members: usize,
}

/// Definition name → id. On duplicate names the first definition listed wins.
pub fn existing_index(definitions: &[TopologyDefinition]) -> HashMap<&str, &PlatformId> {
    let mut index = HashMap::with_capacity(definitions.len());
    for def in definitions {
        if index.contains_key(def.display_name.as_str()) {
            warn!(
                name = %def.display_name,
                uuid = %def.platform_id,
                "duplicate topology definition name on platform, keeping the first"
            );
            continue;
        }
        index.insert(def.display_name.as_str(), &def.platform_id);
    }
    index
}

/// Decide one action per application. Consumes the applications: each is
/// pruned and turned into at most one payload.
pub fn plan(apps: Applications, existing: &[TopologyDefinition]) -> Vec<PlannedAction> {
    let index = existing_index(existing);
    let mut actions = Vec::with_capacity(apps.len());

    for (name, mut app) in apps {
        if !app.has_matches() {
            info!(application = %name, "no matched VMs, skipping application");
            actions.push(PlannedAction::Skip {
                application: name,
                reason: "no members matched a platform VM".into(),
            });
            continue;
        }

        let pruned = app.prune_unmatched();
        if pruned > 0 {
            debug!(application = %name, pruned, "dropped unmatched members");
        }
        let payload = app.to_topology_payload();

        match index.get(name.as_str()) {
            Some(&id) => actions.push(PlannedAction::Update {
                application: name,
                definition_id: id.clone(),
                payload,
                pruned,
            }),
            None => actions.push(PlannedAction::Create {
                application: name,
                payload,
                pruned,
            }),
        }
    }

    actions
}

/// Execute the planned writes in order.
pub fn apply(
    client: &dyn PlatformClient,
    actions: &[PlannedAction],
) -> Result<ReconcileReport, ReconError> {
    let mut report = ReconcileReport::default();

    for action in actions {
        match action {
            PlannedAction::Skip { application, .. } => {
                report.skipped.push(application.clone());
            }
            PlannedAction::Create { application, payload, pruned } => {
                info!(
                    application = %application,
                    vms = payload.static_connections().len(),
                    "creating application"
                );
                let id = client.create_topology_definition(payload)?;
                debug!(application = %application, uuid = ?id, "created");
                report.created.push(application.clone());
                report.pruned_members += pruned;
            }
            PlannedAction::Update { application, definition_id, payload, pruned } => {
                info!(
                    application = %application,
                    uuid = %definition_id,
                    vms = payload.static_connections().len(),
                    "application already exists, updating"
                );
                client.update_topology_definition(definition_id, payload)?;
                report.updated.push(application.clone());
                report.pruned_members += pruned;
            }
        }
    }

    info!(
        created = report.created.len(),
        updated = report.updated.len(),
        skipped = report.skipped.len(),
        "reconciliation complete"
    );
    Ok(report)
}
