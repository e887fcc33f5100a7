use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ipset::IpSet;

/// Stable identifier the platform assigns to an entity (VM or topology definition).
pub type PlatformId = String;

/// Entity type every topology definition written by this tool carries.
pub const BUSINESS_APPLICATION: &str = "BusinessApplication";

// ---------------------------------------------------------------------------
// Platform snapshots
// ---------------------------------------------------------------------------

/// One VM from the platform inventory. Read-only for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformVm {
    pub platform_id: PlatformId,
    pub display_name: String,
    pub ip_addresses: IpSet,
}

/// An existing topology definition on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyDefinition {
    pub display_name: String,
    pub platform_id: PlatformId,
}

// ---------------------------------------------------------------------------
// Application + members
// ---------------------------------------------------------------------------

/// One CSV-declared (name, addresses) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub name: String,
    pub ip_addresses: IpSet,
    /// Set only by [`Application::record_match`].
    pub platform_id: Option<PlatformId>,
}

impl Member {
    pub fn is_matched(&self) -> bool {
        self.platform_id.is_some()
    }
}

/// Result of [`Application::add_member`]. None of these stop ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOutcome {
    Added,
    /// Kept, but no address could be extracted; only name matching can resolve it.
    AddedWithoutAddress,
    /// Same (name, addresses) already present; first insert wins.
    Duplicate,
}

/// A user-defined application and its candidate members.
///
/// `resolved_ids` always equals the set of `platform_id`s of matched members.
/// Fields are private so the only way to match a member is [`record_match`],
/// which updates both sides together.
///
/// [`record_match`]: Application::record_match
#[derive(Debug, Clone, Serialize)]
pub struct Application {
    name: String,
    members: Vec<Member>,
    resolved_ids: BTreeSet<PlatformId>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            resolved_ids: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn resolved_ids(&self) -> &BTreeSet<PlatformId> {
        &self.resolved_ids
    }

    pub fn has_matches(&self) -> bool {
        !self.resolved_ids.is_empty()
    }

    pub fn add_member(&mut self, name: &str, raw_ips: &str) -> MemberOutcome {
        let ip_addresses = IpSet::from_text(raw_ips);

        if self
            .members
            .iter()
            .any(|m| m.name == name && m.ip_addresses == ip_addresses)
        {
            warn!(
                application = %self.name,
                member = %name,
                "member already exists in application group, ignoring duplicate"
            );
            return MemberOutcome::Duplicate;
        }

        let outcome = if ip_addresses.is_empty() {
            MemberOutcome::AddedWithoutAddress
        } else {
            MemberOutcome::Added
        };

        self.members.push(Member {
            name: name.to_string(),
            ip_addresses,
            platform_id: None,
        });

        outcome
    }

    /// Resolve member `index` to `vm`. The VM's addresses replace the
    /// CSV-supplied ones. Returns false if the index is out of range.
    pub fn record_match(&mut self, index: usize, vm: &PlatformVm) -> bool {
        let Some(member) = self.members.get_mut(index) else {
            return false;
        };
        member.ip_addresses = vm.ip_addresses.clone();
        member.platform_id = Some(vm.platform_id.clone());
        self.resolved_ids.insert(vm.platform_id.clone());
        true
    }

    /// Drop members that never matched. Returns how many were removed.
    pub fn prune_unmatched(&mut self) -> usize {
        let before = self.members.len();
        self.members.retain(Member::is_matched);
        before - self.members.len()
    }

    pub fn to_topology_payload(&self) -> TopologyPayload {
        TopologyPayload::new(&self.name, self.resolved_ids.iter().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

/// Body of a topology definition create/update call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyPayload {
    pub display_name: String,
    pub entity_type: String,
    pub entity_definition_data: EntityDefinitionData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDefinitionData {
    pub manual_connection_data: ManualConnectionData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualConnectionData {
    #[serde(rename = "VirtualMachine")]
    pub virtual_machine: StaticConnections,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticConnections {
    pub static_connections: Vec<PlatformId>,
}

impl TopologyPayload {
    pub fn new(display_name: &str, static_connections: Vec<PlatformId>) -> Self {
        Self {
            display_name: display_name.to_string(),
            entity_type: BUSINESS_APPLICATION.to_string(),
            entity_definition_data: EntityDefinitionData {
                manual_connection_data: ManualConnectionData {
                    virtual_machine: StaticConnections { static_connections },
                },
            },
        }
    }

    pub fn static_connections(&self) -> &[PlatformId] {
        &self
            .entity_definition_data
            .manual_connection_data
            .virtual_machine
            .static_connections
    }
}
