use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ingest::Applications;
use crate::inventory::Inventory;
use crate::model::{Member, PlatformVm};

/// Identity rule for resolving a member to a platform VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Case-insensitive name equality and at least one shared address.
    NameAndIp,
    /// Case-insensitive name equality alone.
    NameOnly,
}

impl MatchStrategy {
    pub fn from_match_ip(match_ip: bool) -> Self {
        if match_ip {
            Self::NameAndIp
        } else {
            Self::NameOnly
        }
    }

    pub fn accepts(&self, member: &Member, vm: &PlatformVm) -> bool {
        if member.name.to_lowercase() != vm.display_name.to_lowercase() {
            return false;
        }
        match self {
            Self::NameOnly => true,
            Self::NameAndIp => member.ip_addresses.intersects(&vm.ip_addresses),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub members: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Members for which more than one VM qualified; the first in fetch order won.
    pub ambiguous: usize,
}

/// Resolve every unmatched member of every application against `inventory`.
///
/// The first qualifying VM in fetch order wins. Further candidates are
/// counted as ambiguity and logged, never used.
pub fn match_applications(
    apps: &mut Applications,
    inventory: &Inventory,
    strategy: MatchStrategy,
) -> MatchReport {
    info!(?strategy, vms = inventory.len(), "matching application members to VMs");

    let index = name_index(inventory);
    let mut report = MatchReport::default();

    for app in apps.values_mut() {
        for i in 0..app.members().len() {
            report.members += 1;
            let member = &app.members()[i];
            if member.is_matched() {
                report.matched += 1;
                continue;
            }

            let candidates: Vec<&PlatformVm> = index
                .get(&member.name.to_lowercase())
                .map(|positions| positions.iter().map(|&p| &inventory.as_slice()[p]))
                .into_iter()
                .flatten()
                .filter(|vm| strategy.accepts(member, vm))
                .collect();

            let Some(chosen) = candidates.first().copied() else {
                debug!(application = %app.name(), member = %member.name, "no matching VM");
                report.unmatched += 1;
                continue;
            };

            if candidates.len() > 1 {
                let others: Vec<&str> = candidates[1..].iter().map(|vm| vm.platform_id.as_str()).collect();
                warn!(
                    application = %app.name(),
                    member = %member.name,
                    chosen = %chosen.platform_id,
                    "ambiguous match, {} other VMs also qualify: {}",
                    others.len(),
                    others.join(", ")
                );
                report.ambiguous += 1;
            }

            debug!(
                application = %app.name(),
                member = %member.name,
                uuid = %chosen.platform_id,
                "found VM"
            );
            app.record_match(i, chosen);
            report.matched += 1;
        }
    }

    info!(
        matched = report.matched,
        unmatched = report.unmatched,
        ambiguous = report.ambiguous,
        "matching complete"
    );
    report
}

/// Lower-cased display name → inventory positions, ascending (fetch order).
fn name_index(inventory: &Inventory) -> HashMap<String, Vec<usize>> {
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (pos, vm) in inventory.iter().enumerate() {
        index.entry(vm.display_name.to_lowercase()).or_default().push(pos);
    }
    index
}
