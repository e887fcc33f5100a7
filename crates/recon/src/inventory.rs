//! Platform VM inventory retrieval.
//!
//! Identifiers come from one compact listing, details are requested in
//! fixed-size windows. A window whose bulk call hits a server error is
//! retried one VM at a time; VMs that still fail are skipped. The result is
//! frozen before matching starts.

use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::ReconError;
use crate::model::{PlatformId, PlatformVm};
use crate::platform::PlatformClient;

/// VMs in fetch order. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    vms: Vec<PlatformVm>,
}

impl Inventory {
    pub fn len(&self) -> usize {
        self.vms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vms.is_empty()
    }

    pub fn as_slice(&self) -> &[PlatformVm] {
        &self.vms
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformVm> {
        self.vms.iter()
    }
}

impl From<Vec<PlatformVm>> for Inventory {
    fn from(vms: Vec<PlatformVm>) -> Self {
        Self { vms }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub ids_listed: usize,
    pub vms_fetched: usize,
    pub windows: usize,
    /// Windows whose bulk call failed and were fetched per VM.
    pub fallback_windows: usize,
    /// VMs whose individual fetch also failed.
    pub skipped_ids: Vec<PlatformId>,
}

/// Fetch every VM's name and addresses, `page_size` VMs per bulk call.
pub fn fetch_inventory(
    client: &dyn PlatformClient,
    page_size: usize,
) -> Result<(Inventory, FetchReport), ReconError> {
    let page_size = page_size.max(1);
    let ids = client.list_vm_ids()?;
    let total = ids.len();

    let mut report = FetchReport {
        ids_listed: total,
        ..FetchReport::default()
    };
    let mut vms = Vec::with_capacity(total);

    for (window_index, window) in ids.chunks(page_size).enumerate() {
        let start = window_index * page_size;
        let end = start + window.len();
        debug!("getting VMs between {start} and {end}, out of a total {total}");
        report.windows += 1;

        match client.get_vm_details_bulk(window) {
            Ok(details) => vms.extend(details),
            Err(e) if e.is_server_error() => {
                error!("problem retrieving bulk VM information for VMs {start}..{end}, trying individual VMs: {e}");
                report.fallback_windows += 1;
                fetch_individually(client, window, start, &mut vms, &mut report.skipped_ids)?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    report.vms_fetched = vms.len();
    info!(
        listed = report.ids_listed,
        fetched = report.vms_fetched,
        skipped = report.skipped_ids.len(),
        "fetched platform VM inventory"
    );

    Ok((Inventory::from(vms), report))
}

fn fetch_individually(
    client: &dyn PlatformClient,
    window: &[PlatformId],
    offset: usize,
    vms: &mut Vec<PlatformVm>,
    skipped: &mut Vec<PlatformId>,
) -> Result<(), ReconError> {
    for (i, id) in window.iter().enumerate() {
        debug!("processing VM {}", offset + i);
        match client.get_vm_details_single(id) {
            Ok(vm) => vms.push(vm),
            Err(e) if e.is_item_recoverable() => {
                error!("error getting details for VM with UUID {id}, skipping: {e}");
                skipped.push(id.clone());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
