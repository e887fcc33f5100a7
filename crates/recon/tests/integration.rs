use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use apptopo_recon::config::RunConfig;
use apptopo_recon::model::PlatformId;
use apptopo_recon::reconcile::PlannedAction;
use apptopo_recon::{
    sync, CsvSource, IpSet, PlatformClient, PlatformError, PlatformVm, ReconError, RunReport,
    SourceError, SyncOptions, TopologyDefinition, TopologyPayload,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

// -------------------------------------------------------------------------
// Test doubles
// -------------------------------------------------------------------------

/// Serves files from the fixtures directory.
struct FixtureSource;

impl CsvSource for FixtureSource {
    fn fetch_bytes(&self, filename: &str) -> Result<Vec<u8>, SourceError> {
        std::fs::read(fixtures_dir().join(filename)).map_err(|_| SourceError::NotFound(filename.into()))
    }

    fn describe(&self) -> String {
        "fixtures".into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Write {
    Create(TopologyPayload),
    Update(PlatformId, TopologyPayload),
}

#[derive(Default)]
struct FakePlatform {
    vms: Vec<PlatformVm>,
    definitions: Vec<TopologyDefinition>,
    /// Any bulk window containing one of these fails with a 500.
    poison: HashSet<String>,
    /// Single fetches for these fail with a 500.
    broken: HashSet<String>,
    /// Creates for these application names fail with a 500.
    rejected: HashSet<String>,
    writes: RefCell<Vec<Write>>,
    single_calls: RefCell<usize>,
}

impl FakePlatform {
    fn with_vms(vms: &[(&str, &str, &str)]) -> Self {
        Self {
            vms: vms
                .iter()
                .map(|(id, name, ips)| PlatformVm {
                    platform_id: id.to_string(),
                    display_name: name.to_string(),
                    ip_addresses: IpSet::from_text(ips),
                })
                .collect(),
            ..Self::default()
        }
    }

    fn writes(&self) -> Vec<Write> {
        self.writes.borrow().clone()
    }
}

impl PlatformClient for FakePlatform {
    fn list_vm_ids(&self) -> Result<Vec<PlatformId>, PlatformError> {
        Ok(self.vms.iter().map(|v| v.platform_id.clone()).collect())
    }

    fn get_vm_details_bulk(&self, ids: &[PlatformId]) -> Result<Vec<PlatformVm>, PlatformError> {
        if ids.iter().any(|id| self.poison.contains(id)) {
            return Err(PlatformError::Server { status: 500, body: "Internal Server Error".into() });
        }
        Ok(self.vms.iter().filter(|v| ids.contains(&v.platform_id)).cloned().collect())
    }

    fn get_vm_details_single(&self, id: &str) -> Result<PlatformVm, PlatformError> {
        *self.single_calls.borrow_mut() += 1;
        if self.broken.contains(id) {
            return Err(PlatformError::Server { status: 500, body: "Internal Server Error".into() });
        }
        self.vms
            .iter()
            .find(|v| v.platform_id == id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(id.into()))
    }

    fn list_topology_definitions(&self) -> Result<Vec<TopologyDefinition>, PlatformError> {
        Ok(self.definitions.clone())
    }

    fn create_topology_definition(
        &self,
        payload: &TopologyPayload,
    ) -> Result<Option<PlatformId>, PlatformError> {
        if self.rejected.contains(&payload.display_name) {
            return Err(PlatformError::Server { status: 500, body: "Internal Server Error".into() });
        }
        self.writes.borrow_mut().push(Write::Create(payload.clone()));
        Ok(Some(format!("td-{}", payload.display_name)))
    }

    fn update_topology_definition(
        &self,
        id: &str,
        payload: &TopologyPayload,
    ) -> Result<Option<PlatformId>, PlatformError> {
        self.writes.borrow_mut().push(Write::Update(id.into(), payload.clone()));
        Ok(Some(id.into()))
    }
}

fn config(json: &str) -> RunConfig {
    RunConfig::from_json(json).unwrap()
}

fn run(config: &RunConfig, platform: &FakePlatform, dry_run: bool) -> Result<RunReport, ReconError> {
    sync(
        config,
        &FixtureSource,
        platform,
        &AtomicBool::new(false),
        &SyncOptions { dry_run },
    )
}

const APPS_CONFIG: &str = r#"{"INPUT_CSV_NAME": "apps.csv", "CSV_LOCATION": "LOCAL", "MATCH_IP": true}"#;

// -------------------------------------------------------------------------
// End-to-end
// -------------------------------------------------------------------------

#[test]
fn creates_application_from_matched_members() {
    let platform = FakePlatform::with_vms(&[("u1", "vm1", "10.0.0.1"), ("u2", "vm2", "9.9.9.9")]);
    let report = run(&config(APPS_CONFIG), &platform, false).unwrap();

    assert_eq!(report.ingest.rows, 3);
    assert_eq!(report.ingest.skipped_rows, 1);
    assert_eq!(report.matching.matched, 1);
    assert_eq!(report.matching.unmatched, 1);

    let writes = platform.writes();
    assert_eq!(writes.len(), 1);
    match &writes[0] {
        Write::Create(payload) => {
            assert_eq!(payload.display_name, "AppA");
            assert_eq!(payload.entity_type, "BusinessApplication");
            assert_eq!(payload.static_connections(), ["u1".to_string()]);
        }
        other => panic!("expected create, got {other:?}"),
    }

    let reconcile = report.reconcile.unwrap();
    assert_eq!(reconcile.created, vec!["AppA".to_string()]);
    assert_eq!(reconcile.pruned_members, 1);
}

#[test]
fn existing_definition_is_updated_not_created() {
    let mut platform = FakePlatform::with_vms(&[("u1", "vm1", "10.0.0.1")]);
    platform.definitions = vec![
        TopologyDefinition { display_name: "Unrelated".into(), platform_id: "td-0".into() },
        TopologyDefinition { display_name: "AppA".into(), platform_id: "td-7".into() },
    ];

    run(&config(APPS_CONFIG), &platform, false).unwrap();

    let writes = platform.writes();
    assert_eq!(writes.len(), 1);
    match &writes[0] {
        Write::Update(id, payload) => {
            assert_eq!(id, "td-7");
            assert_eq!(payload.static_connections(), ["u1".to_string()]);
        }
        other => panic!("expected update, got {other:?}"),
    }
}

#[test]
fn dry_run_plans_without_writing() {
    let platform = FakePlatform::with_vms(&[("u1", "vm1", "10.0.0.1")]);
    let report = run(&config(APPS_CONFIG), &platform, true).unwrap();

    assert!(platform.writes().is_empty());
    assert!(report.reconcile.is_none());
    assert!(report.meta.dry_run);
    assert!(matches!(&report.actions[..], [PlannedAction::Create { application, .. }] if application == "AppA"));
}

#[test]
fn no_matches_means_no_writes() {
    let platform = FakePlatform::with_vms(&[("u9", "elsewhere", "10.0.0.1")]);
    let report = run(&config(APPS_CONFIG), &platform, false).unwrap();

    assert!(platform.writes().is_empty());
    assert_eq!(report.reconcile.unwrap().skipped, vec!["AppA".to_string()]);
}

// -------------------------------------------------------------------------
// Inventory fallback
// -------------------------------------------------------------------------

#[test]
fn bulk_window_failure_falls_back_per_vm() {
    let mut platform = FakePlatform::with_vms(&[
        ("u1", "vm1", "10.0.0.1"),
        ("u2", "vm2", "10.0.0.2"),
        ("u3", "vm3", "10.0.0.3"),
    ]);
    platform.poison.insert("u2".into());
    platform.broken.insert("u3".into());

    let cfg = config(
        r#"{"INPUT_CSV_NAME": "apps.csv", "CSV_LOCATION": "LOCAL", "PAGE_SIZE": 2}"#,
    );
    let report = run(&cfg, &platform, false).unwrap();

    // Window [u1,u2] falls back and both succeed individually. Window [u3]
    // succeeds in bulk, so its broken single fetch is never tried.
    assert_eq!(report.inventory.windows, 2);
    assert_eq!(report.inventory.fallback_windows, 1);
    assert_eq!(*platform.single_calls.borrow(), 2);
    assert_eq!(report.inventory.vms_fetched, 3);
    assert!(report.inventory.skipped_ids.is_empty());

    match &platform.writes()[0] {
        Write::Create(payload) => {
            assert_eq!(payload.static_connections(), ["u1".to_string(), "u2".to_string()]);
        }
        other => panic!("expected create, got {other:?}"),
    }
}

#[test]
fn vm_failing_individually_is_skipped() {
    let mut platform = FakePlatform::with_vms(&[("u1", "vm1", "10.0.0.1"), ("u2", "vm2", "10.0.0.2")]);
    platform.poison.insert("u1".into());
    platform.broken.insert("u1".into());

    let report = run(&config(APPS_CONFIG), &platform, false).unwrap();

    assert_eq!(report.inventory.skipped_ids, vec!["u1".to_string()]);
    match &platform.writes()[0] {
        Write::Create(payload) => assert_eq!(payload.static_connections(), ["u2".to_string()]),
        other => panic!("expected create, got {other:?}"),
    }
}

// -------------------------------------------------------------------------
// Field maps, prefixes, name-only matching
// -------------------------------------------------------------------------

#[test]
fn custom_columns_with_prefix_and_name_only() {
    let cfg = config(
        r#"{
            "INPUT_CSV_NAME": "estate.csv",
            "CSV_LOCATION": "local",
            "ENTITY_FIELD_MAP": {"app_name": "Application", "entity_name": "Server", "entity_ip": "Addresses"},
            "MATCH_IP": false,
            "APP_PREFIX": "ACME-"
        }"#,
    );
    let mut platform = FakePlatform::with_vms(&[
        ("w1", "BILL-WEB-01", "172.16.0.1"),
        ("d1", "bill-db-01", "10.1.0.21"),
        ("b1", "bill-batch-01", ""),
        ("p1", "pay-app-01", "10.2.0.5"),
    ]);
    platform.definitions =
        vec![TopologyDefinition { display_name: "ACME-Payroll".into(), platform_id: "td-pay".into() }];

    let report = run(&cfg, &platform, false).unwrap();

    assert_eq!(report.ingest.applications, 3);
    assert_eq!(report.ingest.members_without_address, 1);

    let reconcile = report.reconcile.unwrap();
    assert_eq!(reconcile.created, vec!["ACME-Billing".to_string()]);
    assert_eq!(reconcile.updated, vec!["ACME-Payroll".to_string()]);
    assert_eq!(reconcile.skipped, vec!["ACME-Retired".to_string()]);

    let writes = platform.writes();
    let billing = writes
        .iter()
        .find_map(|w| match w {
            Write::Create(p) if p.display_name == "ACME-Billing" => Some(p),
            _ => None,
        })
        .unwrap();
    // Name-only: web matches despite the address mismatch; both db rows resolve to d1
    assert_eq!(
        billing.static_connections(),
        ["b1".to_string(), "d1".to_string(), "w1".to_string()]
    );
}

#[test]
fn name_and_ip_rejects_address_mismatch() {
    let cfg = config(
        r#"{
            "INPUT_CSV_NAME": "estate.csv",
            "CSV_LOCATION": "LOCAL",
            "ENTITY_FIELD_MAP": {"app_name": "Application", "entity_name": "Server", "entity_ip": "Addresses"}
        }"#,
    );
    let platform = FakePlatform::with_vms(&[
        ("w1", "bill-web-01", "172.16.0.1"),
        ("w2", "bill-web-01", "10.1.0.12"),
    ]);

    let report = run(&cfg, &platform, false).unwrap();

    assert_eq!(report.matching.ambiguous, 0);
    match &platform.writes()[0] {
        Write::Create(p) => assert_eq!(p.static_connections(), ["w2".to_string()]),
        other => panic!("expected create, got {other:?}"),
    }
}

#[test]
fn blank_member_name_never_matches_nameless_vm() {
    let cfg = config(
        r#"{"INPUT_CSV_NAME": "blank_member.csv", "CSV_LOCATION": "LOCAL", "MATCH_IP": false}"#,
    );
    let platform = FakePlatform::with_vms(&[("u-nameless", "", ""), ("u1", "vm1", "10.0.0.1")]);

    let report = run(&cfg, &platform, false).unwrap();

    assert_eq!(report.ingest.rows_without_member, 1);
    assert_eq!(report.matching.members, 1);
    assert_eq!(report.matching.matched, 1);
    match &platform.writes()[..] {
        [Write::Create(p)] => assert_eq!(p.static_connections(), ["u1".to_string()]),
        other => panic!("expected one create, got {other:?}"),
    }
}

// -------------------------------------------------------------------------
// Failures
// -------------------------------------------------------------------------

#[test]
fn failed_write_aborts_and_keeps_earlier_writes() {
    let cfg = config(
        r#"{
            "INPUT_CSV_NAME": "estate.csv",
            "CSV_LOCATION": "LOCAL",
            "ENTITY_FIELD_MAP": {"app_name": "Application", "entity_name": "Server", "entity_ip": "Addresses"},
            "MATCH_IP": false
        }"#,
    );
    let mut platform = FakePlatform::with_vms(&[
        ("w1", "bill-web-01", "172.16.0.1"),
        ("p1", "pay-app-01", "10.2.0.5"),
    ]);
    platform.rejected.insert("Payroll".into());

    let err = run(&cfg, &platform, false).unwrap_err();

    assert!(matches!(err, ReconError::Platform(PlatformError::Server { status: 500, .. })));
    match &platform.writes()[..] {
        [Write::Create(p)] => assert_eq!(p.display_name, "Billing"),
        other => panic!("expected only the Billing create, got {other:?}"),
    }
}

#[test]
fn wrong_field_map_aborts_before_platform_calls() {
    // estate.csv has no app_name column
    let cfg = config(r#"{"INPUT_CSV_NAME": "estate.csv", "CSV_LOCATION": "LOCAL"}"#);
    let platform = FakePlatform::with_vms(&[("u1", "vm1", "10.0.0.1")]);

    let err = run(&cfg, &platform, false).unwrap_err();
    assert!(matches!(err, ReconError::MissingColumn { row: 2, ref column } if column == "app_name"));
    assert!(platform.writes().is_empty());
}

#[test]
fn missing_csv_exhausts_retries() {
    let mut cfg = config(r#"{"INPUT_CSV_NAME": "not-there.csv", "CSV_LOCATION": "LOCAL"}"#);
    cfg.retry.interval = Duration::ZERO;
    cfg.retry.max_attempts = 2;

    let err = run(&cfg, &FakePlatform::default(), false).unwrap_err();
    assert!(matches!(err, ReconError::SourceExhausted { attempts: 2, .. }));
}
