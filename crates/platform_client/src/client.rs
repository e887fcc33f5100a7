//! Platform HTTP client.
//!
//! Blocking reqwest client (no Tokio runtime required). One login per
//! client; the session cookie rides along on every later call.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, info};

use apptopo_recon::model::PlatformId;
use apptopo_recon::{
    IpSet, PlatformClient, PlatformError, PlatformVm, TopologyDefinition, TopologyPayload,
};

use crate::auth::PlatformCredentials;

pub const API_PREFIX: &str = "/api/v3";

const VM_TYPE: &str = "VirtualMachine";
const VM_ASPECT: &str = "virtualMachineAspect";
const CURSOR_HEADER: &str = "x-next-cursor";

/// Logged-in platform session (blocking).
pub struct PlatformApi {
    http: Client,
    base_url: String,
}

impl PlatformApi {
    /// Build a client and log in.
    pub fn connect(creds: &PlatformCredentials) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .user_agent(format!("apptopo/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .cookie_store(true)
            .danger_accept_invalid_certs(creds.insecure_tls)
            .build()
            .map_err(|e| PlatformError::Network(format!("cannot build HTTP client: {e}")))?;

        let api = Self {
            http,
            base_url: creds.base_url.clone(),
        };
        api.login(&creds.username, &creds.password)?;
        Ok(api)
    }

    fn login(&self, username: &str, password: &str) -> Result<(), PlatformError> {
        info!(platform = %self.base_url, user = %username, "logging in");
        let url = self.url("/login");
        self.send(
            self.http
                .post(&url)
                .form(&[("username", username), ("password", password)]),
        )?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, req: RequestBuilder) -> Result<Response, PlatformError> {
        let response = req
            .send()
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, body));
        }

        Ok(response)
    }

    fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, PlatformError> {
        let resp = self.send(self.http.get(url).query(query))?;
        resp.json().map_err(|e| PlatformError::Parse(e.to_string()))
    }

    /// Write call; the response body is optional JSON carrying the definition uuid.
    fn write_definition(&self, req: RequestBuilder) -> Result<Option<PlatformId>, PlatformError> {
        let resp = self.send(req)?;
        let text = resp.text().unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(None);
        }
        let json: Value =
            serde_json::from_str(&text).map_err(|e| PlatformError::Parse(e.to_string()))?;
        Ok(single_object(&json)
            .and_then(|o| o.get("uuid"))
            .and_then(Value::as_str)
            .map(String::from))
    }
}

impl PlatformClient for PlatformApi {
    fn list_vm_ids(&self) -> Result<Vec<PlatformId>, PlatformError> {
        let url = self.url("/search");
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("types", VM_TYPE), ("detail_type", "compact")];
            if let Some(ref c) = cursor {
                query.push(("cursor", c.as_str()));
            }

            let resp = self.send(self.http.get(&url).query(&query))?;
            let next = resp
                .headers()
                .get(CURSOR_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            let json: Value = resp.json().map_err(|e| PlatformError::Parse(e.to_string()))?;

            let page = json
                .as_array()
                .ok_or_else(|| PlatformError::Parse("search response is not an array".into()))?;
            ids.extend(page.iter().filter_map(|e| e["uuid"].as_str().map(String::from)));

            match next {
                Some(n) if cursor.as_deref() != Some(n.as_str()) => {
                    debug!(cursor = %n, so_far = ids.len(), "following search cursor");
                    cursor = Some(n);
                }
                _ => break,
            }
        }

        info!(vms = ids.len(), "listed VM identifiers");
        Ok(ids)
    }

    fn get_vm_details_bulk(&self, ids: &[PlatformId]) -> Result<Vec<PlatformVm>, PlatformError> {
        let url = self.url("/supplychains");
        let uuids = ids.join(",");
        let json = self.get_json(
            &url,
            &[
                ("uuids", uuids.as_str()),
                ("types", VM_TYPE),
                ("detail_type", "aspects"),
                ("aspect_names", VM_ASPECT),
            ],
        )?;

        let Some(instances) = single_object(&json)
            .and_then(|o| o.get("seMap"))
            .and_then(|m| m[VM_TYPE]["instances"].as_object())
        else {
            debug!(requested = ids.len(), "supply chain has no VirtualMachine instances");
            return Ok(Vec::new());
        };

        Ok(instances.values().filter_map(parse_vm).collect())
    }

    fn get_vm_details_single(&self, id: &str) -> Result<PlatformVm, PlatformError> {
        let url = self.url(&format!("/entities/{id}"));
        let json = self.get_json(&url, &[("include_aspects", "true")])?;
        single_object(&json)
            .and_then(parse_vm)
            .ok_or_else(|| PlatformError::Parse(format!("entity {id}: no uuid or display name in response")))
    }

    fn list_topology_definitions(&self) -> Result<Vec<TopologyDefinition>, PlatformError> {
        let json = self.get_json(&self.url("/topologydefinitions"), &[])?;
        let defs = json
            .as_array()
            .ok_or_else(|| PlatformError::Parse("topology definitions response is not an array".into()))?
            .iter()
            .filter_map(|d| {
                Some(TopologyDefinition {
                    platform_id: d["uuid"].as_str()?.to_string(),
                    display_name: d["displayName"].as_str().unwrap_or_default().to_string(),
                })
            })
            .collect::<Vec<_>>();
        debug!(definitions = defs.len(), "listed topology definitions");
        Ok(defs)
    }

    fn create_topology_definition(
        &self,
        payload: &TopologyPayload,
    ) -> Result<Option<PlatformId>, PlatformError> {
        let url = self.url("/topologydefinitions");
        self.write_definition(self.http.post(&url).json(payload))
    }

    fn update_topology_definition(
        &self,
        id: &str,
        payload: &TopologyPayload,
    ) -> Result<Option<PlatformId>, PlatformError> {
        let url = self.url(&format!("/topologydefinitions/{id}"));
        self.write_definition(self.http.put(&url).json(payload))
    }

    fn target(&self) -> String {
        self.base_url.clone()
    }
}

// ── Free functions ──────────────────────────────────────────────────

/// Map a non-success status to the error kinds the engine reasons about.
pub(crate) fn classify_status(status: u16, body: String) -> PlatformError {
    match status {
        500..=599 => PlatformError::Server { status, body },
        401 | 403 => PlatformError::Auth { status, body },
        404 => PlatformError::NotFound(body),
        _ => PlatformError::Http { status, body },
    }
}

/// Some endpoints wrap a single object in a one-element array.
fn single_object(json: &Value) -> Option<&Value> {
    match json {
        Value::Object(_) => Some(json),
        Value::Array(items) => items.first().filter(|v| v.is_object()),
        _ => None,
    }
}

/// VM entity JSON → `PlatformVm`. Entries without a uuid or display name
/// are dropped; a missing IP aspect means no addresses.
fn parse_vm(entity: &Value) -> Option<PlatformVm> {
    let Some(uuid) = entity["uuid"].as_str() else {
        debug!("dropping VM entry without uuid");
        return None;
    };

    let display_name = match entity["displayName"].as_str().map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => {
            debug!(uuid, "dropping VM entry without displayName");
            return None;
        }
    };

    let ip_addresses = entity["aspects"][VM_ASPECT]["ip"]
        .as_array()
        .map(|ips| IpSet::from_list(ips.iter().filter_map(Value::as_str)))
        .unwrap_or_default();

    Some(PlatformVm {
        platform_id: uuid.to_string(),
        display_name: display_name.to_string(),
        ip_addresses,
    })
}
