//! `CSV_LOCATION: AWS` — S3 `GetObject` signed with AWS Signature V4.
//!
//! Env: `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_S3_BUCKET`,
//! optional `AWS_SESSION_TOKEN` and `AWS_REGION` (default `us-east-1`).
//! `AWS_S3_ENDPOINT` switches to path-style requests against that endpoint
//! (MinIO, LocalStack, VPC endpoints).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use url::Url;

use apptopo_recon::{CsvSource, SourceError};

use super::{fetch_blob, http_client, object_key, require};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_REGION: &str = "us-east-1";
const SERVICE: &str = "s3";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

pub struct S3Source {
    client: Client,
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
    region: String,
    bucket: String,
    /// Path-style endpoint override.
    endpoint: Option<String>,
    prefix: String,
}

/// Fully signed request parts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignedGet {
    url: String,
    headers: Vec<(String, String)>,
}

impl S3Source {
    pub fn from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
        prefix: &str,
    ) -> Result<Self, String> {
        let access_key = require(lookup, "AWS_ACCESS_KEY_ID")?;
        let secret_key = require(lookup, "AWS_SECRET_ACCESS_KEY")?;
        let bucket = require(lookup, "AWS_S3_BUCKET")?;
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            client: http_client()?,
            access_key,
            secret_key,
            session_token: optional("AWS_SESSION_TOKEN"),
            region: optional("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            bucket,
            endpoint: optional("AWS_S3_ENDPOINT").map(|e| e.trim_end_matches('/').to_string()),
            prefix: prefix.to_string(),
        })
    }

    /// Request URL and the canonical URI that gets signed.
    fn locate(&self, key: &str) -> Result<(Url, String), String> {
        let encoded_key = uri_encode_path(key);
        let (base, canonical_uri) = match &self.endpoint {
            Some(endpoint) => (
                endpoint.clone(),
                format!("/{}/{}", self.bucket, encoded_key),
            ),
            None => (
                format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
                format!("/{encoded_key}"),
            ),
        };
        let url = Url::parse(&format!("{base}{canonical_uri}"))
            .map_err(|e| format!("invalid S3 URL for {key}: {e}"))?;
        Ok((url, canonical_uri))
    }

    fn sign_get(&self, key: &str, now: DateTime<Utc>) -> Result<SignedGet, String> {
        let (url, canonical_uri) = self.locate(key)?;
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(format!("S3 URL {url} has no host")),
        };

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let payload_hash = hex_sha256(b"");

        // Canonical headers must be sorted by name
        let mut headers = vec![
            ("host".to_string(), host),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = &self.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let canonical_headers: String =
            headers.iter().map(|(k, v)| format!("{k}:{}\n", v.trim())).collect();
        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "GET\n{canonical_uri}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );

        let scope = format!("{date_stamp}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(&self.secret_key, &date_stamp, &self.region, SERVICE);
        let signature = to_hex(&hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        );

        // reqwest sets Host from the URL
        let mut out: Vec<(String, String)> =
            headers.into_iter().filter(|(k, _)| k != "host").collect();
        out.push(("authorization".to_string(), authorization));

        Ok(SignedGet {
            url: url.to_string(),
            headers: out,
        })
    }
}

impl CsvSource for S3Source {
    fn fetch_bytes(&self, filename: &str) -> Result<Vec<u8>, SourceError> {
        let key = object_key(&self.prefix, filename);
        let what = format!("s3://{}/{}", self.bucket, key);

        let signed = self
            .sign_get(&key, Utc::now())
            .map_err(SourceError::Unavailable)?;

        let mut req = self.client.get(&signed.url);
        for (name, value) in &signed.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        fetch_blob(req, &what)
    }

    fn describe(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("S3 bucket {} at {}", self.bucket, endpoint),
            None => format!("S3 bucket {} ({})", self.bucket, self.region),
        }
    }
}

// ── Signing primitives ──────────────────────────────────────────────

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn derive_signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hex_sha256(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// S3 URI encoding: every byte outside `A-Za-z0-9-_.~` is percent-encoded,
/// except `/` which separates key segments.
fn uri_encode_path(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
