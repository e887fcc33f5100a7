//! `CSV_LOCATION: AZURE` — Azure Blob Storage, authorized by a SAS token.
//!
//! Env: `AZURE_STORAGE_ACCOUNT`, `AZURE_STORAGE_CONTAINER`,
//! `AZURE_STORAGE_SAS_TOKEN`. `AZURE_BLOB_ENDPOINT` replaces the default
//! `https://<account>.blob.core.windows.net` (sovereign clouds, Azurite).

use apptopo_recon::{CsvSource, SourceError};
use reqwest::blocking::Client;

use super::{fetch_blob, http_client, object_key, require};

const API_VERSION: &str = "2021-08-06";

pub struct AzureBlobSource {
    client: Client,
    endpoint: String,
    container: String,
    sas_token: String,
    prefix: String,
}

impl AzureBlobSource {
    pub fn from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
        prefix: &str,
    ) -> Result<Self, String> {
        let account = require(lookup, "AZURE_STORAGE_ACCOUNT")?;
        let container = require(lookup, "AZURE_STORAGE_CONTAINER")?;
        let sas_token = require(lookup, "AZURE_STORAGE_SAS_TOKEN")?;

        let endpoint = lookup("AZURE_BLOB_ENDPOINT")
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("https://{account}.blob.core.windows.net"));

        Ok(Self {
            client: http_client()?,
            endpoint,
            container,
            sas_token: sas_token.trim_start_matches('?').to_string(),
            prefix: prefix.to_string(),
        })
    }

    fn blob_url(&self, filename: &str) -> String {
        format!(
            "{}/{}/{}?{}",
            self.endpoint,
            self.container,
            object_key(&self.prefix, filename),
            self.sas_token
        )
    }
}

impl CsvSource for AzureBlobSource {
    fn fetch_bytes(&self, filename: &str) -> Result<Vec<u8>, SourceError> {
        let what = format!("azure://{}/{}", self.container, object_key(&self.prefix, filename));
        let req = self
            .client
            .get(self.blob_url(filename))
            .header("x-ms-version", API_VERSION);
        fetch_blob(req, &what)
    }

    fn describe(&self) -> String {
        format!("Azure container {} at {}", self.container, self.endpoint)
    }
}
