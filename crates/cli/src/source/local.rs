//! `CSV_LOCATION: LOCAL` — read the CSV from a directory on this host.

use std::io::ErrorKind;
use std::path::PathBuf;

use apptopo_recon::{CsvSource, SourceError};

pub struct LocalSource {
    dir: PathBuf,
}

impl LocalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl CsvSource for LocalSource {
    fn fetch_bytes(&self, filename: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.dir.join(filename);
        std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SourceError::NotFound(path.display().to_string()),
            _ => SourceError::Unavailable(format!("{}: {e}", path.display())),
        })
    }

    fn describe(&self) -> String {
        format!("local directory {}", self.dir.display())
    }
}
