//! Canonical IPv4 address sets extracted from free-form text.
//!
//! Addresses are recognized by shape only (`\d{1,3}` x 4, dot separated).
//! Octets are not range checked, so `999.1.1.1` is kept as written.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn ipv4_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").expect("IPv4 pattern is valid")
    })
}

/// Ordered, deduplicated set of dotted-quad strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpSet(BTreeSet<String>);

impl IpSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract every address-shaped substring of `text`.
    pub fn from_text(text: &str) -> Self {
        let mut set = Self::new();
        set.extend_from_text(text);
        set
    }

    /// Extract addresses from each element of a list. Elements may themselves
    /// hold several addresses or surrounding noise.
    pub fn from_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for item in items {
            set.extend_from_text(item.as_ref());
        }
        set
    }

    fn extend_from_text(&mut self, text: &str) {
        for m in ipv4_pattern().find_iter(text) {
            self.0.insert(m.as_str().to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.0.contains(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True when the two sets share at least one address.
    pub fn intersects(&self, other: &IpSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.0.iter().any(|a| large.0.contains(a))
    }
}

/// Comma-joined canonical form, e.g. `10.0.0.1,10.0.0.2`.
impl fmt::Display for IpSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for addr in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(addr)?;
            first = false;
        }
        Ok(())
    }
}
