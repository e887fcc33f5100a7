//! Platform credentials from the environment.
//!
//! `TURBO_ADDRESS`, `TURBO_USERNAME` and `TURBO_PASSWORD` are required.
//! `TURBO_INSECURE_TLS` set to `1`/`true` disables certificate checks for
//! appliances with self-signed certificates.

/// Login credentials and endpoint for one platform instance.
#[derive(Clone)]
pub struct PlatformCredentials {
    /// Scheme + host (+ port), no trailing slash.
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub insecure_tls: bool,
}

impl std::fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCredentials")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}

impl PlatformCredentials {
    pub fn new(address: &str, username: &str, password: &str) -> Self {
        Self {
            base_url: normalize_address(address),
            username: username.to_string(),
            password: password.to_string(),
            insecure_tls: false,
        }
    }

    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through `lookup` (env-like key → value).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| format!("missing platform credential: set {key}"))
        };

        let address = required("TURBO_ADDRESS")?;
        let username = required("TURBO_USERNAME")?;
        let password = required("TURBO_PASSWORD")?;

        let mut creds = Self::new(&address, &username, &password);
        creds.insecure_tls = lookup("TURBO_INSECURE_TLS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Ok(creds)
    }
}

/// Bare hosts get `https://`; trailing slashes are dropped.
fn normalize_address(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("https://{address}")
    }
}
