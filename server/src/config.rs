//! Server configuration.
//!
//! Loaded from YAML; every section has defaults so a partial file (or no
//! file at all) is usable. Selected values can be overridden from the
//! environment with [`ServerConfig::apply_env`].
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! listen:
//!   address: 0.0.0.0:8787
//! database:
//!   path: /var/lib/portal/portal.db
//!   busy_timeout_ms: 5000
//! uploads:
//!   root: /var/lib/portal/uploads
//!   allowed_extensions: [png, jpg, jpeg, webp, svg, pdf]
//!   max_bytes: 10485760
//! session:
//!   cookie_name: portal_session
//!   secret: change-me-to-at-least-32-bytes-of-entropy
//!   ttl_hours: 24
//!   secure: true
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Minimum length of the session signing secret, in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

/// Environment variable overriding [`SessionConfig::secret`].
pub const ENV_SESSION_SECRET: &str = "PORTAL_SESSION_SECRET";
/// Environment variable overriding [`ListenConfig::address`].
pub const ENV_LISTEN: &str = "PORTAL_LISTEN";
/// Environment variable overriding [`DatabaseConfig::path`].
pub const ENV_DB: &str = "PORTAL_DB";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Socket address the HTTP server binds to.
    pub address: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8787".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file. Every request opens its own connection to it.
    pub path: PathBuf,
    /// How long a connection waits on a locked database before the
    /// statement fails with a busy error.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("portal.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Settings for the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory all uploads are written under.
    pub root: PathBuf,
    /// Accepted file extensions, lowercase and without the dot.
    pub allowed_extensions: Vec<String>,
    /// Largest accepted file, in bytes.
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("uploads"),
            allowed_extensions: ["png", "jpg", "jpeg", "gif", "webp", "svg", "avif", "pdf"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Session cookie settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// HMAC signing secret; at least [`MIN_SECRET_BYTES`] long.
    pub secret: String,
    /// Token lifetime.
    pub ttl_hours: i64,
    /// Adds the `Secure` attribute to issued cookies.
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "portal_session".to_string(),
            secret: String::new(),
            ttl_hours: 24,
            secure: false,
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_name", &self.cookie_name)
            .field("secret", &"<redacted>")
            .field("ttl_hours", &self.ttl_hours)
            .field("secure", &self.secure)
            .finish()
    }
}

/// Top-level server configuration.
///
/// # Examples
///
/// ```no_run
/// use portal_server::ServerConfig;
///
/// let mut config = ServerConfig::load("portal.yml").unwrap();
/// config.apply_env();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Configuration format version (e.g., `"1.0"`).
    pub version: String,
    pub listen: ListenConfig,
    pub database: DatabaseConfig,
    pub uploads: UploadConfig,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            listen: ListenConfig::default(),
            database: DatabaseConfig::default(),
            uploads: UploadConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if the file cannot be read, or
    /// [`ConfigError::YamlError`] if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let config = serde_yaml::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        serde_yaml::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Overrides values from `PORTAL_SESSION_SECRET`, `PORTAL_LISTEN` and
    /// `PORTAL_DB` when they are set and non-empty.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(secret) = lookup(ENV_SESSION_SECRET) {
            self.session.secret = secret;
        }
        if let Some(address) = lookup(ENV_LISTEN) {
            self.listen.address = address;
        }
        if let Some(path) = lookup(ENV_DB) {
            self.database.path = PathBuf::from(path);
        }
    }

    /// Checks the values a running server depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the session secret is shorter
    /// than [`MIN_SECRET_BYTES`], the token lifetime is not positive, the
    /// cookie name is empty, or no upload extension is allowed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Invalid(format!(
                "session.secret must be at least {MIN_SECRET_BYTES} bytes (set {ENV_SESSION_SECRET})"
            )));
        }
        if self.session.ttl_hours <= 0 {
            return Err(ConfigError::Invalid(
                "session.ttl_hours must be positive".to_string(),
            ));
        }
        if self.session.cookie_name.is_empty()
            || !self
                .session
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::Invalid(format!(
                "session.cookie_name is not a valid cookie name: {:?}",
                self.session.cookie_name
            )));
        }
        if self.uploads.allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "uploads.allowed_extensions must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn sample_yaml() -> &'static str {
        r#"
version: "1.0"
listen:
  address: 0.0.0.0:9000
database:
  path: /tmp/portal.db
uploads:
  root: /srv/uploads
  allowed_extensions: [png, pdf]
  max_bytes: 2048
session:
  cookie_name: isp_admin
  secret: 0123456789abcdef0123456789abcdef
  ttl_hours: 12
  secure: true
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: ServerConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.listen.address, "0.0.0.0:9000");
        assert_eq!(config.database.path, PathBuf::from("/tmp/portal.db"));
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.uploads.allowed_extensions, vec!["png", "pdf"]);
        assert_eq!(config.uploads.max_bytes, 2048);
        assert_eq!(config.session.cookie_name, "isp_admin");
        assert_eq!(config.session.ttl_hours, 12);
        assert!(config.session.secure);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ServerConfig = serde_yaml::from_str("session:\n  secure: true\n").unwrap();
        assert_eq!(config.listen, ListenConfig::default());
        assert_eq!(config.session.cookie_name, "portal_session");
        assert_eq!(config.session.ttl_hours, 24);
        assert!(config.uploads.allowed_extensions.contains(&"pdf".to_string()));
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let mut config = ServerConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.session.secret = "short".into();
        assert!(config.validate().is_err());
        config.session.secret = SECRET.into();
        config.validate().unwrap();
    }

    #[test]
    fn test_bad_cookie_name_is_rejected() {
        let mut config = ServerConfig::default();
        config.session.secret = SECRET.into();
        config.session.cookie_name = "a b;c".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = ServerConfig::default();
        config.apply_overrides(|key| match key {
            ENV_SESSION_SECRET => Some(SECRET.to_string()),
            ENV_LISTEN => Some(String::new()),
            ENV_DB => Some("/data/portal.db".to_string()),
            _ => None,
        });
        assert_eq!(config.session.secret, SECRET);
        assert_eq!(config.listen.address, "127.0.0.1:8787");
        assert_eq!(config.database.path, PathBuf::from("/data/portal.db"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let mut config = ServerConfig::default();
        config.session.secret = SECRET.into();
        assert!(!format!("{config:?}").contains(SECRET));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal.yml");
        let config: ServerConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        config.save(&path).unwrap();
        assert_eq!(ServerConfig::load(&path).unwrap(), config);
    }
}
