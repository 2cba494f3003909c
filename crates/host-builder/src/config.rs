//! Credentials file handling.
//!
//! The management API connection is described by a TOML file with a single
//! `[foreman]` table:
//!
//! ```toml
//! [foreman]
//! server = "https://localhost"
//! username = "admin"
//! password = "YWRtaW4="   # base64, not encryption
//! api_version = "2"
//! timeout = 60            # connect/read, seconds
//! timeout_post = 600
//! timeout_delete = 600
//! use_cache = true
//! verify = false
//! ```
//!
//! A missing file is created with the defaults above (minus the optional
//! keys). Any key present with an empty value is rejected.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_SERVER: &str = "https://localhost";
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";
const DEFAULT_API_VERSION: &str = "2";

/// Connect/read timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// POST timeout in seconds; host creation can take minutes.
const DEFAULT_TIMEOUT_POST_SECS: u64 = 600;

/// DELETE timeout in seconds.
const DEFAULT_TIMEOUT_DELETE_SECS: u64 = 600;

/// Errors raised while loading the credentials file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A default file could not be written.
    #[error("Failed creating configuration file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but could not be read.
    #[error("Failed reading configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has the wrong shape.
    #[error("Failed parsing configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The default file could not be rendered.
    #[error("Failed rendering configuration file: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A key is present but empty.
    #[error("{0} is set, but empty")]
    EmptyValue(String),

    /// A required key is absent.
    #[error("{0} is required but missing")]
    MissingValue(&'static str),

    /// The stored password is not valid base64 UTF-8.
    #[error("password is not valid base64: {0}")]
    Password(String),
}

impl ConfigError {
    /// Process exit code for this startup failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        1
    }
}

/// Connection settings for the management API.
///
/// Built once at startup and shared read-only by every worker.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server base URL.
    pub server: String,
    /// API user.
    pub username: String,
    /// API password, decoded.
    pub password: String,
    /// API version sent in the `Accept` header.
    pub api_version: String,
    /// Connect and read timeout.
    pub timeout: Duration,
    /// Timeout for POST requests.
    pub timeout_post: Duration,
    /// Timeout for DELETE requests.
    pub timeout_delete: Duration,
    /// Cache reference lookups for the lifetime of the client.
    pub use_cache: bool,
    /// Verify the server's TLS certificate.
    pub verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            timeout_post: Duration::from_secs(DEFAULT_TIMEOUT_POST_SECS),
            timeout_delete: Duration::from_secs(DEFAULT_TIMEOUT_DELETE_SECS),
            use_cache: true,
            verify: false,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("timeout_post", &self.timeout_post)
            .field("timeout_delete", &self.timeout_delete)
            .field("use_cache", &self.use_cache)
            .field("verify", &self.verify)
            .finish()
    }
}

/// On-disk shape of the `[foreman]` table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ForemanSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_post: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_delete: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verify: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    foreman: ForemanSection,
}

/// Load the credentials file, creating it with defaults if it is missing.
///
/// # Errors
/// Returns an error if a default file cannot be written, the file cannot be
/// read or parsed, or any value is empty or missing.
pub fn load_or_create(path: &Path) -> Result<ClientConfig, ConfigError> {
    debug!(path = %path.display(), "Trying to parse config file");

    if !path.exists() {
        info!(path = %path.display(), "Configuration file was not found, creating it");
        write_default(path)?;
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse(&content)
}

/// Write a credentials file holding the default settings.
///
/// # Errors
/// Returns [`ConfigError::Write`] if the file cannot be written.
pub fn write_default(path: &Path) -> Result<(), ConfigError> {
    let file = ConfigFile {
        foreman: ForemanSection {
            server: Some(DEFAULT_SERVER.to_string()),
            username: Some(DEFAULT_USERNAME.to_string()),
            password: Some(BASE64.encode(DEFAULT_PASSWORD)),
            api_version: Some(DEFAULT_API_VERSION.to_string()),
            ..ForemanSection::default()
        },
    };

    let content = toml::to_string(&file)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse credentials from TOML text.
///
/// # Errors
/// Returns an error if the text is not valid TOML, any value anywhere in the
/// document is an empty string, a required key is missing, or the password
/// is not base64.
pub fn parse(content: &str) -> Result<ClientConfig, ConfigError> {
    let table: toml::Table = content.parse()?;
    reject_empty_values(&table)?;

    let file: ConfigFile = toml::from_str(content)?;
    let section = file.foreman;

    let encoded = section
        .password
        .ok_or(ConfigError::MissingValue("password"))?;
    let password = BASE64
        .decode(encoded.trim())
        .map_err(|e| ConfigError::Password(e.to_string()))
        .and_then(|bytes| {
            String::from_utf8(bytes).map_err(|e| ConfigError::Password(e.to_string()))
        })?;

    Ok(ClientConfig {
        server: section.server.ok_or(ConfigError::MissingValue("server"))?,
        username: section
            .username
            .ok_or(ConfigError::MissingValue("username"))?,
        password,
        api_version: section
            .api_version
            .ok_or(ConfigError::MissingValue("api_version"))?,
        timeout: Duration::from_secs(section.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        timeout_post: Duration::from_secs(
            section.timeout_post.unwrap_or(DEFAULT_TIMEOUT_POST_SECS),
        ),
        timeout_delete: Duration::from_secs(
            section.timeout_delete.unwrap_or(DEFAULT_TIMEOUT_DELETE_SECS),
        ),
        use_cache: section.use_cache.unwrap_or(true),
        verify: section.verify.unwrap_or(false),
    })
}

/// Fail on the first empty string value in any table.
fn reject_empty_values(table: &toml::Table) -> Result<(), ConfigError> {
    for (name, value) in table {
        match value {
            toml::Value::String(s) if s.is_empty() => {
                return Err(ConfigError::EmptyValue(name.clone()));
            }
            toml::Value::Table(inner) => reject_empty_values(inner)?,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("builder.toml");

        let config = load_or_create(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config, ClientConfig::default());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[foreman]"));
        assert!(written.contains("password = \"YWRtaW4=\""));
    }

    #[test]
    fn test_unwritable_path_is_write_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("builder.toml");

        let err = load_or_create(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Write { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_password_is_decoded() {
        let config = parse(
            r#"
            [foreman]
            server = "https://foreman.example.com"
            username = "builder"
            password = "czNjcjN0"
            api_version = "2"
            timeout = 30
            verify = true
            "#,
        )
        .unwrap();

        assert_eq!(config.password, "s3cr3t");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.timeout_post, Duration::from_secs(600));
        assert!(config.verify);
        assert!(config.use_cache);
    }

    #[test]
    fn test_empty_value_rejected() {
        let err = parse(
            r#"
            [foreman]
            server = "https://localhost"
            username = ""
            password = "YWRtaW4="
            api_version = "2"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::EmptyValue(ref name) if name == "username"));
        assert_eq!(err.to_string(), "username is set, but empty");
    }

    #[test]
    fn test_empty_value_in_other_table_rejected() {
        let err = parse(
            r#"
            [foreman]
            server = "https://localhost"
            username = "admin"
            password = "YWRtaW4="
            api_version = "2"

            [extra]
            note = ""
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::EmptyValue(ref name) if name == "note"));
    }

    #[test]
    fn test_missing_server_rejected() {
        let err = parse(
            r#"
            [foreman]
            username = "admin"
            password = "YWRtaW4="
            api_version = "2"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::MissingValue("server")));
    }

    #[test]
    fn test_bad_password_rejected() {
        let err = parse(
            r#"
            [foreman]
            server = "https://localhost"
            username = "admin"
            password = "not base64!"
            api_version = "2"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Password(_)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", ClientConfig::default());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("\"admin\", api_version"));
    }
}
