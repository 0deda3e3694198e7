//! Configuration management
//!
//! This module handles loading and parsing configuration for the Quillpost server.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Minimum accepted length of the token signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token signing configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cors_origin() -> String {
    "*".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/quillpost.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Token signing configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret shared by access and refresh tokens.
    /// When absent a random secret is generated at startup.
    #[serde(default)]
    pub secret: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            access_token_ttl_secs: default_access_token_ttl(),
            refresh_token_ttl_secs: default_refresh_token_ttl(),
        }
    }
}

// Keep the secret out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .finish()
    }
}

fn default_access_token_ttl() -> i64 {
    3600
}

fn default_refresh_token_ttl() -> i64 {
    7 * 24 * 3600
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload root directory; avatars and post thumbnails live in subfolders
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 5MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed file extensions, lowercase and without the leading dot
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()]
}

impl UploadConfig {
    /// Check whether a filename carries an allowed extension (case-insensitive)
    pub fn is_extension_allowed(&self, filename: &str) -> bool {
        match Path::new(filename).extension().and_then(|e| e.to_str()) {
            Some(ext) => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext))
            }
            None => false,
        }
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - QUILLPOST_SERVER_HOST
    /// - QUILLPOST_SERVER_PORT
    /// - QUILLPOST_SERVER_CORS_ORIGIN
    /// - QUILLPOST_DATABASE_DRIVER
    /// - QUILLPOST_DATABASE_URL
    /// - QUILLPOST_AUTH_SECRET
    /// - QUILLPOST_AUTH_ACCESS_TOKEN_TTL_SECS
    /// - QUILLPOST_AUTH_REFRESH_TOKEN_TTL_SECS
    /// - QUILLPOST_UPLOAD_PATH
    /// - QUILLPOST_UPLOAD_MAX_FILE_SIZE
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secret) = &self.auth.secret {
            if secret.len() < MIN_SECRET_LEN {
                return Err(ConfigError::ValidationError(format!(
                    "auth.secret must be at least {} bytes",
                    MIN_SECRET_LEN
                )));
            }
        }
        if self.auth.access_token_ttl_secs <= 0 || self.auth.refresh_token_ttl_secs <= 0 {
            return Err(ConfigError::ValidationError(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.upload.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_file_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("QUILLPOST_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("QUILLPOST_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("QUILLPOST_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("QUILLPOST_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("QUILLPOST_DATABASE_URL") {
            self.database.url = url;
        }

        // Auth configuration
        if let Ok(secret) = std::env::var("QUILLPOST_AUTH_SECRET") {
            self.auth.secret = Some(secret);
        }
        if let Ok(ttl) = std::env::var("QUILLPOST_AUTH_ACCESS_TOKEN_TTL_SECS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.auth.access_token_ttl_secs = ttl;
            }
        }
        if let Ok(ttl) = std::env::var("QUILLPOST_AUTH_REFRESH_TOKEN_TTL_SECS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.auth.refresh_token_ttl_secs = ttl;
            }
        }

        // Upload configuration
        if let Ok(path) = std::env::var("QUILLPOST_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }
        if let Ok(size) = std::env::var("QUILLPOST_UPLOAD_MAX_FILE_SIZE") {
            if let Ok(size) = size.parse::<u64>() {
                self.upload.max_file_size = size;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "QUILLPOST_SERVER_HOST",
    "QUILLPOST_SERVER_PORT",
    "QUILLPOST_SERVER_CORS_ORIGIN",
    "QUILLPOST_DATABASE_DRIVER",
    "QUILLPOST_DATABASE_URL",
    "QUILLPOST_AUTH_SECRET",
    "QUILLPOST_AUTH_ACCESS_TOKEN_TTL_SECS",
    "QUILLPOST_AUTH_REFRESH_TOKEN_TTL_SECS",
    "QUILLPOST_UPLOAD_PATH",
    "QUILLPOST_UPLOAD_MAX_FILE_SIZE",
];


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_server_config_strategy() -> impl Strategy<Value = ServerConfig> {
        (
            prop_oneof![
                Just("localhost".to_string()),
                Just("0.0.0.0".to_string()),
                (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255)
                    .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d)),
            ],
            1u16..=65535,
        )
            .prop_map(|(host, port)| ServerConfig {
                host,
                port,
                cors_origin: "*".to_string(),
            })
    }

    fn valid_auth_config_strategy() -> impl Strategy<Value = AuthConfig> {
        (
            prop::option::of("[a-zA-Z0-9]{32,48}"),
            1i64..=86400,
            1i64..=2_592_000,
        )
            .prop_map(|(secret, access, refresh)| AuthConfig {
                secret,
                access_token_ttl_secs: access,
                refresh_token_ttl_secs: refresh,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serializing a config to YAML and loading it back preserves every field
        #[test]
        fn config_yaml_roundtrip(
            server in valid_server_config_strategy(),
            auth in valid_auth_config_strategy(),
            max_file_size in 1u64..=50_000_000,
        ) {
            let config = Config {
                server,
                database: DatabaseConfig::default(),
                auth,
                upload: UploadConfig { max_file_size, ..UploadConfig::default() },
            };

            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(&config.server.host, &parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(&config.auth.secret, &parsed.auth.secret);
            prop_assert_eq!(config.auth.access_token_ttl_secs, parsed.auth.access_token_ttl_secs);
            prop_assert_eq!(config.auth.refresh_token_ttl_secs, parsed.auth.refresh_token_ttl_secs);
            prop_assert_eq!(config.upload.max_file_size, parsed.upload.max_file_size);
            prop_assert!(parsed.validate().is_ok());
        }

        /// Filenames without an allowed extension are always rejected
        #[test]
        fn disallowed_extensions_rejected(stem in "[a-z]{1,12}", ext in "(gif|svg|webp|exe|txt|bmp)") {
            let upload = UploadConfig::default();
            let name = format!("{}.{}", stem, ext);
            prop_assert!(!upload.is_extension_allowed(&name));
        }
    }
}
