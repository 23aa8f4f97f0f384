//! Configuration loading and root folder resolution
//!
//! Two tiers:
//! 1. **TOML bootstrap**: root folder, listen address, logging, document parser
//!    settings. Read once at startup.
//! 2. **Compiled defaults**: used for anything the TOML file does not set.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `PBD_ROOT_FOLDER`
//! 3. TOML config file `root_folder`
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unparsable TOML file never aborts startup; a warning is
//! logged and defaults are used instead.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "PBD_ROOT_FOLDER";

/// Environment variable holding the document parser API key
pub const PARSER_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "tracker.db";

/// Uploaded evidence/photo directory inside the root folder
pub const UPLOADS_DIR: &str = "uploads";

/// Built-in defaults for every bootstrap setting
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub port: u16,
    pub bind: String,
    pub log_level: String,
    pub max_upload_bytes: usize,
    pub max_bulk_upload_bytes: usize,
    pub parser_model: String,
    pub parser_endpoint: String,
    pub parser_timeout_secs: u64,
    pub parser_max_retries: u32,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was compiled for
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            port: 3000,
            bind: "0.0.0.0".to_string(),
            log_level: "info".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
            max_bulk_upload_bytes: 256 * 1024 * 1024,
            parser_model: "gemini-2.0-flash".to_string(),
            parser_endpoint: "https://generativelanguage.googleapis.com".to_string(),
            parser_timeout_secs: 60,
            parser_max_retries: 2,
        }
    }
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\pbd
        dirs::data_local_dir()
            .map(|d| d.join("pbd"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\pbd"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/pbd
        dirs::data_dir()
            .map(|d| d.join("pbd"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/pbd"))
    } else {
        // ~/.local/share/pbd
        dirs::data_local_dir()
            .map(|d| d.join("pbd"))
            .unwrap_or_else(|| PathBuf::from("./pbd_data"))
    }
}

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional; absent values fall back to [`CompiledDefaults`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database file and uploads directory
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP port
    #[serde(default)]
    pub port: Option<u16>,

    /// Bind address (e.g. "127.0.0.1")
    #[serde(default)]
    pub bind: Option<String>,

    /// Directory containing a pre-built web UI (served at `/`)
    #[serde(default)]
    pub static_assets: Option<PathBuf>,

    /// Maximum accepted request body size in bytes (multipart uploads)
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,

    /// Body limit for bulk assessment entry, which carries one photo per student
    #[serde(default)]
    pub max_bulk_upload_bytes: Option<usize>,

    /// Delete unreferenced upload files at startup (default true)
    #[serde(default)]
    pub sweep_orphans_on_start: Option<bool>,

    /// Offset applied to timestamps in CSV reports, in minutes east of UTC
    #[serde(default)]
    pub report_utc_offset_minutes: Option<i32>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub document_parser: DocumentParserConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

/// External document parser settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentParserConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL of the generative language API
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl DocumentParserConfig {
    /// Resolve the API key: environment first, then TOML
    ///
    /// Blank values count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        let env_key = std::env::var(PARSER_API_KEY_ENV).ok();
        if let Some(key) = env_key.filter(|k| is_valid_key(k)) {
            info!("Document parser API key loaded from environment variable");
            return Some(key);
        }
        if let Some(key) = self.api_key.as_ref().filter(|k| is_valid_key(k)) {
            info!("Document parser API key loaded from TOML config");
            return Some(key.clone());
        }
        None
    }
}

/// API keys must be non-empty and not just whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Default configuration file location
///
/// Linux: `~/.config/pbd/config.toml`, falling back to `/etc/pbd/config.toml`.
/// Other platforms: the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("pbd").join("config.toml"));
    if let Some(path) = user_config.as_ref().filter(|p| p.exists()) {
        return Some(path.clone());
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/pbd/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    None
}

/// Parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the TOML config with graceful degradation
///
/// An explicit path that cannot be read or parsed, or a default config file
/// that is broken, logs a warning and yields an all-default config.
pub fn load_toml_config(explicit: Option<&Path>) -> TomlConfig {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path(),
    };

    let Some(path) = path else {
        info!("No config file found, using compiled defaults");
        return TomlConfig::default();
    };

    match read_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config file: {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} - continuing with compiled defaults", e);
            TomlConfig::default()
        }
    }
}

/// Resolves the root folder from CLI, environment, TOML and defaults
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value passed on the command line, if any
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Value from the TOML config, if any
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    /// Apply the priority order and return the winning path
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        if let Some(path) = &self.toml_value {
            return path.clone();
        }
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout and hands out paths inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder and uploads directory if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder: {}", self.root_folder.display());
        }
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.uploads_path())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.root_folder.join(UPLOADS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_all_fields() {
        let config: TomlConfig = toml::from_str(
            r#"
            root_folder = "/srv/pbd"
            port = 8080
            bind = "127.0.0.1"
            max_upload_bytes = 1048576
            max_bulk_upload_bytes = 8388608
            sweep_orphans_on_start = false
            report_utc_offset_minutes = 480

            [logging]
            level = "debug"

            [document_parser]
            api_key = "abc"
            model = "gemini-test"
            timeout_secs = 5
            max_retries = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/pbd")));
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.bind.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.max_upload_bytes, Some(1_048_576));
        assert_eq!(config.max_bulk_upload_bytes, Some(8_388_608));
        assert_eq!(config.sweep_orphans_on_start, Some(false));
        assert_eq!(config.report_utc_offset_minutes, Some(480));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.document_parser.api_key.as_deref(), Some("abc"));
        assert_eq!(config.document_parser.model.as_deref(), Some("gemini-test"));
        assert_eq!(config.document_parser.timeout_secs, Some(5));
        assert_eq!(config.document_parser.max_retries, Some(0));
    }

    #[test]
    fn test_toml_empty_is_all_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert!(config.root_folder.is_none());
        assert!(config.port.is_none());
        assert!(config.logging.level.is_none());
        assert!(config.document_parser.api_key.is_none());
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    fn test_compiled_defaults() {
        let defaults = CompiledDefaults::for_current_platform();
        assert_eq!(defaults.port, 3000);
        assert_eq!(defaults.log_level, "info");
        assert!(
            defaults.root_folder.ends_with("pbd") || defaults.root_folder.ends_with("pbd_data")
        );
    }

    #[test]
    fn test_initializer_paths() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/pbd"));
        assert_eq!(init.database_path(), PathBuf::from("/srv/pbd/tracker.db"));
        assert_eq!(init.uploads_path(), PathBuf::from("/srv/pbd/uploads"));
    }
}
