//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a small TOML file. Everything has a
//! built-in default so a missing file never prevents startup.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SHELF_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "SHELF_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "SHELF_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "shelf.db";

/// A single from→to location prefix substitution.
///
/// Both sides are compared against the raw (still encoded) export location,
/// e.g. `file://localhost/W:/itunes/iTunes%20Media` → `file://localhost/mnt/books/iTunes%20Media`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    pub from: String,
    pub to: String,
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the catalog database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit catalog database path (defaults to `<root>/shelf.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Export library settings
    #[serde(default)]
    pub itunes: ItunesConfig,

    /// Import job tuning
    #[serde(default)]
    pub import: ImportTuning,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Export library (Library.xml) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItunesConfig {
    /// Path to the exported library file
    #[serde(default)]
    pub library_xml_path: Option<PathBuf>,

    /// Location prefix remappings applied on import and inverted on write-back
    #[serde(default)]
    pub path_mappings: Vec<PathMapping>,

    /// Write organized locations back automatically after edits
    #[serde(default)]
    pub auto_write_back: bool,

    /// Debounce delay for automatic write-back
    #[serde(default = "default_write_back_delay_ms")]
    pub write_back_delay_ms: u64,

    /// Create a timestamped backup before explicit write-backs
    #[serde(default = "default_true")]
    pub create_backup: bool,

    /// Poll interval for the export change watcher
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,

    /// The player's binary library (`iTunes Library.itl`)
    #[serde(default)]
    pub itl_path: Option<PathBuf>,

    /// Also patch locations in the binary library on write-back
    #[serde(default)]
    pub itl_write_back: bool,
}

impl Default for ItunesConfig {
    fn default() -> Self {
        Self {
            library_xml_path: None,
            path_mappings: Vec::new(),
            auto_write_back: false,
            write_back_delay_ms: default_write_back_delay_ms(),
            create_backup: true,
            watch_interval_secs: default_watch_interval_secs(),
            itl_path: None,
            itl_write_back: false,
        }
    }
}

/// Import job tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTuning {
    /// Persist a checkpoint every N units of work
    #[serde(default = "default_batch")]
    pub checkpoint_batch: usize,

    /// Report progress every N units of work
    #[serde(default = "default_batch")]
    pub progress_batch: usize,

    /// Maximum number of verbatim error messages kept per job
    #[serde(default = "default_error_limit")]
    pub error_limit: usize,

    /// Consecutive enrichment failures before backing off
    #[serde(default = "default_enrich_failure_threshold")]
    pub enrich_failure_threshold: usize,

    /// Sleep after a run of consecutive enrichment failures
    #[serde(default = "default_enrich_failure_backoff_ms")]
    pub enrich_failure_backoff_ms: u64,

    /// Pause after every N successful enrichments
    #[serde(default = "default_batch")]
    pub enrich_pause_every: usize,

    /// Length of the periodic enrichment pause
    #[serde(default = "default_enrich_pause_ms")]
    pub enrich_pause_ms: u64,
}

impl Default for ImportTuning {
    fn default() -> Self {
        Self {
            checkpoint_batch: default_batch(),
            progress_batch: default_batch(),
            error_limit: default_error_limit(),
            enrich_failure_threshold: default_enrich_failure_threshold(),
            enrich_failure_backoff_ms: default_enrich_failure_backoff_ms(),
            enrich_pause_every: default_batch(),
            enrich_pause_ms: default_enrich_pause_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_write_back_delay_ms() -> u64 {
    5000
}

fn default_watch_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_batch() -> usize {
    10
}

fn default_error_limit() -> usize {
    50
}

fn default_enrich_failure_threshold() -> usize {
    3
}

fn default_enrich_failure_backoff_ms() -> u64 {
    5000
}

fn default_enrich_pause_ms() -> u64 {
    1000
}

impl TomlConfig {
    /// Catalog database path for a resolved root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
    }
}

/// Default configuration file path for the platform
///
/// `SHELF_CONFIG` overrides the platform location.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("shelf").join("shelf-itunes.toml"))
}

/// Load bootstrap configuration
///
/// A missing file is not an error: defaults are returned and a warning logged.
/// A file that exists but does not parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, using built-in defaults"
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Resolve the root folder following the documented priority order
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("shelf"))
        .unwrap_or_else(|| PathBuf::from("./shelf_data"))
}
