//! # Queue Configuration
//!
//! Configuration management for the coalescing queue.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     RESYNC_MODE=preview                                                │
//! │     RESYNC_DIAGNOSTICS=1                                               │
//! │     RESYNC_SIMULATE_COALESCING=1                                       │
//! │     RESYNC_QUEUE_NAME=library-sync                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/resync/queue.toml (Linux)                                │
//! │     ~/Library/Application Support/dev.resync.resync/queue.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     QueueMode::Live, diagnostics off                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # queue.toml
//! [queue]
//! name = "sync"
//! mode = "live"  # live | preview | test
//!
//! [diagnostics]
//! enabled = false
//! simulate_coalescing_in_test = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};

// =============================================================================
// Queue Mode
// =============================================================================

/// The operating mode of a queue. Fixed at construction.
///
/// ## Mode Behavior
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                        Queue Mode Behavior                              │
/// │                                                                         │
/// │  LIVE (Default)                                                        │
/// │  ──────────────                                                        │
/// │  • Every request starts the loop if it is not already running          │
/// │  • Requests during a run collapse into one trailing run                │
/// │                                                                         │
/// │  PREVIEW                                                               │
/// │  ───────                                                               │
/// │  • Requests are counted, never executed                                │
/// │  • No background task is ever spawned                                  │
/// │                                                                         │
/// │  TEST                                                                  │
/// │  ────                                                                  │
/// │  • Inert like PREVIEW by default                                       │
/// │  • Runs the real loop when simulate_coalescing_in_test is set          │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// Production mode - requests drive real work.
    #[default]
    Live,

    /// Inert mode for previews and design-time contexts.
    Preview,

    /// Unit-test mode - inert unless coalescing simulation is enabled.
    Test,
}

impl QueueMode {
    /// Returns true if requests in this mode may start the loop.
    ///
    /// `simulate_coalescing` only matters for [`QueueMode::Test`].
    pub fn runs_loop(&self, simulate_coalescing: bool) -> bool {
        match self {
            QueueMode::Live => true,
            QueueMode::Preview => false,
            QueueMode::Test => simulate_coalescing,
        }
    }
}

impl std::fmt::Display for QueueMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueMode::Live => write!(f, "live"),
            QueueMode::Preview => write!(f, "preview"),
            QueueMode::Test => write!(f, "test"),
        }
    }
}

impl std::str::FromStr for QueueMode {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" | "production" | "prod" => Ok(QueueMode::Live),
            "preview" | "inert" => Ok(QueueMode::Preview),
            "test" | "testing" => Ok(QueueMode::Test),
            other => Err(QueueError::InvalidConfig(format!(
                "Unknown queue mode: '{}'. Valid options: live, preview, test",
                other
            ))),
        }
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// Core queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Label attached to every log event from this queue.
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Operating mode.
    #[serde(default)]
    pub mode: QueueMode,
}

fn default_queue_name() -> String {
    "sync".to_string()
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            name: default_queue_name(),
            mode: QueueMode::default(),
        }
    }
}

// =============================================================================
// Diagnostics Settings
// =============================================================================

/// Diagnostic-only switches. Off in production.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsSettings {
    /// Master switch for diagnostic behaviour.
    #[serde(default)]
    pub enabled: bool,

    /// Lets a [`QueueMode::Test`] queue run the real loop.
    #[serde(default)]
    pub simulate_coalescing_in_test: bool,
}

// =============================================================================
// Main Queue Configuration
// =============================================================================

/// Complete queue configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue settings.
    #[serde(default)]
    pub queue: QueueSettings,

    /// Diagnostic settings.
    #[serde(default)]
    pub diagnostics: DiagnosticsSettings,
}

impl QueueConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a default config for the given mode.
    pub fn for_mode(mode: QueueMode) -> Self {
        let mut config = Self::default();
        config.queue.mode = mode;
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (queue.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> QueueResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading queue config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load queue config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> QueueResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| QueueError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| QueueError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| QueueError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Queue config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> QueueResult<()> {
        if self.queue.name.trim().is_empty() {
            return Err(QueueError::InvalidConfig("queue name must not be empty".into()));
        }

        if self.diagnostics.simulate_coalescing_in_test && !self.diagnostics.enabled {
            return Err(QueueError::InvalidConfig(
                "simulate_coalescing_in_test requires diagnostics.enabled".into(),
            ));
        }

        if self.diagnostics.simulate_coalescing_in_test && self.queue.mode != QueueMode::Test {
            warn!(
                mode = %self.queue.mode,
                "simulate_coalescing_in_test has no effect outside test mode"
            );
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("RESYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding queue mode from environment");
                    self.queue.mode = parsed;
                }
                Err(e) => warn!(?e, "Ignoring RESYNC_MODE"),
            }
        }

        if let Ok(name) = std::env::var("RESYNC_QUEUE_NAME") {
            self.queue.name = name;
        }

        if let Ok(flag) = std::env::var("RESYNC_DIAGNOSTICS") {
            if let Some(enabled) = parse_flag(&flag) {
                self.diagnostics.enabled = enabled;
            }
        }

        if let Ok(flag) = std::env::var("RESYNC_SIMULATE_COALESCING") {
            if let Some(enabled) = parse_flag(&flag) {
                debug!(enabled, "Overriding coalescing simulation from environment");
                self.diagnostics.simulate_coalescing_in_test = enabled;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "resync", "resync")
            .map(|dirs| dirs.config_dir().join("queue.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the queue mode.
    pub fn mode(&self) -> QueueMode {
        self.queue.mode
    }

    /// Returns the queue name.
    pub fn name(&self) -> &str {
        &self.queue.name
    }

    /// Returns the effective simulation flag (diagnostics must be on).
    pub fn simulate_coalescing_in_test(&self) -> bool {
        self.diagnostics.enabled && self.diagnostics.simulate_coalescing_in_test
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!(value = %other, "Unrecognised boolean in environment");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_mode_parsing() {
        assert_eq!("live".parse::<QueueMode>().unwrap(), QueueMode::Live);
        assert_eq!("PROD".parse::<QueueMode>().unwrap(), QueueMode::Live);
        assert_eq!("preview".parse::<QueueMode>().unwrap(), QueueMode::Preview);
        assert_eq!(" test ".parse::<QueueMode>().unwrap(), QueueMode::Test);
        assert!("offline".parse::<QueueMode>().is_err());
    }

    #[test]
    fn test_mode_runs_loop() {
        assert!(QueueMode::Live.runs_loop(false));
        assert!(QueueMode::Live.runs_loop(true));
        assert!(!QueueMode::Preview.runs_loop(false));
        assert!(!QueueMode::Preview.runs_loop(true));
        assert!(!QueueMode::Test.runs_loop(false));
        assert!(QueueMode::Test.runs_loop(true));
    }

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.mode(), QueueMode::Live);
        assert_eq!(config.name(), "sync");
        assert!(!config.simulate_coalescing_in_test());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = QueueConfig::for_mode(QueueMode::Test);
        config.diagnostics.simulate_coalescing_in_test = true;
        assert!(config.validate().is_err());

        config.diagnostics.enabled = true;
        assert!(config.validate().is_ok());
        assert!(config.simulate_coalescing_in_test());

        config.queue.name = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_parsing() {
        let config: QueueConfig = toml::from_str(
            r#"
            [queue]
            mode = "test"

            [diagnostics]
            enabled = true
            simulate_coalescing_in_test = true
            "#,
        )
        .unwrap();

        assert_eq!(config.mode(), QueueMode::Test);
        assert_eq!(config.name(), "sync");
        assert!(config.simulate_coalescing_in_test());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.toml");

        let mut config = QueueConfig::for_mode(QueueMode::Preview);
        config.queue.name = "photos".into();
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[queue]"));

        let loaded = with_env(&[], || QueueConfig::load(Some(path.clone()))).unwrap();
        assert_eq!(loaded.mode(), QueueMode::Preview);
        assert_eq!(loaded.name(), "photos");
    }

    // =========================================================================
    // Layered Loading
    // =========================================================================

    const ENV_VARS: [&str; 4] = [
        "RESYNC_MODE",
        "RESYNC_DIAGNOSTICS",
        "RESYNC_SIMULATE_COALESCING",
        "RESYNC_QUEUE_NAME",
    ];

    // Process environment is global; loading tests take turns.
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock();

        for name in ENV_VARS {
            std::env::remove_var(name);
        }
        for (name, value) in vars {
            std::env::set_var(name, value);
        }

        let result = f();

        for name in ENV_VARS {
            std::env::remove_var(name);
        }
        result
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = with_env(&[], || QueueConfig::load(Some(path))).unwrap();
        assert_eq!(config.mode(), QueueMode::Live);
        assert_eq!(config.name(), "sync");
        assert!(!config.diagnostics.enabled);
    }

    #[test]
    fn test_load_reads_file() {
        let (_dir, path) = write_config(
            r#"
            [queue]
            name = "photos"
            mode = "preview"
            "#,
        );

        let config = with_env(&[], || QueueConfig::load(Some(path))).unwrap();
        assert_eq!(config.mode(), QueueMode::Preview);
        assert_eq!(config.name(), "photos");
    }

    #[test]
    fn test_env_overrides_file() {
        let (_dir, path) = write_config(
            r#"
            [queue]
            name = "photos"
            mode = "preview"
            "#,
        );

        let config = with_env(
            &[
                ("RESYNC_MODE", "testing"),
                ("RESYNC_DIAGNOSTICS", "1"),
                ("RESYNC_SIMULATE_COALESCING", "on"),
                ("RESYNC_QUEUE_NAME", "library"),
            ],
            || QueueConfig::load(Some(path)),
        )
        .unwrap();

        assert_eq!(config.mode(), QueueMode::Test);
        assert_eq!(config.name(), "library");
        assert!(config.simulate_coalescing_in_test());
    }

    #[test]
    fn test_unparseable_env_values_are_ignored() {
        let (_dir, path) = write_config(
            r#"
            [queue]
            mode = "preview"

            [diagnostics]
            enabled = true
            "#,
        );

        let config = with_env(
            &[("RESYNC_MODE", "offline"), ("RESYNC_DIAGNOSTICS", "maybe")],
            || QueueConfig::load(Some(path)),
        )
        .unwrap();

        assert_eq!(config.mode(), QueueMode::Preview);
        assert!(config.diagnostics.enabled);
    }

    #[test]
    fn test_load_rejects_simulation_without_diagnostics() {
        let (_dir, path) = write_config(
            r#"
            [queue]
            mode = "test"

            [diagnostics]
            simulate_coalescing_in_test = true
            "#,
        );

        let err = with_env(&[], || QueueConfig::load(Some(path.clone()))).unwrap_err();
        assert!(matches!(err, QueueError::InvalidConfig(_)));

        // The environment can complete the file.
        let config = with_env(&[("RESYNC_DIAGNOSTICS", "true")], || {
            QueueConfig::load(Some(path.clone()))
        })
        .unwrap();
        assert!(config.simulate_coalescing_in_test());

        // Validation runs after the overrides, so they can also break it.
        let err = with_env(&[("RESYNC_DIAGNOSTICS", "off")], || {
            QueueConfig::load(Some(path.clone()))
        })
        .unwrap_err();
        assert!(err.is_config_error());

        let fallback = with_env(&[], || QueueConfig::load_or_default(Some(path)));
        assert_eq!(fallback.mode(), QueueMode::Live);
        assert!(!fallback.simulate_coalescing_in_test());
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let (_dir, path) = write_config("[queue\nmode = ");

        let err = with_env(&[], || QueueConfig::load(Some(path.clone()))).unwrap_err();
        assert!(matches!(err, QueueError::ConfigLoadFailed(_)));

        let fallback = with_env(&[("RESYNC_QUEUE_NAME", "fallback")], || {
            QueueConfig::load_or_default(Some(path))
        });
        assert_eq!(fallback.mode(), QueueMode::Live);
        assert_eq!(fallback.name(), "sync");
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("Off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
