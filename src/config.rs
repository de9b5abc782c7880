//! Configuration for CoolPlay voice control
//!
//! Looked up in the user config dir, then `~/.coolplay-voice/`, then the
//! working directory. A commented default is written on first run. The file
//! is watched and swapped in live, so thresholds, language, aliases and
//! executor steps apply from the next utterance.

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use notify::{RecursiveMode, Watcher, recommended_watcher};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::confidence::ConfidenceCombiner;
use crate::executor::ExecutorConfig;
use crate::matcher::MatchPolicy;

const APP_DIR: &str = "coolplay-voice";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub language: String,
    pub confidence_threshold: f64,
    pub listen_timeout_secs: u64, // 0 = no timeout
    pub feedback_ms: u64,
    pub persist_debounce_ms: u64,
    pub storage_path: String, // Empty = platform data dir
    pub catalog_path: Option<String>,
    pub seek_seconds: f64,
    pub volume_step: f64,
    pub custom_match_policy: MatchPolicy,
    pub quiet: bool,
    pub aliases: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            confidence_threshold: 0.5,
            listen_timeout_secs: 10,
            feedback_ms: 2000,
            persist_debounce_ms: 500,
            storage_path: String::new(),
            catalog_path: None,
            seek_seconds: 10.0,
            volume_step: 0.1,
            custom_match_policy: MatchPolicy::First,
            quiet: false,
            aliases: HashMap::new(),
        }
    }
}

impl Config {
    pub fn search_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml")),
            dirs::home_dir().map(|p| p.join(format!(".{}", APP_DIR)).join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// First readable config on the search path, or the defaults
    pub fn load() -> (Self, Option<PathBuf>) {
        for path in Self::search_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from(&path) {
                Ok(config) => {
                    info!("Loaded config from: {:?}", path);
                    return (config, Some(path));
                }
                Err(e) => error!("{:#}", e),
            }
        }

        // No config found - create one at the default location
        if let Some(config_dir) = dirs::config_dir() {
            let app_dir = config_dir.join(APP_DIR);
            let config_path = app_dir.join("config.toml");

            if let Err(e) = fs::create_dir_all(&app_dir) {
                warn!("Failed to create config directory: {}", e);
            } else if let Err(e) = fs::write(&config_path, Self::default_config_content()) {
                warn!("Failed to write default config: {}", e);
            } else {
                info!("Created default config at: {:?}", config_path);
                return (Self::default(), Some(config_path));
            }
        }

        info!("Using default config");
        (Self::default(), None)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;
        Self::from_toml(&contents).with_context(|| format!("Config parse error in {:?}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn default_config_content() -> &'static str {
        r##"# CoolPlay voice control configuration
# Changes are hot-reloaded - no restart needed!

# App language; picks catalog phrases and the recognizer locale
# en, zh-TW, zh-CN, es, fr, de, ja (unknown languages fall back to en)
language = "en"

# Combined confidence (match x speech) must be above this to dispatch
confidence_threshold = 0.5

# Stop listening after this many seconds without speech (0 = never)
listen_timeout_secs = 10

# How long confirmations like "Muted" stay on screen
feedback_ms = 2000

# Quiet period before custom command edits are written to disk
persist_debounce_ms = 500

# Where custom commands are stored (~ is expanded)
# Leave empty for the platform data directory
storage_path = ""

# Optional TOML file replacing the built-in phrase catalog
# catalog_path = "~/.coolplay-voice/catalog.toml"

# Default seek distance and volume step
seek_seconds = 10.0
volume_step = 0.1

# When several custom phrases fit: "first" (storage order) or "longest"
custom_match_policy = "first"

# Only log warnings and errors
quiet = false

# Aliases for common misrecognitions
# Maps what the recognizer hears -> what you meant
[aliases]
# "full green" = "fullscreen"
# "paws" = "pause"
"##
    }

    /// Directory for the key-value store
    pub fn storage_dir(&self) -> PathBuf {
        if self.storage_path.trim().is_empty() {
            return dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("storage");
        }
        PathBuf::from(shellexpand::tilde(self.storage_path.trim()).into_owned())
    }

    /// The override catalog if one is configured and valid, else the built-in table
    pub fn load_catalog(&self) -> Catalog {
        let Some(path) = self.catalog_path.as_deref().filter(|p| !p.trim().is_empty()) else {
            return Catalog::builtin();
        };
        let path = PathBuf::from(shellexpand::tilde(path.trim()).into_owned());
        match Catalog::load_from(&path) {
            Ok(catalog) if !catalog.is_empty() => catalog,
            Ok(_) => {
                warn!("Catalog {:?} is empty, using built-in phrases", path);
                Catalog::builtin()
            }
            Err(e) => {
                warn!("Catalog {:?} unusable ({}), using built-in phrases", path, e);
                Catalog::builtin()
            }
        }
    }

    pub fn combiner(&self) -> ConfidenceCombiner {
        ConfidenceCombiner::new(self.confidence_threshold)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        let defaults = ExecutorConfig::default();
        ExecutorConfig {
            seek_seconds: if self.seek_seconds.is_finite() && self.seek_seconds > 0.0 {
                self.seek_seconds
            } else {
                defaults.seek_seconds
            },
            volume_step: if self.volume_step.is_finite() {
                self.volume_step.abs().min(1.0)
            } else {
                defaults.volume_step
            },
            feedback: Duration::from_millis(self.feedback_ms),
        }
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.listen_timeout_secs)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    /// Default `tracing` filter when RUST_LOG is unset
    pub fn log_filter(&self) -> &'static str {
        if self.quiet { "warn" } else { "info" }
    }
}

/// Watch `path` and swap reloaded configs into `shared`.
/// Parse errors keep the previous config.
pub fn watch(shared: Arc<ArcSwap<Config>>, path: PathBuf) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("coolplay-config".to_string())
        .spawn(move || {
            let (tx, rx) = std::sync::mpsc::channel();
            let mut watcher = match recommended_watcher(tx) {
                Ok(w) => w,
                Err(e) => {
                    error!("Failed to create config watcher: {}", e);
                    return;
                }
            };
            if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                error!("Failed to watch config file: {}", e);
                return;
            }
            info!("👀 Watching config for changes: {:?}", path);

            for event in rx.into_iter().flatten() {
                if event.kind.is_modify() {
                    // Editors write in several steps
                    std::thread::sleep(Duration::from_millis(100));
                    match Config::load_from(&path) {
                        Ok(new_config) => {
                            shared.store(Arc::new(new_config));
                            info!("🔄 Config reloaded!");
                        }
                        Err(e) => warn!("Config reload error: {:#}", e),
                    }
                }
            }
        })
        .context("Failed to spawn config watcher thread")?;
    Ok(handle)
}
