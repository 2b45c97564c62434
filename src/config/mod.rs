mod types;

pub use types::{Config, DisplayConfig, DisplayKind};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

pub type SharedConfig = Arc<RwLock<Config>>;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "OLEDMON_CONFIG";

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Reads and parses a config file without any fallback.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the config, falling back to defaults on any problem.
pub fn load_config(config_path: &Path) -> Config {
    let config = if config_path.exists() {
        match read_config(config_path) {
            Ok(config) => {
                log::info!("Loaded config from {:?}", config_path);
                config
            }
            Err(e) => {
                log::error!("{}", e);
                Config::default()
            }
        }
    } else {
        log::info!("No config file found at {:?}, using defaults", config_path);
        Config::default()
    };

    // Validate configuration and report issues
    let issues = config.validate();
    let errors: Vec<_> = issues.iter().filter(|i| i.is_error).collect();
    let warnings: Vec<_> = issues.iter().filter(|i| !i.is_error).collect();

    for warning in &warnings {
        log::warn!("Config: {}", warning);
    }
    for error in &errors {
        log::error!("Config: {}", error);
    }

    if !issues.is_empty() {
        log::info!(
            "Config validation: {} error(s), {} warning(s)",
            errors.len(),
            warnings.len()
        );
    }

    if !errors.is_empty() {
        log::error!("Config has errors; falling back to defaults.");
        return Config::default();
    }

    config
}

pub fn get_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("oledmon")
        .join("config.toml")
}

/// Settings that are read once at startup; changing them needs a restart.
fn restart_required(old: &Config, new: &Config) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if old.sensor.interval_secs != new.sensor.interval_secs {
        fields.push("sensor.interval_secs");
    }
    if old.sensor.device != new.sensor.device {
        fields.push("sensor.device");
    }
    if old.display.kind != new.display.kind {
        fields.push("display.kind");
    }
    if old.display.width != new.display.width || old.display.height != new.display.height {
        fields.push("display size");
    }
    fields
}

pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    receiver: Receiver<Result<Event, notify::Error>>,
    config: SharedConfig,
    path: PathBuf,
    reload: Mutex<ReloadState>,
}

#[derive(Default)]
struct ReloadState {
    last_reload: Option<Instant>,
    /// A change was seen but not applied yet because of the debounce.
    pending: bool,
}

impl ConfigWatcher {
    pub fn new(config: SharedConfig, path: &Path) -> Result<Self, notify::Error> {
        let (tx, rx) = channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;

        // Watch the directory so editors that replace the file are picked up
        let config_dir = path.parent().unwrap_or(path);
        if !config_dir.exists() {
            let _ = std::fs::create_dir_all(config_dir);
        }

        watcher.watch(config_dir, RecursiveMode::NonRecursive)?;
        log::info!("Watching config directory: {:?}", config_dir);

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            config,
            path: path.to_path_buf(),
            reload: Mutex::new(ReloadState::default()),
        })
    }

    /// Check for config changes and reload if needed. Returns true if config was reloaded.
    pub fn check_and_reload(&self) -> bool {
        let file_name = self.path.file_name();
        let mut should_reload = false;

        // Drain all pending events
        while let Ok(event) = self.receiver.try_recv() {
            match event {
                Ok(event) => {
                    let is_config = event.paths.iter().any(|p| p.file_name() == file_name);

                    if is_config && (event.kind.is_modify() || event.kind.is_create()) {
                        should_reload = true;
                    }
                }
                Err(e) => {
                    log::error!("Config watch error: {}", e);
                }
            }
        }

        let now = Instant::now();
        let mut reload = self
            .reload
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        reload.pending |= should_reload;
        if !reload.pending {
            return false;
        }

        // Debounce: editors often emit several events per save
        let settled = reload
            .last_reload
            .map(|t| now.duration_since(t) > RELOAD_DEBOUNCE)
            .unwrap_or(true);
        if !settled {
            return false;
        }

        log::info!("Config file changed, reloading...");
        let new_config = load_config(&self.path);
        let mut cfg = self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for field in restart_required(&cfg, &new_config) {
            log::warn!("Config: change to {} takes effect after a restart", field);
        }
        *cfg = new_config;
        reload.last_reload = Some(now);
        reload.pending = false;
        true
    }
}
