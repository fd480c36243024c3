use std::env;
use std::path::PathBuf;

const DEFAULT_LEVEL: &str = "info";

/// Resolved logging configuration: defaults overridden by environment.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub default_level: String,
    pub log_dir: Option<PathBuf>,
    pub enable_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: DEFAULT_LEVEL.to_string(),
            log_dir: None,
            enable_file: false,
        }
    }
}

impl LoggingConfig {
    /// Load configuration with deterministic precedence: defaults, then
    /// environment overrides.
    pub fn load() -> Self {
        let mut config = LoggingConfig::default();
        if let Ok(level) = env::var("PIPEWRIGHT_LOG") {
            if !level.trim().is_empty() {
                config.default_level = level;
            }
        }
        if let Ok(dir) = env::var("PIPEWRIGHT_LOG_DIR") {
            if !dir.trim().is_empty() {
                config.log_dir = Some(PathBuf::from(dir));
                config.enable_file = true;
            }
        }
        config
    }
}
