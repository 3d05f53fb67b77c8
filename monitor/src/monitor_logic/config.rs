use clap::Parser;
use cosmic_core::SyncConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "cosmic_monitor.json5";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Cosmic Brain real-time monitor", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "COSMIC_WS_URL", help = "WebSocket endpoint of the Cosmic Brain server.")]
    pub ws_url: Option<String>,

    #[clap(long, env = "COSMIC_CONFIG_PATH", help = "Path to the JSON5 configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "COSMIC_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "COSMIC_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "COSMIC_STATS_INTERVAL_SECONDS", help = "Seconds between connection statistics lines.")]
    pub stats_interval_seconds: Option<u64>,

    #[clap(long, env = "COSMIC_RECONNECT_BASE_DELAY_MS", help = "Delay in milliseconds before the first reconnect attempt.")]
    pub base_delay_ms: Option<u64>,

    #[clap(long, env = "COSMIC_RECONNECT_MAX_DELAY_MS", help = "Ceiling in milliseconds of the reconnect delay.")]
    pub max_delay_ms: Option<u64>,

    #[clap(long, env = "COSMIC_RECONNECT_JITTER", help = "Reconnect jitter as a fraction of the delay (0..1).")]
    pub jitter_ratio: Option<f64>,

    #[clap(long, env = "COSMIC_BATCH_WINDOW_MS", help = "Micro-batch window in milliseconds.")]
    pub batch_window_ms: Option<u64>,

    #[clap(long, env = "COSMIC_STALE_TIMEOUT_MS", help = "Milliseconds without updates before the snapshot is stale.")]
    pub stale_timeout_ms: Option<u64>,

    #[clap(long, env = "COSMIC_RING_BUFFER_SIZE", help = "Number of recent raw events kept.")]
    pub ring_buffer_size: Option<usize>,

    #[clap(long, env = "COSMIC_LATENCY_SMOOTHING", help = "EWMA weight of the newest latency sample (0..1].")]
    pub latency_smoothing_factor: Option<f64>,

    #[clap(long, env = "COSMIC_REFRESH_INTERVAL_MS", help = "Interval in milliseconds of full-update requests (0 = off).")]
    pub refresh_interval_ms: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            ws_url: other.ws_url.or(self.ws_url),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            stats_interval_seconds: other.stats_interval_seconds.or(self.stats_interval_seconds),
            base_delay_ms: other.base_delay_ms.or(self.base_delay_ms),
            max_delay_ms: other.max_delay_ms.or(self.max_delay_ms),
            jitter_ratio: other.jitter_ratio.or(self.jitter_ratio),
            batch_window_ms: other.batch_window_ms.or(self.batch_window_ms),
            stale_timeout_ms: other.stale_timeout_ms.or(self.stale_timeout_ms),
            ring_buffer_size: other.ring_buffer_size.or(self.ring_buffer_size),
            latency_smoothing_factor: other.latency_smoothing_factor.or(self.latency_smoothing_factor),
            refresh_interval_ms: other.refresh_interval_ms.or(self.refresh_interval_ms),
        }
    }

    /// Core tuning with every unset option at its library default.
    pub fn sync_config(&self) -> SyncConfig {
        let defaults = SyncConfig::default();
        SyncConfig {
            base_delay_ms: self.base_delay_ms.unwrap_or(defaults.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(defaults.max_delay_ms),
            jitter_ratio: self.jitter_ratio.unwrap_or(defaults.jitter_ratio),
            batch_window_ms: self.batch_window_ms.unwrap_or(defaults.batch_window_ms),
            stale_timeout_ms: self.stale_timeout_ms.unwrap_or(defaults.stale_timeout_ms),
            ring_buffer_size: self.ring_buffer_size.unwrap_or(defaults.ring_buffer_size),
            latency_smoothing_factor: self
                .latency_smoothing_factor
                .unwrap_or(defaults.latency_smoothing_factor),
            refresh_interval_ms: self.refresh_interval_ms.unwrap_or(defaults.refresh_interval_ms),
        }
    }
}

fn defaults() -> Config {
    Config {
        ws_url: Some("ws://localhost:3001/ws".to_string()),
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        stats_interval_seconds: Some(30),
        ..Default::default()
    }
}

pub fn load_config() -> Config {
    resolve(Config::parse())
}

/// Layers defaults, the config file and `cli` (which already carries the
/// environment variables), later sources overriding earlier ones.
pub fn resolve(cli: Config) -> Config {
    let mut current_config = defaults();

    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match json5::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => log::warn!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    current_config.merge(cli)
}
