use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};
use serde::Deserialize;
use tracing::info;

use crate::network::{FeatureSet, StateKind};

// ─── Embedded Default ────────────────────────────────────────────────────
/// Baked into the binary at compile time and written out on first run.
const DEFAULT_CONFIG_TOML: &str = include_str!("../default_config.toml");

// ─── CLI Arguments (override layer) ─────────────────────────────────────
/// canary — watch WiFi and mobile-data radio state
#[derive(Parser, Debug, Clone)]
#[command(name = "canary", version, about, long_about = None)]
pub struct CliArgs {
    /// Path to a custom config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (overrides config file)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log file path (overrides config file)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Print the default config to stdout and exit
    #[arg(long)]
    pub print_default_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Follow NetworkManager radio state until interrupted (default)
    Watch {
        /// Monitor the WiFi radio
        #[arg(long)]
        wifi: bool,
        /// Monitor the mobile broadband radio
        #[arg(long)]
        mobile: bool,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Replay a scripted WiFi cycle through an in-process broadcaster
    Simulate {
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
        /// Pause between events in milliseconds (overrides config file)
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Switch a radio on or off through NetworkManager
    Radio {
        /// wifi or mobile
        kind: StateKind,
        #[arg(value_enum)]
        action: RadioAction,
    },
    /// Show NetworkManager version and radio switches
    Status,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioAction {
    On,
    Off,
    Toggle,
}

// ─── TOML Structs ───────────────────────────────────────────────────────

/// Root configuration — parsed from TOML, then overridden by CLI flags.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub simulate: SimulateConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level
    pub log_level: String,

    /// Log file (empty string = stderr)
    pub log_file: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    pub wifi: bool,
    pub mobile: bool,
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimulateConfig {
    pub step_delay_ms: u64,
}

// ─── Defaults ───────────────────────────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: String::new(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            wifi: true,
            mobile: false,
            json: false,
        }
    }
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self { step_delay_ms: 200 }
    }
}

// ─── Path Resolution ────────────────────────────────────────────────────

impl Config {
    /// Standard config file path: ~/.config/canary/config.toml
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("canary")
            .join("config.toml")
    }

    /// Log file as Option (empty = None)
    pub fn log_file(&self) -> Option<PathBuf> {
        let path = self.general.log_file.trim();
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }

    /// Radios to monitor in watch mode
    pub fn features(&self) -> FeatureSet {
        let mut features = FeatureSet::NONE;
        if self.watch.wifi {
            features = features | FeatureSet::WIFI;
        }
        if self.watch.mobile {
            features = features | FeatureSet::MOBILE;
        }
        features
    }

    /// Pause between simulated events as Duration
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.simulate.step_delay_ms)
    }

    /// Apply CLI flags on top of the file values
    pub fn apply_overrides(&mut self, cli: &CliArgs) {
        if let Some(ref level) = cli.log_level {
            self.general.log_level = level.clone();
        }
        if let Some(ref path) = cli.log_file {
            self.general.log_file = path.display().to_string();
        }
        match cli.command {
            Some(Command::Watch { wifi, mobile, json }) => {
                if wifi || mobile {
                    self.watch.wifi = wifi;
                    self.watch.mobile = mobile;
                }
                if json {
                    self.watch.json = true;
                }
            }
            Some(Command::Simulate { json, delay_ms }) => {
                if json {
                    self.watch.json = true;
                }
                if let Some(delay) = delay_ms {
                    self.simulate.step_delay_ms = delay;
                }
            }
            _ => {}
        }
    }
}

// ─── Bootloader ─────────────────────────────────────────────────────────

/// The single entry point for configuration. Called exactly once at startup.
///
/// 1. Resolve config file path (CLI override or default)
/// 2. If the file doesn't exist, create directory tree + write defaults
/// 3. Parse TOML from disk into Config
/// 4. Apply CLI overrides on top
pub fn load(cli: &CliArgs) -> Result<Config> {
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);

    if !config_path.exists() {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&config_path, DEFAULT_CONFIG_TOML).wrap_err_with(|| {
            format!(
                "Failed to write default config to {}",
                config_path.display()
            )
        })?;
        info!("Created default config at {}", config_path.display());
    }

    let toml_str = std::fs::read_to_string(&config_path)
        .wrap_err_with(|| format!("Failed to read config from {}", config_path.display()))?;

    let mut config = parse(&toml_str).wrap_err_with(|| {
        format!(
            "Failed to parse config at {}.\n\
             Delete the file to regenerate defaults, or run:\n  \
             canary --print-default-config > {:?}",
            config_path.display(),
            config_path
        )
    })?;

    config.apply_overrides(cli);
    Ok(config)
}

/// Parse a TOML document into a Config; missing keys take their defaults
pub fn parse(toml_str: &str) -> std::result::Result<Config, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns the embedded default config TOML string.
pub fn default_config_toml() -> &'static str {
    DEFAULT_CONFIG_TOML
}
