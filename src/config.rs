//! Run configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, `config/multiboard.toml` by default)
//! 2. environment variables prefixed with `MULTIBOARD_`, nested keys separated
//!    by a double underscore (`MULTIBOARD_APPLICATION__LOG_LEVEL=debug`)
//!
//! # Example
//! ```no_run
//! use multiboard_daq::config::RunConfig;
//!
//! let config = RunConfig::load()?;
//! config.validate()?;
//! println!("Boards: {}", config.enabled_boards().count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashSet;
use std::path::Path;

use daq_board::{AcquisitionConfig, SimMode, SimOptions};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::logging::OutputFormat;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/multiboard.toml";

/// Top-level run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Acquisition run settings
    #[serde(default)]
    pub run: RunSettings,
    /// Board definitions, in group order
    #[serde(default)]
    pub boards: Vec<BoardDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: OutputFormat,
}

/// How long to run and what to report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Rounds to collect before removing the callback
    #[serde(default = "default_rounds")]
    pub rounds: u64,
    /// Rounds buffered between the barrier thread and the consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Print a per-board summary line for every round
    #[serde(default = "default_enabled")]
    pub print_summary: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            channel_capacity: default_channel_capacity(),
            print_summary: default_enabled(),
        }
    }
}

/// One simulated board in the group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardDefinition {
    /// Board identifier
    pub id: u32,
    /// Whether this board joins the group
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Acquisition parameters
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Simulation behaviour
    #[serde(default = "default_simulation")]
    pub simulation: SimOptions,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_rounds() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    16
}

fn default_enabled() -> bool {
    true
}

fn default_simulation() -> SimOptions {
    SimOptions {
        mode: SimMode::FreeRunning,
        ..SimOptions::default()
    }
}

impl RunConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MULTIBOARD_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.run.rounds == 0 {
            return Err("run.rounds must be greater than 0".to_string());
        }

        if self.run.channel_capacity == 0 {
            return Err("run.channel_capacity must be greater than 0".to_string());
        }

        let mut ids = HashSet::new();
        for board in &self.boards {
            if !ids.insert(board.id) {
                return Err(format!("Duplicate board ID: {}", board.id));
            }
            board
                .acquisition
                .validate()
                .map_err(|e| format!("Board {}: {}", board.id, e))?;
        }

        if self.enabled_boards().next().is_none() {
            return Err("At least one board must be enabled".to_string());
        }

        Ok(())
    }

    /// Enabled boards, in group order
    pub fn enabled_boards(&self) -> impl Iterator<Item = &BoardDefinition> {
        self.boards.iter().filter(|board| board.enabled)
    }
}
