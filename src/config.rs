//! Configuration management for themerack.
//!
//! This module defines the structure of the `themerack.toml` configuration file,
//! loads it, and resolves it (together with command-line overrides) into the
//! settings the rest of the application runs with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::command::{
    CommandTemplate, DEFAULT_CLONE_COMMAND, DEFAULT_DEV_COMMAND, DEFAULT_PULL_COMMAND,
    DEFAULT_PUSH_COMMAND,
};
use crate::output::DEFAULT_MAX_LINES;
use crate::ports::DEFAULT_BASE_PORT;
use crate::supervisor::SupervisorConfig;

pub const CONFIG_FILE: &str = "themerack.toml";
pub const STORES_FILE: &str = "stores.json";
pub const LOG_FILE: &str = "themerack.log";
const APP_DIR: &str = "themerack";
const DEFAULT_STOP_GRACE_MS: u64 = 5_000;
const DEFAULT_TICK_MS: u64 = 500;

/// Top-level configuration structure corresponding to `themerack.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Dev-server command template (`{store}` and `{port}` are substituted).
    pub dev_command: Option<String>,
    /// Command used to pull a theme into a working copy.
    pub pull_command: Option<String>,
    /// Command used to push a working copy to the store.
    pub push_command: Option<String>,
    /// Command used to clone a theme repository (`{git_url}` is substituted).
    pub clone_command: Option<String>,
    /// First port handed out to a dev server.
    pub base_port: Option<u16>,
    /// Maximum number of log lines kept per dev server.
    pub max_log_lines: Option<usize>,
    /// Milliseconds between a stop signal and a forced kill (0 kills only on quit).
    pub stop_grace_ms: Option<u64>,
    /// UI refresh interval in milliseconds.
    pub tick_ms: Option<u64>,
    /// Path of the store list.
    pub stores_file: Option<PathBuf>,
    /// Directory holding the stores' working copies.
    pub themes_dir: Option<PathBuf>,
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// `<platform config dir>/themerack`, falling back to the working directory.
pub fn app_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
}

pub fn default_config_path() -> Option<PathBuf> {
    let path = app_dir().join(CONFIG_FILE);
    path.is_file().then_some(path)
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_port: Option<u16>,
    pub max_log_lines: Option<usize>,
    pub stop_grace_ms: Option<u64>,
    pub stores_file: Option<PathBuf>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub supervisor: SupervisorConfig,
    pub pull_command: CommandTemplate,
    pub push_command: CommandTemplate,
    pub clone_command: CommandTemplate,
    pub tick: Duration,
    pub stores_file: PathBuf,
    pub themes_dir: PathBuf,
    pub log_file: PathBuf,
}

impl Settings {
    pub fn resolve(config: Config, overrides: Overrides) -> Result<Self> {
        let base = app_dir();
        let dev_command = parse_or(&config.dev_command, DEFAULT_DEV_COMMAND, "dev_command")?;
        let pull_command = parse_or(&config.pull_command, DEFAULT_PULL_COMMAND, "pull_command")?;
        let push_command = parse_or(&config.push_command, DEFAULT_PUSH_COMMAND, "push_command")?;
        let clone_command =
            parse_or(&config.clone_command, DEFAULT_CLONE_COMMAND, "clone_command")?;

        let stop_grace_ms = overrides
            .stop_grace_ms
            .or(config.stop_grace_ms)
            .unwrap_or(DEFAULT_STOP_GRACE_MS);
        let supervisor = SupervisorConfig {
            dev_command,
            base_port: overrides
                .base_port
                .or(config.base_port)
                .unwrap_or(DEFAULT_BASE_PORT),
            max_log_lines: overrides
                .max_log_lines
                .or(config.max_log_lines)
                .unwrap_or(DEFAULT_MAX_LINES)
                .max(1),
            stop_grace: Duration::from_millis(stop_grace_ms),
        };

        Ok(Self {
            supervisor,
            pull_command,
            push_command,
            clone_command,
            tick: Duration::from_millis(config.tick_ms.unwrap_or(DEFAULT_TICK_MS).max(50)),
            stores_file: overrides
                .stores_file
                .or(config.stores_file)
                .unwrap_or_else(|| base.join(STORES_FILE)),
            themes_dir: config.themes_dir.unwrap_or_else(|| base.join("themes")),
            log_file: base.join(LOG_FILE),
        })
    }
}

fn parse_or(raw: &Option<String>, default: &str, field: &str) -> Result<CommandTemplate> {
    let raw = raw.as_deref().unwrap_or(default);
    CommandTemplate::parse(raw).with_context(|| format!("invalid {}", field))
}
