//! CLI arguments and server settings.
//!
//! Settings come from a TOML config file with per-field defaults, then
//! environment variables, then CLI flags (highest precedence).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::model::Backend;

/// Environment variable selecting the default spawn backend.
pub const BACKEND_ENV: &str = "OPENCODE_TEAMS_BACKEND";

/// Environment variable switching tmux spawns from panes to windows.
pub const USE_TMUX_WINDOWS_ENV: &str = "USE_TMUX_WINDOWS";

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about = "Team coordination server for OpenCode agents")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// State root directory (default: ~/.opencode-teams)
    #[arg(long)]
    pub root: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Server settings (from config file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Agent binary launched inside panes
    #[serde(default = "default_agent_binary")]
    pub agent_binary: String,

    /// Backend used when a spawn request does not name one
    #[serde(default)]
    pub default_backend: Backend,

    /// Open tmux windows instead of split panes
    #[serde(default)]
    pub use_tmux_windows: bool,

    /// Wall-clock bound wrapped around each spawned agent (seconds)
    #[serde(default = "default_spawn_timeout_secs")]
    pub spawn_timeout_secs: u64,

    /// Timeout for each tmux subprocess call (seconds)
    #[serde(default = "default_tmux_timeout_secs")]
    pub tmux_timeout_secs: u64,

    /// Scrollback lines captured for health hashing
    #[serde(default = "default_capture_lines")]
    pub capture_lines: u32,

    /// Startup window during which a quiet pane still reports alive (ms)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: i64,

    /// Unchanged-content threshold for the hung classification (ms)
    #[serde(default = "default_hung_timeout_ms")]
    pub hung_timeout_ms: i64,

    /// State root directory override
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
}

fn default_agent_binary() -> String {
    "opencode".to_string()
}

fn default_spawn_timeout_secs() -> u64 {
    300
}

fn default_tmux_timeout_secs() -> u64 {
    5
}

fn default_capture_lines() -> u32 {
    100
}

fn default_grace_period_ms() -> i64 {
    60_000
}

fn default_hung_timeout_ms() -> i64 {
    120_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent_binary: default_agent_binary(),
            default_backend: Backend::default(),
            use_tmux_windows: false,
            spawn_timeout_secs: default_spawn_timeout_secs(),
            tmux_timeout_secs: default_tmux_timeout_secs(),
            capture_lines: default_capture_lines(),
            grace_period_ms: default_grace_period_ms(),
            hung_timeout_ms: default_hung_timeout_ms(),
            root_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from the given config file or the default locations;
    /// fall back to defaults when no file exists.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(p) = path {
            if p.exists() {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {:?}", p))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", p));
            }
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("opencode-teams/config.toml")),
            dirs::home_dir().map(|p| p.join(".opencode-teams.toml")),
        ];
        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path));
            }
        }

        Ok(Self::default())
    }

    /// Apply recognized environment variables. Unrecognized variables are
    /// ignored; an unparsable backend value is ignored too.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(BACKEND_ENV) {
            match value.parse::<Backend>() {
                Ok(backend) => self.default_backend = backend,
                Err(_) => {
                    tracing::warn!(value = %value, "ignoring unrecognized {} value", BACKEND_ENV);
                }
            }
        }
        if let Ok(value) = std::env::var(USE_TMUX_WINDOWS_ENV) {
            self.use_tmux_windows = matches!(value.as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(dir) = std::env::var_os(crate::store::paths::ROOT_DIR_ENV) {
            self.root_dir = Some(PathBuf::from(dir));
        }
    }

    /// Merge CLI flags into settings (CLI takes precedence).
    pub fn merge_cli(&mut self, cli: &Cli) {
        if let Some(root) = &cli.root {
            self.root_dir = Some(root.clone());
        }
    }

    /// Clamp values that would break the probe state machine.
    pub fn validate(&mut self) {
        if self.spawn_timeout_secs == 0 {
            self.spawn_timeout_secs = default_spawn_timeout_secs();
        }
        if self.tmux_timeout_secs == 0 {
            self.tmux_timeout_secs = default_tmux_timeout_secs();
        }
        if self.capture_lines == 0 {
            self.capture_lines = default_capture_lines();
        }
        self.grace_period_ms = self.grace_period_ms.max(0);
        self.hung_timeout_ms = self.hung_timeout_ms.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.agent_binary, "opencode");
        assert_eq!(settings.default_backend, Backend::Terminal);
        assert_eq!(settings.spawn_timeout_secs, 300);
        assert_eq!(settings.tmux_timeout_secs, 5);
        assert_eq!(settings.grace_period_ms, 60_000);
        assert_eq!(settings.hung_timeout_ms, 120_000);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            agent_binary = "/usr/local/bin/opencode"
            default_backend = "desktop"
            use_tmux_windows = true
            hung_timeout_ms = 240000
        "#;
        let settings: Settings = toml::from_str(toml).expect("Should parse TOML");
        assert_eq!(settings.agent_binary, "/usr/local/bin/opencode");
        assert_eq!(settings.default_backend, Backend::Desktop);
        assert!(settings.use_tmux_windows);
        assert_eq!(settings.hung_timeout_ms, 240_000);
        // Unspecified fields keep their defaults.
        assert_eq!(settings.spawn_timeout_secs, 300);
    }

    #[test]
    fn test_validate_clamps() {
        let mut settings = Settings {
            spawn_timeout_secs: 0,
            tmux_timeout_secs: 0,
            capture_lines: 0,
            grace_period_ms: -5,
            hung_timeout_ms: 0,
            ..Settings::default()
        };
        settings.validate();
        assert_eq!(settings.spawn_timeout_secs, 300);
        assert_eq!(settings.tmux_timeout_secs, 5);
        assert_eq!(settings.capture_lines, 100);
        assert_eq!(settings.grace_period_ms, 0);
        assert_eq!(settings.hung_timeout_ms, 1);
    }
}
