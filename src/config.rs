//! Runtime configuration for aio-race.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Missing sections and fields fall back to their defaults.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

/// Environment variable holding the Anthropic API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "aio-race", about = "Race coordinator demo and Anthropic chat proxy")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP service (default).
    Serve,

    /// Run the race demo once and print the outcome.
    Demo {
        /// Decider's verdict: whether the dependent may finish.
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        proceed: bool,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Upstream Anthropic API.
    pub anthropic: AnthropicConfig,

    /// Race coordinator and demo timings.
    pub race: RaceConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8000").
    pub listen: String,

    /// Upstream request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 300,
        }
    }
}

/// Anthropic Messages API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    /// API base URL, without the `/v1/messages` suffix.
    pub base_url: String,

    /// Value of the `anthropic-version` header.
    pub api_version: String,

    /// API key. When absent, `ANTHROPIC_API_KEY` is consulted.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Model used when a request does not name one.
    pub default_model: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_version: "2023-06-01".to_string(),
            api_key: None,
            default_model: "claude-3-5-sonnet-20241022".to_string(),
        }
    }
}

impl AnthropicConfig {
    /// The configured key, or the one from the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Race coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Bound on waiting for a cancellation acknowledgment (None = wait indefinitely).
    pub cancel_timeout_ms: Option<u64>,

    /// How long the demo decider runs before deciding.
    pub decider_delay_ms: u64,

    /// How long the demo dependent runs if not cancelled.
    pub dependent_delay_ms: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            cancel_timeout_ms: None,
            decider_delay_ms: 1000,
            dependent_delay_ms: 3000,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.race.decider_delay_ms, 1000);
        assert_eq!(cfg.race.dependent_delay_ms, 3000);
        assert!(cfg.race.cancel_timeout_ms.is_none());
        assert_eq!(cfg.anthropic.default_model, "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"race": {"cancel_timeout_ms": 250}}"#).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.race.cancel_timeout_ms, Some(250));
        assert_eq!(cfg.race.decider_delay_ms, 1000);
        assert_eq!(cfg.server.listen, "0.0.0.0:8000");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/aio-race.json")).unwrap();
        assert_eq!(cfg.server.request_timeout_secs, 300);
    }

    #[test]
    fn test_configured_key_wins() {
        let cfg = AnthropicConfig {
            api_key: Some("sk-test".to_string()),
            ..AnthropicConfig::default()
        };
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("sk-test"));

        let blank = AnthropicConfig {
            api_key: Some("  ".to_string()),
            ..AnthropicConfig::default()
        };
        // A blank key is treated as missing, whatever the environment holds.
        assert_ne!(blank.resolve_api_key().as_deref(), Some("  "));
    }

    #[test]
    fn test_cli_demo_subcommand() {
        let cli = Cli::parse_from(["aio-race", "demo", "--proceed", "false"]);
        assert!(matches!(cli.command, Some(Command::Demo { proceed: false })));

        let cli = Cli::parse_from(["aio-race", "--listen", "127.0.0.1:9000"]);
        assert_eq!(cli.listen.as_deref(), Some("127.0.0.1:9000"));
        assert!(cli.command.is_none());
    }
}
