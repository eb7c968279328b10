//! CLI argument definitions for the Tasklane binary.
//!
//! Uses `clap` with derive macros.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tasklane: turn natural-language commands into task actions.
#[derive(Parser, Debug)]
#[command(name = "tasklane", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Answer from canned replies (one JSON reply per line) instead of the
    /// configured providers.
    #[arg(long = "replies", global = true)]
    pub replies: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process a single command and print the response as JSON.
    Run {
        /// The command text, e.g. "crea una tarea para mañana".
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Process commands from stdin, one per line.
    Batch,
    /// Print the effective configuration as TOML.
    Config,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > TASKLANE_CONFIG env var > ~/.tasklane/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TASKLANE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > TASKLANE_LOG env var > config file value > "info".
    pub fn resolve_log_level(&self, config_level: Option<&str>) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(level) = std::env::var("TASKLANE_LOG") {
            if !level.trim().is_empty() {
                return level;
            }
        }
        config_level
            .filter(|l| !l.trim().is_empty())
            .unwrap_or("info")
            .to_string()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".tasklane").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".tasklane").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_joins_words() {
        let args = CliArgs::parse_from(["tasklane", "run", "crea", "una", "tarea"]);
        match args.command {
            Command::Run { text } => assert_eq!(text.join(" "), "crea una tarea"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_config_flag_wins() {
        let args = CliArgs::parse_from(["tasklane", "-c", "/tmp/t.toml", "config"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/t.toml"));
    }

    #[test]
    fn test_log_level_flag_wins_over_config() {
        let args = CliArgs::parse_from(["tasklane", "batch", "--log-level", "debug"]);
        assert_eq!(args.resolve_log_level(Some("warn")), "debug");
    }
}
