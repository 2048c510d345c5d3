//! Command-line interface for `hearthd`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hearth_domain::config::Config;

#[derive(Parser)]
#[command(name = "hearthd", about = "Hearth personal assistant gateway", version)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "hearth.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway (the default).
    Serve,
    /// Load the config, report problems, and exit.
    ConfigCheck,
    /// Print the version and exit.
    Version,
}

pub fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    Config::load(path).map_err(|e| anyhow::anyhow!("loading config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_is_serve() {
        let cli = Cli::parse_from(["hearthd"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("hearth.toml"));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["hearthd", "config-check", "--config", "/tmp/h.toml"]);
        assert!(matches!(cli.command, Some(Command::ConfigCheck)));
        assert_eq!(cli.config, PathBuf::from("/tmp/h.toml"));
    }
}
