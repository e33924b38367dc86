use std::path::PathBuf;

use clap::Parser;

use crate::config::{AppConfig, DEVELOPMENT_ENV};
use crate::logging::LogFormat;

/// `stackdemo` command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stackdemo",
    about = "Demo HTTP service backed by PostgreSQL, Redis and NSQ",
    version
)]
pub struct Cli {
    /// Environment name; selects `stackdemo.<env>.toml`.
    #[arg(long, env = "STACKDEMO_ENV", default_value = DEVELOPMENT_ENV)]
    pub env: String,

    /// Directory holding the config file. Defaults to `files/etc/config`
    /// in development and `/etc/config` otherwise.
    #[arg(long, env = "STACKDEMO_CONFIG_DIR", value_name = "dir")]
    pub config_dir: Option<PathBuf>,

    /// Serve from in-memory stores without connecting to any backend.
    #[arg(long)]
    pub in_memory: bool,

    #[arg(long, env = "STACKDEMO_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Config file selected by `--env` and `--config-dir`.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        AppConfig::path_for(&self.env, self.config_dir.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn explicit_arguments() {
        let cli = Cli::try_parse_from([
            "stackdemo",
            "--env",
            "staging",
            "--config-dir",
            "/srv/config",
            "--in-memory",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.env, "staging");
        assert!(cli.in_memory);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(
            cli.config_path(),
            PathBuf::from("/srv/config/stackdemo.staging.toml")
        );
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["stackdemo", "--log-format", "xml"]).is_err());
    }
}
