//! CLI argument definitions for lockout-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use lockout_core::LockoutConfig;

/// Lockout automated account response daemon.
///
/// Receives misuse alerts over HTTP, disables the reported EZproxy
/// accounts and terminates their active sessions.
#[derive(Parser, Debug)]
#[command(name = "lockout-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to lockout.toml configuration file.
    #[arg(short, long, default_value = "/etc/lockout/lockout.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path. An empty string disables the PID file.
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply command-line overrides on top of file and environment values.
    pub fn apply_overrides(&self, config: &mut LockoutConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_take_precedence() {
        let cli = DaemonCli::parse_from([
            "lockout-daemon",
            "--config",
            "/tmp/lockout.toml",
            "--log-level",
            "debug",
            "--pid-file",
            "",
        ]);
        let mut config = LockoutConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(cli.config, PathBuf::from("/tmp/lockout.toml"));
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "json");
        assert!(config.general.pid_file.is_empty());
    }

    #[test]
    fn defaults() {
        let cli = DaemonCli::parse_from(["lockout-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/lockout/lockout.toml"));
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());
    }
}
