use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

/// Command-line surface of the binary.
#[derive(Parser, Debug)]
#[command(
    name = "rbackup",
    version,
    about = "Download a remote directory over SFTP into a dated local directory"
)]
pub struct Cli {
    /// Server DNS name
    #[arg(long, default_value = "")]
    pub server: String,

    /// Server port number
    #[arg(long, default_value_t = 22)]
    pub port: u16,

    /// User name
    #[arg(short = 'u', long = "user", default_value = "root")]
    pub user: String,

    /// Password; leave empty to authenticate through ssh-agent only
    #[arg(
        short,
        long,
        env = "RBACKUP_PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub password: String,

    /// Remote directory
    #[arg(long = "remotedir", default_value = "")]
    pub remote_dir: String,

    /// Local directory; files land in <localdir>/<YYYY-MM-DD>/
    #[arg(long = "localdir", default_value = ".")]
    pub local_dir: PathBuf,

    /// TCP connect timeout in seconds; 0 (the default) waits forever
    #[arg(long = "connect-timeout", value_name = "SECS", default_value_t = 0)]
    pub connect_timeout: u64,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors, no progress bars
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

/// Everything one backup run needs. Built once from the command line and
/// only ever borrowed afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub remote_dir: String,
    pub local_dir: PathBuf,
    pub connect_timeout: Option<Duration>,
    pub show_progress: bool,
}

impl TransferConfig {
    /// `host:port` as handed to the resolver.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

impl From<&Cli> for TransferConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            server: cli.server.clone(),
            port: cli.port,
            username: cli.user.clone(),
            password: Some(cli.password.clone()).filter(|p| !p.is_empty()),
            remote_dir: cli.remote_dir.clone(),
            local_dir: cli.local_dir.clone(),
            connect_timeout: Some(Duration::from_secs(cli.connect_timeout))
                .filter(|t| !t.is_zero()),
            show_progress: !cli.quiet,
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("remote_dir", &self.remote_dir)
            .field("local_dir", &self.local_dir)
            .field("connect_timeout", &self.connect_timeout)
            .field("show_progress", &self.show_progress)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rbackup").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn defaults_match_the_documented_table() {
        let cli = parse(&["--password", ""]);
        let config = TransferConfig::from(&cli);

        assert_eq!(config.server, "");
        assert_eq!(config.port, 22);
        assert_eq!(config.username, "root");
        assert_eq!(config.password, None);
        assert_eq!(config.remote_dir, "");
        assert_eq!(config.local_dir, PathBuf::from("."));
        assert_eq!(config.connect_timeout, None);
        assert!(config.show_progress);
    }

    #[test]
    fn full_command_line() {
        let cli = parse(&[
            "--server",
            "backup.example.com",
            "--port",
            "2222",
            "-u",
            "alice",
            "-p",
            "hunter2",
            "--remotedir",
            "/var/log",
            "--localdir",
            "/srv/backups",
            "--connect-timeout",
            "30",
            "-q",
        ]);
        let config = TransferConfig::from(&cli);

        assert_eq!(config.address(), "backup.example.com:2222");
        assert_eq!(config.username, "alice");
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.remote_dir, "/var/log");
        assert_eq!(config.local_dir, PathBuf::from("/srv/backups"));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
        assert!(!config.show_progress);
    }

    #[test]
    fn log_level_follows_flags() {
        assert_eq!(parse(&["-p", ""]).log_level(), "info");
        assert_eq!(parse(&["-p", "", "-v"]).log_level(), "debug");
        assert_eq!(parse(&["-p", "", "-vvv"]).log_level(), "trace");
        assert_eq!(parse(&["-p", "", "-q", "-v"]).log_level(), "error");
    }

    #[test]
    fn debug_output_hides_password() {
        let config = TransferConfig::from(&parse(&["-p", "s3cret"]));
        let rendered = format!("{config:?}");

        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
