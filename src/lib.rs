//! Flow: parse [`Cli`] into a [`TransferConfig`], open one [`Connection`],
//! run [`download_today`] over its SFTP channel, drop the connection.

pub mod config;
pub mod download;
pub mod error;
pub mod logging;
pub mod session;

use clap::Parser;
use colored::*;
use tracing::{debug, info};

pub use config::{Cli, TransferConfig};
pub use download::{DownloadReport, RemoteEntry, RemoteFs, download, download_today};
pub use error::TransferError;
pub use session::Connection;

/// Connect, download, disconnect. The connection is released before this
/// returns, on success and on failure.
pub fn backup(config: &TransferConfig) -> Result<DownloadReport, TransferError> {
    let connection = Connection::connect(config)?;
    download_today(connection.sftp(), config)
}

/// Entry point for the binary. `Err` carries the process exit code.
pub fn run() -> Result<(), i32> {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.log_level()) {
        eprintln!("{}", format!("{e:#}").yellow());
    }

    let config = TransferConfig::from(&cli);

    match backup(&config) {
        Ok(report) => {
            info!(dir = %report.dir.display(), files = report.files.len(), "Backup done.");
            if !cli.quiet {
                println!(
                    "{}",
                    format!(
                        "✅ Backup done: {} file(s), {} bytes → {}",
                        report.files.len(),
                        report.bytes,
                        report.dir.display()
                    )
                    .green()
                );
            }
            Ok(())
        }
        Err(e) => {
            let stage = if e.is_connection_failure() {
                "Connection failed"
            } else {
                "Backup failed"
            };
            // Already logged where it happened.
            debug!(error = %e, "{stage}");
            eprintln!("{}", format!("\n{stage}: {:#}", anyhow::Error::from(e)).red());
            Err(1)
        }
    }
}
