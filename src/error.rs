//! Failure taxonomy for a backup run. Every variant is terminal.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    /// `host:port` did not resolve to any address
    #[error("unable to resolve [{addr}]")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// TCP connect failed or timed out
    #[error("unable to connect to [{addr}]")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// SSH session setup or key exchange failed
    #[error("SSH handshake with [{addr}] failed")]
    Handshake {
        addr: String,
        #[source]
        source: ssh2::Error,
    },

    /// Every registered auth method was refused
    #[error("authentication rejected for {user}@{addr} (tried: {tried})")]
    AuthRejected {
        user: String,
        addr: String,
        tried: String,
    },

    #[error("unable to start sftp subsystem")]
    Sftp {
        #[source]
        source: ssh2::Error,
    },

    #[error("unable to list remote directory '{path}'")]
    ListDir {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unable to create local directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to create local file {}", .path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to open remote file '{}'", .path.display())]
    OpenRemote {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error while receiving '{}'", .path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// True for failures that happen before any SFTP traffic.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Resolve { .. }
                | Self::Connect { .. }
                | Self::Handshake { .. }
                | Self::AuthRejected { .. }
                | Self::Sftp { .. }
        )
    }
}
