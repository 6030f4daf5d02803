//! Directory download: list the remote directory once, copy each file into
//! the dated local directory.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use ssh2::Sftp;
use tracing::{debug, error, info, trace};

use crate::config::TransferConfig;
use crate::error::TransferError;

/// Name of the per-day output directory.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One row of a remote directory listing.
///
/// `name` and `path` keep the bytes the server sent, so names that are not
/// valid UTF-8 still round-trip to `open_file` and to the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: OsString,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: Option<u64>,
}

/// The remote side of a download: list one directory, open one file.
pub trait RemoteFs {
    type File: Read;

    /// Entries directly under `dir`, without `.` and `..`.
    fn list_dir(&self, dir: &str) -> io::Result<Vec<RemoteEntry>>;

    fn open_file(&self, path: &Path) -> io::Result<Self::File>;
}

impl RemoteFs for Sftp {
    type File = ssh2::File;

    fn list_dir(&self, dir: &str) -> io::Result<Vec<RemoteEntry>> {
        let entries = self.readdir(Path::new(dir))?;
        Ok(entries
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_os_string();
                Some(RemoteEntry {
                    name,
                    path,
                    is_dir: stat.is_dir(),
                    size: stat.size,
                })
            })
            .collect())
    }

    fn open_file(&self, path: &Path) -> io::Result<ssh2::File> {
        Ok(self.open(path)?)
    }
}

/// What one successful pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub dir: PathBuf,
    pub files: Vec<OsString>,
    pub bytes: u64,
}

/// `<base>/<YYYY-MM-DD>`
pub fn dated_dir(base: &Path, date: NaiveDate) -> PathBuf {
    base.join(date.format(DATE_FORMAT).to_string())
}

/// Download into the directory for today's local date.
pub fn download_today<R: RemoteFs>(
    remote: &R,
    config: &TransferConfig,
) -> Result<DownloadReport, TransferError> {
    download(remote, config, Local::now().date_naive())
}

/// Copy every non-directory entry of `config.remote_dir` into
/// `<config.local_dir>/<date>/`. Stops at the first failure; files copied
/// before it stay on disk.
pub fn download<R: RemoteFs>(
    remote: &R,
    config: &TransferConfig,
    date: NaiveDate,
) -> Result<DownloadReport, TransferError> {
    let entries = remote.list_dir(&config.remote_dir).map_err(|source| {
        error!(dir = %config.remote_dir, error = %source, "error while listing");
        TransferError::ListDir {
            path: config.remote_dir.clone(),
            source,
        }
    })?;
    for entry in entries.iter().filter(|e| !e.is_dir) {
        debug!(file = %entry.path.display(), size = ?entry.size, "found file");
    }

    let dir = dated_dir(&config.local_dir, date);
    create_dir(&dir).map_err(|source| {
        error!(dir = %dir.display(), error = %source, "unable to create local directory");
        TransferError::CreateDir {
            path: dir.clone(),
            source,
        }
    })?;
    info!(dir = %dir.display(), "created dir");

    let mut report = DownloadReport {
        dir,
        files: Vec::new(),
        bytes: 0,
    };
    for entry in &entries {
        if entry.is_dir {
            trace!(dir = %entry.path.display(), "skipping directory");
            continue;
        }
        let bytes = receive(remote, entry, &report.dir, config.show_progress)?;
        info!(file = %entry.path.display(), bytes, "received");
        report.files.push(entry.name.clone());
        report.bytes += bytes;
    }
    Ok(report)
}

#[cfg(unix)]
fn create_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o777).create(dir)
}

#[cfg(not(unix))]
fn create_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

/// Copy one remote file. Both handles close when this returns.
fn receive<R: RemoteFs>(
    remote: &R,
    entry: &RemoteEntry,
    dest: &Path,
    show_progress: bool,
) -> Result<u64, TransferError> {
    let local_path = dest.join(&entry.name);
    let mut out = File::create(&local_path).map_err(|source| {
        error!(file = %local_path.display(), error = %source, "can not open local file");
        TransferError::CreateFile {
            path: local_path.clone(),
            source,
        }
    })?;

    let path = entry.path.as_path();
    let mut input = remote.open_file(path).map_err(|source| {
        error!(file = %path.display(), error = %source, "unable to open remote file");
        TransferError::OpenRemote {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let copy_err = |source: io::Error| {
        error!(file = %path.display(), error = %source, "error while receiving");
        TransferError::Copy {
            path: path.to_path_buf(),
            source,
        }
    };

    let pb = progress_bar(entry.size, show_progress);
    let mut buf = [0u8; 8192];
    let mut transferred = 0u64;

    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(copy_err(e)),
        };
        out.write_all(&buf[..n]).map_err(copy_err)?;
        transferred += n as u64;
        pb.set_position(transferred);
    }
    out.flush().map_err(copy_err)?;

    pb.finish_and_clear();
    Ok(transferred)
}

fn progress_bar(size: Option<u64>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(size.unwrap_or(0));
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.yellow/blue}] {bytes}/{total_bytes} ({eta})",
    ) {
        pb.set_style(style);
    }
    pb
}
