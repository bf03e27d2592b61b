// Copyright 2021 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
#![deny(missing_docs)]
#![deny(warnings)]

//! File-backed logger initialization for the `cpualloc` binary.

use chrono::offset::{Local, Utc};
use chrono::DateTime;
use flexi_logger::writers::LogWriter;
use flexi_logger::{DeferredNow, Record};
use nix::unistd::Uid;
use std::env;
use std::fs::{File, OpenOptions, Permissions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// The default logging level used when `RUST_LOG` is not set.
const DEFAULT_LOG_LEVEL: &str = "info";

/// The environment variable which holds the path to the logging directory.
const LOGS_DIR_PATH_ENV_VAR: &str = "CPUALLOC_LOGS_PATH";

/// The default path to the logging directory.
const LOGS_DIR_PATH: &str = "/var/log/cpualloc";

/// The name of the output log file.
const LOG_FILE_NAME: &str = "cpualloc.log";

/// Logger initialization errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The log file could not be opened or adjusted.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The logging backend rejected its configuration.
    #[error(transparent)]
    Init(#[from] flexi_logger::FlexiLoggerError),
}

/// A log writer appending timestamped records to the shared log file.
#[derive(Clone)]
pub struct AllocLogWriter {
    out_file: Arc<Mutex<File>>,
}

impl AllocLogWriter {
    /// Create a new log writer over the configured log file.
    fn new() -> Result<Self, Error> {
        Ok(AllocLogWriter {
            out_file: Arc::new(Mutex::new(open_log_file(&log_file_path())?)),
        })
    }

    /// Generate a single message string.
    fn create_msg(&self, now: &DateTime<Local>, record: &Record) -> String {
        // UTC timestamp according to RFC 3339.
        let timestamp = DateTime::<Utc>::from_naive_utc_and_offset(now.naive_utc(), Utc)
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        format!(
            "[{}][{}][{}:{}] {}\n",
            record.level(),
            timestamp,
            record.file().unwrap_or("?"),
            record.line().unwrap_or(0),
            &record.args()
        )
    }
}

impl LogWriter for AllocLogWriter {
    fn write(&self, now: &mut DeferredNow, record: &Record) -> IoResult<()> {
        let record_str = self.create_msg(now.now(), record);
        let mut out_file = self
            .out_file
            .lock()
            .map_err(|_| IoError::new(ErrorKind::Other, "failed to lock log file"))?;
        out_file.write_all(record_str.as_bytes())
    }

    fn flush(&self) -> IoResult<()> {
        Ok(())
    }

    fn max_log_level(&self) -> log::LevelFilter {
        // The log level is either given in RUST_LOG or defaults to a specified value.
        let level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        match level.to_lowercase().as_ref() {
            "debug" => log::LevelFilter::Debug,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }
}

/// Get the directory containing cpualloc log files.
fn log_file_base_path() -> String {
    match env::var(LOGS_DIR_PATH_ENV_VAR) {
        Ok(env_path) => env_path,
        Err(_) => LOGS_DIR_PATH.to_string(),
    }
}

/// Get the path to the log file.
fn log_file_path() -> PathBuf {
    Path::new(&log_file_base_path()).join(LOG_FILE_NAME)
}

/// Open a file at a given location for writing and appending.
fn open_log_file(file_path: &Path) -> Result<File, Error> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .read(false)
        .open(file_path)?;

    let log_file_uid = Uid::from_raw(file.metadata()?.uid());

    // Any user may run the CLI, so the shared log file stays writable for
    // all of them. Only the file's owner may change its permissions.
    if log_file_uid == Uid::current() {
        let perms = Permissions::from_mode(0o766);
        file.set_permissions(perms)?;
    }

    Ok(file)
}

/// Initialize logging for the binary.
pub fn init_logger() -> Result<(), Error> {
    let log_writer = AllocLogWriter::new()?;

    flexi_logger::Logger::try_with_env_or_str(DEFAULT_LOG_LEVEL)?
        .log_to_writer(Box::new(log_writer))
        .start()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::NamedTempFile;

    /// Tests that `open_log_file()` creates a file with the expected
    /// permissions.
    #[test]
    fn test_open_log_file() {
        let file0 = NamedTempFile::new();

        if let Ok(file0) = file0 {
            let test_file_path = file0.path();

            let f = open_log_file(test_file_path).unwrap();
            let metadata = f.metadata();
            assert!(metadata.is_ok());

            if let Ok(metadata) = metadata {
                assert!(metadata.is_file());
                let permissions = metadata.permissions();
                let mode = permissions.mode();

                assert_eq!(mode & 0o777, 0o766);
            }
        }
    }

    /// Tests that the log file lands in the default directory when the
    /// environment variable is not set.
    #[test]
    fn test_log_file_path_default() {
        let logs_dir = env::var(LOGS_DIR_PATH_ENV_VAR);
        let path = log_file_path();

        if let Ok(logs_dir) = logs_dir {
            assert!(path.starts_with(logs_dir));
        } else {
            assert!(path.starts_with(LOGS_DIR_PATH));
        }
        assert!(path.ends_with(LOG_FILE_NAME));
    }
}
