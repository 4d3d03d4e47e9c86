//! Logger setup for the job binary
//!
//! Records go to stdout and, when a log directory is configured, to a
//! per-run file `currency_<job>_<YYYYMMDD_HHMMSS>.log` in that directory.

use crate::error::{FxError, Result};
use chrono::Local;
use env_logger::{Builder, Env, Target, WriteStyle};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes every record to stdout and an optional file
struct Tee {
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Path of the log file for a job started now
pub fn log_file_path(log_dir: &Path, job: &str) -> PathBuf {
    log_dir.join(format!(
        "currency_{}_{}.log",
        job,
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Install the global logger.
///
/// Default level is `info` (`debug` when `verbose`); `RUST_LOG` overrides
/// both. Returns the log file path if one was opened.
pub fn init(log_dir: Option<&Path>, job: &str, verbose: bool) -> Result<Option<PathBuf>> {
    let (file, path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|e| {
                FxError::Config(format!("Cannot create log directory {}: {}", dir.display(), e))
            })?;
            let path = log_file_path(dir, job);
            let file = File::create(&path).map_err(|e| {
                FxError::Config(format!("Cannot create log file {}: {}", path.display(), e))
            })?;
            (Some(file), Some(path))
        }
        None => (None, None),
    };

    builder(verbose)
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .map_err(|e| FxError::Config(format!("Logger already initialized: {}", e)))?;

    if let Some(path) = &path {
        log::info!("Logging to {}", path.display());
    }
    Ok(path)
}

/// Install the global logger on stderr only, for commands whose stdout is data
pub fn init_stderr(verbose: bool) -> Result<()> {
    builder(verbose)
        .target(Target::Stderr)
        .try_init()
        .map_err(|e| FxError::Config(format!("Logger already initialized: {}", e)))
}

fn builder(verbose: bool) -> Builder {
    let default_level = if verbose { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .write_style(WriteStyle::Never);
    builder
}
