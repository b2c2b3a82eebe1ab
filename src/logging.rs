//! Process-wide logger for the command line driver.
//!
//! Records are formatted with a local timestamp and written to stdout and to an
//! append-only log file at the same time.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use env_logger::{Builder, Target};
use log::log;

pub type LevelFilter = log::LevelFilter;
pub type Level = log::Level;

pub struct LogConfig {
    pub log_file: PathBuf,
    pub log_level: LevelFilter,
}

impl LogConfig {
    pub fn new(log_file: impl Into<PathBuf>, log_level: LevelFilter) -> Self {
        Self {
            log_file: log_file.into(),
            log_level,
        }
    }
}

pub struct Logger {
    config: LogConfig,
}

impl Logger {
    /// Install the global logger.
    ///
    /// Fails if the log file cannot be opened or a logger is already installed.
    pub fn init(config: LogConfig) -> io::Result<Self> {
        if let Some(parent) = config.log_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&config.log_file)?;

        let tee = Tee {
            console: io::stdout(),
            file,
        };

        Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] {} - {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            })
            .filter(None, config.log_level)
            .target(Target::Pipe(Box::new(tee)))
            .try_init()
            .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))?;

        Ok(Self { config })
    }

    pub fn log_file(&self) -> &Path {
        &self.config.log_file
    }

    pub fn log_event(&self, level: Level, event: &str, details: Option<&str>, error: Option<&dyn std::error::Error>) {
        match (details, error) {
            (Some(d), Some(e)) => log!(level, "{}: {} - {}", event, d, e),
            (Some(d), None) => log!(level, "{}: {}", event, d),
            (None, Some(e)) => log!(level, "{} - {}", event, e),
            (None, None) => log!(level, "{}", event),
        }
    }
}

/// Duplicates every record to the console and the log file.
struct Tee<C, F> {
    console: C,
    file: F,
}

impl<C: Write, F: Write> Write for Tee<C, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.console.write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.flush()?;
        self.file.flush()
    }
}
