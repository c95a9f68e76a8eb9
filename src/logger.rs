//! Session logger: routes the `log` facade into a single file in the OS data
//! directory.
//!
//! The file is **truncated at each [`init`]**, so it only ever holds output
//! from the most recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\PixelFE\pixelfe.log`
//!   Linux:    `~/.local/share/PixelFE/pixelfe.log`  (XDG_DATA_HOME respected)
//!   macOS:    `~/Library/Application Support/PixelFE/pixelfe.log`
//!
//! Library code just uses `log::info!` and friends. Tests install
//! `env_logger` through `test-log` instead, so nothing here runs under test
//! unless called explicitly.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{LevelFilter, Log, Metadata, Record};

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

struct SessionLogger {
    file: Mutex<File>,
    path: PathBuf,
    level: LevelFilter,
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write_line(&format_line(&timestamp(), record.level().as_str(), &record.args().to_string()));
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

impl SessionLogger {
    /// I/O errors are swallowed so logging never takes the caller down.
    fn write_line(&self, line: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Path of the current session log, once [`init`] has succeeded.
pub fn log_path() -> Option<&'static Path> {
    LOGGER.get().map(|logger| logger.path.as_path())
}

/// Install the session logger at `Info` level. See [`init_with_level`].
pub fn init() -> bool {
    init_with_level(LevelFilter::Info)
}

/// Create (or truncate) the log file, register it with the `log` facade and
/// install a panic hook that mirrors panics into the file.
///
/// Returns `false` when the file cannot be opened or another logger is
/// already installed; neither is fatal.
pub fn init_with_level(level: LevelFilter) -> bool {
    init_at(log_file_path(), level)
}

fn init_at(path: PathBuf, level: LevelFilter) -> bool {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return false;
        }
    };

    let logger = LOGGER.get_or_init(|| SessionLogger {
        file: Mutex::new(file),
        path,
        level,
    });
    if log::set_logger(logger).is_err() {
        return false;
    }
    log::set_max_level(logger.level);

    logger.write_line(&format!("=== PixelFE session started (unix {}) ===", unix_seconds()));
    logger.write_line(&format!("Log file: {}", logger.path.display()));
    logger.write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(logger) = LOGGER.get() {
            logger.write_line(&format_line(&timestamp(), "PANIC", &info.to_string()));
        }
        prev(info);
    }));
    true
}

fn log_file_path() -> PathBuf {
    data_dir().join("PixelFE").join("pixelfe.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn format_line(ts: &str, level: &str, msg: &str) -> String {
    format!("[{}] [{}] {}", ts, level, msg)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `HH:MM:SS` within the current UTC day.
fn timestamp() -> String {
    clock_string(unix_seconds())
}

fn clock_string(secs: u64) -> String {
    let h = (secs % 86400) / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}
