//! Logging setup for patchvault
//!
//! Human-readable output goes through `env_logger`; a level prefixed with
//! `json:` switches to one JSON object per line.

use chrono::{Local, Utc};
use log::{Level, LevelFilter, Log, Metadata, Record};
use serde_json::json;
use std::env;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Mutex;

/// Environment variable holding the log level
pub const LOG_LEVEL_ENV: &str = "PATCHVAULT_LOG_LEVEL";

/// Environment variable holding an optional log file path
pub const LOG_PATH_ENV: &str = "PATCHVAULT_LOG_PATH";

/// JSON logger implementation
#[derive(Debug)]
pub struct JsonLogger {
    level: Level,
    target_file: Mutex<Option<std::fs::File>>,
}

/// Split a level specification into (json?, level name)
fn parse_level_spec(level_str: &str) -> (bool, &str) {
    if let Some(stripped) = level_str.strip_prefix("json:") {
        (true, stripped)
    } else if level_str == "json" {
        (true, "info")
    } else {
        (false, level_str)
    }
}

fn level_filter(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

impl JsonLogger {
    /// Create a new JSON logger
    pub fn new(level: Level, log_path: Option<String>) -> Self {
        let target_file = if let Some(path) = log_path {
            OpenOptions::new().create(true).append(true).open(path).ok()
        } else {
            None
        };

        JsonLogger {
            level,
            target_file: Mutex::new(target_file),
        }
    }

    /// Initialize the logger with the given level specification
    pub fn init_with_level(level_str: &str) {
        let log_path = env::var(LOG_PATH_ENV).ok();
        let (use_json, actual_level) = parse_level_spec(level_str);
        let filter = level_filter(actual_level);

        if !use_json {
            let mut builder = env_logger::Builder::new();
            let file = log_path.and_then(|p| OpenOptions::new().create(true).append(true).open(p).ok());
            if let Some(file) = file {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            let _ = builder
                .filter_level(filter)
                .format(|buf, record| {
                    writeln!(
                        buf,
                        "[{} {} {}] {}",
                        Local::now().format("%Y-%m-%dT%H:%M:%S"),
                        record.level(),
                        record.target(),
                        record.args()
                    )
                })
                .try_init();
            return;
        }

        let Some(level) = filter.to_level() else {
            log::set_max_level(LevelFilter::Off);
            return;
        };

        let logger = Box::new(JsonLogger::new(level, log_path));
        if let Err(e) = log::set_boxed_logger(logger) {
            eprintln!("Failed to initialize JSON logger: {e}");
            return;
        }

        log::set_max_level(filter);
    }

    /// Initialize the logger from `PATCHVAULT_LOG_LEVEL`, defaulting to info
    pub fn init() {
        let log_level = env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
        Self::init_with_level(&log_level);
    }
}

impl Log for JsonLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let log_entry = json!({
            "@timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            "@level": record.level().to_string().to_lowercase(),
            "@message": record.args().to_string(),
            "@module": record.target(),
            "@pid": std::process::id(),
        });

        let line = format!("{}\n", serde_json::to_string(&log_entry).unwrap_or_default());

        if let Ok(mut file_guard) = self.target_file.lock() {
            if let Some(ref mut file) = *file_guard {
                let _ = file.write_all(line.as_bytes());
                let _ = file.flush();
                return;
            }
        }

        let _ = io::stderr().write_all(line.as_bytes());
        let _ = io::stderr().flush();
    }

    fn flush(&self) {
        if let Ok(mut file_guard) = self.target_file.lock() {
            if let Some(ref mut file) = *file_guard {
                let _ = file.flush();
            }
        }
        let _ = io::stderr().flush();
    }
}
