use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

const MAX_LINES: usize = 100;

/// Keeps recent log lines for the dashboard, or prints them when there is no dashboard
pub struct LogBuffer {
    lines: Mutex<VecDeque<String>>,
    echo: AtomicBool,
}

static LOGGER: LogBuffer = LogBuffer {
    lines: Mutex::new(VecDeque::new()),
    echo: AtomicBool::new(false),
};

pub fn init(echo: bool, level: LevelFilter) -> Result<(), SetLoggerError> {
    LOGGER.echo.store(echo, Ordering::Relaxed);
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

/// Up to `count` latest lines, oldest first
pub fn recent(count: usize) -> Vec<String> {
    LOGGER.recent(count)
}

impl LogBuffer {
    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == MAX_LINES {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    fn recent(&self, count: usize) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines
                .iter()
                .skip(lines.len().saturating_sub(count))
                .cloned()
                .collect(),
            Err(_) => vec![],
        }
    }
}

impl Log for LogBuffer {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{:<5} {}", record.level(), record.args());
        if self.echo.load(Ordering::Relaxed) {
            println!("{}", line);
        } else {
            self.push(line);
        }
    }

    fn flush(&self) {}
}
