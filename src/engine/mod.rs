pub mod formatter;
pub mod masking;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::level::Level;
use self::formatter::{Formatter, TextFormatter};
use self::masking::mask_secrets;

/// Named values attached to a record. Keys are kept sorted so rendered
/// lines are stable.
pub type Fields = BTreeMap<String, Value>;

/// Invoked with exit code 1 after a fatal record has been written.
pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

/// One rendered log call.
#[derive(Debug, Clone)]
pub struct Record<'a> {
    pub time: DateTime<Utc>,
    pub level: Level,
    pub message: Cow<'a, str>,
    pub fields: &'a Fields,
    pub caller: Option<&'static Location<'static>>,
}

/// Level filtering, rendering and output for one logger instance.
pub struct Engine {
    level: RwLock<Level>,
    formatter: RwLock<Box<dyn Formatter>>,
    output: Mutex<Box<dyn Write + Send>>,
    report_caller: AtomicBool,
    exit_fn: RwLock<ExitFn>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            level: RwLock::new(Level::Info),
            formatter: RwLock::new(Box::new(TextFormatter::new())),
            output: Mutex::new(Box::new(io::stderr())),
            report_caller: AtomicBool::new(false),
            exit_fn: RwLock::new(Arc::new(process_exit)),
        }
    }

    pub fn level(&self) -> Level {
        *read(&self.level)
    }

    pub fn set_level(&self, level: Level) {
        *self.level.write().unwrap_or_else(PoisonError::into_inner) = level;
    }

    pub fn is_level_enabled(&self, level: Level) -> bool {
        level <= self.level()
    }

    pub fn set_formatter(&self, formatter: Box<dyn Formatter>) {
        *self.formatter.write().unwrap_or_else(PoisonError::into_inner) = formatter;
    }

    pub fn set_output(&self, output: Box<dyn Write + Send>) {
        *lock(&self.output) = output;
    }

    pub fn set_report_caller(&self, report_caller: bool) {
        self.report_caller.store(report_caller, Ordering::Release);
    }

    pub fn report_caller(&self) -> bool {
        self.report_caller.load(Ordering::Acquire)
    }

    pub fn set_exit_fn(&self, exit_fn: ExitFn) {
        *self.exit_fn.write().unwrap_or_else(PoisonError::into_inner) = exit_fn;
    }

    /// Writes the record if `level` is enabled. Fatal records then run the
    /// exit hook and panic records panic, whether or not they were written.
    pub fn log(
        &self,
        level: Level,
        message: &str,
        fields: &Fields,
        time: Option<DateTime<Utc>>,
        caller: Option<&'static Location<'static>>,
    ) {
        if self.is_level_enabled(level) {
            let record = Record {
                time: time.unwrap_or_else(Utc::now),
                level,
                message: Cow::Borrowed(message),
                fields,
                caller: caller.filter(|_| self.report_caller()),
            };
            self.write(&record);
        }

        match level {
            Level::Fatal => self.exit(1),
            Level::Panic => panic!("{}", mask_secrets(message)),
            _ => {}
        }
    }

    fn write(&self, record: &Record<'_>) {
        let line = read(&self.formatter).format(record);
        let mut output = lock(&self.output);
        if let Err(e) = output.write_all(line.as_bytes()) {
            eprintln!("failed to write to log: {}", e);
        }
    }

    fn exit(&self, code: i32) {
        let exit_fn = read(&self.exit_fn).clone();
        exit_fn(code);
    }
}

/// Output adapter for a file whose handle is shared with the logger that
/// closes it on replacement.
#[derive(Debug, Clone)]
pub struct FileOutput(pub Arc<File>);

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

fn process_exit(code: i32) {
    std::process::exit(code)
}

pub(crate) fn read<T: ?Sized>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
