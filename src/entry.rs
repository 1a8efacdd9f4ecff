use std::fmt::{self, Write as _};
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::engine::{Engine, Fields};
use crate::level::Severity;

/// Field set by [`LogEntry::with_error`].
pub const ERROR_KEY: &str = "error";

macro_rules! severity_methods {
    ($($severity:ident => $formatted:ident, $plain:ident, $line:ident;)*) => {
        $(
            #[track_caller]
            fn $formatted(&self, args: fmt::Arguments<'_>) {
                self.logf(Severity::$severity, args)
            }

            #[track_caller]
            fn $plain(&self, args: &[&dyn fmt::Display]) {
                self.log(Severity::$severity, args)
            }

            #[track_caller]
            fn $line(&self, args: &[&dyn fmt::Display]) {
                self.logln(Severity::$severity, args)
            }
        )*
    };
}

/// Leveled logging over a snapshot of field values.
///
/// Every severity comes in three styles: `infof` takes `format_args!`,
/// `info` concatenates its operands, and `infoln` separates them with
/// spaces. The `with_*` methods never modify `self`; each returns a new
/// entry carrying the accumulated fields.
///
/// `fatal*` runs the process exit hook after logging and `panic*` panics
/// after logging.
pub trait LogEntry: Send + Sync {
    /// Single emission primitive behind every leveled method. `caller` is
    /// `None` when the call site is not known, e.g. records bridged from
    /// the `log` crate.
    fn emit(&self, severity: Severity, message: String, caller: Option<&'static Location<'static>>);

    fn with_field(&self, key: &str, value: Value) -> Box<dyn LogEntry>;

    fn with_fields(&self, fields: Fields) -> Box<dyn LogEntry>;

    /// Sets [`ERROR_KEY`] to the error's message.
    fn with_error(&self, err: &dyn std::error::Error) -> Box<dyn LogEntry>;

    /// Overrides the timestamp of records emitted through the returned entry.
    fn with_time(&self, time: DateTime<Utc>) -> Box<dyn LogEntry>;

    /// Fields accumulated so far.
    fn fields(&self) -> &Fields;

    #[track_caller]
    fn logf(&self, severity: Severity, args: fmt::Arguments<'_>) {
        self.emit(severity, fmt::format(args), Some(Location::caller()))
    }

    #[track_caller]
    fn log(&self, severity: Severity, args: &[&dyn fmt::Display]) {
        self.emit(severity, join_args(args, ""), Some(Location::caller()))
    }

    #[track_caller]
    fn logln(&self, severity: Severity, args: &[&dyn fmt::Display]) {
        self.emit(severity, join_args(args, " "), Some(Location::caller()))
    }

    severity_methods! {
        Trace => tracef, trace, traceln;
        Debug => debugf, debug, debugln;
        Info => infof, info, infoln;
        Print => printf, print, println;
        Warn => warnf, warn, warnln;
        Warning => warningf, warning, warningln;
        Error => errorf, error, errorln;
        Fatal => fatalf, fatal, fatalln;
        Panic => panicf, panic, panicln;
    }
}

fn join_args(args: &[&dyn fmt::Display], separator: &str) -> String {
    let mut message = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            message.push_str(separator);
        }
        let _ = write!(message, "{}", arg);
    }
    message
}

/// State shared by a logger and every entry derived from it.
pub(crate) struct Core {
    pub(crate) engine: Engine,
    pub(crate) enabled: AtomicBool,
}

impl Core {
    pub(crate) fn new(engine: Engine) -> Self {
        Self {
            engine,
            enabled: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

/// Value-typed entry: cloning it and adding a field leaves the source intact.
#[derive(Clone)]
pub struct Entry {
    core: Arc<Core>,
    fields: Fields,
    time: Option<DateTime<Utc>>,
}

impl Entry {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self {
            core,
            fields: Fields::new(),
            time: None,
        }
    }

    pub(crate) fn core(&self) -> &Core {
        &self.core
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("fields", &self.fields)
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}

impl LogEntry for Entry {
    fn emit(&self, severity: Severity, message: String, caller: Option<&'static Location<'static>>) {
        if !self.core.is_enabled() {
            return;
        }
        self.core
            .engine
            .log(severity.level(), &message, &self.fields, self.time, caller);
    }

    fn with_field(&self, key: &str, value: Value) -> Box<dyn LogEntry> {
        let mut entry = self.clone();
        entry.fields.insert(key.to_string(), value);
        Box::new(entry)
    }

    fn with_fields(&self, fields: Fields) -> Box<dyn LogEntry> {
        let mut entry = self.clone();
        entry.fields.extend(fields);
        Box::new(entry)
    }

    fn with_error(&self, err: &dyn std::error::Error) -> Box<dyn LogEntry> {
        self.with_field(ERROR_KEY, Value::String(err.to_string()))
    }

    fn with_time(&self, time: DateTime<Utc>) -> Box<dyn LogEntry> {
        let mut entry = self.clone();
        entry.time = Some(time);
        Box::new(entry)
    }

    fn fields(&self) -> &Fields {
        &self.fields
    }
}
