use std::borrow::Cow;
use std::panic::Location;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::masking::mask_secrets;
use super::Record;

pub const FIELD_KEY_TIME: &str = "time";
pub const FIELD_KEY_LEVEL: &str = "level";
pub const FIELD_KEY_MSG: &str = "msg";
pub const FIELD_KEY_FILE: &str = "file";

/// Renders one record into one output line, trailing newline included.
pub trait Formatter: Send + Sync {
    fn format(&self, record: &Record<'_>) -> String;
}

/// `key=value` text lines: time, level, msg and caller first, then the
/// attached fields in key order.
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    pub quote_empty_fields: bool,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    fn append_pair(&self, line: &mut String, key: &str, value: &str) {
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(key);
        line.push('=');
        if self.needs_quoting(value) {
            line.push_str(&format!("{:?}", value));
        } else {
            line.push_str(value);
        }
    }

    fn needs_quoting(&self, value: &str) -> bool {
        if value.is_empty() {
            return self.quote_empty_fields;
        }
        !value.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/' | '@' | '^' | '+')
        })
    }
}

impl Formatter for TextFormatter {
    fn format(&self, record: &Record<'_>) -> String {
        let mut line = String::new();
        self.append_pair(&mut line, FIELD_KEY_TIME, &format_time(&record.time));
        self.append_pair(&mut line, FIELD_KEY_LEVEL, record.level.as_str());
        if !record.message.is_empty() {
            self.append_pair(&mut line, FIELD_KEY_MSG, &record.message);
        }
        if let Some(caller) = record.caller {
            self.append_pair(&mut line, FIELD_KEY_FILE, &caller_file(caller));
        }
        for (key, value) in record.fields {
            let key = field_key(key, record.caller.is_some());
            self.append_pair(&mut line, &key, &value_to_string(value));
        }
        line.push('\n');
        line
    }
}

/// One JSON object per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, record: &Record<'_>) -> String {
        let mut base = Map::new();
        for (key, value) in record.fields {
            base.insert(field_key(key, record.caller.is_some()).into_owned(), value.clone());
        }
        base.insert(FIELD_KEY_TIME.to_string(), json!(format_time(&record.time)));
        base.insert(FIELD_KEY_LEVEL.to_string(), json!(record.level.as_str()));
        base.insert(FIELD_KEY_MSG.to_string(), json!(record.message));
        if let Some(caller) = record.caller {
            base.insert(FIELD_KEY_FILE.to_string(), json!(caller_file(caller)));
        }

        let mut line = serde_json::to_string(&Value::Object(base)).unwrap_or_default();
        line.push('\n');
        line
    }
}

/// Masks secrets in the message text, then hands the record to `F`.
/// Attached fields pass through untouched.
#[derive(Debug, Clone, Default)]
pub struct MaskingFormatter<F> {
    inner: F,
}

impl<F: Formatter> MaskingFormatter<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: Formatter> Formatter for MaskingFormatter<F> {
    fn format(&self, record: &Record<'_>) -> String {
        let masked = Record {
            time: record.time,
            level: record.level,
            message: Cow::Owned(mask_secrets(&record.message)),
            fields: record.fields,
            caller: record.caller,
        };
        self.inner.format(&masked)
    }
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn caller_file(caller: &Location<'_>) -> String {
    let file = Path::new(caller.file())
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or(Cow::Borrowed(caller.file()));
    format!("{}:{}", file, caller.line())
}

// Attached fields never shadow the fixed keys.
fn field_key(key: &str, has_caller: bool) -> Cow<'_, str> {
    let clashes = matches!(key, FIELD_KEY_TIME | FIELD_KEY_LEVEL | FIELD_KEY_MSG)
        || (has_caller && key == FIELD_KEY_FILE);
    if clashes {
        Cow::Owned(format!("fields.{}", key))
    } else {
        Cow::Borrowed(key)
    }
}

fn value_to_string(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}
