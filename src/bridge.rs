use serde_json::Value;

use crate::level::Severity;
use crate::logger::get_logger;

/// Routes records from the `log` crate to the process-wide logger, tagged
/// with a `target` field. The record's own call site, when known, goes into
/// a `source` field; no `file` caller is reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBridge;

static LOG_BRIDGE: LogBridge = LogBridge;

impl LogBridge {
    /// Installs the bridge as the `log` crate's logger. Level filtering past
    /// `max_level` is left to the process-wide logger.
    pub fn init(max_level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_logger(&LOG_BRIDGE)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl log::Log for LogBridge {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        let logger = get_logger();
        let mut entry = logger.with_field("target", Value::from(record.target()));
        if let (Some(file), Some(line)) = (record.file(), record.line()) {
            entry = entry.with_field("source", Value::from(format!("{}:{}", file, line)));
        }
        entry.emit(Severity::from(record.level()), record.args().to_string(), None);
    }

    fn flush(&self) {}
}
