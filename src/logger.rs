use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::panic::Location;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde_json::Value;

use crate::config::{LogConfig, LogFormat};
use crate::context::{context_to_fields, Context, ContextHooks};
use crate::engine::formatter::{Formatter, JsonFormatter, MaskingFormatter, TextFormatter};
use crate::engine::{lock, read, Engine, ExitFn, Fields, FileOutput};
use crate::entry::{Core, Entry, LogEntry};
use crate::error::LogError;
use crate::level::{Level, Severity};

/// Reported by [`Logger::log_level`] while output is switched off.
pub const LEVEL_OFF: &str = "OFF";

/// A [`LogEntry`] that can also be reconfigured and swapped out.
pub trait Logger: LogEntry {
    /// Entry carrying the well-known keys and hook values found in
    /// `contexts`. Later contexts win for the same key.
    fn with_context(&self, contexts: &[&Context]) -> Box<dyn LogEntry>;

    /// Accepts engine level names in any case, or `OFF` to suppress all
    /// output. An unknown name is rejected and changes nothing.
    fn set_log_level(&self, level: &str) -> Result<(), LogError>;

    fn log_level(&self) -> String;

    fn set_output(&self, output: Box<dyn Write + Send>);

    /// Registers the file to close when this logger is replaced. Registering
    /// the same file again is a no-op; a different one is rejected.
    fn close_file_on_logger_replace(&self, file: Arc<File>) -> Result<(), LogError>;

    /// Installs `new_logger` process-wide, then closes this logger's
    /// registered file. A close failure is logged through `new_logger`.
    fn replace(&self, new_logger: Arc<dyn Logger>);
}

/// Logger backed by an [`Engine`] whose formatter masks secrets in messages.
pub struct DefaultLogger {
    root: Entry,
    hooks: ContextHooks,
    file: Mutex<Option<Arc<File>>>,
}

impl Default for DefaultLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultLogger {
    /// Enabled, level info, caller reporting on, masked text lines on stderr.
    pub fn new() -> Self {
        let logger = Self {
            root: Entry::new(Arc::new(Core::new(Engine::new()))),
            hooks: ContextHooks::new(),
            file: Mutex::new(None),
        };
        logger.set_formatter(TextFormatter::new());
        logger.set_report_caller(true);
        logger
    }

    pub fn from_config(config: &LogConfig) -> Result<Self, LogError> {
        config.validate()?;

        let logger = Self::new();
        logger.set_log_level(&config.level)?;
        logger.set_report_caller(config.report_caller);
        if config.format == LogFormat::Json {
            logger.set_formatter(JsonFormatter);
        }

        if let Some(path) = &config.file {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = Arc::new(OpenOptions::new().create(true).append(true).open(path)?);
            logger.set_output(Box::new(FileOutput(file.clone())));
            logger.close_file_on_logger_replace(file)?;
        }

        Ok(logger)
    }

    /// Hooks consulted by `with_context` after the process-wide ones.
    pub fn with_context_hooks(mut self, hooks: ContextHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Installs `formatter` behind secret masking.
    pub fn set_formatter<F: Formatter + 'static>(&self, formatter: F) {
        self.engine().set_formatter(Box::new(MaskingFormatter::new(formatter)));
    }

    pub fn set_report_caller(&self, report_caller: bool) {
        self.engine().set_report_caller(report_caller);
    }

    pub fn set_level(&self, level: Level) {
        self.engine().set_level(level);
    }

    pub fn level(&self) -> Level {
        self.engine().level()
    }

    pub fn is_level_enabled(&self, level: Level) -> bool {
        self.root.core().is_enabled() && self.engine().is_level_enabled(level)
    }

    pub fn set_exit_fn(&self, exit_fn: ExitFn) {
        self.engine().set_exit_fn(exit_fn);
    }

    fn engine(&self) -> &Engine {
        &self.root.core().engine
    }
}

impl LogEntry for DefaultLogger {
    fn emit(&self, severity: Severity, message: String, caller: Option<&'static Location<'static>>) {
        self.root.emit(severity, message, caller)
    }

    fn with_field(&self, key: &str, value: Value) -> Box<dyn LogEntry> {
        self.root.with_field(key, value)
    }

    fn with_fields(&self, fields: Fields) -> Box<dyn LogEntry> {
        self.root.with_fields(fields)
    }

    fn with_error(&self, err: &dyn std::error::Error) -> Box<dyn LogEntry> {
        self.root.with_error(err)
    }

    fn with_time(&self, time: DateTime<Utc>) -> Box<dyn LogEntry> {
        self.root.with_time(time)
    }

    fn fields(&self) -> &Fields {
        self.root.fields()
    }
}

impl Logger for DefaultLogger {
    fn with_context(&self, contexts: &[&Context]) -> Box<dyn LogEntry> {
        let mut fields = context_to_fields(contexts);
        self.hooks.apply(contexts, &mut fields);
        self.with_fields(fields)
    }

    fn set_log_level(&self, level: &str) -> Result<(), LogError> {
        if level.eq_ignore_ascii_case(LEVEL_OFF) {
            self.root.core().set_enabled(false);
            return Ok(());
        }
        let parsed: Level = level.parse()?;
        self.engine().set_level(parsed);
        self.root.core().set_enabled(true);
        Ok(())
    }

    fn log_level(&self) -> String {
        if !self.root.core().is_enabled() {
            return LEVEL_OFF.to_string();
        }
        self.engine().level().to_string()
    }

    fn set_output(&self, output: Box<dyn Write + Send>) {
        self.engine().set_output(output);
    }

    fn close_file_on_logger_replace(&self, file: Arc<File>) -> Result<(), LogError> {
        let mut registered = lock(&self.file);
        if let Some(current) = registered.as_ref() {
            if !Arc::ptr_eq(current, &file) {
                return Err(LogError::FileAlreadyRegistered);
            }
        }
        *registered = Some(file);
        Ok(())
    }

    fn replace(&self, new_logger: Arc<dyn Logger>) {
        set_logger(new_logger);

        let file = lock(&self.file).take();
        if let Some(file) = file {
            // Calls still holding this logger write nowhere from here on.
            self.engine().set_output(Box::new(io::sink()));
            if let Err(e) = close_log_file(file) {
                get_logger().errorf(format_args!("failed to close log file: {}", e));
            }
        }
    }
}

/// Flushes a regular file to disk before the handle is dropped. Devices,
/// pipes and ttys have nothing to flush and reject fsync.
fn close_log_file(file: Arc<File>) -> io::Result<()> {
    if file.metadata()?.is_file() {
        file.sync_all()?;
    }
    Ok(())
}

lazy_static! {
    static ref LOGGER: RwLock<Arc<dyn Logger>> = RwLock::new(Arc::new(DefaultLogger::new()));
}

/// The process-wide logger. The returned handle stays usable even if the
/// logger is replaced while it is held.
pub fn get_logger() -> Arc<dyn Logger> {
    read(&*LOGGER).clone()
}

pub fn set_logger(logger: Arc<dyn Logger>) {
    let previous = {
        let mut slot = LOGGER.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, logger)
    };
    drop(previous);
}

/// Builds a logger from `CLIENT_LOG_*` variables and makes it the
/// process-wide logger.
pub fn init_from_env() -> Result<(), LogError> {
    let config = LogConfig::from_env()?;
    let logger = DefaultLogger::from_config(&config)?;
    get_logger().replace(Arc::new(logger));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{register_log_context_hook, SESSION_ID_KEY, SESSION_USER_KEY};
    use crate::testing::SharedBuffer;
    use chrono::TimeZone;
    use serde_json::json;
    use serial_test::serial;

    fn logger_with_buffer() -> (DefaultLogger, SharedBuffer) {
        let logger = DefaultLogger::new();
        let buffer = SharedBuffer::new();
        logger.set_output(Box::new(buffer.clone()));
        (logger, buffer)
    }

    fn log_every_method(logger: &dyn Logger) {
        logger.trace(&[&"trace"]);
        logger.tracef(format_args!("trace{}", "f"));
        logger.traceln(&[&"traceln"]);
        logger.debug(&[&"debug"]);
        logger.debugf(format_args!("debug{}", "f"));
        logger.debugln(&[&"debugln"]);
        logger.info(&[&"info"]);
        logger.infof(format_args!("info{}", "f"));
        logger.infoln(&[&"infoln"]);
        logger.print(&[&"print"]);
        logger.printf(format_args!("print{}", "f"));
        logger.println(&[&"println"]);
        logger.warn(&[&"warn"]);
        logger.warnf(format_args!("warn{}", "f"));
        logger.warnln(&[&"warnln"]);
        logger.warning(&[&"warning"]);
        logger.warningf(format_args!("warning{}", "f"));
        logger.warningln(&[&"warningln"]);
        logger.error(&[&"error"]);
        logger.errorf(format_args!("error{}", "f"));
        logger.errorln(&[&"errorln"]);
    }

    #[test]
    fn test_default_level_is_info() {
        let (logger, buffer) = logger_with_buffer();
        assert_eq!(logger.log_level(), "info");
        log_every_method(&logger);

        let out = buffer.contents();
        for kept in ["msg=info", "msg=infof", "msg=println", "msg=warnf", "msg=warningln", "msg=errorln"] {
            assert!(out.contains(kept), "missing {kept} in {out}");
        }
        for dropped in ["msg=debug", "msg=trace"] {
            assert!(!out.contains(dropped), "unexpected {dropped} in {out}");
        }
    }

    #[test]
    fn test_set_level_round_trip() {
        let (logger, _buffer) = logger_with_buffer();
        for name in ["trace", "DEBUG", "Info", "warn", "error", "fatal", "panic"] {
            logger.set_log_level(name).unwrap();
            assert_eq!(logger.log_level(), name.to_ascii_lowercase());
        }
        logger.set_log_level("warning").unwrap();
        assert_eq!(logger.log_level(), "warn");
    }

    // print is an alias of info, so it is filtered at warn
    #[test]
    fn test_warn_level_filters_print_with_info() {
        let (logger, buffer) = logger_with_buffer();
        logger.set_log_level("warn").unwrap();
        log_every_method(&logger);

        let out = buffer.contents();
        assert!(out.contains("msg=warn"));
        assert!(out.contains("msg=errorf"));
        assert!(!out.contains("msg=info"));
        assert!(!out.contains("msg=print"));
        assert!(!out.contains("msg=debug"));
    }

    #[test]
    fn test_off_writes_nothing() {
        let (logger, buffer) = logger_with_buffer();
        logger.set_log_level("oFf").unwrap();
        log_every_method(&logger);
        logger.with_field("k", json!("v")).error(&[&"still off"]);

        assert!(buffer.is_empty());
        assert_eq!(logger.log_level(), "OFF");
        assert!(!logger.is_level_enabled(Level::Error));
    }

    #[test]
    fn test_invalid_level_keeps_state() {
        let (logger, buffer) = logger_with_buffer();
        logger.set_log_level("OFF").unwrap();
        let err = logger.set_log_level("unknown").unwrap_err();
        assert!(err.is_invalid_level());
        assert_eq!(logger.log_level(), "OFF");
        logger.error(&[&"nothing"]);
        assert!(buffer.is_empty());

        logger.set_log_level("debug").unwrap();
        assert!(logger.set_log_level("verbose").is_err());
        assert_eq!(logger.log_level(), "debug");
    }

    #[test]
    fn test_with_field() {
        let (logger, buffer) = logger_with_buffer();
        logger.with_field("field", json!("test")).info(&[&"hello"]);
        assert!(buffer.contents().contains("field=test"));
    }

    #[test]
    fn test_with_error() {
        let (logger, buffer) = logger_with_buffer();
        let err = io::Error::new(io::ErrorKind::Other, "error");
        logger.with_error(&err).info(&[&"hello world"]);
        assert!(buffer.contents().contains("error=error"));
    }

    #[test]
    fn test_with_time() {
        let (logger, buffer) = logger_with_buffer();
        let at = Utc.with_ymd_and_hms(2001, 2, 3, 4, 5, 6).unwrap();
        logger.with_time(at).info(&[&"hello"]);
        assert!(buffer.contents().contains("time=\"2001-02-03T04:05:06Z\""));
    }

    #[test]
    fn test_caller_points_at_call_site() {
        let (logger, buffer) = logger_with_buffer();
        logger.info(&[&"where"]);
        assert!(buffer.contents().contains("file=\"logger.rs:"));
    }

    #[test]
    fn test_masks_message_secrets() {
        let (logger, buffer) = logger_with_buffer();
        let query = "create user testuser password='testpassword'";
        logger
            .with_context(&[&Context::new()])
            .infof(format_args!("Query: {:?}", query));

        let out = buffer.contents();
        assert!(out.contains("create user testuser password='****"));
        assert!(!out.contains("testpassword"));
    }

    #[test]
    fn test_json_formatter_still_masks() {
        let (logger, buffer) = logger_with_buffer();
        logger.set_formatter(JsonFormatter);
        logger.info(&[&"pwd=supersecret1"]);
        let line: Value = serde_json::from_str(buffer.contents().trim_end()).unwrap();
        assert_eq!(line["msg"], "pwd=****");
    }

    #[test]
    #[serial]
    fn test_with_context_keys_and_hooks() {
        #[derive(Debug)]
        struct RequestId(i64);

        register_log_context_hook("REQUEST_ID", |ctx: &Context| {
            ctx.extension::<RequestId>()
                .map(|id| id.0.to_string())
                .unwrap_or_default()
        });

        let (logger, buffer) = logger_with_buffer();
        let session = Context::new().with_value(SESSION_ID_KEY, "sessID1");
        let request = Context::new()
            .with_value(SESSION_USER_KEY, "admin")
            .with_extension(RequestId(123));
        logger.with_context(&[&session, &request]).info(&[&"test"]);

        let out = buffer.contents();
        assert!(out.contains("LOG_SESSION_ID=sessID1"));
        assert!(out.contains("LOG_USER=admin"));
        assert!(out.contains("REQUEST_ID=123"));
    }

    #[test]
    fn test_logger_local_hooks() {
        let hooks = ContextHooks::new().with_hook("TENANT", |_: &Context| "acme".to_string());
        let (logger, buffer) = logger_with_buffer();
        let logger = logger.with_context_hooks(hooks);
        logger.with_context(&[&Context::new()]).info(&[&"tenant"]);
        assert!(buffer.contents().contains("TENANT=acme"));
    }

    #[test]
    fn test_with_context_none() {
        let (logger, buffer) = logger_with_buffer();
        let entry = logger.with_context(&[]);
        assert!(entry.fields().is_empty());
        entry.info(&[&"bare"]);
        assert!(buffer.contents().contains("msg=bare"));
    }

    #[test]
    fn test_close_file_registration() {
        let logger = DefaultLogger::new();
        let file_a = Arc::new(tempfile::tempfile().unwrap());
        let file_b = Arc::new(tempfile::tempfile().unwrap());

        logger.close_file_on_logger_replace(file_a.clone()).unwrap();
        logger.close_file_on_logger_replace(file_a.clone()).unwrap();
        let err = logger.close_file_on_logger_replace(file_b).unwrap_err();
        assert!(matches!(err, LogError::FileAlreadyRegistered));
        assert!(Arc::ptr_eq(lock(&logger.file).as_ref().unwrap(), &file_a));
    }
}
