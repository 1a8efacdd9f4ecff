//! Leveled, structured logging facade for client libraries.
//!
//! Callers log through the [`Logger`] and [`LogEntry`] traits instead of a
//! concrete engine. [`DefaultLogger`] renders `key=value` (or JSON) lines,
//! masks credentials in message text, and pulls session fields out of
//! [`Context`] values. One logger is installed process-wide and can be
//! swapped at runtime with [`Logger::replace`].
//!
//! ```
//! use client_log::{get_logger, Context, LogEntry, Logger, SESSION_ID_KEY};
//!
//! let ctx = Context::new().with_value(SESSION_ID_KEY, "sess-42");
//! get_logger()
//!     .with_context(&[&ctx])
//!     .infof(format_args!("connected in {}ms", 12));
//! ```

pub mod bridge;
pub mod config;
pub mod context;
pub mod engine;
pub mod entry;
pub mod error;
pub mod level;
pub mod logger;

pub use bridge::LogBridge;
pub use config::{LogConfig, LogFormat};
pub use context::{
    context_to_fields, register_log_context_hook, Context, ContextHook, ContextHooks, ContextKey,
    LOG_KEYS, SESSION_ID_KEY, SESSION_USER_KEY,
};
pub use engine::formatter::{Formatter, JsonFormatter, MaskingFormatter, TextFormatter};
pub use engine::masking::mask_secrets;
pub use engine::{Fields, FileOutput, Record};
pub use entry::{Entry, LogEntry, ERROR_KEY};
pub use error::LogError;
pub use level::{Level, Severity};
pub use logger::{get_logger, init_from_env, set_logger, DefaultLogger, Logger, LEVEL_OFF};
