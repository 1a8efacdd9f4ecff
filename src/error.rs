use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("not a valid log level: {0:?}")]
    InvalidLevel(String),

    #[error("could not set a file to close on logger replace because one is already set")]
    FileAlreadyRegistered,

    #[error("invalid log configuration: {0}")]
    Config(String),

    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_invalid_level(&self) -> bool {
        matches!(self, LogError::InvalidLevel(_))
    }
}
