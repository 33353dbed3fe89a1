use async_trait::async_trait;
use thiserror::Error;
use time::Date;

use crate::api::LogEntry;

pub mod file;
pub mod print;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("log storage failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize log entry: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Receives one complete entry per device request. Implementations must write
/// each entry as a unit, never interleaved with another request's entry.
#[async_trait]
pub trait LogSink {
    async fn send(&self, entry: LogEntry) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFile {
    Main,
    Daily(Date),
}

/// Read access to what a sink has written, for the log viewing routes.
#[async_trait]
pub trait LogStore {
    /// Returns `None` when nothing has been written to that file yet.
    async fn read(&self, file: LogFile) -> Result<Option<String>, SinkError>;
    async fn clear(&self) -> Result<(), SinkError>;
    fn location(&self) -> String;
}
