use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the capture runtime.
///
/// Configuration and load errors surface from `init`.  Outbox errors are only
/// visible on [`OutboxWriter::write`](crate::OutboxWriter::write); the capture
/// path logs them and drops the event.
#[derive(Debug, Error)]
pub enum Error {
    /// No outbox directory was configured.
    #[error("no outbox path configured")]
    MissingOutboxPath,
    /// A directory required by the runtime could not be created.
    #[error("failed to create directory {}", path.display())]
    CreateDirectory {
        /// The directory that failed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The crash backend refused to start.
    #[error("crash backend failed to start")]
    BackendStartup(#[source] io::Error),
    /// Writing an outbox entry failed.
    #[error("failed to write outbox entry")]
    Outbox(#[source] io::Error),
    /// An event could not be serialized.
    #[error("failed to serialize envelope")]
    Serialize(#[source] serde_json::Error),
    /// A native library could not be loaded.
    #[error("failed to load native library {library}: {reason}")]
    Load {
        /// The library name as configured.
        library: String,
        /// The loader's error message.
        reason: String,
    },
}
