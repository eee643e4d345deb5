use std::fmt;
use std::process::ExitStatus;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Body sent with every 404 from the archive endpoint.
pub const NOT_FOUND_MESSAGE: &str = "Archive doesn't exist or deleted";

/// Why an in-flight archive stream stopped before the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    ClientDisconnected,
    ServerShutdown,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interruption::ClientDisconnected => f.write_str("client disconnected"),
            Interruption::ServerShutdown => f.write_str("server shutting down"),
        }
    }
}

/// Errors raised while serving an archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid archive identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("archive not found: {0}")]
    ResourceNotFound(String),

    #[error("failed to start archiver `{program}`: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("archiver exited with {0}")]
    ProcessFailed(ExitStatus),

    #[error("download was interrupted: {0}")]
    StreamInterrupted(Interruption),

    #[error("response body is closed")]
    WriteFailure,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Cancellation-like outcomes: the client is gone or the server is stopping.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            ArchiveError::StreamInterrupted(_) | ArchiveError::WriteFailure
        )
    }
}

/// Only validation errors are turned into responses; anything raised once
/// the headers are out can only truncate the body.
impl IntoResponse for ArchiveError {
    fn into_response(self) -> Response {
        match self {
            ArchiveError::InvalidIdentifier(_) | ArchiveError::ResourceNotFound(_) => {
                (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE).into_response()
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
