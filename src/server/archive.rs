//! The archive download endpoint.
//!
//! A request is validated before anything is sent, so a missing archive is a
//! plain 404. Once the directory is known to exist the response head goes out
//! immediately and a task pumps the archiver's output into the body:
//!
//! 1. read a chunk from the archiver
//! 2. wait the configured delay, if any
//! 3. write the chunk to the response
//!
//! Each of those waits also watches for the client going away and for server
//! shutdown. On either, the archiver is terminated and the response aborted.

use std::path::Path;
use std::time::Duration;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path as UrlPath, State};
use axum::response::{IntoResponse, Response};
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::AppState;
use crate::error::{ArchiveError, Interruption};
use crate::io::{ArchiveSource, Archiver};
use crate::response::ResponseStream;

/// What a completed stream delivered
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub chunks: u64,
    pub bytes: u64,
}

pub async fn handle_archive(
    State(state): State<AppState>,
    archive_hash: Result<UrlPath<String>, PathRejection>,
) -> Response {
    // an undecodable segment is just another identifier that names nothing
    let resolved = match archive_hash {
        Ok(UrlPath(archive_hash)) => state
            .config
            .resolve_archive(&archive_hash)
            .await
            .map(|dir| (archive_hash, dir)),
        Err(rejection) => Err(ArchiveError::InvalidIdentifier(rejection.body_text())),
    };
    let (archive_hash, dir) = match resolved {
        Ok(found) => found,
        Err(err) => {
            match &err {
                ArchiveError::InvalidIdentifier(_) => debug!(%err, "rejected archive request"),
                _ => info!(%err, "archive requested but missing"),
            }
            return err.into_response();
        }
    };

    let (writer, response) = ResponseStream::begin_archive();
    let span = info_span!("archive", archive = %archive_hash);

    tokio::spawn(
        async move {
            let delay = state.config.delay;
            match deliver_archive(state.archiver.as_ref(), &dir, writer, delay, state.shutdown)
                .await
            {
                Ok(summary) => {
                    info!(chunks = summary.chunks, bytes = summary.bytes, "archive sent")
                }
                Err(err) if err.is_interruption() => info!(%err, "download was interrupted"),
                Err(err) => error!(%err, "archive stream failed"),
            }
        }
        .instrument(span),
    );

    response
}

/// Start the archiver over `dir` and stream its output through `writer`.
///
/// A launch failure aborts the response before any body bytes are sent.
pub async fn deliver_archive(
    archiver: &dyn Archiver,
    dir: &Path,
    writer: ResponseStream,
    delay: Option<Duration>,
    shutdown: watch::Receiver<bool>,
) -> Result<StreamSummary, ArchiveError> {
    let mut source = match archiver.start(dir) {
        Ok(source) => source,
        Err(err) => {
            writer.abort();
            return Err(err);
        }
    };
    info!(dir = %dir.display(), "archive stream started");

    stream_archive(source.as_mut(), writer, delay, shutdown).await
}

/// Forward every chunk of `source` to `writer`, in order.
///
/// On success the response is finished. On any error, interruption
/// included, the source is terminated, the response aborted and the error
/// returned. The writer is consumed either way, so it is closed exactly once.
pub async fn stream_archive<S>(
    source: &mut S,
    writer: ResponseStream,
    delay: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<StreamSummary, ArchiveError>
where
    S: ArchiveSource + ?Sized,
{
    match pump(source, &writer, delay, &mut shutdown).await {
        Ok(summary) => {
            writer.finish();
            Ok(summary)
        }
        Err(err) => {
            if let Err(kill_err) = source.terminate().await {
                warn!(%kill_err, "failed to terminate archiver");
            }
            writer.abort();
            Err(err)
        }
    }
}

async fn pump<S>(
    source: &mut S,
    writer: &ResponseStream,
    delay: Option<Duration>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<StreamSummary, ArchiveError>
where
    S: ArchiveSource + ?Sized,
{
    let mut summary = StreamSummary::default();

    loop {
        let chunk = tokio::select! {
            biased;
            why = cancelled(writer, shutdown) => return Err(ArchiveError::StreamInterrupted(why)),
            chunk = source.read_chunk() => chunk?,
        };
        let Some(chunk) = chunk else {
            return Ok(summary);
        };

        if let Some(delay) = delay {
            tokio::select! {
                biased;
                why = cancelled(writer, shutdown) => return Err(ArchiveError::StreamInterrupted(why)),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(bytes = chunk.len(), "sending archive chunk");
        let len = chunk.len() as u64;
        tokio::select! {
            biased;
            why = cancelled(writer, shutdown) => return Err(ArchiveError::StreamInterrupted(why)),
            written = writer.write_chunk(chunk) => written?,
        }

        summary.chunks += 1;
        summary.bytes += len;
    }
}

/// Resolves when the client has gone away or shutdown was requested
async fn cancelled(writer: &ResponseStream, shutdown: &mut watch::Receiver<bool>) -> Interruption {
    tokio::select! {
        _ = writer.closed() => Interruption::ClientDisconnected,
        _ = shutdown_requested(shutdown) => Interruption::ServerShutdown,
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    // a dropped sender means nobody can ask for shutdown any more
    if !requested {
        std::future::pending::<()>().await;
    }
}
