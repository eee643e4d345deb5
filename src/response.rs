//! Streaming HTTP responses with an explicit finish/abort ending.
//!
//! [`ResponseStream::begin`] builds the response head right away and hands back
//! a writer for the body. The body is fed through a capacity-1 channel, so a
//! write completes only once the connection has taken the previous chunk.
//!
//! A stream ends in exactly one of two ways:
//!
//! - [`ResponseStream::finish`]: queued chunks are delivered and the body ends
//!   cleanly (chunked terminator sent).
//! - [`ResponseStream::abort`]: chunks already accepted by `write_chunk` are
//!   still handed out, then the body yields an error, which makes hyper drop
//!   the connection without a terminator.
//!
//! Both consume the writer. A writer dropped without either is aborted.

use std::io;

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::ArchiveError;

pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";
pub const ARCHIVE_DISPOSITION: &str = "attachment; filename=\"archive.zip\"";

/// Writer half of a streaming response body
pub struct ResponseStream {
    chunks: Option<mpsc::Sender<Bytes>>,
    abort: Option<oneshot::Sender<()>>,
}

impl ResponseStream {
    /// Start a `200 OK` response with the given headers and no known length
    pub fn begin(content_type: &'static str, disposition: &'static str) -> (Self, Response) {
        let (chunk_tx, chunk_rx) = mpsc::channel(1);
        let (abort_tx, abort_rx) = oneshot::channel();

        let mut response = Response::new(Body::from_stream(body_stream(chunk_rx, abort_rx)));
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static(disposition),
        );

        let writer = Self {
            chunks: Some(chunk_tx),
            abort: Some(abort_tx),
        };
        (writer, response)
    }

    /// Begin a zip download named `archive.zip`
    pub fn begin_archive() -> (Self, Response) {
        Self::begin(ARCHIVE_CONTENT_TYPE, ARCHIVE_DISPOSITION)
    }

    /// Queue one chunk as its own body frame.
    ///
    /// Waits while the previous chunk is still pending and fails with
    /// [`ArchiveError::WriteFailure`] once the client side is gone.
    pub async fn write_chunk(&self, chunk: Bytes) -> Result<(), ArchiveError> {
        let chunks = self.chunks.as_ref().ok_or(ArchiveError::WriteFailure)?;
        chunks
            .send(chunk)
            .await
            .map_err(|_| ArchiveError::WriteFailure)
    }

    /// Resolves once the body has been dropped by the connection
    pub async fn closed(&self) {
        if let Some(chunks) = self.chunks.as_ref() {
            chunks.closed().await;
        }
    }

    /// Whether the connection has already let go of the body
    pub fn is_closed(&self) -> bool {
        self.chunks.as_ref().is_none_or(|chunks| chunks.is_closed())
    }

    /// Complete the body after any queued chunks
    pub fn finish(mut self) {
        // dropping the abort sender unblocks the body without an error
        self.abort.take();
        self.chunks.take();
    }

    /// Cut the body off without a clean end
    pub fn abort(mut self) {
        self.abort_inner();
    }

    fn abort_inner(&mut self) {
        if let Some(abort) = self.abort.take() {
            let _ = abort.send(());
        }
        self.chunks.take();
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if self.abort.is_some() {
            warn!("response stream dropped without finish or abort");
            self.abort_inner();
        }
    }
}

struct BodyState {
    chunks: mpsc::Receiver<Bytes>,
    abort: Option<oneshot::Receiver<()>>,
    aborted: bool,
    done: bool,
}

impl BodyState {
    /// After an abort: hand out chunks that were already accepted, then the error
    fn next_after_abort(mut self) -> Option<(io::Result<Bytes>, Self)> {
        if let Ok(chunk) = self.chunks.try_recv() {
            return Some((Ok(chunk), self));
        }

        self.done = true;
        let err = io::Error::new(io::ErrorKind::ConnectionAborted, "archive stream aborted");
        Some((Err(err), self))
    }
}

fn body_stream(
    chunks: mpsc::Receiver<Bytes>,
    abort: oneshot::Receiver<()>,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let state = BodyState {
        chunks,
        abort: Some(abort),
        aborted: false,
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        if state.aborted {
            return state.next_after_abort();
        }

        loop {
            let Some(abort) = state.abort.as_mut() else {
                let chunk = state.chunks.recv().await?;
                return Some((Ok(chunk), state));
            };

            tokio::select! {
                biased;

                signal = abort => {
                    state.abort = None;
                    if signal.is_ok() {
                        state.aborted = true;
                        return state.next_after_abort();
                    }
                    // sender dropped without signalling: a clean finish
                }
                chunk = state.chunks.recv() => {
                    let chunk = chunk?;
                    return Some((Ok(chunk), state));
                }
            }
        }
    })
}
