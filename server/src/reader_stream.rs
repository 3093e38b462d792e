use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use futures::Stream;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::lock::SharedGuard;

/// File contents as a byte stream that keeps the report's shared lock.
///
/// The lock is released when the stream is dropped: after the last chunk was
/// sent, after a read error, or when the transport gives up on a
/// disconnected client.
pub struct LockedReaderStream {
    inner: ReaderStream<File>,
    relative: String,
    expected: u64,
    sent: u64,
    finished: bool,
    guard: SharedGuard,
}

impl LockedReaderStream {
    #[must_use]
    pub fn new(file: File, expected: u64, relative: String, guard: SharedGuard) -> Self {
        Self {
            inner: ReaderStream::new(file),
            relative,
            expected,
            sent: 0,
            finished: false,
            guard,
        }
    }
}

impl Stream for LockedReaderStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => this.sent += chunk.len() as u64,
            Poll::Ready(Some(Err(e))) => {
                tracing::error!(
                    "read of '{}' failed after {} bytes: {e}",
                    this.relative,
                    this.sent
                );
            }
            Poll::Ready(None) => this.finished = true,
            Poll::Pending => {}
        }
        polled
    }
}

impl Drop for LockedReaderStream {
    fn drop(&mut self) {
        if self.finished {
            tracing::info!("sent '{}': {} bytes", self.relative, self.sent);
        } else {
            tracing::warn!(
                "download of '{}' aborted after {} of {} bytes",
                self.relative,
                self.sent,
                self.expected
            );
        }
        tracing::trace!("releasing shared lock: {:?}", self.guard.key());
    }
}
