//! The readable side of a download.

use std::future::Future;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::ChildStdout;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

enum Source {
    Process(ChildStdout),
    Memory(Cursor<Bytes>),
}

/// Streamed media bytes in the order the transcoder emits them.
///
/// Reads fail with an error as soon as the request is cancelled. Dropping
/// the stream before end of file tells the pipeline the reader is gone.
pub struct MediaStream {
    source: Source,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    abandon: Option<CancellationToken>,
    eof: bool,
}

impl MediaStream {
    pub(crate) fn process(
        stdout: ChildStdout,
        cancel: CancellationToken,
        abandon: CancellationToken,
    ) -> Self {
        Self {
            source: Source::Process(stdout),
            cancelled: Box::pin(cancel.cancelled_owned()),
            abandon: Some(abandon),
            eof: false,
        }
    }

    pub(crate) fn memory(bytes: Bytes, cancel: CancellationToken) -> Self {
        Self {
            source: Source::Memory(Cursor::new(bytes)),
            cancelled: Box::pin(cancel.cancelled_owned()),
            abandon: None,
            eof: false,
        }
    }

    /// True once a read returned end of file.
    pub fn is_eof(&self) -> bool {
        self.eof
    }
}

impl AsyncRead for MediaStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(io::Error::other("download cancelled")));
        }

        let before = buf.filled().len();
        let result = match &mut this.source {
            Source::Process(stdout) => Pin::new(stdout).poll_read(cx, buf),
            Source::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
        };

        if let Poll::Ready(Ok(())) = result
            && buf.remaining() > 0
            && buf.filled().len() == before
        {
            this.eof = true;
        }
        result
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        if !self.eof
            && let Some(abandon) = &self.abandon
        {
            abandon.cancel();
        }
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            Source::Process(_) => "process",
            Source::Memory(_) => "memory",
        };
        f.debug_struct("MediaStream")
            .field("source", &source)
            .field("eof", &self.eof)
            .finish()
    }
}
