//! Child process helpers shared by the extractor and the transcoder.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::io;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Number of trailing stderr records kept for error reports.
const STDERR_TAIL_RECORDS: usize = 8;

/// Keep a console window from flashing up for each child on Windows.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// A `tokio::process::Command` with piped stdio that is killed when its
/// handle is dropped.
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window()
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Splits child output into text records on `\n` or `\r`.
///
/// Both tools rewrite progress lines with a bare carriage return, so plain
/// line splitting would hold those back until the next newline.
pub struct RecordReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
        }
    }

    /// Next non-empty trimmed record, `None` at end of stream.
    pub async fn next_record(&mut self) -> io::Result<Option<String>> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                let record = take_record(&mut self.pending);
                return Ok((!record.is_empty()).then_some(record));
            }

            match buf.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(idx) => {
                    self.pending.extend_from_slice(&buf[..idx]);
                    self.reader.consume(idx + 1);
                    let record = take_record(&mut self.pending);
                    if !record.is_empty() {
                        return Ok(Some(record));
                    }
                }
                None => {
                    let len = buf.len();
                    self.pending.extend_from_slice(buf);
                    self.reader.consume(len);
                }
            }
        }
    }
}

fn take_record(pending: &mut Vec<u8>) -> String {
    let record = String::from_utf8_lossy(pending).trim().to_string();
    pending.clear();
    record
}

/// What a stderr monitor saw by the time the stream closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StderrSummary {
    /// First record that started with the error prefix, prefix stripped.
    pub first_error: Option<String>,
    /// The last few records, oldest first.
    pub tail: Vec<String>,
}

impl StderrSummary {
    pub fn tail_text(&self) -> String {
        self.tail.join("\n")
    }
}

/// Background reader over a child's stderr.
pub struct StderrMonitor {
    first_error: Option<oneshot::Receiver<String>>,
    task: JoinHandle<StderrSummary>,
}

impl StderrMonitor {
    /// Start reading `stderr`, logging each record at debug level under `tool`.
    ///
    /// When `error_prefix` is set, the first record starting with it is
    /// reported through [`StderrMonitor::first_error`] as soon as it is read.
    pub fn spawn<R>(stderr: R, tool: &'static str, error_prefix: Option<&'static str>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (error_tx, error_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut reader = RecordReader::new(stderr);
            let mut summary = StderrSummary::default();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_RECORDS);
            let mut error_tx = Some(error_tx);

            loop {
                let record = match reader.next_record().await {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(e) => {
                        debug!(tool, error = %e, "Stopped reading stderr");
                        break;
                    }
                };
                debug!(tool, "{}", record);

                if summary.first_error.is_none()
                    && let Some(message) = error_prefix.and_then(|p| record.strip_prefix(p))
                {
                    let message = message.trim().to_string();
                    if let Some(tx) = error_tx.take() {
                        let _ = tx.send(message.clone());
                    }
                    summary.first_error = Some(message);
                }

                if tail.len() == STDERR_TAIL_RECORDS {
                    tail.pop_front();
                }
                tail.push_back(record);
            }

            summary.tail = tail.into();
            summary
        });

        Self {
            first_error: Some(error_rx),
            task,
        }
    }

    /// Resolves with the first error record. Resolves to `None` once the
    /// stream has closed without one, and on every call after the first
    /// error was delivered.
    pub async fn first_error(&mut self) -> Option<String> {
        let rx = self.first_error.as_mut()?;
        let result = rx.await.ok();
        self.first_error = None;
        result
    }

    /// Wait for the stream to close and return what was seen.
    pub async fn finish(self) -> StderrSummary {
        self.task.await.unwrap_or_default()
    }

    /// Stop reading without waiting.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Render an exit status the way error messages report it.
pub fn describe_exit(status: &std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn records(input: &'static [u8]) -> Vec<String> {
        let mut reader = RecordReader::new(input);
        let mut out = Vec::new();
        while let Some(record) = reader.next_record().await.unwrap() {
            out.push(record);
        }
        out
    }

    #[tokio::test]
    async fn test_records_split_on_cr_and_lf() {
        assert_eq!(
            records(b"[download]  10%\r[download]  20%\rdone\n\n  last  ").await,
            vec!["[download]  10%", "[download]  20%", "done", "last"]
        );
        assert!(records(b"").await.is_empty());
        assert!(records(b"\r\n\r\n").await.is_empty());
    }

    #[tokio::test]
    async fn test_monitor_reports_first_error() {
        let stderr: &'static [u8] =
            b"WARNING: slow\nERROR: Unsupported URL: x\nERROR: second\ntrailing\n";
        let mut monitor = StderrMonitor::spawn(stderr, "extractor", Some("ERROR: "));

        assert_eq!(
            monitor.first_error().await.as_deref(),
            Some("Unsupported URL: x")
        );
        assert_eq!(monitor.first_error().await, None);

        let summary = monitor.finish().await;
        assert_eq!(summary.first_error.as_deref(), Some("Unsupported URL: x"));
        assert_eq!(summary.tail.len(), 4);
        assert_eq!(summary.tail.last().map(String::as_str), Some("trailing"));
    }

    #[tokio::test]
    async fn test_monitor_without_errors() {
        let stderr: &'static [u8] = b"one\ntwo\n";
        let mut monitor = StderrMonitor::spawn(stderr, "transcoder", None);
        assert_eq!(monitor.first_error().await, None);

        let summary = monitor.finish().await;
        assert_eq!(summary.first_error, None);
        assert_eq!(summary.tail_text(), "one\ntwo");
    }

    #[tokio::test]
    async fn test_monitor_keeps_bounded_tail() {
        let stderr: &'static [u8] = b"1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n";
        let summary = StderrMonitor::spawn(stderr, "transcoder", None)
            .finish()
            .await;
        assert_eq!(summary.tail.len(), STDERR_TAIL_RECORDS);
        assert_eq!(summary.tail.first().map(String::as_str), Some("3"));
    }
}
