//! Background supervision of a running pipeline.
//!
//! One watcher task per request owns both child processes and the scratch
//! directory. It waits for the processes to exit (or kills them), removes
//! the scratch directory and reports a single outcome through [`Completion`].

use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::process::{StderrMonitor, StderrSummary, describe_exit};
use crate::scratch::ScratchDir;
use crate::{Error, Result};

/// Buffer size used when copying extractor output into the transcoder.
const PUMP_BUFFER_SIZE: usize = 64 * 1024;

/// Handle on the final outcome of a download.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<()>>,
}

impl Completion {
    pub(crate) fn ready(outcome: Result<()>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }

    /// Wait for the download to finish.
    ///
    /// Blocks until both tools have exited, so drop the media stream first
    /// unless it has been read to the end.
    pub async fn wait(self) -> Result<()> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(Error::process("pipeline watcher stopped without an outcome")))
    }
}

/// Copy extractor stdout into transcoder stdin until EOF, a write error or
/// cancellation. Closing stdin afterwards lets the transcoder finish.
pub(super) fn spawn_pump(
    mut from: ChildStdout,
    mut to: ChildStdin,
    cancel: CancellationToken,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut buffer = vec![0u8; PUMP_BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = from.read(&mut buffer) => {
                    match result {
                        Ok(0) => break,
                        Ok(n) => {
                            if let Err(e) = to.write_all(&buffer[..n]).await {
                                debug!(error = %e, "Transcoder stopped accepting input");
                                break;
                            }
                            total += n as u64;
                        }
                        Err(e) => {
                            debug!(error = %e, "Failed reading extractor output");
                            break;
                        }
                    }
                }
            }
        }

        let _ = to.shutdown().await;
        debug!(bytes = total, "Pump finished");
        total
    })
}

/// Everything the watcher takes ownership of.
pub(super) struct Watch {
    pub url: String,
    pub extractor: Child,
    pub transcoder: Child,
    pub extractor_stderr: StderrMonitor,
    pub transcoder_stderr: StderrMonitor,
    pub pump: JoinHandle<u64>,
    pub scratch: ScratchDir,
    pub cancel: CancellationToken,
    pub abandon: CancellationToken,
    pub stop_timeout: Duration,
}

enum Stop {
    Exited(Exits),
    Cancelled,
    Abandoned,
}

/// Which process ended first. A transcoder that stops first takes the
/// extractor down with it through a broken pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FirstExit {
    Extractor,
    Transcoder,
}

struct Exits {
    first: FirstExit,
    extractor: std::io::Result<ExitStatus>,
    transcoder: std::io::Result<ExitStatus>,
}

pub(super) fn spawn_watcher(watch: Watch) -> Completion {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let url = watch.url.clone();
        let started = Instant::now();
        let (outcome, scratch) = supervise(watch).await;
        scratch.close();

        match &outcome {
            Ok(()) => info!(url = %url, elapsed = ?started.elapsed(), "Download finished"),
            Err(Error::Cancelled) => info!(url = %url, "Download cancelled"),
            Err(e) => error!(url = %url, error = %e, "Download failed"),
        }
        let _ = tx.send(outcome);
    });

    Completion { rx }
}

async fn supervise(watch: Watch) -> (Result<()>, ScratchDir) {
    let Watch {
        url,
        mut extractor,
        mut transcoder,
        extractor_stderr,
        transcoder_stderr,
        pump,
        scratch,
        cancel,
        abandon,
        stop_timeout,
    } = watch;

    let stop = tokio::select! {
        biased;
        _ = cancel.cancelled() => Stop::Cancelled,
        _ = abandon.cancelled() => Stop::Abandoned,
        exits = wait_for_exit(&url, &mut extractor, &mut transcoder, stop_timeout) => {
            Stop::Exited(exits)
        }
    };

    let outcome = match stop {
        Stop::Cancelled => {
            debug!(url = %url, "Cancellation requested, killing processes");
            kill(&mut extractor, &mut transcoder).await;
            Err(Error::Cancelled)
        }
        Stop::Abandoned => {
            debug!(url = %url, grace = ?stop_timeout, "Reader went away, waiting for processes");
            let graceful = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                exited = tokio::time::timeout(
                    stop_timeout,
                    async { tokio::join!(extractor.wait(), transcoder.wait()) },
                ) => Some(exited.is_ok()),
            };
            match graceful {
                None => {
                    kill(&mut extractor, &mut transcoder).await;
                    Err(Error::Cancelled)
                }
                Some(exited) => {
                    if !exited {
                        warn!(url = %url, "Processes did not exit in time; killing");
                        kill(&mut extractor, &mut transcoder).await;
                    }
                    Ok(())
                }
            }
        }
        Stop::Exited(exits) => {
            if cancel.is_cancelled() {
                Err(Error::Cancelled)
            } else if abandon.is_cancelled() {
                Ok(())
            } else {
                let extractor_summary = finish(extractor_stderr, stop_timeout).await;
                let transcoder_summary = finish(transcoder_stderr, stop_timeout).await;
                judge(&url, exits, &extractor_summary, &transcoder_summary)
            }
        }
    };

    pump.abort();
    (outcome, scratch)
}

/// Wait for both processes. Once the transcoder is gone nothing consumes
/// the extractor's output, so it gets `grace` to exit before being killed.
async fn wait_for_exit(
    url: &str,
    extractor: &mut Child,
    transcoder: &mut Child,
    grace: Duration,
) -> Exits {
    tokio::select! {
        biased;
        status = transcoder.wait() => {
            let extractor_status = match tokio::time::timeout(grace, extractor.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    debug!(url, "Extractor outlived the transcoder; killing");
                    if let Err(e) = extractor.kill().await {
                        debug!(error = %e, "Failed to kill extractor");
                    }
                    extractor.wait().await
                }
            };
            Exits {
                first: FirstExit::Transcoder,
                extractor: extractor_status,
                transcoder: status,
            }
        }
        status = extractor.wait() => Exits {
            first: FirstExit::Extractor,
            extractor: status,
            transcoder: transcoder.wait().await,
        },
    }
}

async fn kill(extractor: &mut Child, transcoder: &mut Child) {
    if let Err(e) = extractor.kill().await {
        debug!(error = %e, "Failed to kill extractor");
    }
    if let Err(e) = transcoder.kill().await {
        debug!(error = %e, "Failed to kill transcoder");
    }
}

async fn finish(monitor: StderrMonitor, within: Duration) -> StderrSummary {
    tokio::time::timeout(within, monitor.finish())
        .await
        .unwrap_or_default()
}

/// Turn exit statuses into the request outcome.
///
/// A transcoder that ended first decides the outcome on its own. Otherwise
/// the extractor is judged first since a broken download also breaks the
/// transcoder, unless the extractor only died of the transcoder going away.
fn judge(
    url: &str,
    exits: Exits,
    extractor_summary: &StderrSummary,
    transcoder_summary: &StderrSummary,
) -> Result<()> {
    let extractor_status = exits
        .extractor
        .map_err(|e| Error::process(format!("waiting for extractor: {}", e)))?;
    let transcoder_status = exits
        .transcoder
        .map_err(|e| Error::process(format!("waiting for transcoder: {}", e)))?;

    let transcoder_failed = || -> Result<()> {
        warn!(url, stderr = %transcoder_summary.tail_text(), "Transcoder failed");
        Err(Error::process(format!(
            "transcoder failed with {}",
            describe_exit(&transcoder_status)
        )))
    };

    if exits.first == FirstExit::Transcoder {
        if !transcoder_status.success() {
            return transcoder_failed();
        }
        if !extractor_status.success() {
            debug!(
                url,
                status = %describe_exit(&extractor_status),
                "Extractor stopped after the transcoder finished"
            );
        }
        return Ok(());
    }

    if !transcoder_status.success() && lost_output_pipe(&extractor_status, extractor_summary) {
        debug!(url, stderr = %extractor_summary.tail_text(), "Extractor lost its output pipe");
        return transcoder_failed();
    }
    if let Some(message) = &extractor_summary.first_error {
        return Err(Error::extraction(message.clone()));
    }
    if !extractor_status.success() {
        warn!(url, stderr = %extractor_summary.tail_text(), "Extractor failed");
        return Err(Error::extraction(format!(
            "extractor failed with {}",
            describe_exit(&extractor_status)
        )));
    }
    if !transcoder_status.success() {
        return transcoder_failed();
    }
    Ok(())
}

/// The extractor was killed by a signal or reported a broken pipe.
fn lost_output_pipe(status: &ExitStatus, summary: &StderrSummary) -> bool {
    if status.success() {
        return false;
    }
    let broken_pipe = |line: &str| line.to_ascii_lowercase().contains("broken pipe");
    status.code().is_none()
        || summary.first_error.as_deref().is_some_and(broken_pipe)
        || summary.tail.iter().any(|line| broken_pipe(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_completion() {
        assert!(Completion::ready(Ok(())).wait().await.is_ok());
        assert!(
            Completion::ready(Err(Error::Cancelled))
                .wait()
                .await
                .unwrap_err()
                .is_cancelled()
        );
    }

    #[tokio::test]
    async fn test_dropped_sender_is_an_error() {
        let (tx, rx) = oneshot::channel::<Result<()>>();
        drop(tx);
        let err = Completion { rx }.wait().await.unwrap_err();
        assert!(matches!(err, Error::Process(_)));
    }

    #[cfg(unix)]
    fn status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    fn signalled(signal: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(signal)
    }

    #[cfg(unix)]
    fn exits(first: FirstExit, extractor: ExitStatus, transcoder: ExitStatus) -> Exits {
        Exits {
            first,
            extractor: Ok(extractor),
            transcoder: Ok(transcoder),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_judge_precedence() {
        use FirstExit::Extractor;

        let quiet = StderrSummary::default();
        let reported = StderrSummary {
            first_error: Some("Requested format is not available".to_string()),
            tail: Vec::new(),
        };

        assert!(judge("u", exits(Extractor, status(0), status(0)), &quiet, &quiet).is_ok());

        let err =
            judge("u", exits(Extractor, status(1), status(1)), &reported, &quiet).unwrap_err();
        assert_eq!(err.to_string(), "Requested format is not available");

        let err = judge("u", exits(Extractor, status(2), status(0)), &quiet, &quiet).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));

        let err = judge("u", exits(Extractor, status(0), status(1)), &quiet, &quiet).unwrap_err();
        assert!(matches!(err, Error::Process(_)));
        assert!(err.to_string().contains("exit code 1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_transcoder_exiting_first_decides() {
        use FirstExit::Transcoder;

        let broken = StderrSummary {
            first_error: Some("[Errno 32] Broken pipe".to_string()),
            tail: Vec::new(),
        };

        let quiet = StderrSummary::default();
        let err =
            judge("u", exits(Transcoder, signalled(13), status(3)), &broken, &quiet).unwrap_err();
        assert!(matches!(err, Error::Process(_)));
        assert!(err.to_string().contains("exit code 3"));

        // Trimmed output: the transcoder stops early and the extractor is cut off.
        assert!(judge("u", exits(Transcoder, signalled(9), status(0)), &broken, &quiet).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_pipe_blames_transcoder() {
        use FirstExit::Extractor;

        let quiet = StderrSummary::default();
        let broken = StderrSummary {
            first_error: Some("unable to write data: [Errno 32] Broken pipe".to_string()),
            tail: Vec::new(),
        };

        let err = judge("u", exits(Extractor, status(1), status(1)), &broken, &quiet).unwrap_err();
        assert!(matches!(err, Error::Process(_)));

        let err =
            judge("u", exits(Extractor, signalled(13), status(1)), &quiet, &quiet).unwrap_err();
        assert!(matches!(err, Error::Process(_)));

        // Transcoder fine: the extractor's own failure still wins.
        let err = judge("u", exits(Extractor, status(1), status(0)), &broken, &quiet).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_lost_output_pipe() {
        let quiet = StderrSummary::default();
        let tail = StderrSummary {
            first_error: None,
            tail: vec!["BrokenPipeError: [Errno 32] Broken pipe".to_string()],
        };
        assert!(lost_output_pipe(&signalled(13), &quiet));
        assert!(lost_output_pipe(&status(1), &tail));
        assert!(!lost_output_pipe(&status(1), &quiet));
        assert!(!lost_output_pipe(&status(0), &tail));
    }
}
