//! The extract-then-transcode process pipeline.
//!
//! A request moves through metadata fetch, stream selection and finally two
//! chained processes: the extractor writes the selected formats to stdout,
//! a pump task copies them into the transcoder's stdin, and the transcoder's
//! stdout becomes the [`MediaStream`] handed to the caller.

mod media_stream;
mod streams;
mod watcher;

pub use media_stream::MediaStream;
pub use streams::{SelectedStream, resolve_streams};
pub use watcher::Completion;

use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::YdlsConfig;
use crate::extractor::{ERROR_PREFIX, Extractor};
use crate::media::Metadata;
use crate::process::StderrMonitor;
use crate::profile::FormatProfile;
use crate::scratch::ScratchDir;
use crate::timerange::TimeRange;
use crate::transcoder::Transcoder;
use crate::utils::filename::media_filename;
use crate::{Error, Result};

/// Name of the metadata file handed back to the extractor.
const METADATA_FILE: &str = "info.json";

/// The outcome of a successfully started download.
#[derive(Debug)]
pub struct DownloadResult {
    pub media: MediaStream,
    /// Suggested filename, `None` for generated documents such as feeds.
    pub filename: Option<String>,
    pub mime_type: String,
    pub completion: Completion,
}

impl DownloadResult {
    /// A result serving an in-memory document.
    pub(crate) fn document(
        bytes: Bytes,
        mime_type: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            media: MediaStream::memory(bytes, cancel),
            filename: None,
            mime_type: mime_type.into(),
            completion: Completion::ready(Ok(())),
        }
    }

    /// Release the media stream and wait for the final outcome.
    pub async fn wait(self) -> Result<()> {
        let Self {
            media, completion, ..
        } = self;
        drop(media);
        completion.wait().await
    }
}

/// Starts extractor/transcoder pairs for resolved requests.
#[derive(Debug, Clone)]
pub struct Pipeline {
    extractor: Extractor,
    transcoder: Transcoder,
    stop_timeout: Duration,
    scratch_prefix: String,
}

impl Pipeline {
    pub fn new(config: &YdlsConfig) -> Self {
        Self {
            extractor: Extractor::new(config),
            transcoder: Transcoder::new(config),
            stop_timeout: config.stop_timeout,
            scratch_prefix: config.scratch_prefix.clone(),
        }
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    /// Start both processes and return as soon as they are running.
    ///
    /// Failures after this point arrive through [`DownloadResult::completion`].
    pub async fn run(
        &self,
        metadata: &Metadata,
        profile: &FormatProfile,
        streams: &[SelectedStream],
        time_range: Option<&TimeRange>,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let transcoder_args = Transcoder::build_args(profile, streams, time_range)?;
        let format_ids: Vec<&str> = streams.iter().map(SelectedStream::format_id).collect();

        let scratch = ScratchDir::new(&self.scratch_prefix)?;
        let info_path = scratch.write_file(METADATA_FILE, metadata.raw()).await?;

        info!(
            url = %metadata.webpage_url,
            format = %profile.name,
            formats = %format_ids.join("+"),
            "Starting download pipeline"
        );
        debug!(args = ?transcoder_args, "Transcoder arguments");

        let mut extractor = self
            .extractor
            .download_command(&scratch, &info_path, &format_ids)
            .spawn()
            .map_err(|e| Error::process(format!("failed to start extractor: {}", e)))?;
        let extractor_stdout = extractor
            .stdout
            .take()
            .ok_or_else(|| Error::process("extractor stdout not captured"))?;
        let extractor_stderr = extractor
            .stderr
            .take()
            .ok_or_else(|| Error::process("extractor stderr not captured"))?;

        let mut transcoder = self
            .transcoder
            .command(&transcoder_args)
            .spawn()
            .map_err(|e| Error::process(format!("failed to start transcoder: {}", e)))?;
        let transcoder_stdin = transcoder
            .stdin
            .take()
            .ok_or_else(|| Error::process("transcoder stdin not captured"))?;
        let transcoder_stdout = transcoder
            .stdout
            .take()
            .ok_or_else(|| Error::process("transcoder stdout not captured"))?;
        let transcoder_stderr = transcoder
            .stderr
            .take()
            .ok_or_else(|| Error::process("transcoder stderr not captured"))?;

        let abandon = CancellationToken::new();
        let pump = watcher::spawn_pump(extractor_stdout, transcoder_stdin, cancel.clone());

        let completion = watcher::spawn_watcher(watcher::Watch {
            url: metadata.webpage_url.clone(),
            extractor,
            transcoder,
            extractor_stderr: StderrMonitor::spawn(
                extractor_stderr,
                "extractor",
                Some(ERROR_PREFIX),
            ),
            transcoder_stderr: StderrMonitor::spawn(transcoder_stderr, "transcoder", None),
            pump,
            scratch,
            cancel: cancel.clone(),
            abandon: abandon.clone(),
            stop_timeout: self.stop_timeout,
        });

        Ok(DownloadResult {
            media: MediaStream::process(transcoder_stdout, cancel.clone(), abandon),
            filename: Some(media_filename(metadata.display_title(), &profile.ext)),
            mime_type: profile.mime_type.clone(),
            completion,
        })
    }
}
