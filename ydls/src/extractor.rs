//! Driving the extraction tool (yt-dlp or youtube-dl).
//!
//! Two invocations are used per request. The first fetches metadata only
//! and writes it, plus a thumbnail, into a scratch directory. The second
//! replays that metadata with `--load-info-json` and writes the selected
//! formats to stdout for the transcoder.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ToolConfig, YdlsConfig};
use crate::media::Metadata;
use crate::process::{StderrMonitor, StderrSummary, describe_exit};
use crate::scratch::ScratchDir;
use crate::{Error, Result};

/// Lines on stderr starting with this carry a user-facing failure.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Container yt-dlp merges into when several formats are requested.
const MERGE_FORMAT: &str = "mkv";

const COMMON_ARGS: &[&str] = &["--ignore-config", "--no-cache-dir"];

#[derive(Debug, Clone)]
pub struct Extractor {
    tool: ToolConfig,
    scratch_prefix: String,
    stop_timeout: Duration,
}

impl Extractor {
    pub fn new(config: &YdlsConfig) -> Self {
        Self {
            tool: config.extractor.clone(),
            scratch_prefix: config.scratch_prefix.clone(),
            stop_timeout: config.stop_timeout,
        }
    }

    pub fn tool(&self) -> &ToolConfig {
        &self.tool
    }

    /// First line of `--version`, `None` if the tool cannot be run.
    pub async fn version(&self) -> Option<String> {
        let output = self.tool.command().arg("--version").output().await.ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
    }

    /// Arguments for a metadata-only run. The URL is read from stdin.
    pub fn metadata_args(items: usize) -> Vec<String> {
        let mut args: Vec<String> = COMMON_ARGS.iter().map(|s| s.to_string()).collect();
        args.extend(
            ["--skip-download", "--write-info-json", "--write-thumbnail"]
                .map(String::from),
        );
        if items > 0 {
            args.extend(["--playlist-end".to_string(), items.to_string()]);
        }
        args.extend(["--batch-file".to_string(), "-".to_string()]);
        args
    }

    /// Arguments for downloading `format_ids` to stdout from saved metadata.
    pub fn download_args(info_path: &Path, format_ids: &[&str]) -> Vec<String> {
        let mut ids: Vec<&str> = Vec::with_capacity(format_ids.len());
        for id in format_ids {
            if !ids.contains(id) {
                ids.push(id);
            }
        }

        let mut args: Vec<String> = COMMON_ARGS.iter().map(|s| s.to_string()).collect();
        args.extend([
            "--load-info-json".to_string(),
            info_path.to_string_lossy().into_owned(),
            "-f".to_string(),
            ids.join("+"),
        ]);
        if ids.len() > 1 {
            args.extend(["--merge-output-format".to_string(), MERGE_FORMAT.to_string()]);
        }
        args.extend(["-o".to_string(), "-".to_string()]);
        args
    }

    /// Command that streams the given formats to stdout.
    pub(crate) fn download_command(
        &self,
        scratch: &ScratchDir,
        info_path: &Path,
        format_ids: &[&str],
    ) -> Command {
        let mut cmd = self.tool.command();
        cmd.args(Self::download_args(info_path, format_ids))
            .current_dir(scratch.path());
        cmd
    }

    /// Fetch and parse metadata for `url`.
    ///
    /// `items > 0` caps how many playlist entries are resolved. The first
    /// `ERROR: ` line on stderr aborts the run right away.
    pub async fn fetch_metadata(
        &self,
        url: &str,
        items: usize,
        cancel: &CancellationToken,
    ) -> Result<Metadata> {
        let scratch = ScratchDir::new(&self.scratch_prefix)?;

        let mut cmd = self.tool.command();
        cmd.args(Self::metadata_args(items))
            .current_dir(scratch.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null());

        debug!(
            binary = %self.tool.binary_path.display(),
            url,
            items,
            "Fetching metadata"
        );

        let mut child = cmd.spawn().map_err(|e| {
            Error::process(format!(
                "failed to start {}: {}",
                self.tool.binary_path.display(),
                e
            ))
        })?;

        let Some(stderr) = child.stderr.take() else {
            return Err(Error::process("extractor stderr not captured"));
        };
        let mut monitor = StderrMonitor::spawn(stderr, "extractor", Some(ERROR_PREFIX));

        if let Some(mut stdin) = child.stdin.take() {
            let line = format!("{}\n", url);
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                debug!(error = %e, "Extractor closed stdin early");
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                monitor.abort();
                debug!(url, "Metadata fetch cancelled");
                return Err(Error::Cancelled);
            }
            Some(message) = monitor.first_error() => {
                let _ = child.start_kill();
                monitor.abort();
                warn!(url, error = %message, "Extractor reported an error");
                return Err(Error::extraction(message));
            }
            status = child.wait() => status?,
        };

        // Grandchildren may keep stderr open after the tool itself exited.
        let summary = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(url, "Metadata fetch cancelled");
                return Err(Error::Cancelled);
            }
            summary = tokio::time::timeout(self.stop_timeout, monitor.finish()) => {
                summary.unwrap_or_else(|_| {
                    debug!(url, "Extractor stderr still open after exit");
                    StderrSummary::default()
                })
            }
        };
        if let Some(message) = summary.first_error {
            warn!(url, error = %message, "Extractor reported an error");
            return Err(Error::extraction(message));
        }
        if !status.success() {
            let tail = summary.tail_text();
            warn!(url, status = %describe_exit(&status), stderr = %tail, "Extractor failed");
            return Err(Error::extraction(format!(
                "extractor failed with {}",
                describe_exit(&status)
            )));
        }

        let mut metadata = Self::read_metadata(&scratch).await?;
        scratch.close();
        if metadata.webpage_url.is_empty() {
            metadata.webpage_url = url.to_string();
        }

        info!(
            url,
            title = %metadata.display_title(),
            formats = metadata.formats.len(),
            entries = metadata.entries.as_ref().map_or(0, Vec::len),
            has_thumbnail = metadata.thumbnail_bytes.is_some(),
            "Fetched metadata"
        );
        Ok(metadata)
    }

    /// Parse what a metadata run left in `scratch`.
    ///
    /// When several metadata files exist (a playlist plus its entries) the
    /// playlist wins, otherwise the first by name.
    async fn read_metadata(scratch: &ScratchDir) -> Result<Metadata> {
        let files = scratch.metadata_files().await?;
        if files.is_empty() {
            return Err(Error::parse("extractor wrote no metadata file"));
        }

        let mut chosen: Option<Metadata> = None;
        for path in &files {
            let raw = Bytes::from(tokio::fs::read(path).await?);
            let metadata = Metadata::parse(raw)?;
            if metadata.is_playlist() {
                chosen = Some(metadata);
                break;
            }
            if chosen.is_none() {
                chosen = Some(metadata);
            }
        }
        let Some(mut metadata) = chosen else {
            return Err(Error::parse("extractor wrote no metadata file"));
        };

        if let Some(thumbnail) = scratch.thumbnail().await? {
            metadata.thumbnail_bytes = Some(Bytes::from(tokio::fs::read(&thumbnail).await?));
        }

        Ok(metadata)
    }
}
