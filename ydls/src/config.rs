//! Engine configuration: where the tools live and how long to wait for them.

use std::path::PathBuf;
use std::time::Duration;

use crate::process::tokio_command;
use crate::{Error, Result};

pub const DEFAULT_EXTRACTOR_PATH: &str = "yt-dlp";
pub const DEFAULT_TRANSCODER_PATH: &str = "ffmpeg";

/// Grace period given to the tools after the reader goes away.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_SCRATCH_PREFIX: &str = "ydls-";

pub const EXTRACTOR_PATH_ENV: &str = "YDLS_EXTRACTOR_PATH";
pub const TRANSCODER_PATH_ENV: &str = "FFMPEG_PATH";
pub const STOP_TIMEOUT_ENV: &str = "YDLS_STOP_TIMEOUT_SECS";

/// How to launch one external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub binary_path: PathBuf,
    /// Arguments placed before the generated ones, e.g. a script path when
    /// the binary is an interpreter.
    pub leading_args: Vec<String>,
}

impl ToolConfig {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// A command for this tool with the leading args already applied.
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio_command(&self.binary_path);
        cmd.args(&self.leading_args);
        cmd
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YdlsConfig {
    pub extractor: ToolConfig,
    pub transcoder: ToolConfig,
    pub stop_timeout: Duration,
    /// Name prefix for per-request scratch directories.
    pub scratch_prefix: String,
    /// Feed image used when a playlist has no thumbnail.
    pub link_icon: Option<String>,
}

impl Default for YdlsConfig {
    fn default() -> Self {
        Self {
            extractor: ToolConfig::new(DEFAULT_EXTRACTOR_PATH),
            transcoder: ToolConfig::new(DEFAULT_TRANSCODER_PATH),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            scratch_prefix: DEFAULT_SCRATCH_PREFIX.to_string(),
            link_icon: None,
        }
    }
}

impl YdlsConfig {
    pub fn with_extractor(mut self, extractor: ToolConfig) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_transcoder(mut self, transcoder: ToolConfig) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn with_scratch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scratch_prefix = prefix.into();
        self
    }

    pub fn with_link_icon(mut self, url: impl Into<String>) -> Self {
        self.link_icon = Some(url.into());
        self
    }

    /// Defaults overridden by `YDLS_EXTRACTOR_PATH`, `FFMPEG_PATH` and
    /// `YDLS_STOP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`YdlsConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = value(EXTRACTOR_PATH_ENV) {
            config.extractor = ToolConfig::new(path);
        }
        if let Some(path) = value(TRANSCODER_PATH_ENV) {
            config.transcoder = ToolConfig::new(path);
        }
        if let Some(secs) = value(STOP_TIMEOUT_ENV) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                Error::config(format!(
                    "{} must be whole seconds, got {:?}",
                    STOP_TIMEOUT_ENV, secs
                ))
            })?;
            config.stop_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = YdlsConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, YdlsConfig::default());
        assert_eq!(config.extractor.binary_path, PathBuf::from("yt-dlp"));
        assert_eq!(config.stop_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_env_overrides() {
        let config = YdlsConfig::from_lookup(lookup(&[
            ("YDLS_EXTRACTOR_PATH", "/opt/bin/youtube-dl"),
            ("FFMPEG_PATH", "/usr/local/bin/ffmpeg"),
            ("YDLS_STOP_TIMEOUT_SECS", " 3 "),
        ]))
        .unwrap();
        assert_eq!(
            config.extractor.binary_path,
            PathBuf::from("/opt/bin/youtube-dl")
        );
        assert_eq!(
            config.transcoder.binary_path,
            PathBuf::from("/usr/local/bin/ffmpeg")
        );
        assert_eq!(config.stop_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = YdlsConfig::from_lookup(lookup(&[("FFMPEG_PATH", "  ")])).unwrap();
        assert_eq!(config.transcoder.binary_path, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_invalid_stop_timeout() {
        let err = YdlsConfig::from_lookup(lookup(&[("YDLS_STOP_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_builder() {
        let config = YdlsConfig::default()
            .with_extractor(ToolConfig::new("/bin/sh").with_leading_args(["fake-ytdlp.sh"]))
            .with_stop_timeout(Duration::from_millis(500))
            .with_scratch_prefix("test-")
            .with_link_icon("https://ydls.example/icon.png");
        assert_eq!(config.extractor.leading_args, vec!["fake-ytdlp.sh"]);
        assert_eq!(config.stop_timeout, Duration::from_millis(500));
        assert_eq!(config.scratch_prefix, "test-");
        assert_eq!(
            config.link_icon.as_deref(),
            Some("https://ydls.example/icon.png")
        );
    }
}
