//! ffmpeg argument construction and invocation.
//!
//! The transcoder always reads the extractor's output from stdin and writes
//! the muxed result to stdout. Each selected stream is either copied as is
//! or re-encoded with the encoder and flags of its target codec.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::{ToolConfig, YdlsConfig};
use crate::pipeline::SelectedStream;
use crate::profile::FormatProfile;
use crate::timerange::TimeRange;
use crate::{Error, Result};

const INPUT: &str = "pipe:0";
const OUTPUT: &str = "pipe:1";

#[derive(Debug, Clone)]
pub struct Transcoder {
    tool: ToolConfig,
}

fn format_seconds(d: Duration) -> String {
    format!("{}.{:03}", d.as_secs(), d.subsec_millis())
}

impl Transcoder {
    pub fn new(config: &YdlsConfig) -> Self {
        Self {
            tool: config.transcoder.clone(),
        }
    }

    pub fn tool(&self) -> &ToolConfig {
        &self.tool
    }

    /// First line of `-version`, `None` if the tool cannot be run.
    pub async fn version(&self) -> Option<String> {
        let output = self.tool.command().arg("-version").output().await.ok()?;
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
    }

    /// Build the full argument list for one request.
    pub fn build_args(
        profile: &FormatProfile,
        streams: &[SelectedStream],
        time_range: Option<&TimeRange>,
    ) -> Result<Vec<String>> {
        let muxer = profile.muxer().ok_or_else(|| {
            Error::config(format!("profile {} has no container format", profile.name))
        })?;
        if streams.is_empty() {
            return Err(Error::config(format!(
                "nothing to transcode for profile {}",
                profile.name
            )));
        }

        let mut args: Vec<String> = ["-hide_banner", "-nostats", "-loglevel", "error"]
            .map(String::from)
            .to_vec();

        // Input seeking; ffmpeg decodes and discards up to the start on a pipe.
        if let Some(range) = time_range
            && !range.start.is_zero()
        {
            args.extend(["-ss".to_string(), format_seconds(range.start)]);
        }
        args.extend(["-i".to_string(), INPUT.to_string()]);
        if let Some(duration) = time_range.and_then(TimeRange::duration) {
            args.extend(["-t".to_string(), format_seconds(duration)]);
        }

        for stream in streams {
            args.extend([
                "-map".to_string(),
                format!("0:{}:0", stream.kind.specifier()),
            ]);
        }

        for stream in streams {
            let option = format!("-c:{}", stream.kind.specifier());
            if stream.copy {
                args.extend([option, "copy".to_string()]);
            } else {
                args.extend([option, stream.codec.encoder().to_string()]);
                args.extend(stream.codec.flags.iter().cloned());
            }
        }

        args.extend(profile.format_flags.iter().cloned());
        args.extend(["-f".to_string(), muxer.to_string(), OUTPUT.to_string()]);
        Ok(args)
    }

    /// Command reading from stdin and writing to stdout.
    pub(crate) fn command(&self, args: &[String]) -> Command {
        let mut cmd = self.tool.command();
        cmd.args(args).stdin(Stdio::piped());
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{FormatCandidate, RawFormat};
    use crate::negotiator::MediaKind;
    use crate::profile::{CodecSpec, Profiles};

    fn stream(kind: MediaKind, codec: CodecSpec, copy: bool) -> SelectedStream {
        SelectedStream {
            kind,
            format: FormatCandidate::from(RawFormat {
                format_id: "1".to_string(),
                ..Default::default()
            }),
            codec,
            copy,
        }
    }

    fn profile(name: &str) -> FormatProfile {
        Profiles::builtin().find_by_name(name).unwrap().clone()
    }

    #[test]
    fn test_copy_audio() {
        let mp3 = profile("mp3");
        let streams = [stream(MediaKind::Audio, CodecSpec::new("mp3", "libmp3lame"), true)];
        let args = Transcoder::build_args(&mp3, &streams, None).unwrap();
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-nostats", "-loglevel", "error", "-i", "pipe:0", "-map",
                "0:a:0", "-c:a", "copy", "-f", "mp3", "pipe:1",
            ]
        );
    }

    #[test]
    fn test_encode_with_flags_and_format_flags() {
        let mp4 = profile("mp4");
        let audio = mp4.stream(MediaKind::Audio).unwrap().codecs[0].clone();
        let video = mp4.stream(MediaKind::Video).unwrap().codecs[0].clone();
        let streams = [
            stream(MediaKind::Audio, audio, false),
            stream(MediaKind::Video, video, true),
        ];
        let args = Transcoder::build_args(&mp4, &streams, None).unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-map 0:a:0 -map 0:v:0"));
        assert!(joined.contains("-c:a aac -b:a 192k -c:v copy"));
        assert!(joined.ends_with("-movflags +frag_keyframe+empty_moov -f mp4 pipe:1"));
    }

    #[test]
    fn test_time_range_flags() {
        let mkv = profile("mkv");
        let streams = [stream(MediaKind::Audio, CodecSpec::new("opus", "libopus"), true)];
        let range: TimeRange = "10s-15.5s".parse().unwrap();
        let args = Transcoder::build_args(&mkv, &streams, Some(&range)).unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-ss 10.000 -i pipe:0 -t 5.500 -map"));

        let open: TimeRange = "-20s".parse().unwrap();
        let joined = Transcoder::build_args(&mkv, &streams, Some(&open))
            .unwrap()
            .join(" ");
        assert!(!joined.contains("-ss"));
        assert!(joined.contains("-i pipe:0 -t 20.000"));
    }

    #[test]
    fn test_requires_container_and_streams() {
        let rss = profile("rss");
        let streams = [stream(MediaKind::Audio, CodecSpec::new("mp3", ""), true)];
        assert!(matches!(
            Transcoder::build_args(&rss, &streams, None),
            Err(Error::Configuration(_))
        ));
        assert!(Transcoder::build_args(&profile("mp3"), &[], None).is_err());
    }
}
