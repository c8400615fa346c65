//! Format negotiation: picking a source stream for a media kind.
//!
//! Selection is a deterministic first-match scan. The codec preference
//! order is the outer loop and the extractor's candidate order the inner
//! one, so a more preferred codec always beats an earlier candidate.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::media::FormatCandidate;

/// Protocols the transcoding pipeline cannot consume from the extractor.
const UNUSABLE_PROTOCOLS: &[&str] = &["f4m", "ism", "mhtml"];

/// Kind of elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Stream specifier letter used by ffmpeg (`a` / `v`).
    pub fn specifier(&self) -> char {
        match self {
            Self::Audio => 'a',
            Self::Video => 'v',
        }
    }

    /// The candidate's normalized codec for this kind.
    pub fn codec_of<'a>(&self, candidate: &'a FormatCandidate) -> &'a str {
        match self {
            Self::Audio => candidate.audio_codec(),
            Self::Video => candidate.video_codec(),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, duplicate-free list of acceptable codec names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecPreference(Vec<String>);

impl CodecPreference {
    pub fn new<I, S>(codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = Vec::new();
        for codec in codecs {
            let codec = codec.as_ref().trim().to_lowercase();
            if !codec.is_empty() && !names.contains(&codec) {
                names.push(codec);
            }
        }
        Self(names)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn contains(&self, codec: &str) -> bool {
        self.0.iter().any(|c| c == codec)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

fn protocol_usable(protocol: &str) -> bool {
    !UNUSABLE_PROTOCOLS.contains(&protocol)
}

/// Select the best candidate for `kind`.
///
/// With a non-empty `preferred` list the first candidate carrying the most
/// preferred available codec over a usable protocol wins. With an empty list
/// the first candidate that has any stream of `kind` wins. `None` means the
/// source has nothing acceptable; callers decide whether that is fatal.
pub fn select<'a>(
    candidates: &'a [FormatCandidate],
    kind: MediaKind,
    preferred: &CodecPreference,
) -> Option<&'a FormatCandidate> {
    if preferred.is_empty() {
        return candidates.iter().find(|c| !kind.codec_of(c).is_empty());
    }

    preferred.iter().find_map(|codec| {
        candidates.iter().find(|c| {
            let candidate_codec = kind.codec_of(c);
            !candidate_codec.is_empty()
                && candidate_codec == codec
                && protocol_usable(c.protocol())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::RawFormat;
    use rstest::rstest;

    fn candidate(id: &str, acodec: &str, vcodec: &str, tbr: f64) -> FormatCandidate {
        RawFormat {
            format_id: id.to_string(),
            protocol: "http".to_string(),
            acodec: acodec.to_string(),
            vcodec: vcodec.to_string(),
            tbr,
            ..Default::default()
        }
        .into()
    }

    fn catalog() -> Vec<FormatCandidate> {
        vec![
            candidate("1", "mp3", "h264", 1.0),
            candidate("2", "", "h264", 2.0),
            candidate("3", "aac", "", 3.0),
            candidate("4", "vorbis", "vp8", 4.0),
            candidate("5", "opus", "vp9", 5.0),
        ]
    }

    #[rstest]
    #[case(MediaKind::Audio, "mp3", "1")]
    #[case(MediaKind::Audio, "aac", "3")]
    #[case(MediaKind::Video, "h264", "1")]
    #[case(MediaKind::Audio, "vorbis", "4")]
    #[case(MediaKind::Video, "vp8", "4")]
    #[case(MediaKind::Audio, "opus", "5")]
    #[case(MediaKind::Video, "vp9", "5")]
    fn test_select_by_codec(#[case] kind: MediaKind, #[case] codec: &str, #[case] expected: &str) {
        let formats = catalog();
        let selected = select(&formats, kind, &CodecPreference::new([codec])).unwrap();
        assert_eq!(selected.format_id(), expected);
    }

    #[test]
    fn test_preference_order_beats_candidate_order() {
        let formats = catalog();
        let selected = select(
            &formats,
            MediaKind::Audio,
            &CodecPreference::new(["opus", "mp3"]),
        )
        .unwrap();
        assert_eq!(selected.format_id(), "5");
    }

    #[test]
    fn test_falls_through_preferences() {
        let formats = catalog();
        let selected = select(
            &formats,
            MediaKind::Audio,
            &CodecPreference::new(["flac", "vorbis"]),
        )
        .unwrap();
        assert_eq!(selected.format_id(), "4");
    }

    #[test]
    fn test_empty_preference_takes_first_with_kind() {
        let formats = vec![
            candidate("v", "none", "h264", 1.0),
            candidate("a", "aac", "none", 1.0),
        ];
        let none = CodecPreference::default();
        assert_eq!(
            select(&formats, MediaKind::Audio, &none).unwrap().format_id(),
            "a"
        );
        assert_eq!(
            select(&formats, MediaKind::Video, &none).unwrap().format_id(),
            "v"
        );
    }

    #[test]
    fn test_absent_kind_is_not_found() {
        let formats = vec![candidate("a", "mp3", "none", 1.0)];
        assert!(select(&formats, MediaKind::Video, &CodecPreference::default()).is_none());
        assert!(select(&formats, MediaKind::Video, &CodecPreference::new(["h264"])).is_none());
        assert!(select(&[], MediaKind::Audio, &CodecPreference::default()).is_none());
    }

    #[test]
    fn test_unusable_protocol_is_skipped() {
        let mut storyboard = RawFormat {
            format_id: "sb0".to_string(),
            protocol: "mhtml".to_string(),
            vcodec: "h264".to_string(),
            ..Default::default()
        };
        let formats = vec![
            FormatCandidate::from(storyboard.clone()),
            candidate("22", "aac", "h264", 1.0),
        ];
        let selected = select(&formats, MediaKind::Video, &CodecPreference::new(["h264"])).unwrap();
        assert_eq!(selected.format_id(), "22");

        storyboard.protocol = "https".to_string();
        let formats = vec![FormatCandidate::from(storyboard)];
        let selected = select(&formats, MediaKind::Video, &CodecPreference::new(["h264"])).unwrap();
        assert_eq!(selected.format_id(), "sb0");
    }

    #[test]
    fn test_zero_bitrate_is_selectable() {
        let formats = vec![candidate("z", "opus", "none", 0.0)];
        let selected = select(&formats, MediaKind::Audio, &CodecPreference::new(["opus"])).unwrap();
        assert_eq!(selected.format_id(), "z");
    }

    #[test]
    fn test_codec_preference_dedups_and_normalizes_case() {
        let prefs = CodecPreference::new(["OPUS", "mp3", "opus", " ", "mp3"]);
        assert_eq!(prefs.iter().collect::<Vec<_>>(), vec!["opus", "mp3"]);
        assert_eq!(prefs.first(), Some("opus"));
        assert!(prefs.contains("mp3"));
    }
}
