//! Output format profiles.
//!
//! A profile describes what the caller gets back: the container, its
//! extension and MIME type, and for each required media kind the codecs it
//! may carry in order of preference. Feed profiles carry no streams and name
//! the profile their enclosures are served with instead.

use serde::{Deserialize, Serialize};

use crate::negotiator::{CodecPreference, MediaKind};
use crate::{Error, Result};

/// A codec a profile can produce and how to ask ffmpeg for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSpec {
    /// Normalized codec name (`mp3`, `aac`, `h264`, ...).
    pub name: String,
    /// ffmpeg encoder. Empty means the codec name is the encoder name.
    #[serde(default)]
    pub encoder: String,
    /// Extra encoder flags appended after `-c:<kind> <encoder>`.
    #[serde(default)]
    pub flags: Vec<String>,
}

impl CodecSpec {
    pub fn new(name: impl Into<String>, encoder: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encoder: encoder.into(),
            flags: Vec::new(),
        }
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn encoder(&self) -> &str {
        if self.encoder.is_empty() {
            &self.name
        } else {
            &self.encoder
        }
    }
}

/// One required output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub kind: MediaKind,
    /// Codecs in order of preference. Must not be empty.
    pub codecs: Vec<CodecSpec>,
}

impl StreamSpec {
    pub fn new(kind: MediaKind, codecs: Vec<CodecSpec>) -> Self {
        Self { kind, codecs }
    }

    pub fn preference(&self) -> CodecPreference {
        CodecPreference::new(self.codecs.iter().map(|c| c.name.as_str()))
    }

    pub fn codec(&self, name: &str) -> Option<&CodecSpec> {
        self.codecs.iter().find(|c| c.name == name)
    }
}

/// Caller-facing description of a desired output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatProfile {
    pub name: String,
    /// ffmpeg muxer names; the first one is used for output.
    #[serde(default)]
    pub formats: Vec<String>,
    pub ext: String,
    pub mime_type: String,
    #[serde(default)]
    pub streams: Vec<StreamSpec>,
    /// ffmpeg flags placed right before the muxer selection.
    #[serde(default)]
    pub format_flags: Vec<String>,
    /// For feed profiles: name of the profile enclosures are downloaded with.
    #[serde(default)]
    pub enclosure: Option<String>,
}

impl FormatProfile {
    pub fn is_feed(&self) -> bool {
        self.enclosure.is_some()
    }

    pub fn muxer(&self) -> Option<&str> {
        self.formats.first().map(String::as_str)
    }

    pub fn stream(&self, kind: MediaKind) -> Option<&StreamSpec> {
        self.streams.iter().find(|s| s.kind == kind)
    }

    pub fn requires(&self, kind: MediaKind) -> bool {
        self.stream(kind).is_some()
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("profile without a name"));
        }
        if self.is_feed() {
            return Ok(());
        }
        if self.muxer().is_none() {
            return Err(Error::config(format!(
                "profile {} has no container format",
                self.name
            )));
        }
        if self.streams.is_empty() {
            return Err(Error::config(format!("profile {} has no streams", self.name)));
        }
        if let Some(stream) = self.streams.iter().find(|s| s.codecs.is_empty()) {
            return Err(Error::config(format!(
                "profile {} has a {} stream without codecs",
                self.name, stream.kind
            )));
        }
        Ok(())
    }
}

/// A validated set of profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profiles(Vec<FormatProfile>);

impl Profiles {
    pub fn new(profiles: Vec<FormatProfile>) -> Result<Self> {
        for profile in &profiles {
            profile.validate()?;
        }
        let profiles = Self(profiles);
        for profile in profiles.iter().filter(|p| p.is_feed()) {
            let enclosure = profile.enclosure.as_deref().unwrap_or_default();
            match profiles.find_by_name(enclosure) {
                Some(target) if !target.is_feed() => {}
                _ => {
                    return Err(Error::config(format!(
                        "feed profile {} references unknown enclosure profile {}",
                        profile.name, enclosure
                    )));
                }
            }
        }
        Ok(profiles)
    }

    /// Load profiles from a JSON array.
    pub fn from_json(json: &str) -> Result<Self> {
        let profiles: Vec<FormatProfile> = serde_json::from_str(json)?;
        Self::new(profiles)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&FormatProfile> {
        self.0.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormatProfile> {
        self.0.iter()
    }

    /// The profiles shipped with the crate.
    pub fn builtin() -> Self {
        let fragmented_mp4 = ["-movflags", "+frag_keyframe+empty_moov"];

        let mp3 = || CodecSpec::new("mp3", "libmp3lame").with_flags(["-q:a", "2"]);
        let aac = || CodecSpec::new("aac", "aac").with_flags(["-b:a", "192k"]);
        let opus = || CodecSpec::new("opus", "libopus").with_flags(["-b:a", "128k"]);
        let vorbis = || CodecSpec::new("vorbis", "libvorbis").with_flags(["-q:a", "5"]);
        let flac = || CodecSpec::new("flac", "flac");
        let h264 = || CodecSpec::new("h264", "libx264").with_flags(["-preset", "veryfast"]);
        let hevc = || CodecSpec::new("hevc", "libx265").with_flags(["-preset", "veryfast"]);
        let vp9 = || CodecSpec::new("vp9", "libvpx-vp9").with_flags(["-deadline", "realtime"]);
        let vp8 = || CodecSpec::new("vp8", "libvpx").with_flags(["-deadline", "realtime"]);

        let audio = |codecs| StreamSpec::new(MediaKind::Audio, codecs);
        let video = |codecs| StreamSpec::new(MediaKind::Video, codecs);

        let profile = |name: &str, muxer: &str, ext: &str, mime: &str, streams| FormatProfile {
            name: name.to_string(),
            formats: vec![muxer.to_string()],
            ext: ext.to_string(),
            mime_type: mime.to_string(),
            streams,
            format_flags: Vec::new(),
            enclosure: None,
        };

        let mut m4a = profile("m4a", "ipod", "m4a", "audio/mp4", vec![audio(vec![aac()])]);
        m4a.format_flags = fragmented_mp4.map(String::from).to_vec();
        let mut mp4 = profile(
            "mp4",
            "mp4",
            "mp4",
            "video/mp4",
            vec![audio(vec![aac(), mp3()]), video(vec![h264(), hevc()])],
        );
        mp4.format_flags = fragmented_mp4.map(String::from).to_vec();

        Self(vec![
            profile("mp3", "mp3", "mp3", "audio/mpeg", vec![audio(vec![mp3()])]),
            m4a,
            profile(
                "ogg",
                "ogg",
                "ogg",
                "audio/ogg",
                vec![audio(vec![vorbis(), opus()])],
            ),
            profile("opus", "opus", "opus", "audio/ogg", vec![audio(vec![opus()])]),
            profile("flac", "flac", "flac", "audio/flac", vec![audio(vec![flac()])]),
            mp4,
            profile(
                "mkv",
                "matroska",
                "mkv",
                "video/x-matroska",
                vec![
                    audio(vec![opus(), vorbis(), aac(), mp3(), flac()]),
                    video(vec![h264(), vp9(), vp8(), hevc()]),
                ],
            ),
            profile(
                "webm",
                "webm",
                "webm",
                "video/webm",
                vec![audio(vec![opus(), vorbis()]), video(vec![vp9(), vp8()])],
            ),
            FormatProfile {
                name: "rss".to_string(),
                formats: Vec::new(),
                ext: "xml".to_string(),
                mime_type: "text/xml".to_string(),
                streams: Vec::new(),
                format_flags: Vec::new(),
                enclosure: Some("mp3".to_string()),
            },
        ])
    }
}

impl Default for Profiles {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_are_valid() {
        let builtin = Profiles::builtin();
        let revalidated = Profiles::new(builtin.0.clone()).unwrap();
        assert_eq!(revalidated, builtin);
    }

    #[test]
    fn test_find_by_name_is_case_insensitive() {
        let profiles = Profiles::builtin();
        let mp3 = profiles.find_by_name("MP3").unwrap();
        assert_eq!(mp3.mime_type, "audio/mpeg");
        assert!(mp3.requires(MediaKind::Audio));
        assert!(!mp3.requires(MediaKind::Video));
        assert!(profiles.find_by_name("avi").is_none());
    }

    #[test]
    fn test_feed_profile() {
        let profiles = Profiles::builtin();
        let rss = profiles.find_by_name("rss").unwrap();
        assert!(rss.is_feed());
        assert_eq!(rss.enclosure.as_deref(), Some("mp3"));
        assert!(rss.muxer().is_none());
    }

    #[test]
    fn test_stream_preference_order() {
        let profiles = Profiles::builtin();
        let mkv = profiles.find_by_name("mkv").unwrap();
        let audio = mkv.stream(MediaKind::Audio).unwrap();
        assert_eq!(audio.preference().first(), Some("opus"));
        assert_eq!(audio.codec("mp3").unwrap().encoder(), "libmp3lame");
        assert!(audio.codec("h264").is_none());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {
                "name": "wav",
                "formats": ["wav"],
                "ext": "wav",
                "mime_type": "audio/wav",
                "streams": [{"kind": "audio", "codecs": [{"name": "pcm_s16le"}]}]
            },
            {"name": "podcast", "ext": "xml", "mime_type": "text/xml", "enclosure": "wav"}
        ]"#;
        let profiles = Profiles::from_json(json).unwrap();
        let wav = profiles.find_by_name("wav").unwrap();
        assert_eq!(wav.muxer(), Some("wav"));
        assert_eq!(wav.streams[0].codecs[0].encoder(), "pcm_s16le");
        assert!(profiles.find_by_name("podcast").unwrap().is_feed());
    }

    #[test]
    fn test_invalid_profiles_are_rejected() {
        let no_codecs = r#"[{"name": "x", "formats": ["x"], "ext": "x", "mime_type": "x/x",
            "streams": [{"kind": "video", "codecs": []}]}]"#;
        assert!(matches!(
            Profiles::from_json(no_codecs),
            Err(Error::Configuration(_))
        ));

        let dangling = r#"[{"name": "rss", "ext": "xml", "mime_type": "text/xml", "enclosure": "mp3"}]"#;
        assert!(matches!(
            Profiles::from_json(dangling),
            Err(Error::Configuration(_))
        ));

        assert!(matches!(Profiles::from_json("{"), Err(Error::Json(_))));
    }
}
