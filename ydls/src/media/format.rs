//! Format candidates: the downloadable variants of one source.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::codec::{codecs_from_ext, normalize_codec};

/// Treat an explicit JSON `null` the same as a missing field.
///
/// yt-dlp emits `null` for most unknown values.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Format entry exactly as reported by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    #[serde(default, deserialize_with = "null_as_default")]
    pub format_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub protocol: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ext: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub acodec: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vcodec: String,
    /// Total bitrate in kbit/s.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tbr: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub abr: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vbr: f64,
}

/// One downloadable stream variant with normalized codec and bitrate fields.
///
/// The normalized fields are derived from the raw ones on construction and
/// cannot be set from outside.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatCandidate {
    raw: RawFormat,
    norm_acodec: String,
    norm_vcodec: String,
    norm_bitrate: f64,
}

impl FormatCandidate {
    pub fn format_id(&self) -> &str {
        &self.raw.format_id
    }

    pub fn protocol(&self) -> &str {
        &self.raw.protocol
    }

    pub fn ext(&self) -> &str {
        &self.raw.ext
    }

    /// The extractor's fields as reported.
    pub fn raw(&self) -> &RawFormat {
        &self.raw
    }

    /// Canonical audio codec, empty when the variant has no audio.
    pub fn audio_codec(&self) -> &str {
        &self.norm_acodec
    }

    /// Canonical video codec, empty when the variant has no video.
    pub fn video_codec(&self) -> &str {
        &self.norm_vcodec
    }

    /// Total bitrate, or audio + video bitrate when the total is unknown.
    pub fn bitrate(&self) -> f64 {
        self.norm_bitrate
    }
}

impl From<RawFormat> for FormatCandidate {
    fn from(raw: RawFormat) -> Self {
        let (ext_acodec, ext_vcodec) = codecs_from_ext(&raw.ext);

        let norm_acodec = if raw.acodec.is_empty() {
            ext_acodec.to_string()
        } else {
            normalize_codec(&raw.acodec)
        };
        let norm_vcodec = if raw.vcodec.is_empty() {
            ext_vcodec.to_string()
        } else {
            normalize_codec(&raw.vcodec)
        };
        let norm_bitrate = if raw.tbr != 0.0 {
            raw.tbr
        } else {
            raw.abr + raw.vbr
        };

        Self {
            raw,
            norm_acodec,
            norm_vcodec,
            norm_bitrate,
        }
    }
}

impl fmt::Display for FormatCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.raw.format_id,
            self.raw.protocol,
            self.raw.ext,
            self.norm_acodec,
            self.norm_vcodec,
            self.norm_bitrate
        )
    }
}

/// Stable sort, highest normalized bitrate first.
pub fn sort_by_bitrate(candidates: &mut [FormatCandidate]) {
    candidates.sort_by(|a, b| b.bitrate().total_cmp(&a.bitrate()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, ext: &str, acodec: &str, vcodec: &str, tbr: f64) -> FormatCandidate {
        RawFormat {
            format_id: id.to_string(),
            protocol: "https".to_string(),
            ext: ext.to_string(),
            acodec: acodec.to_string(),
            vcodec: vcodec.to_string(),
            tbr,
            ..Default::default()
        }
        .into()
    }

    #[test]
    fn test_codecs_are_normalized() {
        let f = candidate("22", "mp4", "mp4a.40.2", "avc1.64001F", 1000.0);
        assert_eq!(f.audio_codec(), "aac");
        assert_eq!(f.video_codec(), "h264");
    }

    #[test]
    fn test_none_codec_means_absent() {
        let f = candidate("140", "m4a", "mp4a.40.2", "none", 128.0);
        assert_eq!(f.audio_codec(), "aac");
        assert_eq!(f.video_codec(), "");
    }

    #[test]
    fn test_empty_codec_falls_back_to_ext() {
        let f = candidate("http_mp3", "mp3", "", "", 0.0);
        assert_eq!(f.audio_codec(), "mp3");
        assert_eq!(f.video_codec(), "");

        let f = candidate("0", "flv", "", "", 0.0);
        assert_eq!(f.audio_codec(), "aac");
        assert_eq!(f.video_codec(), "h264");
    }

    #[test]
    fn test_ext_fallback_only_applies_to_empty_field() {
        let f = candidate("1", "mp4", "opus", "", 0.0);
        assert_eq!(f.audio_codec(), "opus");
        assert_eq!(f.video_codec(), "h264");
    }

    #[test]
    fn test_bitrate_falls_back_to_sum() {
        let f: FormatCandidate = RawFormat {
            format_id: "1".to_string(),
            abr: 128.0,
            vbr: 900.0,
            ..Default::default()
        }
        .into();
        assert_eq!(f.bitrate(), 1028.0);

        let f: FormatCandidate = RawFormat {
            tbr: 500.0,
            abr: 128.0,
            ..Default::default()
        }
        .into();
        assert_eq!(f.bitrate(), 500.0);

        let f: FormatCandidate = RawFormat::default().into();
        assert_eq!(f.bitrate(), 0.0);
    }

    #[test]
    fn test_sort_by_bitrate_is_stable_descending() {
        let mut formats = vec![
            candidate("a", "mp4", "aac", "h264", 1.0),
            candidate("b", "mp4", "aac", "h264", 3.0),
            candidate("c", "mp4", "aac", "h264", 1.0),
            candidate("d", "mp4", "aac", "h264", 2.0),
        ];
        sort_by_bitrate(&mut formats);
        let ids: Vec<&str> = formats.iter().map(|f| f.format_id()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_display() {
        let f = candidate("18", "mp4", "mp4a.40.2", "avc1.42001E", 500.5);
        assert_eq!(f.to_string(), "18:https:mp4:aac:h264:500.5");
    }

    #[test]
    fn test_raw_format_tolerates_nulls() {
        let raw: RawFormat =
            serde_json::from_str(r#"{"format_id":"251","acodec":"opus","vcodec":null,"tbr":null}"#)
                .unwrap();
        assert_eq!(raw.vcodec, "");
        assert_eq!(raw.tbr, 0.0);
    }
}
