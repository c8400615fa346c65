//! Codec name normalization.
//!
//! Extractors report codecs as vendor tags with profile suffixes
//! (`avc1.640028`, `mp4a.40.2`). Selection compares canonical lowercase
//! names, so every raw codec string goes through [`normalize_codec`] once
//! at parse time.

/// Vendor tag aliases. `none` means the stream kind is absent.
const CODEC_ALIASES: &[(&str, &str)] = &[
    ("none", ""),
    ("avc1", "h264"),
    ("mp4a", "aac"),
    ("mp4v", "h264"),
];

/// Normalize a raw codec string to its canonical name.
///
/// `"  AVC1.640028 "` becomes `"h264"`, `"none"` becomes `""`.
/// The function is idempotent.
pub fn normalize_codec(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let tag = lowered.split('.').next().unwrap_or_default();

    CODEC_ALIASES
        .iter()
        .find(|(alias, _)| *alias == tag)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| tag.to_string())
}

/// Guess `(audio, video)` codecs from a container extension.
///
/// Used only when the extractor left the codec field empty.
pub fn codecs_from_ext(ext: &str) -> (&'static str, &'static str) {
    match ext.to_lowercase().as_str() {
        "mp3" => ("mp3", ""),
        "mp4" | "flv" => ("aac", "h264"),
        _ => ("", ""),
    }
}
