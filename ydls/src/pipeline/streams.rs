//! Choosing which source formats feed each output stream.

use tracing::debug;

use crate::media::{FormatCandidate, Metadata, normalize_codec};
use crate::negotiator::{CodecPreference, MediaKind, select};
use crate::profile::{CodecSpec, FormatProfile};
use crate::{Error, Result};

/// A source format chosen for one output stream of a profile.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedStream {
    pub kind: MediaKind,
    pub format: FormatCandidate,
    /// Codec the output stream ends up with.
    pub codec: CodecSpec,
    /// Source codec already matches, so the stream is passed through.
    pub copy: bool,
}

impl SelectedStream {
    pub fn format_id(&self) -> &str {
        self.format.format_id()
    }

    pub fn source_codec(&self) -> &str {
        self.kind.codec_of(&self.format)
    }
}

/// Resolve one source format per stream of `profile`.
///
/// `explicit_codecs` override the profile's preference order for the
/// streams that can produce them. When no candidate carries an acceptable
/// codec, any candidate with the right kind of stream is transcoded instead.
pub fn resolve_streams(
    metadata: &Metadata,
    profile: &FormatProfile,
    explicit_codecs: &[String],
) -> Result<Vec<SelectedStream>> {
    if profile.streams.is_empty() {
        return Err(Error::config(format!(
            "profile {} has no streams to resolve",
            profile.name
        )));
    }

    let explicit = CodecPreference::new(explicit_codecs.iter().map(|c| normalize_codec(c)));
    let mut selected = Vec::with_capacity(profile.streams.len());

    for spec in &profile.streams {
        let forced = CodecPreference::new(explicit.iter().filter(|c| spec.codec(c).is_some()));
        let preference = if forced.is_empty() {
            spec.preference()
        } else {
            forced.clone()
        };

        let format = select(&metadata.formats, spec.kind, &preference)
            .or_else(|| select(&metadata.formats, spec.kind, &CodecPreference::default()))
            .ok_or_else(|| {
                Error::unsatisfiable(format!(
                    "no {} stream found for format {}",
                    spec.kind, profile.name
                ))
            })?;

        // Forced codecs win; otherwise keep the source codec if the profile
        // can carry it and fall back to the profile's first choice.
        let source_codec = spec.kind.codec_of(format);
        let codec = match forced.first() {
            Some(name) => spec.codec(name),
            None => spec.codec(source_codec).or_else(|| spec.codecs.first()),
        }
        .cloned()
        .ok_or_else(|| {
            Error::config(format!(
                "profile {} has a {} stream without codecs",
                profile.name, spec.kind
            ))
        })?;

        let copy = source_codec == codec.name;
        debug!(
            kind = %spec.kind,
            format = %format,
            target = %codec.name,
            copy,
            "Selected source stream"
        );

        selected.push(SelectedStream {
            kind: spec.kind,
            format: format.clone(),
            codec,
            copy,
        });
    }

    Ok(selected)
}
