//! Parsed extractor metadata.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::value::RawValue;

use super::format::{FormatCandidate, RawFormat, null_as_default};
use crate::{Error, Result};

/// Type tags the extractor uses for containers of other entries.
const PLAYLIST_TYPES: &[&str] = &["playlist", "multi_video"];

#[derive(Debug, Default, Deserialize)]
struct RawInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    id: String,
    #[serde(rename = "_type", default, deserialize_with = "null_as_default")]
    item_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    artist: String,
    #[serde(default, deserialize_with = "null_as_default")]
    uploader: String,
    #[serde(default, deserialize_with = "null_as_default")]
    creator: String,
    #[serde(default, deserialize_with = "null_as_default")]
    description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    duration: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    thumbnail: String,
    #[serde(default, deserialize_with = "null_as_default")]
    webpage_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    upload_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    ext: String,
    #[serde(default, deserialize_with = "null_as_default")]
    formats: Vec<RawFormat>,
    #[serde(default)]
    entries: Option<Vec<Option<Box<RawValue>>>>,
}

/// Parsed representation of one media source or playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Extractor identifier of the item.
    pub id: String,
    /// Extractor type tag (`video`, `url`, `playlist`, ...). Empty for plain items.
    pub item_type: String,
    pub title: String,
    pub artist: String,
    pub uploader: String,
    pub creator: String,
    pub description: String,
    /// Duration in seconds, 0 when unknown.
    pub duration: f64,
    /// Thumbnail URL.
    pub thumbnail: String,
    /// Thumbnail image written next to the metadata file, if any.
    pub thumbnail_bytes: Option<Bytes>,
    pub webpage_url: String,
    /// Upload date as an 8-digit `YYYYMMDD` token.
    pub upload_date: String,
    pub ext: String,
    pub formats: Vec<FormatCandidate>,
    /// Playlist entries, `None` for leaf items.
    pub entries: Option<Vec<Metadata>>,
    raw: Bytes,
}

impl Metadata {
    /// Parse extractor JSON output.
    ///
    /// The input bytes are kept verbatim and can be handed back to the
    /// extractor later to download without fetching the page again.
    pub fn parse(raw: impl Into<Bytes>) -> Result<Self> {
        let raw: Bytes = raw.into();
        let info: RawInfo = serde_json::from_slice(&raw)
            .map_err(|e| Error::parse(format!("invalid metadata JSON: {}", e)))?;

        let entries = match info.entries {
            Some(entries) => Some(
                entries
                    .into_iter()
                    .flatten()
                    .map(|entry| Self::parse(Bytes::copy_from_slice(entry.get().as_bytes())))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        Ok(Self {
            id: info.id,
            item_type: info.item_type,
            title: info.title,
            artist: info.artist,
            uploader: info.uploader,
            creator: info.creator,
            description: info.description,
            duration: info.duration,
            thumbnail: info.thumbnail,
            thumbnail_bytes: None,
            webpage_url: info.webpage_url,
            upload_date: info.upload_date,
            ext: info.ext,
            formats: info.formats.into_iter().map(FormatCandidate::from).collect(),
            entries,
            raw,
        })
    }

    /// The exact bytes this metadata was parsed from.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// True for playlist-like containers whose items live in `entries`.
    pub fn is_playlist(&self) -> bool {
        PLAYLIST_TYPES.contains(&self.item_type.as_str())
    }

    /// Best available performer name.
    pub fn artist_name(&self) -> &str {
        first_non_empty(&[&self.artist, &self.creator, &self.uploader].map(String::as_str))
    }

    /// Title, falling back to the performer name.
    pub fn display_title(&self) -> &str {
        first_non_empty(&[self.title.as_str(), self.artist_name()])
    }
}

/// First non-empty string, or `""`.
pub fn first_non_empty<'a>(candidates: &[&'a str]) -> &'a str {
    candidates
        .iter()
        .copied()
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}
