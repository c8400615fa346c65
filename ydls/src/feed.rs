//! RSS 2.0 podcast feeds synthesized from playlist metadata.
//!
//! Every playlist entry becomes an item whose enclosure is a download link
//! for the entry in the feed's enclosure profile, so podcast clients fetch
//! transcoded media through the same engine.

use chrono::NaiveDate;
use serde::Serialize;
use url::Url;

use crate::media::{Metadata, first_non_empty};
use crate::profile::FormatProfile;
use crate::request::DownloadRequest;
use crate::{Error, Result};

pub const RSS_VERSION: &str = "2.0";
pub const ITUNES_NAMESPACE: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 +0000`.
const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename = "rss")]
pub struct Rss {
    #[serde(rename = "@version")]
    pub version: String,
    #[serde(rename = "@xmlns:itunes")]
    pub xmlns_itunes: String,
    pub channel: Channel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub title: String,
    pub description: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    #[serde(rename = "itunes:image", skip_serializing_if = "Option::is_none")]
    pub itunes_image: Option<ItunesImage>,
    #[serde(rename = "item")]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    pub url: String,
    pub title: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItunesImage {
    #[serde(rename = "@href")]
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub title: String,
    pub link: String,
    pub description: String,
    pub guid: String,
    #[serde(rename = "pubDate", skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(rename = "itunes:author", skip_serializing_if = "Option::is_none")]
    pub itunes_author: Option<String>,
    #[serde(rename = "itunes:image", skip_serializing_if = "Option::is_none")]
    pub itunes_image: Option<ItunesImage>,
    pub enclosure: Enclosure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enclosure {
    #[serde(rename = "@url")]
    pub url: String,
    #[serde(rename = "@type")]
    pub mime_type: String,
}

impl Rss {
    /// Render the document with an XML declaration.
    pub fn to_xml(&self) -> Result<String> {
        let mut body = String::new();
        let mut serializer = quick_xml::se::Serializer::new(&mut body);
        serializer.indent(' ', 2);
        self.serialize(serializer).map_err(|e| Error::Xml(e.to_string()))?;
        Ok(format!("{}\n{}\n", XML_DECLARATION, body))
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// `YYYYMMDD` upload date as an RSS publish date. Anything else is `None`.
pub fn format_pub_date(upload_date: &str) -> Option<String> {
    if upload_date.len() != 8 || !upload_date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = upload_date[0..4].parse().ok()?;
    let month = upload_date[4..6].parse().ok()?;
    let day = upload_date[6..8].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(
        date.and_hms_opt(0, 0, 0)?
            .and_utc()
            .format(PUB_DATE_FORMAT)
            .to_string(),
    )
}

/// Resolve `path` relative to `base` as a path only. `?` and `#` inside it
/// are escaped rather than starting a query or fragment.
fn resolve_path(base: &Url, path: &str) -> Result<Url> {
    let mut resolved = base.join("./")?;
    let full_path = format!("{}{}", resolved.path(), path);
    resolved.set_path(&full_path);
    resolved.set_query(None);
    resolved.set_fragment(None);
    Ok(resolved)
}

/// Build a feed for `playlist`.
///
/// `item_limit > 0` caps the number of items emitted. `link_icon` is used
/// as channel image when the playlist has no thumbnail.
pub fn build_feed(
    playlist: &Metadata,
    enclosure_profile: &FormatProfile,
    base_url: &Url,
    item_limit: usize,
    link_icon: Option<&str>,
) -> Result<Rss> {
    let feed_url = resolve_path(
        base_url,
        &format!("{}/{}", enclosure_profile.name, playlist.webpage_url),
    )?;
    let media_url = resolve_path(base_url, &format!("media.{}", enclosure_profile.ext))?;

    let thumbnail = first_non_empty(&[
        playlist.thumbnail.as_str(),
        link_icon.unwrap_or_default(),
    ]);
    let image = non_empty(thumbnail).map(|url| Image {
        url,
        title: playlist.title.clone(),
        link: playlist.webpage_url.clone(),
    });
    let itunes_image = non_empty(thumbnail).map(|href| ItunesImage { href });

    let mut items = Vec::new();
    for entry in playlist.entries.iter().flatten() {
        if item_limit > 0 && items.len() >= item_limit {
            break;
        }
        if entry.is_playlist() {
            continue;
        }

        let mut guid = feed_url.clone();
        guid.set_fragment(Some(&entry.id));

        let enclosure_url = DownloadRequest::new(&entry.webpage_url, enclosure_profile.clone())
            .with_base_url(media_url.clone())
            .to_url()?;

        items.push(Item {
            title: entry.title.clone(),
            link: entry.webpage_url.clone(),
            description: entry.description.clone(),
            guid: guid.to_string(),
            pub_date: format_pub_date(&entry.upload_date),
            itunes_author: non_empty(entry.artist_name()),
            itunes_image: non_empty(&entry.thumbnail).map(|href| ItunesImage { href }),
            enclosure: Enclosure {
                url: enclosure_url.to_string(),
                mime_type: enclosure_profile.mime_type.clone(),
            },
        });
    }

    Ok(Rss {
        version: RSS_VERSION.to_string(),
        xmlns_itunes: ITUNES_NAMESPACE.to_string(),
        channel: Channel {
            title: playlist.display_title().to_string(),
            description: playlist.description.clone(),
            link: playlist.webpage_url.clone(),
            image,
            itunes_image,
            items,
        },
    })
}
