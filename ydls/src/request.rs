//! Download requests and the download links that encode them.
//!
//! A download link is a base URL whose query carries the request:
//! `<base>?format=<profile>&url=<source>[&codec=..][&items=N][&time=range]`.
//! The same construction is used for direct links and for feed enclosures.

use url::Url;

use crate::profile::{FormatProfile, Profiles};
use crate::timerange::TimeRange;
use crate::{Error, Result};

/// Everything needed to serve one download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    /// Source page URL handed to the extractor.
    pub url: String,
    pub profile: FormatProfile,
    /// Explicit codecs overriding the profile's preference order.
    pub codecs: Vec<String>,
    pub time_range: Option<TimeRange>,
    /// Maximum playlist items, 0 for no limit.
    pub items: usize,
    /// Base for generated links (feeds and enclosures).
    pub base_url: Option<Url>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, profile: FormatProfile) -> Self {
        Self {
            url: url.into(),
            profile,
            codecs: Vec::new(),
            time_range: None,
            items: 0,
            base_url: None,
        }
    }

    pub fn with_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codecs = codecs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }

    pub fn with_items(mut self, items: usize) -> Self {
        self.items = items;
        self
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Base URL or a configuration error when none was given.
    pub fn require_base_url(&self) -> Result<&Url> {
        self.base_url
            .as_ref()
            .ok_or_else(|| Error::config("a base URL is required to build links"))
    }

    /// Encode this request as a download link relative to its base URL.
    pub fn to_url(&self) -> Result<Url> {
        let mut link = self.require_base_url()?.clone();
        link.set_query(None);
        link.set_fragment(None);

        {
            let mut query = link.query_pairs_mut();
            query
                .append_pair("format", &self.profile.name)
                .append_pair("url", &self.url);
            for codec in &self.codecs {
                query.append_pair("codec", codec);
            }
            if self.items > 0 {
                query.append_pair("items", &self.items.to_string());
            }
            if let Some(time_range) = &self.time_range {
                query.append_pair("time", &time_range.to_string());
            }
        }

        Ok(link)
    }

    /// Decode a download link produced by [`DownloadRequest::to_url`].
    pub fn from_url(link: &Url, profiles: &Profiles) -> Result<Self> {
        let mut format = None;
        let mut url = None;
        let mut codecs = Vec::new();
        let mut items = 0;
        let mut time_range = None;

        for (key, value) in link.query_pairs() {
            match key.as_ref() {
                "format" => format = Some(value.into_owned()),
                "url" => url = Some(value.into_owned()),
                "codec" => codecs.push(value.into_owned()),
                "items" => {
                    items = value
                        .parse()
                        .map_err(|_| Error::config(format!("invalid items value {:?}", value)))?
                }
                "time" => time_range = Some(value.parse::<TimeRange>()?),
                _ => {}
            }
        }

        let format = format.ok_or_else(|| Error::config("download link has no format"))?;
        let profile = profiles
            .find_by_name(&format)
            .ok_or_else(|| Error::config(format!("unknown format {}", format)))?
            .clone();
        let url = url.ok_or_else(|| Error::config("download link has no url"))?;

        let mut base_url = link.clone();
        base_url.set_query(None);
        base_url.set_fragment(None);

        Ok(Self {
            url,
            profile,
            codecs,
            time_range,
            items,
            base_url: Some(base_url),
        })
    }
}
