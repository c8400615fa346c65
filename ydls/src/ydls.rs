//! The engine facade.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::config::YdlsConfig;
use crate::feed::build_feed;
use crate::pipeline::{DownloadResult, Pipeline, resolve_streams};
use crate::profile::Profiles;
use crate::request::DownloadRequest;
use crate::{Error, Result};

/// Download engine: metadata fetch, stream selection, pipeline start.
#[derive(Debug, Clone)]
pub struct Ydls {
    config: YdlsConfig,
    profiles: Profiles,
    pipeline: Pipeline,
}

impl Ydls {
    pub fn new(config: YdlsConfig, profiles: Profiles) -> Self {
        let pipeline = Pipeline::new(&config);
        Self {
            config,
            profiles,
            pipeline,
        }
    }

    /// Built-in profiles with tool paths from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(YdlsConfig::from_env()?, Profiles::builtin()))
    }

    pub fn config(&self) -> &YdlsConfig {
        &self.config
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    /// Versions of the extractor and transcoder, when they can be run.
    pub async fn tool_versions(&self) -> (Option<String>, Option<String>) {
        tokio::join!(
            self.pipeline.extractor().version(),
            self.pipeline.transcoder().version()
        )
    }

    /// Serve a download link produced by [`DownloadRequest::to_url`].
    pub async fn download_link(
        &self,
        link: &Url,
        cancel: CancellationToken,
    ) -> Result<DownloadResult> {
        let request = DownloadRequest::from_url(link, &self.profiles)?;
        self.download(&request, cancel).await
    }

    /// Start a download.
    ///
    /// Errors before the pipeline starts (extraction, stream selection,
    /// spawning) are returned here; later failures arrive through the
    /// result's completion handle.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        cancel: CancellationToken,
    ) -> Result<DownloadResult> {
        info!(
            url = %request.url,
            format = %request.profile.name,
            codecs = ?request.codecs,
            time_range = ?request.time_range.map(|r| r.to_string()),
            items = request.items,
            "Download requested"
        );

        if request.profile.is_feed() {
            return self.download_feed(request, cancel).await;
        }

        let metadata = self
            .pipeline
            .extractor()
            .fetch_metadata(&request.url, request.items, &cancel)
            .await?;

        let streams = resolve_streams(&metadata, &request.profile, &request.codecs)?;
        for stream in &streams {
            debug!(
                kind = %stream.kind,
                format_id = stream.format_id(),
                source = stream.source_codec(),
                target = %stream.codec.name,
                copy = stream.copy,
                "Stream resolved"
            );
        }

        self.pipeline
            .run(
                &metadata,
                &request.profile,
                &streams,
                request.time_range.as_ref(),
                &cancel,
            )
            .await
    }

    async fn download_feed(
        &self,
        request: &DownloadRequest,
        cancel: CancellationToken,
    ) -> Result<DownloadResult> {
        let enclosure_name = request.profile.enclosure.as_deref().unwrap_or_default();
        let enclosure = self.profiles.find_by_name(enclosure_name).ok_or_else(|| {
            Error::config(format!("unknown enclosure format {}", enclosure_name))
        })?;
        let base_url = request.require_base_url()?;

        let metadata = self
            .pipeline
            .extractor()
            .fetch_metadata(&request.url, request.items, &cancel)
            .await?;
        if !metadata.is_playlist() {
            return Err(Error::unsatisfiable(format!(
                "{} is not a playlist",
                request.url
            )));
        }

        let rss = build_feed(
            &metadata,
            enclosure,
            base_url,
            request.items,
            self.config.link_icon.as_deref(),
        )?;
        let xml = rss.to_xml()?;
        info!(
            url = %request.url,
            items = rss.channel.items.len(),
            "Feed generated"
        );

        Ok(DownloadResult::document(
            Bytes::from(xml),
            request.profile.mime_type.clone(),
            cancel,
        ))
    }
}

impl Default for Ydls {
    fn default() -> Self {
        Self::new(YdlsConfig::default(), Profiles::builtin())
    }
}
