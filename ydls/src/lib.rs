//! Streaming media downloads through yt-dlp and ffmpeg.
//!
//! A [`Ydls`] engine takes a [`DownloadRequest`] (source URL, output
//! profile, optional codecs and trim range), asks the extractor for
//! metadata, picks source formats, and pipes the extractor's output through
//! the transcoder. The result is readable while it is produced. Playlists
//! requested with a feed profile become RSS podcast feeds instead.

pub mod config;
pub mod error;
pub mod extractor;
pub mod feed;
pub mod logging;
pub mod media;
pub mod negotiator;
pub mod pipeline;
pub mod process;
pub mod profile;
pub mod request;
pub mod scratch;
pub mod timerange;
pub mod transcoder;
pub mod utils;
mod ydls;

pub use config::{ToolConfig, YdlsConfig};
pub use error::{Error, Result};
pub use pipeline::{Completion, DownloadResult, MediaStream};
pub use profile::{FormatProfile, Profiles};
pub use request::DownloadRequest;
pub use timerange::TimeRange;
pub use ydls::Ydls;
