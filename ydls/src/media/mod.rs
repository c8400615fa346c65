//! Format catalog: extractor metadata and its normalized format candidates.

mod codec;
mod format;
mod metadata;

pub use codec::{codecs_from_ext, normalize_codec};
pub use format::{FormatCandidate, RawFormat, sort_by_bitrate};
pub use metadata::{Metadata, first_non_empty};
