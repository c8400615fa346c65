//! Filename sanitization for suggested download names.
//!
//! Titles come straight from the extractor, so anything that is not valid
//! in a filename on Windows, Linux or macOS is replaced before it is
//! offered to a client. Unicode text such as CJK titles is preserved.

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Fallback stem for titles that sanitize to nothing.
const UNNAMED: &str = "media";

/// Sanitize a title for use as a filename stem.
///
/// Runs of invalid or control characters collapse to a single `_`,
/// leading/trailing spaces and dots are trimmed and reserved Windows device
/// names are prefixed.
///
/// ```
/// use ydls::utils::filename::sanitize_filename;
///
/// assert_eq!(sanitize_filename("AC/DC - Thunderstruck"), "AC_DC - Thunderstruck");
/// assert_eq!(sanitize_filename(""), "media");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return UNNAMED.to_string();
    }

    let upper = trimmed.to_uppercase();
    let stem = upper.split('.').next().unwrap_or_default();
    if WINDOWS_RESERVED_NAMES.contains(&stem) {
        return format!("_{}", trimmed);
    }

    trimmed.to_string()
}

/// Build `<sanitized title>.<ext>`.
pub fn media_filename(title: &str, ext: &str) -> String {
    format!("{}.{}", sanitize_filename(title), ext)
}
