//! Filename sanitization for worker output files and download names.
//!
//! Media titles arrive from arbitrary platforms and frequently contain
//! characters that are illegal in Windows or Unix filenames. Sanitization
//! replaces only those, keeping spaces and Unicode (Arabic, CJK, ...) intact
//! so the user-facing filename still resembles the title.

/// Characters that are illegal in filenames on at least one platform.
const ILLEGAL_CHARS: &[char] = &['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

/// Sanitize a media title for use as a filename.
///
/// Replaces illegal characters and control characters with underscores,
/// trims leading/trailing spaces and dots (a Windows restriction), and
/// falls back to `"video"` when nothing usable remains.
pub fn sanitize_title(input: &str) -> String {
    let replaced: String = input
        .trim()
        .chars()
        .map(|c| {
            if c.is_control() || ILLEGAL_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "video".to_string();
    }

    trimmed.to_string()
}
