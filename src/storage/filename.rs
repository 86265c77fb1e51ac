//! Filename sanitizing
//!
//! Turns a user-supplied page name into something safe to join onto the pages
//! directory: only the last path segment survives and the result always carries
//! an `.htm`/`.html` extension.

const DEFAULT_EXTENSION: &str = ".html";

/// Whether `name` carries a page extension (`.htm` or `.html`, case-sensitive)
pub fn is_page_name(name: &str) -> bool {
    name.ends_with(".html") || name.ends_with(".htm")
}

/// Sanitize a raw page name
///
/// Returns `None` for an absent or empty name and for any name containing a NUL
/// byte. Otherwise the directory part is dropped and `.html` is appended unless
/// the name already ends in `.htm`/`.html`.
pub fn sanitize_filename(raw: Option<&str>) -> Option<String> {
    let raw = raw.filter(|s| !s.is_empty())?;
    if raw.contains('\0') {
        return None;
    }

    let trimmed = raw.trim_end_matches(is_separator);
    let base = trimmed.rsplit(is_separator).next().unwrap_or(trimmed);

    let mut name = base.to_string();
    if !is_page_name(&name) {
        name.push_str(DEFAULT_EXTENSION);
    }
    Some(name)
}

const fn is_separator(c: char) -> bool {
    matches!(c, '/' | '\\')
}
