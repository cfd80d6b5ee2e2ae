//! Filename extraction from URL path.

/// Extracts the last path segment from a URL, percent-decoded, for use as a
/// filename hint.
///
/// Returns `None` if the URL cannot be parsed or the path is empty/root.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let path = parsed.path();
    let segment = path.split('/').filter(|s| !s.is_empty()).next_back()?;
    if segment == "." || segment == ".." {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(decoded)
}
