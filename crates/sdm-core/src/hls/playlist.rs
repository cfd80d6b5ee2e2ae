//! Line-wise HLS playlist parser.
//!
//! Accepts the dialect this tool actually meets in the wild: `#EXTM3U`,
//! `#EXT-X-STREAM-INF` variants with at least `BANDWIDTH`, `#EXTINF` segment
//! markers, and bare segment URIs. Encrypted or fragmented-init playlists
//! (`#EXT-X-KEY`, `#EXT-X-MAP`) are rejected; all other tags are ignored.

use url::Url;

use super::HlsError;

/// One variant entry of a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Absolute URI, resolved against the manifest URL.
    pub uri: String,
    pub bandwidth: u64,
    pub resolution: Option<String>,
}

/// A parsed playlist: either a master listing variants, or a media playlist
/// listing segment URIs in playback order (already absolute).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playlist {
    Master(Vec<Variant>),
    Media(Vec<String>),
}

/// Parse `text` fetched from `base`. Lines are trimmed; blank lines ignored.
/// The first non-blank line must begin with `#EXTM3U`.
pub fn parse(text: &str, base: &Url) -> Result<Playlist, HlsError> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if !lines.first().is_some_and(|l| l.starts_with("#EXTM3U")) {
        return Err(HlsError::InvalidPlaylist);
    }

    let mut variants: Vec<Variant> = Vec::new();
    let mut segments: Vec<String> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("#EXT-X-KEY") {
            return Err(HlsError::Unsupported("#EXT-X-KEY"));
        }
        if line.starts_with("#EXT-X-MAP") {
            return Err(HlsError::Unsupported("#EXT-X-MAP"));
        }
        if line.starts_with("#EXT-X-STREAM-INF") {
            let attrs = parse_attribute_list(line.split_once(':').map_or("", |(_, v)| v));
            let bandwidth = attrs
                .iter()
                .find(|(k, _)| k == "BANDWIDTH")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(0);
            let resolution = attrs
                .iter()
                .find(|(k, _)| k == "RESOLUTION")
                .map(|(_, v)| v.clone());
            // The variant URI is the next non-comment line.
            let mut j = i + 1;
            while j < lines.len() && lines[j].starts_with('#') {
                j += 1;
            }
            if j < lines.len() {
                variants.push(Variant {
                    uri: resolve(base, lines[j])?,
                    bandwidth,
                    resolution,
                });
            }
            i = j + 1;
            continue;
        }
        if line.starts_with("#EXTINF") {
            if i + 1 < lines.len() && !lines[i + 1].starts_with('#') {
                segments.push(resolve(base, lines[i + 1])?);
                i += 2;
                continue;
            }
            i += 1;
            continue;
        }
        if !line.starts_with('#') {
            // Some playlists list segment URIs without #EXTINF markers.
            segments.push(resolve(base, line)?);
        }
        i += 1;
    }

    if !variants.is_empty() {
        return Ok(Playlist::Master(variants));
    }
    if segments.is_empty() {
        return Err(HlsError::NoSegments);
    }
    Ok(Playlist::Media(segments))
}

/// Pick the variant with the greatest bandwidth; ties keep the first listed.
pub fn best_variant(variants: &[Variant]) -> Option<&Variant> {
    let mut best: Option<&Variant> = None;
    for v in variants {
        match best {
            Some(b) if v.bandwidth <= b.bandwidth => {}
            _ => best = Some(v),
        }
    }
    best
}

fn resolve(base: &Url, uri: &str) -> Result<String, HlsError> {
    base.join(uri)
        .map(|u| u.to_string())
        .map_err(|_| HlsError::BadUri(uri.to_string()))
}

/// Split a `KEY=VALUE,KEY="quoted,value"` attribute list, honouring quotes.
fn parse_attribute_list(s: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_string();
        let after = &rest[eq + 1..];
        let (value, remaining) = if let Some(stripped) = after.strip_prefix('"') {
            match stripped.find('"') {
                Some(close) => {
                    let value = &stripped[..close];
                    let rem = stripped[close + 1..].trim_start_matches(',');
                    (value.to_string(), rem)
                }
                None => (stripped.to_string(), ""),
            }
        } else {
            match after.find(',') {
                Some(comma) => (after[..comma].trim().to_string(), &after[comma + 1..]),
                None => (after.trim().to_string(), ""),
            }
        };
        if !key.is_empty() {
            out.push((key, value));
        }
        rest = remaining;
    }
    out
}
