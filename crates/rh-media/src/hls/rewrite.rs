//! Rewriting relative URIs in stored playlists.
//!
//! Playlists are written to disk with URIs relative to their own directory.
//! When served, each relative URI is rooted under the directory of the
//! request path (including any reverse-proxy prefix) and given the request's
//! query string, so sibling requests resolve behind proxies and keep their
//! query parameters.

/// Directory of `request_path`, prefixed with `forwarded_prefix`.
///
/// `("/api/media/1/hls/master.m3u8", Some("/tv"))` gives
/// `"/tv/api/media/1/hls"`.
pub fn playlist_base(request_path: &str, forwarded_prefix: Option<&str>) -> String {
    let dir = match request_path.rfind('/') {
        Some(i) => &request_path[..i],
        None => "",
    };
    let prefix = forwarded_prefix
        .map(|p| p.trim().trim_end_matches('/'))
        .filter(|p| !p.is_empty());
    match prefix {
        Some(p) if p.starts_with('/') => format!("{p}{dir}"),
        Some(p) => format!("/{p}{dir}"),
        None => dir.to_string(),
    }
}

fn is_absolute(uri: &str) -> bool {
    uri.starts_with('/') || uri.contains("://") || uri.starts_with("data:")
}

fn rewrite_uri(uri: &str, base: &str, query: Option<&str>) -> String {
    if uri.is_empty() || is_absolute(uri) {
        return uri.to_string();
    }
    let mut out = format!("{}/{}", base.trim_end_matches('/'), uri);
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        out.push(if uri.contains('?') { '&' } else { '?' });
        out.push_str(q);
    }
    out
}

/// Rewrite the `URI="..."` attribute of a tag line, if present.
fn rewrite_tag(line: &str, base: &str, query: Option<&str>) -> String {
    const ATTR: &str = "URI=\"";
    let Some(start) = line.find(ATTR).map(|i| i + ATTR.len()) else {
        return line.to_string();
    };
    let Some(len) = line[start..].find('"') else {
        return line.to_string();
    };
    let end = start + len;
    format!(
        "{}{}{}",
        &line[..start],
        rewrite_uri(&line[start..end], base, query),
        &line[end..]
    )
}

/// Root every relative URI in `playlist` under `base`, appending `query`.
///
/// Plain URI lines and the `URI` attribute of `EXT-X-MEDIA` and `EXT-X-MAP`
/// tags are rewritten. Absolute URIs, rooted paths, comments and other tags
/// are left alone.
pub fn rewrite_playlist(playlist: &str, base: &str, query: Option<&str>) -> String {
    let mut out = String::with_capacity(playlist.len() + 64);
    for line in playlist.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("#EXT-X-MEDIA:") || trimmed.starts_with("#EXT-X-MAP:") {
            out.push_str(&rewrite_tag(trimmed, base, query));
        } else if trimmed.is_empty() || trimmed.starts_with('#') {
            out.push_str(line);
        } else {
            out.push_str(&rewrite_uri(trimmed, base, query));
        }
        out.push('\n');
    }
    out
}
