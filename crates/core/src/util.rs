use url::{Url, form_urlencoded};

/// Path of the download proxy for an upstream URL. The credential never appears in it.
pub fn download_path(url: &str, name: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("url", url)
        .append_pair("name", name)
        .finish();
    format!("/api/download?{query}")
}

/// Last non-empty path segment of a URL, used as a fallback file name.
pub fn filename_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.path_segments()?.filter(|s| !s.is_empty()).next_back().map(|s| s.to_string())
}

/// Whether `name` can be a GitHub repository name. Only ASCII letters, digits, `.`, `-`
/// and `_` are accepted, so the name is a single URL path segment.
pub fn is_valid_repo_name(name: &str) -> bool {
    is_valid_segment(name) && name.len() <= 100
}

/// Whether `reference` is a commit SHA or a branch or tag name that is safe to put in a
/// request path. Slash-separated segments follow the repository name rules.
pub fn is_valid_ref(reference: &str) -> bool {
    reference.len() <= 255 && reference.split('/').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
}

/// First seven characters of a commit SHA.
pub fn short_sha(sha: &str) -> &str { sha.get(..7).unwrap_or(sha) }

/// Format a size in bytes to a human-readable string.
/// Uses SI (kilo = 1000) units, formatted to two decimal places.
pub fn size(value: u64) -> String {
    let units = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
    let mut value = value as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < units.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.2} {}", value, units[unit])
}
