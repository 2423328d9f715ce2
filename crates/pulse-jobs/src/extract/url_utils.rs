//! URL normalization and domain comparison.

use url::Url;

/// Query keys dropped by [`normalize_url`] (matched case-insensitively).
const TRACKING_KEYS: &[&str] = &["ref", "source", "campaign"];

fn is_tracking_key(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with("utm_") || TRACKING_KEYS.contains(&key.as_str())
}

/// Canonical form of a URL for de-duplicating discovered sources.
///
/// Strips trailing slashes from the path, the fragment, and tracking query
/// parameters (`utm_*`, `ref`, `source`, `campaign`). An empty query is
/// dropped entirely. Returns `None` when `raw` is not an absolute URL.
/// Applying it twice yields the same result as applying it once.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw.trim()).ok()?;

    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_key(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut out = parsed.to_string();
    // Hierarchical URLs always serialize a root path of "/".
    if parsed.path() == "/" && parsed.query().is_none() {
        out.truncate(out.trim_end_matches('/').len());
    }
    Some(out)
}

/// Registrable-looking root of the host: the last two labels of the
/// lowercased host with any `www.` prefix removed.
fn domain_root(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return None;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        Some(labels[labels.len() - 2..].join("."))
    } else {
        Some(host.to_string())
    }
}

/// True when both URLs share a domain root (`blog.example.com` and
/// `example.com` do). False when either has no host.
pub fn is_same_domain_root(a: &str, b: &str) -> bool {
    match (domain_root(a), domain_root(b)) {
        (Some(ra), Some(rb)) => ra == rb,
        _ => false,
    }
}

/// Human-readable name for a site: first host label, capitalized.
///
/// `https://www.example.com/x` becomes `Example`. Falls back to the input
/// when it cannot be parsed.
pub fn extract_domain_name(raw: &str) -> String {
    let Some(host) = Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
    else {
        return raw.to_string();
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let first = host.split('.').next().unwrap_or(host);
    let mut chars = first.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => host.to_string(),
    }
}

/// Host of `raw`, used as the search domain for a source.
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
