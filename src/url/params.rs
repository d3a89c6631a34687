use crate::{UrlError, UrlResult};
use url::Url;

/// Returns the first non-empty value of a query parameter
///
/// # Examples
///
/// ```
/// use lms_archive::url::query_param;
/// use url::Url;
///
/// let url = Url::parse("https://lms.example.edu/course/view.php?id=42").unwrap();
/// assert_eq!(query_param(&url, "id"), Some("42".to_string()));
/// assert_eq!(query_param(&url, "categoryid"), None);
/// ```
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Returns a copy of `url` with `name` set to `value`
///
/// An existing occurrence is replaced in place (and any duplicates dropped) so
/// forcing a parameter twice never yields `?perpage=all&perpage=all`.
pub fn with_query_param(url: &Url, name: &str, value: &str) -> Url {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut replaced = false;
    pairs.retain_mut(|(key, existing)| {
        if key != name {
            return true;
        }
        if replaced {
            return false;
        }
        *existing = value.to_string();
        replaced = true;
        true
    });
    if !replaced {
        pairs.push((name.to_string(), value.to_string()));
    }

    let mut forced = url.clone();
    forced.query_pairs_mut().clear().extend_pairs(pairs);
    forced
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None if the link should be ignored:
/// - empty or fragment-only hrefs
/// - javascript:, mailto:, tel:, data: schemes
/// - hrefs that do not resolve to http or https
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute)
        }
        _ => None,
    }
}

/// Builds a URL on the same origin as `base` from an absolute path and query
pub fn portal_url(base: &Url, path_and_query: &str) -> UrlResult<Url> {
    base.join(path_and_query)
        .map_err(|e| UrlError::Parse(format!("{}: {}", path_and_query, e)))
}
