//! Image URL canonicalization.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize an image URL before fetching it.
///
/// Protocol-relative URLs (`//cdn.example.com/a.png`) become https. Only
/// http and https are accepted; the host is lowercased and the fragment
/// dropped. The query string is kept as-is since image CDNs encode sizing
/// in it.
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = match trimmed.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => trimmed.to_string(),
    };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let host = parsed.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    parsed.set_host(Some(&host)).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_lowercases_host_and_drops_fragment() {
        let url = canonicalize("  https://CDN.Example.com/img/a.PNG?w=600#top ").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/img/a.PNG?w=600");
    }

    #[test]
    fn test_protocol_relative() {
        let url = canonicalize("//cdn.example.com/a.png").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(canonicalize("data:image/png;base64,AAAA"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(canonicalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_rejects_relative_and_empty() {
        assert!(matches!(canonicalize("/images/a.png"), Err(UrlError::InvalidUrl(_))));
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }
}
