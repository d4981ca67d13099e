use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use newt_walker::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Host plus explicit port, the key robots.txt policies are cached under
///
/// `https://a.example.com:8443/x` gives `a.example.com:8443`; default ports
/// are omitted.
pub fn host_key(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Whether `domain` belongs to the crawl rooted at `base_domain`
///
/// A leading `www.` is ignored on both sides, so `www.example.com` and
/// `example.com` are the same site.
pub fn is_same_site(domain: &str, base_domain: &str) -> bool {
    strip_www(&domain.to_lowercase()) == strip_www(&base_domain.to_lowercase())
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
