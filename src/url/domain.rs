use url::Url;

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use outbound::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true when both URLs address the same site
///
/// Same site means same scheme, host and effective port. Subdomains count as
/// different sites.
pub fn same_domain(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && extract_domain(a).is_some()
        && extract_domain(a) == extract_domain(b)
        && a.port_or_known_default() == b.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_extract_simple_domain() {
        assert_eq!(
            extract_domain(&url("https://example.com/")),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn test_extract_with_port() {
        assert_eq!(
            extract_domain(&url("https://example.com:8080/")),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn test_same_domain_paths() {
        assert!(same_domain(
            &url("https://example.test/"),
            &url("https://example.test/a/b?x=1")
        ));
    }

    #[test]
    fn test_same_domain_explicit_default_port() {
        assert!(same_domain(
            &url("https://example.test/"),
            &url("https://example.test:443/a")
        ));
    }

    #[test]
    fn test_different_host() {
        assert!(!same_domain(
            &url("https://example.test/"),
            &url("https://other.test/")
        ));
    }

    #[test]
    fn test_subdomain_is_different() {
        assert!(!same_domain(
            &url("https://example.test/"),
            &url("https://blog.example.test/")
        ));
    }

    #[test]
    fn test_different_port_is_different() {
        assert!(!same_domain(
            &url("http://127.0.0.1:8080/"),
            &url("http://127.0.0.1:9090/")
        ));
    }

    #[test]
    fn test_different_scheme_is_different() {
        assert!(!same_domain(
            &url("http://example.test/"),
            &url("https://example.test/")
        ));
    }
}
