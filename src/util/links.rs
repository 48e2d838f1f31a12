use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
///
/// These cover parsing failures and the SSRF policy applied before the
/// gateway makes any outbound request on behalf of the front-end.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a URL before the gateway fetches it.
///
/// Rejects:
/// - Non-HTTP(S) schemes (e.g., `file://`, `ftp://`)
/// - Localhost addresses (`localhost`, `127.0.0.1`, `::1`)
/// - Private IP ranges (RFC 1918, link-local, unique local IPv6)
///
/// # Examples
///
/// ```
/// use wildcat::util::validate_url;
///
/// let url = validate_url("https://www.nyburs.com/news/tiger-census").unwrap();
/// assert_eq!(url.host_str(), Some("www.nyburs.com"));
///
/// assert!(validate_url("http://localhost/admin").is_err());
/// assert!(validate_url("http://192.168.1.1/router").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlValidationError::Localhost);
        }

        // Strip brackets from IPv6 addresses for parsing
        let host_for_parse = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}

/// Gives a user-typed link an explicit scheme.
///
/// Links already starting with `http://` or `https://` (any case) are kept;
/// anything else gets `https://` prepended. Empty or blank input yields `""`.
///
/// ```
/// use wildcat::util::normalize_link;
///
/// assert_eq!(normalize_link("example.com/a"), "https://example.com/a");
/// assert_eq!(normalize_link("http://example.com"), "http://example.com");
/// assert_eq!(normalize_link("   "), "");
/// ```
pub fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if has_prefix_ci(trimmed, "https://") || has_prefix_ci(trimmed, "http://") {
        return trimmed.to_owned();
    }
    format!("https://{}", trimmed.trim_start_matches('/'))
}

/// Markers after which a YouTube video id starts.
const YOUTUBE_MARKERS: [&str; 5] = [
    "youtube.com/watch?v=",
    "youtube.com/embed/",
    "youtube.com/shorts/",
    "youtube.com/live/",
    "youtu.be/",
];

/// Extracts the video id from a YouTube watch/embed/shorts/live or short link.
///
/// The id runs until the first `&`, `?` or whitespace. The leftmost marker in
/// the link wins.
///
/// ```
/// use wildcat::util::youtube_video_id;
///
/// assert_eq!(youtube_video_id("https://www.youtube.com/watch?v=abc123&t=5"), Some("abc123".into()));
/// assert_eq!(youtube_video_id("youtu.be/xyz?si=1"), Some("xyz".into()));
/// assert_eq!(youtube_video_id("https://vimeo.com/42"), None);
/// ```
pub fn youtube_video_id(link: &str) -> Option<String> {
    let link = normalize_link(link);
    let (start, marker) = YOUTUBE_MARKERS
        .iter()
        .filter_map(|m| link.find(m).map(|pos| (pos, *m)))
        .min_by_key(|(pos, _)| *pos)?;

    let rest = &link[start + marker.len()..];
    let id: String = rest
        .chars()
        .take_while(|c| *c != '&' && *c != '?' && !c.is_whitespace())
        .collect();

    (!id.is_empty()).then_some(id)
}

fn has_prefix_ci(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
