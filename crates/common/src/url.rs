//! Repair of server-returned public URLs
//!
//! Some server builds compose the public URL badly: the listening port
//! gets concatenated onto the TLD (`demo.tunnl.fit3000:3000`), a port is
//! left dangling, or the server host is missing entirely. The agent
//! repairs the URL before storing it or showing it to the operator.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a TLD with digits glued onto it, e.g. `.fit3000`
static TLD_WITH_PORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(com|net|org|io|dev|app|co|fit)\d+").unwrap());

/// Matches a trailing `:<port>`
static TRAILING_PORT: Lazy<Regex> = Lazy::new(|| Regex::new(r":\d+$").unwrap());

/// Host portion of a URL: scheme, path and port stripped
fn host_of(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let rest = rest.split('/').next().unwrap_or(rest);
    rest.split(':').next().unwrap_or(rest)
}

/// Normalize the public URL assigned by the server.
///
/// Local development URLs pass through untouched. Everything else has the
/// glued TLD port collapsed, any trailing port stripped, the server host
/// reinstated when missing, and the scheme forced to `https://`. The
/// operation is idempotent.
pub fn normalize_public_url(server_url: &str, subdomain: &str, url: &str) -> String {
    if url.contains("localhost") || url.contains("127.0.0.1") {
        return url.to_string();
    }

    let repaired = TLD_WITH_PORT.replace_all(url, ".$1");
    let mut result = TRAILING_PORT.replace(&repaired, "").into_owned();

    let server_host = host_of(server_url);
    if !result.contains(server_host) {
        let protocol = if server_url.starts_with("https://") {
            "https://"
        } else {
            "http://"
        };
        result = format!("{protocol}{subdomain}{server_host}");
    }

    if let Some(rest) = result.strip_prefix("http://") {
        result = format!("https://{rest}");
    } else if !result.starts_with("https://") {
        result = format!("https://{result}");
    }

    result
}
