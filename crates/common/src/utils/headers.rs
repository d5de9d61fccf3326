use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Request headers stripped before forwarding to the local service. They
/// are either re-derived by the HTTP client or meaningless on a
/// point-to-point request.
pub const FILTERED_REQUEST_HEADERS: [&str; 4] =
    ["host", "connection", "transfer-encoding", "content-length"];

/// Convert HTTP headers to the wire format. Multiple values per header
/// name are preserved.
pub fn headers_to_map(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();

    for (name, value) in headers.iter() {
        let key = name.as_str().to_string();
        let val = value.to_str().unwrap_or("").to_string();

        map.entry(key).or_default().push(val);
    }

    map
}

/// Convert wire-format headers to an HTTP HeaderMap, skipping entries
/// that are not valid header names or values
pub fn map_to_headers(map: &HashMap<String, Vec<String>>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, values) in map.iter() {
        if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
            for value in values {
                if let Ok(header_value) = HeaderValue::from_str(value) {
                    headers.append(header_name.clone(), header_value);
                }
            }
        }
    }

    headers
}

/// Drop the headers in [`FILTERED_REQUEST_HEADERS`], matching names
/// case-insensitively
pub fn filter_request_headers(
    headers: &HashMap<String, Vec<String>>,
) -> HashMap<String, Vec<String>> {
    headers
        .iter()
        .filter(|(name, _)| {
            !FILTERED_REQUEST_HEADERS
                .iter()
                .any(|filtered| name.eq_ignore_ascii_case(filtered))
        })
        .map(|(name, values)| (name.clone(), values.clone()))
        .collect()
}

/// First value of a header, looked up case-insensitively
pub fn header_value<'a>(headers: &'a HashMap<String, Vec<String>>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}
