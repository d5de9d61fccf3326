use std::collections::HashMap;

use reqwest::{Client, Method, redirect};
use tunnl_common::{
    RequestMetadata, Result, TunnelError, filter_request_headers, headers_to_map, map_to_headers,
};

/// What came back from the local service
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status_code: u16,
    pub status_message: String,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

/// Client shared by forwarded requests and liveness probes. Redirects
/// are never followed, and there is no client-wide timeout.
pub fn build_local_client() -> Result<Client> {
    Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .map_err(|e| TunnelError::Http(e.to_string()))
}

/// Forward one framed request to the local service.
///
/// Any status code is a successful forward; only transport failures
/// produce an error. The returned headers are the response headers.
pub async fn forward(
    client: &Client,
    local_port: u16,
    metadata: &RequestMetadata,
    body: Vec<u8>,
) -> Result<ForwardedResponse> {
    let url = format!("http://localhost:{}{}", local_port, metadata.path_and_query());

    let method = Method::from_bytes(metadata.method.as_bytes())
        .map_err(|_| TunnelError::Http(format!("Invalid HTTP method: {}", metadata.method)))?;

    let mut builder = client
        .request(method, &url)
        .headers(map_to_headers(&filter_request_headers(&metadata.headers)));
    if !body.is_empty() {
        builder = builder.body(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| map_transport_error(e, local_port))?;

    let status = response.status();
    let headers = headers_to_map(response.headers());
    let bytes = response
        .bytes()
        .await
        .map_err(|e| map_transport_error(e, local_port))?;

    Ok(ForwardedResponse {
        status_code: status.as_u16(),
        status_message: status.canonical_reason().unwrap_or("").to_string(),
        headers,
        body: bytes.to_vec(),
    })
}

fn map_transport_error(err: reqwest::Error, local_port: u16) -> TunnelError {
    if err.is_connect() {
        TunnelError::LocalServiceDown(local_port)
    } else if err.is_timeout() {
        TunnelError::LocalServiceTimeout
    } else {
        TunnelError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubService, free_port};
    use std::collections::HashMap;

    fn metadata(method: &str, headers: &[(&str, &str)]) -> RequestMetadata {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in headers {
            map.entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
        RequestMetadata {
            method: method.to_string(),
            path: "/x".to_string(),
            query: "a=1".to_string(),
            headers: map,
        }
    }

    #[tokio::test]
    async fn test_forward_returns_response_not_request_headers() {
        let service = StubService::start(
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\nx-served-by: stub\r\ncontent-length: 5\r\n\r\nhello",
        )
        .await;

        let client = build_local_client().unwrap();
        let meta = metadata(
            "GET",
            &[
                ("Host", "demo.tunnl.fit"),
                ("Content-Length", "0"),
                ("User-Agent", "curl/8"),
            ],
        );

        let response = forward(&client, service.port(), &meta, Vec::new())
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.status_message, "OK");
        assert_eq!(response.body, b"hello");
        // Headers come from the response, not echoed back from the request
        assert_eq!(
            response.headers.get("x-served-by").unwrap(),
            &vec!["stub".to_string()]
        );
        assert!(!response.headers.contains_key("user-agent"));

        // The stub saw the filtered request: no host/content-length, but
        // the user agent survived
        let seen = service.received().await;
        assert!(seen.contains("GET /x?a=1 HTTP/1.1"));
        assert!(seen.to_lowercase().contains("user-agent: curl/8"));
        assert!(!seen.to_lowercase().contains("\r\nhost:"));
        assert!(!seen.to_lowercase().contains("transfer-encoding:"));
    }

    #[tokio::test]
    async fn test_forward_accepts_error_statuses() {
        let service = StubService::start(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n",
        )
        .await;

        let client = build_local_client().unwrap();
        let response = forward(&client, service.port(), &metadata("GET", &[]), Vec::new())
            .await
            .unwrap();

        assert_eq!(response.status_code, 503);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_forward_does_not_follow_redirects() {
        let service = StubService::start(
            "HTTP/1.1 302 Found\r\nlocation: http://localhost:1/elsewhere\r\ncontent-length: 0\r\n\r\n",
        )
        .await;

        let client = build_local_client().unwrap();
        let response = forward(&client, service.port(), &metadata("GET", &[]), Vec::new())
            .await
            .unwrap();

        assert_eq!(response.status_code, 302);
        assert_eq!(
            response.headers.get("location").unwrap(),
            &vec!["http://localhost:1/elsewhere".to_string()]
        );
    }

    #[tokio::test]
    async fn test_forward_connection_refused() {
        let port = free_port().await;
        let client = build_local_client().unwrap();

        let err = forward(&client, port, &metadata("GET", &[]), Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TunnelError::LocalServiceDown(p) if p == port));
        assert_eq!(
            err.to_string(),
            format!("Cannot connect to local service on port {port}. Is your service running?")
        );
    }
}
