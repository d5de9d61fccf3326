use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An inbound HTTP request framed by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelRequest {
    /// Opaque stream identifier, generated by the server and echoed
    /// verbatim on the matching response
    pub stream_id: String,

    #[serde(default)]
    pub tunnel_id: String,

    pub metadata: RequestMetadata,

    /// Request body, standard base64. Empty string when there is no body.
    #[serde(default)]
    pub body: String,
}

/// The HTTP line and headers of a framed request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub method: String,

    pub path: String,

    /// Raw query string, without the leading `?`
    #[serde(default)]
    pub query: String,

    /// Header name to list of values; multiple values per name are
    /// supported
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
}

impl RequestMetadata {
    /// Path plus query as sent to the local service (`?` omitted when the
    /// query is empty)
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

impl TunnelRequest {
    /// Check if the request has a body
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}
