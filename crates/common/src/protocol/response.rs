use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::utils::encode_body;

/// The local service's answer to a framed request, sent back through the
/// tunnel with the stream identifier of the request it answers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelResponse {
    /// Must match the streamId of the corresponding request
    pub stream_id: String,

    pub metadata: ResponseMetadata,

    /// Response body, standard base64
    #[serde(default)]
    pub body: String,
}

/// Status line and headers of a forwarded response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub status_code: u16,

    #[serde(default)]
    pub status_message: String,

    /// Response headers from the local service, not the request headers
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
}

impl TunnelResponse {
    /// The synthesized response for a request the local service could not
    /// answer
    pub fn bad_gateway(stream_id: String) -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            vec!["text/plain".to_string()],
        );

        Self {
            stream_id,
            metadata: ResponseMetadata {
                status_code: 502,
                status_message: "Bad Gateway".to_string(),
                headers,
            },
            body: encode_body(b"Error forwarding request to local service"),
        }
    }

    /// Check if the response is successful (2xx status code)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.metadata.status_code)
    }
}
