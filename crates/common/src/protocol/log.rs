use serde::{Deserialize, Serialize};

/// Telemetry emitted after every handled request, success or not
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    /// Empty string when the tunnel identity is not yet known
    #[serde(default)]
    pub tunnel_id: String,

    pub method: String,

    /// Request `host` header, falling back to the public URL or "unknown"
    pub host: String,

    pub path: String,

    /// 502 when the forward failed
    pub status_code: u16,

    /// Wall-clock handling time in milliseconds
    pub response_time: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
