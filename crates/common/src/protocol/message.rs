use serde::{Deserialize, Serialize};

use super::{RequestLog, TunnelRequest, TunnelResponse};
use crate::error::{Result, TunnelError};
use crate::utils::current_timestamp_millis;

/// All control-channel messages are wrapped in this typed envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Sent by the agent right after the channel opens
    #[serde(rename_all = "camelCase")]
    Connect {
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        requested_subdomain: Option<String>,
        agent_version: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        local_port: Option<u16>,
        /// Requests served so far, so telemetry survives a reconnect
        #[serde(skip_serializing_if = "Option::is_none")]
        request_count: Option<u64>,
    },

    /// Server reply assigning the tunnel identity
    #[serde(rename_all = "camelCase")]
    ConnectAck {
        tunnel_id: String,
        subdomain: String,
        public_url: String,
    },

    /// Data plane
    Request(TunnelRequest),
    Response(TunnelResponse),

    /// Liveness
    Heartbeat,
    HeartbeatAck,
    #[serde(rename_all = "camelCase")]
    LocalServicePing {
        tunnel_id: String,
        local_service_connected: bool,
    },

    /// Per-request telemetry
    RequestLog(RequestLog),

    /// Server-reported failure. `code` is an open string so codes this
    /// agent does not know cannot make the frame undecodable.
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
        code: String,
        message: String,
    },

    Disconnect {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// One frame on the wire: a message plus the sender-stamped timestamp
/// (Unix milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(flatten)]
    pub message: Message,
    pub timestamp: u64,
}

/// Serialize a message to its wire form, stamping the timestamp
pub fn encode_frame(message: Message) -> Result<String> {
    let frame = Frame {
        message,
        timestamp: current_timestamp_millis(),
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Parse one wire frame. Unknown fields are tolerated; a missing or
/// unknown `type` is not.
pub fn decode_frame(raw: &str) -> Result<Frame> {
    serde_json::from_str(raw).map_err(|e| TunnelError::Protocol(e.to_string()))
}
