//! Common types and utilities for the tunnl reverse-tunneling system
//!
//! This crate provides the wire protocol, error taxonomy and shared helpers
//! used by the agent binary.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod url;
pub mod utils;

// Re-export commonly used types for convenience
pub use error::{Result, TunnelError};
pub use protocol::{
    Frame, Message, RequestLog, RequestMetadata, ResponseMetadata, TunnelRequest, TunnelResponse,
    decode_frame, encode_frame,
};
pub use url::normalize_public_url;
pub use utils::{
    current_timestamp_millis, decode_body, encode_body, filter_request_headers, header_value,
    headers_to_map, map_to_headers,
};
