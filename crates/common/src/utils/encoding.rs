use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Encode bytes to a standard Base64 string (no URL-safe alphabet, no
/// line wrapping)
pub fn encode_body(body: &[u8]) -> String {
    STANDARD.encode(body)
}

/// Decode a standard Base64 string to bytes
pub fn decode_body(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}
