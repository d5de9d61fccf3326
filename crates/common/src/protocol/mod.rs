mod log;
mod message;
mod request;
mod response;

pub use log::RequestLog;
pub use message::{Frame, Message, decode_frame, encode_frame};
pub use request::{RequestMetadata, TunnelRequest};
pub use response::{ResponseMetadata, TunnelResponse};
