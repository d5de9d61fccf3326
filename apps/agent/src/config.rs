use tunnl_common::constants::AGENT_ENDPOINT_PATH;

/// Version string embedded at build time
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Options for one tunnel client session, immutable after construction
#[derive(Debug, Clone)]
pub struct TunnelClientOptions {
    /// Tunnel server base URL, e.g. "https://tunnl.fit"
    pub server_url: String,

    /// Local port forwarded requests are sent to
    pub local_port: u16,

    /// Requested subdomain; the server may assign a different one
    pub subdomain: Option<String>,

    /// Authentication token sent in the CONNECT frame
    pub token: Option<String>,

    /// Reconnect with backoff when an established connection drops
    pub reconnect: bool,
}

impl TunnelClientOptions {
    /// WebSocket endpoint of the control channel
    pub fn agent_endpoint(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("wss://{base}")
        };
        format!("{ws_base}{AGENT_ENDPOINT_PATH}")
    }
}
