/// Heartbeat cadence while the tunnel is established (30 seconds)
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Local-service liveness probe cadence (5 seconds)
pub const LOCAL_PROBE_INTERVAL_SECS: u64 = 5;

/// User-Agent header sent on liveness probes
pub const PROBE_USER_AGENT: &str = "Tunnel-Agent-Ping";

/// Base delay for exponential-backoff reconnection (5 seconds)
pub const RECONNECT_BASE_DELAY_MS: u64 = 5000;

/// Ceiling on a single reconnection delay (60 seconds)
pub const RECONNECT_MAX_DELAY_MS: u64 = 60_000;

/// Reconnection attempts allowed per disconnect episode
pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;

/// Upper bound on the random jitter fraction added to reconnect delays
pub const RECONNECT_JITTER_FRACTION: f64 = 0.2;

/// Time allowed for the CONNECT/CONNECT_ACK handshake (60 seconds)
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 60;

/// Encoded response bodies above this size are logged as oversized (10 MiB)
pub const RESPONSE_SIZE_WARN_BYTES: usize = 10 * 1024 * 1024;

/// Production tunnel server
pub const DEFAULT_SERVER_URL: &str = "https://tunnl.fit";

/// Control-channel endpoint path under the server URL
pub const AGENT_ENDPOINT_PATH: &str = "/agent";
