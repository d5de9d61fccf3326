use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures_util::{StreamExt, stream::SplitStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use tunnl_common::{
    Message, RequestLog, ResponseMetadata, TunnelError, TunnelRequest, TunnelResponse,
    constants::RESPONSE_SIZE_WARN_BYTES, decode_body, decode_frame, encode_body, encode_frame,
    header_value, normalize_public_url,
};

use crate::forward;
use crate::session::{SessionState, WebSocket};

/// Everything a frame handler needs; cheap to clone into spawned tasks
#[derive(Clone)]
pub struct DispatchContext {
    pub state: Arc<Mutex<SessionState>>,
    pub outgoing: mpsc::Sender<WsMessage>,
    pub client: reqwest::Client,
    pub server_url: String,
    pub local_port: u16,
    pub requests_served: Arc<AtomicU64>,
}

/// Read loop: decode inbound frames and route them by kind. Single
/// threaded with respect to the socket; request handling is spawned off.
pub async fn read_task(mut read: SplitStream<WebSocket>, ctx: DispatchContext) {
    while let Some(message) = read.next().await {
        match message {
            Ok(WsMessage::Text(text)) => match decode_frame(&text) {
                Ok(frame) => {
                    if handle_message(frame.message, &ctx).await.is_break() {
                        break;
                    }
                }
                Err(e) => warn!("Dropping malformed frame: {e}"),
            },
            Ok(WsMessage::Binary(_)) => warn!("Received unexpected binary message"),
            Ok(WsMessage::Ping(data)) => {
                if ctx.outgoing.send(WsMessage::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(WsMessage::Pong(_)) => debug!("Received WebSocket pong"),
            Ok(WsMessage::Close(_)) => {
                info!("Server closed connection");
                break;
            }
            Err(e) => {
                error!("WebSocket error: {e}");
                break;
            }
            _ => {}
        }
    }
    debug!("Read task exiting");
}

async fn handle_message(message: Message, ctx: &DispatchContext) -> ControlFlow<()> {
    match message {
        Message::Request(request) => {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                handle_request(request, ctx).await;
            });
        }

        Message::Heartbeat => {
            debug!("Heartbeat from server");
            send_frame(&ctx.outgoing, Message::HeartbeatAck).await;
        }

        Message::HeartbeatAck => debug!("Heartbeat acknowledged"),

        Message::Error {
            stream_id,
            code,
            message,
        } => {
            error!("Server error {code} (stream {stream_id:?}): {message}");
        }

        Message::Disconnect { reason } => {
            info!(
                "Server requested disconnect: {}",
                reason.as_deref().unwrap_or("no reason given")
            );
            return ControlFlow::Break(());
        }

        // The handshake consumes the first ack; a later one just
        // refreshes the identity
        Message::ConnectAck {
            tunnel_id,
            subdomain,
            public_url,
        } => {
            let public_url = normalize_public_url(&ctx.server_url, &subdomain, &public_url);
            let mut state = ctx.state.lock().await;
            state.tunnel_id = Some(tunnel_id);
            state.subdomain = Some(subdomain);
            state.public_url = Some(public_url);
        }

        _ => warn!("Received unexpected message type"),
    }

    ControlFlow::Continue(())
}

/// Handle one framed request end to end: forward it, answer on the same
/// stream, then log it. Failures become a synthesized 502, never a dead
/// session.
pub async fn handle_request(request: TunnelRequest, ctx: DispatchContext) {
    let start = Instant::now();
    let decoded = if request.has_body() {
        decode_body(&request.body).map_err(TunnelError::from)
    } else {
        Ok(Vec::new())
    };
    let TunnelRequest {
        stream_id, metadata, ..
    } = request;

    debug!("{} {} (stream {stream_id})", metadata.method, metadata.path);
    ctx.requests_served.fetch_add(1, Ordering::Relaxed);

    let result = match decoded {
        Ok(bytes) => forward::forward(&ctx.client, ctx.local_port, &metadata, bytes).await,
        Err(e) => Err(e),
    };

    let (response, error_message) = match result {
        Ok(forwarded) => {
            let encoded = encode_body(&forwarded.body);
            if encoded.len() > RESPONSE_SIZE_WARN_BYTES {
                warn!(
                    "Response for stream {stream_id} is {} encoded bytes; the server may reject it",
                    encoded.len()
                );
            }
            let response = TunnelResponse {
                stream_id: stream_id.clone(),
                metadata: ResponseMetadata {
                    status_code: forwarded.status_code,
                    status_message: forwarded.status_message,
                    headers: forwarded.headers,
                },
                body: encoded,
            };
            (response, None)
        }
        Err(e) => {
            error!("Failed to forward stream {stream_id}: {e}");
            (TunnelResponse::bad_gateway(stream_id.clone()), Some(e.to_string()))
        }
    };

    let status_code = response.metadata.status_code;
    if !response.is_success() {
        debug!("Stream {stream_id} answered with status {status_code}");
    }
    send_frame(&ctx.outgoing, Message::Response(response)).await;

    let (tunnel_id, public_url) = {
        let state = ctx.state.lock().await;
        (
            state.tunnel_id.clone().unwrap_or_default(),
            state.public_url.clone(),
        )
    };
    let host = header_value(&metadata.headers, "host")
        .map(str::to_string)
        .or(public_url)
        .unwrap_or_else(|| "unknown".to_string());

    let log = RequestLog {
        tunnel_id,
        method: metadata.method.clone(),
        host,
        path: metadata.path.clone(),
        status_code,
        response_time: start.elapsed().as_millis() as u64,
        ip_address: header_value(&metadata.headers, "x-forwarded-for").map(str::to_string),
        user_agent: header_value(&metadata.headers, "user-agent").map(str::to_string),
        error_message,
    };
    send_frame(&ctx.outgoing, Message::RequestLog(log)).await;
}

async fn send_frame(outgoing: &mpsc::Sender<WsMessage>, message: Message) {
    match encode_frame(message) {
        Ok(frame) => {
            // The queue closes when the connection goes away; frames
            // written after that are discarded
            if outgoing.send(WsMessage::Text(frame.into())).await.is_err() {
                debug!("Outbound queue closed; dropping frame");
            }
        }
        Err(e) => error!("Failed to encode frame: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::build_local_client;
    use crate::testing::{StubService, free_port};
    use std::collections::HashMap;
    use tunnl_common::RequestMetadata;

    fn test_context(local_port: u16) -> (DispatchContext, mpsc::Receiver<WsMessage>) {
        let (outgoing, rx) = mpsc::channel(16);
        let state = SessionState {
            connected: true,
            tunnel_id: Some("T1".to_string()),
            subdomain: Some("demo".to_string()),
            public_url: Some("https://demo.tunnl.fit".to_string()),
            should_reconnect: true,
            outgoing: None,
        };
        let ctx = DispatchContext {
            state: Arc::new(Mutex::new(state)),
            outgoing,
            client: build_local_client().unwrap(),
            server_url: "https://tunnl.fit".to_string(),
            local_port,
            requests_served: Arc::new(AtomicU64::new(0)),
        };
        (ctx, rx)
    }

    fn request(stream_id: &str, headers: &[(&str, &str)]) -> TunnelRequest {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in headers {
            map.entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
        TunnelRequest {
            stream_id: stream_id.to_string(),
            tunnel_id: "T1".to_string(),
            metadata: RequestMetadata {
                method: "GET".to_string(),
                path: "/x".to_string(),
                query: "a=1".to_string(),
                headers: map,
            },
            body: String::new(),
        }
    }

    async fn next_message(rx: &mut mpsc::Receiver<WsMessage>) -> Message {
        let frame = rx.recv().await.expect("expected an outbound frame");
        let WsMessage::Text(text) = frame else {
            panic!("expected a text frame");
        };
        decode_frame(&text).unwrap().message
    }

    #[tokio::test]
    async fn test_request_produces_response_then_log() {
        let service = StubService::start(
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 5\r\n\r\nhello",
        )
        .await;
        let (ctx, mut rx) = test_context(service.port());

        handle_request(
            request("S", &[("host", "demo.tunnl.fit"), ("user-agent", "curl/8")]),
            ctx.clone(),
        )
        .await;

        match next_message(&mut rx).await {
            Message::Response(response) => {
                assert_eq!(response.stream_id, "S");
                assert_eq!(response.metadata.status_code, 200);
                assert_eq!(response.metadata.status_message, "OK");
                assert_eq!(response.body, encode_body(b"hello"));
                assert!(response.metadata.headers.contains_key("content-type"));
            }
            other => panic!("expected RESPONSE, got {other:?}"),
        }

        match next_message(&mut rx).await {
            Message::RequestLog(log) => {
                assert_eq!(log.tunnel_id, "T1");
                assert_eq!(log.method, "GET");
                assert_eq!(log.path, "/x");
                assert_eq!(log.host, "demo.tunnl.fit");
                assert_eq!(log.status_code, 200);
                assert_eq!(log.user_agent.as_deref(), Some("curl/8"));
                assert!(log.error_message.is_none());
            }
            other => panic!("expected REQUEST_LOG, got {other:?}"),
        }

        assert_eq!(ctx.requests_served.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_request_synthesizes_502_when_local_service_is_down() {
        let port = free_port().await;
        let (ctx, mut rx) = test_context(port);

        handle_request(request("S", &[("x-forwarded-for", "203.0.113.9")]), ctx).await;

        match next_message(&mut rx).await {
            Message::Response(response) => {
                assert_eq!(response.stream_id, "S");
                assert_eq!(response.metadata.status_code, 502);
                assert_eq!(response.metadata.status_message, "Bad Gateway");
                assert_eq!(
                    decode_body(&response.body).unwrap(),
                    b"Error forwarding request to local service"
                );
            }
            other => panic!("expected RESPONSE, got {other:?}"),
        }

        match next_message(&mut rx).await {
            Message::RequestLog(log) => {
                assert_eq!(log.status_code, 502);
                // No host header: the public URL stands in
                assert_eq!(log.host, "https://demo.tunnl.fit");
                assert_eq!(log.ip_address.as_deref(), Some("203.0.113.9"));
                assert!(log.error_message.is_some());
            }
            other => panic!("expected REQUEST_LOG, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_heartbeat_is_acknowledged() {
        let (ctx, mut rx) = test_context(free_port().await);

        let flow = handle_message(Message::Heartbeat, &ctx).await;
        assert!(flow.is_continue());
        assert!(matches!(next_message(&mut rx).await, Message::HeartbeatAck));
    }

    #[tokio::test]
    async fn test_disconnect_breaks_the_loop() {
        let (ctx, _rx) = test_context(free_port().await);

        let flow = handle_message(
            Message::Disconnect {
                reason: Some("maintenance".to_string()),
            },
            &ctx,
        )
        .await;
        assert!(flow.is_break());
    }

    #[tokio::test]
    async fn test_server_error_frame_changes_nothing() {
        let (ctx, _rx) = test_context(free_port().await);

        let flow = handle_message(
            Message::Error {
                stream_id: None,
                code: "RATE_LIMITED".to_string(),
                message: "slow down".to_string(),
            },
            &ctx,
        )
        .await;

        assert!(flow.is_continue());
        let state = ctx.state.lock().await;
        assert!(state.connected);
        assert_eq!(state.tunnel_id.as_deref(), Some("T1"));
    }
}
