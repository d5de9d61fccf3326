use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tracing::{debug, error, info, warn};
use tunnl_common::{
    Message, Result, TunnelError,
    constants::{
        HANDSHAKE_TIMEOUT_SECS, HEARTBEAT_INTERVAL_SECS, LOCAL_PROBE_INTERVAL_SECS,
        RECONNECT_MAX_ATTEMPTS,
    },
    decode_frame, encode_frame, normalize_public_url,
};

use crate::config::{AGENT_VERSION, TunnelClientOptions};
use crate::dispatch::{self, DispatchContext};
use crate::forward;
use crate::probe;
use crate::reconnect;

pub type WebSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Session state shared between the dispatcher, the timer tasks and the
/// reconnection supervisor. Request handlers only read from it.
#[derive(Debug, Default)]
pub struct SessionState {
    pub connected: bool,
    pub tunnel_id: Option<String>,
    pub subdomain: Option<String>,
    pub public_url: Option<String>,
    /// Cleared by `disconnect`; also consulted between reconnect attempts
    pub should_reconnect: bool,
    /// Handle into the single-writer queue of the live connection
    pub outgoing: Option<mpsc::Sender<WsMessage>>,
}

/// The tunnel session facade: `run` drives the whole lifecycle,
/// `disconnect` ends it
pub struct TunnelSession {
    options: TunnelClientOptions,
    state: Arc<Mutex<SessionState>>,
    client: reqwest::Client,
    requests_served: Arc<AtomicU64>,
}

impl TunnelSession {
    pub fn new(options: TunnelClientOptions) -> Result<Self> {
        Ok(Self {
            options,
            state: Arc::new(Mutex::new(SessionState {
                should_reconnect: true,
                ..Default::default()
            })),
            client: forward::build_local_client()?,
            requests_served: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Public URL assigned by the server, once established
    pub async fn public_url(&self) -> Option<String> {
        self.state.lock().await.public_url.clone()
    }

    /// Run the session until `disconnect` is called or reconnection is
    /// exhausted.
    ///
    /// A failure to establish the very first connection is returned to the
    /// caller; once the tunnel has been up, drops are retried with
    /// exponential backoff and a bounded attempt count per episode.
    pub async fn run(&self) -> Result<()> {
        let ws = self.connect().await?;
        self.serve(ws).await;

        loop {
            if !self.reconnect_allowed().await {
                return Ok(());
            }

            let delay = reconnect::initial_delay();
            info!("Connection lost, reconnecting in {}s", delay.as_secs());
            tokio::time::sleep(reconnect::with_jitter(delay)).await;

            let mut failed_attempts: u32 = 0;
            loop {
                if !self.reconnect_allowed().await {
                    return Ok(());
                }

                match self.connect().await {
                    Ok(ws) => {
                        // Fresh episode: the attempt counter dies here
                        self.serve(ws).await;
                        break;
                    }
                    Err(e) => {
                        failed_attempts += 1;
                        if failed_attempts >= RECONNECT_MAX_ATTEMPTS {
                            return Err(TunnelError::ExhaustedRetries(failed_attempts));
                        }
                        let delay = reconnect::backoff_delay(failed_attempts);
                        warn!(
                            "Reconnect attempt {failed_attempts} failed: {e}. Retrying in {}s",
                            delay.as_secs()
                        );
                        tokio::time::sleep(reconnect::with_jitter(delay)).await;
                    }
                }
            }
        }
    }

    /// Stop the session: no further reconnects, best-effort DISCONNECT
    /// frame, channel closed behind it. Non-blocking beyond the state
    /// lock.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        state.should_reconnect = false;
        if state.connected {
            if let Some(subdomain) = state.subdomain.as_deref() {
                info!("Closing tunnel for {subdomain}");
            }
        }
        state.connected = false;

        if let Some(outgoing) = state.outgoing.take() {
            if let Ok(frame) = encode_frame(Message::Disconnect {
                reason: Some("Client disconnect".to_string()),
            }) {
                let _ = outgoing.try_send(WsMessage::Text(frame.into()));
            }
            let _ = outgoing.try_send(WsMessage::Close(None));
        }

        info!("Tunnel disconnected");
    }

    async fn reconnect_allowed(&self) -> bool {
        self.options.reconnect && self.state.lock().await.should_reconnect
    }

    /// Open the control channel and perform the CONNECT/CONNECT_ACK
    /// handshake
    async fn connect(&self) -> Result<WebSocket> {
        let endpoint = self.options.agent_endpoint();
        debug!("Connecting to {endpoint}");

        let (mut ws, _) = connect_async(&endpoint)
            .await
            .map_err(|e| TunnelError::Transport(e.to_string()))?;

        let connect = Message::Connect {
            token: self.options.token.clone(),
            requested_subdomain: self.options.subdomain.clone(),
            agent_version: AGENT_VERSION.to_string(),
            local_port: Some(self.options.local_port),
            request_count: Some(self.requests_served.load(Ordering::Relaxed)),
        };
        ws.send(WsMessage::Text(encode_frame(connect)?.into()))
            .await
            .map_err(|e| TunnelError::Transport(e.to_string()))?;

        let handshake = tokio::time::timeout(
            Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
            wait_for_ack(&mut ws),
        );
        let (tunnel_id, subdomain, public_url) = handshake
            .await
            .map_err(|_| TunnelError::Transport("Handshake timed out".to_string()))??;

        let public_url = normalize_public_url(&self.options.server_url, &subdomain, &public_url);

        {
            let mut state = self.state.lock().await;
            state.connected = true;
            state.tunnel_id = Some(tunnel_id);
            state.subdomain = Some(subdomain);
            state.public_url = Some(public_url.clone());
        }

        info!("Tunnel established: {public_url}");
        info!("Forwarding to http://localhost:{}", self.options.local_port);

        Ok(ws)
    }

    /// Drive one established connection until it drops. Every task
    /// started here is stopped before this returns.
    async fn serve(&self, ws: WebSocket) {
        let (write, read) = ws.split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<WsMessage>(100);

        self.state.lock().await.outgoing = Some(outgoing_tx.clone());

        let ctx = DispatchContext {
            state: Arc::clone(&self.state),
            outgoing: outgoing_tx.clone(),
            client: self.client.clone(),
            server_url: self.options.server_url.clone(),
            local_port: self.options.local_port,
            requests_served: Arc::clone(&self.requests_served),
        };

        let mut write_handle = tokio::spawn(write_task(write, outgoing_rx));
        let mut read_handle = tokio::spawn(dispatch::read_task(read, ctx));
        let mut heartbeat_handle = tokio::spawn(heartbeat_task(outgoing_tx.clone()));
        let mut probe_handle = tokio::spawn(probe_task(
            self.client.clone(),
            self.options.local_port,
            Arc::clone(&self.state),
            outgoing_tx,
        ));

        tokio::select! {
            _ = &mut write_handle => debug!("Write task ended"),
            _ = &mut read_handle => debug!("Read task ended"),
            _ = &mut heartbeat_handle => debug!("Heartbeat task ended"),
            _ = &mut probe_handle => debug!("Probe task ended"),
        }

        // No Established-scoped task may outlive the connection
        write_handle.abort();
        read_handle.abort();
        heartbeat_handle.abort();
        probe_handle.abort();

        let mut state = self.state.lock().await;
        state.connected = false;
        state.outgoing = None;
    }
}

async fn wait_for_ack(ws: &mut WebSocket) -> Result<(String, String, String)> {
    while let Some(message) = ws.next().await {
        match message {
            Ok(WsMessage::Text(text)) => match decode_frame(&text) {
                Ok(frame) => {
                    if let Message::ConnectAck {
                        tunnel_id,
                        subdomain,
                        public_url,
                    } = frame.message
                    {
                        return Ok((tunnel_id, subdomain, public_url));
                    }
                    debug!("Ignoring frame received before CONNECT_ACK");
                }
                Err(e) => warn!("Dropping malformed frame during handshake: {e}"),
            },
            Ok(WsMessage::Close(_)) => {
                return Err(TunnelError::Transport(
                    "Server closed connection during handshake".to_string(),
                ));
            }
            Err(e) => return Err(TunnelError::Transport(e.to_string())),
            _ => {}
        }
    }
    Err(TunnelError::Transport(
        "Connection closed before handshake".to_string(),
    ))
}

/// Single writer: every outbound frame funnels through here, so sends
/// from concurrent request handlers never interleave on the socket
async fn write_task(
    mut write: SplitSink<WebSocket, WsMessage>,
    mut outgoing_rx: mpsc::Receiver<WsMessage>,
) {
    while let Some(message) = outgoing_rx.recv().await {
        let closing = matches!(message, WsMessage::Close(_));
        if let Err(e) = write.send(message).await {
            error!("Failed to send message: {e}");
            break;
        }
        if closing {
            break;
        }
    }
    debug!("Write task exiting");
}

async fn heartbeat_task(outgoing: mpsc::Sender<WsMessage>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    loop {
        ticker.tick().await;
        match encode_frame(Message::Heartbeat) {
            Ok(frame) => {
                if outgoing.send(WsMessage::Text(frame.into())).await.is_err() {
                    break;
                }
                debug!("Sent heartbeat");
            }
            Err(e) => {
                error!("Failed to encode heartbeat: {e}");
                break;
            }
        }
    }
    debug!("Heartbeat task exiting");
}

/// Probe the local service on a fixed cadence and push each
/// determination upstream. Inconclusive probes emit nothing.
async fn probe_task(
    client: reqwest::Client,
    local_port: u16,
    state: Arc<Mutex<SessionState>>,
    outgoing: mpsc::Sender<WsMessage>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(LOCAL_PROBE_INTERVAL_SECS));
    loop {
        ticker.tick().await;

        let Some(alive) = probe::probe_local_service(&client, local_port).await else {
            continue;
        };
        if !alive {
            debug!("Local service on port {local_port} is not responding");
        }

        let tunnel_id = state.lock().await.tunnel_id.clone().unwrap_or_default();
        match encode_frame(Message::LocalServicePing {
            tunnel_id,
            local_service_connected: alive,
        }) {
            Ok(frame) => {
                if outgoing.send(WsMessage::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to encode local-service ping: {e}");
                break;
            }
        }
    }
}
