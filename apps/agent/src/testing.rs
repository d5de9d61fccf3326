//! Test doubles for the local service side

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// A one-response local HTTP service: captures what it was sent and
/// answers every connection with the canned bytes
pub struct StubService {
    port: u16,
    received: Arc<Mutex<String>>,
}

impl StubService {
    pub async fn start(response: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(String::new()));

        let captured = Arc::clone(&received);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let captured = Arc::clone(&captured);
                tokio::spawn(async move {
                    let mut buf = [0u8; 8192];
                    let mut request = Vec::new();
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) => break,
                            Ok(n) => {
                                request.extend_from_slice(&buf[..n]);
                                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                                    break;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                    *captured.lock().await = String::from_utf8_lossy(&request).into_owned();
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { port, received }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The raw request bytes seen on the most recent connection
    pub async fn received(&self) -> String {
        self.received.lock().await.clone()
    }
}

/// A port nothing is listening on
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
