use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    tunnels: Vec<TunnelStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TunnelStatus {
    subdomain: String,
    #[serde(default)]
    connected_at: Option<String>,
    #[serde(default)]
    pending_requests: u64,
}

/// Query the server's status endpoint and print one line per active
/// tunnel
pub async fn show_status(server_url: &str) -> Result<()> {
    let url = format!("{}/api/status", server_url.trim_end_matches('/'));

    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach {url}"))?
        .error_for_status()
        .context("Status endpoint returned an error")?;
    let status: StatusResponse = response.json().await.context("Malformed status payload")?;

    if status.tunnels.is_empty() {
        println!("No active tunnels");
        return Ok(());
    }

    println!("{} active tunnel(s):", status.tunnels.len());
    for tunnel in &status.tunnels {
        println!(
            "  {}  connected since {}  pending requests: {}",
            tunnel.subdomain,
            tunnel.connected_at.as_deref().unwrap_or("unknown"),
            tunnel.pending_requests
        );
    }

    Ok(())
}
