use std::time::Duration;

use reqwest::Client;
use tunnl_common::constants::{LOCAL_PROBE_INTERVAL_SECS, PROBE_USER_AGENT};

/// One liveness determination for the local service.
///
/// Any HTTP response means the service is up, even an error status.
/// Connection refused or a timeout means it is down. Anything else is
/// inconclusive: no ping frame is emitted for it.
pub async fn probe_local_service(client: &Client, local_port: u16) -> Option<bool> {
    let url = format!("http://localhost:{local_port}/");
    let result = client
        .head(&url)
        .header(reqwest::header::USER_AGENT, PROBE_USER_AGENT)
        // Bounded so one determination cannot outlive the probe cadence
        .timeout(Duration::from_secs(LOCAL_PROBE_INTERVAL_SECS))
        .send()
        .await;

    match result {
        Ok(_) => Some(true),
        Err(e) if e.is_connect() || e.is_timeout() => Some(false),
        Err(_) => None,
    }
}
