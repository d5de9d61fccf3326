use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tunnl_common::constants::DEFAULT_SERVER_URL;

mod config;
mod dispatch;
mod forward;
mod probe;
mod reconnect;
mod session;
mod status;
#[cfg(test)]
mod testing;

use config::TunnelClientOptions;
use session::TunnelSession;

/// HTTP reverse-tunneling agent
#[derive(Parser, Debug)]
#[command(name = "tunnl")]
#[command(about = "Expose a local HTTP service on a public subdomain", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tunnel HTTP traffic to a local port
    Http {
        /// Local port the service listens on
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,

        /// Requested subdomain (the server may assign a different one)
        #[arg(short, long)]
        subdomain: Option<String>,

        /// Authentication token
        #[arg(short, long, env = "TUNNL_TOKEN")]
        token: Option<String>,

        /// Tunnel server URL
        #[arg(long, env = "TUNNEL_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
        server: String,

        /// Exit instead of reconnecting when the connection drops
        #[arg(long)]
        no_reconnect: bool,
    },

    /// List active tunnels on the server
    Status {
        /// Tunnel server URL
        #[arg(long, env = "TUNNEL_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Http {
            port,
            subdomain,
            token,
            server,
            no_reconnect,
        } => {
            run_tunnel(TunnelClientOptions {
                server_url: server,
                local_port: port,
                subdomain,
                token,
                reconnect: !no_reconnect,
            })
            .await
        }
        Command::Status { server } => status::show_status(&server).await,
    }
}

async fn run_tunnel(options: TunnelClientOptions) -> Result<()> {
    info!("tunnl agent v{}", config::AGENT_VERSION);
    info!("Local service: http://localhost:{}", options.local_port);
    info!("Tunnel server: {}", options.server_url);

    let session = TunnelSession::new(options)?;

    tokio::select! {
        result = session.run() => {
            if let Err(e) = result {
                error!("{e}");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutting down");
            session.disconnect().await;
            // Let the writer flush the DISCONNECT frame
            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
