// Copyright (c) 2026 EMBER contributors. MIT License.
// See LICENSE for details.

//! # EMBER Validator Node
//!
//! Entry point for the `ember-node` binary. Resolves configuration from
//! flags and environment, initializes logging, starts the node and the
//! HTTP API, registers with the DNS seed, and shuts everything down
//! cleanly on SIGTERM or ctrl-c.

mod api;
mod cli;
mod logging;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

use ember_protocol::config;
use ember_protocol::network::{Node, NodeConfig};

use cli::NodeCli;
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let startup = Instant::now();
    let cli = NodeCli::parse();

    logging::init(cli.debug, LogFormat::from_str_lossy(&cli.log_format));

    info!(
        version = config::PROTOCOL_VERSION,
        port = cli.port,
        api = cli.api_port,
        interval = %cli.interval,
        debug = cli.debug,
        "node: startup"
    );

    // --- Core node -------------------------------------------------------
    let node_config = NodeConfig {
        port: cli.port,
        forge_interval: cli.forge_interval(),
        max_block_transactions: config::MAX_BLOCK_TRANSACTIONS,
        snapshot_path: config::SNAPSHOT_FILE.into(),
    };

    let node = Node::start(node_config)
        .await
        .context("failed to start node")?;

    // --- DNS seed registration (best effort) ------------------------------
    register_with_seed(&cli.dns_seed, cli.port).await;

    // --- HTTP API ----------------------------------------------------------
    let (api_shutdown, api_shutdown_rx) = watch::channel(false);
    let api_node = Arc::clone(&node);
    let api_port = cli.api_port;
    let api_task = tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, api_node, api_shutdown_rx).await {
            warn!(error = %e, "api server exited");
        }
    });

    info!(
        uptime_ms = startup.elapsed().as_millis() as u64,
        peer = node.id(),
        "node: running"
    );

    // --- Await termination -------------------------------------------------
    wait_for_termination().await?;

    warn!("node: shutting down");
    let _ = api_shutdown.send(true);
    node.shutdown().await;
    let _ = api_task.await;

    Ok(())
}

/// Blocks until SIGTERM or ctrl-c.
async fn wait_for_termination() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::select! {
        _ = sigterm.recv() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
        }
    }
    Ok(())
}

/// Announces this node to the DNS seed. Failure is logged and ignored —
/// LAN discovery works without it.
async fn register_with_seed(seed: &str, port: u16) {
    let host = match outbound_ip() {
        Some(ip) => ip,
        None => {
            warn!("could not determine outbound address, skipping seed registration");
            return;
        }
    };

    let url = format!("http://{seed}/register_node?host={host}&port={port}");
    match reqwest::Client::new().post(&url).send().await {
        Ok(response) => info!(%seed, status = %response.status(), "registered with dns seed"),
        Err(e) => warn!(%seed, error = %e, "dns seed registration failed"),
    }
}

/// The local address an outbound packet would use. No traffic is sent —
/// connecting a UDP socket just resolves the routing decision.
fn outbound_ip() -> Option<std::net::IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip())
}
