//! musterd — peer rendezvous daemon.
//!
//! Every participant is started with the same hostfile. Each binds the
//! well-known UDP port, then exchanges HELLO/ACK with every other
//! participant until all are mutually confirmed; it then prints READY
//! to stderr and exits 0. Any fatal condition (bad hostfile, identity
//! not found, unresolvable peer, timeout) produces a diagnostic and a
//! non-zero exit.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};

use muster_core::config::MusterConfig;
use muster_core::hostfile::{local_hostname, Hostfile};
use muster_engine::{HandshakeEngine, PeerRegistry};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(hostfile_path), None) = (args.next(), args.next()) else {
        eprintln!("Usage: musterd <hostfile>");
        return ExitCode::from(2);
    };

    match run(Path::new(&hostfile_path)).await {
        Ok(()) => {
            // Sentinel for whatever supervises the process; everything
            // else goes through tracing.
            eprintln!("READY");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(hostfile_path: &Path) -> Result<()> {
    let config = MusterConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MusterConfig::default()
    });

    let hostfile = Hostfile::load(hostfile_path, config.network.port)
        .context("failed to read hostfile")?;

    let hostname = local_hostname().context("failed to determine local hostname")?;
    let local_id = hostfile.local_id(&hostname)?;
    tracing::info!(
        local = local_id,
        host = %hostname,
        total = hostfile.total(),
        "identity established"
    );

    let registry = Arc::new(PeerRegistry::new(local_id, hostfile.total()));
    let mut local_port = config.network.port;
    for entry in hostfile.entries() {
        if entry.id == local_id {
            local_port = entry.port;
        }
        registry.add_peer(entry.id, &entry.hostname, entry.port);
    }

    let engine = HandshakeEngine::new(registry, local_port, config.timing.clone());
    engine.run().await?;
    Ok(())
}
