//! Bounded-retry hostname resolution.
//!
//! Every peer must resolve before discovery starts. A single peer
//! exhausting its attempt budget fails the whole run — coordination
//! cannot proceed with an unreachable participant, so no partial
//! discovery is attempted.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::lookup_host;

use muster_core::config::TimingConfig;

use crate::engine::EngineError;
use crate::registry::PeerRegistry;

/// Resolve one hostname, retrying on failure. The first successful
/// attempt wins.
pub async fn resolve_host(
    hostname: &str,
    port: u16,
    attempts: u32,
    retry_delay: Duration,
) -> Result<SocketAddr, EngineError> {
    let target = format!("{hostname}:{port}");

    for attempt in 1..=attempts {
        match lookup_host(&target).await {
            Ok(mut addrs) => {
                if let Some(addr) = addrs.next() {
                    return Ok(addr);
                }
                tracing::warn!(host = hostname, attempt, "lookup returned no addresses");
            }
            Err(e) => {
                tracing::warn!(
                    host = hostname,
                    attempt,
                    max = attempts,
                    error = %e,
                    "resolution attempt failed"
                );
            }
        }

        if attempt < attempts {
            tokio::time::sleep(retry_delay).await;
        }
    }

    Err(EngineError::Resolve {
        hostname: hostname.to_string(),
        attempts,
    })
}

/// Resolve every peer in the registry, fixing each address on first
/// success.
pub async fn resolve_all(
    registry: &PeerRegistry,
    timing: &TimingConfig,
) -> Result<(), EngineError> {
    let retry = Duration::from_millis(timing.resolve_retry_ms);

    for peer in registry.peers() {
        let addr = resolve_host(&peer.hostname, peer.port, timing.resolve_attempts, retry).await?;
        tracing::info!(peer = peer.id, host = %peer.hostname, addr = %addr, "peer resolved");
        registry.set_addr(peer.id, addr);
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
