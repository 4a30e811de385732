//! muster integration test harness.
//!
//! Scenarios run real engines against real UDP sockets on loopback.
//! Timings are shortened so a full rendezvous completes well under a
//! second; the proportions (settle before the first round, a fixed
//! round budget) mirror the production defaults.

use std::sync::Arc;

use muster_core::config::TimingConfig;
use muster_core::ProcessId;
use muster_engine::{EngineError, HandshakeEngine, PeerRegistry};

mod rendezvous;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Shortened timings for loopback runs.
pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        settle_delay_ms: 50,
        round_interval_ms: 50,
        max_rounds: 40,
        resolve_attempts: 2,
        resolve_retry_ms: 20,
        ready_grace_ms: 50,
    }
}

/// Reserve n distinct loopback UDP ports.
///
/// Binds ephemeral sockets to learn free port numbers, then releases
/// them. The tiny window between release and the engine's own bind is
/// tolerable on loopback.
pub fn free_ports(n: usize) -> anyhow::Result<Vec<u16>> {
    let sockets: Vec<std::net::UdpSocket> = (0..n)
        .map(|_| std::net::UdpSocket::bind("127.0.0.1:0"))
        .collect::<std::io::Result<_>>()?;
    sockets
        .iter()
        .map(|s| Ok(s.local_addr()?.port()))
        .collect()
}

/// Registry for process `local` in a group where participant i
/// (1-based) listens on `ports[i - 1]`, all on loopback.
pub fn loopback_registry(local: ProcessId, ports: &[u16]) -> Arc<PeerRegistry> {
    let registry = Arc::new(PeerRegistry::new(local, ports.len() as u32));
    for (i, port) in ports.iter().enumerate() {
        registry.add_peer(i as u32 + 1, "127.0.0.1", *port);
    }
    registry
}

/// Spawn one engine for process `local`, returning its registry handle
/// and the running task.
pub fn spawn_engine(
    local: ProcessId,
    ports: &[u16],
    timing: TimingConfig,
) -> (
    Arc<PeerRegistry>,
    tokio::task::JoinHandle<Result<(), EngineError>>,
) {
    let registry = loopback_registry(local, ports);
    let engine = HandshakeEngine::new(registry.clone(), ports[local as usize - 1], timing);
    (registry, tokio::spawn(engine.run()))
}
