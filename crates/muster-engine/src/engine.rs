//! Handshake engine — the rendezvous state machine.
//!
//! Owns the UDP endpoint for the run. After binding and resolving every
//! peer it enters discovery: a receive loop answers HELLOs with ACKs
//! and records evidence, while a send loop re-HELLOs unacknowledged
//! peers in bounded rounds. Readiness is a one-shot watch flipped the
//! first time the registry reports both evidence sets full; shutdown is
//! a broadcast the receive loop observes in its select.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch};

use muster_core::config::TimingConfig;
use muster_core::wire::{Message, MessageKind, STATUS_EVERY_ROUNDS};
use muster_core::ProcessId;

use crate::registry::PeerRegistry;
use crate::resolve;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Fatal conditions a rendezvous run can end with.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to resolve {hostname} after {attempts} attempts")]
    Resolve { hostname: String, attempts: u32 },

    #[error("failed to bind UDP endpoint on port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    #[error("timed out after {rounds} rounds without full readiness")]
    Timeout { rounds: u32 },
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Engine lifecycle. Init and Discovering are transient; Ready and
/// Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Discovering,
    Ready,
    Failed,
}

/// Drives one full rendezvous run over an exclusively-owned UDP socket.
pub struct HandshakeEngine {
    registry: Arc<PeerRegistry>,
    port: u16,
    timing: TimingConfig,
    seq: Arc<AtomicU32>,
}

impl HandshakeEngine {
    /// `port` is the local bind port; peer ports come from the registry.
    pub fn new(registry: Arc<PeerRegistry>, port: u16, timing: TimingConfig) -> Self {
        Self {
            registry,
            port,
            timing,
            seq: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Run the rendezvous to completion.
    ///
    /// Returns Ok(()) iff full readiness was reached. The endpoint is
    /// released and both loops joined on every exit path.
    pub async fn run(self) -> Result<(), EngineError> {
        let local = self.registry.local_id();
        let mut phase = Phase::Init;
        tracing::debug!(local, ?phase, port = self.port, "engine starting");

        let socket = Arc::new(bind_endpoint(self.port)?);

        if let Err(e) = resolve::resolve_all(&self.registry, &self.timing).await {
            phase = Phase::Failed;
            tracing::error!(local, ?phase, error = %e, "address resolution failed, run aborted");
            return Err(e);
        }

        phase = Phase::Discovering;
        tracing::info!(
            local,
            ?phase,
            peers = self.registry.total() - 1,
            "all peers resolved, discovery starting"
        );

        let (ready_tx, ready_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let recv_task = tokio::spawn(receive_loop(
            socket.clone(),
            self.registry.clone(),
            self.seq.clone(),
            ready_tx,
            shutdown_rx,
        ));

        let outcome = send_loop(
            socket.clone(),
            self.registry.clone(),
            self.seq.clone(),
            &self.timing,
            ready_rx,
        )
        .await;

        // Hold the receive loop open briefly after success so trailing
        // HELLOs from stragglers still get ACKs.
        if outcome.is_ok() {
            tokio::time::sleep(Duration::from_millis(self.timing.ready_grace_ms)).await;
        }

        let _ = shutdown_tx.send(());
        if let Err(e) = recv_task.await {
            tracing::warn!(local, error = %e, "receive loop did not join cleanly");
        }

        // The registry decides the verdict — an ACK that lands between
        // the final round and the join still completes the run.
        let ready = self.registry.all_ready();
        phase = if ready { Phase::Ready } else { Phase::Failed };
        let status = self.registry.status();
        tracing::info!(
            local,
            ?phase,
            acked = status.acked,
            helloed = status.helloed,
            total = status.total,
            "engine finished"
        );

        if ready {
            Ok(())
        } else {
            outcome
        }
    }
}

/// Create the engine's UDP endpoint. SO_REUSEADDR lets a restarted
/// process rebind the well-known port immediately.
fn bind_endpoint(port: u16) -> Result<UdpSocket, EngineError> {
    let bind = |port: u16| -> std::io::Result<std::net::UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket.bind(&addr.into())?;
        Ok(socket.into())
    };

    let std_socket = bind(port).map_err(|source| EngineError::Bind { port, source })?;
    UdpSocket::from_std(std_socket).map_err(|source| EngineError::Bind { port, source })
}

// ── Receive loop ──────────────────────────────────────────────────────────────

/// Answers HELLOs with ACKs, records evidence, and flips the readiness
/// watch exactly once. Exits when the shutdown broadcast fires.
async fn receive_loop(
    socket: Arc<UdpSocket>,
    registry: Arc<PeerRegistry>,
    seq: Arc<AtomicU32>,
    ready: watch::Sender<bool>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let local = registry.local_id();
    let mut buf = [0u8; 64];

    tracing::debug!(local, "receive loop started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(local, "receive loop shutting down");
                return;
            }

            result = socket.recv_from(&mut buf) => {
                let (len, from) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(local, error = %e, "recv_from failed");
                        continue;
                    }
                };

                let msg = match Message::decode(&buf[..len]) {
                    Ok(m) => m,
                    Err(e) => {
                        // Dropped without touching the registry.
                        tracing::warn!(local, %from, len, error = %e, "malformed datagram dropped");
                        continue;
                    }
                };

                tracing::trace!(local, sender = msg.sender, kind = ?msg.kind, seq = msg.seq, "frame received");

                match msg.kind {
                    MessageKind::Hello => {
                        if registry.record_hello(msg.sender) {
                            tracing::debug!(local, peer = msg.sender, "first HELLO from peer");
                        }
                        // Reply unconditionally, even to peers already
                        // recorded — the exchange is at-least-once and
                        // idempotent.
                        send_ack(&socket, &registry, &seq, msg.sender).await;
                    }
                    MessageKind::Ack => {
                        if registry.record_ack(msg.sender) {
                            tracing::debug!(local, peer = msg.sender, "ACK from peer");
                        }
                    }
                }

                if registry.all_ready() && !*ready.borrow() {
                    tracing::info!(local, "all peers confirmed");
                    let _ = ready.send(true);
                }
            }
        }
    }
}

/// Reply to a HELLO. Senders we cannot address (an id outside the
/// hostfile) are logged and skipped.
async fn send_ack(
    socket: &UdpSocket,
    registry: &PeerRegistry,
    seq: &AtomicU32,
    to: ProcessId,
) {
    let Some(peer) = registry.lookup(to) else {
        tracing::warn!(peer = to, "HELLO from unknown peer id, no ACK sent");
        return;
    };
    let Some(addr) = peer.addr else {
        tracing::warn!(peer = to, "peer address unresolved, no ACK sent");
        return;
    };

    let msg = Message::ack(registry.local_id(), seq.fetch_add(1, Ordering::Relaxed));
    match socket.send_to(&msg.encode(), addr).await {
        Ok(_) => tracing::trace!(peer = to, seq = msg.seq, "ACK sent"),
        Err(e) => tracing::warn!(peer = to, error = %e, "ACK send failed"),
    }
}

// ── Send loop ─────────────────────────────────────────────────────────────────

/// Settles, then broadcasts HELLO to unacknowledged peers in bounded
/// rounds until readiness or the round budget runs out.
async fn send_loop(
    socket: Arc<UdpSocket>,
    registry: Arc<PeerRegistry>,
    seq: Arc<AtomicU32>,
    timing: &TimingConfig,
    mut ready: watch::Receiver<bool>,
) -> Result<(), EngineError> {
    let local = registry.local_id();
    let interval = Duration::from_millis(timing.round_interval_ms);

    // Give peers time to start their own receive loops first.
    tokio::time::sleep(Duration::from_millis(timing.settle_delay_ms)).await;

    tracing::debug!(local, max_rounds = timing.max_rounds, "send loop started");

    for round in 1..=timing.max_rounds {
        if *ready.borrow() {
            tracing::debug!(local, round, "readiness reached, send loop stopping");
            return Ok(());
        }

        for id in registry.awaiting_ack() {
            let Some(peer) = registry.lookup(id) else { continue };
            let Some(addr) = peer.addr else { continue };

            let msg = Message::hello(local, seq.fetch_add(1, Ordering::Relaxed));
            match socket.send_to(&msg.encode(), addr).await {
                Ok(_) => tracing::trace!(local, peer = id, round, seq = msg.seq, "HELLO sent"),
                Err(e) => tracing::warn!(local, peer = id, round, error = %e, "HELLO send failed"),
            }
        }

        if round % STATUS_EVERY_ROUNDS == 0 {
            let status = registry.status();
            tracing::info!(
                local,
                round,
                acked = status.acked,
                helloed = status.helloed,
                total = status.total,
                "rendezvous status"
            );
        }

        // Sleep out the round, waking immediately if readiness flips.
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = ready.changed() => {}
        }
    }

    if *ready.borrow() {
        return Ok(());
    }

    tracing::error!(local, rounds = timing.max_rounds, "timed out waiting for peers");
    Err(EngineError::Timeout {
        rounds: timing.max_rounds,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
