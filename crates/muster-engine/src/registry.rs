//! Peer registry — shared bookkeeping for one rendezvous run.
//!
//! Tracks every configured peer plus the two evidence sets: who has
//! sent us a HELLO, and who has ACKed ours. All access goes through one
//! exclusive lock so readiness is always judged from a consistent view
//! of both sets and the ordered peer list. Purely local bookkeeping —
//! no consensus or ordering guarantee is provided.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use muster_core::ProcessId;

/// One configured peer. Identity is fixed at construction; only the
/// resolved address mutates, and it is set at most once per run.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: ProcessId,
    pub hostname: String,
    pub port: u16,
    pub addr: Option<SocketAddr>,
}

/// Diagnostic counts. No behavioral effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStatus {
    pub acked: usize,
    pub helloed: usize,
    pub total: u32,
}

#[derive(Debug)]
struct Inner {
    peers: Vec<Peer>,
    helloed: BTreeSet<ProcessId>,
    acked: BTreeSet<ProcessId>,
}

/// The peer registry, shared between the send and receive loops.
#[derive(Debug)]
pub struct PeerRegistry {
    local_id: ProcessId,
    total: u32,
    inner: Mutex<Inner>,
}

impl PeerRegistry {
    /// `total` counts every participant, including the local process.
    pub fn new(local_id: ProcessId, total: u32) -> Self {
        Self {
            local_id,
            total,
            inner: Mutex::new(Inner {
                peers: Vec::new(),
                helloed: BTreeSet::new(),
                acked: BTreeSet::new(),
            }),
        }
    }

    /// Append a peer in hostfile order. The local process is never
    /// tracked as its own peer.
    pub fn add_peer(&self, id: ProcessId, hostname: &str, port: u16) {
        if id == self.local_id {
            return;
        }
        self.lock().peers.push(Peer {
            id,
            hostname: hostname.to_string(),
            port,
            addr: None,
        });
    }

    /// Record a HELLO from `id`. Returns true only the first time —
    /// insertion is idempotent, duplicates are no-ops. Ids outside the
    /// peer list are ignored, keeping both sets subsets of peer ids.
    pub fn record_hello(&self, id: ProcessId) -> bool {
        let mut inner = self.lock();
        if !inner.peers.iter().any(|p| p.id == id) {
            return false;
        }
        inner.helloed.insert(id)
    }

    /// Record an ACK from `id`. Idempotent like [`Self::record_hello`].
    pub fn record_ack(&self, id: ProcessId) -> bool {
        let mut inner = self.lock();
        if !inner.peers.iter().any(|p| p.id == id) {
            return false;
        }
        inner.acked.insert(id)
    }

    /// Readiness: every other participant has both greeted us and
    /// acknowledged our greeting.
    pub fn all_ready(&self) -> bool {
        let inner = self.lock();
        let expect = (self.total - 1) as usize;
        inner.acked.len() == expect && inner.helloed.len() == expect
    }

    /// Peers whose ACK we are still missing, in hostfile order.
    pub fn awaiting_ack(&self) -> Vec<ProcessId> {
        let inner = self.lock();
        inner
            .peers
            .iter()
            .filter(|p| !inner.acked.contains(&p.id))
            .map(|p| p.id)
            .collect()
    }

    /// Cloned snapshot of one peer, or None for an unknown id.
    pub fn lookup(&self, id: ProcessId) -> Option<Peer> {
        self.lock().peers.iter().find(|p| p.id == id).cloned()
    }

    /// Record a resolved address. The first write wins — resolution is
    /// never retried once discovery has begun.
    pub fn set_addr(&self, id: ProcessId, addr: SocketAddr) {
        let mut inner = self.lock();
        if let Some(peer) = inner.peers.iter_mut().find(|p| p.id == id) {
            if peer.addr.is_none() {
                peer.addr = Some(addr);
            }
        }
    }

    /// All peers, cloned, in hostfile order.
    pub fn peers(&self) -> Vec<Peer> {
        self.lock().peers.clone()
    }

    pub fn status(&self) -> RegistryStatus {
        let inner = self.lock();
        RegistryStatus {
            acked: inner.acked.len(),
            helloed: inner.helloed.len(),
            total: self.total,
        }
    }

    pub fn local_id(&self) -> ProcessId {
        self.local_id
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding this lock poisons it; the sets are
        // still internally consistent, so recover the guard.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
