//! muster-engine — peer registry, address resolution, and the
//! handshake engine that drives a rendezvous run.

pub mod engine;
pub mod registry;
pub mod resolve;

pub use engine::{EngineError, HandshakeEngine};
pub use registry::{Peer, PeerRegistry, RegistryStatus};
