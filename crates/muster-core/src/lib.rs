//! muster-core — shared types, wire format, and hostfile parsing.
//! All other muster crates depend on this one.

pub mod config;
pub mod hostfile;
pub mod wire;

pub use hostfile::{HostEntry, Hostfile, HostfileError};
pub use wire::{Message, MessageKind, ProcessId};
