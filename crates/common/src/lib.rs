//! Shared types for the netscope relevancy engine.
//!
//! # Invariants
//! - Handles are dense integers owned by the replication system; storage
//!   keyed by them grows and never shrinks.
//! - Bit sets read as clear outside their current length.

mod bitset;
mod bounds;
mod ids;

pub use bitset::{NetBitSet, SetBits};
pub use bounds::{DEFAULT_WORLD_HALF_EXTENT, WorldBounds};
pub use ids::{ConnectionId, FilterHandle, ObjectIndex};

pub fn crate_info() -> &'static str {
    "netscope-common v0.1.0"
}
