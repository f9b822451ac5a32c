//! World-location cache: the spatial state relevancy filters read from.
//!
//! # Invariants
//! - All state changes flow through explicit store operations.
//! - The dirty set is stable between `lock_dirty_list(true)` and
//!   `end_cycle()`; it is cleared exactly once per cycle.

mod store;

pub use store::{
    DEFAULT_MAX_NET_CULL_DISTANCE, LocationConfig, LocationDiagnostics, ObjectLocationStore,
    ObjectRecord, WorldInfo,
};

pub fn crate_info() -> &'static str {
    "netscope-locations v0.1.0"
}
