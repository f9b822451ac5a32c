//! Replication tick driver for relevancy filtering.
//!
//! Owns the world-location store and the relevancy filters, polls world info
//! from the owning application and reports which (connection, object) pairs
//! became relevant or irrelevant each tick.
//!
//! # Invariants
//! - Tick phases run in a fixed order: poll, lock, filter, report,
//!   `end_cycle`, unlock.
//! - No location state changes between the lock and `end_cycle`.
//! - Objects without a filter are relevant to every connection.

mod driver;
mod source;
mod stats;

#[cfg(test)]
mod scenarios;

pub use driver::{ReplicationDriver, TickReport};
pub use source::WorldInfoSource;
pub use stats::{TickHistory, TickStats};

pub fn crate_info() -> &'static str {
    "netscope-replication v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("replication"));
    }
}
