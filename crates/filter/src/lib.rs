//! Grid-based relevancy filtering with temporal hysteresis.
//!
//! # Invariants
//! - A pair is reported relevant from the first successful distance test
//!   until `frame_count_before_culling` consecutive tests fail.
//! - The distance test is inclusive: an object exactly on its cull radius
//!   is in range.
//! - Relevancy always resolves to a concrete boolean; unknown connections or
//!   objects read as not relevant.
//! - Pairs that are not dirty, not polled every tick, not pending and not due
//!   for a refresh keep their last classification.

mod config;
mod filter;
mod profile;
mod view;

pub use config::{ConfigError, DEFAULT_MAX_CELLS_PER_QUERY, RelevancyConfig};
pub use filter::{FilterStats, FilterUpdate, RelevancyChange, RelevancyFilter};
pub use profile::{
    DEFAULT_PROFILE_NAME, FilterProfile, FilterProfileTable, MAX_PROFILES, ProfileId,
};
pub use view::{ConnectionViewState, RelevancyState};

pub fn crate_info() -> &'static str {
    "netscope-filter v0.1.0"
}
