//! File-based artifact store with size-budget eviction
//!
//! A single flat directory of immutable, identifier-named files. The
//! directory itself is the index: existence, total size and age are all
//! answered by looking at disk, so there is nothing to rebuild after a
//! crash. New artifacts are written to a staging directory and renamed into
//! place, and concurrent producers of the same artifact are coalesced.

mod error;
mod eviction;
mod in_flight;
mod store;
mod types;

pub use error::{Result, StoreError};
pub use eviction::EvictionPolicy;
pub use in_flight::InFlight;
pub use store::{ArtifactStore, STAGING_DIR};
pub use types::{ArtifactEntry, StoreStats};
