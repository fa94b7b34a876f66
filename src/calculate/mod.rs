//! Live scoring engine.
//!
//! Pure computations over in-memory snapshots:
//! - BPS per player snapshot
//! - Per-fixture ranking with provisional bonus
//! - Per-manager live totals
//!
//! Nothing here performs I/O or holds shared state, so fixtures and managers
//! can be processed concurrently without coordination.

pub mod aggregate;
pub mod bps;
pub mod ranker;

pub use aggregate::{aggregate_team, build_player_live};
pub use bps::compute_bps;
pub use ranker::rank_match;
