//! Core data models for live scoring.

mod ids;
mod scored;
mod snapshot;
mod squad;
mod totals;

pub use ids::*;
pub use scored::*;
pub use snapshot::*;
pub use squad::*;
pub use totals::*;
