//! # fpl-live
//!
//! Live scoring and bonus prediction for fantasy football gameweeks.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (stat snapshots, scored players, squads, totals)
//! - **calculate**: BPS calculator, match ranker and team aggregator
//! - **fetch**: Snapshot providers (HTTP, file, mock)
//! - **sync**: Live polling coordinator
//! - **storage**: Derived-result store and refresh history
//! - **cache**: TTL cache with an injectable clock
//! - **api**: REST API endpoints
//! - **config**: Configuration loading and validation

pub mod api;
pub mod cache;
pub mod calculate;
pub mod config;
pub mod fetch;
pub mod models;
pub mod storage;
pub mod sync;

pub use models::*;

use std::time::Duration;

/// Parse a human-friendly duration string (e.g., "15s", "500ms", "2m", "1h").
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(n) = s.strip_suffix("ms") {
        return n.trim().parse().ok().map(Duration::from_millis);
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        // Bare numbers are seconds
        (s, 1)
    };

    let num: u64 = num_str.trim().parse().ok()?;
    num.checked_mul(multiplier).map(Duration::from_secs)
}
