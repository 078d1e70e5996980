//! In-memory TTL cache for the last-known metrics of every emitter.
//!
//! The cache is a two-level map: origin tag to emitter fingerprint to
//! [`Resource`]. Ingest appends metrics with a per-metric expiry instant and
//! a janitor task sweeps expired metrics, empty resources, and empty origin
//! buckets on a fixed cadence.

mod cache;
mod metric;
mod resource;

pub use cache::{envelope_fingerprint, TtlCache, JANITOR_INTERVAL};
pub use metric::Metric;
pub use resource::Resource;
