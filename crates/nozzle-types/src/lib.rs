//! Loggregator v2 envelope schema as emitted by the RLP gateway.
//!
//! The gateway speaks the JSON encoding of the loggregator v2 protobufs, so
//! 64-bit integer fields may arrive either as JSON numbers or as decimal
//! strings. The models here accept both.

mod envelope;

pub use envelope::{Counter, Envelope, EnvelopeBatch, Gauge, GaugeValue, Message};

/// Envelope tag names consumed by the bridge.
pub mod tags {
    pub const DEPLOYMENT: &str = "deployment";
    pub const JOB: &str = "job";
    pub const INDEX: &str = "index";
    pub const IP: &str = "ip";
    pub const ORIGIN: &str = "origin";
}
