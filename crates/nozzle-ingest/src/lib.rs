//! Envelope ingestion: UAA authentication, the RLP gateway egress stream,
//! and the nozzle that drains the stream into a bounded channel.

mod error;
mod nozzle;
mod rlp;
mod uaa;

pub use error::IngestError;
pub use nozzle::{Nozzle, ENVELOPE_BUFFER_SIZE};
pub use rlp::RlpGatewayClient;
pub use uaa::UaaClient;
