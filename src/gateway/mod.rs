//! High-level gateway API
//!
//! Wires a schema, a routing table and a worker pool together.

mod builder;

pub use builder::{Gateway, GatewayBuilder, RunningGateway};
