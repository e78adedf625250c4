//! Ports layer.
//!
//! - Inbound (driving): the socket-level operations offered to users
//! - Outbound (driven): the contract implemented by adapter drivers

pub mod inbound;
pub mod outbound;

pub use inbound::VccSocketApi;
pub use outbound::{Capabilities, DeviceError, DeviceOps, QosChangeMode};
