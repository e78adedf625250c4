//! # ATM Types Crate
//!
//! Value types that cross the boundary between the VCC management layer and
//! the outside world.
//!
//! ## Clusters
//!
//! - **Traffic**: `Aal`, `TrafficClass`, `TrafficParams`, `Qos`
//! - **Addressing**: `Ci`, `Itf`, `PvcAddr`, `SvcAddr`, `Sap`, `Esi`
//! - **Signaling wire**: `VccId`, `ReplyCode`, `Action`, `SignalingRequest`,
//!   `AuthorityMessage`, `InboundCall`, `ChannelAssignment`
//!
//! Everything here is plain data (`Serialize`/`Deserialize`) so that a
//! signaling authority running out of process can speak the same contract.

pub mod address;
pub mod errors;
pub mod qos;
pub mod signaling;

pub use address::*;
pub use errors::*;
pub use qos::*;
pub use signaling::*;
