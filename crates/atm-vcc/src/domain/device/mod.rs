//! # Device Registry
//!
//! Registered adapters, their address lists and counters, and the linkage
//! between devices and the VCCs bound to them.

mod addresses;
mod entity;
mod registry;
mod stats;

pub use addresses::{AddressList, AddressRegistry};
pub use entity::{AtmDevice, CiRange, DeviceDefaults, DeviceSpec, LineStatus};
pub use registry::{Deregistration, DeviceRegistry, FIRST_UNRESERVED_VCI};
pub use stats::{AalCounters, AalStats, DeviceCounters, DeviceStats};
