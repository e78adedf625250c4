//! # ATM VCC Management Layer
//!
//! Connection management for an ATM protocol stack: the registry of
//! adapter devices, the virtual channel connections (VCCs) bound to them,
//! buffer admission, QoS negotiation and the exchange with an external
//! signaling authority for switched connections.
//!
//! ## Architecture
//!
//! ```text
//!  PvcSocket / SvcSocket        AuthorityEndpoint
//!          │                           │
//!          ▼                           ▼
//!      Session ──── exchange ────→ SignalingHub
//!          │                           │
//!          ▼                           │
//!  ConnectionOrchestrator          VccTable
//!          │
//!          ▼
//!   DeviceRegistry ──→ DeviceOps (driver)
//! ```
//!
//! Everything hangs off one [`AtmStack`]; several stacks may coexist in a
//! process.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;
pub mod signaling;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ConfigError, StackConfig};
pub use domain::device::{
    AddressList, AtmDevice, CiRange, Deregistration, DeviceCounters, DeviceSpec, LineStatus,
};
pub use domain::vcc::{Channel, Family, Flag, Interrupter, Outcome, TxPdu, VccState};
pub use domain::{Credentials, ErrorKind, VccError};
pub use ports::{Capabilities, DeviceError, DeviceOps, QosChangeMode, VccSocketApi};
pub use service::{AdminCommand, AdminOutput, AtmStack, PvcSocket, Readiness, SvcSocket};
pub use signaling::{AuthorityEndpoint, WaitMode};
