//! # Domain Layer
//!
//! Connection management logic with no knowledge of concrete drivers or of
//! the signaling transport.
//!
//! ## Components
//!
//! - `device`: device registry, address lists, per-AAL counters
//! - `vcc`: the VCC entity, its state machine and buffer admission
//! - `qos`: traffic parameter validation and adjustment
//! - `errors`: `VccError` and its reply-code mapping

pub mod credentials;
pub mod device;
pub mod errors;
pub mod qos;
pub mod vcc;

pub use credentials::Credentials;
pub use errors::{ErrorKind, VccError};
