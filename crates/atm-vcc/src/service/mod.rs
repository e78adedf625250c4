//! # Service Layer
//!
//! The socket front ends and the stack facade built on the domain layer.
//!
//! ## Components
//!
//! - `stack`: [`AtmStack`], owner of the registry, the VCC table and the
//!   signaling hub
//! - `session`: data path, options and teardown shared by both front ends
//! - `pvc` / `svc`: the two socket families
//! - `orchestrator`: binding a VCC to a device channel and unwinding it
//! - `admin`: device inspection and configuration commands

pub mod admin;
pub mod orchestrator;
pub mod pvc;
pub mod session;
pub mod stack;
pub mod svc;

pub use admin::{AdminCommand, AdminOutput, CommandCode};
pub use orchestrator::{Attachment, ConnectionOrchestrator, DeviceChoice};
pub use pvc::PvcSocket;
pub use session::{Readiness, Session};
pub use stack::AtmStack;
pub use svc::SvcSocket;
