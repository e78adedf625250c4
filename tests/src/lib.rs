//! # ATM VCC Test Suite
//!
//! End-to-end flows across the stack facade, the socket front ends, a
//! loopback adapter and a scripted signaling authority.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── pvc_flows.rs   # device registry, PVC binding, data path
//!     └── svc_flows.rs   # signaling exchanges, listen/accept, teardown
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p atm-tests
//!
//! # With logs
//! RUST_LOG=atm_vcc=debug cargo test -p atm-tests -- --nocapture
//! ```

pub mod integration;
