//! # Signaling Session Adapter
//!
//! Encodes SVC lifecycle actions as asynchronous request/reply exchanges with
//! an external signaling authority.
//!
//! ```text
//! IDLE ──enqueue──→ PENDING ──reply──→ RESOLVED(code)
//!                      │
//!                      └──authority detached──→ UNREACHABLE
//! ```
//!
//! The authority attaches through [`SignalingHub::attach`] and talks to the
//! layer through the returned [`AuthorityEndpoint`].

mod endpoint;
pub(crate) mod exchange;
mod hub;

pub use endpoint::AuthorityEndpoint;
pub use exchange::WaitMode;
pub use hub::SignalingHub;
