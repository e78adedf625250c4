//! # VCC Entity & Admission Control
//!
//! The connection object, its lifecycle state, the device-facing channel
//! handle and the transmit/receive budgets.

mod admission;
mod channel;
mod entity;
mod framing;
mod state;
mod table;

pub use admission::{BufferLimits, TxCredit, TxPdu, DEFAULT_BUFFER_BOUND, DEFAULT_MESSAGE_OVERHEAD};
pub(crate) use channel::Binding;
pub use channel::Channel;
pub use entity::{Family, Interrupter, Vcc};
pub use framing::{raw_cell_header, Framing};
pub use state::{Flag, Outcome, VccFlags, VccState};
pub use table::VccTable;
