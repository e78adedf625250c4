//! # Admission Control
//!
//! Transmit admission charges a per-VCC budget against the negotiated send
//! bound. An admitted PDU owns a [`TxCredit`]; dropping the credit (normally
//! inside the driver once the hardware is done) returns the charge exactly
//! once and wakes blocked writers.
//!
//! Received PDUs are charged against the receive bound in the same way and
//! uncharged when the session consumes them.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use bytes::Bytes;

use super::entity::Vcc;
use crate::domain::errors::VccError;

/// Default send and receive bound in bytes.
pub const DEFAULT_BUFFER_BOUND: usize = 212_992;

/// Bookkeeping overhead charged per message on top of its size.
pub const DEFAULT_MESSAGE_OVERHEAD: usize = 256;

/// Negotiated buffer bounds of one VCC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub send_bound: usize,
    pub receive_bound: usize,
    pub message_overhead: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            send_bound: DEFAULT_BUFFER_BOUND,
            receive_bound: DEFAULT_BUFFER_BOUND,
            message_overhead: DEFAULT_MESSAGE_OVERHEAD,
        }
    }
}

// =============================================================================
// TRANSMIT CREDIT
// =============================================================================

/// A charge against a VCC's transmit budget. Released on drop.
pub struct TxCredit {
    vcc: Weak<Vcc>,
    amount: usize,
}

impl TxCredit {
    pub fn amount(&self) -> usize {
        self.amount
    }
}

impl Drop for TxCredit {
    fn drop(&mut self) {
        if let Some(vcc) = self.vcc.upgrade() {
            vcc.release_transmit(self.amount);
        }
    }
}

impl fmt::Debug for TxCredit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxCredit").field("amount", &self.amount).finish()
    }
}

/// An admitted outbound PDU.
#[derive(Debug)]
pub struct TxPdu {
    payload: Bytes,
    credit: TxCredit,
}

impl TxPdu {
    pub fn new(payload: Bytes, credit: TxCredit) -> Self {
        Self { payload, credit }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes charged against the transmit budget.
    pub fn charged(&self) -> usize {
        self.credit.amount()
    }

    /// Transmission finished: returns the credit and hands back the payload.
    pub fn complete(self) -> Bytes {
        self.payload
    }
}

// =============================================================================
// ADMISSION ON THE VCC
// =============================================================================

impl Vcc {
    /// Charges `size` bytes against the transmit budget.
    ///
    /// An empty budget admits anything, so the first PDU on a VCC is never
    /// refused. Otherwise the PDU must fit together with the per-message
    /// overhead.
    pub fn admit_for_transmit(self: &Arc<Self>, size: usize) -> Result<TxCredit, VccError> {
        let bound = self.limits.send_bound;
        let overhead = self.limits.message_overhead;
        let mut current = self.tx_budget.load(Ordering::Acquire);
        loop {
            if current != 0 && current.saturating_add(size).saturating_add(overhead) > bound {
                return Err(VccError::Busy);
            }
            match self.tx_budget.compare_exchange_weak(
                current,
                current.saturating_add(size),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        Ok(TxCredit {
            vcc: Arc::downgrade(self),
            amount: size,
        })
    }

    /// Whether a PDU of `size` bytes would currently be admitted.
    pub fn transmit_has_room(&self, size: usize) -> bool {
        let current = self.tx_budget.load(Ordering::Acquire);
        current == 0
            || current.saturating_add(size).saturating_add(self.limits.message_overhead)
                <= self.limits.send_bound
    }

    /// Bytes currently charged against the transmit budget.
    pub fn tx_budget(&self) -> usize {
        self.tx_budget.load(Ordering::Acquire)
    }

    /// Space left under the send bound.
    pub fn transmit_space(&self) -> usize {
        self.limits.send_bound.saturating_sub(self.tx_budget())
    }

    fn release_transmit(&self, amount: usize) {
        let _ = self
            .tx_budget
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(amount))
            });
        self.wake();
    }

    /// Charges a received PDU; false if it would exceed the receive bound.
    pub(crate) fn charge_receive(&self, size: usize) -> bool {
        let bound = self.limits.receive_bound;
        self.rx_budget
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                let next = v.saturating_add(size);
                (next <= bound).then_some(next)
            })
            .is_ok()
    }

    /// Returns the charge of a consumed received PDU.
    pub fn release_receive_credit(&self, size: usize) {
        let _ = self
            .rx_budget
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(size))
            });
    }

    pub fn rx_budget(&self) -> usize {
        self.rx_budget.load(Ordering::Acquire)
    }
}
