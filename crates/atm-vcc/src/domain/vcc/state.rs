//! Lifecycle state, orthogonal flags and exchange outcome of a VCC.

use std::sync::atomic::{AtomicU16, AtomicU8, Ordering};

use atm_types::ReplyCode;

// =============================================================================
// PRIMARY LIFECYCLE
// =============================================================================

/// Primary lifecycle state.
///
/// A partially addressed PVC is `Bound`; listening is a flag on top of
/// `Unconnected` or `Bound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VccState {
    Unconnected = 0,
    BindPending = 1,
    Bound = 2,
    ConnectPending = 3,
    Connected = 4,
    Closing = 5,
    Released = 6,
}

impl VccState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => VccState::BindPending,
            2 => VccState::Bound,
            3 => VccState::ConnectPending,
            4 => VccState::Connected,
            5 => VccState::Closing,
            6 => VccState::Released,
            _ => VccState::Unconnected,
        }
    }
}

#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: VccState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> VccState {
        VccState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: VccState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves from `from` to `to`; false if the state was something else.
    pub(crate) fn transition(&self, from: VccState, to: VccState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// =============================================================================
// ORTHOGONAL FLAGS
// =============================================================================

/// Booleans that may coexist with any primary state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Flag {
    HasQos = 1 << 0,
    Listening = 1 << 1,
    /// The signaling authority knows this VCC.
    Registered = 1 << 2,
    /// A release arrived and has not yet been cleaned up.
    Hangup = 1 << 3,
    /// Cell loss priority bit for outbound cells.
    Clp = 1 << 4,
}

#[derive(Debug, Default)]
pub struct VccFlags(AtomicU16);

impl VccFlags {
    /// Sets `flag` and returns whether it was already set.
    pub fn set(&self, flag: Flag) -> bool {
        self.0.fetch_or(flag as u16, Ordering::AcqRel) & flag as u16 != 0
    }

    /// Clears `flag` and returns whether it was set.
    pub fn clear(&self, flag: Flag) -> bool {
        self.0.fetch_and(!(flag as u16), Ordering::AcqRel) & flag as u16 != 0
    }

    pub fn test(&self, flag: Flag) -> bool {
        self.0.load(Ordering::Acquire) & flag as u16 != 0
    }

    pub fn assign(&self, flag: Flag, on: bool) {
        if on {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }
}

// =============================================================================
// EXCHANGE OUTCOME
// =============================================================================

/// Outcome of the last signaling round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    Idle,
    /// A request is outstanding.
    Pending,
    Resolved(ReplyCode),
}

impl Outcome {
    pub fn is_pending(self) -> bool {
        matches!(self, Outcome::Pending)
    }

    /// Negative resolution, if any.
    pub fn failure(self) -> Option<ReplyCode> {
        match self {
            Outcome::Resolved(code) if !code.is_ok() => Some(code),
            _ => None,
        }
    }
}
