//! # Error Types
//!
//! One error enum for every operation of the layer. Each variant belongs to
//! exactly one [`ErrorKind`], which is what callers usually branch on.

use atm_types::{AddressError, ReplyCode, VccId};
use thiserror::Error;

use crate::domain::vcc::VccState;
use crate::ports::outbound::DeviceError;

/// Broad category of a [`VccError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unsupported request.
    Protocol,
    /// Operation does not fit the VCC's lifecycle state.
    State,
    /// Device, address or channel resources.
    Resource,
    /// Send bound reached; retry later.
    Admission,
    /// No signaling authority attached, or it went away.
    SignalingUnavailable,
    /// The authority answered with a negative outcome.
    Rejected,
    /// A blocking wait was cancelled.
    Interrupted,
    /// Elevated privilege required.
    PermissionDenied,
}

/// Errors returned by the VCC layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VccError {
    // -------------------------------------------------------------------------
    // Protocol
    // -------------------------------------------------------------------------
    #[error("invalid QoS parameters")]
    InvalidQos,

    #[error("max SDU {requested} exceeds AAL ceiling {ceiling}")]
    TooLarge { requested: u32, ceiling: u32 },

    #[error("message of {size} bytes exceeds max SDU {max_sdu}")]
    MessageTooLarge { size: usize, max_sdu: u32 },

    #[error("invalid address")]
    InvalidAddress,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("operation not valid in state {0:?}")]
    BadState(VccState),

    #[error("operation not supported")]
    NotSupported,

    #[error("no VCC with identity {0}")]
    UnknownVcc(VccId),

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------
    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("connect already in progress")]
    AlreadyInProgress,

    #[error("connect in progress")]
    InProgress,

    #[error("listener closed")]
    ListenerClosed,

    #[error("connection released by the signaling authority")]
    Released,

    // -------------------------------------------------------------------------
    // Resource
    // -------------------------------------------------------------------------
    #[error("no such device: {0}")]
    NoSuchDevice(u32),

    #[error("device number {0} already registered")]
    DuplicateId(u32),

    #[error("address already present")]
    DuplicateAddress,

    #[error("address not found")]
    AddressNotFound,

    #[error("address in use")]
    AddressInUse,

    #[error("channel {vpi}.{vci} outside the device range")]
    CircuitOutOfRange { vpi: u32, vci: u32 },

    #[error("device failure: {0}")]
    Device(DeviceError),

    // -------------------------------------------------------------------------
    // Admission
    // -------------------------------------------------------------------------
    #[error("send bound reached")]
    Busy,

    #[error("operation would block")]
    WouldBlock,

    // -------------------------------------------------------------------------
    // Signaling
    // -------------------------------------------------------------------------
    #[error("signaling authority unreachable")]
    Unreachable,

    #[error("rejected by signaling authority: {0}")]
    Rejected(ReplyCode),

    #[error("interrupted")]
    Interrupted,

    #[error("permission denied")]
    PermissionDenied,
}

impl VccError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VccError::InvalidQos
            | VccError::TooLarge { .. }
            | VccError::MessageTooLarge { .. }
            | VccError::InvalidAddress
            | VccError::InvalidArgument(_)
            | VccError::BadState(_)
            | VccError::NotSupported
            | VccError::UnknownVcc(_) => ErrorKind::Protocol,
            VccError::AlreadyConnected
            | VccError::NotConnected
            | VccError::AlreadyInProgress
            | VccError::InProgress
            | VccError::ListenerClosed
            | VccError::Released => ErrorKind::State,
            VccError::NoSuchDevice(_)
            | VccError::DuplicateId(_)
            | VccError::DuplicateAddress
            | VccError::AddressNotFound
            | VccError::AddressInUse
            | VccError::CircuitOutOfRange { .. }
            | VccError::Device(_) => ErrorKind::Resource,
            VccError::Busy | VccError::WouldBlock => ErrorKind::Admission,
            VccError::Unreachable => ErrorKind::SignalingUnavailable,
            VccError::Rejected(_) => ErrorKind::Rejected,
            VccError::Interrupted => ErrorKind::Interrupted,
            VccError::PermissionDenied => ErrorKind::PermissionDenied,
        }
    }

    /// Wire code reported to the signaling authority for this error.
    pub fn reply_code(&self) -> ReplyCode {
        match self {
            VccError::Rejected(code) => *code,
            VccError::NoSuchDevice(_) => ReplyCode::NO_DEVICE,
            VccError::AddressInUse | VccError::DuplicateId(_) | VccError::DuplicateAddress => {
                ReplyCode::ADDRESS_IN_USE
            }
            VccError::Busy | VccError::WouldBlock => ReplyCode::BUSY,
            VccError::PermissionDenied => ReplyCode::NOT_PERMITTED,
            VccError::NotSupported => ReplyCode::NOT_SUPPORTED,
            VccError::Unreachable => ReplyCode::UNREACHABLE,
            VccError::Interrupted => ReplyCode::INTERRUPTED,
            VccError::Released | VccError::ListenerClosed => ReplyCode::CONNECTION_RESET,
            VccError::Device(DeviceError::Busy) => ReplyCode::BUSY,
            _ => ReplyCode::INVALID,
        }
    }
}

impl From<DeviceError> for VccError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::NotSupported => VccError::NotSupported,
            DeviceError::Busy => VccError::Busy,
            other => VccError::Device(other),
        }
    }
}

impl From<AddressError> for VccError {
    fn from(_: AddressError) -> Self {
        VccError::InvalidAddress
    }
}
