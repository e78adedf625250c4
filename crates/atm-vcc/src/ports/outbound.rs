//! # Driven Ports (Outbound SPI)
//!
//! The capability contract every ATM adapter driver implements. The layer
//! calls into it; the driver calls back through the [`Channel`] it was handed
//! at open time to deliver received PDUs.

use atm_types::Qos;
use thiserror::Error;

use crate::domain::vcc::{Channel, TxPdu};

/// Which optional operations a device implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub change_qos: bool,
    pub control: bool,
}

/// How a QoS change is applied by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosChangeMode {
    /// Replace the running parameters.
    Set,
    /// Only check whether the parameters could be applied.
    Probe,
}

/// Abstract interface to an ATM adapter driver.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the layer invokes them from any
/// task, sometimes while a caller is blocked on the same VCC.
///
/// `open`, `close` and `send` are mandatory. The remaining operations have
/// defaults that report [`DeviceError::NotSupported`] and should be paired
/// with the matching [`Capabilities`] flag.
pub trait DeviceOps: Send + Sync {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Prepares the hardware for `channel`. The channel's VPI or VCI may be
    /// unspecified while a PVC is only partially addressed.
    fn open(&self, channel: &Channel) -> Result<(), DeviceError>;

    fn close(&self, channel: &Channel);

    /// Queues one PDU. The PDU's transmit credit is returned to the VCC when
    /// the driver drops it, which it should do once the hardware is done.
    fn send(&self, channel: &Channel, pdu: TxPdu) -> Result<(), DeviceError>;

    fn change_qos(
        &self,
        _channel: &Channel,
        _qos: &Qos,
        _mode: QosChangeMode,
    ) -> Result<(), DeviceError> {
        Err(DeviceError::NotSupported)
    }

    /// Device-specific control command. Returns the number of bytes of `arg`
    /// that carry the answer.
    fn control(&self, _command: u32, _arg: &mut Vec<u8>) -> Result<usize, DeviceError> {
        Err(DeviceError::NotSupported)
    }

    /// Invoked exactly once when the device leaves the registry.
    fn shutdown(&self) {}
}

/// Errors reported by a device driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("operation not supported by device")]
    NotSupported,

    #[error("device busy")]
    Busy,

    #[error("channel rejected by device")]
    ChannelRejected,

    #[error("{0}")]
    Failed(String),
}
