//! Device-facing view of a bound VCC.

use std::fmt;
use std::sync::{Arc, Weak};

use atm_types::{Aal, Ci, Qos, VccId};
use bytes::Bytes;
use tracing::warn;

use super::entity::Vcc;
use super::framing::Framing;
use crate::domain::device::{AtmDevice, DeviceStats};

/// Handle a driver receives at open time. Drivers may keep it to deliver
/// received PDUs; it does not keep the VCC alive.
#[derive(Clone)]
pub struct Channel {
    vcc: Weak<Vcc>,
    id: VccId,
    itf: u32,
    vpi: Ci,
    vci: Ci,
    qos: Qos,
    framing: Framing,
    stats: Arc<DeviceStats>,
}

impl Channel {
    pub(crate) fn new(
        vcc: &Arc<Vcc>,
        device: &AtmDevice,
        vpi: Ci,
        vci: Ci,
        qos: Qos,
        framing: Framing,
    ) -> Self {
        Self {
            vcc: Arc::downgrade(vcc),
            id: vcc.id(),
            itf: device.number(),
            vpi,
            vci,
            qos,
            framing,
            stats: Arc::clone(device.stats()),
        }
    }

    pub fn id(&self) -> VccId {
        self.id
    }

    pub fn itf(&self) -> u32 {
        self.itf
    }

    pub fn vpi(&self) -> Ci {
        self.vpi
    }

    pub fn vci(&self) -> Ci {
        self.vci
    }

    /// QoS as adjusted at bind time.
    pub fn qos(&self) -> &Qos {
        &self.qos
    }

    pub fn aal(&self) -> Aal {
        self.framing.aal()
    }

    /// Whether the VCC behind this channel still exists.
    pub fn is_attached(&self) -> bool {
        self.vcc.strong_count() > 0
    }

    /// Hands a received PDU to the VCC. Returns false if it was dropped
    /// because the VCC is gone or its receive bound is reached.
    pub fn deliver(&self, pdu: Bytes) -> bool {
        let stats = self.framing.stats(&self.stats);
        let Some(vcc) = self.vcc.upgrade() else {
            stats.record_rx_drop();
            return false;
        };
        if !vcc.charge_receive(pdu.len()) {
            stats.record_rx_drop();
            warn!(vcc = %self.id, size = pdu.len(), "receive bound reached, dropping PDU");
            return false;
        }
        stats.record_rx();
        vcc.push_received(pdu);
        true
    }

    /// Counts a PDU the driver had to discard as corrupt.
    pub fn record_rx_error(&self) {
        self.framing.stats(&self.stats).record_rx_error();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("itf", &self.itf)
            .field("vpi", &self.vpi)
            .field("vci", &self.vci)
            .field("aal", &self.framing.aal())
            .finish()
    }
}

/// A VCC's hold on a device. The `Arc` keeps the device alive while bound.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) device: Arc<AtmDevice>,
    pub(crate) vpi: Ci,
    pub(crate) vci: Ci,
    pub(crate) framing: Framing,
    pub(crate) channel: Channel,
}
