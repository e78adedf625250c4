//! # Connection Orchestrator
//!
//! Shared connect/release logic binding a VCC to a device channel, used by
//! both front ends. Any failure after the VCC has been linked to a device is
//! unwound before the error is returned.

use std::sync::Arc;

use atm_types::Ci;
use tracing::{debug, info};

use crate::domain::device::DeviceRegistry;
use crate::domain::errors::VccError;
use crate::domain::qos;
use crate::domain::vcc::{Binding, Channel, Framing, Vcc};

/// Which device a connect may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChoice {
    Device(u32),
    Any,
}

/// How far a connect got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Both VPI and VCI are known; the channel is open.
    Complete,
    /// One component is still unspecified.
    Partial,
}

#[derive(Debug, Clone)]
pub struct ConnectionOrchestrator {
    registry: Arc<DeviceRegistry>,
}

impl ConnectionOrchestrator {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Binds `vcc` to a channel, replacing any previous binding.
    pub fn connect(
        &self,
        vcc: &Arc<Vcc>,
        device: DeviceChoice,
        vpi: Ci,
        vci: Ci,
    ) -> Result<Attachment, VccError> {
        if vpi == Ci::Value(0) && vci == Ci::Value(0) {
            return Err(VccError::InvalidArgument("VPI and VCI are both zero"));
        }
        if vpi.is_unspec() && vci.is_unspec() {
            return Err(VccError::InvalidAddress);
        }
        let partial = vpi.is_unspec() || vci.is_unspec();
        if partial && vcc.is_partial() {
            return Err(VccError::InvalidArgument("address is already partial"));
        }

        if vcc.is_bound_to_device() {
            self.detach(vcc);
        }
        match device {
            DeviceChoice::Device(number) => self.connect_to_device(vcc, number, vpi, vci)?,
            DeviceChoice::Any => self.connect_to_any(vcc, vpi, vci)?,
        }
        Ok(if partial {
            Attachment::Partial
        } else {
            Attachment::Complete
        })
    }

    /// Links `vcc` to device `number` and opens the channel.
    pub fn connect_to_device(
        &self,
        vcc: &Arc<Vcc>,
        number: u32,
        vpi: Ci,
        vci: Ci,
    ) -> Result<(), VccError> {
        let mut adjusted = vcc.qos();
        qos::adjust_both(&mut adjusted)?;
        qos::validate(&adjusted)?;

        let (device, vpi, vci) =
            self.registry
                .link(vcc, number, vpi, vci, &adjusted, vcc.credentials())?;
        let framing = Framing::for_aal(adjusted.aal);
        let channel = Channel::new(vcc, &device, vpi, vci, adjusted.clone(), framing);
        vcc.install_binding(Binding {
            device: Arc::clone(&device),
            vpi,
            vci,
            framing,
            channel: channel.clone(),
        });

        // A partial address is linked but not opened until it is completed.
        if vpi.is_unspec() || vci.is_unspec() {
            vcc.set_qos(adjusted);
            debug!(vcc = %vcc.id(), itf = number, %vpi, %vci, "partial channel linked");
            return Ok(());
        }
        if let Err(err) = device.ops().open(&channel) {
            debug!(vcc = %vcc.id(), itf = number, error = %err, "device refused channel");
            vcc.take_binding();
            self.registry.unlink(number, vcc.id());
            return Err(err.into());
        }
        vcc.set_qos(adjusted);
        debug!(vcc = %vcc.id(), itf = number, %vpi, %vci, "channel open");
        Ok(())
    }

    /// Tries every registered device in order until one accepts.
    pub fn connect_to_any(&self, vcc: &Arc<Vcc>, vpi: Ci, vci: Ci) -> Result<(), VccError> {
        let mut last = VccError::NoSuchDevice(0);
        for number in self.registry.ids() {
            match self.connect_to_device(vcc, number, vpi, vci) {
                Ok(()) => return Ok(()),
                Err(err) => last = err,
            }
        }
        Err(last)
    }

    /// Closes the channel and unlinks `vcc` from its device. If this was the
    /// last VCC of a device awaiting shutdown, the device goes away.
    pub fn detach(&self, vcc: &Vcc) {
        let Some(binding) = vcc.take_binding() else {
            return;
        };
        if !binding.vpi.is_unspec() && !binding.vci.is_unspec() {
            binding.device.ops().close(&binding.channel);
        }
        let number = binding.device.number();
        drop(binding);
        self.registry.unlink(number, vcc.id());
        if self.registry.find(number).is_none() {
            info!(vcc = %vcc.id(), itf = number, "detached from departing device");
        } else {
            debug!(vcc = %vcc.id(), itf = number, "detached");
        }
    }
}
