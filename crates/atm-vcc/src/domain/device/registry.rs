//! # Device Registry
//!
//! All registered devices live in one arena keyed by device number, guarded
//! by a single registry-wide lock. The same lock covers each device's list
//! of bound VCCs, so "find the device, pick a channel, link the VCC" is one
//! critical section.
//!
//! A device with VCCs still bound cannot leave immediately; it is marked for
//! deferred shutdown, refuses new bindings, and goes away when the last VCC
//! unlinks.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use atm_types::{Ci, Qos, VccId};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::entity::{AtmDevice, CiRange, DeviceDefaults, DeviceSpec, LineStatus};
use crate::domain::credentials::Credentials;
use crate::domain::errors::VccError;
use crate::domain::vcc::Vcc;

/// VCIs below this value are reserved for signaling and management.
pub const FIRST_UNRESERVED_VCI: u32 = 32;

/// Result of [`DeviceRegistry::deregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deregistration {
    /// No VCC was bound; the device is gone.
    Removed,
    /// VCCs are still bound; the device leaves when the last one unlinks.
    Deferred,
}

#[derive(Debug)]
struct BoundVcc {
    id: VccId,
    vcc: Weak<Vcc>,
    vpi: Ci,
    vci: Ci,
    tx_active: bool,
    rx_active: bool,
}

#[derive(Debug)]
struct DeviceSlot {
    device: Arc<AtmDevice>,
    bound: Vec<BoundVcc>,
    shutdown_pending: bool,
}

impl DeviceSlot {
    fn prune(&mut self) {
        self.bound.retain(|b| b.vcc.strong_count() > 0);
    }

    fn conflicts(&self, vpi: Ci, vci: Ci, qos: &Qos) -> bool {
        self.bound.iter().any(|b| {
            b.vcc.strong_count() > 0
                && b.vpi == vpi
                && b.vci == vci
                && ((b.tx_active && qos.txtp.is_active()) || (b.rx_active && qos.rxtp.is_active()))
        })
    }
}

/// Where the next wildcard channel search starts.
#[derive(Debug, Clone, Copy)]
struct ScanCursor {
    vpi: u32,
    vci: u32,
}

#[derive(Debug)]
struct RegistryInner {
    devices: BTreeMap<u32, DeviceSlot>,
    cursor: ScanCursor,
}

/// The registry of attached ATM adapters.
#[derive(Debug)]
pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
    defaults: DeviceDefaults,
}

impl DeviceRegistry {
    pub fn new(defaults: DeviceDefaults) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                devices: BTreeMap::new(),
                cursor: ScanCursor {
                    vpi: 0,
                    vci: FIRST_UNRESERVED_VCI,
                },
            }),
            defaults,
        }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Registers a device under `number`, or the smallest unused number.
    pub fn register(
        &self,
        spec: DeviceSpec,
        number: Option<u32>,
    ) -> Result<Arc<AtmDevice>, VccError> {
        let mut inner = self.inner.lock();
        let number = match number {
            Some(n) if inner.devices.contains_key(&n) => return Err(VccError::DuplicateId(n)),
            Some(n) => n,
            None => (0..=u32::MAX)
                .find(|n| !inner.devices.contains_key(n))
                .ok_or(VccError::AddressInUse)?,
        };
        let device = Arc::new(AtmDevice::new(number, spec, &self.defaults));
        inner.devices.insert(
            number,
            DeviceSlot {
                device: Arc::clone(&device),
                bound: Vec::new(),
                shutdown_pending: false,
            },
        );
        info!(itf = number, kind = device.kind(), "device registered");
        Ok(device)
    }

    /// Removes a device now, or once its last VCC unlinks.
    pub fn deregister(&self, number: u32) -> Result<Deregistration, VccError> {
        let removed = {
            let mut inner = self.inner.lock();
            let slot = inner
                .devices
                .get_mut(&number)
                .ok_or(VccError::NoSuchDevice(number))?;
            slot.prune();
            if slot.bound.is_empty() {
                inner.devices.remove(&number).map(|slot| slot.device)
            } else {
                slot.shutdown_pending = true;
                None
            }
        };
        match removed {
            Some(device) => {
                Self::finish_shutdown(&device);
                Ok(Deregistration::Removed)
            }
            None => {
                info!(itf = number, "device busy, shutdown deferred");
                Ok(Deregistration::Deferred)
            }
        }
    }

    fn finish_shutdown(device: &AtmDevice) {
        device.mark_removed();
        device.ops().shutdown();
        info!(itf = device.number(), "device deregistered");
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Finds a device that still accepts bindings.
    pub fn find(&self, number: u32) -> Option<Arc<AtmDevice>> {
        let inner = self.inner.lock();
        inner
            .devices
            .get(&number)
            .filter(|slot| !slot.shutdown_pending)
            .map(|slot| Arc::clone(&slot.device))
    }

    /// Registered device numbers in ascending order.
    pub fn ids(&self) -> Vec<u32> {
        self.inner
            .lock()
            .devices
            .iter()
            .filter(|(_, slot)| !slot.shutdown_pending)
            .map(|(n, _)| *n)
            .collect()
    }

    /// Number of live VCCs bound to a device.
    pub fn bound_count(&self, number: u32) -> usize {
        self.inner.lock().devices.get(&number).map_or(0, |slot| {
            slot.bound.iter().filter(|b| b.vcc.strong_count() > 0).count()
        })
    }

    pub fn is_shutdown_pending(&self, number: u32) -> bool {
        self.inner
            .lock()
            .devices
            .get(&number)
            .is_some_and(|slot| slot.shutdown_pending)
    }

    /// Records a new line status and wakes line-status waiters. A device
    /// awaiting deferred shutdown still reports.
    pub fn signal_change(&self, number: u32, status: LineStatus) -> Result<(), VccError> {
        let device = self
            .inner
            .lock()
            .devices
            .get(&number)
            .map(|slot| Arc::clone(&slot.device))
            .ok_or(VccError::NoSuchDevice(number))?;
        debug!(itf = number, ?status, "line status change");
        device.set_line_status(status);
        Ok(())
    }

    /// Waits until the line status of `number` differs from `last_seen`.
    pub async fn wait_line_status_change(
        &self,
        number: u32,
        last_seen: LineStatus,
    ) -> Result<LineStatus, VccError> {
        let device = self.find(number).ok_or(VccError::NoSuchDevice(number))?;
        let mut rx = device.subscribe_line();
        loop {
            if device.is_removed() {
                return Err(VccError::NoSuchDevice(number));
            }
            let status = *rx.borrow_and_update();
            if status != last_seen {
                return Ok(status);
            }
            rx.changed()
                .await
                .map_err(|_| VccError::NoSuchDevice(number))?;
        }
    }

    // =========================================================================
    // VCC LINKAGE
    // =========================================================================

    /// Picks a channel on `number` and links `vcc` to it, all under the
    /// registry lock. Returns the device and the resolved components.
    pub(crate) fn link(
        &self,
        vcc: &Arc<Vcc>,
        number: u32,
        vpi: Ci,
        vci: Ci,
        qos: &Qos,
        credentials: Credentials,
    ) -> Result<(Arc<AtmDevice>, Ci, Ci), VccError> {
        let mut inner = self.inner.lock();
        let RegistryInner { devices, cursor } = &mut *inner;
        let slot = devices
            .get_mut(&number)
            .filter(|slot| !slot.shutdown_pending)
            .ok_or(VccError::NoSuchDevice(number))?;

        let range = slot.device.ci_range();
        range.check(vpi, vci)?;
        if let Ci::Value(v) = vci {
            if v > 0 && v < FIRST_UNRESERVED_VCI && !credentials.bind_service {
                return Err(VccError::PermissionDenied);
            }
        }

        slot.prune();
        let (vpi, vci) = find_ci(slot, cursor, range, vpi, vci, qos)?;
        slot.bound.push(BoundVcc {
            id: vcc.id(),
            vcc: Arc::downgrade(vcc),
            vpi,
            vci,
            tx_active: qos.txtp.is_active(),
            rx_active: qos.rxtp.is_active(),
        });
        debug!(vcc = %vcc.id(), itf = number, %vpi, %vci, "linked to device");
        Ok((Arc::clone(&slot.device), vpi, vci))
    }

    /// Unlinks a VCC. If this completes a deferred shutdown, the device is
    /// removed and shut down.
    pub(crate) fn unlink(&self, number: u32, id: VccId) {
        let finished = {
            let mut inner = self.inner.lock();
            let Some(slot) = inner.devices.get_mut(&number) else {
                return;
            };
            slot.bound.retain(|b| b.id != id && b.vcc.strong_count() > 0);
            if slot.shutdown_pending && slot.bound.is_empty() {
                inner.devices.remove(&number).map(|slot| slot.device)
            } else {
                None
            }
        };
        debug!(vcc = %id, itf = number, "unlinked from device");
        if let Some(device) = finished {
            Self::finish_shutdown(&device);
        }
    }
}

/// Resolves `Any` components to a free channel, or checks a concrete pair
/// for conflicts.
fn find_ci(
    slot: &DeviceSlot,
    cursor: &mut ScanCursor,
    range: CiRange,
    vpi: Ci,
    vci: Ci,
    qos: &Qos,
) -> Result<(Ci, Ci), VccError> {
    if !vpi.is_any() && !vci.is_any() {
        if slot.conflicts(vpi, vci, qos) {
            return Err(VccError::AddressInUse);
        }
        return Ok((vpi, vci));
    }

    let fixed_vpi = (!vpi.is_any()).then_some(vpi);
    let fixed_vci = (!vci.is_any()).then_some(vci);
    let vpi_limit = range.vpi_limit();
    let vci_limit = range.vci_limit();

    if fixed_vpi.is_none() && cursor.vpi >= vpi_limit {
        cursor.vpi = 0;
    }
    if fixed_vci.is_none() && !(FIRST_UNRESERVED_VCI..vci_limit).contains(&cursor.vci) {
        cursor.vci = FIRST_UNRESERVED_VCI;
    }
    let start = (cursor.vpi, cursor.vci);

    loop {
        let candidate_vpi = fixed_vpi.unwrap_or(Ci::Value(cursor.vpi));
        let candidate_vci = fixed_vci.unwrap_or(Ci::Value(cursor.vci));
        if !slot.conflicts(candidate_vpi, candidate_vci, qos) {
            return Ok((candidate_vpi, candidate_vci));
        }

        let mut vci_wrapped = fixed_vci.is_some();
        if fixed_vci.is_none() {
            cursor.vci += 1;
            if cursor.vci >= vci_limit {
                cursor.vci = FIRST_UNRESERVED_VCI;
                vci_wrapped = true;
            }
        }
        if fixed_vpi.is_none() && vci_wrapped {
            cursor.vpi = (cursor.vpi + 1) % vpi_limit;
        }
        if (cursor.vpi, cursor.vci) == start {
            return Err(VccError::AddressInUse);
        }
    }
}
