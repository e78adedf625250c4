//! The device entity.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use atm_types::{Ci, Esi, OC3_PCR};
use parking_lot::Mutex;
use tokio::sync::watch;

use super::addresses::AddressRegistry;
use super::stats::DeviceStats;
use crate::domain::errors::VccError;
use crate::ports::outbound::{Capabilities, DeviceOps};

// =============================================================================
// VALUE TYPES
// =============================================================================

/// Physical line state as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LineStatus {
    #[default]
    Unknown,
    Lost,
    Found,
}

/// Addressable VPI/VCI range of a device, in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CiRange {
    vpi_bits: u8,
    vci_bits: u8,
}

impl CiRange {
    pub const MAX_VPI_BITS: u8 = 12;
    pub const MAX_VCI_BITS: u8 = 16;
    /// Enough VCI space to hold the reserved block plus one channel.
    pub const MIN_VCI_BITS: u8 = 6;

    pub fn new(vpi_bits: u8, vci_bits: u8) -> Result<Self, VccError> {
        if vpi_bits > Self::MAX_VPI_BITS {
            return Err(VccError::InvalidArgument("VPI range wider than 12 bits"));
        }
        if !(Self::MIN_VCI_BITS..=Self::MAX_VCI_BITS).contains(&vci_bits) {
            return Err(VccError::InvalidArgument("VCI range outside 6..=16 bits"));
        }
        Ok(Self { vpi_bits, vci_bits })
    }

    pub fn vpi_bits(&self) -> u8 {
        self.vpi_bits
    }

    pub fn vci_bits(&self) -> u8 {
        self.vci_bits
    }

    /// Number of distinct VPI values.
    pub fn vpi_limit(&self) -> u32 {
        1u32 << self.vpi_bits
    }

    /// Number of distinct VCI values.
    pub fn vci_limit(&self) -> u32 {
        1u32 << self.vci_bits
    }

    /// Concrete components must fit the range; `Unspec` and `Any` always do.
    pub fn check(&self, vpi: Ci, vci: Ci) -> Result<(), VccError> {
        let vpi_ok = vpi.value().map_or(true, |v| v < self.vpi_limit());
        let vci_ok = vci.value().map_or(true, |v| v < self.vci_limit());
        if vpi_ok && vci_ok {
            Ok(())
        } else {
            Err(VccError::CircuitOutOfRange {
                vpi: vpi.value().unwrap_or(0),
                vci: vci.value().unwrap_or(0),
            })
        }
    }
}

impl Default for CiRange {
    fn default() -> Self {
        Self {
            vpi_bits: 8,
            vci_bits: 16,
        }
    }
}

/// Values applied to devices that do not bring their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDefaults {
    pub ci_range: CiRange,
    pub link_rate: u32,
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            ci_range: CiRange::default(),
            link_rate: OC3_PCR,
        }
    }
}

/// What a driver hands to the registry when an adapter attaches.
pub struct DeviceSpec {
    kind: String,
    ops: Arc<dyn DeviceOps>,
    esi: Option<Esi>,
    ci_range: Option<CiRange>,
    link_rate: Option<u32>,
}

impl DeviceSpec {
    pub fn new(kind: impl Into<String>, ops: Arc<dyn DeviceOps>) -> Self {
        Self {
            kind: kind.into(),
            ops,
            esi: None,
            ci_range: None,
            link_rate: None,
        }
    }

    pub fn with_esi(mut self, esi: Esi) -> Self {
        self.esi = Some(esi);
        self
    }

    pub fn with_ci_range(mut self, range: CiRange) -> Self {
        self.ci_range = Some(range);
        self
    }

    pub fn with_link_rate(mut self, cells_per_second: u32) -> Self {
        self.link_rate = Some(cells_per_second);
        self
    }
}

// =============================================================================
// DEVICE
// =============================================================================

/// A registered ATM adapter.
pub struct AtmDevice {
    number: u32,
    kind: String,
    ops: Arc<dyn DeviceOps>,
    esi: Mutex<Option<Esi>>,
    ci_range: Mutex<CiRange>,
    link_rate: AtomicU32,
    stats: Arc<DeviceStats>,
    addresses: Mutex<AddressRegistry>,
    line: watch::Sender<LineStatus>,
    removed: AtomicBool,
}

impl AtmDevice {
    pub(crate) fn new(number: u32, spec: DeviceSpec, defaults: &DeviceDefaults) -> Self {
        let (line, _) = watch::channel(LineStatus::Unknown);
        Self {
            number,
            kind: spec.kind,
            ops: spec.ops,
            esi: Mutex::new(spec.esi),
            ci_range: Mutex::new(spec.ci_range.unwrap_or(defaults.ci_range)),
            link_rate: AtomicU32::new(spec.link_rate.unwrap_or(defaults.link_rate)),
            stats: Arc::new(DeviceStats::default()),
            addresses: Mutex::new(AddressRegistry::new()),
            line,
            removed: AtomicBool::new(false),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Driver type tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn ops(&self) -> &Arc<dyn DeviceOps> {
        &self.ops
    }

    pub fn capabilities(&self) -> Capabilities {
        self.ops.capabilities()
    }

    pub fn esi(&self) -> Option<Esi> {
        *self.esi.lock()
    }

    /// Sets the end-system identifier. Without `force` an already set ESI is
    /// left alone and `AddressInUse` is returned.
    pub fn set_esi(&self, esi: Esi, force: bool) -> Result<(), VccError> {
        let mut current = self.esi.lock();
        if current.is_some() && !force {
            return Err(VccError::AddressInUse);
        }
        *current = Some(esi);
        Ok(())
    }

    pub fn ci_range(&self) -> CiRange {
        *self.ci_range.lock()
    }

    pub fn set_ci_range(&self, range: CiRange) {
        *self.ci_range.lock() = range;
    }

    /// Link rate in cells per second.
    pub fn link_rate(&self) -> u32 {
        self.link_rate.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> &Arc<DeviceStats> {
        &self.stats
    }

    /// Runs `f` with the device's address lists locked.
    pub fn with_addresses<R>(&self, f: impl FnOnce(&mut AddressRegistry) -> R) -> R {
        f(&mut self.addresses.lock())
    }

    pub fn line_status(&self) -> LineStatus {
        *self.line.borrow()
    }

    pub(crate) fn subscribe_line(&self) -> watch::Receiver<LineStatus> {
        self.line.subscribe()
    }

    pub(crate) fn set_line_status(&self, status: LineStatus) {
        self.line.send_replace(status);
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Final removal: wakes line-status waiters so they can observe it.
    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
        self.line.send_modify(|_| {});
    }
}

impl fmt::Debug for AtmDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtmDevice")
            .field("number", &self.number)
            .field("kind", &self.kind)
            .field("ci_range", &self.ci_range())
            .field("link_rate", &self.link_rate())
            .finish_non_exhaustive()
    }
}
