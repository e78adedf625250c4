//! AAL framing selection.
//!
//! Segmentation itself happens in the driver. The layer only needs to know
//! which statistics bucket a channel counts into and, for raw cells, that the
//! sender is not spoofing another channel's header.

use atm_types::{Aal, Ci};

use crate::domain::device::{AalStats, DeviceStats};
use crate::domain::errors::VccError;

const HDR_VPI_SHIFT: u32 = 20;
const HDR_VPI_MASK: u32 = 0x0ff0_0000;
const HDR_VCI_SHIFT: u32 = 4;
const HDR_VCI_MASK: u32 = 0x000f_fff0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    aal: Aal,
}

impl Framing {
    pub fn for_aal(aal: Aal) -> Self {
        Self { aal }
    }

    pub fn aal(&self) -> Aal {
        self.aal
    }

    pub fn stats<'a>(&self, stats: &'a DeviceStats) -> &'a AalStats {
        stats.for_aal(self.aal)
    }

    /// Raw-cell senders without `privileged` must carry a header naming
    /// their own channel.
    pub fn check_outbound(
        &self,
        vpi: Ci,
        vci: Ci,
        payload: &[u8],
        privileged: bool,
    ) -> Result<(), VccError> {
        if self.aal != Aal::Aal0 || privileged {
            return Ok(());
        }
        let header = payload
            .get(..4)
            .ok_or(VccError::InvalidArgument("raw cell shorter than its header"))?;
        let word = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let expected = (vpi.value().unwrap_or(0) << HDR_VPI_SHIFT)
            | (vci.value().unwrap_or(0) << HDR_VCI_SHIFT);
        if word & (HDR_VPI_MASK | HDR_VCI_MASK) != expected {
            return Err(VccError::InvalidAddress);
        }
        Ok(())
    }
}

/// Builds the first header word of a raw cell for `vpi`/`vci`.
pub fn raw_cell_header(vpi: u32, vci: u32) -> [u8; 4] {
    (((vpi << HDR_VPI_SHIFT) & HDR_VPI_MASK) | ((vci << HDR_VCI_SHIFT) & HDR_VCI_MASK))
        .to_be_bytes()
}
