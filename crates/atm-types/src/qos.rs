//! # Traffic Parameters
//!
//! QoS records exchanged with devices and the signaling authority. Rate
//! fields are in cells per second; `None` means "not specified by the
//! caller".

use serde::{Deserialize, Serialize};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Size of one ATM cell on the wire.
pub const ATM_CELL_SIZE: u32 = 53;

/// Size of the cell header (including HEC).
pub const ATM_CELL_HEADER: u32 = 5;

/// Payload carried by one cell.
pub const ATM_CELL_PAYLOAD: u32 = 48;

/// Largest SDU accepted on raw (AAL0) channels: one cell minus the HEC byte.
pub const AAL0_MAX_SDU: u32 = ATM_CELL_SIZE - 1;

/// Largest AAL3/4 CPCS PDU.
pub const AAL34_MAX_SDU: u32 = 65_535;

/// Largest AAL5 CPCS PDU.
pub const AAL5_MAX_SDU: u32 = 65_535;

/// Default maximum cell delay variation.
pub const DEFAULT_MAX_CDV: u32 = 9_999;

/// Reserved "no upper bound" peak cell rate.
pub const UNBOUNDED_PCR: u32 = u32::MAX;

/// Line rate of an OC-3 link in cells per second.
pub const OC3_PCR: u32 = 353_207;

// =============================================================================
// ADAPTATION LAYER
// =============================================================================

/// ATM adaptation layer used to frame SDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Aal {
    /// Raw cells.
    Aal0,
    /// AAL3/4.
    Aal34,
    /// AAL5.
    #[default]
    Aal5,
}

impl Aal {
    /// SDU ceiling for this adaptation layer.
    pub const fn max_sdu(self) -> u32 {
        match self {
            Aal::Aal0 => AAL0_MAX_SDU,
            Aal::Aal34 => AAL34_MAX_SDU,
            Aal::Aal5 => AAL5_MAX_SDU,
        }
    }
}

// =============================================================================
// TRAFFIC CLASS & PARAMETERS
// =============================================================================

/// Service category of one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrafficClass {
    /// Direction not used.
    #[default]
    None,
    /// Unspecified bit rate.
    Ubr,
    /// Constant bit rate.
    Cbr,
    /// Variable bit rate.
    Vbr,
    /// Available bit rate.
    Abr,
    /// Wildcard, only meaningful while negotiating.
    Any,
}

/// Traffic parameters for one direction of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrafficParams {
    pub class: TrafficClass,
    /// Upper bound of the peak cell rate.
    pub max_pcr: Option<u32>,
    /// Desired peak cell rate.
    pub pcr: Option<u32>,
    /// Lower bound of the peak cell rate.
    pub min_pcr: Option<u32>,
    /// Maximum cell delay variation.
    pub max_cdv: Option<u32>,
    /// Maximum SDU size in bytes.
    pub max_sdu: Option<u32>,
}

impl TrafficParams {
    pub fn new(class: TrafficClass) -> Self {
        Self {
            class,
            ..Self::default()
        }
    }

    /// Unspecified bit rate with no rate bounds.
    pub fn ubr() -> Self {
        Self::new(TrafficClass::Ubr)
    }

    /// Constant bit rate at `pcr` cells per second.
    pub fn cbr(pcr: u32) -> Self {
        Self::new(TrafficClass::Cbr).with_pcr(pcr)
    }

    pub fn with_pcr(mut self, pcr: u32) -> Self {
        self.pcr = Some(pcr);
        self
    }

    pub fn with_max_pcr(mut self, max_pcr: u32) -> Self {
        self.max_pcr = Some(max_pcr);
        self
    }

    pub fn with_min_pcr(mut self, min_pcr: u32) -> Self {
        self.min_pcr = Some(min_pcr);
        self
    }

    pub fn with_max_sdu(mut self, max_sdu: u32) -> Self {
        self.max_sdu = Some(max_sdu);
        self
    }

    pub fn with_max_cdv(mut self, max_cdv: u32) -> Self {
        self.max_cdv = Some(max_cdv);
        self
    }

    /// True unless the direction is switched off.
    pub fn is_active(&self) -> bool {
        self.class != TrafficClass::None
    }
}

/// Quality of service for both directions of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Qos {
    /// Transmit direction.
    pub txtp: TrafficParams,
    /// Receive direction.
    pub rxtp: TrafficParams,
    pub aal: Aal,
}

impl Qos {
    pub fn new(aal: Aal, txtp: TrafficParams, rxtp: TrafficParams) -> Self {
        Self { txtp, rxtp, aal }
    }

    /// UBR in both directions.
    pub fn ubr(aal: Aal) -> Self {
        Self::new(aal, TrafficParams::ubr(), TrafficParams::ubr())
    }
}
