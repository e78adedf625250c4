//! # Addressing
//!
//! PVC addresses name a channel directly (device, VPI, VCI); SVC addresses
//! are opaque end-system addresses that only the signaling authority
//! resolves.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::AddressError;

/// Maximum number of digits in a public E.164 address.
pub const E164_MAX_DIGITS: usize = 12;

/// Length of the private (NSAP-format) address part.
pub const NSAP_LEN: usize = 20;

/// End-system identifier carried by every device.
pub type Esi = [u8; 6];

// =============================================================================
// CHANNEL COMPONENTS
// =============================================================================

/// One component (VPI or VCI) of a channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ci {
    /// Left open; the channel stays partially addressed.
    Unspec,
    /// Let the layer pick a free value.
    Any,
    Value(u32),
}

impl Ci {
    pub fn is_unspec(self) -> bool {
        matches!(self, Ci::Unspec)
    }

    pub fn is_any(self) -> bool {
        matches!(self, Ci::Any)
    }

    /// Concrete value, if one is set.
    pub fn value(self) -> Option<u32> {
        match self {
            Ci::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Ci {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ci::Unspec => f.write_str("unspec"),
            Ci::Any => f.write_str("any"),
            Ci::Value(v) => write!(f, "{v}"),
        }
    }
}

/// Device selector of a PVC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Itf {
    /// Any registered device that accepts the channel.
    Any,
    Number(u32),
}

/// Permanent virtual circuit address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PvcAddr {
    pub itf: Itf,
    pub vpi: Ci,
    pub vci: Ci,
}

impl PvcAddr {
    pub fn new(itf: Itf, vpi: Ci, vci: Ci) -> Self {
        Self { itf, vpi, vci }
    }

    /// Fully concrete address on device `itf`.
    pub fn fixed(itf: u32, vpi: u32, vci: u32) -> Self {
        Self::new(Itf::Number(itf), Ci::Value(vpi), Ci::Value(vci))
    }
}

impl fmt::Display for PvcAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.itf {
            Itf::Any => write!(f, "any.{}.{}", self.vpi, self.vci),
            Itf::Number(n) => write!(f, "{n}.{}.{}", self.vpi, self.vci),
        }
    }
}

// =============================================================================
// SVC ADDRESSES
// =============================================================================

/// Switched virtual circuit address: a public E.164 part, a private NSAP
/// part, or both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SvcAddr {
    pub public: Option<String>,
    pub private: Option<[u8; NSAP_LEN]>,
}

impl SvcAddr {
    pub fn public(number: impl Into<String>) -> Self {
        Self {
            public: Some(number.into()),
            private: None,
        }
    }

    pub fn private(nsap: [u8; NSAP_LEN]) -> Self {
        Self {
            public: None,
            private: Some(nsap),
        }
    }

    /// True when neither part is present.
    pub fn is_empty(&self) -> bool {
        self.public.is_none() && self.private.is_none()
    }

    /// Checks that at least one part is present and the public part is a
    /// short string of decimal digits.
    pub fn check(&self) -> Result<(), AddressError> {
        if self.is_empty() {
            return Err(AddressError::Empty);
        }
        if let Some(number) = &self.public {
            if number.is_empty() || number.len() > E164_MAX_DIGITS {
                return Err(AddressError::PublicLength {
                    len: number.len(),
                    max: E164_MAX_DIGITS,
                });
            }
            if let Some(c) = number.chars().find(|c| !c.is_ascii_digit()) {
                return Err(AddressError::NonDigit(c));
            }
        }
        Ok(())
    }

    /// Address identity as used by address lists: the private part must match
    /// when `self` carries one, and the public parts must agree.
    pub fn identical(&self, other: &SvcAddr) -> bool {
        if self.private.is_some() && self.private != other.private {
            return false;
        }
        self.public == other.public
    }
}

impl fmt::Display for SvcAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.public, &self.private) {
            (None, None) => f.write_str("<none>"),
            (Some(number), None) => f.write_str(number),
            (public, Some(nsap)) => {
                if let Some(number) = public {
                    write!(f, "{number}+")?;
                }
                for byte in nsap {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Service access point: opaque broadband high/low layer information
/// forwarded to the signaling authority.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sap {
    pub high_layer: Option<Vec<u8>>,
    pub low_layer: Vec<Vec<u8>>,
}
