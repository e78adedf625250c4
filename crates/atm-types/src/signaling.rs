//! # Signaling Wire Contract
//!
//! Requests flow from the VCC layer to the signaling authority; messages
//! flow back. Every request that concerns a VCC carries its `VccId`, and the
//! authority answers with an outcome keyed to the same identity.
//!
//! ```text
//! layer --BIND/CONNECT/LISTEN/ACCEPT/MODIFY--> authority
//! layer <--------OKAY / ERROR(code)----------- authority
//! layer <--INDICATE (inbound call)------------ authority
//! layer ---REJECT / CLOSE--------------------> authority
//! layer <--CLOSE (released)------------------- authority
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{PvcAddr, Sap, SvcAddr};
use crate::qos::Qos;

// =============================================================================
// IDENTITY & OUTCOME CODES
// =============================================================================

/// Identity of a VCC as seen by the signaling authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VccId(pub u64);

impl fmt::Display for VccId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vcc#{}", self.0)
    }
}

/// Errno-style outcome of a signaling exchange. Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ReplyCode(pub i32);

impl ReplyCode {
    pub const OK: Self = Self(0);
    pub const NOT_PERMITTED: Self = Self(1);
    pub const BUSY: Self = Self(16);
    pub const NO_DEVICE: Self = Self(19);
    pub const INVALID: Self = Self(22);
    pub const BROKEN_PIPE: Self = Self(32);
    pub const UNREACHABLE: Self = Self(49);
    pub const NOT_SUPPORTED: Self = Self(95);
    pub const ADDRESS_IN_USE: Self = Self(98);
    pub const CONNECTION_RESET: Self = Self(104);
    pub const TIMED_OUT: Self = Self(110);
    pub const CONNECTION_REFUSED: Self = Self(111);
    /// The authority asks the caller to restart the exchange.
    pub const INTERRUPTED: Self = Self(512);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::OK => "ok",
            Self::NOT_PERMITTED => "not permitted",
            Self::BUSY => "busy",
            Self::NO_DEVICE => "no device",
            Self::INVALID => "invalid",
            Self::BROKEN_PIPE => "broken pipe",
            Self::UNREACHABLE => "unreachable",
            Self::NOT_SUPPORTED => "not supported",
            Self::ADDRESS_IN_USE => "address in use",
            Self::CONNECTION_RESET => "connection reset",
            Self::TIMED_OUT => "timed out",
            Self::CONNECTION_REFUSED => "connection refused",
            Self::INTERRUPTED => "interrupted",
            _ => return write!(f, "code {}", self.0),
        };
        f.write_str(name)
    }
}

// =============================================================================
// LAYER -> AUTHORITY
// =============================================================================

/// Kind of request sent to the signaling authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Bind,
    Connect,
    Listen,
    Accept,
    Reject,
    Close,
    Modify,
    /// A device's local address list changed.
    InterfaceNotify,
    /// Positive answer to an authority-initiated request.
    Okay,
    /// Negative answer to an authority-initiated request.
    Error,
}

/// Request from the VCC layer to the signaling authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingRequest {
    pub action: Action,
    /// VCC the request is about.
    pub vcc: Option<VccId>,
    /// Listening VCC for ACCEPT and REJECT.
    pub listen_vcc: Option<VccId>,
    /// Inbound call an ACCEPT or REJECT answers.
    pub call_ref: Option<u64>,
    pub reply: ReplyCode,
    pub qos: Qos,
    pub local: SvcAddr,
    pub remote: SvcAddr,
    pub sap: Sap,
    pub pvc: Option<PvcAddr>,
    /// Device number for INTERFACE_NOTIFY.
    pub itf: Option<u32>,
}

impl SignalingRequest {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            vcc: None,
            listen_vcc: None,
            call_ref: None,
            reply: ReplyCode::OK,
            qos: Qos::default(),
            local: SvcAddr::default(),
            remote: SvcAddr::default(),
            sap: Sap::default(),
            pvc: None,
            itf: None,
        }
    }

    pub fn with_vcc(mut self, vcc: VccId) -> Self {
        self.vcc = Some(vcc);
        self
    }

    pub fn with_listen_vcc(mut self, vcc: VccId) -> Self {
        self.listen_vcc = Some(vcc);
        self
    }

    pub fn with_call_ref(mut self, call_ref: u64) -> Self {
        self.call_ref = Some(call_ref);
        self
    }

    pub fn with_reply(mut self, reply: ReplyCode) -> Self {
        self.reply = reply;
        self
    }

    pub fn with_qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_local(mut self, local: SvcAddr) -> Self {
        self.local = local;
        self
    }

    pub fn with_remote(mut self, remote: SvcAddr) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_sap(mut self, sap: Sap) -> Self {
        self.sap = sap;
        self
    }

    pub fn with_itf(mut self, itf: u32) -> Self {
        self.itf = Some(itf);
        self
    }
}

// =============================================================================
// AUTHORITY -> LAYER
// =============================================================================

/// Concrete channel picked by the authority for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelAssignment {
    pub itf: u32,
    pub vpi: u32,
    pub vci: u32,
}

/// Inbound call waiting on a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundCall {
    /// Authority-side handle, echoed in ACCEPT or REJECT.
    pub call_ref: u64,
    pub qos: Qos,
    /// Calling party.
    pub remote: SvcAddr,
    /// Called party.
    pub local: SvcAddr,
    pub sap: Sap,
    pub channel: ChannelAssignment,
}

/// Message delivered by the signaling authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityMessage {
    /// Positive outcome of the outstanding exchange.
    Okay {
        vcc: VccId,
        local: SvcAddr,
        channel: Option<ChannelAssignment>,
        qos: Qos,
    },
    /// Negative outcome of the outstanding exchange.
    Error { vcc: VccId, reply: ReplyCode },
    /// Inbound call for a listener.
    Indicate { listen_vcc: VccId, call: InboundCall },
    /// The connection is released.
    Close { vcc: VccId, reply: ReplyCode },
    /// Authority-initiated QoS change.
    Modify { vcc: VccId, qos: Qos },
}

impl AuthorityMessage {
    /// VCC the message is addressed to.
    pub fn target(&self) -> VccId {
        match self {
            AuthorityMessage::Okay { vcc, .. }
            | AuthorityMessage::Error { vcc, .. }
            | AuthorityMessage::Close { vcc, .. }
            | AuthorityMessage::Modify { vcc, .. } => *vcc,
            AuthorityMessage::Indicate { listen_vcc, .. } => *listen_vcc,
        }
    }
}
