//! # PVC Front End
//!
//! Permanent connections are addressed by device, VPI and VCI and never
//! involve the signaling authority.

use std::sync::Arc;

use atm_types::{Ci, Itf, PvcAddr};
use tracing::debug;

use super::orchestrator::{Attachment, DeviceChoice};
use super::session::Session;
use super::stack::StackContext;
use crate::domain::credentials::Credentials;
use crate::domain::errors::VccError;
use crate::domain::vcc::{Family, Flag, VccState};
use crate::ports::inbound::VccSocketApi;

#[derive(Debug)]
pub struct PvcSocket {
    session: Session,
}

impl PvcSocket {
    pub(crate) fn new(ctx: Arc<StackContext>, credentials: Credentials) -> Self {
        Self {
            session: Session::new(ctx, Family::Pvc, credentials),
        }
    }

    /// Same as [`connect`](Self::connect).
    pub async fn bind(&self, addr: PvcAddr) -> Result<(), VccError> {
        self.connect(addr).await
    }

    /// Binds the VCC to a channel. With one component unspecified the VCC
    /// stays partially addressed until a later call fills it in.
    pub async fn connect(&self, addr: PvcAddr) -> Result<(), VccError> {
        let vcc = self.session.vcc();
        let state = vcc.state();
        match state {
            VccState::Connected => return Err(VccError::AlreadyConnected),
            VccState::Unconnected | VccState::Bound => {}
            other => return Err(VccError::BadState(other)),
        }
        if !vcc.flags().test(Flag::HasQos) {
            return Err(VccError::BadState(state));
        }

        let (mut vpi, mut vci) = (addr.vpi, addr.vci);
        if vcc.is_partial() {
            if let Some((_, bound_vpi, bound_vci)) = vcc.channel_address() {
                if !bound_vpi.is_unspec() {
                    vpi = bound_vpi;
                }
                if !bound_vci.is_unspec() {
                    vci = bound_vci;
                }
            }
        }
        let device = match addr.itf {
            Itf::Any => DeviceChoice::Any,
            Itf::Number(n) => DeviceChoice::Device(n),
        };

        let orchestrator = &self.session.ctx().orchestrator;
        match orchestrator.connect(vcc, device, vpi, vci)? {
            Attachment::Complete => vcc.set_state(VccState::Connected),
            Attachment::Partial => vcc.set_state(VccState::Bound),
        }
        debug!(vcc = %vcc.id(), addr = %addr, "PVC attached");
        Ok(())
    }

    /// Bound device, VPI and VCI.
    pub fn get_name(&self) -> Result<PvcAddr, VccError> {
        let (itf, vpi, vci) = self
            .session
            .vcc()
            .channel_address()
            .ok_or(VccError::NotConnected)?;
        Ok(PvcAddr::new(Itf::Number(itf), vpi, vci))
    }

    pub fn pvc_address(&self) -> Result<PvcAddr, VccError> {
        self.get_name()
    }

    /// Tears the connection down. Repeated calls are harmless.
    pub fn release(&self) {
        self.session.destroy();
    }

    /// Whether only one of VPI/VCI has been fixed so far.
    pub fn is_partial(&self) -> bool {
        self.session.vcc().is_partial()
    }

    pub fn channel(&self) -> Option<(u32, Ci, Ci)> {
        self.session.vcc().channel_address()
    }
}

impl VccSocketApi for PvcSocket {
    fn session(&self) -> &Session {
        &self.session
    }
}
