//! Per-socket session: the data path, options and teardown shared by both
//! front ends.

use std::sync::Arc;

use atm_types::{Action, Qos, ReplyCode, SignalingRequest};
use bytes::Bytes;
use tracing::debug;

use super::stack::StackContext;
use crate::domain::credentials::Credentials;
use crate::domain::errors::VccError;
use crate::domain::qos;
use crate::domain::vcc::{Family, Flag, Interrupter, TxPdu, Vcc, VccState};
use crate::ports::outbound::QosChangeMode;
use crate::signaling::exchange::{self, WaitMode};

/// Poll-style readiness of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub hangup: bool,
    pub error: bool,
}

/// Exclusive owner of one VCC.
///
/// Dropping the session tears the VCC down: the authority is told about it,
/// the device channel is closed and the VCC leaves the identity table.
#[derive(Debug)]
pub struct Session {
    vcc: Arc<Vcc>,
    ctx: Arc<StackContext>,
}

impl Session {
    pub(crate) fn new(ctx: Arc<StackContext>, family: Family, credentials: Credentials) -> Self {
        let vcc = Vcc::create(
            ctx.table.allocate_id(),
            family,
            credentials,
            ctx.config.buffer_limits(),
        );
        ctx.table.insert(&vcc);
        debug!(vcc = %vcc.id(), ?family, "session created");
        Self { vcc, ctx }
    }

    pub fn vcc(&self) -> &Arc<Vcc> {
        &self.vcc
    }

    pub(crate) fn ctx(&self) -> &Arc<StackContext> {
        &self.ctx
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter::new(&self.vcc)
    }

    pub fn set_nonblocking(&self, on: bool) {
        self.vcc.set_nonblocking(on);
    }

    // =========================================================================
    // DATA PATH
    // =========================================================================

    /// Sends one PDU. Returns the number of bytes accepted.
    pub async fn send(&self, data: Bytes) -> Result<usize, VccError> {
        let vcc = &self.vcc;
        if vcc.state() != VccState::Connected {
            return Err(VccError::NotConnected);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let qos = vcc.qos();
        let max_sdu = qos.txtp.max_sdu.unwrap_or_else(|| qos.aal.max_sdu());
        if data.len() > max_sdu as usize {
            return Err(VccError::MessageTooLarge {
                size: data.len(),
                max_sdu,
            });
        }

        let charge = (data.len() + 3) & !3;
        let credit = loop {
            match vcc.admit_for_transmit(charge) {
                Ok(credit) => break credit,
                Err(VccError::Busy) if vcc.is_nonblocking() => return Err(VccError::WouldBlock),
                Err(VccError::Busy) => {}
                Err(err) => return Err(err),
            }
            vcc.wait_interruptible(|| {
                vcc.transmit_has_room(charge) || vcc.state() != VccState::Connected
            })
            .await?;
            if vcc.state() != VccState::Connected {
                return Err(VccError::NotConnected);
            }
        };

        let binding = vcc.binding().ok_or(VccError::NotConnected)?;
        binding.framing.check_outbound(
            binding.vpi,
            binding.vci,
            &data,
            vcc.credentials().net_admin,
        )?;
        let stats = binding.framing.stats(binding.device.stats());
        let size = data.len();
        match binding
            .device
            .ops()
            .send(&binding.channel, TxPdu::new(data, credit))
        {
            Ok(()) => {
                stats.record_tx();
                Ok(size)
            }
            Err(err) => {
                stats.record_tx_error();
                Err(err.into())
            }
        }
    }

    /// Receives one PDU. `None` marks the end of the connection.
    pub async fn recv(&self) -> Result<Option<Bytes>, VccError> {
        let vcc = &self.vcc;
        if vcc.state() != VccState::Connected && !vcc.is_released() {
            return Err(VccError::NotConnected);
        }
        let ready = || vcc.has_received() || vcc.state() != VccState::Connected;
        if !ready() {
            if vcc.is_nonblocking() {
                return Err(VccError::WouldBlock);
            }
            vcc.wait_interruptible(ready).await?;
        }
        match vcc.pop_received() {
            Some(pdu) => {
                vcc.release_receive_credit(pdu.len());
                Ok(Some(pdu))
            }
            None if vcc.is_released() => Ok(None),
            None => Err(VccError::NotConnected),
        }
    }

    pub fn readiness(&self) -> Readiness {
        let vcc = &self.vcc;
        let qos = vcc.qos();
        let awaiting_connect =
            vcc.state() == VccState::ConnectPending && vcc.outcome().is_pending();
        let max_sdu = qos.txtp.max_sdu.unwrap_or_else(|| qos.aal.max_sdu()) as usize;
        Readiness {
            readable: vcc.has_received() || vcc.pending_calls() > 0,
            writable: qos.txtp.is_active()
                && !awaiting_connect
                && vcc.transmit_has_room(max_sdu),
            hangup: vcc.is_released(),
            error: vcc.outcome().failure().is_some(),
        }
    }

    /// Bytes left under the send bound.
    pub fn out_queue(&self) -> usize {
        self.vcc.transmit_space()
    }

    /// Size of the next queued PDU.
    pub fn in_queue(&self) -> usize {
        self.vcc.next_pdu_len()
    }

    // =========================================================================
    // OPTIONS
    // =========================================================================

    pub async fn set_qos(&self, requested: Qos) -> Result<(), VccError> {
        qos::validate(&requested)?;
        match self.vcc.state() {
            VccState::Connected => self.change_qos(requested).await,
            VccState::Unconnected | VccState::Bound => self.store_qos(requested),
            VccState::Released if self.vcc.is_reusable() => self.store_qos(requested),
            other => Err(VccError::BadState(other)),
        }
    }

    fn store_qos(&self, requested: Qos) -> Result<(), VccError> {
        self.vcc.set_qos(requested);
        self.vcc.flags().set(Flag::HasQos);
        Ok(())
    }

    pub fn qos(&self) -> Result<Qos, VccError> {
        if !self.vcc.flags().test(Flag::HasQos) {
            return Err(VccError::InvalidArgument("QoS not set"));
        }
        Ok(self.vcc.qos())
    }

    pub fn set_clp(&self, on: bool) {
        self.vcc.flags().assign(Flag::Clp, on);
    }

    pub fn clp(&self) -> bool {
        self.vcc.flags().test(Flag::Clp)
    }

    /// Renegotiates the QoS of a connected VCC. AAL and both traffic
    /// classes must stay the same.
    pub async fn change_qos(&self, requested: Qos) -> Result<(), VccError> {
        let vcc = &self.vcc;
        if vcc.state() != VccState::Connected {
            return Err(VccError::NotConnected);
        }
        qos::ensure_same_shape(&vcc.qos(), &requested)?;
        let mut adjusted = requested;
        qos::adjust_both(&mut adjusted)?;

        let binding = vcc.binding().ok_or(VccError::NotConnected)?;
        if !binding.device.capabilities().change_qos {
            return Err(VccError::NotSupported);
        }
        match vcc.family() {
            Family::Pvc => {
                binding
                    .device
                    .ops()
                    .change_qos(&binding.channel, &adjusted, QosChangeMode::Set)?;
            }
            Family::Svc => {
                let request = SignalingRequest::new(Action::Modify).with_qos(adjusted.clone());
                let verdict =
                    exchange::exchange(&self.ctx.hub, vcc, request, WaitMode::Uninterruptible)
                        .await;
                // The verdict concerns this change only; it must not linger
                // as the outcome of the connection.
                vcc.reset_outcome();
                verdict?;
            }
        }
        debug!(vcc = %vcc.id(), "QoS changed");
        vcc.set_qos(adjusted);
        Ok(())
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Closes the device channel and discards queued data. Repeated calls
    /// are harmless.
    pub(crate) fn destroy(&self) {
        let vcc = &self.vcc;
        if vcc.state() == VccState::Released && !vcc.is_bound_to_device() && !vcc.has_received() {
            return;
        }
        vcc.set_state(VccState::Closing);
        self.ctx.orchestrator.detach(vcc);
        for pdu in vcc.drain_received() {
            vcc.release_receive_credit(pdu.len());
        }
        vcc.set_state(VccState::Released);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let vcc = &self.vcc;
        if vcc.family() == Family::Svc {
            if vcc.flags().clear(Flag::Registered) && vcc.state() != VccState::Released {
                self.ctx
                    .hub
                    .enqueue(SignalingRequest::new(Action::Close).with_vcc(vcc.id()));
            }
            self.ctx.hub.reject_pending(vcc, ReplyCode::CONNECTION_RESET);
            vcc.flags().clear(Flag::Listening);
        }
        self.destroy();
        self.ctx.table.remove(vcc.id());
        debug!(vcc = %vcc.id(), "session dropped");
    }
}
