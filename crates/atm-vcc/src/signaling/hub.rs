//! The attachment point of the signaling authority.
//!
//! At most one authority is attached at a time. Requests travel to it over an
//! unbounded channel so enqueueing never blocks; replies come back through
//! [`SignalingHub::dispatch`], which routes them by VCC identity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use atm_types::{Action, AuthorityMessage, Qos, ReplyCode, SignalingRequest, VccId};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::endpoint::AuthorityEndpoint;
use crate::domain::credentials::Credentials;
use crate::domain::errors::VccError;
use crate::domain::vcc::{Family, Flag, Vcc, VccState, VccTable};
use crate::ports::outbound::QosChangeMode;

#[derive(Debug)]
struct AuthorityLink {
    tx: mpsc::UnboundedSender<SignalingRequest>,
    generation: u64,
}

/// Routes requests to the attached authority and its replies back to VCCs.
#[derive(Debug)]
pub struct SignalingHub {
    link: RwLock<Option<AuthorityLink>>,
    generation: AtomicU64,
    table: Arc<VccTable>,
}

impl SignalingHub {
    pub fn new(table: Arc<VccTable>) -> Self {
        Self {
            link: RwLock::new(None),
            generation: AtomicU64::new(0),
            table,
        }
    }

    pub fn table(&self) -> &Arc<VccTable> {
        &self.table
    }

    // =========================================================================
    // ATTACHMENT
    // =========================================================================

    /// Attaches the signaling authority.
    pub fn attach(self: &Arc<Self>, credentials: Credentials) -> Result<AuthorityEndpoint, VccError> {
        if !credentials.net_admin {
            return Err(VccError::PermissionDenied);
        }
        let mut link = self.link.write();
        if link.is_some() {
            return Err(VccError::AddressInUse);
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        *link = Some(AuthorityLink { tx, generation });
        info!(generation, "signaling authority attached");
        Ok(AuthorityEndpoint::new(Arc::clone(self), rx, generation))
    }

    pub fn is_attached(&self) -> bool {
        self.link.read().is_some()
    }

    /// Detaches the authority of `generation` and purges every SVC that
    /// depended on it. A stale generation is ignored.
    pub(crate) fn detach(&self, generation: u64) {
        {
            let mut link = self.link.write();
            match link.as_ref() {
                Some(current) if current.generation == generation => *link = None,
                _ => return,
            }
        }
        info!(generation, "signaling authority detached");

        for vcc in self.table.snapshot() {
            if vcc.family() == Family::Svc {
                let involved = vcc.flags().test(Flag::Registered)
                    || vcc.outcome().is_pending()
                    || vcc.state() != VccState::Unconnected;
                if involved {
                    vcc.mark_released(ReplyCode::UNREACHABLE);
                    vcc.flags().clear(Flag::Registered);
                }
            }
            vcc.wake();
        }
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Hands a request to the authority. Returns false if none is attached.
    pub fn enqueue(&self, request: SignalingRequest) -> bool {
        let link = self.link.read();
        let Some(link) = link.as_ref() else {
            return false;
        };
        debug!(action = ?request.action, vcc = ?request.vcc, "signaling request");
        link.tx.send(request).is_ok()
    }

    /// Sends a request about `vcc`. Identity and service access point come
    /// from the VCC; QoS and local address too, unless the caller set them.
    /// The authority knows the VCC from here on.
    pub(crate) fn enqueue_for(&self, vcc: &Vcc, request: SignalingRequest) -> bool {
        let (qos, sap, local) = vcc.signaling_snapshot();
        let mut request = request.with_vcc(vcc.id()).with_sap(sap);
        if request.qos == Qos::default() {
            request.qos = qos;
        }
        if request.local.is_empty() {
            request.local = local;
        }
        let sent = self.enqueue(request);
        if sent {
            vcc.flags().set(Flag::Registered);
        }
        sent
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Routes one authority message to its VCC.
    pub fn dispatch(&self, message: AuthorityMessage) -> Result<(), VccError> {
        let target = message.target();
        let Some(vcc) = self.table.get(target) else {
            warn!(vcc = %target, "signaling message for unknown VCC");
            if let AuthorityMessage::Indicate { listen_vcc, call } = message {
                self.reject_call(listen_vcc, call.call_ref, ReplyCode::INVALID);
            }
            return Err(VccError::UnknownVcc(target));
        };
        debug!(vcc = %target, message = message_kind(&message), "signaling reply");

        match message {
            AuthorityMessage::Okay {
                local, channel, qos, ..
            } => {
                vcc.accept_okay(local, channel, qos);
            }
            AuthorityMessage::Error { reply, .. } => {
                vcc.fail_exchange(reply);
            }
            AuthorityMessage::Indicate { listen_vcc, call } => {
                if let Err(call) = vcc.push_inbound(call) {
                    warn!(
                        vcc = %listen_vcc,
                        call_ref = call.call_ref,
                        "listener cannot take call, rejecting"
                    );
                    self.reject_call(listen_vcc, call.call_ref, ReplyCode::BUSY);
                }
            }
            AuthorityMessage::Close { reply, .. } => {
                vcc.mark_released(reply);
            }
            AuthorityMessage::Modify { qos, .. } => {
                self.answer_modify(&vcc, qos);
            }
        }
        Ok(())
    }

    pub(crate) fn reject_call(&self, listen_vcc: VccId, call_ref: u64, reply: ReplyCode) {
        self.enqueue(
            SignalingRequest::new(Action::Reject)
                .with_listen_vcc(listen_vcc)
                .with_call_ref(call_ref)
                .with_reply(reply),
        );
    }

    /// Rejects every call still queued on a listener.
    pub(crate) fn reject_pending(&self, listener: &Vcc, reply: ReplyCode) {
        for call in listener.drain_inbound() {
            debug!(vcc = %listener.id(), call_ref = call.call_ref, "rejecting queued call");
            self.reject_call(listener.id(), call.call_ref, reply);
        }
    }

    fn answer_modify(&self, vcc: &Vcc, qos: Qos) {
        if vcc.is_released() || vcc.state() != VccState::Connected {
            debug!(vcc = %vcc.id(), "ignoring modify for VCC that is not ready");
            return;
        }
        let answer = match apply_modify(vcc, &qos) {
            Ok(()) => SignalingRequest::new(Action::Okay),
            Err(err) => {
                warn!(vcc = %vcc.id(), error = %err, "authority modify failed");
                SignalingRequest::new(Action::Error).with_reply(err.reply_code())
            }
        };
        self.enqueue(answer.with_vcc(vcc.id()).with_qos(qos));
    }
}

fn apply_modify(vcc: &Vcc, qos: &Qos) -> Result<(), VccError> {
    let binding = vcc.binding().ok_or(VccError::NotConnected)?;
    if !binding.device.capabilities().change_qos {
        return Err(VccError::NotSupported);
    }
    binding
        .device
        .ops()
        .change_qos(&binding.channel, qos, QosChangeMode::Set)?;
    vcc.set_qos(qos.clone());
    Ok(())
}

fn message_kind(message: &AuthorityMessage) -> &'static str {
    match message {
        AuthorityMessage::Okay { .. } => "okay",
        AuthorityMessage::Error { .. } => "error",
        AuthorityMessage::Indicate { .. } => "indicate",
        AuthorityMessage::Close { .. } => "close",
        AuthorityMessage::Modify { .. } => "modify",
    }
}
