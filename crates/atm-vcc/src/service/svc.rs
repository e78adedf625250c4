//! # SVC Front End
//!
//! Switched connections are negotiated with the signaling authority. Every
//! operation that needs the authority's consent runs one exchange (see
//! [`crate::signaling`]); the device channel is only opened once the
//! authority has picked it.
//!
//! ## Interruption
//!
//! `connect`, `accept` and blocking reads honour the socket's
//! [`Interrupter`](crate::domain::vcc::Interrupter). An interrupted connect
//! is aborted with a CLOSE so the authority does not keep a half-open call.
//! `bind`, `listen` and `disconnect` wait without interruption because their
//! replies are expected promptly.

use std::sync::Arc;

use atm_types::{Action, Ci, ReplyCode, Sap, SignalingRequest, SvcAddr, TrafficClass};
use tracing::{debug, info, warn};

use super::orchestrator::DeviceChoice;
use super::session::Session;
use super::stack::StackContext;
use crate::domain::credentials::Credentials;
use crate::domain::errors::VccError;
use crate::domain::qos;
use crate::domain::vcc::{Family, Flag, Vcc, VccState};
use crate::ports::inbound::VccSocketApi;
use crate::signaling::exchange::{self, WaitMode};

#[derive(Debug)]
pub struct SvcSocket {
    session: Session,
}

impl SvcSocket {
    pub(crate) fn new(ctx: Arc<StackContext>, credentials: Credentials) -> Self {
        Self {
            session: Session::new(ctx, Family::Svc, credentials),
        }
    }

    pub fn vcc(&self) -> &Arc<Vcc> {
        self.session.vcc()
    }

    fn ctx(&self) -> &Arc<StackContext> {
        self.session.ctx()
    }

    // =========================================================================
    // ADDRESSING
    // =========================================================================

    /// Registers `addr` as the local address with the authority.
    pub async fn bind(&self, addr: SvcAddr) -> Result<(), VccError> {
        let vcc = self.vcc();
        let state = vcc.state();
        match state {
            VccState::Connected => return Err(VccError::AlreadyConnected),
            VccState::Unconnected | VccState::Bound => {}
            VccState::Released if vcc.is_reusable() => {}
            other => return Err(VccError::BadState(other)),
        }
        if !vcc.flags().test(Flag::HasQos) {
            return Err(VccError::BadState(state));
        }
        addr.check()?;

        vcc.set_local(addr.clone());
        vcc.set_state(VccState::BindPending);
        let request = SignalingRequest::new(Action::Bind).with_local(addr);
        let result = exchange::exchange(
            &self.ctx().hub,
            vcc,
            request,
            WaitMode::Uninterruptible,
        )
        .await;
        // A bind leaves nothing behind at the authority.
        vcc.flags().clear(Flag::Registered);
        vcc.reset_outcome();
        match result {
            Ok(()) => {
                vcc.set_state(VccState::Bound);
                debug!(vcc = %vcc.id(), "bound");
                Ok(())
            }
            Err(err) => {
                vcc.set_state(VccState::Unconnected);
                Err(err)
            }
        }
    }

    pub fn local(&self) -> SvcAddr {
        self.vcc().local()
    }

    pub fn remote(&self) -> SvcAddr {
        self.vcc().remote()
    }

    /// Sets the service access point sent with the next request.
    pub fn set_sap(&self, sap: Sap) -> Result<(), VccError> {
        let vcc = self.vcc();
        match vcc.state() {
            VccState::Unconnected | VccState::Bound => {}
            VccState::Released if vcc.is_reusable() => {}
            other => return Err(VccError::BadState(other)),
        }
        vcc.set_sap(sap);
        Ok(())
    }

    pub fn sap(&self) -> Sap {
        self.vcc().sap()
    }

    // =========================================================================
    // OUTBOUND CALLS
    // =========================================================================

    /// Places a call to `remote`.
    ///
    /// On a non-blocking socket the first call returns
    /// [`VccError::InProgress`]; calling again reports
    /// [`VccError::AlreadyInProgress`] until the authority has answered, and
    /// then completes or fails the connect. A call the authority released
    /// meanwhile reports the release code.
    pub async fn connect(&self, remote: SvcAddr) -> Result<(), VccError> {
        let vcc = self.vcc();
        match vcc.state() {
            VccState::Connected => Err(VccError::AlreadyConnected),
            VccState::ConnectPending => {
                if vcc.outcome().is_pending() && self.ctx().hub.is_attached() {
                    return Err(VccError::AlreadyInProgress);
                }
                self.finish_connect().await
            }
            VccState::Unconnected | VccState::Bound => self.start_connect(remote).await,
            // A non-blocking connect ended by the authority reports its
            // outcome once before the released state applies.
            VccState::Released if vcc.outcome().failure().is_some() => {
                let result = exchange::outcome_result(vcc);
                vcc.reset_outcome();
                result
            }
            VccState::Released if vcc.is_reusable() => self.start_connect(remote).await,
            VccState::Released => Err(VccError::Released),
            other => Err(VccError::BadState(other)),
        }
    }

    async fn start_connect(&self, remote: SvcAddr) -> Result<(), VccError> {
        let vcc = self.vcc();
        if !vcc.flags().test(Flag::HasQos) {
            return Err(VccError::BadState(vcc.state()));
        }
        let current = vcc.qos();
        if current.txtp.class == TrafficClass::Any
            || current.rxtp.class == TrafficClass::Any
            || (!current.txtp.is_active() && !current.rxtp.is_active())
        {
            return Err(VccError::InvalidQos);
        }
        remote.check()?;

        let hub = &self.ctx().hub;
        vcc.set_remote(remote.clone());
        vcc.clear_release_reason();
        vcc.flags().clear(Flag::Hangup);
        vcc.set_state(VccState::ConnectPending);

        vcc.begin_exchange();
        if !hub.enqueue_for(vcc, SignalingRequest::new(Action::Connect).with_remote(remote)) {
            vcc.reset_outcome();
            vcc.set_state(VccState::Unconnected);
            return Err(VccError::Unreachable);
        }
        if vcc.is_nonblocking() {
            return Err(VccError::InProgress);
        }

        match exchange::await_outcome(hub, vcc, WaitMode::Interruptible).await {
            Ok(()) => self.commit_connect().await,
            Err(VccError::Interrupted) => {
                exchange::abort(hub, vcc).await;
                Err(VccError::Interrupted)
            }
            Err(err) => {
                vcc.reset_outcome();
                vcc.transition(VccState::ConnectPending, VccState::Unconnected);
                Err(err)
            }
        }
    }

    /// Second half of a non-blocking connect: the authority has answered.
    async fn finish_connect(&self) -> Result<(), VccError> {
        let vcc = self.vcc();
        if let Err(err) = exchange::outcome_result(vcc) {
            vcc.reset_outcome();
            vcc.transition(VccState::ConnectPending, VccState::Unconnected);
            return Err(err);
        }
        self.commit_connect().await
    }

    /// Opens the channel the authority assigned.
    async fn commit_connect(&self) -> Result<(), VccError> {
        let vcc = self.vcc();
        let mut settled = vcc.qos();
        settled.txtp.max_pcr = Some(qos::select_top_pcr(&settled.txtp));
        settled.txtp.pcr = None;
        settled.txtp.min_pcr = None;
        vcc.set_qos(settled);

        let Some(channel) = vcc.assignment() else {
            warn!(vcc = %vcc.id(), "authority accepted without a channel");
            self.disconnect().await;
            return Err(VccError::InvalidArgument("no channel assigned"));
        };
        let attached = self.ctx().orchestrator.connect(
            vcc,
            DeviceChoice::Device(channel.itf),
            Ci::Value(channel.vpi),
            Ci::Value(channel.vci),
        );
        if let Err(err) = attached {
            self.disconnect().await;
            return Err(err);
        }
        if !vcc.transition(VccState::ConnectPending, VccState::Connected) {
            vcc.set_state(VccState::Connected);
        }
        info!(
            vcc = %vcc.id(),
            itf = channel.itf,
            vpi = channel.vpi,
            vci = channel.vci,
            "SVC connected"
        );
        Ok(())
    }

    // =========================================================================
    // INBOUND CALLS
    // =========================================================================

    /// Starts accepting calls for the bound local address. A backlog of zero
    /// selects the configured default.
    pub async fn listen(&self, backlog: u32) -> Result<(), VccError> {
        let vcc = self.vcc();
        if vcc.flags().test(Flag::Listening) {
            return Err(VccError::AddressInUse);
        }
        match vcc.state() {
            VccState::Unconnected | VccState::Bound => {}
            VccState::Released if vcc.is_reusable() => {}
            other => return Err(VccError::BadState(other)),
        }
        let backlog = if backlog > 0 {
            backlog
        } else {
            self.ctx().config.listen.default_backlog
        };

        // Calls may be indicated as soon as the authority has answered.
        vcc.set_backlog(backlog);
        vcc.flags().set(Flag::Listening);
        let request = SignalingRequest::new(Action::Listen).with_local(vcc.local());
        let result = exchange::exchange(
            &self.ctx().hub,
            vcc,
            request,
            WaitMode::Uninterruptible,
        )
        .await;
        vcc.reset_outcome();
        if let Err(err) = result {
            vcc.flags().clear(Flag::Listening);
            return Err(err);
        }
        debug!(vcc = %vcc.id(), backlog, "listening");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.vcc().flags().test(Flag::Listening)
    }

    /// Takes the next inbound call and returns a connected socket for it.
    pub async fn accept(&self) -> Result<SvcSocket, VccError> {
        let listener = self.vcc();
        if !listener.flags().test(Flag::Listening) {
            return Err(VccError::BadState(listener.state()));
        }
        let ctx = self.ctx();
        let hub = &ctx.hub;

        loop {
            let call = loop {
                if let Some(call) = listener.pop_inbound() {
                    break call;
                }
                if !hub.is_attached() {
                    return Err(VccError::Unreachable);
                }
                if listener.is_released() || !listener.flags().test(Flag::Listening) {
                    return Err(VccError::ListenerClosed);
                }
                if listener.is_nonblocking() {
                    return Err(VccError::WouldBlock);
                }
                listener
                    .wait_interruptible(|| {
                        listener.pending_calls() > 0
                            || !hub.is_attached()
                            || listener.is_released()
                            || !listener.flags().test(Flag::Listening)
                    })
                    .await?;
            };

            let socket = SvcSocket::new(Arc::clone(ctx), listener.credentials());
            let vcc = socket.vcc();
            vcc.set_qos(call.qos.clone());
            vcc.flags().set(Flag::HasQos);
            vcc.set_local(call.local.clone());
            vcc.set_remote(call.remote.clone());
            vcc.set_sap(call.sap.clone());

            let channel = call.channel;
            let attached = ctx.orchestrator.connect(
                vcc,
                DeviceChoice::Device(channel.itf),
                Ci::Value(channel.vpi),
                Ci::Value(channel.vci),
            );
            if let Err(err) = attached {
                warn!(listener = %listener.id(), call = call.call_ref, %err, "cannot take call");
                hub.reject_call(listener.id(), call.call_ref, err.reply_code());
                return Err(err);
            }

            let request = SignalingRequest::new(Action::Accept)
                .with_listen_vcc(listener.id())
                .with_call_ref(call.call_ref);
            match exchange::exchange(hub, vcc, request, WaitMode::Uninterruptible).await {
                Ok(()) => {
                    vcc.reset_outcome();
                    vcc.set_state(VccState::Connected);
                    info!(
                        listener = %listener.id(),
                        vcc = %vcc.id(),
                        vpi = channel.vpi,
                        vci = channel.vci,
                        "call accepted"
                    );
                    return Ok(socket);
                }
                // The authority asks for the next call instead.
                Err(VccError::Rejected(ReplyCode::INTERRUPTED)) => {
                    debug!(listener = %listener.id(), "accept restarted");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Releases the connection at the authority and detaches from the
    /// device. The socket may be used again afterwards; a second call does
    /// nothing.
    pub async fn disconnect(&self) {
        let vcc = self.vcc();
        let flags = vcc.flags();
        let active = flags.test(Flag::Registered)
            || flags.test(Flag::Listening)
            || vcc.pending_calls() > 0
            || vcc.is_bound_to_device()
            || vcc.state() == VccState::ConnectPending;
        if !active {
            return;
        }
        exchange::close(&self.ctx().hub, vcc).await;
        self.tear_down();
    }

    fn tear_down(&self) {
        let vcc = self.vcc();
        let hub = &self.ctx().hub;
        vcc.flags().clear(Flag::Registered);
        vcc.flags().clear(Flag::Listening);
        hub.reject_pending(vcc, ReplyCode::CONNECTION_RESET);
        vcc.flags().clear(Flag::Hangup);
        self.ctx().orchestrator.detach(vcc);
        vcc.reset_outcome();
        vcc.clear_assignment();
        vcc.set_state(VccState::Released);
        debug!(vcc = %vcc.id(), "SVC disconnected");
    }

    /// Disconnects and discards everything still queued.
    pub async fn release(&self) {
        self.disconnect().await;
        self.session.destroy();
    }
}

impl VccSocketApi for SvcSocket {
    fn session(&self) -> &Session {
        &self.session
    }
}
