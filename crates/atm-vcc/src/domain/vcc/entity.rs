//! The VCC entity.
//!
//! A `Vcc` is shared between its owning session, the device it is bound to
//! (weakly, through the registry and [`Channel`]) and the signaling hub
//! (weakly, through the VCC table). Lifecycle state and flags are atomics;
//! everything else sits behind one short-lived per-VCC mutex that is never
//! held across an await point.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use atm_types::{ChannelAssignment, Ci, InboundCall, Qos, ReplyCode, Sap, SvcAddr, VccId};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::admission::BufferLimits;
use super::channel::Binding;
use super::state::{AtomicState, Flag, Outcome, VccFlags, VccState};
use crate::domain::credentials::Credentials;
use crate::domain::errors::VccError;

/// Address family of a VCC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Permanent: addressed by device/VPI/VCI, no signaling.
    Pvc,
    /// Switched: set up through the signaling authority.
    Svc,
}

#[derive(Debug, Default)]
struct VccData {
    qos: Qos,
    local: SvcAddr,
    remote: SvcAddr,
    sap: Sap,
    binding: Option<Binding>,
    assignment: Option<ChannelAssignment>,
    outcome: Outcome,
    release_reason: Option<ReplyCode>,
    backlog: u32,
    listen_queue: VecDeque<InboundCall>,
}

/// A virtual channel connection.
#[derive(Debug)]
pub struct Vcc {
    id: VccId,
    family: Family,
    credentials: Credentials,
    pub(super) limits: BufferLimits,
    state: AtomicState,
    flags: VccFlags,
    nonblocking: AtomicBool,
    interrupt_pending: AtomicBool,
    pub(super) tx_budget: AtomicUsize,
    pub(super) rx_budget: AtomicUsize,
    data: Mutex<VccData>,
    rx_queue: Mutex<VecDeque<Bytes>>,
    wake: Notify,
}

impl Vcc {
    /// Creates a VCC with cleared flags and zero counters.
    pub fn create(
        id: VccId,
        family: Family,
        credentials: Credentials,
        limits: BufferLimits,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            family,
            credentials,
            limits,
            state: AtomicState::new(VccState::Unconnected),
            flags: VccFlags::default(),
            nonblocking: AtomicBool::new(false),
            interrupt_pending: AtomicBool::new(false),
            tx_budget: AtomicUsize::new(0),
            rx_budget: AtomicUsize::new(0),
            data: Mutex::new(VccData::default()),
            rx_queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
        })
    }

    // =========================================================================
    // IDENTITY & STATE
    // =========================================================================

    pub fn id(&self) -> VccId {
        self.id
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    pub fn state(&self) -> VccState {
        self.state.load()
    }

    pub fn flags(&self) -> &VccFlags {
        &self.flags
    }

    pub(crate) fn set_state(&self, state: VccState) {
        let previous = self.state.load();
        self.state.store(state);
        if previous != state {
            debug!(vcc = %self.id, from = ?previous, to = ?state, "state change");
        }
        self.wake();
    }

    pub(crate) fn transition(&self, from: VccState, to: VccState) -> bool {
        let moved = self.state.transition(from, to);
        if moved {
            debug!(vcc = %self.id, ?from, ?to, "state change");
            self.wake();
        }
        moved
    }

    /// Unconnected, or released locally so it may be set up again.
    pub fn is_reusable(&self) -> bool {
        match self.state() {
            VccState::Unconnected => true,
            VccState::Released => !self.flags.test(Flag::Registered),
            _ => false,
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(self.state(), VccState::Released | VccState::Closing)
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::Relaxed)
    }

    pub(crate) fn set_nonblocking(&self, on: bool) {
        self.nonblocking.store(on, Ordering::Relaxed);
    }

    // =========================================================================
    // QOS & ADDRESSES
    // =========================================================================

    pub fn qos(&self) -> Qos {
        self.data.lock().qos.clone()
    }

    pub(crate) fn set_qos(&self, qos: Qos) {
        self.data.lock().qos = qos;
    }

    pub fn local(&self) -> SvcAddr {
        self.data.lock().local.clone()
    }

    pub(crate) fn set_local(&self, addr: SvcAddr) {
        self.data.lock().local = addr;
    }

    pub fn remote(&self) -> SvcAddr {
        self.data.lock().remote.clone()
    }

    pub(crate) fn set_remote(&self, addr: SvcAddr) {
        self.data.lock().remote = addr;
    }

    pub fn sap(&self) -> Sap {
        self.data.lock().sap.clone()
    }

    pub(crate) fn set_sap(&self, sap: Sap) {
        self.data.lock().sap = sap;
    }

    /// Everything a signaling request about this VCC carries.
    pub(crate) fn signaling_snapshot(&self) -> (Qos, Sap, SvcAddr) {
        let data = self.data.lock();
        (data.qos.clone(), data.sap.clone(), data.local.clone())
    }

    // =========================================================================
    // DEVICE BINDING
    // =========================================================================

    pub(crate) fn binding(&self) -> Option<Binding> {
        self.data.lock().binding.clone()
    }

    pub(crate) fn install_binding(&self, binding: Binding) {
        self.data.lock().binding = Some(binding);
    }

    pub(crate) fn take_binding(&self) -> Option<Binding> {
        self.data.lock().binding.take()
    }

    pub fn is_bound_to_device(&self) -> bool {
        self.data.lock().binding.is_some()
    }

    /// Device number and channel components, if bound.
    pub fn channel_address(&self) -> Option<(u32, Ci, Ci)> {
        self.data
            .lock()
            .binding
            .as_ref()
            .map(|b| (b.device.number(), b.vpi, b.vci))
    }

    /// Bound with exactly one of VPI/VCI left unspecified.
    pub fn is_partial(&self) -> bool {
        self.data
            .lock()
            .binding
            .as_ref()
            .is_some_and(|b| b.vpi.is_unspec() != b.vci.is_unspec())
    }

    pub(crate) fn assignment(&self) -> Option<ChannelAssignment> {
        self.data.lock().assignment
    }

    pub(crate) fn clear_assignment(&self) {
        self.data.lock().assignment = None;
    }

    // =========================================================================
    // SIGNALING OUTCOME
    // =========================================================================

    pub fn outcome(&self) -> Outcome {
        self.data.lock().outcome
    }

    /// Marks a request as outstanding. Must happen before the request is
    /// enqueued so a fast reply cannot be lost.
    pub(crate) fn begin_exchange(&self) {
        self.data.lock().outcome = Outcome::Pending;
    }

    /// Resolves the outstanding exchange. Only the first resolution counts.
    pub(crate) fn resolve(&self, code: ReplyCode) -> bool {
        let resolved = {
            let mut data = self.data.lock();
            if data.outcome.is_pending() {
                data.outcome = Outcome::Resolved(code);
                true
            } else {
                false
            }
        };
        if resolved {
            self.wake();
        }
        resolved
    }

    pub(crate) fn reset_outcome(&self) {
        self.data.lock().outcome = Outcome::Idle;
    }

    /// Positive reply: remembers the local address and channel the authority
    /// picked, then resolves.
    pub(crate) fn accept_okay(
        &self,
        local: SvcAddr,
        channel: Option<ChannelAssignment>,
        qos: Qos,
    ) -> bool {
        {
            let mut data = self.data.lock();
            if data.local.is_empty() {
                data.local = local;
            }
            if data.assignment.is_none() {
                if let Some(channel) = channel {
                    data.assignment = Some(channel);
                    if channel.vpi != 0 || channel.vci != 0 {
                        data.qos = qos;
                    }
                }
            }
        }
        self.resolve(ReplyCode::OK)
    }

    /// Negative reply. The authority forgets a VCC whose setup failed; a
    /// refused MODIFY leaves a connected call in place.
    pub(crate) fn fail_exchange(&self, code: ReplyCode) -> bool {
        if self.state() != VccState::Connected {
            self.flags.clear(Flag::Registered);
        }
        self.resolve(code)
    }

    /// The authority released the connection.
    pub(crate) fn mark_released(&self, reply: ReplyCode) {
        {
            let mut data = self.data.lock();
            data.release_reason = Some(reply);
            if data.outcome.is_pending() {
                let code = if reply.is_ok() {
                    ReplyCode::CONNECTION_RESET
                } else {
                    reply
                };
                data.outcome = Outcome::Resolved(code);
            }
        }
        self.flags.set(Flag::Hangup);
        self.set_state(VccState::Released);
    }

    pub fn release_reason(&self) -> Option<ReplyCode> {
        self.data.lock().release_reason
    }

    pub(crate) fn clear_release_reason(&self) {
        self.data.lock().release_reason = None;
    }

    // =========================================================================
    // LISTEN QUEUE
    // =========================================================================

    pub fn backlog(&self) -> u32 {
        self.data.lock().backlog
    }

    pub(crate) fn set_backlog(&self, backlog: u32) {
        self.data.lock().backlog = backlog;
    }

    /// Queues an inbound call; hands it back if the VCC is not listening or
    /// the backlog is full.
    pub(crate) fn push_inbound(&self, call: InboundCall) -> Result<(), InboundCall> {
        if !self.flags.test(Flag::Listening) || self.is_released() {
            return Err(call);
        }
        {
            let mut data = self.data.lock();
            if data.listen_queue.len() >= data.backlog as usize {
                return Err(call);
            }
            data.listen_queue.push_back(call);
        }
        self.wake();
        Ok(())
    }

    pub(crate) fn pop_inbound(&self) -> Option<InboundCall> {
        self.data.lock().listen_queue.pop_front()
    }

    pub(crate) fn drain_inbound(&self) -> Vec<InboundCall> {
        self.data.lock().listen_queue.drain(..).collect()
    }

    pub fn pending_calls(&self) -> usize {
        self.data.lock().listen_queue.len()
    }

    // =========================================================================
    // RECEIVE QUEUE
    // =========================================================================

    pub(crate) fn push_received(&self, pdu: Bytes) {
        self.rx_queue.lock().push_back(pdu);
        self.wake();
    }

    pub(crate) fn pop_received(&self) -> Option<Bytes> {
        self.rx_queue.lock().pop_front()
    }

    pub(crate) fn drain_received(&self) -> Vec<Bytes> {
        self.rx_queue.lock().drain(..).collect()
    }

    pub fn has_received(&self) -> bool {
        !self.rx_queue.lock().is_empty()
    }

    /// Size of the next queued PDU, zero when empty.
    pub fn next_pdu_len(&self) -> usize {
        self.rx_queue.lock().front().map_or(0, Bytes::len)
    }

    // =========================================================================
    // WAITING
    // =========================================================================

    /// Wakes every task blocked on this VCC.
    pub(crate) fn wake(&self) {
        self.wake.notify_waiters();
    }

    pub(crate) fn interrupt(&self) {
        self.interrupt_pending.store(true, Ordering::Release);
        self.wake();
    }

    fn take_interrupt(&self) -> bool {
        self.interrupt_pending.swap(false, Ordering::AcqRel)
    }

    /// Waits until `done` holds. Interruption is ignored.
    pub(crate) async fn wait_until(&self, mut done: impl FnMut() -> bool) {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if done() {
                return;
            }
            notified.await;
        }
    }

    /// Waits until `done` holds or the VCC is interrupted.
    pub(crate) async fn wait_interruptible(
        &self,
        mut done: impl FnMut() -> bool,
    ) -> Result<(), VccError> {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if done() {
                return Ok(());
            }
            if self.take_interrupt() {
                debug!(vcc = %self.id, "wait interrupted");
                return Err(VccError::Interrupted);
            }
            notified.await;
        }
    }
}

/// Cancels interruptible waits on one VCC, like a signal delivered to the
/// blocked caller.
///
/// Interruption is level-triggered: if nothing is waiting, the next
/// interruptible wait on the VCC returns `Interrupted` immediately.
#[derive(Debug, Clone)]
pub struct Interrupter {
    vcc: Weak<Vcc>,
}

impl Interrupter {
    pub(crate) fn new(vcc: &Arc<Vcc>) -> Self {
        Self {
            vcc: Arc::downgrade(vcc),
        }
    }

    pub fn interrupt(&self) {
        if let Some(vcc) = self.vcc.upgrade() {
            vcc.interrupt();
        }
    }
}
