//! Test doubles for the driver and signaling seams.
//!
//! - [`LoopbackDevice`]: an in-memory adapter that patches VCI pairs
//!   together (`v` and `v ^ 1` on the same VPI) and records every call.
//! - [`ScriptedAuthority`]: a signaling authority running as a tokio task
//!   that answers requests the way a cooperative peer would.

use std::collections::HashMap;
use std::sync::Arc;

use atm_types::{
    Action, AuthorityMessage, ChannelAssignment, Ci, InboundCall, Qos, ReplyCode,
    SignalingRequest, SvcAddr, VccId,
};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::vcc::{Channel, TxPdu};
use crate::ports::outbound::{Capabilities, DeviceError, DeviceOps, QosChangeMode};
use crate::signaling::AuthorityEndpoint;

// =============================================================================
// LOOPBACK DEVICE
// =============================================================================

#[derive(Default)]
struct LoopbackState {
    channels: HashMap<VccId, Channel>,
    opens: Vec<(VccId, Ci, Ci)>,
    closes: usize,
    sent: Vec<Bytes>,
    hold: bool,
    held: Vec<TxPdu>,
    qos_changes: Vec<(Qos, QosChangeMode)>,
    fail_next_open: Option<DeviceError>,
    control_answer: Vec<u8>,
    controls: Vec<u32>,
    shutdowns: usize,
}

/// In-memory adapter. A PDU sent on VCI `v` is delivered to the open
/// channel with VCI `v ^ 1` on the same VPI, if there is one.
pub struct LoopbackDevice {
    capabilities: Capabilities,
    state: Mutex<LoopbackState>,
}

impl LoopbackDevice {
    /// Loopback with every optional capability.
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities {
            change_qos: true,
            control: true,
        })
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            state: Mutex::new(LoopbackState::default()),
        }
    }

    /// Loopback that only implements the mandatory operations.
    pub fn minimal() -> Self {
        Self::with_capabilities(Capabilities::default())
    }

    pub fn opens(&self) -> Vec<(VccId, Ci, Ci)> {
        self.state.lock().opens.clone()
    }

    pub fn open_channels(&self) -> usize {
        self.state.lock().channels.len()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    /// Payloads of every PDU accepted by `send`.
    pub fn sent(&self) -> Vec<Bytes> {
        self.state.lock().sent.clone()
    }

    pub fn qos_changes(&self) -> Vec<(Qos, QosChangeMode)> {
        self.state.lock().qos_changes.clone()
    }

    pub fn shutdown_count(&self) -> usize {
        self.state.lock().shutdowns
    }

    pub fn controls(&self) -> Vec<u32> {
        self.state.lock().controls.clone()
    }

    /// While holding, sent PDUs keep their transmit credit.
    pub fn hold_transmits(&self, hold: bool) {
        self.state.lock().hold = hold;
    }

    /// Completes every held PDU, returning its credit.
    pub fn release_held(&self) -> usize {
        let held = std::mem::take(&mut self.state.lock().held);
        let count = held.len();
        drop(held);
        count
    }

    pub fn fail_next_open(&self, err: DeviceError) {
        self.state.lock().fail_next_open = Some(err);
    }

    /// Bytes written back by `control`.
    pub fn answer_control(&self, answer: Vec<u8>) {
        self.state.lock().control_answer = answer;
    }

    fn peer_of(state: &LoopbackState, channel: &Channel) -> Option<Channel> {
        let (Ci::Value(vpi), Ci::Value(vci)) = (channel.vpi(), channel.vci()) else {
            return None;
        };
        state
            .channels
            .values()
            .find(|other| other.vpi() == Ci::Value(vpi) && other.vci() == Ci::Value(vci ^ 1))
            .cloned()
    }
}

impl Default for LoopbackDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceOps for LoopbackDevice {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn open(&self, channel: &Channel) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next_open.take() {
            return Err(err);
        }
        state
            .opens
            .push((channel.id(), channel.vpi(), channel.vci()));
        state.channels.insert(channel.id(), channel.clone());
        Ok(())
    }

    fn close(&self, channel: &Channel) {
        let mut state = self.state.lock();
        state.closes += 1;
        state.channels.remove(&channel.id());
    }

    fn send(&self, channel: &Channel, pdu: TxPdu) -> Result<(), DeviceError> {
        let peer = {
            let mut state = self.state.lock();
            state.sent.push(pdu.payload().clone());
            if state.hold {
                state.held.push(pdu);
                return Ok(());
            }
            Self::peer_of(&state, channel)
        };
        let payload = pdu.complete();
        if let Some(peer) = peer {
            peer.deliver(payload);
        }
        Ok(())
    }

    fn change_qos(
        &self,
        _channel: &Channel,
        qos: &Qos,
        mode: QosChangeMode,
    ) -> Result<(), DeviceError> {
        if !self.capabilities.change_qos {
            return Err(DeviceError::NotSupported);
        }
        self.state.lock().qos_changes.push((qos.clone(), mode));
        Ok(())
    }

    fn control(&self, command: u32, arg: &mut Vec<u8>) -> Result<usize, DeviceError> {
        if !self.capabilities.control {
            return Err(DeviceError::NotSupported);
        }
        let mut state = self.state.lock();
        state.controls.push(command);
        arg.clear();
        arg.extend_from_slice(&state.control_answer);
        Ok(arg.len())
    }

    fn shutdown(&self) {
        self.state.lock().shutdowns += 1;
    }
}

// =============================================================================
// SCRIPTED AUTHORITY
// =============================================================================

/// VCI handed to the first accepted call; pairs follow in steps of two.
const FIRST_CALL_VCI: u32 = 64;

struct PendingCall {
    caller: VccId,
    qos: Qos,
    channel: ChannelAssignment,
}

struct Script {
    itf: u32,
    next_vci: u32,
    next_call_ref: u64,
    listeners: Vec<(VccId, SvcAddr)>,
    calls: HashMap<u64, PendingCall>,
    peers: HashMap<VccId, VccId>,
}

impl Script {
    fn new(itf: u32) -> Self {
        Self {
            itf,
            next_vci: FIRST_CALL_VCI,
            next_call_ref: 1,
            listeners: Vec::new(),
            calls: HashMap::new(),
            peers: HashMap::new(),
        }
    }

    fn okay(vcc: VccId, qos: Qos) -> AuthorityMessage {
        AuthorityMessage::Okay {
            vcc,
            local: SvcAddr::default(),
            channel: None,
            qos,
        }
    }

    fn answer(&mut self, request: SignalingRequest) -> Vec<AuthorityMessage> {
        let Some(vcc) = request.vcc.or(request.listen_vcc) else {
            return Vec::new();
        };
        match request.action {
            Action::Bind => vec![AuthorityMessage::Okay {
                vcc,
                local: request.local,
                channel: None,
                qos: request.qos,
            }],
            Action::Listen => {
                if self
                    .listeners
                    .iter()
                    .any(|(_, addr)| addr.identical(&request.local))
                {
                    return vec![AuthorityMessage::Error {
                        vcc,
                        reply: ReplyCode::ADDRESS_IN_USE,
                    }];
                }
                self.listeners.push((vcc, request.local));
                vec![Self::okay(vcc, request.qos)]
            }
            Action::Connect => self.route_call(vcc, request),
            Action::Accept => {
                let call = request.call_ref.and_then(|r| self.calls.remove(&r));
                let Some(call) = call else {
                    // The caller gave up; move on to the next call.
                    return vec![AuthorityMessage::Error {
                        vcc,
                        reply: ReplyCode::INTERRUPTED,
                    }];
                };
                self.peers.insert(vcc, call.caller);
                self.peers.insert(call.caller, vcc);
                vec![
                    Self::okay(vcc, request.qos),
                    AuthorityMessage::Okay {
                        vcc: call.caller,
                        local: SvcAddr::default(),
                        channel: Some(call.channel),
                        qos: call.qos,
                    },
                ]
            }
            Action::Reject => match request.call_ref.and_then(|r| self.calls.remove(&r)) {
                Some(call) => vec![AuthorityMessage::Error {
                    vcc: call.caller,
                    reply: request.reply,
                }],
                None => Vec::new(),
            },
            Action::Close => self.close(vcc),
            Action::Modify => vec![Self::okay(vcc, request.qos)],
            Action::InterfaceNotify | Action::Okay | Action::Error => Vec::new(),
        }
    }

    fn route_call(&mut self, caller: VccId, request: SignalingRequest) -> Vec<AuthorityMessage> {
        let listener = self
            .listeners
            .iter()
            .find(|(_, addr)| addr.identical(&request.remote))
            .map(|(id, _)| *id);
        let Some(listener) = listener else {
            return vec![AuthorityMessage::Error {
                vcc: caller,
                reply: ReplyCode::CONNECTION_REFUSED,
            }];
        };

        let call_ref = self.next_call_ref;
        self.next_call_ref += 1;
        let vci = self.next_vci;
        self.next_vci += 2;

        let mut called_qos = request.qos.clone();
        std::mem::swap(&mut called_qos.txtp, &mut called_qos.rxtp);
        self.calls.insert(
            call_ref,
            PendingCall {
                caller,
                qos: request.qos,
                channel: ChannelAssignment {
                    itf: self.itf,
                    vpi: 0,
                    vci: vci + 1,
                },
            },
        );
        vec![AuthorityMessage::Indicate {
            listen_vcc: listener,
            call: InboundCall {
                call_ref,
                qos: called_qos,
                remote: request.local,
                local: request.remote,
                sap: request.sap,
                channel: ChannelAssignment {
                    itf: self.itf,
                    vpi: 0,
                    vci,
                },
            },
        }]
    }

    fn close(&mut self, vcc: VccId) -> Vec<AuthorityMessage> {
        self.listeners.retain(|(id, _)| *id != vcc);
        let before = self.calls.len();
        self.calls.retain(|_, call| call.caller != vcc);
        if self.calls.len() != before {
            return vec![AuthorityMessage::Close {
                vcc,
                reply: ReplyCode::CONNECTION_RESET,
            }];
        }
        let mut out = Vec::new();
        if let Some(peer) = self.peers.remove(&vcc) {
            self.peers.remove(&peer);
            out.push(AuthorityMessage::Close {
                vcc: peer,
                reply: ReplyCode::OK,
            });
        }
        out.push(AuthorityMessage::Close {
            vcc,
            reply: ReplyCode::OK,
        });
        out
    }
}

/// Cooperative signaling authority for tests.
///
/// Calls are routed to the listener whose local address is identical to
/// the called address; accepted calls are given a VCI pair that
/// [`LoopbackDevice`] patches together.
pub struct ScriptedAuthority {
    task: JoinHandle<()>,
    log: Arc<Mutex<Vec<SignalingRequest>>>,
}

impl ScriptedAuthority {
    /// Serves `endpoint` on the current tokio runtime, assigning channels
    /// on device `itf`.
    pub fn spawn(mut endpoint: AuthorityEndpoint, itf: u32) -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&log);
        let task = tokio::spawn(async move {
            let mut script = Script::new(itf);
            while let Some(request) = endpoint.recv().await {
                seen.lock().push(request.clone());
                for message in script.answer(request) {
                    if let Err(err) = endpoint.deliver(message) {
                        debug!(%err, "scripted reply not delivered");
                    }
                }
            }
        });
        Self { task, log }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<SignalingRequest> {
        self.log.lock().clone()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.log.lock().iter().map(|r| r.action).collect()
    }

    /// Stops serving; the endpoint is dropped, which detaches it.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}
