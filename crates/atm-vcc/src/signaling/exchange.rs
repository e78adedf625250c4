//! Request/reply exchanges with the signaling authority.
//!
//! An exchange marks the VCC's outcome pending, enqueues the request and
//! waits until the outcome is resolved or the authority goes away. The
//! pending mark is set before the request becomes visible to the authority,
//! and every wait re-checks its predicate after arming the wakeup, so a fast
//! reply is never lost.

use atm_types::{Action, ReplyCode, SignalingRequest};
use tracing::debug;

use super::hub::SignalingHub;
use crate::domain::errors::VccError;
use crate::domain::vcc::{Flag, Outcome, Vcc, VccState};

/// Whether an exchange wait honours interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    Interruptible,
    Uninterruptible,
}

/// Sends `request` for `vcc` and waits for the authority's verdict.
pub(crate) async fn exchange(
    hub: &SignalingHub,
    vcc: &Vcc,
    request: SignalingRequest,
    mode: WaitMode,
) -> Result<(), VccError> {
    let action = request.action;
    vcc.begin_exchange();
    if !hub.enqueue_for(vcc, request) {
        vcc.reset_outcome();
        return Err(VccError::Unreachable);
    }
    debug!(vcc = %vcc.id(), ?action, "waiting for authority");
    await_outcome(hub, vcc, mode).await
}

/// Waits for the outstanding exchange of `vcc` to resolve.
pub(crate) async fn await_outcome(
    hub: &SignalingHub,
    vcc: &Vcc,
    mode: WaitMode,
) -> Result<(), VccError> {
    let settled = || !vcc.outcome().is_pending() || !hub.is_attached();
    match mode {
        WaitMode::Interruptible => vcc.wait_interruptible(settled).await?,
        WaitMode::Uninterruptible => vcc.wait_until(settled).await,
    }
    outcome_result(vcc)
}

/// Translates the recorded outcome into a result.
pub(crate) fn outcome_result(vcc: &Vcc) -> Result<(), VccError> {
    match vcc.outcome() {
        Outcome::Resolved(code) if code.is_ok() => Ok(()),
        Outcome::Resolved(ReplyCode::UNREACHABLE) => Err(VccError::Unreachable),
        Outcome::Resolved(code) => Err(VccError::Rejected(code)),
        Outcome::Pending | Outcome::Idle => Err(VccError::Unreachable),
    }
}

/// Abandons an interrupted exchange without letting the authority's view
/// and the local one diverge.
///
/// A CLOSE is sent, then the original exchange is awaited; if it had
/// succeeded the release notification is awaited as well. Both waits ignore
/// interruption. Afterwards the VCC is unconnected and may be reused.
pub(crate) async fn abort(hub: &SignalingHub, vcc: &Vcc) {
    debug!(vcc = %vcc.id(), "aborting signaling exchange");
    hub.enqueue_for(vcc, SignalingRequest::new(Action::Close));

    vcc.wait_until(|| !vcc.outcome().is_pending() || !hub.is_attached())
        .await;
    if vcc.outcome() == Outcome::Resolved(ReplyCode::OK) {
        vcc.wait_until(|| vcc.state() == VccState::Released || !hub.is_attached())
            .await;
    }

    vcc.flags().clear(Flag::Registered);
    vcc.flags().clear(Flag::Hangup);
    vcc.reset_outcome();
    vcc.clear_assignment();
    vcc.clear_release_reason();
    vcc.set_state(VccState::Unconnected);
}

/// Sends CLOSE if the authority knows `vcc` and waits, ignoring
/// interruption, until it confirms the release or goes away.
pub(crate) async fn close(hub: &SignalingHub, vcc: &Vcc) {
    if !vcc.flags().test(Flag::Registered) {
        return;
    }
    if vcc.state() != VccState::Released {
        hub.enqueue_for(vcc, SignalingRequest::new(Action::Close));
        vcc.wait_until(|| vcc.state() == VccState::Released || !hub.is_attached())
            .await;
    }
    vcc.flags().clear(Flag::Registered);
}
