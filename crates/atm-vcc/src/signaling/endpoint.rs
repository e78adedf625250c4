//! The signaling authority's side of the attachment.

use std::sync::Arc;

use atm_types::{AuthorityMessage, SignalingRequest};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::hub::SignalingHub;
use crate::domain::errors::VccError;

/// Handle held by the attached signaling authority.
///
/// Requests from the layer are read with [`recv`](Self::recv); replies and
/// unsolicited notifications go back through [`deliver`](Self::deliver).
/// Dropping the endpoint detaches the authority.
#[derive(Debug)]
pub struct AuthorityEndpoint {
    hub: Arc<SignalingHub>,
    requests: mpsc::UnboundedReceiver<SignalingRequest>,
    generation: u64,
    detached: bool,
}

impl AuthorityEndpoint {
    pub(crate) fn new(
        hub: Arc<SignalingHub>,
        requests: mpsc::UnboundedReceiver<SignalingRequest>,
        generation: u64,
    ) -> Self {
        Self {
            hub,
            requests,
            generation,
            detached: false,
        }
    }

    /// Next request from the layer. `None` once detached.
    pub async fn recv(&mut self) -> Option<SignalingRequest> {
        if self.detached {
            return None;
        }
        self.requests.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SignalingRequest> {
        if self.detached {
            return None;
        }
        match self.requests.try_recv() {
            Ok(request) => Some(request),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Delivers a reply or notification to the layer.
    pub fn deliver(&self, message: AuthorityMessage) -> Result<(), VccError> {
        if self.detached {
            return Err(VccError::Unreachable);
        }
        self.hub.dispatch(message)
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Detaches the authority. Every SVC it served is released.
    pub fn detach(&mut self) {
        if !self.detached {
            self.detached = true;
            self.requests.close();
            self.hub.detach(self.generation);
        }
    }
}

impl Drop for AuthorityEndpoint {
    fn drop(&mut self) {
        self.detach();
    }
}
