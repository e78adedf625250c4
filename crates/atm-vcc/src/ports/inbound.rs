//! # Driving Ports (Inbound API)
//!
//! The socket-level operations both VCC families share. Family-specific
//! operations (bind, connect, listen, accept) live on the socket types.

use async_trait::async_trait;
use atm_types::{Qos, VccId};
use bytes::Bytes;

use crate::domain::errors::VccError;
use crate::domain::vcc::{Interrupter, VccState};
use crate::service::session::{Readiness, Session};

/// Common surface of [`PvcSocket`](crate::service::PvcSocket) and
/// [`SvcSocket`](crate::service::SvcSocket).
#[async_trait]
pub trait VccSocketApi: Send + Sync {
    /// The session behind the socket.
    fn session(&self) -> &Session;

    fn id(&self) -> VccId {
        self.session().vcc().id()
    }

    fn state(&self) -> VccState {
        self.session().vcc().state()
    }

    async fn send(&self, data: Bytes) -> Result<usize, VccError> {
        self.session().send(data).await
    }

    /// `Ok(None)` once the connection is gone and nothing is left to read.
    async fn recv(&self) -> Result<Option<Bytes>, VccError> {
        self.session().recv().await
    }

    fn readiness(&self) -> Readiness {
        self.session().readiness()
    }

    fn out_queue(&self) -> usize {
        self.session().out_queue()
    }

    fn in_queue(&self) -> usize {
        self.session().in_queue()
    }

    async fn set_qos(&self, qos: Qos) -> Result<(), VccError> {
        self.session().set_qos(qos).await
    }

    fn qos(&self) -> Result<Qos, VccError> {
        self.session().qos()
    }

    async fn change_qos(&self, qos: Qos) -> Result<(), VccError> {
        self.session().change_qos(qos).await
    }

    fn set_clp(&self, on: bool) {
        self.session().set_clp(on);
    }

    fn clp(&self) -> bool {
        self.session().clp()
    }

    fn set_nonblocking(&self, on: bool) {
        self.session().set_nonblocking(on);
    }

    /// Handle that cancels this socket's interruptible waits.
    fn interrupter(&self) -> Interrupter {
        self.session().interrupter()
    }
}
