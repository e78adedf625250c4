//! # Stack Facade
//!
//! `AtmStack` owns the shared state of one VCC layer instance and is the
//! entry point for drivers, the signaling authority, sockets and
//! administrative callers.

use std::sync::Arc;

use tracing::info;

use super::admin::{self, AdminCommand, AdminOutput};
use super::orchestrator::ConnectionOrchestrator;
use super::pvc::PvcSocket;
use super::svc::SvcSocket;
use crate::config::{ConfigError, StackConfig};
use crate::domain::credentials::Credentials;
use crate::domain::device::{AtmDevice, Deregistration, DeviceRegistry, DeviceSpec, LineStatus};
use crate::domain::errors::VccError;
use crate::domain::vcc::VccTable;
use crate::signaling::{AuthorityEndpoint, SignalingHub};

/// Shared state every session refers to.
#[derive(Debug)]
pub(crate) struct StackContext {
    pub(crate) config: StackConfig,
    pub(crate) registry: Arc<DeviceRegistry>,
    pub(crate) table: Arc<VccTable>,
    pub(crate) hub: Arc<SignalingHub>,
    pub(crate) orchestrator: ConnectionOrchestrator,
}

/// One instance of the VCC management layer.
#[derive(Debug, Clone)]
pub struct AtmStack {
    ctx: Arc<StackContext>,
}

impl AtmStack {
    pub fn new(config: StackConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = Arc::new(DeviceRegistry::new(config.device_defaults()));
        let table = Arc::new(VccTable::new());
        let hub = Arc::new(SignalingHub::new(Arc::clone(&table)));
        let orchestrator = ConnectionOrchestrator::new(Arc::clone(&registry));
        info!(
            send_bound = config.buffers.send_bound,
            receive_bound = config.buffers.receive_bound,
            "ATM stack created"
        );
        Ok(Self {
            ctx: Arc::new(StackContext {
                config,
                registry,
                table,
                hub,
                orchestrator,
            }),
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.ctx.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.ctx.registry
    }

    pub fn vcc_table(&self) -> &Arc<VccTable> {
        &self.ctx.table
    }

    // =========================================================================
    // DEVICES
    // =========================================================================

    pub fn register_device(
        &self,
        spec: DeviceSpec,
        number: Option<u32>,
    ) -> Result<Arc<AtmDevice>, VccError> {
        self.ctx.registry.register(spec, number)
    }

    pub fn deregister_device(&self, number: u32) -> Result<Deregistration, VccError> {
        self.ctx.registry.deregister(number)
    }

    pub fn device(&self, number: u32) -> Option<Arc<AtmDevice>> {
        self.ctx.registry.find(number)
    }

    pub fn signal_line_change(&self, number: u32, status: LineStatus) -> Result<(), VccError> {
        self.ctx.registry.signal_change(number, status)
    }

    /// Waits for the line status of a device to differ from `last_seen`.
    /// Dropping the future cancels the wait.
    pub async fn wait_line_status_change(
        &self,
        number: u32,
        last_seen: LineStatus,
    ) -> Result<LineStatus, VccError> {
        self.ctx
            .registry
            .wait_line_status_change(number, last_seen)
            .await
    }

    // =========================================================================
    // SOCKETS & SIGNALING
    // =========================================================================

    pub fn create_pvc(&self, credentials: Credentials) -> PvcSocket {
        PvcSocket::new(Arc::clone(&self.ctx), credentials)
    }

    pub fn create_svc(&self, credentials: Credentials) -> SvcSocket {
        SvcSocket::new(Arc::clone(&self.ctx), credentials)
    }

    pub fn attach_signaling(&self, credentials: Credentials) -> Result<AuthorityEndpoint, VccError> {
        self.ctx.hub.attach(credentials)
    }

    pub fn signaling_attached(&self) -> bool {
        self.ctx.hub.is_attached()
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    pub fn admin(
        &self,
        credentials: Credentials,
        command: AdminCommand,
    ) -> Result<AdminOutput, VccError> {
        admin::execute(&self.ctx, credentials, command)
    }

    /// Decodes a numeric command with its argument buffer and runs it.
    pub fn admin_raw(
        &self,
        credentials: Credentials,
        code: u32,
        itf: u32,
        arg: &[u8],
    ) -> Result<AdminOutput, VccError> {
        let command = AdminCommand::from_raw(code, itf, arg)?;
        self.admin(credentials, command)
    }
}
