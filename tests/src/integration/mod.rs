//! Cross-component flows.

use std::sync::Arc;

use atm_types::{Aal, Qos};
use atm_vcc::test_utils::LoopbackDevice;
use atm_vcc::{AtmStack, DeviceSpec, StackConfig};
use tracing_subscriber::EnvFilter;

mod pvc_flows;
mod svc_flows;

/// Routes `tracing` output through the test harness. Filter with `RUST_LOG`
/// (warnings only by default).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A stack with default configuration and a loopback adapter as device 0.
pub fn loopback_stack() -> anyhow::Result<(AtmStack, Arc<LoopbackDevice>)> {
    init_tracing();
    let stack = AtmStack::new(StackConfig::default())?;
    let ops = Arc::new(LoopbackDevice::new());
    stack.register_device(DeviceSpec::new("loopback", ops.clone()), Some(0))?;
    Ok((stack, ops))
}

pub fn ubr() -> Qos {
    Qos::ubr(Aal::Aal5)
}
