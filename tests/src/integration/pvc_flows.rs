//! # PVC Flows
//!
//! Device registration and numbering, permanent connections on a loopback
//! adapter, and device shutdown while connections are still bound.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use atm_types::{Aal, Ci, Itf, PvcAddr, Qos, TrafficParams, AAL5_MAX_SDU};
    use atm_vcc::test_utils::LoopbackDevice;
    use atm_vcc::{
        AtmStack, Credentials, Deregistration, DeviceSpec, ErrorKind, LineStatus, StackConfig,
        VccError, VccSocketApi, VccState,
    };
    use bytes::Bytes;
    use tokio::time::timeout;

    use crate::integration::{init_tracing, loopback_stack, ubr};

    // =========================================================================
    // TEST GROUP 1: Device registry
    // =========================================================================

    #[tokio::test]
    async fn test_device_numbering() -> anyhow::Result<()> {
        init_tracing();
        let stack = AtmStack::new(StackConfig::default())?;
        let spec = || DeviceSpec::new("loopback", Arc::new(LoopbackDevice::new()));

        stack.register_device(spec(), Some(0))?;
        stack.register_device(spec(), Some(2))?;
        let err = stack.register_device(spec(), Some(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);

        let third = stack.register_device(spec(), None)?;
        assert_eq!(third.number(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_deregistration_waits_for_bound_vccs() -> anyhow::Result<()> {
        let (stack, ops) = loopback_stack()?;
        let pvc = stack.create_pvc(Credentials::default());
        pvc.set_qos(ubr()).await?;
        pvc.connect(PvcAddr::fixed(0, 0, 40)).await?;

        assert_eq!(stack.deregister_device(0)?, Deregistration::Deferred);
        assert!(stack.device(0).is_none());
        assert_eq!(ops.shutdown_count(), 0);

        // No new bindings while the shutdown is pending.
        let late = stack.create_pvc(Credentials::default());
        late.set_qos(ubr()).await?;
        let err = late.connect(PvcAddr::fixed(0, 0, 41)).await.unwrap_err();
        assert_eq!(err, VccError::NoSuchDevice(0));

        pvc.release();
        assert_eq!(ops.shutdown_count(), 1);
        assert!(stack.registry().ids().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_line_status_wait() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;

        let pending = timeout(
            Duration::from_millis(20),
            stack.wait_line_status_change(0, LineStatus::Unknown),
        )
        .await;
        assert!(pending.is_err(), "no change yet");

        let (status, signalled) = tokio::join!(
            stack.wait_line_status_change(0, LineStatus::Unknown),
            async {
                tokio::task::yield_now().await;
                stack.signal_line_change(0, LineStatus::Found)
            }
        );
        signalled?;
        assert_eq!(status?, LineStatus::Found);
        Ok(())
    }

    #[tokio::test]
    async fn test_line_status_wait_ends_on_removal() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let (status, removed) = tokio::join!(
            stack.wait_line_status_change(0, LineStatus::Unknown),
            async {
                tokio::task::yield_now().await;
                stack.deregister_device(0)
            }
        );
        assert_eq!(removed?, Deregistration::Removed);
        assert_eq!(status.unwrap_err(), VccError::NoSuchDevice(0));
        Ok(())
    }

    // =========================================================================
    // TEST GROUP 2: Binding and data
    // =========================================================================

    #[tokio::test]
    async fn test_pvc_bind_fills_max_sdu() -> anyhow::Result<()> {
        let (stack, ops) = loopback_stack()?;
        let pvc = stack.create_pvc(Credentials::default());
        pvc.set_qos(Qos::new(Aal::Aal5, TrafficParams::ubr(), TrafficParams::default()))
            .await?;

        pvc.bind(PvcAddr::fixed(0, 0, 37)).await?;
        assert_eq!(pvc.state(), VccState::Connected);
        assert_eq!(pvc.get_name()?, PvcAddr::fixed(0, 0, 37));
        assert_eq!(pvc.qos()?.txtp.max_sdu, Some(AAL5_MAX_SDU));
        assert_eq!(ops.opens().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_any_device_and_channel() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let first = stack.create_pvc(Credentials::default());
        first.set_qos(ubr()).await?;
        first
            .connect(PvcAddr::new(Itf::Any, Ci::Value(0), Ci::Any))
            .await?;
        let second = stack.create_pvc(Credentials::default());
        second.set_qos(ubr()).await?;
        second
            .connect(PvcAddr::new(Itf::Any, Ci::Value(0), Ci::Any))
            .await?;

        let (a, b) = (first.get_name()?, second.get_name()?);
        assert_ne!(a, b);
        assert!(a.vci.value().is_some_and(|v| v >= 32));
        assert!(b.vci.value().is_some_and(|v| v >= 32));
        Ok(())
    }

    #[tokio::test]
    async fn test_conflicting_channel_refused() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let first = stack.create_pvc(Credentials::default());
        first.set_qos(ubr()).await?;
        first.connect(PvcAddr::fixed(0, 0, 40)).await?;

        let second = stack.create_pvc(Credentials::default());
        second.set_qos(ubr()).await?;
        let err = second.connect(PvcAddr::fixed(0, 0, 40)).await.unwrap_err();
        assert_eq!(err, VccError::AddressInUse);
        assert_eq!(second.state(), VccState::Unconnected);
        Ok(())
    }

    #[tokio::test]
    async fn test_loopback_round_trip() -> anyhow::Result<()> {
        let (stack, ops) = loopback_stack()?;
        let left = stack.create_pvc(Credentials::default());
        left.set_qos(ubr()).await?;
        left.connect(PvcAddr::fixed(0, 1, 100)).await?;
        let right = stack.create_pvc(Credentials::default());
        right.set_qos(ubr()).await?;
        right.connect(PvcAddr::fixed(0, 1, 101)).await?;

        let (received, sent) = tokio::join!(right.recv(), async {
            tokio::task::yield_now().await;
            left.send(Bytes::from_static(b"cells")).await
        });
        assert_eq!(sent?, 5);
        assert_eq!(received?, Some(Bytes::from_static(b"cells")));
        assert_eq!(ops.sent(), vec![Bytes::from_static(b"cells")]);
        Ok(())
    }

    // =========================================================================
    // TEST GROUP 3: Teardown
    // =========================================================================

    #[tokio::test]
    async fn test_release_twice_is_a_no_op() -> anyhow::Result<()> {
        let (stack, ops) = loopback_stack()?;
        let pvc = stack.create_pvc(Credentials::default());
        pvc.set_qos(ubr()).await?;
        pvc.connect(PvcAddr::fixed(0, 0, 40)).await?;

        pvc.release();
        pvc.release();
        assert_eq!(pvc.state(), VccState::Released);
        assert_eq!(ops.close_count(), 1);
        assert_eq!(pvc.recv().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_release_wakes_blocked_reader() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let pvc = stack.create_pvc(Credentials::default());
        pvc.set_qos(ubr()).await?;
        pvc.connect(PvcAddr::fixed(0, 0, 40)).await?;

        let (received, ()) = tokio::join!(pvc.recv(), async {
            tokio::task::yield_now().await;
            pvc.release();
        });
        assert_eq!(received?, None);
        Ok(())
    }
}
