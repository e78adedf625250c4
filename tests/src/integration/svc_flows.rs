//! # SVC Flows
//!
//! Switched connections against two kinds of authority: the cooperative
//! `ScriptedAuthority`, and an endpoint driven step by step from the test
//! to pin down message ordering.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Context;
    use atm_types::{
        Aal, Action, AuthorityMessage, ChannelAssignment, InboundCall, Qos, ReplyCode,
        SignalingRequest, SvcAddr, TrafficClass, TrafficParams,
    };
    use atm_vcc::test_utils::ScriptedAuthority;
    use atm_vcc::{
        AtmStack, AuthorityEndpoint, Credentials, ErrorKind, Outcome, QosChangeMode, SvcSocket,
        VccError, VccSocketApi, VccState,
    };
    use bytes::Bytes;
    use tokio::time::timeout;

    use crate::integration::{loopback_stack, ubr};

    const WAIT: Duration = Duration::from_secs(5);

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Receives the next request, checks its action and answers OKAY.
    async fn answer_okay(
        endpoint: &mut AuthorityEndpoint,
        expected: Action,
    ) -> anyhow::Result<SignalingRequest> {
        let request = endpoint.recv().await.context("endpoint closed")?;
        assert_eq!(request.action, expected);
        endpoint.deliver(AuthorityMessage::Okay {
            vcc: request.vcc.context("request without VCC")?,
            local: request.local.clone(),
            channel: None,
            qos: request.qos.clone(),
        })?;
        Ok(request)
    }

    async fn manual_listener(
        stack: &AtmStack,
        endpoint: &mut AuthorityEndpoint,
        backlog: u32,
    ) -> anyhow::Result<SvcSocket> {
        let server = stack.create_svc(Credentials::default());
        server.set_qos(ubr()).await?;
        let (bound, answered) = tokio::join!(
            server.bind(SvcAddr::public("100")),
            answer_okay(endpoint, Action::Bind)
        );
        bound?;
        answered?;
        let (listening, answered) =
            tokio::join!(server.listen(backlog), answer_okay(endpoint, Action::Listen));
        listening?;
        answered?;
        Ok(server)
    }

    /// Places a blocking call that the authority answers with channel
    /// `0.0.vci`.
    async fn manual_call(
        stack: &AtmStack,
        endpoint: &mut AuthorityEndpoint,
        vci: u32,
    ) -> anyhow::Result<SvcSocket> {
        let client = stack.create_svc(Credentials::default());
        client.set_qos(ubr()).await?;
        let id = client.id();
        let (connected, driven) = tokio::join!(client.connect(SvcAddr::public("300")), async {
            let connect = endpoint.recv().await.context("endpoint closed")?;
            assert_eq!(connect.action, Action::Connect);
            endpoint.deliver(AuthorityMessage::Okay {
                vcc: id,
                local: SvcAddr::public("200"),
                channel: Some(ChannelAssignment { itf: 0, vpi: 0, vci }),
                qos: ubr(),
            })?;
            Ok::<_, anyhow::Error>(())
        });
        driven?;
        connected?;
        Ok(client)
    }

    fn inbound(call_ref: u64, vci: u32) -> InboundCall {
        InboundCall {
            call_ref,
            qos: ubr(),
            remote: SvcAddr::public("200"),
            local: SvcAddr::public("100"),
            sap: Default::default(),
            channel: ChannelAssignment { itf: 0, vpi: 0, vci },
        }
    }

    // =========================================================================
    // TEST GROUP 1: Cooperative authority
    // =========================================================================

    #[tokio::test]
    async fn test_call_data_and_hangup() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let authority =
            ScriptedAuthority::spawn(stack.attach_signaling(Credentials::admin())?, 0);

        let server = stack.create_svc(Credentials::default());
        server.set_qos(ubr()).await?;
        server.bind(SvcAddr::public("100")).await?;
        server.listen(1).await?;

        let client = stack.create_svc(Credentials::default());
        client.set_qos(ubr()).await?;
        let (accepted, connected) =
            tokio::join!(server.accept(), client.connect(SvcAddr::public("100")));
        connected?;
        let accepted = accepted?;

        client.send(Bytes::from_static(b"request")).await?;
        assert_eq!(
            accepted.recv().await?,
            Some(Bytes::from_static(b"request"))
        );
        accepted.send(Bytes::from_static(b"response")).await?;
        assert_eq!(
            client.recv().await?,
            Some(Bytes::from_static(b"response"))
        );

        // Dropping the caller releases the connection at both ends.
        drop(client);
        let end = timeout(WAIT, accepted.recv()).await?;
        assert_eq!(end?, None);
        assert_eq!(accepted.state(), VccState::Released);
        assert!(accepted.readiness().hangup);

        authority.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_two_callers_one_listener() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let authority =
            ScriptedAuthority::spawn(stack.attach_signaling(Credentials::admin())?, 0);
        let server = stack.create_svc(Credentials::default());
        server.set_qos(ubr()).await?;
        server.bind(SvcAddr::public("100")).await?;
        server.listen(0).await?;

        let first = stack.create_svc(Credentials::default());
        first.set_qos(ubr()).await?;
        let second = stack.create_svc(Credentials::default());
        second.set_qos(ubr()).await?;

        let accept_both = async {
            let a = server.accept().await?;
            let b = server.accept().await?;
            Ok::<_, VccError>((a, b))
        };
        let (accepted, one, two) = tokio::join!(
            accept_both,
            first.connect(SvcAddr::public("100")),
            second.connect(SvcAddr::public("100"))
        );
        one?;
        two?;
        let (a, b) = accepted?;
        assert_ne!(a.id(), b.id());

        first.send(Bytes::from_static(b"one")).await?;
        second.send(Bytes::from_static(b"two")).await?;
        let mut got = vec![a.recv().await?, b.recv().await?];
        got.sort();
        assert_eq!(
            got,
            vec![
                Some(Bytes::from_static(b"one")),
                Some(Bytes::from_static(b"two"))
            ]
        );
        authority.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_wildcard_qos_sends_nothing() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let client = stack.create_svc(Credentials::default());
        client
            .set_qos(Qos::new(
                Aal::Aal5,
                TrafficParams::new(TrafficClass::Any),
                TrafficParams::new(TrafficClass::Any),
            ))
            .await?;

        let err = client.connect(SvcAddr::public("100")).await.unwrap_err();
        assert_eq!(err, VccError::InvalidQos);
        assert!(endpoint.try_recv().is_none());
        Ok(())
    }

    // =========================================================================
    // TEST GROUP 2: Step-driven authority
    // =========================================================================

    #[tokio::test]
    async fn test_connect_then_disconnect_before_reply() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let client = stack.create_svc(Credentials::default());
        client.set_qos(ubr()).await?;
        client.set_nonblocking(true);

        let err = client.connect(SvcAddr::public("100")).await.unwrap_err();
        assert_eq!(err, VccError::InProgress);
        assert_eq!(client.state(), VccState::ConnectPending);

        let id = client.id();
        let ((), driven) = tokio::join!(client.disconnect(), async {
            let connect = endpoint.recv().await.context("endpoint closed")?;
            assert_eq!(connect.action, Action::Connect);
            let close = endpoint.recv().await.context("endpoint closed")?;
            assert_eq!(close.action, Action::Close);
            endpoint.deliver(AuthorityMessage::Close {
                vcc: id,
                reply: ReplyCode::CONNECTION_RESET,
            })?;
            Ok::<_, anyhow::Error>(())
        });
        driven?;

        assert_eq!(client.state(), VccState::Released);
        assert!(!client.vcc().outcome().is_pending());
        Ok(())
    }

    #[tokio::test]
    async fn test_late_connect_reply_after_disconnect() -> anyhow::Result<()> {
        let (stack, ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let client = stack.create_svc(Credentials::default());
        client.set_qos(ubr()).await?;
        client.set_nonblocking(true);
        assert_eq!(
            client.connect(SvcAddr::public("100")).await.unwrap_err(),
            VccError::InProgress
        );

        let id = client.id();
        let ((), driven) = tokio::join!(client.disconnect(), async {
            endpoint.recv().await.context("endpoint closed")?;
            endpoint.recv().await.context("endpoint closed")?;
            // The CONNECT succeeded before the authority saw the CLOSE.
            endpoint.deliver(AuthorityMessage::Okay {
                vcc: id,
                local: SvcAddr::public("200"),
                channel: Some(ChannelAssignment { itf: 0, vpi: 0, vci: 80 }),
                qos: ubr(),
            })?;
            endpoint.deliver(AuthorityMessage::Close {
                vcc: id,
                reply: ReplyCode::OK,
            })?;
            Ok::<_, anyhow::Error>(())
        });
        driven?;

        assert_eq!(client.state(), VccState::Released);
        assert_eq!(client.vcc().outcome(), Outcome::Idle);
        assert!(ops.opens().is_empty());
        assert!(client.vcc().is_reusable());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_accept_waits_for_end_of_listen() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let server = manual_listener(&stack, &mut endpoint, 1).await?;
        endpoint.deliver(AuthorityMessage::Indicate {
            listen_vcc: server.id(),
            call: inbound(1, 64),
        })?;
        assert_eq!(server.vcc().pending_calls(), 1);

        let listener_id = server.id();
        let (first, second, driven) = tokio::join!(server.accept(), server.accept(), async {
            answer_okay(&mut endpoint, Action::Accept).await?;
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            endpoint.deliver(AuthorityMessage::Close {
                vcc: listener_id,
                reply: ReplyCode::OK,
            })?;
            Ok::<_, anyhow::Error>(())
        });
        driven?;

        let (winner, loser) = match (first, second) {
            (Ok(socket), Err(err)) | (Err(err), Ok(socket)) => (socket, err),
            other => anyhow::bail!("expected exactly one accepted call, got {other:?}"),
        };
        assert_eq!(winner.state(), VccState::Connected);
        assert_eq!(winner.remote(), SvcAddr::public("200"));
        assert_eq!(loser, VccError::ListenerClosed);
        Ok(())
    }

    #[tokio::test]
    async fn test_full_backlog_rejects_call() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let server = manual_listener(&stack, &mut endpoint, 1).await?;

        endpoint.deliver(AuthorityMessage::Indicate {
            listen_vcc: server.id(),
            call: inbound(1, 64),
        })?;
        endpoint.deliver(AuthorityMessage::Indicate {
            listen_vcc: server.id(),
            call: inbound(2, 66),
        })?;

        let reject = endpoint.try_recv().context("no reject sent")?;
        assert_eq!(reject.action, Action::Reject);
        assert_eq!(reject.call_ref, Some(2));
        assert_eq!(reject.listen_vcc, Some(server.id()));
        assert_eq!(reject.reply, ReplyCode::BUSY);
        assert_eq!(server.vcc().pending_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_accept_restarts_on_vanished_call() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let server = manual_listener(&stack, &mut endpoint, 2).await?;
        for (call_ref, vci) in [(1, 64), (2, 66)] {
            endpoint.deliver(AuthorityMessage::Indicate {
                listen_vcc: server.id(),
                call: inbound(call_ref, vci),
            })?;
        }

        let (accepted, driven) = tokio::join!(server.accept(), async {
            let first = endpoint.recv().await.context("endpoint closed")?;
            assert_eq!(first.call_ref, Some(1));
            endpoint.deliver(AuthorityMessage::Error {
                vcc: first.vcc.context("request without VCC")?,
                reply: ReplyCode::INTERRUPTED,
            })?;
            let second = answer_okay(&mut endpoint, Action::Accept).await?;
            Ok::<_, anyhow::Error>(second)
        });
        let second = driven?;
        assert_eq!(second.call_ref, Some(2));
        let accepted = accepted?;
        assert_eq!(accepted.vcc().channel_address().map(|c| c.2.value()), Some(Some(66)));
        Ok(())
    }

    #[tokio::test]
    async fn test_authority_modify_applies_to_device() -> anyhow::Result<()> {
        let (stack, ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let client = manual_call(&stack, &mut endpoint, 90).await?;
        let id = client.id();
        assert_eq!(client.local(), SvcAddr::public("200"));

        let wanted = Qos::new(
            Aal::Aal5,
            TrafficParams::ubr().with_max_sdu(512),
            TrafficParams::ubr(),
        );
        endpoint.deliver(AuthorityMessage::Modify {
            vcc: id,
            qos: wanted.clone(),
        })?;
        let answer = endpoint.try_recv().context("no answer to MODIFY")?;
        assert_eq!(answer.action, Action::Okay);
        assert_eq!(answer.vcc, Some(id));
        assert_eq!(ops.qos_changes(), vec![(wanted, QosChangeMode::Set)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_refused_modify_keeps_call() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let client = manual_call(&stack, &mut endpoint, 90).await?;
        let id = client.id();

        let wanted = Qos::new(
            Aal::Aal5,
            TrafficParams::ubr().with_max_sdu(512),
            TrafficParams::ubr(),
        );
        let (changed, driven) = tokio::join!(client.change_qos(wanted), async {
            let modify = endpoint.recv().await.context("endpoint closed")?;
            assert_eq!(modify.action, Action::Modify);
            endpoint.deliver(AuthorityMessage::Error {
                vcc: id,
                reply: ReplyCode::INVALID,
            })?;
            Ok::<_, anyhow::Error>(())
        });
        driven?;
        assert_eq!(changed.unwrap_err(), VccError::Rejected(ReplyCode::INVALID));
        assert_eq!(client.state(), VccState::Connected);
        assert!(!client.readiness().error);

        // The call is still up at the authority, so disconnect must close it.
        let ((), driven) = tokio::join!(client.disconnect(), async {
            let close = endpoint.recv().await.context("no CLOSE after refused MODIFY")?;
            assert_eq!(close.action, Action::Close);
            assert_eq!(close.vcc, Some(id));
            endpoint.deliver(AuthorityMessage::Close {
                vcc: id,
                reply: ReplyCode::OK,
            })?;
            Ok::<_, anyhow::Error>(())
        });
        driven?;
        assert_eq!(client.state(), VccState::Released);
        assert!(client.vcc().is_reusable());
        Ok(())
    }

    #[tokio::test]
    async fn test_released_nonblocking_connect_reports_code() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let client = stack.create_svc(Credentials::default());
        client.set_qos(ubr()).await?;
        client.set_nonblocking(true);
        let remote = SvcAddr::public("100");

        assert_eq!(
            client.connect(remote.clone()).await.unwrap_err(),
            VccError::InProgress
        );
        let connect = endpoint.recv().await.context("endpoint closed")?;
        assert_eq!(connect.action, Action::Connect);
        endpoint.deliver(AuthorityMessage::Close {
            vcc: client.id(),
            reply: ReplyCode::CONNECTION_REFUSED,
        })?;
        assert_eq!(
            client.vcc().outcome(),
            Outcome::Resolved(ReplyCode::CONNECTION_REFUSED)
        );

        assert_eq!(
            client.connect(remote.clone()).await.unwrap_err(),
            VccError::Rejected(ReplyCode::CONNECTION_REFUSED)
        );
        // Reported once; afterwards the release policy applies.
        assert_eq!(
            client.connect(remote.clone()).await.unwrap_err(),
            VccError::Released
        );

        // Already released at the authority: nothing to send.
        client.disconnect().await;
        assert!(endpoint.try_recv().is_none());
        assert!(client.vcc().is_reusable());
        Ok(())
    }

    #[tokio::test]
    async fn test_accept_rejects_unusable_channel() -> anyhow::Result<()> {
        let (stack, ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let server = manual_listener(&stack, &mut endpoint, 1).await?;
        endpoint.deliver(AuthorityMessage::Indicate {
            listen_vcc: server.id(),
            call: inbound(7, 70_000),
        })?;

        let err = server.accept().await.unwrap_err();
        assert!(matches!(err, VccError::CircuitOutOfRange { .. }));

        let reject = endpoint.try_recv().context("no reject sent")?;
        assert_eq!(reject.action, Action::Reject);
        assert_eq!(reject.call_ref, Some(7));
        assert_eq!(reject.listen_vcc, Some(server.id()));
        assert_eq!(reject.reply, err.reply_code());
        assert!(endpoint.try_recv().is_none());
        assert_eq!(server.vcc().pending_calls(), 0);
        assert!(ops.opens().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unusable_assigned_channel_closes_call() -> anyhow::Result<()> {
        let (stack, ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let client = stack.create_svc(Credentials::default());
        client.set_qos(ubr()).await?;

        let id = client.id();
        let (connected, driven) = tokio::join!(client.connect(SvcAddr::public("300")), async {
            let connect = endpoint.recv().await.context("endpoint closed")?;
            assert_eq!(connect.action, Action::Connect);
            endpoint.deliver(AuthorityMessage::Okay {
                vcc: id,
                local: SvcAddr::public("200"),
                channel: Some(ChannelAssignment { itf: 0, vpi: 0, vci: 70_000 }),
                qos: ubr(),
            })?;
            let close = endpoint.recv().await.context("no CLOSE for unusable channel")?;
            assert_eq!(close.action, Action::Close);
            assert_eq!(close.vcc, Some(id));
            endpoint.deliver(AuthorityMessage::Close {
                vcc: id,
                reply: ReplyCode::OK,
            })?;
            Ok::<_, anyhow::Error>(())
        });
        driven?;

        assert!(matches!(
            connected.unwrap_err(),
            VccError::CircuitOutOfRange { .. }
        ));
        assert_eq!(client.state(), VccState::Released);
        assert!(!client.vcc().is_bound_to_device());
        assert!(client.vcc().is_reusable());
        assert!(ops.opens().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_authority_death_mid_connect() -> anyhow::Result<()> {
        let (stack, _ops) = loopback_stack()?;
        let mut endpoint = stack.attach_signaling(Credentials::admin())?;
        let client = stack.create_svc(Credentials::default());
        client.set_qos(ubr()).await?;

        let (connected, ()) = tokio::join!(client.connect(SvcAddr::public("100")), async {
            let _ = endpoint.recv().await;
            endpoint.detach();
        });
        let err = connected.unwrap_err();
        assert_eq!(err, VccError::Unreachable);
        assert_eq!(err.kind(), ErrorKind::SignalingUnavailable);
        assert!(!stack.signaling_attached());
        assert!(client.vcc().is_reusable());

        // A new authority can take over.
        let authority =
            ScriptedAuthority::spawn(stack.attach_signaling(Credentials::admin())?, 0);
        client.bind(SvcAddr::public("150")).await?;
        authority.shutdown().await;
        Ok(())
    }
}
