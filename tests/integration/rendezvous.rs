//! Rendezvous scenarios: full groups, unresolvable peers, silent
//! peers, and garbage on the wire.

use std::sync::Arc;
use std::time::Duration;

use muster_core::wire::{Message, MessageKind};
use muster_engine::{EngineError, HandshakeEngine, PeerRegistry};

use crate::{fast_timing, free_ports, spawn_engine};

#[tokio::test]
async fn three_processes_reach_readiness() -> anyhow::Result<()> {
    let ports = free_ports(3)?;

    let runs: Vec<_> = (1..=3).map(|id| spawn_engine(id, &ports, fast_timing())).collect();

    for (registry, task) in runs {
        task.await?.expect("engine should reach readiness");
        let status = registry.status();
        assert_eq!(status.acked, 2, "every other peer must have ACKed");
        assert_eq!(status.helloed, 2, "every other peer must have greeted");
        assert!(registry.all_ready());
    }
    Ok(())
}

#[tokio::test]
async fn two_processes_reach_readiness() -> anyhow::Result<()> {
    let ports = free_ports(2)?;

    let (registry_a, task_a) = spawn_engine(1, &ports, fast_timing());
    let (registry_b, task_b) = spawn_engine(2, &ports, fast_timing());

    task_a.await?.expect("engine 1 should reach readiness");
    task_b.await?.expect("engine 2 should reach readiness");

    assert!(registry_a.all_ready());
    assert!(registry_b.all_ready());
    Ok(())
}

#[tokio::test]
async fn received_hello_always_elicits_ack() -> anyhow::Result<()> {
    let ports = free_ports(2)?;

    // Process 2 is played by a bare socket that never ACKs, so the
    // engine cannot finish — it must still answer every HELLO.
    let probe = tokio::net::UdpSocket::bind(("127.0.0.1", ports[1])).await?;
    let (_registry, task) = spawn_engine(1, &ports, fast_timing());

    let engine_addr = format!("127.0.0.1:{}", ports[0]);
    let mut buf = [0u8; 64];

    for seq in 0..3 {
        probe
            .send_to(&Message::hello(2, seq).encode(), &engine_addr)
            .await?;

        // The engine also HELLOs us; skip those and wait for the reply.
        let ack = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let (len, _) = probe.recv_from(&mut buf).await.unwrap();
                if let Ok(msg) = Message::decode(&buf[..len]) {
                    if msg.kind == MessageKind::Ack {
                        return msg;
                    }
                }
            }
        })
        .await
        .expect("HELLO must be answered with an ACK");

        assert_eq!(ack.sender, 1);
    }

    task.abort();
    Ok(())
}

#[tokio::test]
async fn unresolvable_peer_fails_before_discovery() -> anyhow::Result<()> {
    let ports = free_ports(2)?;
    let live = tokio::net::UdpSocket::bind(("127.0.0.1", ports[1])).await?;

    let registry = Arc::new(PeerRegistry::new(1, 3));
    registry.add_peer(2, "127.0.0.1", ports[1]);
    // .invalid is reserved (RFC 2606) and can never resolve.
    registry.add_peer(3, "no-such-peer.invalid", 9000);

    let engine = HandshakeEngine::new(registry, ports[0], fast_timing());
    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, EngineError::Resolve { .. }));

    // The run died before discovery: not one datagram reached the peer
    // that did resolve.
    let mut buf = [0u8; 64];
    let heard = tokio::time::timeout(Duration::from_millis(300), live.recv_from(&mut buf)).await;
    assert!(heard.is_err(), "no discovery traffic should have been sent");
    Ok(())
}

#[tokio::test]
async fn silent_peer_exhausts_round_budget() -> anyhow::Result<()> {
    let ports = free_ports(2)?;

    // Bound but mute — datagrams land and are ignored.
    let _silent = tokio::net::UdpSocket::bind(("127.0.0.1", ports[1])).await?;

    let timing = muster_core::config::TimingConfig {
        max_rounds: 5,
        ..fast_timing()
    };
    let (registry, task) = spawn_engine(1, &ports, timing);

    match task.await? {
        Err(EngineError::Timeout { rounds }) => assert_eq!(rounds, 5),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(!registry.all_ready());
    Ok(())
}

#[tokio::test]
async fn malformed_datagrams_are_dropped_mid_run() -> anyhow::Result<()> {
    let ports = free_ports(2)?;

    // Longer settle so the garbage lands while both engines listen but
    // before either can finish.
    let timing = muster_core::config::TimingConfig {
        settle_delay_ms: 200,
        ..fast_timing()
    };
    let (registry_a, task_a) = spawn_engine(1, &ports, timing.clone());
    let (registry_b, task_b) = spawn_engine(2, &ports, timing);

    let rogue = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
    for port in &ports {
        let dest = format!("127.0.0.1:{port}");
        rogue.send_to(&[0u8; 5], &dest).await?; // too short
        rogue.send_to(&[0u8; 21], &dest).await?; // too long

        // Right length, junk kind byte and a sender id outside the group.
        let mut junk = Message::hello(9, 0).encode();
        junk[0] = 0x7F;
        rogue.send_to(&junk, &dest).await?;
    }

    task_a.await?.expect("engine 1 should still reach readiness");
    task_b.await?.expect("engine 2 should still reach readiness");

    // The garbage never touched the evidence sets.
    for registry in [registry_a, registry_b] {
        let status = registry.status();
        assert_eq!(status.acked, 1);
        assert_eq!(status.helloed, 1);
    }
    Ok(())
}
