use std::time::Instant;

use akita_core::envelope::DecodeError;
use akita_core::{MeshPacket, IPFS_PORT};
use akita_services::{DropReason, RelayError, RelayOutcome, TickOutcome};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Gateway failures
// ══════════════════════════════════════════════════════════════════════════════

/// Refused connection: the request fails, nothing reaches the mesh, and the
/// bridge stays enabled for the next packet.
#[tokio::test]
async fn test_connection_refused() -> Result<()> {
    let (mut engine, mut mesh) = gateway_engine(closed_port().await);

    let outcome = engine
        .on_mesh_packet(&MeshPacket::new(7, IPFS_PORT, "hello"))
        .await;
    match outcome {
        RelayOutcome::Failed(RelayError::ConnectFailed { .. }) => {}
        other => panic!("expected ConnectFailed, got {other:?}"),
    }

    assert!(engine.is_enabled());
    assert!(matches!(engine.on_tick(), TickOutcome::Idle));
    assert!(mesh.try_recv().is_err());
    assert_eq!(engine.stats().failed, 1);
    assert_eq!(engine.stats().forwarded, 0);
    Ok(())
}

/// No connection outlives the exchange that opened it, on either path.
#[tokio::test]
async fn test_connections_never_leak() -> Result<()> {
    let gateway = MockGateway::start(|_| vec![data_reply("x", 1)]).await?;
    let (mut engine, _mesh) = gateway_engine(gateway.port());

    for _ in 0..5 {
        engine
            .on_mesh_packet(&MeshPacket::new(1, IPFS_PORT, SAMPLE_CID))
            .await;
        assert_eq!(engine.store().client().open_connections(), 0);
    }

    engine.set_gateway("127.0.0.1", closed_port().await);
    for _ in 0..5 {
        engine
            .on_mesh_packet(&MeshPacket::new(1, IPFS_PORT, SAMPLE_CID))
            .await;
        assert_eq!(engine.store().client().open_connections(), 0);
    }
    assert_eq!(engine.stats().forwarded, 5);
    assert_eq!(engine.stats().failed, 5);
    Ok(())
}

/// A malformed reply is dropped and the following one is still delivered.
#[tokio::test]
async fn test_malformed_reply_is_dropped() -> Result<()> {
    let gateway =
        MockGateway::start(|_| vec!["not json".to_string(), data_reply("ok", 3)]).await?;
    let (mut engine, mut mesh) = gateway_engine(gateway.port());

    engine
        .on_mesh_packet(&MeshPacket::new(3, IPFS_PORT, SAMPLE_CID))
        .await;

    match engine.on_tick() {
        TickOutcome::Dropped(DropReason::Undecodable(DecodeError::Malformed(_))) => {}
        other => panic!("expected malformed drop, got {other:?}"),
    }
    assert!(mesh.try_recv().is_err());

    assert!(matches!(engine.on_tick(), TickOutcome::Delivered(_)));
    assert_eq!(&next_packet(&mut mesh).await.payload[..], b"ok");
    assert_eq!(engine.stats().dropped, 1);
    assert_eq!(engine.stats().delivered, 1);
    Ok(())
}

/// Reply types other than `cid` and `data` are ignored.
#[tokio::test]
async fn test_unknown_reply_type_is_dropped() -> Result<()> {
    let gateway = MockGateway::start(|_| {
        vec![
            serde_json::json!({ "type": "status", "ok": true }).to_string(),
            serde_json::json!({ "data": "untyped", "sender": 1 }).to_string(),
        ]
    })
    .await?;
    let (mut engine, mut mesh) = gateway_engine(gateway.port());

    engine
        .on_mesh_packet(&MeshPacket::new(1, IPFS_PORT, "hello"))
        .await;

    for _ in 0..2 {
        assert!(matches!(
            engine.on_tick(),
            TickOutcome::Dropped(DropReason::Unrecognized)
        ));
    }
    assert!(mesh.try_recv().is_err());
    Ok(())
}

/// A `cid` reply without its CID cannot be routed anywhere useful.
#[tokio::test]
async fn test_reply_missing_payload_is_dropped() -> Result<()> {
    let gateway = MockGateway::start(|_| {
        vec![serde_json::json!({ "type": "cid", "sender": 4 }).to_string()]
    })
    .await?;
    let (mut engine, mut mesh) = gateway_engine(gateway.port());

    engine
        .on_mesh_packet(&MeshPacket::new(4, IPFS_PORT, "hello"))
        .await;
    assert!(matches!(
        engine.on_tick(),
        TickOutcome::Dropped(DropReason::Undecodable(DecodeError::MissingField { .. }))
    ));
    assert!(mesh.try_recv().is_err());
    Ok(())
}

/// Oversized requests are refused before the gateway is contacted.
#[tokio::test]
async fn test_oversized_request_never_sent() -> Result<()> {
    let gateway = MockGateway::silent().await?;
    let (mut engine, _mesh) = gateway_engine(gateway.port());

    let big = "z".repeat(2048);
    let outcome = engine
        .on_mesh_packet(&MeshPacket::new(1, IPFS_PORT, big))
        .await;
    assert!(matches!(
        outcome,
        RelayOutcome::Failed(RelayError::ResourceExhausted { .. })
    ));
    assert!(gateway.requests().is_empty());
    Ok(())
}

/// With no gateway address the request fails without touching the network.
#[tokio::test]
async fn test_unconfigured_gateway() -> Result<()> {
    let (mut engine, _mesh) = gateway_engine(0);
    engine.set_gateway("", 0);

    let outcome = engine
        .on_mesh_packet(&MeshPacket::new(1, IPFS_PORT, "hello"))
        .await;
    assert!(matches!(
        outcome,
        RelayOutcome::Failed(RelayError::NotConfigured)
    ));
    Ok(())
}

/// A gateway that accepts but never answers costs at most the read timeout.
#[tokio::test]
async fn test_unresponsive_gateway_is_bounded() -> Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let hold = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let (mut engine, _mesh) = gateway_engine(port);
    let started = Instant::now();
    let outcome = engine
        .on_mesh_packet(&MeshPacket::new(1, IPFS_PORT, "hello"))
        .await;

    assert!(matches!(outcome, RelayOutcome::StoreRequested), "{outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(engine.on_tick(), TickOutcome::Idle));
    assert_eq!(engine.store().client().open_connections(), 0);
    hold.abort();
    Ok(())
}
