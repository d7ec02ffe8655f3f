use akita_core::{MeshPacket, IPFS_PORT};
use akita_services::{RelayOutcome, TickOutcome};
use serde_json::json;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Mesh → gateway → mesh
// ══════════════════════════════════════════════════════════════════════════════

/// Raw text from the mesh becomes a store request; the CID the gateway hands
/// back goes to the node that sent the text.
#[tokio::test]
async fn test_raw_text_is_stored_and_cid_returned() -> Result<()> {
    let gateway = MockGateway::start(|req| {
        let sender = req["sender"].as_u64().unwrap_or_default();
        vec![cid_reply(SAMPLE_CID, sender)]
    })
    .await?;
    let (mut engine, mut mesh) = gateway_engine(gateway.port());

    let outcome = engine
        .on_mesh_packet(&MeshPacket::new(7, IPFS_PORT, "hello"))
        .await;
    assert!(matches!(outcome, RelayOutcome::StoreRequested), "{outcome:?}");
    assert_eq!(
        gateway.requests(),
        vec![json!({ "type": "store", "data": "hello", "sender": 7 })]
    );

    assert!(matches!(engine.on_tick(), TickOutcome::Delivered(_)));
    let packet = next_packet(&mut mesh).await;
    assert_eq!(packet.destination, 7);
    assert_eq!(packet.port, IPFS_PORT);
    assert_eq!(&packet.payload[..], SAMPLE_CID.as_bytes());
    Ok(())
}

/// A 46-character hex payload is treated as a CID and retrieved.
#[tokio::test]
async fn test_cid_payload_is_retrieved() -> Result<()> {
    let gateway = MockGateway::start(|req| {
        let sender = req["sender"].as_u64().unwrap_or_default();
        vec![data_reply("hello", sender)]
    })
    .await?;
    let (mut engine, mut mesh) = gateway_engine(gateway.port());

    let outcome = engine
        .on_mesh_packet(&MeshPacket::new(12, IPFS_PORT, SAMPLE_CID))
        .await;
    match outcome {
        RelayOutcome::RetrieveRequested(cid) => assert_eq!(cid.as_str(), SAMPLE_CID),
        other => panic!("expected retrieve, got {other:?}"),
    }
    assert_eq!(
        gateway.requests(),
        vec![json!({ "type": "retrieve", "cid": SAMPLE_CID, "sender": 12 })]
    );

    engine.on_tick();
    let packet = next_packet(&mut mesh).await;
    assert_eq!(packet.destination, 12);
    assert_eq!(&packet.payload[..], b"hello");
    Ok(())
}

/// Replies are routed by the sender the gateway names, not by whoever spoke
/// last on the mesh.
#[tokio::test]
async fn test_data_reply_routes_to_named_sender() -> Result<()> {
    let gateway = MockGateway::start(|_| vec![data_reply("hello", 7)]).await?;
    let (mut engine, mut mesh) = gateway_engine(gateway.port());

    engine
        .on_mesh_packet(&MeshPacket::new(99, IPFS_PORT, SAMPLE_CID))
        .await;
    engine.on_tick();

    let packet = next_packet(&mut mesh).await;
    assert_eq!(packet.destination, 7);
    assert_eq!(&packet.payload[..], b"hello");
    Ok(())
}

/// Requests go out as one JSON line followed by an empty line.
#[tokio::test]
async fn test_request_framing_on_the_wire() -> Result<()> {
    let gateway = MockGateway::silent().await?;
    let (mut engine, _mesh) = gateway_engine(gateway.port());

    engine
        .on_mesh_packet(&MeshPacket::new(3, IPFS_PORT, "ping"))
        .await;

    let raw = gateway.raw_requests();
    assert_eq!(raw.len(), 1);
    assert!(raw[0].ends_with("}\n\n"), "unexpected framing: {:?}", raw[0]);
    assert_eq!(raw[0].lines().filter(|l| !l.is_empty()).count(), 1);
    Ok(())
}

/// Several replies queued by one exchange drain one per tick, in order.
#[tokio::test]
async fn test_one_reply_per_tick() -> Result<()> {
    let gateway = MockGateway::start(|_| {
        vec![data_reply("first", 1), data_reply("second", 2)]
    })
    .await?;
    let (mut engine, mut mesh) = gateway_engine(gateway.port());

    engine
        .on_mesh_packet(&MeshPacket::new(1, IPFS_PORT, SAMPLE_CID))
        .await;
    assert_eq!(engine.store().client().pending_replies(), 2);

    engine.on_tick();
    assert_eq!(&next_packet(&mut mesh).await.payload[..], b"first");
    assert!(mesh.try_recv().is_err());

    engine.on_tick();
    assert_eq!(&next_packet(&mut mesh).await.payload[..], b"second");

    assert!(matches!(engine.on_tick(), TickOutcome::Idle));
    Ok(())
}

/// Packets on other ports never reach the gateway.
#[tokio::test]
async fn test_foreign_port_is_ignored() -> Result<()> {
    let gateway = MockGateway::silent().await?;
    let (mut engine, _mesh) = gateway_engine(gateway.port());

    let outcome = engine
        .on_mesh_packet(&MeshPacket::new(4, IPFS_PORT + 1, "hello"))
        .await;
    assert!(matches!(outcome, RelayOutcome::OtherPort(p) if p == IPFS_PORT + 1));
    assert!(gateway.requests().is_empty());
    Ok(())
}

/// A disabled bridge neither relays nor delivers; re-enabling resumes both.
#[tokio::test]
async fn test_disable_and_reenable() -> Result<()> {
    let gateway = MockGateway::start(|_| vec![data_reply("back", 5)]).await?;
    let (mut engine, mut mesh) = gateway_engine(gateway.port());

    engine.set_enabled(false);
    let outcome = engine
        .on_mesh_packet(&MeshPacket::new(5, IPFS_PORT, SAMPLE_CID))
        .await;
    assert!(matches!(outcome, RelayOutcome::Disabled));
    assert!(matches!(engine.on_tick(), TickOutcome::Disabled));
    assert!(gateway.requests().is_empty());

    engine.set_enabled(true);
    engine
        .on_mesh_packet(&MeshPacket::new(5, IPFS_PORT, SAMPLE_CID))
        .await;
    engine.on_tick();
    assert_eq!(&next_packet(&mut mesh).await.payload[..], b"back");
    Ok(())
}

/// Pointing the engine at a new gateway takes effect on the next request.
#[tokio::test]
async fn test_gateway_switch() -> Result<()> {
    let old = MockGateway::silent().await?;
    let new = MockGateway::silent().await?;
    let (mut engine, _mesh) = gateway_engine(old.port());

    engine
        .on_mesh_packet(&MeshPacket::new(1, IPFS_PORT, "one"))
        .await;
    engine.set_gateway("127.0.0.1", new.port());
    engine
        .on_mesh_packet(&MeshPacket::new(1, IPFS_PORT, "two"))
        .await;

    assert_eq!(old.requests().len(), 1);
    assert_eq!(new.requests()[0]["data"], "two");
    Ok(())
}
