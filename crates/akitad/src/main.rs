//! akitad: mesh ⇄ content gateway bridge daemon.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};

use akita_core::config::{AkitaConfig, StorageMode};
use akita_core::{BridgeConfig, FilePrefs, MemoryPrefs, MeshPacket, OutboundPacket, Prefs};
use akita_services::{ContentStore, GatewayStore, LocalStore, RelayEngine};

mod mesh_link;

type MeshSender = mpsc::UnboundedSender<OutboundPacket>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = AkitaConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = AkitaConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        AkitaConfig::default()
    });
    tracing::info!(storage = ?config.storage.mode, "akitad starting");

    // Bridge prefs
    let mut prefs: Box<dyn Prefs> = match FilePrefs::open(&config.prefs.path) {
        Ok(p) => {
            tracing::info!(path = %p.path().display(), "prefs loaded");
            Box::new(p)
        }
        Err(e) => {
            tracing::warn!(error = %e, "prefs unavailable, settings will not persist");
            Box::new(MemoryPrefs::new())
        }
    };
    let mut bridge = BridgeConfig::load(prefs.as_ref());
    if let Err(e) = bridge.save(prefs.as_mut()) {
        tracing::warn!(error = %e, "failed to persist bridge config");
    }

    if config.storage.mode == StorageMode::Gateway && bridge.enabled && !bridge.has_gateway() {
        tracing::warn!("no gateway address configured, bridge starts disabled");
        bridge.enabled = false;
    }
    tracing::info!(
        enabled = bridge.enabled,
        gateway = %bridge.gateway_address,
        port = bridge.gateway_port,
        poll_interval_ms = bridge.poll_interval_ms,
        "bridge config"
    );

    // Mesh link
    let bind_addr: SocketAddr = config
        .mesh
        .bind_addr
        .parse()
        .with_context(|| format!("invalid mesh bind_addr {:?}", config.mesh.bind_addr))?;
    let radio_addr: SocketAddr = config
        .mesh
        .radio_addr
        .parse()
        .with_context(|| format!("invalid mesh radio_addr {:?}", config.mesh.radio_addr))?;
    let socket = mesh_link::bind(bind_addr).context("failed to bind mesh link")?;

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<MeshPacket>();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<OutboundPacket>();

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let receive_task = tokio::spawn(mesh_link::receive_loop(
        socket.clone(),
        radio_addr,
        inbound_tx,
    ));
    let send_task = tokio::spawn(mesh_link::send_loop(socket, radio_addr, outbound_rx));

    // The relay runs on this task: both triggers share one engine and must
    // never overlap.
    let status_interval = Duration::from_secs(config.status_interval_secs.max(1));
    let shutdown_rx = shutdown_tx.subscribe();
    let relay = async {
        match config.storage.mode {
            StorageMode::Gateway => {
                let store = GatewayStore::new(&bridge, config.gateway.clone());
                let engine = RelayEngine::new(bridge, store, outbound_tx);
                run_relay(engine, inbound_rx, status_interval, shutdown_rx).await
            }
            StorageMode::Local => {
                tracing::info!(
                    capacity = config.storage.local_capacity_bytes,
                    "embedded content store"
                );
                let store = LocalStore::new(config.storage.local_capacity_bytes);
                let engine = RelayEngine::new(bridge, store, outbound_tx);
                run_relay(engine, inbound_rx, status_interval, shutdown_rx).await
            }
        }
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = relay           => tracing::info!("shutting down"),
        r = receive_task    => tracing::error!("mesh receive loop exited: {:?}", r),
        r = send_task       => tracing::error!("mesh send loop exited: {:?}", r),
    }

    Ok(())
}

/// Drive the engine until shutdown or until the mesh link goes away.
async fn run_relay<S: ContentStore>(
    mut engine: RelayEngine<S, MeshSender>,
    mut inbound: mpsc::UnboundedReceiver<MeshPacket>,
    status_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut poll = tokio::time::interval(engine.config().poll_interval());
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut status = tokio::time::interval(status_interval);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,

            packet = inbound.recv() => {
                let Some(packet) = packet else {
                    tracing::warn!("mesh link closed");
                    break;
                };
                let outcome = engine.on_mesh_packet(&packet).await;
                tracing::trace!(?outcome, "mesh packet handled");
            }

            _ = poll.tick() => {
                let outcome = engine.on_tick();
                tracing::trace!(?outcome, "tick");
            }

            _ = status.tick() => engine.log_status(),
        }
    }

    let stats = engine.stats();
    tracing::info!(
        forwarded = stats.forwarded,
        failed = stats.failed,
        delivered = stats.delivered,
        dropped = stats.dropped,
        "relay stopped"
    );
}
