/**
 * VITALSYNC KERNEL - Point d'entrée d'une surface VitalSync
 *
 * RÔLE : Orchestration config, canal de synchro, surface, relais MQTT, API HTTP.
 * Un processus = une surface (montre OU compagnon), choisie par VITALSYNC_MODE.
 *
 * ARCHITECTURE : état local par surface + messages sur le canal + relais broker optionnel.
 * Sans broker : mode dégradé mono-processus, signalé dans /system/health.
 */

mod analysis;
mod config;
mod contacts;
mod health;
mod history;
mod http;
mod models;
mod mqtt;
mod simulator;
mod state;
mod surface;
mod sync;

use crate::analysis::AnalysisGateway;
use crate::config::{load_config, SurfaceMode};
use crate::health::HealthTracker;
use crate::http::{AppState, API_KEY_ENV};
use crate::models::VitalsReading;
use crate::simulator::Simulator;
use crate::surface::Surface;
use crate::sync::SyncBus;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env optionnel (GEMINI_API_KEY, VITALSYNC_MODE...)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;
    tracing::info!("[kernel] starting {} surface on channel {}", cfg.mode, cfg.channel);

    // canal + surface locale
    let bus = SyncBus::new(cfg.bus_buffer);
    let surface = Arc::new(Surface::new(
        cfg.mode,
        bus.open(&cfg.channel, cfg.mode.to_string()),
        VitalsReading::initial(OffsetDateTime::now_utc()),
        cfg.history_capacity,
    ));
    surface.attach();

    if cfg.mode == SurfaceMode::Wearable {
        let period = Duration::from_millis(cfg.tick_interval_ms);
        match cfg.simulator_seed {
            Some(seed) => surface.start_wearable_with(period, Simulator::seeded(seed))?,
            None => surface.start_wearable(period)?,
        }
    }

    let gateway = Arc::new(AnalysisGateway::from_env(&cfg.analysis));
    if !gateway.is_configured() {
        tracing::warn!("[kernel] GEMINI_API_KEY absent, analyses will return a placeholder");
    }

    // relais inter-processus
    let health_tracker = HealthTracker::new();
    let relay = match &cfg.mqtt {
        Some(mqtt_cfg) => {
            let node = format!("{}-{}", cfg.mode, uuid::Uuid::new_v4().simple());
            Some(mqtt::spawn_relay(
                bus.open(&cfg.channel, "relay"),
                mqtt_cfg,
                node,
                surface.clone(),
                health_tracker.clone(),
            ))
        }
        None => {
            tracing::warn!("[kernel] no mqtt broker configured, single-process mode");
            None
        }
    };

    let app_state = AppState {
        surface: surface.clone(),
        gateway,
        health_tracker,
        api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()),
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("cannot bind {}", cfg.http.bind))?;
    tracing::info!("[kernel] listening on http://{}", cfg.http.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("[kernel] ctrl_c handler failed: {e}");
            }
        })
        .await
        .context("http server failed")?;

    tracing::info!("[kernel] shutting down");
    if let Some(relay) = relay {
        relay.abort();
    }
    surface.close().await;
    Ok(())
}
