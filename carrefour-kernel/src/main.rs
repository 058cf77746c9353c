/**
 * CARREFOUR KERNEL - Point d'entrée du noyau de supervision
 *
 * RÔLE : Bootstrap de tous les modules : config, MQTT, pont magasin, moteur
 * de réconciliation, session, HTTP. Vue opérationnelle temps réel d'une
 * installation de feux tricolores distante.
 *
 * ARCHITECTURE : Event-driven (push MQTT + pulls cadencés) + API REST
 * snapshots. Le serveur ne crashe jamais sur une panne distante : il dégrade
 * toujours vers le dernier instantané connu.
 */

use carrefour_kernel::config::load_config;
use carrefour_kernel::engine::Engine;
use carrefour_kernel::health::HealthTracker;
use carrefour_kernel::http::{self, AppState};
use carrefour_kernel::mqtt;
use carrefour_kernel::session::{FileKv, KvStore, SessionContext};
use carrefour_kernel::state::DashboardState;
use carrefour_kernel::store::StoreBridge;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let cfg = load_config().await;

    std::fs::create_dir_all(&cfg.data_dir).unwrap_or_else(|e| {
        eprintln!("[kernel] warning: failed to create data dir: {e}");
    });

    // état partagé + health tracker
    let state = DashboardState::new();
    let health = HealthTracker::new();

    // client MQTT partagé : pont magasin + publication santé
    let (mqtt_client, eventloop) = mqtt::create_mqtt_client(&cfg);
    let bridge = Arc::new(StoreBridge::new(mqtt_client.clone(), cfg.store_timeout_ms));
    let mqtt_task = mqtt::spawn_mqtt_listener(
        mqtt_client.clone(),
        eventloop,
        bridge.clone(),
        health.clone(),
    );

    // moteur de réconciliation (pulls cadencés + forwarders push)
    let engine = Engine::start(
        bridge.clone(),
        state.clone(),
        Duration::from_millis(cfg.poll_interval_ms),
    );

    let health_task = health.spawn_health_publisher(mqtt_client.clone(), state.clone());

    // contexte de session explicite, indicateur persisté dans data_dir
    let kv: Arc<dyn KvStore> = Arc::new(FileKv::open(format!("{}/session.json", cfg.data_dir)));
    let session = SessionContext::init(kv);

    let app_state = AppState {
        state,
        store: bridge,
        session,
        health,
    };
    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    println!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("[kernel] http server terminated: {e}");
    }

    // teardown : libère pollers, forwarders, publication santé et boucle MQTT
    engine.shutdown();
    health_task.abort();
    mqtt_task.abort();
    Ok(())
}
