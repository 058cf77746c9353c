use crate::signals;
use crate::state::DashboardState;
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

pub const TOPIC_KERNEL_HEALTH: &str = "carrefour/kernel/health@v1";

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
    pub samples_applied: u64,
    pub alerts_tracked: u32,
    pub feed_healthy: bool,
    /// Âge du dernier échantillon en secondes, None si rien reçu
    pub feed_age_seconds: Option<i64>,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<parking_lot::Mutex<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(parking_lot::Mutex::new("connecting".to_string())),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn get_health(&self, state: &DashboardState, now: OffsetDateTime) -> KernelHealth {
        let (samples_applied, feed_healthy, feed_age_seconds) = {
            let live = state.live.lock();
            (
                live.applied(),
                signals::connection_healthy(live.current(), now),
                live.current().map(|s| (now - s.created_at).whole_seconds()),
            )
        };
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
            samples_applied,
            alerts_tracked: state.alerts.lock().len() as u32,
            feed_healthy,
            feed_age_seconds,
        }
    }

    /// Publication auto de la santé kernel sur le bus, toutes les 30 s
    pub fn spawn_health_publisher(
        &self,
        client: AsyncClient,
        state: DashboardState,
    ) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::task::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let health = tracker.get_health(&state, OffsetDateTime::now_utc());
                if let Ok(payload) = serde_json::to_string(&health) {
                    if let Err(e) = client
                        .publish(TOPIC_KERNEL_HEALTH, QoS::AtLeastOnce, false, payload)
                        .await
                    {
                        eprintln!("[health] failed to publish: {e:?}");
                    }
                }
            }
        })
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
