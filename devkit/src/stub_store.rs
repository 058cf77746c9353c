/*!
Stub du magasin distant pour développer et tester sans broker MQTT

Équivalent en mémoire du StoreBridge du noyau: requêtes servies depuis une
histoire append-only, insertion rediffusée aux abonnés comme le ferait le
magasin réel, pannes et latences injectables pour scénariser les
entrelacements push/pull.
*/

use carrefour_kernel::store::{StoreError, StreamKind, TrafficStore};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

#[derive(Default)]
struct StreamState {
    /// Ordre d'insertion ; les requêtes rendent les dernières N, inversées
    rows: Vec<Value>,
    subscribers: Vec<mpsc::UnboundedSender<Value>>,
}

#[derive(Default)]
struct Inner {
    streams: HashMap<StreamKind, StreamState>,
    /// Nombre de prochaines requêtes/insertions à faire échouer
    fail_queries: u32,
    fail_inserts: u32,
    /// Latence artificielle avant de servir une requête
    query_delay: Option<Duration>,
    /// Journal des requêtes vues, pour assertions
    queries_seen: Vec<(StreamKind, usize)>,
}

/// Magasin en mémoire scriptable
#[derive(Clone, Default)]
pub struct StubStore {
    inner: Arc<Mutex<Inner>>,
}

impl StubStore {
    pub fn new() -> Self {
        // init logging pour les tests qui le souhaitent
        env_logger::try_init().ok();
        Self::default()
    }

    /// Ligne préexistante côté magasin: visible au prochain pull, pas de push
    pub fn seed(&self, stream: StreamKind, row: Value) {
        self.inner
            .lock()
            .streams
            .entry(stream)
            .or_default()
            .rows
            .push(row);
    }

    /// Insertion "côté distant": histoire + livraison push aux abonnés,
    /// comme le ferait le magasin réel sur ses topics de flux
    pub fn push(&self, stream: StreamKind, row: Value) {
        let mut inner = self.inner.lock();
        let state = inner.streams.entry(stream).or_default();
        state.rows.push(row.clone());
        state.subscribers.retain(|tx| tx.send(row.clone()).is_ok());
        log::debug!("pushed row into {}", stream.as_str());
    }

    pub fn fail_next_queries(&self, n: u32) {
        self.inner.lock().fail_queries = n;
    }

    pub fn fail_next_inserts(&self, n: u32) {
        self.inner.lock().fail_inserts = n;
    }

    /// Retarde chaque requête, pour scénariser un pull en vol doublé par un push
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        self.inner.lock().query_delay = delay;
    }

    /// Histoire complète d'un flux (ordre d'insertion)
    pub fn rows(&self, stream: StreamKind) -> Vec<Value> {
        self.inner
            .lock()
            .streams
            .get(&stream)
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }

    pub fn queries_seen(&self) -> Vec<(StreamKind, usize)> {
        self.inner.lock().queries_seen.clone()
    }
}

impl TrafficStore for StubStore {
    async fn query_latest(
        &self,
        stream: StreamKind,
        limit: usize,
    ) -> Result<Vec<Value>, StoreError> {
        // l'instantané est figé au moment où la requête est servie; la
        // latence injectée ne retarde que le trajet de la réponse
        let (delay, rows) = {
            let mut inner = self.inner.lock();
            if inner.fail_queries > 0 {
                inner.fail_queries -= 1;
                return Err(StoreError::Transport("injected query failure".into()));
            }
            inner.queries_seen.push((stream, limit));
            let rows = inner
                .streams
                .get(&stream)
                .map(|s| s.rows.iter().rev().take(limit).cloned().collect())
                .unwrap_or_default();
            (inner.query_delay, rows)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(rows)
    }

    async fn insert(&self, stream: StreamKind, row: Value) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.lock();
            if inner.fail_inserts > 0 {
                inner.fail_inserts -= 1;
                return Err(StoreError::Transport("injected insert failure".into()));
            }
        }
        self.push(stream, row);
        Ok(())
    }

    fn subscribe(&self, stream: StreamKind) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .streams
            .entry(stream)
            .or_default()
            .subscribers
            .push(tx);
        rx
    }
}
