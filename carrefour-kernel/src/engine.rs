/**
 * ENGINE - Assemblage des boucles de réconciliation
 *
 * RÔLE :
 * Démarrer les pulls cadencés et les forwarders push au-dessus d'un
 * TrafficStore, appliquer chaque livraison à l'état partagé, et garantir la
 * libération déterministe des timers et abonnements à l'arrêt.
 *
 * MODÈLE :
 * Deux producteurs indépendants (push, pull) alimentent le même état en
 * "dernier écrit gagne". Aucun ordre total n'est reconstruit entre les
 * canaux : la source n'en fournit pas, et on ne l'invente pas (pas
 * d'horloges vectorielles). L'écart de cohérence est assumé et documenté.
 *
 * PANNES :
 * - pull raté : loggé, sauté, retenté au tick suivant ;
 * - push muet : jamais une erreur, la staleness ressort via signals ;
 * - réponse de pull arrivée après teardown : no-op (drapeau de vivacité
 *   capturé au démarrage de chaque tâche).
 */

use crate::alerts::ALERT_PULL_WINDOW;
use crate::models::{parse_row, parse_rows, ConfigRecord, Sample};
use crate::state::DashboardState;
use crate::store::{StoreError, StreamKind, TrafficStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("a save is already in flight")]
    SavingInProgress,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Détient les tâches de réconciliation. Le drop (ou shutdown) libère tout :
/// plus aucune livraison n'est appliquée après, quel que soit le chemin de
/// sortie emprunté.
pub struct Engine {
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Démarre les trois pollers et les deux forwarders push.
    /// Le premier tick de chaque poller part immédiatement (pull de démarrage).
    pub fn start<S: TrafficStore>(
        store: Arc<S>,
        state: DashboardState,
        poll_every: Duration,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let tasks = vec![
            spawn_live_poller(store.clone(), state.clone(), poll_every, alive.clone()),
            spawn_alert_poller(store.clone(), state.clone(), poll_every, alive.clone()),
            spawn_config_poller(store.clone(), state.clone(), poll_every, alive.clone()),
            spawn_sample_forwarder(store.as_ref(), state.clone(), alive.clone()),
            spawn_config_forwarder(store.as_ref(), state, alive.clone()),
        ];
        println!("[engine] reconciliation started (poll every {poll_every:?})");
        Engine { alive, tasks }
    }

    /// Arrêt déterministe : timers et abonnements relâchés avant le retour
    pub fn shutdown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pull "échantillon courant" : la dernière ligne remplace la valeur,
/// inconditionnellement (dernier arrivé gagne, voir live.rs)
fn spawn_live_poller<S: TrafficStore>(
    store: Arc<S>,
    state: DashboardState,
    every: Duration,
    alive: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            let rows = match store.query_latest(StreamKind::Samples, 1).await {
                Ok(rows) => rows,
                Err(e) => {
                    eprintln!("[live] pull raté: {e}");
                    continue;
                }
            };
            if !alive.load(Ordering::SeqCst) {
                return; // réponse arrivée après teardown
            }
            if let Some(sample) = parse_rows::<Sample>("live", rows).into_iter().next() {
                state.live.lock().apply(sample);
            }
        }
    })
}

/// Pull "journal" : la fenêtre des 80 dernières lignes remplace le journal.
/// Une fenêtre vide est ignorée (on garde le dernier instantané connu).
fn spawn_alert_poller<S: TrafficStore>(
    store: Arc<S>,
    state: DashboardState,
    every: Duration,
    alive: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            let rows = match store.query_latest(StreamKind::Samples, ALERT_PULL_WINDOW).await {
                Ok(rows) => rows,
                Err(e) => {
                    eprintln!("[alerts] pull raté: {e}");
                    continue;
                }
            };
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            if rows.is_empty() {
                continue;
            }
            let window = parse_rows::<Sample>("alerts", rows);
            state.alerts.lock().replace_from_pull(window);
        }
    })
}

/// Pull "configuration" : le dernier enregistrement nourrit la résolution
/// "updated_at maximal gagne"
fn spawn_config_poller<S: TrafficStore>(
    store: Arc<S>,
    state: DashboardState,
    every: Duration,
    alive: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            let rows = match store.query_latest(StreamKind::Config, 1).await {
                Ok(rows) => rows,
                Err(e) => {
                    eprintln!("[timing] pull raté: {e}");
                    continue;
                }
            };
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            if let Some(record) = parse_rows::<ConfigRecord>("timing", rows).into_iter().next() {
                state.timing.lock().apply_remote(record);
            }
        }
    })
}

/// Push échantillons : chaque ligne livrée remplace la valeur courante et,
/// si elle mérite le journal, est insérée en tête (incrémental, voir alerts.rs)
fn spawn_sample_forwarder<S: TrafficStore>(
    store: &S,
    state: DashboardState,
    alive: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let mut rx = store.subscribe(StreamKind::Samples);
    tokio::task::spawn(async move {
        while let Some(row) = rx.recv().await {
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let Some(sample) = parse_row::<Sample>("push", row) else {
                continue;
            };
            state.live.lock().apply(sample.clone());
            state.alerts.lock().apply_push(sample);
        }
    })
}

/// Push configuration : même résolution que le pull
fn spawn_config_forwarder<S: TrafficStore>(
    store: &S,
    state: DashboardState,
    alive: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let mut rx = store.subscribe(StreamKind::Config);
    tokio::task::spawn(async move {
        while let Some(row) = rx.recv().await {
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let Some(record) = parse_row::<ConfigRecord>("push", row) else {
                continue;
            };
            state.timing.lock().apply_remote(record);
        }
    })
}

/// Commit de la configuration éditée : append d'un enregistrement frais,
/// jamais de mise à jour en place. Refusé si un commit est déjà en vol.
/// En cas d'échec les éditions restent en place et aucun horodatage de
/// sauvegarde n'est posé ; pas de retry automatique.
pub async fn commit_timing<S: TrafficStore>(
    store: &S,
    state: &DashboardState,
) -> Result<ConfigRecord, CommitError> {
    let (green_ms, yellow_ms) = match state.timing.lock().begin_commit() {
        Some(values) => values,
        None => return Err(CommitError::SavingInProgress),
    };

    let record = ConfigRecord {
        id: Uuid::new_v4().to_string(),
        normal_green_ms: green_ms,
        yellow_ms,
        updated_at: OffsetDateTime::now_utc(),
    };
    let row = match serde_json::to_value(&record) {
        Ok(row) => row,
        Err(e) => {
            state.timing.lock().abort_commit();
            return Err(CommitError::Store(StoreError::Serialization(e)));
        }
    };

    match store.insert(StreamKind::Config, row).await {
        Ok(()) => {
            state.timing.lock().finish_commit(OffsetDateTime::now_utc());
            println!("[timing] config saved ({green_ms} ms / {yellow_ms} ms)");
            Ok(record)
        }
        Err(e) => {
            state.timing.lock().abort_commit();
            eprintln!("[timing] commit raté: {e}");
            Err(CommitError::Store(e))
        }
    }
}
