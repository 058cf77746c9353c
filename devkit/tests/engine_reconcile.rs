//! Tests moteur de bout en bout, au-dessus du StubStore (horloge tokio en
//! pause: les cadences sont déroulées virtuellement, sans attente réelle).

use carrefour_devkit::builders::{
    at, config_row, congestion_row, tilt_row, update_row, SampleRow,
};
use carrefour_devkit::stub_store::StubStore;
use carrefour_kernel::engine::{commit_timing, CommitError, Engine};
use carrefour_kernel::models::LightColor;
use carrefour_kernel::signals;
use carrefour_kernel::state::DashboardState;
use carrefour_kernel::store::StreamKind;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const POLL: Duration = Duration::from_secs(1);

fn start_engine(store: &StubStore, state: &DashboardState) -> Engine {
    Engine::start(Arc::new(store.clone()), state.clone(), POLL)
}

#[tokio::test(start_paused = true)]
async fn startup_pull_populates_current_sample() {
    let store = StubStore::new();
    store.seed(StreamKind::Samples, update_row("s1", at("2025-06-01T12:00:00Z")));

    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(state.live.lock().current().unwrap().id, "s1");
}

#[tokio::test(start_paused = true)]
async fn push_replaces_immediately_between_ticks() {
    let store = StubStore::new();
    store.seed(StreamKind::Samples, update_row("s1", at("2025-06-01T12:00:00Z")));

    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);
    sleep(Duration::from_millis(50)).await;

    // entre deux ticks de pull, le push s'applique sans attendre la cadence
    store.push(StreamKind::Samples, update_row("s2", at("2025-06-01T12:00:01Z")));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(state.live.lock().current().unwrap().id, "s2");
}

#[tokio::test(start_paused = true)]
async fn delayed_pull_beats_newer_push_by_arrival_order() {
    // Le pull en vol au moment d'un push livre APRÈS lui: sa ligne, plus
    // vieille, gagne quand même. Dernier arrivé, pas dernier timestamp.
    let store = StubStore::new();
    store.seed(StreamKind::Samples, update_row("pulled", at("2025-06-01T12:00:00Z")));
    store.set_query_delay(Some(Duration::from_millis(500)));

    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);

    // t+100ms: push d'une ligne plus récente pendant que le pull est en vol
    // (la réponse du pull est déjà figée, elle ne la contient pas)
    sleep(Duration::from_millis(100)).await;
    store.push(
        StreamKind::Samples,
        SampleRow::new("pushed", at("2025-06-01T12:00:05Z")).build(),
    );
    sleep(Duration::from_millis(50)).await;
    assert_eq!(state.live.lock().current().unwrap().id, "pushed");

    // t+600ms: la réponse du pull arrive enfin et écrase, bien que sa ligne
    // soit plus vieille. Aucune comparaison de timestamps n'a lieu.
    sleep(Duration::from_millis(500)).await;
    assert_eq!(state.live.lock().current().unwrap().id, "pulled");
}

#[tokio::test(start_paused = true)]
async fn failed_pulls_are_skipped_and_retried() {
    let store = StubStore::new();
    store.seed(StreamKind::Samples, update_row("s1", at("2025-06-01T12:00:00Z")));
    // deux tours complets de pannes pour les trois pollers
    store.fail_next_queries(6);

    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);

    sleep(Duration::from_millis(50)).await;
    assert!(state.live.lock().current().is_none());

    // au tick suivant les pannes sont épuisées, le pull reprend
    sleep(Duration::from_secs(3)).await;
    assert_eq!(state.live.lock().current().unwrap().id, "s1");
}

#[tokio::test(start_paused = true)]
async fn alert_pull_is_authoritative_snapshot() {
    let store = StubStore::new();
    let t0 = at("2025-06-01T12:00:00Z");
    // 80 lignes: une sur deux est une congestion, l'autre une mise à jour
    for i in 0..80 {
        let id = format!("s{i}");
        let ts = t0 + time::Duration::seconds(i);
        if i % 2 == 0 {
            store.seed(StreamKind::Samples, congestion_row(&id, ts));
        } else {
            store.seed(StreamKind::Samples, update_row(&id, ts));
        }
    }

    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);
    sleep(Duration::from_millis(50)).await;

    let alerts = state.alerts.lock().snapshot();
    assert_eq!(alerts.len(), 40);
    assert_eq!(alerts[0].id, "s78"); // plus récent en tête
    assert!(alerts.iter().all(|s| s.event_type == "congestion"));
}

#[tokio::test(start_paused = true)]
async fn alert_log_never_exceeds_cap() {
    let store = StubStore::new();
    let t0 = at("2025-06-01T12:00:00Z");
    for i in 0..80 {
        store.seed(
            StreamKind::Samples,
            congestion_row(&format!("s{i}"), t0 + time::Duration::seconds(i)),
        );
    }

    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);
    sleep(Duration::from_millis(50)).await;

    let alerts = state.alerts.lock().snapshot();
    assert_eq!(alerts.len(), 50);
    assert_eq!(alerts[0].id, "s79");
    assert_eq!(alerts[49].id, "s30");
}

#[tokio::test(start_paused = true)]
async fn pushed_tilt_appears_in_front_immediately() {
    let store = StubStore::new();
    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);
    sleep(Duration::from_millis(50)).await;

    store.push(StreamKind::Samples, tilt_row("t1", at("2025-06-01T12:00:00Z")));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(state.alerts.lock().entries()[0].id, "t1");
}

#[tokio::test(start_paused = true)]
async fn end_to_end_congestion_then_routine_update() {
    // Scénario: une congestion arrive par pull, puis une mise à jour banale
    // par push. La valeur courante avance, le journal ne retient que la
    // congestion, et le badge retombe au rouge par défaut (couleur absente).
    let store = StubStore::new();
    store.seed(
        StreamKind::Samples,
        SampleRow::new("1", at("2025-06-01T12:00:00Z"))
            .event_type("congestion")
            .congestion(true)
            .light("red")
            .build(),
    );

    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(state.live.lock().current().unwrap().id, "1");

    store.push(
        StreamKind::Samples,
        SampleRow::new("2", at("2025-06-01T12:00:01Z")).no_light().build(),
    );
    sleep(Duration::from_millis(10)).await;

    {
        let live = state.live.lock();
        assert_eq!(live.current().unwrap().id, "2");
        assert_eq!(signals::badge_color(live.current()), LightColor::Red);
        assert!(!signals::congestion_band(live.current()));
    }
    let alerts = state.alerts.lock().snapshot();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, "1");

    // le tick suivant refait la fenêtre: la mise à jour banale reste filtrée
    sleep(Duration::from_secs(1)).await;
    let alerts = state.alerts.lock().snapshot();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, "1");
}

#[tokio::test(start_paused = true)]
async fn push_prepend_can_vanish_on_next_pull_window() {
    // L'asymétrie assumée: une ligne poussée hors de la fenêtre de pull
    // disparaît au remplacement suivant. On la préserve, on ne la "répare" pas.
    let store = StubStore::new();
    let t0 = at("2025-06-01T12:00:00Z");
    for i in 0..80 {
        store.seed(
            StreamKind::Samples,
            congestion_row(&format!("s{i}"), t0 + time::Duration::seconds(i)),
        );
    }

    let state = DashboardState::new();
    // prepend direct, comme si le push était arrivé avant le premier pull,
    // sur une ligne que la fenêtre du magasin ne contient pas
    state.alerts.lock().apply_push(
        serde_json::from_value(tilt_row("ghost", t0 - time::Duration::minutes(10))).unwrap(),
    );
    assert_eq!(state.alerts.lock().entries()[0].id, "ghost");

    let _engine = start_engine(&store, &state);
    sleep(Duration::from_millis(50)).await;

    let alerts = state.alerts.lock().snapshot();
    assert!(alerts.iter().all(|s| s.id != "ghost"));
}

#[tokio::test(start_paused = true)]
async fn config_resolution_ignores_older_records() {
    let store = StubStore::new();
    let t0 = at("2025-06-01T12:00:00Z");
    store.seed(StreamKind::Config, config_row("c1", 8000, 2000, t0));

    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(state.timing.lock().green_ms(), 8000);

    // un enregistrement PLUS VIEUX arrive par push (livraison en retard)
    store.push(
        StreamKind::Config,
        config_row("c0", 4000, 1000, t0 - time::Duration::minutes(1)),
    );
    sleep(Duration::from_secs(2)).await;
    let timing = state.timing.lock();
    assert_eq!(timing.active().unwrap().id, "c1");
    assert_eq!(timing.green_ms(), 8000);
}

#[tokio::test(start_paused = true)]
async fn local_edits_survive_remote_config_churn() {
    let store = StubStore::new();
    let t0 = at("2025-06-01T12:00:00Z");
    store.seed(StreamKind::Config, config_row("c1", 8000, 2000, t0));

    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);
    sleep(Duration::from_millis(50)).await;

    state.timing.lock().set_green(20000).unwrap();
    store.push(
        StreamKind::Config,
        config_row("c2", 6000, 1500, t0 + time::Duration::minutes(1)),
    );
    sleep(Duration::from_secs(2)).await;

    let timing = state.timing.lock();
    assert_eq!(timing.active().unwrap().id, "c2"); // l'actif avance...
    assert_eq!(timing.green_ms(), 20000); // ...mais l'édition prime à l'affichage
}

#[tokio::test(start_paused = true)]
async fn commit_appends_a_record_and_its_echo_becomes_active() {
    let store = StubStore::new();
    let state = DashboardState::new();
    let _engine = start_engine(&store, &state);
    sleep(Duration::from_millis(50)).await;

    state.timing.lock().set_green(14000).unwrap();
    let record = commit_timing(&store, &state).await.unwrap();

    {
        let timing = state.timing.lock();
        assert!(!timing.saving());
        assert!(!timing.dirty());
        assert!(timing.saved_at().is_some());
    }
    let rows = store.rows(StreamKind::Config);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["normal_green_ms"], serde_json::json!(14000));

    // l'insertion est rediffusée sur le flux config: l'écho de notre propre
    // écriture devient l'enregistrement actif
    sleep(Duration::from_millis(50)).await;
    assert_eq!(state.timing.lock().active().unwrap().id, record.id);
}

#[tokio::test(start_paused = true)]
async fn failed_commit_keeps_edits_without_retry() {
    let store = StubStore::new();
    let state = DashboardState::new();

    state.timing.lock().set_yellow(4000).unwrap();
    store.fail_next_inserts(1);

    let err = commit_timing(&store, &state).await.unwrap_err();
    assert!(matches!(err, CommitError::Store(_)));

    let timing = state.timing.lock();
    assert!(!timing.saving());
    assert!(timing.dirty());
    assert_eq!(timing.yellow_ms(), 4000);
    assert_eq!(timing.saved_at(), None);
    assert!(store.rows(StreamKind::Config).is_empty()); // pas de retry
}

#[tokio::test(start_paused = true)]
async fn concurrent_commit_is_refused() {
    let store = StubStore::new();
    let state = DashboardState::new();

    // un commit déjà en vol (begin sans finish)
    assert!(state.timing.lock().begin_commit().is_some());
    let err = commit_timing(&store, &state).await.unwrap_err();
    assert!(matches!(err, CommitError::SavingInProgress));
    assert!(store.rows(StreamKind::Config).is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_timers_and_subscriptions() {
    let store = StubStore::new();
    store.seed(StreamKind::Samples, update_row("s1", at("2025-06-01T12:00:00Z")));

    let state = DashboardState::new();
    let engine = start_engine(&store, &state);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(state.live.lock().current().unwrap().id, "s1");
    let queries_before = store.queries_seen().len();

    engine.shutdown();

    // plus aucune livraison appliquée, ni par push ni par pull
    store.push(StreamKind::Samples, tilt_row("t1", at("2025-06-01T12:00:05Z")));
    store.seed(StreamKind::Samples, update_row("s2", at("2025-06-01T12:00:06Z")));
    sleep(Duration::from_secs(5)).await;

    assert_eq!(state.live.lock().current().unwrap().id, "s1");
    assert!(state.alerts.lock().is_empty());
    assert_eq!(store.queries_seen().len(), queries_before);
}

#[tokio::test(start_paused = true)]
async fn drop_releases_like_shutdown() {
    let store = StubStore::new();
    let state = DashboardState::new();
    {
        let _engine = start_engine(&store, &state);
        sleep(Duration::from_millis(50)).await;
    } // drop: tout chemin de sortie libère les tâches

    store.push(StreamKind::Samples, tilt_row("t1", at("2025-06-01T12:00:00Z")));
    sleep(Duration::from_secs(2)).await;
    assert!(state.alerts.lock().is_empty());
}
