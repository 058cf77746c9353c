/**
 * STORE BRIDGE - Accès au magasin distant via MQTT
 *
 * RÔLE :
 * Traduire les primitives du magasin append-only (requête ponctuelle,
 * insertion, abonnement aux changements) en échanges MQTT. C'est le seul
 * endroit du noyau qui connaît le transport ; le moteur ne voit que le
 * trait TrafficStore.
 *
 * FONCTIONNEMENT :
 * - query/insert : commande publiée avec un request_id, réponse corrélée via
 *   une map de oneshot en attente, timeout au-delà duquel l'appel échoue ;
 * - abonnements : les lignes nouvellement insérées arrivent sur les topics
 *   de flux et sont diffusées aux abonnés mpsc enregistrés localement.
 *
 * GARANTIES (et non-garanties) :
 * - livraison push au moins une fois, aucun ordre entre flux, silence
 *   possible en cas de partition réseau ; le moteur s'en accommode ;
 * - aucune ré-orchestration de reconnexion ici : la couche rumqttc se
 *   rétablit d'elle-même ou l'opérateur redémarre le noyau.
 */

use crate::state::{new_state, Shared};
use rumqttc::{AsyncClient, QoS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};
use uuid::Uuid;

pub const TOPIC_STORE_QUERY: &str = "carrefour/store/query@v1";
pub const TOPIC_STORE_INSERT: &str = "carrefour/store/insert@v1";
pub const TOPIC_STORE_RESPONSE: &str = "carrefour/store/response@v1";
pub const TOPIC_DATA_FEED: &str = "carrefour/traffic/data@v1";
pub const TOPIC_CONFIG_FEED: &str = "carrefour/traffic/config@v1";

/// Flux logiques du magasin distant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    #[serde(rename = "traffic_data")]
    Samples,
    #[serde(rename = "traffic_config")]
    Config,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Samples => "traffic_data",
            StreamKind::Config => "traffic_config",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Transport(String),
    #[error("store timed out after {0:?}")]
    Timeout(Duration),
    #[error("store refused: {0}")]
    Rejected(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Primitives du magasin distant. Le moteur ne dépend que de ce seam ;
/// l'implémentation MQTT vit ici, le devkit fournit un stub en mémoire.
pub trait TrafficStore: Send + Sync + 'static {
    /// Dernières lignes du flux, triées timestamp décroissant
    fn query_latest(
        &self,
        stream: StreamKind,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send;

    /// Ajout d'une ligne (append-only, jamais de mise à jour en place)
    fn insert(
        &self,
        stream: StreamKind,
        row: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Lignes nouvellement insérées dans le flux, livrées au moins une fois.
    /// Se désabonner = dropper le receiver.
    fn subscribe(&self, stream: StreamKind) -> mpsc::UnboundedReceiver<Value>;
}

/// Commandes publiées vers le magasin (contrat partagé avec le simulateur)
#[derive(Debug, Serialize)]
#[serde(tag = "action")]
enum StoreCommand {
    #[serde(rename = "query")]
    Query {
        request_id: String,
        stream: StreamKind,
        limit: usize,
    },
    #[serde(rename = "insert")]
    Insert {
        request_id: String,
        stream: StreamKind,
        row: Value,
    },
}

/// Réponses du magasin (contrat partagé avec le simulateur)
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StoreResponse {
    #[serde(rename = "success")]
    Success {
        request_id: String,
        #[serde(default)]
        rows: Vec<Value>,
    },
    #[serde(rename = "error")]
    Error { request_id: String, error: String },
}

/// Pont requête/réponse + diffusion des flux de changement
#[derive(Clone)]
pub struct StoreBridge {
    client: AsyncClient,
    response_timeout: Duration,
    pending: Shared<HashMap<String, oneshot::Sender<StoreResponse>>>,
    subscribers: Shared<HashMap<StreamKind, Vec<mpsc::UnboundedSender<Value>>>>,
}

impl StoreBridge {
    pub fn new(client: AsyncClient, response_timeout_ms: u64) -> Self {
        Self {
            client,
            response_timeout: Duration::from_millis(response_timeout_ms),
            pending: new_state(HashMap::new()),
            subscribers: new_state(HashMap::new()),
        }
    }

    /// Route une publication MQTT entrante : réponse en attente ou flux de
    /// changement. Appelé par la boucle d'événements (mqtt.rs).
    pub fn handle_publish(&self, topic: &str, payload: &[u8]) {
        match topic {
            TOPIC_STORE_RESPONSE => self.resolve_response(payload),
            TOPIC_DATA_FEED => self.fan_out(StreamKind::Samples, payload),
            TOPIC_CONFIG_FEED => self.fan_out(StreamKind::Config, payload),
            _ => {}
        }
    }

    fn resolve_response(&self, payload: &[u8]) {
        let response = match serde_json::from_slice::<StoreResponse>(payload) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("[store] réponse invalide: {e}");
                return;
            }
        };
        let request_id = match &response {
            StoreResponse::Success { request_id, .. } => request_id.clone(),
            StoreResponse::Error { request_id, .. } => request_id.clone(),
        };
        if let Some(sender) = self.pending.lock().remove(&request_id) {
            if sender.send(response).is_err() {
                eprintln!("[store] demandeur parti avant la réponse {request_id}");
            }
        } else {
            // réponse en double ou arrivée après timeout : ignorée
            eprintln!("[store] réponse pour requête inconnue {request_id}");
        }
    }

    fn fan_out(&self, stream: StreamKind, payload: &[u8]) {
        let row = match serde_json::from_slice::<Value>(payload) {
            Ok(row) => row,
            Err(e) => {
                eprintln!("[store] ligne de flux invalide sur {}: {e}", stream.as_str());
                return;
            }
        };
        let mut subs = self.subscribers.lock();
        if let Some(list) = subs.get_mut(&stream) {
            // les abonnés partis sont retirés au passage
            list.retain(|tx| tx.send(row.clone()).is_ok());
        }
    }

    async fn send_command(&self, command: StoreCommand) -> Result<StoreResponse, StoreError> {
        let (request_id, topic) = match &command {
            StoreCommand::Query { request_id, .. } => (request_id.clone(), TOPIC_STORE_QUERY),
            StoreCommand::Insert { request_id, .. } => (request_id.clone(), TOPIC_STORE_INSERT),
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        let payload = serde_json::to_string(&command)?;
        if let Err(e) = self
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            self.pending.lock().remove(&request_id);
            return Err(StoreError::Transport(e.to_string()));
        }

        match timeout(self.response_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                self.pending.lock().remove(&request_id);
                Err(StoreError::Transport("response channel closed".into()))
            }
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(StoreError::Timeout(self.response_timeout))
            }
        }
    }
}

impl TrafficStore for StoreBridge {
    async fn query_latest(
        &self,
        stream: StreamKind,
        limit: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let request_id = Uuid::new_v4().to_string();
        match self
            .send_command(StoreCommand::Query {
                request_id,
                stream,
                limit,
            })
            .await?
        {
            StoreResponse::Success { rows, .. } => Ok(rows),
            StoreResponse::Error { error, .. } => Err(StoreError::Rejected(error)),
        }
    }

    async fn insert(&self, stream: StreamKind, row: Value) -> Result<(), StoreError> {
        let request_id = Uuid::new_v4().to_string();
        match self
            .send_command(StoreCommand::Insert {
                request_id,
                stream,
                row,
            })
            .await?
        {
            StoreResponse::Success { .. } => Ok(()),
            StoreResponse::Error { error, .. } => Err(StoreError::Rejected(error)),
        }
    }

    fn subscribe(&self, stream: StreamKind) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().entry(stream).or_default().push(tx);
        rx
    }
}
