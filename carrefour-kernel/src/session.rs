/**
 * SESSION - Contexte de session explicite
 *
 * RÔLE : Porter l'indicateur "connecté" du tableau de bord, persistant entre
 * redémarrages. Objet de contexte passé explicitement à la couche HTTP :
 * init au boot (relecture de l'indicateur persisté), teardown au sign-out
 * (effacement). Pas de singleton ambiant.
 *
 * SÉCURITÉ : purement consultatif, pas une surface d'authentification
 * sérieuse. Les identifiants viennent de l'environnement.
 */

use crate::state::{new_state, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

const SESSION_KEY: &str = "session_user";

/// Surface clé/valeur minimale pour persister l'indicateur de session
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Implémentation fichier : une map plate JSON, réécrite à chaque mutation.
/// Un fichier corrompu repart à vide plutôt que d'empêcher le boot.
pub struct FileKv {
    path: PathBuf,
    cache: parking_lot::Mutex<HashMap<String, String>>,
}

impl FileKv {
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let cache = match std::fs::read_to_string(&path) {
            Ok(txt) => serde_json::from_str(&txt).unwrap_or_else(|e| {
                eprintln!("[session] fichier kv invalide, reparti à vide: {e}");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            cache: parking_lot::Mutex::new(cache),
        }
    }

    fn persist(&self, cache: &HashMap<String, String>) {
        match serde_json::to_string_pretty(cache) {
            Ok(txt) => {
                if let Err(e) = std::fs::write(&self.path, txt) {
                    eprintln!("[session] écriture kv échouée: {e}");
                }
            }
            Err(e) => eprintln!("[session] sérialisation kv échouée: {e}"),
        }
    }
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut cache = self.cache.lock();
        cache.insert(key.to_string(), value.to_string());
        self.persist(&cache);
    }

    fn remove(&self, key: &str) {
        let mut cache = self.cache.lock();
        cache.remove(key);
        self.persist(&cache);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub username: String,
}

#[derive(Clone)]
pub struct SessionContext {
    kv: Arc<dyn KvStore>,
    user: Shared<Option<SessionUser>>,
    expected_user: String,
    expected_pass: String,
}

impl SessionContext {
    /// Init au boot : relit l'indicateur persisté, identifiants depuis
    /// CARREFOUR_USERNAME / CARREFOUR_PASSWORD (défauts de l'installation)
    pub fn init(kv: Arc<dyn KvStore>) -> Self {
        let user = std::env::var("CARREFOUR_USERNAME").unwrap_or_else(|_| "adm1n".into());
        let pass = std::env::var("CARREFOUR_PASSWORD").unwrap_or_else(|_| "1234".into());
        Self::with_credentials(kv, user, pass)
    }

    pub fn with_credentials(kv: Arc<dyn KvStore>, user: String, pass: String) -> Self {
        let persisted = kv
            .get(SESSION_KEY)
            .and_then(|raw| serde_json::from_str::<SessionUser>(&raw).ok());
        Self {
            kv,
            user: new_state(persisted),
            expected_user: user,
            expected_pass: pass,
        }
    }

    /// Tentative de connexion. Échec = aucune mutation d'état.
    pub fn login(&self, username: &str, password: &str) -> bool {
        println!("[session] login attempt: {username}");
        if username != self.expected_user || password != self.expected_pass {
            println!("[session] login failed");
            return false;
        }
        let user = SessionUser {
            username: username.to_string(),
        };
        if let Ok(raw) = serde_json::to_string(&user) {
            self.kv.set(SESSION_KEY, &raw);
        }
        *self.user.lock() = Some(user);
        println!("[session] login ok");
        true
    }

    /// Teardown de session : efface l'indicateur persisté
    pub fn logout(&self) {
        *self.user.lock() = None;
        self.kv.remove(SESSION_KEY);
    }

    pub fn signed_in(&self) -> bool {
        self.user.lock().is_some()
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.user.lock().clone()
    }
}
