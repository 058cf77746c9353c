use crate::alerts::AlertLog;
use crate::live::LiveFeed;
use crate::timing::TimingResolver;
use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// État agrégé du tableau de bord, partagé entre la boucle MQTT, les pollers
/// et l'API HTTP. Les verrous ne sont jamais tenus à travers un await ;
/// ordre d'acquisition quand plusieurs sont nécessaires : live, alerts, timing.
#[derive(Clone)]
pub struct DashboardState {
    pub live: Shared<LiveFeed>,
    pub alerts: Shared<AlertLog>,
    pub timing: Shared<TimingResolver>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            live: new_state(LiveFeed::new()),
            alerts: new_state(AlertLog::new()),
            timing: new_state(TimingResolver::new()),
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}
