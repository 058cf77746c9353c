//! Signaux dérivés : fonctions pures sur le dernier échantillon + horloge.
//! Recalculés à chaque snapshot, aucun état persistant, recalcul idempotent.

use crate::models::{LightColor, Sample};
use serde::Serialize;
use time::{Duration, OffsetDateTime};

/// Fenêtre au-delà de laquelle le flux est considéré muet ("Reconnecting")
pub const HEALTH_WINDOW: Duration = Duration::seconds(10);

/// Santé de la connexion : vrai ssi un échantillon existe et date de moins
/// de 10 s. Un flux muet n'est pas une erreur, c'est cet état d'affichage.
pub fn connection_healthy(sample: Option<&Sample>, now: OffsetDateTime) -> bool {
    match sample {
        Some(s) => now - s.created_at < HEALTH_WINDOW,
        None => false,
    }
}

/// Couleur du badge feu ; rouge par défaut quand la couleur est absente
pub fn badge_color(sample: Option<&Sample>) -> LightColor {
    sample.and_then(|s| s.light_main).unwrap_or(LightColor::Red)
}

pub fn congestion_band(sample: Option<&Sample>) -> bool {
    sample.map(|s| s.congestion).unwrap_or(false)
}

pub fn tilt_alarm(sample: Option<&Sample>) -> bool {
    sample.map(Sample::tilted).unwrap_or(false)
}

/// Regroupement des signaux pour les vues HTTP
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DerivedSignals {
    pub healthy: bool,
    pub tilt: bool,
    pub congested: bool,
    pub light: LightColor,
}

impl DerivedSignals {
    pub fn compute(sample: Option<&Sample>, now: OffsetDateTime) -> Self {
        Self {
            healthy: connection_healthy(sample, now),
            tilt: tilt_alarm(sample),
            congested: congestion_band(sample),
            light: badge_color(sample),
        }
    }
}
