/**
 * STREAM RECONCILER - Valeur courante de l'installation
 *
 * RÔLE : Fusionner les deux canaux de livraison (push MQTT, pull cadencé) en
 * une seule valeur "dernier échantillon connu".
 *
 * FONCTIONNEMENT : Écrasement pur, dernier arrivé gagne. L'ordre d'arrivée est
 * le seul signal d'ordre disponible entre deux canaux qui peuvent se doubler ;
 * on ne compare jamais les timestamps des échantillons entre eux. Aucune
 * déduplication nécessaire pour une valeur écrasée.
 */

use crate::models::Sample;

/// Dernier échantillon connu, canaux confondus. Absent au démarrage.
#[derive(Debug, Default)]
pub struct LiveFeed {
    current: Option<Sample>,
    applied: u64,
}

impl LiveFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applique une livraison, quel que soit le canal. Le silence prolongé du
    /// push n'est pas une erreur : la staleness ressort uniquement via le
    /// signal de santé dérivé (signals.rs).
    pub fn apply(&mut self, sample: Sample) {
        self.current = Some(sample);
        self.applied += 1;
    }

    pub fn current(&self) -> Option<&Sample> {
        self.current.as_ref()
    }

    pub fn snapshot(&self) -> Option<Sample> {
        self.current.clone()
    }

    /// Nombre total de livraisons appliquées (push + pull), pour le health
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sample;
    use time::macros::datetime;

    fn sample(id: &str, at: time::OffsetDateTime) -> Sample {
        Sample {
            id: id.to_string(),
            created_at: at,
            event_type: "update".to_string(),
            congestion: false,
            light_main: None,
            tilt_detected: None,
            street_light_on: None,
            pitch_deg: None,
            roll_deg: None,
            baseline_cm: None,
            threshold_cm: None,
            distance_cm: None,
            cfg_green_ms: None,
            cfg_yellow_ms: None,
        }
    }

    #[test]
    fn starts_absent() {
        assert!(LiveFeed::new().current().is_none());
    }

    #[test]
    fn last_arrival_wins_for_any_sequence() {
        let t = datetime!(2025-06-01 12:00:00 UTC);
        let mut feed = LiveFeed::new();
        feed.apply(sample("pull-1", t));
        feed.apply(sample("push-1", t + time::Duration::seconds(1)));
        feed.apply(sample("pull-2", t + time::Duration::seconds(2)));
        assert_eq!(feed.current().unwrap().id, "pull-2");
        assert_eq!(feed.applied(), 3);
    }

    #[test]
    fn arrival_order_beats_timestamp_order() {
        // Un pull retardé peut livrer une ligne plus vieille APRÈS un push
        // plus récent : elle gagne quand même, faute de clé d'ordre commune.
        let t = datetime!(2025-06-01 12:00:00 UTC);
        let mut feed = LiveFeed::new();
        feed.apply(sample("newer", t + time::Duration::seconds(5)));
        feed.apply(sample("older", t));
        assert_eq!(feed.current().unwrap().id, "older");
    }
}
