/**
 * CONFIGURATION RESOLVER - Durées de feu actives et éditions locales
 *
 * RÔLE : Résoudre la configuration active depuis la table append-only
 * `traffic_config` ("dernier updated_at gagne") et porter les éditions
 * optimistes de l'utilisateur jusqu'à leur écriture durable.
 *
 * FONCTIONNEMENT : Les valeurs éditées priment sur la valeur distante pour
 * l'affichage tant qu'elles ne sont pas sauvegardées ; un commit ajoute un
 * nouvel enregistrement, jamais de mise à jour en place. Un commit raté
 * laisse les éditions intactes, sans retry automatique.
 */

use crate::models::ConfigRecord;
use time::OffsetDateTime;

pub const GREEN_MIN_MS: u32 = 2000;
pub const GREEN_MAX_MS: u32 = 60000;
pub const GREEN_STEP_MS: u32 = 500;
pub const YELLOW_MIN_MS: u32 = 500;
pub const YELLOW_MAX_MS: u32 = 10000;
pub const YELLOW_STEP_MS: u32 = 100;

// Valeurs affichées avant la première résolution distante
const DEFAULT_GREEN_MS: u32 = 10000;
const DEFAULT_YELLOW_MS: u32 = 3000;

/// Violation de borne ou de pas, rejetée à la frontière d'édition ;
/// la valeur précédente est conservée.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("green duration {0} ms outside [2000, 60000]")]
    GreenOutOfRange(u32),
    #[error("green duration {0} ms is not a multiple of 500 ms")]
    GreenOffStep(u32),
    #[error("yellow duration {0} ms outside [500, 10000]")]
    YellowOutOfRange(u32),
    #[error("yellow duration {0} ms is not a multiple of 100 ms")]
    YellowOffStep(u32),
}

#[derive(Debug)]
pub struct TimingResolver {
    /// Enregistrement distant au updated_at maximal observé (pull ou push)
    remote: Option<ConfigRecord>,
    /// Valeurs d'affichage ; suivent le distant tant qu'aucune édition locale
    green_ms: u32,
    yellow_ms: u32,
    /// Éditions locales non encore durables
    dirty: bool,
    /// Un commit est en vol
    saving: bool,
    /// Dernière sauvegarde confirmée, pour affichage
    saved_at: Option<OffsetDateTime>,
}

impl TimingResolver {
    pub fn new() -> Self {
        Self {
            remote: None,
            green_ms: DEFAULT_GREEN_MS,
            yellow_ms: DEFAULT_YELLOW_MS,
            dirty: false,
            saving: false,
            saved_at: None,
        }
    }

    /// Observe un enregistrement distant (pull ou push). Seul le updated_at
    /// maximal compte ; un enregistrement plus vieux que l'actif est ignoré.
    /// Les éditions locales non sauvegardées gardent la priorité d'affichage.
    pub fn apply_remote(&mut self, record: ConfigRecord) {
        let newer = match &self.remote {
            Some(active) => record.updated_at > active.updated_at,
            None => true,
        };
        if !newer {
            return;
        }
        if !self.dirty && !self.saving {
            self.green_ms = record.normal_green_ms;
            self.yellow_ms = record.yellow_ms;
        }
        self.remote = Some(record);
    }

    /// Édition locale de la durée de vert ; rejet hors bornes ou hors pas
    pub fn set_green(&mut self, ms: u32) -> Result<(), EditError> {
        if !(GREEN_MIN_MS..=GREEN_MAX_MS).contains(&ms) {
            return Err(EditError::GreenOutOfRange(ms));
        }
        if ms % GREEN_STEP_MS != 0 {
            return Err(EditError::GreenOffStep(ms));
        }
        self.green_ms = ms;
        self.dirty = true;
        Ok(())
    }

    /// Édition locale de la durée de jaune ; rejet hors bornes ou hors pas
    pub fn set_yellow(&mut self, ms: u32) -> Result<(), EditError> {
        if !(YELLOW_MIN_MS..=YELLOW_MAX_MS).contains(&ms) {
            return Err(EditError::YellowOutOfRange(ms));
        }
        if ms % YELLOW_STEP_MS != 0 {
            return Err(EditError::YellowOffStep(ms));
        }
        self.yellow_ms = ms;
        self.dirty = true;
        Ok(())
    }

    /// Démarre un commit : fige les valeurs à écrire et passe en "saving".
    /// None si un commit est déjà en vol (pas de second commit concurrent).
    pub fn begin_commit(&mut self) -> Option<(u32, u32)> {
        if self.saving {
            return None;
        }
        self.saving = true;
        Some((self.green_ms, self.yellow_ms))
    }

    /// Écriture confirmée : les valeurs éditées restent en place (elles sont
    /// désormais ce qui vient d'être écrit) et le distant redevient autoritaire.
    pub fn finish_commit(&mut self, now: OffsetDateTime) {
        self.saving = false;
        self.dirty = false;
        self.saved_at = Some(now);
    }

    /// Écriture ratée : éditions intactes, pas d'horodatage de sauvegarde
    pub fn abort_commit(&mut self) {
        self.saving = false;
    }

    pub fn green_ms(&self) -> u32 {
        self.green_ms
    }

    pub fn yellow_ms(&self) -> u32 {
        self.yellow_ms
    }

    pub fn active(&self) -> Option<&ConfigRecord> {
        self.remote.as_ref()
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    pub fn saving(&self) -> bool {
        self.saving
    }

    pub fn saved_at(&self) -> Option<OffsetDateTime> {
        self.saved_at
    }
}

impl Default for TimingResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(id: &str, green: u32, yellow: u32, at: OffsetDateTime) -> ConfigRecord {
        ConfigRecord {
            id: id.to_string(),
            normal_green_ms: green,
            yellow_ms: yellow,
            updated_at: at,
        }
    }

    #[test]
    fn green_range_validation() {
        let mut t = TimingResolver::new();
        assert_eq!(t.set_green(1000), Err(EditError::GreenOutOfRange(1000)));
        assert_eq!(t.green_ms(), 10000); // valeur précédente conservée
        assert_eq!(t.set_green(2000), Ok(()));
        assert_eq!(t.green_ms(), 2000);
        assert_eq!(t.set_green(60500), Err(EditError::GreenOutOfRange(60500)));
        assert_eq!(t.set_green(2250), Err(EditError::GreenOffStep(2250)));
        assert_eq!(t.green_ms(), 2000);
    }

    #[test]
    fn yellow_range_validation() {
        let mut t = TimingResolver::new();
        assert_eq!(t.set_yellow(15000), Err(EditError::YellowOutOfRange(15000)));
        assert_eq!(t.yellow_ms(), 3000);
        assert_eq!(t.set_yellow(10000), Ok(()));
        assert_eq!(t.yellow_ms(), 10000);
        assert_eq!(t.set_yellow(450), Err(EditError::YellowOutOfRange(450)));
        assert_eq!(t.set_yellow(550), Ok(()));
    }

    #[test]
    fn latest_updated_at_wins() {
        let t0 = datetime!(2025-06-01 12:00:00 UTC);
        let mut t = TimingResolver::new();
        t.apply_remote(record("a", 8000, 2000, t0));
        assert_eq!(t.green_ms(), 8000);
        // un enregistrement plus vieux arrive après coup (pull en retard)
        t.apply_remote(record("b", 4000, 1000, t0 - time::Duration::seconds(30)));
        assert_eq!(t.active().unwrap().id, "a");
        assert_eq!(t.green_ms(), 8000);
        // un plus récent remplace
        t.apply_remote(record("c", 12000, 2500, t0 + time::Duration::seconds(30)));
        assert_eq!(t.active().unwrap().id, "c");
        assert_eq!(t.green_ms(), 12000);
    }

    #[test]
    fn unsaved_edits_take_precedence_over_remote() {
        let t0 = datetime!(2025-06-01 12:00:00 UTC);
        let mut t = TimingResolver::new();
        t.apply_remote(record("a", 8000, 2000, t0));
        t.set_green(20000).unwrap();
        // une résolution distante pendant l'édition ne doit pas l'écraser
        t.apply_remote(record("b", 6000, 1500, t0 + time::Duration::seconds(5)));
        assert_eq!(t.green_ms(), 20000);
        assert_eq!(t.yellow_ms(), 2000);
        assert_eq!(t.active().unwrap().id, "b"); // mais l'actif, lui, avance
    }

    #[test]
    fn commit_lifecycle() {
        let now = datetime!(2025-06-01 12:00:00 UTC);
        let mut t = TimingResolver::new();
        t.set_green(14000).unwrap();

        let (g, y) = t.begin_commit().unwrap();
        assert_eq!((g, y), (14000, 3000));
        assert!(t.saving());
        // pas de second commit pendant qu'un est en vol
        assert!(t.begin_commit().is_none());

        t.finish_commit(now);
        assert!(!t.saving());
        assert!(!t.dirty());
        assert_eq!(t.saved_at(), Some(now));
        assert_eq!(t.green_ms(), 14000); // valeurs écrites laissées en place
    }

    #[test]
    fn failed_commit_keeps_edits_and_no_saved_at() {
        let mut t = TimingResolver::new();
        t.set_yellow(4000).unwrap();
        t.begin_commit().unwrap();
        t.abort_commit();
        assert!(!t.saving());
        assert!(t.dirty());
        assert_eq!(t.yellow_ms(), 4000);
        assert_eq!(t.saved_at(), None);
    }

    #[test]
    fn remote_resyncs_display_after_successful_commit() {
        let t0 = datetime!(2025-06-01 12:00:00 UTC);
        let mut t = TimingResolver::new();
        t.set_green(14000).unwrap();
        t.begin_commit().unwrap();
        // pendant le vol, une résolution distante ne touche pas l'affichage
        t.apply_remote(record("a", 8000, 2000, t0));
        assert_eq!(t.green_ms(), 14000);
        t.finish_commit(t0);
        // l'écho de notre propre écriture revient par push/pull et resynchronise
        t.apply_remote(record("mine", 14000, 3000, t0 + time::Duration::seconds(1)));
        assert_eq!(t.green_ms(), 14000);
        assert_eq!(t.active().unwrap().id, "mine");
    }
}
