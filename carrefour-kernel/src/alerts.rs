/**
 * ALERT LOG AGGREGATOR - Journal borné des événements notables
 *
 * RÔLE : Tenir la liste des échantillons "dignes du journal", du plus récent
 * au plus ancien, plafonnée à 50 entrées.
 *
 * FONCTIONNEMENT : Deux chemins d'alimentation volontairement asymétriques :
 * - pull : la fenêtre des 80 dernières lignes, filtrée, REMPLACE tout le
 *   journal (instantané autoritaire) ;
 * - push : une ligne retenue est INSÉRÉE en tête (incrémental).
 * Le dernier chemin exécuté gagne pour l'état visible. Pas de fusion par id
 * entre les deux : un prepend push peut disparaître au pull suivant si sa
 * ligne est déjà sortie de la fenêtre de 80, et un doublon peut apparaître
 * transitoirement. C'est la garantie réelle de la source (flux temps réel
 * best-effort, pas un journal d'audit) ; ne pas "corriger" en fusion stricte.
 */

use crate::models::{Sample, EVENT_UPDATE};

/// Taille maximale du journal visible
pub const ALERT_LOG_CAP: usize = 50;
/// Fenêtre ramenée à chaque pull, avant filtrage
pub const ALERT_PULL_WINDOW: usize = 80;

/// Une ligne mérite le journal si ce n'est pas une simple mise à jour
/// périodique, ou si l'alarme d'inclinaison est levée.
pub fn log_worthy(sample: &Sample) -> bool {
    sample.event_type != EVENT_UPDATE || sample.tilted()
}

/// Journal d'alertes borné, du plus récent au plus ancien
#[derive(Debug, Default)]
pub struct AlertLog {
    entries: Vec<Sample>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chemin pull : remplace intégralement le journal par la fenêtre
    /// filtrée, dans l'ordre livré par le magasin (timestamp décroissant).
    pub fn replace_from_pull(&mut self, window: Vec<Sample>) {
        self.entries = window
            .into_iter()
            .filter(|s| log_worthy(s))
            .take(ALERT_LOG_CAP)
            .collect();
    }

    /// Chemin push : prepend si la ligne mérite le journal, puis troncature.
    /// Retourne true si la ligne a été retenue.
    pub fn apply_push(&mut self, sample: Sample) -> bool {
        if !log_worthy(&sample) {
            return false;
        }
        self.entries.insert(0, sample);
        self.entries.truncate(ALERT_LOG_CAP);
        true
    }

    pub fn entries(&self) -> &[Sample] {
        &self.entries
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
