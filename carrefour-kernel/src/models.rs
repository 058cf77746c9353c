use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// Tag d'événement "routine" : seul tag traité spécialement par le noyau.
/// Tous les autres (congestion, clear, tilt, boot, tags futurs) restent des
/// chaînes opaques, jamais matchées exhaustivement.
pub const EVENT_UPDATE: &str = "update";

/// Couleur du feu principal telle que remontée par l'installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColor {
    Red,
    Yellow,
    Green,
}

/// Une ligne du flux `traffic_data` : un relevé ponctuel de l'installation.
/// Les champs absents ou null côté magasin restent None ici ; les champs
/// inconnus sont ignorés à la désérialisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    #[serde(deserialize_with = "de_opaque_id")]
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub event_type: String,
    #[serde(default)]
    pub congestion: bool,
    #[serde(default)]
    pub light_main: Option<LightColor>,
    #[serde(default)]
    pub tilt_detected: Option<bool>,
    #[serde(default)]
    pub street_light_on: Option<bool>,
    #[serde(default)]
    pub pitch_deg: Option<f64>,
    #[serde(default)]
    pub roll_deg: Option<f64>,
    #[serde(default)]
    pub baseline_cm: Option<f64>,
    #[serde(default)]
    pub threshold_cm: Option<f64>,
    #[serde(default)]
    pub distance_cm: Option<f64>,
    #[serde(default)]
    pub cfg_green_ms: Option<u32>,
    #[serde(default)]
    pub cfg_yellow_ms: Option<u32>,
}

impl Sample {
    pub fn tilted(&self) -> bool {
        self.tilt_detected.unwrap_or(false)
    }
}

/// Une ligne du flux `traffic_config` : écriture de configuration immuable,
/// append-only. La configuration active est celle au `updated_at` maximal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRecord {
    #[serde(deserialize_with = "de_opaque_id")]
    pub id: String,
    pub normal_green_ms: u32,
    pub yellow_ms: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Les identifiants sont opaques mais le magasin peut les livrer en nombre
/// ou en chaîne selon la colonne source ; on normalise en chaîne.
fn de_opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "id must be a string or a number, got {other}"
        ))),
    }
}

/// Désérialise une ligne du magasin, None si elle est malformée (loggée).
/// Une ligne invalide ne fait jamais échouer le lot qui la contient.
pub fn parse_row<T: serde::de::DeserializeOwned>(tag: &str, row: serde_json::Value) -> Option<T> {
    match serde_json::from_value::<T>(row) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            eprintln!("[{tag}] ligne invalide ignorée: {e}");
            None
        }
    }
}

/// Variante lot : filtre les lignes malformées sans interrompre les autres
pub fn parse_rows<T: serde::de::DeserializeOwned>(
    tag: &str,
    rows: Vec<serde_json::Value>,
) -> Vec<T> {
    rows.into_iter().filter_map(|row| parse_row(tag, row)).collect()
}
