/*!
Fabrique de lignes traffic_data / traffic_config pour tests et démos

Les lignes sortent au format exact du magasin (JSON, timestamps RFC 3339) ;
chaque helper part d'une base réaliste et les surcharges se font champ par
champ via `SampleRow`.
*/

use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Parse un timestamp RFC 3339, pour écrire des scénarios lisibles
pub fn at(ts: &str) -> OffsetDateTime {
    OffsetDateTime::parse(ts, &Rfc3339).expect("invalid RFC 3339 timestamp in test scenario")
}

fn fmt(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).expect("RFC 3339 formatting cannot fail")
}

/// Ligne traffic_data en construction
pub struct SampleRow {
    row: Value,
}

impl SampleRow {
    pub fn new(id: &str, created_at: OffsetDateTime) -> Self {
        Self {
            row: json!({
                "id": id,
                "created_at": fmt(created_at),
                "event_type": "update",
                "congestion": false,
                "light_main": "green",
                "tilt_detected": false,
                "street_light_on": false,
            }),
        }
    }

    pub fn event_type(mut self, tag: &str) -> Self {
        self.row["event_type"] = json!(tag);
        self
    }

    pub fn congestion(mut self, congested: bool) -> Self {
        self.row["congestion"] = json!(congested);
        self
    }

    pub fn light(mut self, color: &str) -> Self {
        self.row["light_main"] = json!(color);
        self
    }

    pub fn no_light(mut self) -> Self {
        self.row["light_main"] = Value::Null;
        self
    }

    pub fn tilt(mut self, pitch_deg: f64, roll_deg: f64) -> Self {
        self.row["tilt_detected"] = json!(true);
        self.row["pitch_deg"] = json!(pitch_deg);
        self.row["roll_deg"] = json!(roll_deg);
        self
    }

    pub fn street_light(mut self, on: bool) -> Self {
        self.row["street_light_on"] = json!(on);
        self
    }

    pub fn distances(mut self, baseline_cm: f64, threshold_cm: f64, distance_cm: f64) -> Self {
        self.row["baseline_cm"] = json!(baseline_cm);
        self.row["threshold_cm"] = json!(threshold_cm);
        self.row["distance_cm"] = json!(distance_cm);
        self
    }

    /// Durées appliquées par l'installation (peuvent traîner derrière la config)
    pub fn applied_config(mut self, green_ms: u32, yellow_ms: u32) -> Self {
        self.row["cfg_green_ms"] = json!(green_ms);
        self.row["cfg_yellow_ms"] = json!(yellow_ms);
        self
    }

    pub fn build(self) -> Value {
        self.row
    }
}

/// Mise à jour périodique banale (filtrée du journal d'alertes)
pub fn update_row(id: &str, created_at: OffsetDateTime) -> Value {
    SampleRow::new(id, created_at).build()
}

/// Détection de congestion (feu rouge, distance sous le seuil)
pub fn congestion_row(id: &str, created_at: OffsetDateTime) -> Value {
    SampleRow::new(id, created_at)
        .event_type("congestion")
        .congestion(true)
        .light("red")
        .distances(120.0, 60.0, 41.5)
        .build()
}

/// Fin de congestion
pub fn clear_row(id: &str, created_at: OffsetDateTime) -> Value {
    SampleRow::new(id, created_at)
        .event_type("clear")
        .light("green")
        .distances(120.0, 60.0, 112.0)
        .build()
}

/// Alarme d'inclinaison du mât
pub fn tilt_row(id: &str, created_at: OffsetDateTime) -> Value {
    SampleRow::new(id, created_at)
        .event_type("tilt")
        .tilt(4.2, 1.1)
        .build()
}

/// Redémarrage de l'installation
pub fn boot_row(id: &str, created_at: OffsetDateTime) -> Value {
    SampleRow::new(id, created_at)
        .event_type("boot")
        .no_light()
        .build()
}

/// Ligne traffic_config (enregistrement append-only)
pub fn config_row(id: &str, green_ms: u32, yellow_ms: u32, updated_at: OffsetDateTime) -> Value {
    json!({
        "id": id,
        "normal_green_ms": green_ms,
        "yellow_ms": yellow_ms,
        "updated_at": fmt(updated_at),
    })
}

/// Variante avec id généré, pour les scénarios où il n'importe pas
pub fn fresh_config_row(green_ms: u32, yellow_ms: u32, updated_at: OffsetDateTime) -> Value {
    config_row(&Uuid::new_v4().to_string(), green_ms, yellow_ms, updated_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrefour_kernel::models::Sample;

    #[test]
    fn built_rows_parse_as_kernel_samples() {
        let t = at("2025-06-01T12:00:00Z");
        for row in [
            update_row("u1", t),
            congestion_row("c1", t),
            clear_row("cl1", t),
            tilt_row("t1", t),
            boot_row("b1", t),
        ] {
            let parsed: Sample = serde_json::from_value(row).unwrap();
            assert_eq!(parsed.created_at, t);
        }
    }

    #[test]
    fn tilt_row_carries_angles() {
        let parsed: Sample =
            serde_json::from_value(tilt_row("t1", at("2025-06-01T12:00:00Z"))).unwrap();
        assert!(parsed.tilted());
        assert_eq!(parsed.pitch_deg, Some(4.2));
    }
}
