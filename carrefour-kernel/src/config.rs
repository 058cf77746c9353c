use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    #[serde(default)]
    pub mqtt: MqttConf,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Cadence des pulls (échantillon courant, journal, configuration)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Délai d'attente d'une réponse du magasin
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 1883 }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_data_dir() -> String {
    "./data".into()
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            http_port: default_http_port(),
            poll_interval_ms: default_poll_interval_ms(),
            store_timeout_ms: default_store_timeout_ms(),
            data_dir: default_data_dir(),
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("CARREFOUR_CONFIG").unwrap_or_else(|_| "carrefour.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return KernelConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[kernel] config invalide: {e}");
            KernelConfig::default()
        })
    } else {
        eprintln!("[kernel] pas de carrefour.yaml, usage config par défaut");
        KernelConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: KernelConfig = serde_yaml::from_str("mqtt:\n  host: broker.local\n  port: 1884\n").unwrap();
        assert_eq!(cfg.mqtt.host, "broker.local");
        assert_eq!(cfg.mqtt.port, 1884);
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.poll_interval_ms, 1000);
        assert_eq!(cfg.store_timeout_ms, 5000);
    }

    #[test]
    fn full_yaml_overrides_everything() {
        let cfg: KernelConfig = serde_yaml::from_str(
            "mqtt:\n  host: h\n  port: 1\nhttp_port: 9000\npoll_interval_ms: 250\nstore_timeout_ms: 800\ndata_dir: /tmp/carrefour\n",
        )
        .unwrap();
        assert_eq!(cfg.http_port, 9000);
        assert_eq!(cfg.poll_interval_ms, 250);
        assert_eq!(cfg.data_dir, "/tmp/carrefour");
    }
}
