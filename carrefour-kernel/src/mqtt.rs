use crate::config::KernelConfig;
use crate::health::HealthTracker;
use crate::store::{
    StoreBridge, TOPIC_CONFIG_FEED, TOPIC_DATA_FEED, TOPIC_STORE_RESPONSE,
};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Client partagé entre le pont magasin et la publication de santé
pub fn create_mqtt_client(cfg: &KernelConfig) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new("carrefour-kernel", &cfg.mqtt.host, cfg.mqtt.port);
    opts.set_keep_alive(std::time::Duration::from_secs(15));
    AsyncClient::new(opts, 10)
}

/// Boucle d'événements MQTT : pose les abonnements puis route chaque
/// publication entrante vers le pont magasin. Une erreur de connexion
/// dégrade en pull seul le temps que rumqttc se rétablisse ; aucune
/// ré-orchestration explicite ici.
pub fn spawn_mqtt_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    bridge: Arc<StoreBridge>,
    health: HealthTracker,
) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        for topic in [TOPIC_STORE_RESPONSE, TOPIC_DATA_FEED, TOPIC_CONFIG_FEED] {
            if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                eprintln!("[mqtt] subscribe {topic} failed: {e:?}");
            }
        }

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    bridge.handle_publish(&p.topic, &p.payload);
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    health.mark_mqtt_connected();
                    println!("[mqtt] connected to broker");
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("[mqtt] erreur: {e:?}");
                    health.increment_reconnects();
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                }
            }
        }
    })
}
