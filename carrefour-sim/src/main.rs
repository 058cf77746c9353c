//! Carrefour Sim - plays the remote side of the system so the kernel can run
//! end to end against a plain MQTT broker:
//! - the roadside installation, emitting one `traffic_data` row per second
//!   (boot event, congestion transitions, tilt alarms, street lamp state);
//! - the append-only store, answering the kernel's query/insert commands and
//!   rebroadcasting inserted rows on the change feeds.

mod device;
mod store;

use anyhow::Result;
use device::TrafficDevice;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use store::{
    process_command, HistoryStore, StreamKind, TOPIC_STORE_INSERT, TOPIC_STORE_QUERY,
    TOPIC_STORE_RESPONSE,
};
use tokio::time::interval;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let broker = std::env::var("CARREFOUR_SIM_BROKER").unwrap_or_else(|_| "localhost".into());
    let port: u16 = std::env::var("CARREFOUR_SIM_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(1883);

    info!("starting carrefour-sim against {broker}:{port}");

    let mut opts = MqttOptions::new("carrefour-sim", &broker, port);
    opts.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(opts, 10);

    client.subscribe(TOPIC_STORE_QUERY, QoS::AtLeastOnce).await?;
    client.subscribe(TOPIC_STORE_INSERT, QoS::AtLeastOnce).await?;

    let history = Arc::new(HistoryStore::new());
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9e3779b97f4a7c15);
    let mut device = TrafficDevice::new(seed);

    // the installation announces itself before settling into its cadence
    publish_sample(&client, &history, device.boot()).await;

    let mut ticker = interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                publish_sample(&client, &history, device.tick()).await;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Incoming::Publish(p)))
                        if p.topic == TOPIC_STORE_QUERY || p.topic == TOPIC_STORE_INSERT =>
                    {
                        handle_command(&client, &history, &mut device, &p.payload).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("mqtt error: {e:?}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Emit one installation row: into the history (visible to pulls) and onto
/// the data feed (visible to push subscribers), like the real store does.
async fn publish_sample(client: &AsyncClient, history: &HistoryStore, sample: device::EmittedSample) {
    let row = match serde_json::to_value(&sample) {
        Ok(row) => row,
        Err(e) => {
            warn!("failed to serialize sample: {e}");
            return;
        }
    };
    history.append(StreamKind::Samples, row.clone());
    if sample.event_type != "update" {
        info!("emitted {} row (distance {:.1} cm)", sample.event_type, sample.distance_cm);
    } else {
        debug!("emitted update row (distance {:.1} cm)", sample.distance_cm);
    }

    if let Ok(payload) = serde_json::to_string(&row) {
        if let Err(e) = client
            .publish(StreamKind::Samples.feed_topic(), QoS::AtLeastOnce, false, payload)
            .await
        {
            warn!("failed to publish sample: {e:?}");
        }
    }
}

/// Answer one store command and apply its side effects: rebroadcast an
/// inserted row on its feed, and hand new timings to the device.
async fn handle_command(
    client: &AsyncClient,
    history: &HistoryStore,
    device: &mut TrafficDevice,
    payload: &[u8],
) {
    let (response, inserted) = process_command(history, payload);

    if let Ok(response_json) = serde_json::to_string(&response) {
        if let Err(e) = client
            .publish(TOPIC_STORE_RESPONSE, QoS::AtLeastOnce, false, response_json)
            .await
        {
            warn!("failed to publish response: {e:?}");
        }
    }

    let Some(inserted) = inserted else { return };

    if inserted.stream == StreamKind::Config {
        let green = inserted.row.get("normal_green_ms").and_then(|v| v.as_u64());
        let yellow = inserted.row.get("yellow_ms").and_then(|v| v.as_u64());
        if let (Some(green), Some(yellow)) = (green, yellow) {
            device.apply_config(green, yellow);
            info!("applied new timings: green {green} ms, yellow {yellow} ms");
        }
    }

    if let Ok(payload) = serde_json::to_string(&inserted.row) {
        if let Err(e) = client
            .publish(inserted.stream.feed_topic(), QoS::AtLeastOnce, false, payload)
            .await
        {
            warn!("failed to rebroadcast inserted row: {e:?}");
        }
    }
}
