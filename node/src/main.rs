mod bus;
mod provisioning;
mod sensors;
mod store;
mod wifi;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::{info, warn};

use purifier_common::{config::NodeConfig, state::StateStore, types::TelemetryPayload};

use crate::{
    bus::MessageBus,
    sensors::SensorSim,
    store::FsKvStore,
    wifi::{SignalHandle, SimulatedLink, WifiManager, WifiStartup},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    run().await
}

async fn run() -> anyhow::Result<()> {
    let config = NodeConfig::from_env();
    info!(device_id = %config.device_id, "purifier node starting");

    // The durable store is the one boot dependency allowed to abort startup.
    let kv = FsKvStore::open_from_env().context("durable store initialization failed")?;

    let state = StateStore::load(kv.clone()).context("failed to load device state")?;
    info!(
        power = state.get().power_state,
        fan_speed = state.get().fan_speed,
        "device state loaded"
    );
    let state = Arc::new(Mutex::new(state));

    let mut wifi = WifiManager::new(config.clone(), kv.clone(), SimulatedLink::from_env());
    if let WifiStartup::Provisioning = wifi.establish().await? {
        // Terminal for this boot: a successful submission restarts the process.
        return provisioning::serve(kv, &config).await;
    }

    let signal = wifi.signal_handle();
    tokio::spawn(wifi.monitor());

    let (bus, events) = MessageBus::connect(&config);
    tokio::spawn(bus::run_dispatcher(bus.clone(), events, Arc::clone(&state)));

    telemetry_loop(&config, bus, state, signal).await
}

/// Fixed-period telemetry on absolute deadlines: a slow cycle never shifts
/// the next wake time.
async fn telemetry_loop(
    config: &NodeConfig,
    bus: MessageBus,
    state: Arc<Mutex<StateStore<FsKvStore>>>,
    signal: SignalHandle,
) -> anyhow::Result<()> {
    let mut sensors = SensorSim::new();
    let seeded = sensors.current();
    info!(
        temperature = seeded.temperature,
        pm25 = seeded.pm25,
        "sensor front-end seeded"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.telemetry_period_secs));

    loop {
        interval.tick().await;

        let payload = {
            let mut state = state.lock().await;
            state.update_sensors(sensors.step());
            TelemetryPayload::new(&config.device_id, &state.get().sensors, signal.rssi())
        };

        match bus.publish_telemetry(&payload).await {
            Ok(()) => info!(
                temperature = payload.temperature,
                pm25 = payload.pm25,
                rssi = payload.wifi_rssi,
                "telemetry published"
            ),
            Err(err) => warn!("telemetry publish skipped: {err}"),
        }
    }
}
