use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing::{info, warn};

use purifier_common::{
    config::NodeConfig,
    connectivity::{
        ConnectivityManager, ConnectivityState, Credentials, ReconnectAction, RSSI_UNAVAILABLE,
    },
    store::KvStore,
};

const HANDSHAKE_DELAY_MS: u64 = 50;
const LINK_POLL_SECS: u64 = 5;

#[derive(Debug, PartialEq, Eq)]
pub enum WifiStartup {
    Connected,
    Provisioning,
}

/// Cheap read handle for the current signal metric; holds the sentinel while
/// the association is down.
#[derive(Clone)]
pub struct SignalHandle(Arc<AtomicI32>);

impl SignalHandle {
    pub fn rssi(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Stand-in for the radio driver. Association succeeds against any
/// non-empty SSID unless failures are injected; hardware ports replace this
/// with the real supplicant.
pub struct SimulatedLink {
    fail_attempts: u32,
    drop_after: Option<Duration>,
    associated_at: Option<Instant>,
    ticks: u32,
}

impl SimulatedLink {
    pub fn from_env() -> Self {
        let fail_attempts = std::env::var("PURIFIER_WIFI_FAIL_ATTEMPTS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(0);
        let drop_after = std::env::var("PURIFIER_WIFI_DROP_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs);

        Self::with_behavior(fail_attempts, drop_after)
    }

    pub fn with_behavior(fail_attempts: u32, drop_after: Option<Duration>) -> Self {
        Self {
            fail_attempts,
            drop_after,
            associated_at: None,
            ticks: 0,
        }
    }

    async fn associate(&mut self, credentials: &Credentials) -> bool {
        tokio::time::sleep(Duration::from_millis(HANDSHAKE_DELAY_MS)).await;

        if self.fail_attempts > 0 {
            self.fail_attempts -= 1;
            return false;
        }
        if credentials.ssid.is_empty() {
            return false;
        }

        self.associated_at = Some(Instant::now());
        true
    }

    fn is_up(&self) -> bool {
        match (self.associated_at, self.drop_after) {
            (Some(since), Some(limit)) => since.elapsed() < limit,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn disconnect(&mut self) {
        self.associated_at = None;
    }

    fn rssi(&mut self) -> i32 {
        self.ticks = self.ticks.wrapping_add(1);
        -55 - (self.ticks % 7) as i32 * 3
    }
}

/// Drives the association lifecycle against the link and owns credential
/// loading. The pure state machine lives in `purifier_common::connectivity`.
pub struct WifiManager<S> {
    config: NodeConfig,
    kv: S,
    manager: ConnectivityManager,
    link: SimulatedLink,
    rssi: Arc<AtomicI32>,
    credentials: Option<Credentials>,
}

impl<S: KvStore + Clone + Send + 'static> WifiManager<S> {
    pub fn new(config: NodeConfig, kv: S, link: SimulatedLink) -> Self {
        let manager = ConnectivityManager::new(config.max_retry);
        Self {
            config,
            kv,
            manager,
            link,
            rssi: Arc::new(AtomicI32::new(RSSI_UNAVAILABLE)),
            credentials: None,
        }
    }

    pub fn signal_handle(&self) -> SignalHandle {
        SignalHandle(Arc::clone(&self.rssi))
    }

    pub fn state(&self) -> ConnectivityState {
        self.manager.state()
    }

    /// Boot-time association. Missing or unprovisioned credentials go
    /// straight to provisioning without blocking the rest of startup.
    pub async fn establish(&mut self) -> anyhow::Result<WifiStartup> {
        let credentials = match Credentials::load(&self.kv)? {
            Some(credentials) if credentials.provisioned => credentials,
            _ => {
                warn!("no provisioned credentials; starting provisioning access point");
                self.manager.enter_provisioning();
                self.start_access_point();
                return Ok(WifiStartup::Provisioning);
            }
        };

        self.credentials = Some(credentials.clone());
        Ok(self.associate_with_budget(&credentials).await)
    }

    async fn associate_with_budget(&mut self, credentials: &Credentials) -> WifiStartup {
        loop {
            self.manager.begin_connecting();
            info!(
                attempt = self.manager.retry_count() + 1,
                ssid = %credentials.ssid,
                "associating"
            );

            let handshake_bound = Duration::from_millis(self.config.assoc_timeout_ms);
            let associated =
                tokio::time::timeout(handshake_bound, self.link.associate(credentials))
                    .await
                    .unwrap_or(false);

            if associated {
                self.manager.on_associated();
                let rssi = self.manager.signal_strength(Some(self.link.rssi()));
                self.rssi.store(rssi, Ordering::Relaxed);
                info!(ssid = %credentials.ssid, rssi, "associated, address acquired");
                return WifiStartup::Connected;
            }

            match self.manager.on_disconnected() {
                Some(ReconnectAction::Retry { attempt }) => {
                    warn!(
                        attempt,
                        max_retry = self.config.max_retry,
                        "association attempt failed"
                    );
                }
                Some(ReconnectAction::StartProvisioning) | None => {
                    warn!("association retry budget exhausted; starting provisioning access point");
                    self.start_access_point();
                    return WifiStartup::Provisioning;
                }
            }
        }
    }

    fn start_access_point(&mut self) {
        self.rssi.store(RSSI_UNAVAILABLE, Ordering::Relaxed);
        // With the simulated radio the access point is the HTTP endpoint the
        // caller serves next.
        info!(
            ap_ssid = %self.config.provisioning.ap_ssid,
            "provisioning access point up"
        );
    }

    /// Steady-state link supervision: refreshes the signal metric, replays
    /// the retry budget after a drop, and falls back to provisioning when it
    /// runs out. Runs for the life of the process.
    pub async fn monitor(mut self) {
        let mut poll = tokio::time::interval(Duration::from_secs(LINK_POLL_SECS));

        loop {
            poll.tick().await;

            if self.link.is_up() {
                let rssi = self.manager.signal_strength(Some(self.link.rssi()));
                self.rssi.store(rssi, Ordering::Relaxed);
                continue;
            }
            if self.state() != ConnectivityState::Connected {
                continue;
            }

            warn!("wifi link dropped");
            self.rssi.store(RSSI_UNAVAILABLE, Ordering::Relaxed);
            self.link.disconnect();

            let Some(credentials) = self.credentials.clone() else {
                continue;
            };

            let fell_back = match self.manager.on_disconnected() {
                Some(ReconnectAction::Retry { .. }) => {
                    self.associate_with_budget(&credentials).await == WifiStartup::Provisioning
                }
                Some(ReconnectAction::StartProvisioning) => {
                    self.start_access_point();
                    true
                }
                None => return,
            };

            if fell_back {
                if let Err(err) = crate::provisioning::serve(self.kv.clone(), &self.config).await {
                    warn!("provisioning endpoint failed: {err:#}");
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purifier_common::store::MemoryStore;

    fn quick_config(max_retry: u32) -> NodeConfig {
        NodeConfig {
            max_retry,
            assoc_timeout_ms: 500,
            ..NodeConfig::default()
        }
    }

    fn provisioned_store() -> MemoryStore {
        let mut kv = MemoryStore::new();
        Credentials {
            ssid: "HomeNet".to_string(),
            password: "hunter22".to_string(),
            provisioned: true,
        }
        .save(&mut kv)
        .unwrap();
        kv
    }

    #[tokio::test]
    async fn missing_credentials_enter_provisioning_without_attempts() {
        let link = SimulatedLink::with_behavior(0, None);
        let mut wifi = WifiManager::new(quick_config(5), MemoryStore::new(), link);

        let startup = wifi.establish().await.unwrap();

        assert_eq!(startup, WifiStartup::Provisioning);
        assert_eq!(wifi.state(), ConnectivityState::Provisioning);
    }

    #[tokio::test]
    async fn unprovisioned_credentials_also_enter_provisioning() {
        let mut kv = MemoryStore::new();
        Credentials {
            ssid: "HomeNet".to_string(),
            password: String::new(),
            provisioned: false,
        }
        .save(&mut kv)
        .unwrap();
        let link = SimulatedLink::with_behavior(0, None);
        let mut wifi = WifiManager::new(quick_config(5), kv, link);

        assert_eq!(wifi.establish().await.unwrap(), WifiStartup::Provisioning);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_association() {
        let link = SimulatedLink::with_behavior(2, None);
        let mut wifi = WifiManager::new(quick_config(5), provisioned_store(), link);

        let startup = wifi.establish().await.unwrap();

        assert_eq!(startup, WifiStartup::Connected);
        assert_eq!(wifi.state(), ConnectivityState::Connected);
        assert_ne!(wifi.signal_handle().rssi(), RSSI_UNAVAILABLE);
    }

    #[tokio::test]
    async fn exhausted_budget_falls_back_to_provisioning() {
        let link = SimulatedLink::with_behavior(10, None);
        let mut wifi = WifiManager::new(quick_config(2), provisioned_store(), link);

        let startup = wifi.establish().await.unwrap();

        assert_eq!(startup, WifiStartup::Provisioning);
        assert_eq!(wifi.state(), ConnectivityState::Provisioning);
        assert_eq!(wifi.signal_handle().rssi(), RSSI_UNAVAILABLE);
    }

    #[tokio::test]
    async fn a_slow_handshake_is_bounded_by_the_timeout() {
        let config = NodeConfig {
            max_retry: 1,
            assoc_timeout_ms: 5,
            ..NodeConfig::default()
        };
        let link = SimulatedLink::with_behavior(0, None);
        let mut wifi = WifiManager::new(config, provisioned_store(), link);

        // The simulated handshake takes longer than the bound, so every
        // attempt times out and the budget drains.
        assert_eq!(wifi.establish().await.unwrap(), WifiStartup::Provisioning);
    }
}
