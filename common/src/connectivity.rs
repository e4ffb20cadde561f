use crate::store::{KvStore, KvValue, StoreError};

/// Reported while not associated, or when the link cannot be queried.
pub const RSSI_UNAVAILABLE: i32 = -100;

pub const WIFI_NAMESPACE: &str = "wifi_storage";
pub const MAX_SSID_BYTES: usize = 32;
pub const MAX_PASSWORD_BYTES: usize = 64;

const KEY_SSID: &str = "ssid";
const KEY_PASSWORD: &str = "pass";
const KEY_PROVISIONED: &str = "provisioned";

/// Network credentials, durable in the `wifi_storage` namespace. Written by
/// the provisioning endpoint and read back at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
    pub provisioned: bool,
}

impl Credentials {
    pub fn load<S: KvStore>(kv: &S) -> Result<Option<Self>, StoreError> {
        let Some(ssid) = kv.read_string(WIFI_NAMESPACE, KEY_SSID)? else {
            return Ok(None);
        };
        let password = kv.read_string(WIFI_NAMESPACE, KEY_PASSWORD)?.unwrap_or_default();
        let provisioned = kv.read_u8(WIFI_NAMESPACE, KEY_PROVISIONED)? == Some(1);

        Ok(Some(Self {
            ssid,
            password,
            provisioned,
        }))
    }

    pub fn save<S: KvStore>(&self, kv: &mut S) -> Result<(), StoreError> {
        kv.write_batch(
            WIFI_NAMESPACE,
            &[
                (KEY_SSID, KvValue::Str(self.ssid.clone())),
                (KEY_PASSWORD, KvValue::Str(self.password.clone())),
                (KEY_PROVISIONED, KvValue::U8(u8::from(self.provisioned))),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Connected,
    Provisioning,
}

/// What the link driver should do after a drop or failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    Retry { attempt: u32 },
    StartProvisioning,
}

/// Association lifecycle: `Idle -> Connecting -> {Connected | Provisioning}`,
/// with `Connected -> Connecting` on a drop while the retry budget lasts.
/// Provisioning is terminal for the current boot; only a process restart
/// re-enters `Idle`.
#[derive(Debug)]
pub struct ConnectivityManager {
    state: ConnectivityState,
    retry_count: u32,
    max_retry: u32,
}

impl ConnectivityManager {
    pub fn new(max_retry: u32) -> Self {
        Self {
            state: ConnectivityState::Idle,
            retry_count: 0,
            max_retry,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn begin_connecting(&mut self) {
        if self.state != ConnectivityState::Provisioning {
            self.state = ConnectivityState::Connecting;
        }
    }

    /// Address acquired: the retry budget refills.
    pub fn on_associated(&mut self) {
        if self.state != ConnectivityState::Provisioning {
            self.retry_count = 0;
            self.state = ConnectivityState::Connected;
        }
    }

    /// Returns the next move after a drop or a failed attempt; `None` once
    /// provisioning has started (late disconnect events are ignored).
    pub fn on_disconnected(&mut self) -> Option<ReconnectAction> {
        if self.state == ConnectivityState::Provisioning {
            return None;
        }

        if self.retry_count < self.max_retry {
            self.retry_count += 1;
            self.state = ConnectivityState::Connecting;
            Some(ReconnectAction::Retry {
                attempt: self.retry_count,
            })
        } else {
            self.state = ConnectivityState::Provisioning;
            Some(ReconnectAction::StartProvisioning)
        }
    }

    /// Direct entry at boot when no usable credentials exist.
    pub fn enter_provisioning(&mut self) {
        self.state = ConnectivityState::Provisioning;
    }

    /// Never fails the caller: yields the sentinel whenever the association
    /// is down or the link has no reading.
    pub fn signal_strength(&self, link_rssi: Option<i32>) -> i32 {
        match (self.state, link_rssi) {
            (ConnectivityState::Connected, Some(rssi)) => rssi,
            _ => RSSI_UNAVAILABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn association_resets_the_retry_budget() {
        let mut manager = ConnectivityManager::new(5);
        manager.begin_connecting();

        assert_eq!(
            manager.on_disconnected(),
            Some(ReconnectAction::Retry { attempt: 1 })
        );
        assert_eq!(
            manager.on_disconnected(),
            Some(ReconnectAction::Retry { attempt: 2 })
        );

        manager.on_associated();
        assert_eq!(manager.state(), ConnectivityState::Connected);
        assert_eq!(manager.retry_count(), 0);
    }

    #[test]
    fn exhausted_budget_enters_provisioning_exactly_once() {
        let max_retry = 5;
        let mut manager = ConnectivityManager::new(max_retry);
        manager.begin_connecting();

        for attempt in 1..=max_retry {
            assert_eq!(
                manager.on_disconnected(),
                Some(ReconnectAction::Retry { attempt })
            );
        }

        assert_eq!(
            manager.on_disconnected(),
            Some(ReconnectAction::StartProvisioning)
        );
        assert_eq!(manager.state(), ConnectivityState::Provisioning);

        // Late disconnect events are no-ops once provisioning has begun.
        assert_eq!(manager.on_disconnected(), None);
        assert_eq!(manager.on_disconnected(), None);
        assert_eq!(manager.state(), ConnectivityState::Provisioning);
    }

    #[test]
    fn a_drop_after_association_spends_the_budget_again() {
        let mut manager = ConnectivityManager::new(2);
        manager.begin_connecting();
        manager.on_associated();

        assert_eq!(
            manager.on_disconnected(),
            Some(ReconnectAction::Retry { attempt: 1 })
        );
        assert_eq!(manager.state(), ConnectivityState::Connecting);

        manager.on_associated();
        assert_eq!(manager.retry_count(), 0);
    }

    #[test]
    fn signal_strength_falls_back_to_the_sentinel() {
        let mut manager = ConnectivityManager::new(3);
        assert_eq!(manager.signal_strength(Some(-48)), RSSI_UNAVAILABLE);

        manager.begin_connecting();
        manager.on_associated();
        assert_eq!(manager.signal_strength(Some(-48)), -48);
        assert_eq!(manager.signal_strength(None), RSSI_UNAVAILABLE);

        manager.on_disconnected();
        assert_eq!(manager.signal_strength(Some(-48)), RSSI_UNAVAILABLE);
    }

    #[test]
    fn credentials_round_trip_through_the_store() {
        let mut kv = MemoryStore::new();
        assert_eq!(Credentials::load(&kv).unwrap(), None);

        let credentials = Credentials {
            ssid: "HomeNet".to_string(),
            password: "hunter22".to_string(),
            provisioned: true,
        };
        credentials.save(&mut kv).unwrap();

        assert_eq!(Credentials::load(&kv).unwrap(), Some(credentials));
    }
}
