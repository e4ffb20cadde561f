use thiserror::Error;

use crate::store::{KvStore, KvValue, StoreError};
use crate::types::SensorSnapshot;

pub const STATE_NAMESPACE: &str = "device_state";
pub const MAX_FAN_SPEED: u8 = 100;

const KEY_POWER_STATE: &str = "power_state";
const KEY_FAN_SPEED: &str = "fan_speed";

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub power_state: bool,
    pub fan_speed: u8,
    pub sensors: SensorSnapshot,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power_state: false,
            fan_speed: 0,
            sensors: SensorSnapshot::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("fan speed must be between 0 and {MAX_FAN_SPEED}")]
    InvalidArgument,
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

/// Canonical appliance state plus its persistence. Only `power_state` and
/// `fan_speed` are durable; mutators persist synchronously so callers see a
/// write failure inline.
#[derive(Debug)]
pub struct StateStore<S: KvStore> {
    state: DeviceState,
    kv: S,
}

impl<S: KvStore> StateStore<S> {
    /// Loads the durable subset. Missing keys are a normal first boot and
    /// fall back to defaults; only a failing backend is an error.
    pub fn load(kv: S) -> Result<Self, StoreError> {
        let power_state = kv.read_u8(STATE_NAMESPACE, KEY_POWER_STATE)?;
        let fan_speed = kv.read_u8(STATE_NAMESPACE, KEY_FAN_SPEED)?;

        let state = DeviceState {
            power_state: power_state == Some(1),
            fan_speed: fan_speed.unwrap_or(0).min(MAX_FAN_SPEED),
            sensors: SensorSnapshot::default(),
        };

        Ok(Self { state, kv })
    }

    pub fn get(&self) -> &DeviceState {
        &self.state
    }

    /// Any accepted speed also forces the unit on.
    pub fn set_fan_speed(&mut self, speed: u8) -> Result<(), StateError> {
        if speed > MAX_FAN_SPEED {
            return Err(StateError::InvalidArgument);
        }

        self.state.fan_speed = speed;
        self.state.power_state = true;
        self.save()?;
        Ok(())
    }

    pub fn set_power(&mut self, on: bool) -> Result<(), StateError> {
        self.state.power_state = on;
        self.save()?;
        Ok(())
    }

    /// Memory only; sensor readings are regenerated on every boot.
    pub fn update_sensors(&mut self, snapshot: SensorSnapshot) {
        self.state.sensors = snapshot;
    }

    /// Commits both durable fields as one batch.
    pub fn save(&mut self) -> Result<(), StoreError> {
        self.kv.write_batch(
            STATE_NAMESPACE,
            &[
                (KEY_POWER_STATE, KvValue::U8(u8::from(self.state.power_state))),
                (KEY_FAN_SPEED, KvValue::U8(self.state.fan_speed)),
            ],
        )
    }

    pub fn into_inner(self) -> S {
        self.kv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_boot_defaults_to_off_and_zero() {
        let store = StateStore::load(MemoryStore::new()).unwrap();

        assert_eq!(store.get(), &DeviceState::default());
    }

    #[test]
    fn accepts_every_speed_in_range_and_forces_power_on() {
        let mut store = StateStore::load(MemoryStore::new()).unwrap();

        for speed in 0..=MAX_FAN_SPEED {
            store.set_power(false).unwrap();
            store.set_fan_speed(speed).unwrap();

            assert_eq!(store.get().fan_speed, speed);
            assert!(store.get().power_state);
        }
    }

    #[test]
    fn rejects_out_of_range_speed_and_leaves_state_untouched() {
        let mut store = StateStore::load(MemoryStore::new()).unwrap();
        store.set_fan_speed(40).unwrap();
        store.set_power(false).unwrap();

        for speed in [101, 150, u8::MAX] {
            let err = store.set_fan_speed(speed).unwrap_err();
            assert!(matches!(err, StateError::InvalidArgument));
            assert_eq!(store.get().fan_speed, 40);
            assert!(!store.get().power_state);
        }
    }

    #[test]
    fn durable_fields_survive_a_reopen_but_sensors_do_not() {
        let mut store = StateStore::load(MemoryStore::new()).unwrap();
        store.set_power(true).unwrap();
        store.set_fan_speed(40).unwrap();
        store.update_sensors(SensorSnapshot {
            temperature: 25.0,
            ..SensorSnapshot::default()
        });

        let reopened = StateStore::load(store.into_inner()).unwrap();

        assert!(reopened.get().power_state);
        assert_eq!(reopened.get().fan_speed, 40);
        assert_eq!(reopened.get().sensors, SensorSnapshot::default());
    }

    #[test]
    fn updating_sensors_never_touches_the_store() {
        let mut store = StateStore::load(MemoryStore::new()).unwrap();
        let mut failing = MemoryStore::new();
        failing.fail_writes(true);
        store.kv = failing;

        store.update_sensors(SensorSnapshot {
            pm25: 17.0,
            ..SensorSnapshot::default()
        });

        assert_eq!(store.get().sensors.pm25, 17.0);
    }

    #[test]
    fn write_failure_is_surfaced_and_old_pair_remains_loadable() {
        let mut store = StateStore::load(MemoryStore::new()).unwrap();
        store.set_fan_speed(30).unwrap();

        let mut kv = store.into_inner();
        kv.fail_writes(true);
        let mut store = StateStore::load(kv).unwrap();

        let err = store.set_fan_speed(60).unwrap_err();
        assert!(matches!(err, StateError::Persistence(_)));

        let mut kv = store.into_inner();
        kv.fail_writes(false);
        let reopened = StateStore::load(kv).unwrap();
        assert_eq!(reopened.get().fan_speed, 30);
        assert!(reopened.get().power_state);
    }
}
