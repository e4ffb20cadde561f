pub mod command;
pub mod config;
pub mod connectivity;
pub mod state;
pub mod store;
pub mod topics;
pub mod types;

pub use command::{Command, CommandType, ExecutionError, ParseError};
pub use config::{MqttConfig, NodeConfig, ProvisioningConfig};
pub use connectivity::{
    ConnectivityManager, ConnectivityState, Credentials, ReconnectAction, RSSI_UNAVAILABLE,
};
pub use state::{DeviceState, StateError, StateStore};
pub use store::{KvStore, KvValue, MemoryStore, StoreError};
pub use types::{AckStatus, Acknowledgment, SensorSnapshot, TelemetryPayload};
