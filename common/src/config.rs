use std::env;

pub const DEFAULT_DEVICE_ID: &str = "device_esp32_001";
pub const DEFAULT_TELEMETRY_PERIOD_SECS: u64 = 120;
pub const DEFAULT_MAX_RETRY: u32 = 5;
pub const DEFAULT_ASSOC_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id: format!("purifier-{DEFAULT_DEVICE_ID}"),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    pub ap_ssid: String,
    pub ap_password: String,
    pub http_port: u16,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            ap_ssid: "PurifierNode-AP".to_string(),
            ap_password: "PurifierSetup".to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub device_id: String,
    pub mqtt: MqttConfig,
    pub telemetry_period_secs: u64,
    /// Consecutive failed association attempts tolerated before falling back
    /// to provisioning mode.
    pub max_retry: u32,
    /// One bound for every association handshake, first boot included.
    pub assoc_timeout_ms: u64,
    pub provisioning: ProvisioningConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            mqtt: MqttConfig::default(),
            telemetry_period_secs: DEFAULT_TELEMETRY_PERIOD_SECS,
            max_retry: DEFAULT_MAX_RETRY,
            assoc_timeout_ms: DEFAULT_ASSOC_TIMEOUT_MS,
            provisioning: ProvisioningConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = env::var("PURIFIER_DEVICE_ID") {
            if !value.is_empty() {
                config.mqtt.client_id = format!("purifier-{value}");
                config.device_id = value;
            }
        }
        if let Ok(value) = env::var("MQTT_HOST") {
            if !value.is_empty() {
                config.mqtt.host = value;
            }
        }
        if let Ok(value) = env::var("MQTT_PORT") {
            if let Ok(port) = value.parse::<u16>() {
                config.mqtt.port = port;
            }
        }
        if let Ok(value) = env::var("MQTT_USER") {
            if !value.is_empty() {
                config.mqtt.username = Some(value);
                config.mqtt.password = env::var("MQTT_PASS").ok();
            }
        }
        if let Ok(value) = env::var("TELEMETRY_PERIOD_SECS") {
            if let Ok(secs) = value.parse::<u64>() {
                if secs > 0 {
                    config.telemetry_period_secs = secs;
                }
            }
        }
        if let Ok(value) = env::var("PROVISIONING_HTTP_PORT") {
            if let Ok(port) = value.parse::<u16>() {
                config.provisioning.http_port = port;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_the_shipped_profile() {
        let config = NodeConfig::default();

        assert_eq!(config.device_id, "device_esp32_001");
        assert_eq!(config.telemetry_period_secs, 120);
        assert_eq!(config.max_retry, 5);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.provisioning.http_port, 8080);
    }
}
