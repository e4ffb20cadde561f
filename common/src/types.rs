use serde::{Deserialize, Serialize};

/// Volatile sensor readings. Rebuilt from scratch on every boot; never
/// written to the durable store.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    pub temperature: f32,
    pub humidity: f32,
    pub pm1: f32,
    pub pm25: f32,
    pub pm10: f32,
    pub voc: f32,
    pub sound_level: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryPayload {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub temperature: f32,
    pub humidity: f32,
    pub pm1: f32,
    pub pm25: f32,
    pub pm10: f32,
    pub voc: f32,
    #[serde(rename = "soundLevel")]
    pub sound_level: f32,
    #[serde(rename = "wifiRssi")]
    pub wifi_rssi: i32,
}

impl TelemetryPayload {
    pub fn new(device_id: &str, sensors: &SensorSnapshot, wifi_rssi: i32) -> Self {
        Self {
            device_id: device_id.to_string(),
            temperature: sensors.temperature,
            humidity: sensors.humidity,
            pm1: sensors.pm1,
            pm25: sensors.pm25,
            pm10: sensors.pm10,
            voc: sensors.voc,
            sound_level: sensors.sound_level,
            wifi_rssi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Failed,
}

/// The single response produced for every inbound command message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgment {
    #[serde(rename = "commandId")]
    pub command_id: String,
    pub status: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn telemetry_wire_shape() {
        let sensors = SensorSnapshot {
            temperature: 24.5,
            humidity: 51.0,
            pm1: 12.0,
            pm25: 18.5,
            pm10: 22.0,
            voc: 9.0,
            sound_level: 38.0,
        };
        let payload = TelemetryPayload::new("device_esp32_001", &sensors, -62);

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "deviceId": "device_esp32_001",
                "temperature": 24.5,
                "humidity": 51.0,
                "pm1": 12.0,
                "pm25": 18.5,
                "pm10": 22.0,
                "voc": 9.0,
                "soundLevel": 38.0,
                "wifiRssi": -62,
            })
        );
    }

    #[test]
    fn ack_omits_message_on_success() {
        let ack = Acknowledgment {
            command_id: "c1".to_string(),
            status: AckStatus::Success,
            message: None,
        };

        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            json!({"commandId": "c1", "status": "success"})
        );
    }

    #[test]
    fn ack_carries_message_on_failure() {
        let ack = Acknowledgment {
            command_id: "c2".to_string(),
            status: AckStatus::Failed,
            message: Some("Execution Failed".to_string()),
        };

        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            json!({"commandId": "c2", "status": "failed", "message": "Execution Failed"})
        );
    }
}
