// Topic layout shared with the backend; all three channels hang off a
// stable device identifier.

pub const ROOT: &str = "devices";

pub fn telemetry_topic(device_id: &str) -> String {
    format!("{ROOT}/{device_id}/telemetry")
}

pub fn command_topic(device_id: &str) -> String {
    format!("{ROOT}/{device_id}/commands")
}

pub fn ack_topic(device_id: &str) -> String {
    format!("{ROOT}/{device_id}/ack")
}
