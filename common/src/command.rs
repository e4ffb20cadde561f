use serde::Deserialize;
use thiserror::Error;

use crate::state::{StateError, StateStore, MAX_FAN_SPEED};
use crate::store::{KvStore, StoreError};
use crate::types::{AckStatus, Acknowledgment};

pub const MAX_COMMAND_ID_BYTES: usize = 64;

const UNKNOWN_COMMAND_ID: &str = "unknown";
const MSG_PARSE_ERROR: &str = "Parse error";
const MSG_EXECUTION_FAILED: &str = "Execution Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    SetFanSpeed { fan_speed: i64 },
    PowerOn,
    PowerOff,
}

/// A validated inbound command. Only `parse` produces these; a payload that
/// fails parsing yields no partial command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command_id: String,
    pub command_type: CommandType,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload is not a valid command object: {0}")]
    Malformed(String),
    #[error("unrecognized commandType `{0}`")]
    UnknownType(String),
    #[error("SET_FAN_SPEED payload is missing an integer fanSpeed")]
    MissingFanSpeed,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("fan speed out of range 0..={MAX_FAN_SPEED}")]
    InvalidArgument,
    #[error("device state could not be persisted: {0}")]
    PersistenceFailed(StoreError),
}

impl From<StateError> for ExecutionError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::InvalidArgument => Self::InvalidArgument,
            StateError::Persistence(inner) => Self::PersistenceFailed(inner),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommandEnvelope {
    #[serde(rename = "commandId")]
    command_id: String,
    #[serde(rename = "commandType")]
    command_type: String,
    #[serde(default)]
    payload: Option<CommandPayload>,
}

#[derive(Debug, Deserialize)]
struct CommandPayload {
    #[serde(rename = "fanSpeed")]
    fan_speed: Option<i64>,
}

pub fn parse(payload: &[u8]) -> Result<Command, ParseError> {
    let envelope: CommandEnvelope =
        serde_json::from_slice(payload).map_err(|err| ParseError::Malformed(err.to_string()))?;

    let command_type = match envelope.command_type.as_str() {
        "SET_FAN_SPEED" => {
            let fan_speed = envelope
                .payload
                .and_then(|payload| payload.fan_speed)
                .ok_or(ParseError::MissingFanSpeed)?;
            CommandType::SetFanSpeed { fan_speed }
        }
        "POWER_ON" => CommandType::PowerOn,
        "POWER_OFF" => CommandType::PowerOff,
        other => return Err(ParseError::UnknownType(other.to_string())),
    };

    Ok(Command {
        command_id: truncate_command_id(envelope.command_id),
        command_type,
    })
}

pub fn execute<S: KvStore>(
    store: &mut StateStore<S>,
    command: &Command,
) -> Result<(), ExecutionError> {
    match command.command_type {
        CommandType::SetFanSpeed { fan_speed } => {
            // A structurally numeric but out-of-range value fails here, not in parse.
            let speed = u8::try_from(fan_speed)
                .ok()
                .filter(|speed| *speed <= MAX_FAN_SPEED)
                .ok_or(ExecutionError::InvalidArgument)?;
            store.set_fan_speed(speed)?;
            Ok(())
        }
        CommandType::PowerOn => {
            store.set_power(true)?;
            Ok(())
        }
        CommandType::PowerOff => {
            store.set_power(false)?;
            Ok(())
        }
    }
}

pub fn build_ack(command_id: Option<&str>, success: bool, message: Option<&str>) -> Acknowledgment {
    Acknowledgment {
        command_id: command_id.unwrap_or(UNKNOWN_COMMAND_ID).to_string(),
        status: if success {
            AckStatus::Success
        } else {
            AckStatus::Failed
        },
        message: message.map(str::to_string),
    }
}

/// Total command pipeline: parse, execute, acknowledge. Every payload yields
/// exactly one acknowledgment regardless of outcome.
pub fn handle<S: KvStore>(store: &mut StateStore<S>, payload: &[u8]) -> Acknowledgment {
    let command = match parse(payload) {
        Ok(command) => command,
        Err(_) => return build_ack(None, false, Some(MSG_PARSE_ERROR)),
    };

    match execute(store, &command) {
        Ok(()) => build_ack(Some(&command.command_id), true, None),
        Err(_) => build_ack(Some(&command.command_id), false, Some(MSG_EXECUTION_FAILED)),
    }
}

fn truncate_command_id(mut id: String) -> String {
    if id.len() > MAX_COMMAND_ID_BYTES {
        let mut cut = MAX_COMMAND_ID_BYTES;
        while !id.is_char_boundary(cut) {
            cut -= 1;
        }
        id.truncate(cut);
    }
    id
}
