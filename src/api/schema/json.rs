use std::collections::HashMap;

use serde_json::Value;

use crate::api::{
    entity::EntityRecord,
    error::EmbersError,
    message::{InputMessage, InputPackage, OutputMessage},
    schema::{Schema, SchemaType, Serialize},
};

#[derive(Default)]
pub struct Json {}

impl Schema for Json {
    fn schema_type() -> SchemaType {
        SchemaType::Text
    }
}

const METHOD: &str = "method";
const CORRELATION_ID: &str = "correlation_id";

const HANDSHAKE: &str = "handshake";
const INPUT: &str = "input";
const LEAVE: &str = "leave";

const WELCOME: &str = "welcome";
const SNAPSHOT: &str = "snapshot";
const PLAYER_JOINED: &str = "player_joined";
const PLAYER_LEFT: &str = "player_left";
const GAME_OVER: &str = "game_over";
const ERROR: &str = "error";

const GAME: &str = "game";
const ROOM: &str = "room";
const CREDENTIALS: &str = "credentials";
const SEQ: &str = "seq";
const TIMESTAMP: &str = "timestamp";
const DATA: &str = "data";
const SUCCESS: &str = "success";
const SPECTATOR: &str = "spectator";
const ENTITY: &str = "entity";
const REASON: &str = "reason";
const RETRYABLE: &str = "retryable";
const TICK: &str = "tick";
const ENTITIES: &str = "entities";
const LAST_SEQ: &str = "last_seq";
const PLAYER: &str = "player";
const DISPLAY_NAME: &str = "display_name";
const DESCRIPTION: &str = "description";

fn str_field(json: &Value, key: &str) -> Result<String, EmbersError> {
    json.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(EmbersError::DeserializationFailure)
}

fn u64_field(json: &Value, key: &str) -> Result<u64, EmbersError> {
    json.get(key)
        .and_then(Value::as_u64)
        .ok_or(EmbersError::DeserializationFailure)
}

fn bool_field(json: &Value, key: &str) -> Result<bool, EmbersError> {
    json.get(key)
        .and_then(Value::as_bool)
        .ok_or(EmbersError::DeserializationFailure)
}

impl Serialize<Json> for InputMessage {
    fn serialize(self) -> Vec<u8> {
        match self {
            InputMessage::Handshake {
                correlation_id,
                game,
                credentials,
            } => serde_json::json!({
                METHOD: HANDSHAKE,
                CORRELATION_ID: correlation_id,
                GAME: game,
                CREDENTIALS: credentials,
            }),
            InputMessage::Input {
                game,
                room,
                package,
            } => serde_json::json!({
                METHOD: INPUT,
                GAME: game,
                ROOM: room,
                SEQ: package.seq,
                TIMESTAMP: package.timestamp,
                DATA: package.data,
            }),
            InputMessage::Leave { game, room } => serde_json::json!({
                METHOD: LEAVE,
                GAME: game,
                ROOM: room,
            }),
        }
        .to_string()
        .into_bytes()
    }
}

impl crate::api::schema::Deserialize<Json> for InputMessage {
    fn deserialize(buf: &[u8]) -> Result<Self, EmbersError> {
        let json: Value =
            serde_json::from_slice(buf).map_err(|_| EmbersError::DeserializationFailure)?;

        let method = json
            .get(METHOD)
            .and_then(Value::as_str)
            .ok_or(EmbersError::DeserializationFailure)?;

        match method {
            HANDSHAKE => {
                let raw = json
                    .get(CREDENTIALS)
                    .and_then(Value::as_object)
                    .ok_or(EmbersError::DeserializationFailure)?;
                let mut credentials = HashMap::with_capacity(raw.len());
                for (key, value) in raw {
                    let value = value
                        .as_str()
                        .ok_or(EmbersError::DeserializationFailure)?;
                    credentials.insert(key.clone(), value.to_string());
                }
                Ok(InputMessage::Handshake {
                    correlation_id: str_field(&json, CORRELATION_ID)?,
                    game: str_field(&json, GAME)?,
                    credentials,
                })
            }
            INPUT => Ok(InputMessage::Input {
                game: str_field(&json, GAME)?,
                room: str_field(&json, ROOM)?,
                package: InputPackage {
                    seq: u64_field(&json, SEQ)?,
                    timestamp: u64_field(&json, TIMESTAMP)?,
                    data: json.get(DATA).cloned().unwrap_or(Value::Null),
                },
            }),
            LEAVE => Ok(InputMessage::Leave {
                game: str_field(&json, GAME)?,
                room: str_field(&json, ROOM)?,
            }),
            _ => Err(EmbersError::UnknownMessage),
        }
    }
}

impl Serialize<Json> for OutputMessage {
    fn serialize(self) -> Vec<u8> {
        match self {
            OutputMessage::Welcome {
                correlation_id,
                success,
                game,
                room,
                spectator,
                entity,
                reason,
                retryable,
            } => {
                let mut node = serde_json::json!({
                    METHOD: WELCOME,
                    CORRELATION_ID: correlation_id,
                    SUCCESS: success,
                    GAME: game,
                    ROOM: room,
                    SPECTATOR: spectator,
                    RETRYABLE: retryable,
                });
                let object = node.as_object_mut().expect("Should always be a object");
                if let Some(entity) = entity {
                    object.insert(ENTITY.to_string(), Value::from(entity));
                }
                if let Some(reason) = reason {
                    object.insert(REASON.to_string(), Value::from(reason));
                }
                node
            }
            OutputMessage::Snapshot {
                game,
                room,
                tick,
                timestamp,
                entities,
                last_seq,
            } => {
                let records: Vec<Value> = entities.iter().map(EntityRecord::to_json).collect();
                serde_json::json!({
                    METHOD: SNAPSHOT,
                    GAME: game,
                    ROOM: room,
                    TICK: tick,
                    TIMESTAMP: timestamp,
                    ENTITIES: records,
                    LAST_SEQ: last_seq,
                })
            }
            OutputMessage::PlayerJoined {
                room,
                player,
                display_name,
            } => serde_json::json!({
                METHOD: PLAYER_JOINED,
                ROOM: room,
                PLAYER: player,
                DISPLAY_NAME: display_name,
            }),
            OutputMessage::PlayerLeft { room, player } => serde_json::json!({
                METHOD: PLAYER_LEFT,
                ROOM: room,
                PLAYER: player,
            }),
            OutputMessage::GameOver { room } => serde_json::json!({
                METHOD: GAME_OVER,
                ROOM: room,
            }),
            OutputMessage::Error {
                description,
                retryable,
            } => serde_json::json!({
                METHOD: ERROR,
                DESCRIPTION: description,
                RETRYABLE: retryable,
            }),
        }
        .to_string()
        .into_bytes()
    }
}

impl crate::api::schema::Deserialize<Json> for OutputMessage {
    fn deserialize(buf: &[u8]) -> Result<Self, EmbersError> {
        let json: Value =
            serde_json::from_slice(buf).map_err(|_| EmbersError::DeserializationFailure)?;

        let method = json
            .get(METHOD)
            .and_then(Value::as_str)
            .ok_or(EmbersError::DeserializationFailure)?;

        match method {
            WELCOME => Ok(OutputMessage::Welcome {
                correlation_id: str_field(&json, CORRELATION_ID)?,
                success: bool_field(&json, SUCCESS)?,
                game: str_field(&json, GAME)?,
                room: str_field(&json, ROOM)?,
                spectator: bool_field(&json, SPECTATOR)?,
                entity: json.get(ENTITY).and_then(Value::as_u64),
                reason: json
                    .get(REASON)
                    .and_then(Value::as_str)
                    .map(str::to_string),
                retryable: bool_field(&json, RETRYABLE)?,
            }),
            SNAPSHOT => {
                let raw = json
                    .get(ENTITIES)
                    .and_then(Value::as_array)
                    .ok_or(EmbersError::DeserializationFailure)?;
                let mut entities = Vec::with_capacity(raw.len());
                for record in raw {
                    entities.push(
                        EntityRecord::from_json(record)
                            .ok_or(EmbersError::DeserializationFailure)?,
                    );
                }
                Ok(OutputMessage::Snapshot {
                    game: str_field(&json, GAME)?,
                    room: str_field(&json, ROOM)?,
                    tick: u64_field(&json, TICK)?,
                    timestamp: u64_field(&json, TIMESTAMP)?,
                    entities,
                    last_seq: u64_field(&json, LAST_SEQ)?,
                })
            }
            PLAYER_JOINED => Ok(OutputMessage::PlayerJoined {
                room: str_field(&json, ROOM)?,
                player: u64_field(&json, PLAYER)?,
                display_name: str_field(&json, DISPLAY_NAME)?,
            }),
            PLAYER_LEFT => Ok(OutputMessage::PlayerLeft {
                room: str_field(&json, ROOM)?,
                player: u64_field(&json, PLAYER)?,
            }),
            GAME_OVER => Ok(OutputMessage::GameOver {
                room: str_field(&json, ROOM)?,
            }),
            ERROR => Ok(OutputMessage::Error {
                description: str_field(&json, DESCRIPTION)?,
                retryable: bool_field(&json, RETRYABLE)?,
            }),
            _ => Err(EmbersError::UnknownMessage),
        }
    }
}
