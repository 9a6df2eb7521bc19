use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Bytes, Message, client::IntoClientRequest},
};

use crate::api::message::OutputMessage;
use crate::api::schema::{Codec, SchemaType};
use crate::client::error::EmbersClientError;
use crate::client::protocol::{ClientProtocol, ClientProtocolHandle, JoinInfo, OutboundAction};
use crate::client::reply::ReplyManager;
use crate::client::room::ActiveRooms;

pub struct WebSocketClientProtocol {
    pub addr: String,
    pub port: u16,
}

impl WebSocketClientProtocol {
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
        }
    }
}

impl ClientProtocol for WebSocketClientProtocol {
    async fn run(
        self,
        rooms: Arc<ActiveRooms>,
        codec: Arc<dyn Codec>,
    ) -> Result<ClientProtocolHandle, EmbersClientError> {
        let request = format!("ws://{}:{}", self.addr, self.port)
            .into_client_request()
            .map_err(|_| EmbersClientError::ConnectionFailure)?;
        let (stream, _) = connect_async(request)
            .await
            .map_err(|_| EmbersClientError::ConnectionFailure)?;

        let (action_tx, mut action_rx) =
            tokio::sync::mpsc::unbounded_channel::<OutboundAction>();
        let (mut ws_writer, mut ws_reader) = stream.split();
        let reply_manager = Arc::new(ReplyManager::<JoinInfo, EmbersClientError>::new());

        tokio::spawn({
            let reply_manager = Arc::clone(&reply_manager);
            async move {
                let mut vacuum_interval = tokio::time::interval(Duration::from_secs(10));
                loop {
                    tokio::select! {
                        _ = vacuum_interval.tick() => {
                            reply_manager.vacuum();
                        },
                        action = action_rx.recv() => {
                            match action {
                                Some(OutboundAction::Raw(data)) => {
                                    let Some(frame) = into_frame(data, codec.schema_type()) else {
                                        continue;
                                    };
                                    if ws_writer.send(frame).await.is_err() {
                                        break;
                                    }
                                }
                                Some(OutboundAction::Stop) | None => break,
                            }
                        },
                        frame = ws_reader.next() => {
                            let Some(Ok(frame)) = frame else {
                                log::info!("server connection closed");
                                break;
                            };
                            let raw = frame_bytes(frame);
                            if raw.is_empty() {
                                continue;
                            }
                            match codec.decode_output(&raw) {
                                Ok(message) => route(message, &rooms, &reply_manager),
                                Err(_) => log::error!("ignored an undecodable message"),
                            }
                        },
                    }
                }
            }
        });

        Ok(ClientProtocolHandle {
            action_tx,
            reply_manager,
        })
    }
}

fn route(
    message: OutputMessage,
    rooms: &ActiveRooms,
    reply_manager: &ReplyManager<JoinInfo, EmbersClientError>,
) {
    match message {
        OutputMessage::Welcome {
            correlation_id,
            success,
            game,
            room,
            spectator,
            entity,
            reason,
            ..
        } => {
            if success {
                reply_manager.ok(
                    &correlation_id,
                    JoinInfo {
                        game,
                        room,
                        spectator,
                        entity,
                    },
                );
            } else {
                reply_manager.error(&correlation_id, EmbersClientError::JoinRejected(reason));
            }
        }
        OutputMessage::Snapshot {
            game,
            room,
            tick,
            timestamp,
            entities,
            last_seq,
        } => {
            let routed = rooms.visit_mut(&game, &room, |client_room| {
                client_room.on_snapshot(tick, timestamp, entities, last_seq);
            });
            if routed.is_err() {
                log::trace!("snapshot for unjoined room {game}/{room}");
            }
        }
        OutputMessage::PlayerJoined {
            room,
            player,
            display_name,
        } => {
            rooms.for_room_id_mut(&room, |client_room| {
                client_room.on_player_joined(player, display_name.clone());
            });
        }
        OutputMessage::PlayerLeft { room, player } => {
            rooms.for_room_id_mut(&room, |client_room| client_room.on_player_left(player));
        }
        OutputMessage::GameOver { room } => {
            rooms.for_room_id_mut(&room, |client_room| client_room.on_game_over());
        }
        OutputMessage::Error {
            description,
            retryable,
        } => {
            log::error!("server error (retryable: {retryable}): {description}");
        }
    }
}

fn frame_bytes(message: Message) -> Vec<u8> {
    match message {
        Message::Binary(bytes) => bytes.into(),
        Message::Text(bytes) => Bytes::from(bytes).into(),
        _ => vec![],
    }
}

fn into_frame(raw: Vec<u8>, schema_type: SchemaType) -> Option<Message> {
    match schema_type {
        SchemaType::Text => tokio_tungstenite::tungstenite::Utf8Bytes::try_from(raw)
            .ok()
            .map(Message::Text),
        SchemaType::Binary => Some(Message::Binary(raw.into())),
    }
}
