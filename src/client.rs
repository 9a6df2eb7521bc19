use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::api::entity::{EntityId, FieldMap};
use crate::api::message::{InputMessage, OutputMessage};
use crate::api::schema::{Codec, Deserialize, Schema, SchemaCodec, Serialize};
use crate::client::error::EmbersClientError;
use crate::client::protocol::{ClientProtocol, ClientProtocolHandle, OutboundAction};
use crate::client::reply::Reply;
use crate::client::room::{ActiveRooms, ClientRoom, ClientRoomConfig};

pub mod error;
pub mod input;
pub mod interp;
pub mod predict;
pub mod protocol;
pub mod reply;
pub mod room;

pub type ClientResult<T> = Result<T, EmbersClientError>;

pub struct EmbersClientBuilder<P, S>
where
    P: ClientProtocol,
    S: Schema,
{
    protocol: P,
    _schema: S,
}

impl<P, S> EmbersClientBuilder<P, S>
where
    P: ClientProtocol,
    S: Schema,
    InputMessage: Serialize<S> + Deserialize<S>,
    OutputMessage: Serialize<S> + Deserialize<S>,
{
    pub fn new(protocol: P, schema: S) -> Self {
        Self {
            protocol,
            _schema: schema,
        }
    }

    pub async fn build(self) -> ClientResult<EmbersClient> {
        let rooms = Arc::new(ActiveRooms::default());
        let codec = SchemaCodec::<S>::shared();
        let handle = self
            .protocol
            .run(Arc::clone(&rooms), Arc::clone(&codec))
            .await?;
        Ok(EmbersClient {
            rooms,
            handle,
            codec,
        })
    }
}

/// The player's end of the wire: performs the credentialed handshake, keeps
/// per-room interpolation/prediction state, and sequences outgoing inputs.
pub struct EmbersClient {
    rooms: Arc<ActiveRooms>,
    handle: ClientProtocolHandle,
    codec: Arc<dyn Codec>,
}

impl EmbersClient {
    /// Joins the room the server derives from these credentials. Resolves
    /// only after the server has admitted the join (the join hook has run).
    pub async fn join(
        &self,
        game: &str,
        credentials: HashMap<String, String>,
        config: ClientRoomConfig,
        timeout: Duration,
    ) -> ClientResult<(String, bool)> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let reply = self
            .handle
            .reply_manager
            .register(correlation_id.clone(), timeout);

        let raw = self.codec.encode_input(InputMessage::Handshake {
            correlation_id,
            game: game.to_string(),
            credentials,
        });
        self.handle
            .action_tx
            .send(OutboundAction::Raw(raw))
            .map_err(|_| EmbersClientError::NotRunning)?;

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(Reply::Ok(info))) => {
                self.rooms.insert(ClientRoom::new(
                    info.game,
                    info.room.clone(),
                    info.spectator,
                    info.entity,
                    config,
                ));
                Ok((info.room, info.spectator))
            }
            Ok(Ok(Reply::Err(err))) => Err(err),
            Ok(Ok(Reply::Timeout)) | Ok(Err(_)) | Err(_) => Err(EmbersClientError::NoResponse),
        }
    }

    /// Sequences an input, predicts it locally and ships it.
    pub fn input(&self, game: &str, room: &str, data: serde_json::Value) -> ClientResult<()> {
        let package = self
            .rooms
            .visit_mut(game, room, |client_room| client_room.send_input(data))?
            .ok_or(EmbersClientError::InputRejected)?;

        let raw = self.codec.encode_input(InputMessage::Input {
            game: game.to_string(),
            room: room.to_string(),
            package,
        });
        self.handle
            .action_tx
            .send(OutboundAction::Raw(raw))
            .map_err(|_| EmbersClientError::NotRunning)
    }

    pub fn leave(&self, game: &str, room: &str) -> ClientResult<()> {
        self.rooms.remove(game, room);
        let raw = self.codec.encode_input(InputMessage::Leave {
            game: game.to_string(),
            room: room.to_string(),
        });
        self.handle
            .action_tx
            .send(OutboundAction::Raw(raw))
            .map_err(|_| EmbersClientError::NotRunning)
    }

    /// The lag-hidden view of a room at `now` (milliseconds): everything
    /// interpolated in the past, the own entity predicted and smoothed.
    pub fn render(
        &self,
        game: &str,
        room: &str,
        now_ms: f64,
    ) -> ClientResult<HashMap<EntityId, FieldMap>> {
        self.rooms
            .visit_mut(game, room, |client_room| client_room.render(now_ms))
    }

    pub fn visit_room<R>(
        &self,
        game: &str,
        room: &str,
        f: impl FnOnce(&ClientRoom) -> R,
    ) -> ClientResult<R> {
        self.rooms.visit(game, room, f)
    }

    pub fn stop(&self) {
        let _ = self.handle.action_tx.send(OutboundAction::Stop);
    }
}
