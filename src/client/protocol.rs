use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::api::entity::EntityId;
use crate::api::schema::Codec;
use crate::client::error::EmbersClientError;
use crate::client::reply::ReplyManager;
use crate::client::room::ActiveRooms;

#[cfg(feature = "ws")]
pub mod ws;

/// What a successful handshake resolved to.
#[derive(Debug, Clone)]
pub struct JoinInfo {
    pub game: String,
    pub room: String,
    pub spectator: bool,
    pub entity: Option<EntityId>,
}

#[derive(Debug)]
pub enum OutboundAction {
    Raw(Vec<u8>),
    Stop,
}

pub struct ClientProtocolHandle {
    pub(crate) action_tx: UnboundedSender<OutboundAction>,
    pub(crate) reply_manager: Arc<ReplyManager<JoinInfo, EmbersClientError>>,
}

pub trait ClientProtocol {
    fn run(
        self,
        rooms: Arc<ActiveRooms>,
        codec: Arc<dyn Codec>,
    ) -> impl Future<Output = Result<ClientProtocolHandle, EmbersClientError>>;
}
