use std::collections::HashMap;
use std::sync::Arc;

use crate::api::message::{InputMessage, OutputMessage};
use crate::api::schema::{Deserialize, Schema, SchemaCodec, Serialize};
use crate::server::error::EmbersServerError;
use crate::server::game::Game;
use crate::server::protocol::{NetworkProtocol, SessionManager};
use crate::server::runtime::{GameRuntimeAnyHandle, GameRuntimeHandle, RoomRuntime, Settings};

pub mod bots;
pub mod context;
pub mod effects;
pub mod error;
pub mod game;
pub mod input;
pub mod physics;
pub mod protocol;
pub mod room;
pub mod runtime;
pub mod spectator;

pub type ServerResult = Result<(), EmbersServerError>;

/// The authoritative server: one transport, one wire schema, any number of
/// registered games. Rooms materialize when the first credentialed handshake
/// for their key arrives.
pub struct EmbersServer<N, S>
where
    N: NetworkProtocol,
    S: Schema,
{
    protocol: N,
    _schema: S,
    handlers: HashMap<&'static str, Box<dyn GameRuntimeAnyHandle>>,
    session_manager: Arc<SessionManager>,
}

impl<N, S> EmbersServer<N, S>
where
    N: NetworkProtocol,
    S: Schema,
    InputMessage: Serialize<S> + Deserialize<S>,
    OutputMessage: Serialize<S> + Deserialize<S>,
{
    pub fn new(protocol: N, schema: S) -> Self {
        Self {
            protocol,
            _schema: schema,
            handlers: Default::default(),
            session_manager: Arc::new(SessionManager::new(SchemaCodec::<S>::shared())),
        }
    }

    pub fn register<R>(mut self, game_type: &'static str, game: impl Game, settings: Settings) -> Self
    where
        R: RoomRuntime + Send + Sync + 'static,
    {
        self.handlers.insert(
            game_type,
            Box::new(GameRuntimeHandle::<R>::new(
                game_type,
                Arc::new(game),
                settings,
                Arc::clone(&self.session_manager),
            )),
        );
        self
    }

    pub async fn run(self) -> ServerResult {
        let Self {
            protocol,
            handlers,
            session_manager,
            ..
        } = self;
        let handlers: &'static HashMap<&'static str, Box<dyn GameRuntimeAnyHandle>> =
            Box::leak(Box::new(handlers));

        protocol.run(session_manager, handlers).await
    }
}
