use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::message::{InputMessage, OutputMessage};
use crate::api::schema::Codec;
use crate::server::context::PlayerContext;
use crate::server::error::EmbersServerError;
use crate::server::runtime::GameRuntimeAnyHandle;
use crate::server::ServerResult;

#[cfg(feature = "ws")]
pub mod ws;

/// A transport. Implementations accept connections, require a handshake as
/// the first frame, then pump decoded messages through `process_message` and
/// outbound bytes from the session channel.
pub trait NetworkProtocol {
    fn run(
        self,
        session_manager: Arc<SessionManager>,
        handlers: &'static HashMap<&'static str, Box<dyn GameRuntimeAnyHandle>>,
    ) -> impl Future<Output = ServerResult>;
}

/// Validates the first frame of a connection. On success the caller owns the
/// player's outbound channel; the welcome itself is sent by the room once the
/// join hook has run.
pub fn handshake(
    raw_message: &[u8],
    session_manager: &SessionManager,
    handlers: &'static HashMap<&'static str, Box<dyn GameRuntimeAnyHandle>>,
) -> Result<(Arc<PlayerContext>, UnboundedReceiver<Vec<u8>>), EmbersServerError> {
    let message = session_manager
        .codec()
        .decode_input(raw_message)
        .map_err(|_| EmbersServerError::MessageNotHandshake)?;

    let InputMessage::Handshake {
        correlation_id,
        game,
        credentials,
    } = message
    else {
        return Err(EmbersServerError::MessageNotHandshake);
    };

    let context = Arc::new(PlayerContext::from_handshake(&credentials)?);
    let Some(handler) = handlers.get(game.as_str()) else {
        return Err(EmbersServerError::GameTypeNotFound);
    };

    let receiver = session_manager.connect(context.id());
    handler.handshake(Arc::clone(&context), correlation_id);
    Ok((context, receiver))
}

/// Routes one post-handshake frame. `Err` means a protocol violation; the
/// transport closes the connection.
pub fn process_message(
    raw_message: &[u8],
    player_context: &Arc<PlayerContext>,
    session_manager: &SessionManager,
    handlers: &'static HashMap<&'static str, Box<dyn GameRuntimeAnyHandle>>,
) -> Result<(), EmbersServerError> {
    let message = session_manager
        .codec()
        .decode_input(raw_message)
        .map_err(|_| EmbersServerError::Protocol)?;

    match message {
        InputMessage::Input {
            game,
            room,
            package,
        } => {
            if let Some(handler) = handlers.get(game.as_str()) {
                session_manager.subscribe(player_context.id(), game, room.clone());
                handler.input(player_context.id(), room, package);
            } else {
                session_manager.send(player_context.id(), EmbersServerError::GameTypeNotFound);
            }
            Ok(())
        }
        InputMessage::Leave { game, room } => {
            if let Some(handler) = handlers.get(game.as_str()) {
                handler.leave(player_context.id(), room);
            }
            Ok(())
        }
        InputMessage::Handshake { .. } => Err(EmbersServerError::Protocol),
    }
}

/// Tears down a connection: every room the player touched sees a leave.
pub fn disconnect(
    player_id: u64,
    session_manager: &SessionManager,
    handlers: &'static HashMap<&'static str, Box<dyn GameRuntimeAnyHandle>>,
) {
    if let Some(subscriptions) = session_manager.unsubscribe_all(player_id) {
        for (game, rooms) in subscriptions {
            if let Some(handler) = handlers.get(game.as_str()) {
                for room in rooms {
                    handler.leave(player_id, room);
                }
            }
        }
    }
}

/// Outbound channels and room subscriptions, keyed by player id. Rooms and
/// transports share one instance per server.
pub struct SessionManager {
    codec: Arc<dyn Codec>,
    sessions: RwLock<HashMap<u64, UnboundedSender<Vec<u8>>>>,
    subscriptions: RwLock<HashMap<u64, HashMap<String, Vec<String>>>>,
}

impl SessionManager {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            codec,
            sessions: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    pub fn connect(&self, player_id: u64) -> UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(player_id, tx);
        }
        if let Ok(mut subscriptions) = self.subscriptions.write() {
            subscriptions.entry(player_id).or_default();
        }
        rx
    }

    pub fn subscribe(&self, player_id: u64, game: String, room: String) {
        if let Ok(mut subscriptions) = self.subscriptions.write() {
            let rooms = subscriptions.entry(player_id).or_default().entry(game).or_default();
            if !rooms.contains(&room) {
                rooms.push(room);
            }
        }
    }

    pub fn unsubscribe_all(&self, player_id: u64) -> Option<HashMap<String, Vec<String>>> {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&player_id);
        }
        self.subscriptions
            .write()
            .expect("subscriptions lock poisoned")
            .remove(&player_id)
    }

    pub fn send(&self, player_id: u64, message: impl Into<OutputMessage>) {
        let raw = self.codec.encode_output(message.into());
        if let Ok(sessions) = self.sessions.read()
            && let Some(session) = sessions.get(&player_id)
        {
            let _ = session.send(raw);
        }
    }

    pub fn send_all<'a>(
        &self,
        player_ids: impl Iterator<Item = &'a u64>,
        message: impl Into<OutputMessage>,
    ) {
        let raw = self.codec.encode_output(message.into());
        if let Ok(sessions) = self.sessions.read() {
            for player_id in player_ids {
                if let Some(session) = sessions.get(player_id) {
                    let _ = session.send(raw.clone());
                }
            }
        }
    }
}
