use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, mpsc};
use std::time::Duration;

use crate::api::message::InputPackage;
use crate::server::context::PlayerContext;
use crate::server::effects::EffectSettings;
use crate::server::error::EmbersServerError;
use crate::server::game::Game;
use crate::server::protocol::SessionManager;
use crate::server::room::Checkpoint;

pub mod sync;

// One census across every game type: the resource cap is per process.
static ROOM_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Holds one slot in the process-wide room census for as long as the room
/// thread lives.
pub struct RoomGuard(());

impl RoomGuard {
    pub fn try_acquire(limit: usize) -> Option<Self> {
        let mut current = ROOM_COUNT.load(Ordering::SeqCst);
        loop {
            if current >= limit {
                return None;
            }
            match ROOM_COUNT.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(RoomGuard(())),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn active() -> usize {
        ROOM_COUNT.load(Ordering::SeqCst)
    }
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        ROOM_COUNT.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct Settings {
    /// How long an empty room lingers before closing. A join cancels the
    /// drain.
    pub drain_grace: Duration,
    /// Event-driven rooms wake at this cadence to check the drain clock.
    pub idle_poll: Duration,
    pub effects: EffectSettings,
    /// Receives the final checkpoint of every room that closes.
    pub on_checkpoint: Option<Arc<dyn Fn(Checkpoint) + Send + Sync>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            drain_grace: Duration::from_secs(30),
            idle_poll: Duration::from_millis(250),
            effects: EffectSettings::default(),
            on_checkpoint: None,
        }
    }
}

#[derive(Debug)]
pub enum RoomEvent {
    Join {
        context: Arc<PlayerContext>,
        correlation_id: String,
    },
    Leave {
        player: u64,
    },
    Input {
        player: u64,
        package: InputPackage,
    },
    Close,
}

/// Sender half of a room's event channel. Everything a room does is driven
/// through here, which is what serializes the world onto one thread.
pub struct RoomHandle {
    events: mpsc::Sender<RoomEvent>,
}

impl RoomHandle {
    pub fn new(events: mpsc::Sender<RoomEvent>) -> Self {
        Self { events }
    }

    pub fn event(&self, event: RoomEvent) {
        log::trace!("room event: {event:?}");
        if self.events.send(event).is_err() {
            log::warn!("room stopped, dropping event");
        }
    }
}

/// How rooms are executed. `sync::SyncRuntime` (a thread per room) is the
/// provided implementation; the seam exists so tests and embedders can drive
/// rooms differently.
pub trait RoomRuntime {
    fn spawn(
        game_type: &'static str,
        room_id: String,
        game: Arc<dyn Game>,
        settings: Arc<Settings>,
        sessions: Arc<SessionManager>,
        rooms: Arc<RwLock<HashMap<String, RoomHandle>>>,
        guard: RoomGuard,
    ) -> RoomHandle;
}

/// Object-safe face of a registered game, as the transport sees it.
pub trait GameRuntimeAnyHandle: Send + Sync {
    fn handshake(&self, context: Arc<PlayerContext>, correlation_id: String);
    fn input(&self, player: u64, room: String, package: InputPackage);
    fn leave(&self, player: u64, room: String);
    /// Shuts the room down without waiting for the drain grace: remaining
    /// occupants get the game-over broadcast.
    fn close_room(&self, room: String);
}

/// Per-game-type room registry: routes handshakes to the right room, creating
/// it on first arrival, and fans inputs/leaves out by room id.
pub struct GameRuntimeHandle<R>
where
    R: RoomRuntime,
{
    game_type: &'static str,
    game: Arc<dyn Game>,
    settings: Arc<Settings>,
    rooms: Arc<RwLock<HashMap<String, RoomHandle>>>,
    sessions: Arc<SessionManager>,
    _runtime: PhantomData<R>,
}

impl<R> GameRuntimeHandle<R>
where
    R: RoomRuntime,
{
    pub fn new(
        game_type: &'static str,
        game: Arc<dyn Game>,
        settings: Settings,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            game_type,
            game,
            settings: Arc::new(settings),
            rooms: Arc::new(RwLock::new(HashMap::new())),
            sessions,
            _runtime: PhantomData,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().map(|rooms| rooms.len()).unwrap_or(0)
    }
}

impl<R> GameRuntimeAnyHandle for GameRuntimeHandle<R>
where
    R: RoomRuntime + Send + Sync,
{
    fn handshake(&self, context: Arc<PlayerContext>, correlation_id: String) {
        let key = self.game.room_key(self.game_type, context.credentials());
        self.sessions
            .subscribe(context.id(), self.game_type.to_string(), key.clone());

        {
            let rooms = self.rooms.read().expect("rooms lock poisoned");
            if let Some(handle) = rooms.get(&key) {
                handle.event(RoomEvent::Join {
                    context,
                    correlation_id,
                });
                return;
            }
        }

        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        // a racing handshake may have created it meanwhile
        if !rooms.contains_key(&key) {
            let limit = self.game.config().max_rooms_per_process;
            let Some(guard) = RoomGuard::try_acquire(limit) else {
                log::warn!("room cap ({limit}) reached, rejecting {}", context.id());
                self.sessions
                    .send(context.id(), EmbersServerError::RoomLimitReached);
                return;
            };
            let handle = R::spawn(
                self.game_type,
                key.clone(),
                Arc::clone(&self.game),
                Arc::clone(&self.settings),
                Arc::clone(&self.sessions),
                Arc::clone(&self.rooms),
                guard,
            );
            rooms.insert(key.clone(), handle);
        }
        rooms[&key].event(RoomEvent::Join {
            context,
            correlation_id,
        });
    }

    fn input(&self, player: u64, room: String, package: InputPackage) {
        if let Ok(rooms) = self.rooms.read()
            && let Some(handle) = rooms.get(&room)
        {
            handle.event(RoomEvent::Input { player, package });
        }
    }

    fn leave(&self, player: u64, room: String) {
        if let Ok(rooms) = self.rooms.read()
            && let Some(handle) = rooms.get(&room)
        {
            handle.event(RoomEvent::Leave { player });
        }
    }

    fn close_room(&self, room: String) {
        if let Ok(rooms) = self.rooms.read()
            && let Some(handle) = rooms.get(&room)
        {
            handle.event(RoomEvent::Close);
        }
    }
}
