use crate::api::credentials::Credentials;
use crate::api::entity::{Entity, EntityId, EntityRecord};
use crate::server::bots::BotSettings;
use crate::server::room::Room;
use crate::server::spectator::SpectatorMode;

/// Immutable per-game configuration. A config is a value, not a handle: the
/// same config backs every room of the game concurrently.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Simulation rate in Hz. Zero selects the event-driven mode: no loop,
    /// each input is processed synchronously as it arrives.
    pub tick_rate: u32,
    pub max_players: usize,
    pub max_rooms_per_process: usize,
    /// Raises per-room log verbosity.
    pub debug: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            max_players: 10,
            max_rooms_per_process: 20,
            debug: false,
        }
    }
}

/// The hook bundle a game implements. Every hook is optional; the runtime
/// calls them on the room's own thread, so none of them may block on I/O —
/// slow work goes through `Room::effects`.
///
/// Panics out of a hook are caught, logged with the room id and isolated to
/// the offending room.
pub trait Game: Send + Sync + 'static {
    fn config(&self) -> GameConfig {
        GameConfig::default()
    }

    /// Runs once when the room is created, before the first join is admitted.
    fn on_create(&self, room: &mut Room) {
        let _ = room;
    }

    /// Tick-driven mode only. `delta` is always `1 / tick_rate` seconds; a
    /// late tick does not inflate it.
    fn on_tick(&self, room: &mut Room, delta: f64) {
        let _ = (room, delta);
    }

    fn on_player_join(&self, room: &mut Room, player: u64) {
        let _ = (room, player);
    }

    /// Runs before the player's entity is despawned; reassign or despawn the
    /// entity here to keep it in the world.
    fn on_player_leave(&self, room: &mut Room, player: u64) {
        let _ = (room, player);
    }

    fn on_spectator_join(&self, room: &mut Room, spectator: u64) {
        let _ = (room, spectator);
    }

    /// Runs exactly once, when the room transitions into its closed state.
    fn on_game_over(&self, room: &mut Room) {
        let _ = room;
    }

    /// Game-level input hook, invoked after the owning entity's `on_input`.
    fn on_input(&self, room: &mut Room, player: u64, input: &serde_json::Value) {
        let _ = (room, player, input);
    }

    /// Called by the bot manager for each slot it fills. Spawn and return the
    /// bot's entity; `None` leaves the slot empty.
    fn spawn_bot(&self, room: &mut Room, name: &str) -> Option<EntityId> {
        let _ = (room, name);
        None
    }

    /// Rebuilds an entity from a checkpoint record. Required only for games
    /// that adopt handed-off rooms.
    fn restore_entity(&self, kind: &str, record: &EntityRecord) -> Option<Box<dyn Entity>> {
        let _ = (kind, record);
        None
    }

    /// Room identity for a joining visitor. One room per scene drop by
    /// default; override with any pure function of the credentials.
    fn room_key(&self, game: &str, credentials: &Credentials) -> String {
        format!("{game}:{}", credentials.scene_drop_id)
    }

    fn spectators(&self) -> SpectatorMode {
        SpectatorMode::Manual
    }

    fn bots(&self) -> Option<BotSettings> {
        None
    }
}
