use std::collections::HashMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::api::collection::EntityCollection;
use crate::api::credentials::Credentials;
use crate::api::entity::{Entity, EntityId, EntityRecord, FieldMap};
use crate::api::message::{InputPackage, OutputMessage};
use crate::server::bots::BotManager;
use crate::server::context::PlayerContext;
use crate::server::effects::{EffectQueue, EffectSettings};
use crate::server::game::{Game, GameConfig};
use crate::server::input::InputRouter;
use crate::server::physics::PhysicsBridge;
use crate::server::protocol::SessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Active,
    /// Last player left; the room closes once the grace period elapses
    /// without a new join.
    Draining,
    Closed,
}

/// A connected human. The owned entity is despawned on leave unless the
/// game's leave hook rehomes it first.
pub struct Player {
    pub id: u64,
    pub display_name: String,
    pub credentials: Credentials,
    pub entity: Option<EntityId>,
}

/// Best-effort handoff state emitted when a room closes. Serializable so an
/// embedder can ship it to the process adopting the session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Checkpoint {
    pub game: String,
    pub room: String,
    pub tick: u64,
    pub state: FieldMap,
    pub entities: Vec<(String, EntityRecord)>,
}

/// One authoritative game session. All mutation happens on the owning room
/// thread; hooks get `&mut Room` and never need locks.
pub struct Room {
    game: Arc<dyn Game>,
    game_type: &'static str,
    id: String,
    config: GameConfig,
    lifecycle: Lifecycle,
    tick_count: u64,
    entities: EntityCollection,
    state: FieldMap,
    players: HashMap<u64, Player>,
    player_order: Vec<u64>,
    spectators: HashMap<u64, Player>,
    inputs: InputRouter,
    bots: BotManager,
    effects: EffectQueue,
    physics: Option<PhysicsBridge>,
    sessions: Arc<SessionManager>,
    next_entity_id: EntityId,
    game_over_fired: bool,
}

impl Room {
    pub fn new(
        game_type: &'static str,
        id: String,
        game: Arc<dyn Game>,
        sessions: Arc<SessionManager>,
        effect_settings: EffectSettings,
    ) -> Self {
        let config = game.config();
        let bots = BotManager::new(game.bots());
        Self {
            game,
            game_type,
            id,
            config,
            lifecycle: Lifecycle::Created,
            tick_count: 0,
            entities: EntityCollection::new(),
            state: FieldMap::new(),
            players: HashMap::new(),
            player_order: Vec::new(),
            spectators: HashMap::new(),
            inputs: InputRouter::default(),
            bots,
            effects: EffectQueue::new(effect_settings),
            physics: None,
            sessions,
            next_entity_id: 0,
            game_over_fired: false,
        }
    }

    /// Runs the creation hook and the initial bot fill. Call once, before
    /// any join is admitted.
    pub fn start(&mut self) {
        let game = Arc::clone(&self.game);
        self.isolate("on_create", |room| game.on_create(room));
        self.fill_bots();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn game_type(&self) -> &'static str {
        self.game_type
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn entities(&self) -> &EntityCollection {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityCollection {
        &mut self.entities
    }

    /// Opaque key-value bag for game logic. Mutated only by hooks, so no
    /// locking under the cooperative model.
    pub fn state(&self) -> &FieldMap {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut FieldMap {
        &mut self.state
    }

    pub fn effects(&self) -> &EffectQueue {
        &self.effects
    }

    pub fn set_physics(&mut self, bridge: PhysicsBridge) {
        self.physics = Some(bridge);
    }

    pub fn physics(&self) -> Option<&PhysicsBridge> {
        self.physics.as_ref()
    }

    pub fn physics_mut(&mut self) -> Option<&mut PhysicsBridge> {
        self.physics.as_mut()
    }

    pub fn player(&self, id: u64) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.player_order.iter().filter_map(|id| self.players.get(id))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    pub fn is_spectator(&self, id: u64) -> bool {
        self.spectators.contains_key(&id)
    }

    pub fn bot_count(&self) -> usize {
        self.bots.count()
    }

    pub fn bot_entities(&self) -> Vec<EntityId> {
        self.bots.bots().map(|bot| bot.entity).collect()
    }

    pub fn set_player_entity(&mut self, player: u64, entity: Option<EntityId>) {
        if let Some(player) = self.players.get_mut(&player) {
            player.entity = entity;
        }
    }

    /// Assigns an id and inserts. Re-spawning an entity that is already in
    /// the world is a no-op returning its id.
    pub fn spawn_entity(&mut self, mut entity: Box<dyn Entity>) -> EntityId {
        let preset = entity.id();
        if preset != 0 && self.entities.contains(preset) {
            return preset;
        }
        let id = if preset != 0 {
            preset
        } else {
            self.next_entity_id += 1;
            self.next_entity_id
        };
        if id > self.next_entity_id {
            self.next_entity_id = id;
        }
        entity.meta_mut().id = id;
        self.entities.insert(entity);
        id
    }

    /// Removes the entity, its physics body, its bot record and any player
    /// ownership. Repeating the call for the same id is a no-op.
    pub fn despawn_entity(&mut self, id: EntityId) -> bool {
        if self.entities.remove(id).is_none() {
            return false;
        }
        if let Some(bridge) = self.physics.as_mut() {
            bridge.remove_entity(id);
        }
        self.bots.remove_by_entity(id);
        for player in self.players.values_mut() {
            if player.entity == Some(id) {
                player.entity = None;
            }
        }
        true
    }

    /// Delivers an input through the standard path: the owning entity's
    /// `on_input` first, then the game hook. Both are panic-isolated.
    fn apply_input(&mut self, player: u64, package: &InputPackage) {
        if self.config.debug {
            log::debug!(
                "room {}: applying input seq {} from {player}",
                self.id,
                package.seq
            );
        }
        let game = Arc::clone(&self.game);
        if let Some(entity_id) = self.players.get(&player).and_then(|p| p.entity) {
            self.isolate("entity on_input", |room| {
                if let Some(entity) = room.entities.get_mut(entity_id) {
                    entity.on_input(&package.data);
                }
            });
        }
        self.isolate("on_input", |room| {
            game.on_input(room, player, &package.data);
        });
    }

    /// Input path for behaviors: bots are pseudo-players, so their inputs
    /// travel through the same entity-then-game order.
    pub fn send_bot_input(&mut self, entity: EntityId, data: serde_json::Value) {
        let Some(bot_id) = self.bots.by_entity(entity).map(|handle| handle.id) else {
            return;
        };
        let game = Arc::clone(&self.game);
        self.isolate("entity on_input", |room| {
            if let Some(entity) = room.entities.get_mut(entity) {
                entity.on_input(&data);
            }
        });
        self.isolate("on_input", |room| {
            game.on_input(room, bot_id, &data);
        });
    }

    /// Hands the turn to the bot owning `entity` (event-driven games).
    pub fn bot_turn(&mut self, entity: EntityId) -> bool {
        let Some((behavior, handle)) = self.bots.turn(entity) else {
            return false;
        };
        self.isolate("on_my_turn", |room| behavior.on_my_turn(&handle, room));
        true
    }

    /// Queues an input for the next tick. Spectators never contribute.
    pub fn queue_input(&mut self, player: u64, package: InputPackage) -> bool {
        if self.is_spectator(player) {
            log::debug!("room {}: dropping input from spectator {player}", self.id);
            return false;
        }
        self.inputs.enqueue(player, package)
    }

    /// One tick of the authoritative simulation: drain inputs, run the tick
    /// hook, step bots and physics, broadcast, count.
    pub fn run_tick(&mut self, delta: f64) {
        let game = Arc::clone(&self.game);

        let order = self.player_order.clone();
        for (player, package) in self.inputs.drain_round_robin(&order) {
            self.apply_input(player, &package);
        }

        self.isolate("on_tick", |room| game.on_tick(room, delta));

        for (behavior, handle, interval) in self.bots.advance(delta) {
            self.isolate("think", |room| behavior.think(&handle, room, interval));
        }

        if let Some(mut bridge) = self.physics.take() {
            bridge.step(&mut self.entities, delta);
            self.physics = Some(bridge);
        }

        self.broadcast_snapshot();
        self.tick_count += 1;
    }

    /// Event-driven path: validate, deliver, broadcast, all synchronously.
    pub fn process_event_input(&mut self, player: u64, package: InputPackage) {
        if self.is_spectator(player) {
            return;
        }
        let Some(package) = self.inputs.accept(player, package) else {
            return;
        };
        self.apply_input(player, &package);
        self.broadcast_snapshot();
        self.tick_count += 1;
    }

    pub fn handle_join(&mut self, context: Arc<PlayerContext>, correlation_id: &str) {
        let id = context.id();
        if self.players.contains_key(&id) || self.spectators.contains_key(&id) {
            let entity = self.players.get(&id).and_then(|p| p.entity);
            self.send_welcome(id, correlation_id, self.is_spectator(id), entity);
            return;
        }

        let game = Arc::clone(&self.game);
        let spectator = game.spectators().classify(
            context.spectate_requested(),
            context.zone(),
            self.players.len(),
            self.config.max_players,
        );

        if !spectator && self.players.len() >= self.config.max_players {
            log::info!("room {}: rejecting {id}, room is full", self.id);
            self.sessions.send(
                id,
                OutputMessage::Welcome {
                    correlation_id: correlation_id.to_string(),
                    success: false,
                    game: self.game_type.to_string(),
                    room: self.id.clone(),
                    spectator: false,
                    entity: None,
                    reason: Some("room is full".to_string()),
                    retryable: true,
                },
            );
            return;
        }

        let player = Player {
            id,
            display_name: context.display_name().to_string(),
            credentials: context.credentials().clone(),
            entity: None,
        };

        if spectator {
            self.spectators.insert(id, player);
            // a watcher keeps the room alive: cancel any drain in progress
            self.lifecycle = Lifecycle::Active;
            self.isolate("on_spectator_join", |room| game.on_spectator_join(room, id));
            self.send_welcome(id, correlation_id, true, None);
            self.send_snapshot_to(id, 0);
            return;
        }

        self.players.insert(id, player);
        self.player_order.push(id);
        self.lifecycle = Lifecycle::Active;

        self.isolate("on_player_join", |room| game.on_player_join(room, id));

        if self.bots.despawn_on_join() {
            while self.players.len() + self.bots.count() > self.bots.fill_to()
                && self.bots.count() > 0
            {
                if let Some(bot) = self.bots.despawn_one() {
                    log::debug!("room {}: bot {} yields its slot", self.id, bot.name);
                    self.despawn_entity(bot.entity);
                }
            }
        }
        self.fill_bots();

        let entity = self.players.get(&id).and_then(|p| p.entity);
        self.send_welcome(id, correlation_id, false, entity);
        self.broadcast(OutputMessage::PlayerJoined {
            room: self.id.clone(),
            player: id,
            display_name: context.display_name().to_string(),
        });
        self.send_snapshot_to(id, 0);
    }

    pub fn handle_leave(&mut self, player: u64) {
        if self.spectators.remove(&player).is_some() {
            self.drain_if_empty();
            return;
        }
        if !self.players.contains_key(&player) {
            return;
        }

        let game = Arc::clone(&self.game);
        self.isolate("on_player_leave", |room| game.on_player_leave(room, player));

        if let Some(entity) = self.players.get(&player).and_then(|p| p.entity) {
            self.despawn_entity(entity);
        }
        self.players.remove(&player);
        self.player_order.retain(|id| *id != player);
        self.inputs.remove_player(player);

        self.broadcast(OutputMessage::PlayerLeft {
            room: self.id.clone(),
            player,
        });

        self.fill_bots();
        self.drain_if_empty();
    }

    fn drain_if_empty(&mut self) {
        if self.players.is_empty() && self.spectators.is_empty() {
            self.lifecycle = Lifecycle::Draining;
            log::info!("room {}: empty, draining", self.id);
        }
    }

    /// Transition into the closed state: game-over hook, wire event, effect
    /// flush. Runs at most once.
    pub fn close(&mut self) {
        if self.game_over_fired {
            return;
        }
        self.game_over_fired = true;

        let game = Arc::clone(&self.game);
        self.isolate("on_game_over", |room| game.on_game_over(room));

        self.broadcast(OutputMessage::GameOver {
            room: self.id.clone(),
        });
        self.effects.flush();
        self.lifecycle = Lifecycle::Closed;
        log::info!("room {}: closed at tick {}", self.id, self.tick_count);
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            game: self.game_type.to_string(),
            room: self.id.clone(),
            tick: self.tick_count,
            state: self.state.clone(),
            entities: self
                .entities
                .all()
                .map(|entity| (entity.kind().to_string(), entity.snapshot()))
                .collect(),
        }
    }

    /// Seeds a fresh room from a handed-off checkpoint. Entities the game
    /// cannot restore are skipped with a warning.
    pub fn restore_from(&mut self, checkpoint: &Checkpoint) {
        let game = Arc::clone(&self.game);
        self.tick_count = checkpoint.tick;
        self.state = checkpoint.state.clone();
        for (kind, record) in &checkpoint.entities {
            match game.restore_entity(kind, record) {
                Some(mut entity) => {
                    entity.meta_mut().id = record.id;
                    entity.apply_snapshot(record);
                    self.spawn_entity(entity);
                }
                None => {
                    log::warn!(
                        "room {}: game cannot restore entity kind `{kind}`",
                        self.id
                    );
                }
            }
        }
    }

    pub fn broadcast_snapshot(&self) {
        let records: Vec<EntityRecord> = self.entities.all().map(|e| e.snapshot()).collect();
        let timestamp = now_ms();

        for &id in self.players.keys() {
            self.send_snapshot(id, &records, timestamp, self.inputs.last_applied(id));
        }
        for &id in self.spectators.keys() {
            self.send_snapshot(id, &records, timestamp, 0);
        }
    }

    fn send_snapshot_to(&self, id: u64, last_seq: u64) {
        let records: Vec<EntityRecord> = self.entities.all().map(|e| e.snapshot()).collect();
        self.send_snapshot(id, &records, now_ms(), last_seq);
    }

    fn send_snapshot(&self, id: u64, records: &[EntityRecord], timestamp: u64, last_seq: u64) {
        self.sessions.send(
            id,
            OutputMessage::Snapshot {
                game: self.game_type.to_string(),
                room: self.id.clone(),
                tick: self.tick_count,
                timestamp,
                entities: records.to_vec(),
                last_seq,
            },
        );
    }

    fn send_welcome(&self, id: u64, correlation_id: &str, spectator: bool, entity: Option<EntityId>) {
        self.sessions.send(
            id,
            OutputMessage::Welcome {
                correlation_id: correlation_id.to_string(),
                success: true,
                game: self.game_type.to_string(),
                room: self.id.clone(),
                spectator,
                entity,
                reason: None,
                retryable: false,
            },
        );
    }

    fn broadcast(&self, message: OutputMessage) {
        self.sessions.send_all(
            self.players.keys().chain(self.spectators.keys()),
            message,
        );
    }

    fn fill_bots(&mut self) {
        let game = Arc::clone(&self.game);
        let humans = self.players.len();
        let mut bots = mem::take(&mut self.bots);
        bots.fill(humans, |name| {
            let id = game.spawn_bot(self, name)?;
            if let Some(entity) = self.entities.get_mut(id) {
                entity.meta_mut().bot = true;
            }
            Some(id)
        });
        self.bots = bots;
    }

    /// Game logic exceptions are logged with the room id and contained; the
    /// room, and the process, carry on.
    fn isolate(&mut self, hook: &str, f: impl FnOnce(&mut Room)) {
        let room_id = self.id.clone();
        if panic::catch_unwind(AssertUnwindSafe(|| f(self))).is_err() {
            log::error!("room {room_id}: {hook} hook panicked, isolating");
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
