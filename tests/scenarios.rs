//! Game-level scenarios driven through a `Room` without a transport.
#![cfg(feature = "server")]

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use embers::api::collection::EntityCollection;
use embers::api::entity::{Entity, EntityId, EntityMeta, Schematic};
use embers::api::fields::{FieldKind, FieldSet, Value};
use embers::api::message::InputPackage;
use embers::api::schema::SchemaCodec;
use embers::api::schema::json::Json;
use embers::server::context::PlayerContext;
use embers::server::bots::BotSettings;
use embers::server::effects::EffectSettings;
use embers::server::game::{Game, GameConfig};
use embers::server::protocol::SessionManager;
use embers::server::room::{Lifecycle, Room};

const GRID_SIZE: i32 = 10;

#[derive(Default)]
struct GridPlayer {
    meta: EntityMeta,
    grid_x: i32,
    grid_y: i32,
    score: i32,
}

impl Schematic for GridPlayer {
    fn field_set() -> &'static FieldSet {
        static FIELDS: LazyLock<FieldSet> = LazyLock::new(|| {
            FieldSet::builder()
                .field("gridX", FieldKind::Int32)
                .field("gridY", FieldKind::Int32)
                .field("score", FieldKind::Int32)
                .build()
        });
        &FIELDS
    }

    fn kind_name() -> &'static str {
        "grid_player"
    }

    fn fields(&self) -> &'static FieldSet {
        Self::field_set()
    }

    fn kind(&self) -> &'static str {
        Self::kind_name()
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "gridX" => Some(Value::I32(self.grid_x)),
            "gridY" => Some(Value::I32(self.grid_y)),
            "score" => Some(Value::I32(self.score)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> bool {
        match name {
            "gridX" => value.as_i32().map(|v| self.grid_x = v).is_some(),
            "gridY" => value.as_i32().map(|v| self.grid_y = v).is_some(),
            "score" => value.as_i32().map(|v| self.score = v).is_some(),
            _ => false,
        }
    }

    fn is_kind(&self, type_id: TypeId) -> bool {
        type_id == TypeId::of::<GridPlayer>()
    }
}

impl Entity for GridPlayer {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn on_input(&mut self, input: &serde_json::Value) {
        if input.get("action").and_then(|v| v.as_str()) != Some("move") {
            return;
        }
        let (dx, dy) = match input.get("direction").and_then(|v| v.as_str()) {
            Some("north") => (0, -1),
            Some("south") => (0, 1),
            Some("east") => (1, 0),
            Some("west") => (-1, 0),
            _ => return,
        };
        self.grid_x = (self.grid_x + dx).clamp(0, GRID_SIZE - 1);
        self.grid_y = (self.grid_y + dy).clamp(0, GRID_SIZE - 1);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct Gem {
    meta: EntityMeta,
    grid_x: i32,
    grid_y: i32,
    value: i32,
}

impl Schematic for Gem {
    fn field_set() -> &'static FieldSet {
        static FIELDS: LazyLock<FieldSet> = LazyLock::new(|| {
            FieldSet::builder()
                .field("gridX", FieldKind::Int32)
                .field("gridY", FieldKind::Int32)
                .field("value", FieldKind::Int32)
                .build()
        });
        &FIELDS
    }

    fn kind_name() -> &'static str {
        "gem"
    }

    fn fields(&self) -> &'static FieldSet {
        Self::field_set()
    }

    fn kind(&self) -> &'static str {
        Self::kind_name()
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "gridX" => Some(Value::I32(self.grid_x)),
            "gridY" => Some(Value::I32(self.grid_y)),
            "value" => Some(Value::I32(self.value)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> bool {
        match name {
            "gridX" => value.as_i32().map(|v| self.grid_x = v).is_some(),
            "gridY" => value.as_i32().map(|v| self.grid_y = v).is_some(),
            "value" => value.as_i32().map(|v| self.value = v).is_some(),
            _ => false,
        }
    }

    fn is_kind(&self, type_id: TypeId) -> bool {
        type_id == TypeId::of::<Gem>()
    }
}

impl Entity for Gem {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Event-driven gem chase on a 10×10 grid.
struct GemGame;

impl GemGame {
    const RESPAWN: (i32, i32) = (5, 5);
}

impl Game for GemGame {
    fn config(&self) -> GameConfig {
        GameConfig {
            tick_rate: 0,
            ..GameConfig::default()
        }
    }

    fn on_create(&self, room: &mut Room) {
        room.spawn_entity(Box::new(Gem {
            grid_x: 1,
            grid_y: 0,
            value: 5,
            ..Gem::default()
        }));
    }

    fn on_player_join(&self, room: &mut Room, player: u64) {
        let entity = room.spawn_entity(Box::new(GridPlayer::default()));
        room.set_player_entity(player, Some(entity));
    }

    fn on_input(&self, room: &mut Room, player: u64, _input: &serde_json::Value) {
        let Some(entity) = room.player(player).and_then(|p| p.entity) else {
            return;
        };
        let Some(mover) = room.entities().get_as::<GridPlayer>(entity) else {
            return;
        };
        let (px, py) = (mover.grid_x, mover.grid_y);

        let hit = room
            .entities()
            .of_type::<Gem>()
            .find(|gem| {
                let gem = gem.as_any().downcast_ref::<Gem>().unwrap();
                gem.grid_x == px && gem.grid_y == py
            })
            .map(|gem| gem.id());

        if let Some(gem_id) = hit {
            let value = room
                .entities()
                .get_as::<Gem>(gem_id)
                .map(|gem| gem.value)
                .unwrap_or(0);
            if let Some(player_entity) = room.entities_mut().get_as_mut::<GridPlayer>(entity) {
                player_entity.score += value;
            }
            if let Some(gem) = room.entities_mut().get_as_mut::<Gem>(gem_id) {
                gem.grid_x = Self::RESPAWN.0;
                gem.grid_y = Self::RESPAWN.1;
            }
        }
    }
}

fn context(id: i64) -> Arc<PlayerContext> {
    let query: HashMap<String, String> = [
        ("assetId".to_string(), "asset".to_string()),
        ("visitorId".to_string(), id.to_string()),
        ("urlSlug".to_string(), "slug".to_string()),
        ("interactiveNonce".to_string(), "nonce".to_string()),
        ("interactivePublicKey".to_string(), "key".to_string()),
        ("sceneDropId".to_string(), "drop".to_string()),
        ("identityId".to_string(), "ident".to_string()),
        ("profileId".to_string(), "profile".to_string()),
        ("uniqueName".to_string(), "unique".to_string()),
        ("username".to_string(), "user".to_string()),
        ("displayName".to_string(), "Player".to_string()),
    ]
    .into_iter()
    .collect();
    Arc::new(PlayerContext::from_handshake(&query).unwrap())
}

fn spectator_context(id: i64) -> Arc<PlayerContext> {
    let query: HashMap<String, String> = [
        ("assetId".to_string(), "asset".to_string()),
        ("visitorId".to_string(), id.to_string()),
        ("urlSlug".to_string(), "slug".to_string()),
        ("interactiveNonce".to_string(), "nonce".to_string()),
        ("interactivePublicKey".to_string(), "key".to_string()),
        ("sceneDropId".to_string(), "drop".to_string()),
        ("identityId".to_string(), "ident".to_string()),
        ("profileId".to_string(), "profile".to_string()),
        ("uniqueName".to_string(), "unique".to_string()),
        ("username".to_string(), "user".to_string()),
        ("displayName".to_string(), "Watcher".to_string()),
        ("spectate".to_string(), "true".to_string()),
    ]
    .into_iter()
    .collect();
    Arc::new(PlayerContext::from_handshake(&query).unwrap())
}

fn room_for(game: Arc<dyn Game>) -> Room {
    let sessions = Arc::new(SessionManager::new(SchemaCodec::<Json>::shared()));
    let mut room = Room::new(
        "scenario",
        "scenario:drop".to_string(),
        game,
        sessions,
        EffectSettings::default(),
    );
    room.start();
    room
}

fn move_input(seq: u64, direction: &str) -> InputPackage {
    InputPackage {
        seq,
        timestamp: seq,
        data: serde_json::json!({"action": "move", "direction": direction}),
    }
}

fn grid_player_of(room: &Room, player: u64) -> &GridPlayer {
    let entity = room.player(player).unwrap().entity.unwrap();
    room.entities().get_as::<GridPlayer>(entity).unwrap()
}

#[test]
fn moving_off_the_grid_is_clamped() {
    let mut room = room_for(Arc::new(GemGame));
    room.handle_join(context(1), "c-1");

    room.process_event_input(1, move_input(1, "west"));

    let mover = grid_player_of(&room, 1);
    assert_eq!(mover.grid_x, 0);
    assert_eq!(mover.grid_y, 0);
}

#[test]
fn walking_onto_a_gem_scores_and_respawns_it() {
    let mut room = room_for(Arc::new(GemGame));
    room.handle_join(context(1), "c-1");

    room.process_event_input(1, move_input(1, "east"));

    let mover = grid_player_of(&room, 1);
    assert_eq!((mover.grid_x, mover.grid_y), (1, 0));
    assert_eq!(mover.score, 5);

    let gem = room
        .entities()
        .of_type::<Gem>()
        .next()
        .and_then(|e| e.as_any().downcast_ref::<Gem>())
        .unwrap();
    assert_eq!((gem.grid_x, gem.grid_y), GemGame::RESPAWN);
}

#[test]
fn spectator_join_cancels_a_drain_in_progress() {
    let mut room = room_for(Arc::new(GemGame));

    room.handle_join(context(1), "c-1");
    room.handle_leave(1);
    assert_eq!(room.lifecycle(), Lifecycle::Draining);

    // a watcher arriving during the grace window keeps the room alive
    room.handle_join(spectator_context(2), "c-2");
    assert_eq!(room.spectator_count(), 1);
    assert_eq!(room.lifecycle(), Lifecycle::Active);

    // and the room drains again only once the last watcher leaves
    room.handle_leave(2);
    assert_eq!(room.lifecycle(), Lifecycle::Draining);
}

// ---------------------------------------------------------------------------

#[derive(Default)]
struct Ball {
    meta: EntityMeta,
    x: f64,
    vx: f64,
    radius: f64,
}

impl Schematic for Ball {
    fn field_set() -> &'static FieldSet {
        static FIELDS: LazyLock<FieldSet> = LazyLock::new(|| {
            FieldSet::builder()
                .field("x", FieldKind::Float64)
                .field("vx", FieldKind::Float64)
                .build()
        });
        &FIELDS
    }

    fn kind_name() -> &'static str {
        "ball"
    }

    fn fields(&self) -> &'static FieldSet {
        Self::field_set()
    }

    fn kind(&self) -> &'static str {
        Self::kind_name()
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "x" => Some(Value::F64(self.x)),
            "vx" => Some(Value::F64(self.vx)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> bool {
        match name {
            "x" => value.as_f64().map(|v| self.x = v).is_some(),
            "vx" => value.as_f64().map(|v| self.vx = v).is_some(),
            _ => false,
        }
    }

    fn is_kind(&self, type_id: TypeId) -> bool {
        type_id == TypeId::of::<Ball>()
    }
}

impl Entity for Ball {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Tick-driven arena with a hard wall at x = 0.
struct WallGame;

impl Game for WallGame {
    fn config(&self) -> GameConfig {
        GameConfig {
            tick_rate: 20,
            ..GameConfig::default()
        }
    }

    fn on_create(&self, room: &mut Room) {
        room.spawn_entity(Box::new(Ball {
            x: 5.0,
            vx: -10.0,
            radius: 20.0,
            ..Ball::default()
        }));
    }

    fn on_tick(&self, room: &mut Room, delta: f64) {
        for entity in room.entities_mut().all_mut() {
            let Some(ball) = entity.as_any_mut().downcast_mut::<Ball>() else {
                continue;
            };
            ball.x += ball.vx * delta;
            if ball.x < ball.radius {
                ball.x = ball.radius;
                ball.vx = ball.vx.abs();
            }
        }
    }
}

#[test]
fn ball_bounces_off_the_wall() {
    let mut room = room_for(Arc::new(WallGame));
    room.run_tick(1.0 / 20.0);

    let ball = room
        .entities()
        .of_type::<Ball>()
        .next()
        .and_then(|e| e.as_any().downcast_ref::<Ball>())
        .unwrap();
    assert!(ball.x >= 20.0, "ball stuck in the wall at {}", ball.x);
    assert!(ball.vx > 0.0);
}

// ---------------------------------------------------------------------------

/// Grid game that keeps four seats warm with bots.
struct BotFilledGame;

impl Game for BotFilledGame {
    fn config(&self) -> GameConfig {
        GameConfig {
            tick_rate: 20,
            max_players: 6,
            ..GameConfig::default()
        }
    }

    fn on_player_join(&self, room: &mut Room, player: u64) {
        let entity = room.spawn_entity(Box::new(GridPlayer::default()));
        room.set_player_entity(player, Some(entity));
    }

    fn spawn_bot(&self, room: &mut Room, _name: &str) -> Option<EntityId> {
        Some(room.spawn_entity(Box::new(GridPlayer::default())))
    }

    fn bots(&self) -> Option<BotSettings> {
        Some(BotSettings {
            fill_to: 4,
            behaviors: Vec::new(),
            despawn_on_join: true,
            names: vec!["Scout".to_string(), "Drift".to_string()],
        })
    }
}

fn bot_entities(world: &EntityCollection) -> usize {
    world.all().filter(|e| e.is_bot()).count()
}

#[test]
fn bots_fill_on_create_and_yield_to_humans() {
    let mut room = room_for(Arc::new(BotFilledGame));
    assert_eq!(room.bot_count(), 4);
    assert_eq!(bot_entities(room.entities()), 4);

    room.handle_join(context(1), "c-1");
    assert_eq!(room.player_count(), 1);
    assert_eq!(room.bot_count(), 3);
    assert_eq!(bot_entities(room.entities()), 3);
    // one human + three bots
    assert_eq!(room.entities().len(), 4);
}

#[test]
fn bot_count_tracks_the_deficit_across_joins_and_leaves() {
    let mut room = room_for(Arc::new(BotFilledGame));

    for visitor in 1..=3 {
        room.handle_join(context(visitor), "c");
    }
    assert_eq!(room.player_count(), 3);
    assert_eq!(room.bot_count(), 1);

    room.handle_leave(2);
    assert_eq!(room.player_count(), 2);
    assert_eq!(room.bot_count(), 2);

    room.handle_leave(1);
    room.handle_leave(3);
    assert_eq!(room.player_count(), 0);
    assert_eq!(room.bot_count(), 4);
}

// ---------------------------------------------------------------------------

use embers::server::bots::{Behavior, BotHandle};

/// Marches its entity east on every think.
struct MarchEast;

impl Behavior for MarchEast {
    fn think_rate(&self) -> Option<f64> {
        Some(10.0)
    }

    fn think(&self, bot: &BotHandle, room: &mut Room, _delta: f64) {
        room.send_bot_input(
            bot.entity,
            serde_json::json!({"action": "move", "direction": "east"}),
        );
    }
}

struct MarchingGame;

impl Game for MarchingGame {
    fn config(&self) -> GameConfig {
        GameConfig {
            tick_rate: 20,
            ..GameConfig::default()
        }
    }

    fn spawn_bot(&self, room: &mut Room, _name: &str) -> Option<EntityId> {
        Some(room.spawn_entity(Box::new(GridPlayer::default())))
    }

    fn bots(&self) -> Option<BotSettings> {
        Some(BotSettings {
            fill_to: 1,
            behaviors: vec![Arc::new(MarchEast)],
            despawn_on_join: false,
            names: Vec::new(),
        })
    }
}

#[test]
fn bot_thinking_follows_its_think_rate() {
    let mut room = room_for(Arc::new(MarchingGame));
    assert_eq!(room.bot_count(), 1);
    let entity = room.bot_entities()[0];

    // 20 Hz ticks against a 10 Hz think rate: one think every two ticks
    for _ in 0..8 {
        room.run_tick(1.0 / 20.0);
    }

    let bot = room.entities().get_as::<GridPlayer>(entity).unwrap();
    assert_eq!(bot.grid_x, 4);
    assert!(room.entities().get(entity).unwrap().is_bot());
}

#[test]
fn identical_input_streams_produce_identical_ticks() {
    let run = || {
        let mut room = room_for(Arc::new(WallGame));
        for _ in 0..10 {
            room.run_tick(1.0 / 20.0);
        }
        room.checkpoint()
    };

    let a = run();
    let b = run();
    assert_eq!(a.tick, b.tick);
    assert_eq!(a.entities.len(), b.entities.len());
    for ((kind_a, record_a), (kind_b, record_b)) in a.entities.iter().zip(b.entities.iter()) {
        assert_eq!(kind_a, kind_b);
        assert_eq!(record_a.values, record_b.values);
    }
}
