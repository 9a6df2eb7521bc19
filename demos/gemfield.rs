//! Headless gem-chase demo: an event-driven room served over WebSocket, one
//! scripted human and one bot taking turns.
//!
//! Run with: cargo run --example gemfield --features ws

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use embers::api::entity::{Entity, EntityId, EntityMeta, Schematic};
use embers::api::fields::{FieldKind, FieldSet, Value};
use embers::api::schema::json::Json;
use embers::client::EmbersClientBuilder;
use embers::client::protocol::ws::WebSocketClientProtocol;
use embers::client::room::ClientRoomConfig;
use embers::server::EmbersServer;
use embers::server::bots::{Behavior, BotHandle, BotSettings};
use embers::server::game::{Game, GameConfig};
use embers::server::protocol::ws::WebSocketProtocol;
use embers::server::room::Room;
use embers::server::runtime::{Settings, sync::SyncRuntime};

const PORT: u16 = 8098;
const GRID: i32 = 8;

#[derive(Default)]
struct Walker {
    meta: EntityMeta,
    grid_x: i32,
    grid_y: i32,
    score: i32,
}

impl Schematic for Walker {
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
        "walker"
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
        type_id == TypeId::of::<Walker>()
    }
}

impl Entity for Walker {
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
        self.grid_x = (self.grid_x + dx).clamp(0, GRID - 1);
        self.grid_y = (self.grid_y + dy).clamp(0, GRID - 1);
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

/// Walks one step toward the gem whenever the game hands it the turn.
struct ChaseGems;

impl Behavior for ChaseGems {
    fn think_rate(&self) -> Option<f64> {
        // turn-based room, the scheduler stays out of it
        Some(0.0)
    }

    fn on_my_turn(&self, bot: &BotHandle, room: &mut Room) {
        let Some(walker) = room.entities().get_as::<Walker>(bot.entity) else {
            return;
        };
        let (bx, by) = (walker.grid_x, walker.grid_y);
        let Some(gem) = room
            .entities()
            .of_type::<Gem>()
            .next()
            .and_then(|e| e.as_any().downcast_ref::<Gem>())
        else {
            return;
        };

        let direction = if gem.grid_x > bx {
            "east"
        } else if gem.grid_x < bx {
            "west"
        } else if gem.grid_y > by {
            "south"
        } else {
            "north"
        };
        room.send_bot_input(
            bot.entity,
            serde_json::json!({"action": "move", "direction": direction}),
        );
    }
}

struct GemField;

impl Game for GemField {
    fn config(&self) -> GameConfig {
        GameConfig {
            // event-driven: every input executes synchronously
            tick_rate: 0,
            max_players: 4,
            ..GameConfig::default()
        }
    }

    fn on_create(&self, room: &mut Room) {
        room.spawn_entity(Box::new(Gem {
            grid_x: 4,
            grid_y: 3,
            value: 5,
            ..Gem::default()
        }));
    }

    fn on_player_join(&self, room: &mut Room, player: u64) {
        let entity = room.spawn_entity(Box::new(Walker::default()));
        room.set_player_entity(player, Some(entity));
    }

    fn on_input(&self, room: &mut Room, player: u64, _input: &serde_json::Value) {
        collect_gems(room);

        // a human move hands every bot one turn
        if room.player(player).is_some() {
            for bot_entity in room.bot_entities() {
                room.bot_turn(bot_entity);
            }
            collect_gems(room);
        }
    }

    fn spawn_bot(&self, room: &mut Room, _name: &str) -> Option<EntityId> {
        Some(room.spawn_entity(Box::new(Walker {
            grid_x: GRID - 1,
            grid_y: GRID - 1,
            ..Walker::default()
        })))
    }

    fn bots(&self) -> Option<BotSettings> {
        Some(BotSettings {
            fill_to: 2,
            behaviors: vec![Arc::new(ChaseGems)],
            despawn_on_join: true,
            names: vec!["Magpie".to_string()],
        })
    }
}

/// Score every walker standing on a gem, then respawn the gem elsewhere.
fn collect_gems(room: &mut Room) {
    let gem = room
        .entities()
        .of_type::<Gem>()
        .next()
        .and_then(|e| e.as_any().downcast_ref::<Gem>())
        .map(|gem| (gem.id(), gem.grid_x, gem.grid_y, gem.value));
    let Some((gem_id, gx, gy, value)) = gem else {
        return;
    };

    let collector = room
        .entities()
        .of_type::<Walker>()
        .find(|e| {
            let walker = e.as_any().downcast_ref::<Walker>().unwrap();
            walker.grid_x == gx && walker.grid_y == gy
        })
        .map(|e| e.id());

    if let Some(walker_id) = collector {
        if let Some(walker) = room.entities_mut().get_as_mut::<Walker>(walker_id) {
            walker.score += value;
        }
        if let Some(gem) = room.entities_mut().get_as_mut::<Gem>(gem_id) {
            gem.grid_x = (gx + 3) % GRID;
            gem.grid_y = (gy + 5) % GRID;
        }
    }
}

fn credentials() -> HashMap<String, String> {
    [
        ("assetId", "demo-asset"),
        ("visitorId", "1001"),
        ("urlSlug", "gemfield"),
        ("interactiveNonce", "nonce"),
        ("interactivePublicKey", "key"),
        ("sceneDropId", "demo-drop"),
        ("identityId", "ident"),
        ("profileId", "profile"),
        ("uniqueName", "demo-player"),
        ("username", "demo"),
        ("displayName", "Demo Player"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[tokio::main]
async fn main() {
    env_logger::init();

    tokio::spawn(async {
        let result = EmbersServer::new(WebSocketProtocol::new("127.0.0.1", PORT), Json::default())
            .register::<SyncRuntime>("gemfield", GemField, Settings::default())
            .run()
            .await;
        if let Err(err) = result {
            eprintln!("server failed: {err}");
        }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = EmbersClientBuilder::new(
        WebSocketClientProtocol::new("127.0.0.1", PORT),
        Json::default(),
    )
    .build()
    .await
    .expect("client failed to connect");

    let (room, spectator) = client
        .join(
            "gemfield",
            credentials(),
            ClientRoomConfig::default(),
            Duration::from_secs(5),
        )
        .await
        .expect("join failed");
    println!("joined {room} (spectator: {spectator})");

    for direction in ["east", "east", "east", "south", "south", "south"] {
        client
            .input(
                "gemfield",
                &room,
                serde_json::json!({"action": "move", "direction": direction}),
            )
            .expect("input failed");
        tokio::time::sleep(Duration::from_millis(150)).await;

        let view = client
            .render("gemfield", &room, wall_clock_ms())
            .expect("room vanished");
        let mut ids: Vec<_> = view.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let state = &view[&id];
            println!(
                "  entity {id}: ({}, {}) score {}",
                state.get("gridX").and_then(|v| v.as_f64()).unwrap_or(-1.0),
                state.get("gridY").and_then(|v| v.as_f64()).unwrap_or(-1.0),
                state.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0),
            );
        }
    }

    client.leave("gemfield", &room).ok();
    client.stop();
}

fn wall_clock_ms() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}
