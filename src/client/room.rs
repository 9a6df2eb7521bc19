use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::api::entity::{EntityId, EntityRecord, FieldMap};
use crate::api::message::InputPackage;
use crate::client::error::EmbersClientError;
use crate::client::input::InputHandler;
use crate::client::interp::{InterpConfig, Interpolator};
use crate::client::predict::{ApplyInput, PredictConfig, Predictor};

#[derive(Clone, Default)]
pub struct ClientRoomConfig {
    pub interp: InterpConfig,
    pub predict: PredictConfig,
    /// Pure function of `(state, input)`. Must mirror what the server's
    /// input application does to the owned entity, or corrections will fight
    /// the player. Absent for render-only clients.
    pub apply_input: Option<Arc<ApplyInput>>,
}

/// Client-side view of one joined room: buffered interpolation for every
/// entity, prediction and reconciliation for the player's own.
pub struct ClientRoom {
    game: String,
    id: String,
    config: ClientRoomConfig,
    spectator: bool,
    own_entity: Option<EntityId>,
    interpolators: HashMap<EntityId, Interpolator>,
    latest: HashMap<EntityId, FieldMap>,
    inputs: InputHandler,
    predictor: Predictor,
    predicted: FieldMap,
    last_tick: u64,
    players: HashMap<u64, String>,
    finished: bool,
}

impl ClientRoom {
    pub fn new(
        game: String,
        id: String,
        spectator: bool,
        own_entity: Option<EntityId>,
        config: ClientRoomConfig,
    ) -> Self {
        let predictor = Predictor::new(config.predict.clone());
        Self {
            game,
            id,
            config,
            spectator,
            own_entity,
            interpolators: HashMap::new(),
            latest: HashMap::new(),
            inputs: InputHandler::new(),
            predictor,
            predicted: FieldMap::new(),
            last_tick: 0,
            players: HashMap::new(),
            finished: false,
        }
    }

    pub fn game(&self) -> &str {
        &self.game
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn spectator(&self) -> bool {
        self.spectator
    }

    pub fn own_entity(&self) -> Option<EntityId> {
        self.own_entity
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    pub fn players(&self) -> &HashMap<u64, String> {
        &self.players
    }

    /// Newest authoritative state of one entity, unsmoothed.
    pub fn latest_state(&self, entity: EntityId) -> Option<&FieldMap> {
        self.latest.get(&entity)
    }

    pub fn pending_inputs(&self) -> usize {
        self.inputs.unconfirmed().len()
    }

    /// Feeds one authoritative snapshot: buffers every entity for
    /// interpolation, confirms acknowledged inputs and reconciles the
    /// predicted present against the replayed truth.
    pub fn on_snapshot(
        &mut self,
        tick: u64,
        timestamp: u64,
        entities: Vec<EntityRecord>,
        last_seq: u64,
    ) {
        if self.last_tick > 0 && tick <= self.last_tick {
            return;
        }
        self.last_tick = tick;

        let mut seen: HashSet<EntityId> = HashSet::with_capacity(entities.len());
        for record in entities {
            seen.insert(record.id);
            self.interpolators
                .entry(record.id)
                .or_insert_with(|| Interpolator::new(self.config.interp.clone()))
                .push(timestamp as f64, record.values.clone());
            self.latest.insert(record.id, record.values);
        }
        // despawned entities stop rendering immediately
        self.interpolators.retain(|id, _| seen.contains(id));
        self.latest.retain(|id, _| seen.contains(id));

        if self.spectator {
            return;
        }
        let (Some(own), Some(apply)) = (self.own_entity, self.config.apply_input.clone()) else {
            return;
        };
        let Some(server_state) = self.latest.get(&own).cloned() else {
            return;
        };

        self.inputs.confirm_up_to(last_seq);
        let replayed =
            self.predictor
                .predict(&server_state, self.inputs.unconfirmed(), apply.as_ref());
        if !self.predicted.is_empty() {
            self.predictor.set_correction(&self.predicted, &replayed);
        }
        self.predicted = replayed;
    }

    /// Sequences an input, applies it locally for immediate feedback and
    /// returns the package for the transport. Spectators get nothing.
    pub fn send_input(&mut self, data: serde_json::Value) -> Option<InputPackage> {
        if self.spectator || self.finished {
            return None;
        }
        let package = self.inputs.package(data);
        if let Some(apply) = self.config.apply_input.clone()
            && !self.predicted.is_empty()
        {
            apply(&mut self.predicted, &package.data);
        }
        Some(package)
    }

    /// Renders the room at `now`: every entity interpolated in the past, the
    /// player's own entity replaced by the smoothed prediction.
    pub fn render(&mut self, now_ms: f64) -> HashMap<EntityId, FieldMap> {
        let mut out = HashMap::with_capacity(self.interpolators.len());
        for (id, interpolator) in &self.interpolators {
            out.insert(*id, interpolator.get_interpolated(now_ms));
        }
        if !self.spectator
            && let Some(own) = self.own_entity
            && self.config.apply_input.is_some()
            && !self.predicted.is_empty()
        {
            out.insert(own, self.predictor.get_smoothed(&self.predicted));
        }
        out
    }

    pub fn on_player_joined(&mut self, player: u64, display_name: String) {
        self.players.insert(player, display_name);
    }

    pub fn on_player_left(&mut self, player: u64) {
        self.players.remove(&player);
    }

    pub fn on_game_over(&mut self) {
        self.finished = true;
    }
}

/// The rooms this client has joined, keyed by `(game, room id)`. The
/// protocol task routes inbound messages; user code reads through the visit
/// closures.
#[derive(Default)]
pub struct ActiveRooms {
    rooms: RwLock<HashMap<(String, String), ClientRoom>>,
}

impl ActiveRooms {
    pub fn insert(&self, room: ClientRoom) {
        let key = (room.game().to_string(), room.id().to_string());
        self.rooms
            .write()
            .expect("rooms lock poisoned")
            .insert(key, room);
    }

    pub fn remove(&self, game: &str, id: &str) -> Option<ClientRoom> {
        self.rooms
            .write()
            .expect("rooms lock poisoned")
            .remove(&(game.to_string(), id.to_string()))
    }

    pub fn visit<R>(
        &self,
        game: &str,
        id: &str,
        f: impl FnOnce(&ClientRoom) -> R,
    ) -> Result<R, EmbersClientError> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        rooms
            .get(&(game.to_string(), id.to_string()))
            .map(f)
            .ok_or(EmbersClientError::RoomNotFound)
    }

    pub fn visit_mut<R>(
        &self,
        game: &str,
        id: &str,
        f: impl FnOnce(&mut ClientRoom) -> R,
    ) -> Result<R, EmbersClientError> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        rooms
            .get_mut(&(game.to_string(), id.to_string()))
            .map(f)
            .ok_or(EmbersClientError::RoomNotFound)
    }

    /// Applies to every joined room with this id; lifecycle events carry the
    /// room id but not the game type.
    pub fn for_room_id_mut(&self, id: &str, mut f: impl FnMut(&mut ClientRoom)) {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        for ((_, room_id), room) in rooms.iter_mut() {
            if room_id == id {
                f(room);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: EntityId, pairs: &[(&str, f64)]) -> EntityRecord {
        let mut values = FieldMap::new();
        for (name, value) in pairs {
            values.insert(name.to_string(), serde_json::json!(value));
        }
        EntityRecord { id, values }
    }

    fn step_apply() -> Arc<ApplyInput> {
        Arc::new(|state: &mut FieldMap, input: &serde_json::Value| {
            if let Some(dx) = input.get("dx").and_then(|v| v.as_f64()) {
                let x = state.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
                state.insert("x".to_string(), serde_json::json!(x + dx));
            }
        })
    }

    fn predicted_room() -> ClientRoom {
        ClientRoom::new(
            "gems".to_string(),
            "gems:drop".to_string(),
            false,
            Some(1),
            ClientRoomConfig {
                apply_input: Some(step_apply()),
                ..ClientRoomConfig::default()
            },
        )
    }

    fn own_x(room: &ClientRoom) -> f64 {
        room.latest_state(1)
            .and_then(|s| s.get("x"))
            .and_then(|v| v.as_f64())
            .unwrap()
    }

    #[test]
    fn unacknowledged_inputs_replay_on_top_of_snapshots() {
        let mut room = predicted_room();
        room.on_snapshot(1, 1_000, vec![record(1, &[("x", 0.0)])], 0);

        room.send_input(serde_json::json!({"dx": 1.0}));
        room.send_input(serde_json::json!({"dx": 1.0}));
        assert_eq!(room.pending_inputs(), 2);

        // the server has applied seq 1 only and still shows x=1
        room.on_snapshot(2, 1_050, vec![record(1, &[("x", 1.0)])], 1);
        assert_eq!(room.pending_inputs(), 1);

        // replay of the remaining input lands the prediction at x=2
        let rendered = room.render(2_000.0);
        let own = rendered.get(&1).unwrap();
        let x = own.get("x").and_then(|v| v.as_f64()).unwrap();
        assert!((x - 2.0).abs() < 1e-9, "prediction drifted: {x}");
    }

    #[test]
    fn stale_snapshots_are_ignored() {
        let mut room = predicted_room();
        room.on_snapshot(5, 1_000, vec![record(1, &[("x", 5.0)])], 0);
        room.on_snapshot(4, 900, vec![record(1, &[("x", 99.0)])], 0);
        assert_eq!(own_x(&room), 5.0);
        assert_eq!(room.last_tick(), 5);
    }

    #[test]
    fn despawned_entities_stop_rendering() {
        let mut room = predicted_room();
        room.on_snapshot(
            1,
            1_000,
            vec![record(1, &[("x", 0.0)]), record(2, &[("x", 3.0)])],
            0,
        );
        room.on_snapshot(2, 1_050, vec![record(1, &[("x", 0.0)])], 0);

        let rendered = room.render(1_200.0);
        assert!(rendered.contains_key(&1));
        assert!(!rendered.contains_key(&2));
    }

    #[test]
    fn spectators_cannot_send_inputs() {
        let mut room = ClientRoom::new(
            "gems".to_string(),
            "gems:drop".to_string(),
            true,
            None,
            ClientRoomConfig::default(),
        );
        assert!(room.send_input(serde_json::json!({"dx": 1.0})).is_none());
    }

    #[test]
    fn game_over_freezes_the_room() {
        let mut room = predicted_room();
        room.on_snapshot(1, 1_000, vec![record(1, &[("x", 0.0)])], 0);
        room.on_game_over();
        assert!(room.finished());
        assert!(room.send_input(serde_json::json!({"dx": 1.0})).is_none());
    }

    #[test]
    fn lifecycle_events_track_the_roster() {
        let mut room = predicted_room();
        room.on_player_joined(9, "Nova".to_string());
        assert_eq!(room.players().get(&9).map(String::as_str), Some("Nova"));
        room.on_player_left(9);
        assert!(room.players().is_empty());
    }

    #[test]
    fn active_rooms_route_by_game_and_id() {
        let rooms = ActiveRooms::default();
        rooms.insert(predicted_room());

        let tick = rooms
            .visit("gems", "gems:drop", |room| room.last_tick())
            .unwrap();
        assert_eq!(tick, 0);

        assert!(matches!(
            rooms.visit("gems", "other", |room| room.last_tick()),
            Err(EmbersClientError::RoomNotFound)
        ));

        assert!(rooms.remove("gems", "gems:drop").is_some());
    }
}
