use std::collections::HashMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, RwLock, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use crate::server::game::Game;
use crate::server::protocol::SessionManager;
use crate::server::room::{Lifecycle, Room};
use crate::server::runtime::{RoomEvent, RoomGuard, RoomHandle, RoomRuntime, Settings};

/// Thread-per-room execution. The thread owns the `Room` outright; events
/// arrive over a channel, which makes every hook observation single-threaded
/// by construction.
pub struct SyncRuntime;

impl RoomRuntime for SyncRuntime {
    fn spawn(
        game_type: &'static str,
        room_id: String,
        game: Arc<dyn Game>,
        settings: Arc<Settings>,
        sessions: Arc<SessionManager>,
        rooms: Arc<RwLock<HashMap<String, RoomHandle>>>,
        guard: RoomGuard,
    ) -> RoomHandle {
        let (events_tx, events_rx) = mpsc::channel::<RoomEvent>();

        let thread_id = room_id.clone();
        thread::Builder::new()
            .name(format!("room-{room_id}"))
            .spawn(move || {
                let _census = guard;
                let mut room = Room::new(
                    game_type,
                    thread_id.clone(),
                    game,
                    sessions,
                    settings.effects.clone(),
                );
                room.start();
                log::info!("room {thread_id}: created (tick rate {})", room.config().tick_rate);

                run_loop(&mut room, &events_rx, &settings);

                room.close();
                if let Some(on_checkpoint) = settings.on_checkpoint.as_ref() {
                    on_checkpoint(room.checkpoint());
                }
                if let Ok(mut rooms) = rooms.write() {
                    rooms.remove(&thread_id);
                }
            })
            .expect("failed to spawn room thread");

        RoomHandle::new(events_tx)
    }
}

enum Flow {
    Continue,
    Close,
}

fn run_loop(room: &mut Room, events: &Receiver<RoomEvent>, settings: &Settings) {
    if room.config().tick_rate > 0 {
        tick_loop(room, events, settings);
    } else {
        event_loop(room, events, settings);
    }
}

/// Fixed-rate mode. Events are gathered between ticks, so `on_tick` always
/// sees a consistent world: an input landing mid-tick waits for the next one.
fn tick_loop(room: &mut Room, events: &Receiver<RoomEvent>, settings: &Settings) {
    let tick_rate = room.config().tick_rate;
    let interval = Duration::from_secs_f64(1.0 / tick_rate as f64);
    // a late tick never inflates the delta games observe
    let delta = 1.0 / tick_rate as f64;

    let mut next_tick = Instant::now() + interval;
    let mut drain_deadline: Option<Instant> = None;

    loop {
        loop {
            let now = Instant::now();
            if now >= next_tick {
                break;
            }
            match events.recv_timeout(next_tick - now) {
                Ok(event) => {
                    if let Flow::Close = handle_event(room, event, true) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        if drained_out(room, &mut drain_deadline, settings.drain_grace) {
            return;
        }

        let started = Instant::now();
        room.run_tick(delta);
        let spent = started.elapsed();
        if spent > interval {
            log::warn!(
                "room {}: tick {} took {spent:?}, over its {interval:?} budget",
                room.id(),
                room.tick_count()
            );
            // schedule the next tick immediately instead of chasing the backlog
            next_tick = Instant::now();
        } else {
            next_tick += interval;
        }
    }
}

/// `tick_rate == 0`: no loop, every input executes synchronously as it
/// arrives and bots only act when the game hands them a turn.
fn event_loop(room: &mut Room, events: &Receiver<RoomEvent>, settings: &Settings) {
    let mut drain_deadline: Option<Instant> = None;
    loop {
        match events.recv_timeout(settings.idle_poll) {
            Ok(event) => {
                if let Flow::Close = handle_event(room, event, false) {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
        if drained_out(room, &mut drain_deadline, settings.drain_grace) {
            return;
        }
    }
}

fn handle_event(room: &mut Room, event: RoomEvent, tick_driven: bool) -> Flow {
    match event {
        RoomEvent::Join {
            context,
            correlation_id,
        } => room.handle_join(context, &correlation_id),
        RoomEvent::Leave { player } => room.handle_leave(player),
        RoomEvent::Input { player, package } => {
            if tick_driven {
                room.queue_input(player, package);
            } else {
                room.process_event_input(player, package);
            }
        }
        RoomEvent::Close => return Flow::Close,
    }
    Flow::Continue
}

fn drained_out(room: &Room, deadline: &mut Option<Instant>, grace: Duration) -> bool {
    if room.lifecycle() == Lifecycle::Draining {
        let expires = *deadline.get_or_insert_with(|| Instant::now() + grace);
        Instant::now() >= expires
    } else {
        *deadline = None;
        false
    }
}

#[cfg(test)]
mod tests {
    use std::any::{Any, TypeId};
    use std::sync::LazyLock;
    use std::time::Duration;

    use super::*;
    use crate::api::entity::{Entity, EntityMeta, Schematic};
    use crate::api::fields::{FieldKind, FieldSet, Value};
    use crate::api::message::{InputPackage, OutputMessage};
    use crate::api::schema::SchemaCodec;
    use crate::api::schema::json::Json;
    use crate::server::context::PlayerContext;
    use crate::server::game::GameConfig;
    use crate::server::runtime::{GameRuntimeAnyHandle, GameRuntimeHandle};

    #[derive(Default)]
    struct Pawn {
        meta: EntityMeta,
        x: f64,
    }

    impl Schematic for Pawn {
        fn field_set() -> &'static FieldSet {
            static FIELDS: LazyLock<FieldSet> =
                LazyLock::new(|| FieldSet::builder().field("x", FieldKind::Float64).build());
            &FIELDS
        }

        fn kind_name() -> &'static str {
            "pawn"
        }

        fn fields(&self) -> &'static FieldSet {
            Self::field_set()
        }

        fn kind(&self) -> &'static str {
            Self::kind_name()
        }

        fn get_field(&self, name: &str) -> Option<Value> {
            (name == "x").then(|| Value::F64(self.x))
        }

        fn set_field(&mut self, name: &str, value: Value) -> bool {
            name == "x" && value.as_f64().map(|v| self.x = v).is_some()
        }

        fn is_kind(&self, type_id: TypeId) -> bool {
            type_id == TypeId::of::<Pawn>()
        }
    }

    impl Entity for Pawn {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }

        fn on_input(&mut self, input: &serde_json::Value) {
            if let Some(dx) = input.get("dx").and_then(|v| v.as_f64()) {
                self.x += dx;
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct FastGame;

    impl Game for FastGame {
        fn config(&self) -> GameConfig {
            GameConfig {
                tick_rate: 50,
                ..GameConfig::default()
            }
        }

        fn on_player_join(&self, room: &mut Room, player: u64) {
            let entity = room.spawn_entity(Box::new(Pawn::default()));
            room.set_player_entity(player, Some(entity));
        }
    }

    fn context(id: i64) -> Arc<PlayerContext> {
        let query: std::collections::HashMap<String, String> = [
            ("assetId", "a"),
            ("visitorId", &id.to_string() as &str),
            ("urlSlug", "slug"),
            ("interactiveNonce", "n"),
            ("interactivePublicKey", "k"),
            ("sceneDropId", "drop"),
            ("identityId", "i"),
            ("profileId", "p"),
            ("uniqueName", "u"),
            ("username", "user"),
            ("displayName", "Visitor"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Arc::new(PlayerContext::from_handshake(&query).unwrap())
    }

    fn recv_message(
        receiver: &mut tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
        sessions: &SessionManager,
    ) -> OutputMessage {
        let raw = receiver.blocking_recv().expect("session closed");
        sessions.codec().decode_output(&raw).expect("decodable")
    }

    #[test]
    fn handshake_creates_room_and_welcomes_after_join_hook() {
        let sessions = Arc::new(SessionManager::new(SchemaCodec::<Json>::shared()));
        let handle = GameRuntimeHandle::<SyncRuntime>::new(
            "fast",
            Arc::new(FastGame),
            Settings {
                drain_grace: Duration::from_millis(50),
                ..Settings::default()
            },
            Arc::clone(&sessions),
        );

        let ctx = context(31);
        let mut receiver = sessions.connect(ctx.id());
        handle.handshake(Arc::clone(&ctx), "c-31".to_string());

        let welcome = recv_message(&mut receiver, &sessions);
        let OutputMessage::Welcome {
            correlation_id,
            success,
            entity,
            spectator,
            room,
            ..
        } = welcome
        else {
            panic!("expected a welcome, got {welcome:?}");
        };
        assert_eq!(correlation_id, "c-31");
        assert!(success);
        assert!(!spectator);
        assert!(entity.is_some());
        assert_eq!(room, "fast:drop");
        assert_eq!(handle.room_count(), 1);

        // snapshots flow and acknowledge applied inputs
        handle.input(
            ctx.id(),
            "fast:drop".to_string(),
            InputPackage {
                seq: 1,
                timestamp: 1,
                data: serde_json::json!({"dx": 2.0}),
            },
        );
        let mut acked = 0;
        for _ in 0..50 {
            if let OutputMessage::Snapshot { last_seq, .. } = recv_message(&mut receiver, &sessions)
                && last_seq == 1
            {
                acked = last_seq;
                break;
            }
        }
        assert_eq!(acked, 1);

        // the drain grace closes the room after the last leave
        handle.leave(ctx.id(), "fast:drop".to_string());
        for _ in 0..100 {
            if handle.room_count() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handle.room_count(), 0);
    }

    #[test]
    fn close_room_shuts_down_without_waiting_for_the_drain() {
        let sessions = Arc::new(SessionManager::new(SchemaCodec::<Json>::shared()));
        let handle = GameRuntimeHandle::<SyncRuntime>::new(
            "fast",
            Arc::new(FastGame),
            Settings {
                drain_grace: Duration::from_secs(3600),
                ..Settings::default()
            },
            Arc::clone(&sessions),
        );

        let ctx = context(53);
        let mut receiver = sessions.connect(ctx.id());
        handle.handshake(Arc::clone(&ctx), "c-53".to_string());
        let OutputMessage::Welcome { success: true, .. } = recv_message(&mut receiver, &sessions)
        else {
            panic!("expected a welcome");
        };

        handle.close_room("fast:drop".to_string());

        let mut saw_game_over = false;
        for _ in 0..100 {
            if let OutputMessage::GameOver { room } = recv_message(&mut receiver, &sessions) {
                assert_eq!(room, "fast:drop");
                saw_game_over = true;
                break;
            }
        }
        assert!(saw_game_over);

        for _ in 0..100 {
            if handle.room_count() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handle.room_count(), 0);
    }

    #[test]
    fn room_cap_rejects_with_retryable_error() {
        struct Tiny;
        impl Game for Tiny {
            fn config(&self) -> GameConfig {
                GameConfig {
                    tick_rate: 0,
                    max_rooms_per_process: 0,
                    ..GameConfig::default()
                }
            }
        }

        let sessions = Arc::new(SessionManager::new(SchemaCodec::<Json>::shared()));
        let handle = GameRuntimeHandle::<SyncRuntime>::new(
            "tiny",
            Arc::new(Tiny),
            Settings::default(),
            Arc::clone(&sessions),
        );

        let ctx = context(77);
        let mut receiver = sessions.connect(ctx.id());
        handle.handshake(ctx, "c-77".to_string());

        let message = recv_message(&mut receiver, &sessions);
        let OutputMessage::Error { retryable, .. } = message else {
            panic!("expected an error, got {message:?}");
        };
        assert!(retryable);
        assert_eq!(handle.room_count(), 0);
    }
}
