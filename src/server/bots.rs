use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::seq::IndexedRandom;

use crate::api::entity::EntityId;
use crate::server::room::Room;

// Process-global so bot ids never collide across rooms. Ephemeral: the
// namespace resets with the process.
static NEXT_BOT_ID: AtomicU64 = AtomicU64::new(1);

fn next_bot_id() -> u64 {
    NEXT_BOT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity card of a managed bot, handed to behaviors. Bots share the
/// entity representation of humans; only the `is_bot` marker distinguishes
/// them, which keeps tick logic uniform.
#[derive(Debug, Clone)]
pub struct BotHandle {
    pub id: u64,
    pub name: String,
    pub entity: EntityId,
}

/// Scripted opponent logic.
pub trait Behavior: Send + Sync {
    /// Automatic think frequency in Hz. `None` thinks on every scheduler
    /// step; `Some(0.0)` disables automatic thinking entirely (games that
    /// drive bots through `on_my_turn`).
    fn think_rate(&self) -> Option<f64> {
        None
    }

    fn think(&self, bot: &BotHandle, room: &mut Room, delta: f64) {
        let _ = (bot, room, delta);
    }

    /// Invoked explicitly by the game, never by the scheduler. The natural
    /// hook for event-driven (turn-based) games.
    fn on_my_turn(&self, bot: &BotHandle, room: &mut Room) {
        let _ = (bot, room);
    }
}

struct Idle;

impl Behavior for Idle {
    fn think_rate(&self) -> Option<f64> {
        Some(0.0)
    }
}

#[derive(Clone)]
pub struct BotSettings {
    /// Keep `humans + bots` at this count while humans are scarce.
    pub fill_to: usize,
    pub behaviors: Vec<Arc<dyn Behavior>>,
    /// Remove the oldest bot whenever a human join pushes the room over
    /// `fill_to`.
    pub despawn_on_join: bool,
    pub names: Vec<String>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            fill_to: 0,
            behaviors: Vec::new(),
            despawn_on_join: true,
            names: Vec::new(),
        }
    }
}

struct Bot {
    handle: BotHandle,
    behavior: Arc<dyn Behavior>,
    accumulator: f64,
}

#[derive(Default)]
pub struct BotManager {
    settings: Option<BotSettings>,
    bots: VecDeque<Bot>,
    name_cursor: usize,
}

impl BotManager {
    pub fn new(settings: Option<BotSettings>) -> Self {
        Self {
            settings,
            bots: VecDeque::new(),
            name_cursor: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.bots.len()
    }

    pub fn fill_to(&self) -> usize {
        self.settings.as_ref().map(|s| s.fill_to).unwrap_or(0)
    }

    pub fn despawn_on_join(&self) -> bool {
        self.settings
            .as_ref()
            .is_some_and(|s| s.despawn_on_join)
    }

    pub fn bots(&self) -> impl Iterator<Item = &BotHandle> {
        self.bots.iter().map(|bot| &bot.handle)
    }

    pub fn by_entity(&self, entity: EntityId) -> Option<&BotHandle> {
        self.bots()
            .find(|handle| handle.entity == entity)
    }

    /// Spawns bots until `humans + bots` reaches the fill target. The caller
    /// supplies the spawner; a spawner refusing to produce an entity stops
    /// the pass. Returns how many bots were created.
    pub fn fill(
        &mut self,
        humans: usize,
        mut spawn: impl FnMut(&str) -> Option<EntityId>,
    ) -> usize {
        let Some(settings) = self.settings.clone() else {
            return 0;
        };
        let deficit = settings
            .fill_to
            .saturating_sub(humans + self.bots.len());

        let mut created = 0;
        for _ in 0..deficit {
            let id = next_bot_id();
            let name = if settings.names.is_empty() {
                format!("Bot {id}")
            } else {
                let name = settings.names[self.name_cursor % settings.names.len()].clone();
                self.name_cursor += 1;
                name
            };

            let behavior: Arc<dyn Behavior> = settings
                .behaviors
                .choose(&mut rand::rng())
                .map(Arc::clone)
                .unwrap_or_else(|| Arc::new(Idle));

            let Some(entity) = spawn(&name) else {
                log::warn!("bot spawner produced no entity for `{name}`, stopping fill");
                break;
            };

            self.bots.push_back(Bot {
                handle: BotHandle { id, name, entity },
                behavior,
                accumulator: 0.0,
            });
            created += 1;
        }
        created
    }

    /// Removes and returns the oldest bot so the caller can despawn its
    /// entity.
    pub fn despawn_one(&mut self) -> Option<BotHandle> {
        self.bots.pop_front().map(|bot| bot.handle)
    }

    /// Forgets the bot owning `entity`, if any. Used when game logic
    /// despawns a bot's entity directly.
    pub fn remove_by_entity(&mut self, entity: EntityId) -> Option<BotHandle> {
        let index = self
            .bots
            .iter()
            .position(|bot| bot.handle.entity == entity)?;
        self.bots.remove(index).map(|bot| bot.handle)
    }

    /// Advances every think accumulator by `delta` and returns the due
    /// `think` invocations, one entry per elapsed interval. The manager
    /// stays in place while the room runs them, so behaviors see a complete
    /// world.
    pub fn advance(&mut self, delta: f64) -> Vec<(Arc<dyn Behavior>, BotHandle, f64)> {
        let mut due = Vec::new();
        for bot in &mut self.bots {
            let interval = match bot.behavior.think_rate() {
                Some(rate) if rate <= 0.0 => continue,
                Some(rate) => 1.0 / rate,
                None => delta,
            };

            bot.accumulator += delta;
            while bot.accumulator >= interval {
                bot.accumulator -= interval;
                due.push((Arc::clone(&bot.behavior), bot.handle.clone(), interval));
            }
        }
        due
    }

    /// The behavior and identity to run for an explicit turn.
    pub fn turn(&self, entity: EntityId) -> Option<(Arc<dyn Behavior>, BotHandle)> {
        self.bots
            .iter()
            .find(|bot| bot.handle.entity == entity)
            .map(|bot| (Arc::clone(&bot.behavior), bot.handle.clone()))
    }
}
