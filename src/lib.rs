// Embers is a real-time multiplayer runtime for browser-embedded game
// experiences: an authoritative server that ticks shared rooms at a fixed
// rate, and a client pipeline that hides the wire from the player.

// Key design goals:

// Authoritative simulation: the server owns the world; clients send sequenced
// inputs and receive schema-driven entity snapshots.

// Two operating modes per game: a fixed-rate tick loop, or an event-driven
// mode where each input executes synchronously (turn-based experiences).

// Lag hiding as a first-class client concern: snapshot buffering with linear,
// cubic Hermite or kinematic interpolation, plus input prediction with
// smoothed reconciliation against the authoritative state.

// Bots as pseudo-players: empty slots are filled by scripted opponents that
// share the entity representation of humans and yield their seats gracefully.

// Decoupled side effects: host-platform calls (badges, toasts, leaderboards)
// never run inside a tick; they are deferred to a retrying FIFO queue.

// Transport and encoding agnostic: the core speaks through a NetworkProtocol
// and a Schema seam; a WebSocket transport and a JSON schema ship in-tree.

// Single-threaded cooperation: a room and everything in it live on one
// thread, so hook authors reason about state without locks. Rooms share
// nothing with each other.

pub mod api;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;
