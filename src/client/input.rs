use std::time::{SystemTime, UNIX_EPOCH};

use crate::api::message::InputPackage;

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Client-side input sequencing. Every outgoing input gets the next seq
/// (starting at 1) and stays in the unconfirmed list until the server
/// acknowledges it through a snapshot; the list is what prediction replays.
#[derive(Debug, Default)]
pub struct InputHandler {
    next_seq: u64,
    unconfirmed: Vec<InputPackage>,
}

impl InputHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a payload with the next seq and the given client timestamp.
    pub fn package_at(&mut self, data: serde_json::Value, timestamp: u64) -> InputPackage {
        self.next_seq += 1;
        let package = InputPackage {
            seq: self.next_seq,
            timestamp,
            data,
        };
        self.unconfirmed.push(package.clone());
        package
    }

    pub fn package(&mut self, data: serde_json::Value) -> InputPackage {
        self.package_at(data, wall_clock_ms())
    }

    /// Drops everything at or below the acknowledged seq.
    pub fn confirm_up_to(&mut self, seq: u64) {
        self.unconfirmed.retain(|package| package.seq > seq);
    }

    pub fn unconfirmed(&self) -> &[InputPackage] {
        &self.unconfirmed
    }

    pub fn last_seq(&self) -> u64 {
        self.next_seq
    }
}
