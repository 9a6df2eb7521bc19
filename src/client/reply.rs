use std::{
    collections::{BinaryHeap, HashMap},
    sync::Mutex,
    time::{Duration, Instant},
};

use tokio::sync::oneshot::{self, Receiver, Sender};

/// Outcome of one correlated request.
#[derive(Debug)]
pub enum Reply<R, E> {
    Ok(R),
    Err(E),
    Timeout,
}

#[derive(PartialEq, Eq)]
struct RegisteredTimeout {
    id: String,
    expires_at: Instant,
}

// min-heap on expiry
impl Ord for RegisteredTimeout {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.expires_at.cmp(&self.expires_at)
    }
}

impl PartialOrd for RegisteredTimeout {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Correlates request/reply pairs over the wire by correlation id, with
/// expiry. `vacuum` sweeps expired entries and resolves them as `Timeout`.
pub struct ReplyManager<R, E> {
    registry: Mutex<HashMap<String, Sender<Reply<R, E>>>>,
    timeouts: Mutex<BinaryHeap<RegisteredTimeout>>,
}

impl<R, E> Default for ReplyManager<R, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, E> ReplyManager<R, E> {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            timeouts: Mutex::new(BinaryHeap::new()),
        }
    }

    pub fn register(&self, id: impl Into<String>, expires_in: Duration) -> Receiver<Reply<R, E>> {
        let (tx, rx) = oneshot::channel::<Reply<R, E>>();
        let id = id.into();

        self.registry
            .lock()
            .expect("registry lock poisoned")
            .insert(id.clone(), tx);
        self.timeouts
            .lock()
            .expect("timeouts lock poisoned")
            .push(RegisteredTimeout {
                id,
                expires_at: Instant::now() + expires_in,
            });
        rx
    }

    pub fn ok(&self, id: &str, result: R) {
        if let Some(pending) = self
            .registry
            .lock()
            .expect("registry lock poisoned")
            .remove(id)
        {
            let _ = pending.send(Reply::Ok(result));
        }
    }

    pub fn error(&self, id: &str, error: E) {
        if let Some(pending) = self
            .registry
            .lock()
            .expect("registry lock poisoned")
            .remove(id)
        {
            let _ = pending.send(Reply::Err(error));
        }
    }

    /// Resolves every expired registration as a timeout. Called periodically
    /// by the protocol task.
    pub fn vacuum(&self) {
        let now = Instant::now();
        loop {
            let expired = {
                let mut timeouts = self.timeouts.lock().expect("timeouts lock poisoned");
                match timeouts.peek() {
                    Some(registered) if registered.expires_at <= now => timeouts.pop(),
                    _ => None,
                }
            };
            let Some(expired) = expired else {
                break;
            };
            if let Some(pending) = self
                .registry
                .lock()
                .expect("registry lock poisoned")
                .remove(&expired.id)
            {
                let _ = pending.send(Reply::Timeout);
            }
        }
    }
}
