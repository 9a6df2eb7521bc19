use std::collections::{HashMap, VecDeque};

use crate::api::message::InputPackage;

/// Per-player pending input queues on the server side.
///
/// Guarantees: inputs from one player apply in `seq` order and a seq at or
/// below the last applied one is discarded; queues drain round-robin across
/// players so no single sender starves the others.
#[derive(Debug, Default)]
pub struct InputRouter {
    queues: HashMap<u64, VecDeque<InputPackage>>,
    last_applied: HashMap<u64, u64>,
}

impl InputRouter {
    /// Queues a package for the next apply pass. Returns false when the seq
    /// is stale and the package was dropped.
    pub fn enqueue(&mut self, player: u64, package: InputPackage) -> bool {
        let floor = self
            .queues
            .get(&player)
            .and_then(|queue| queue.back().map(|p| p.seq))
            .unwrap_or_else(|| self.last_applied(player));
        if package.seq <= floor {
            log::trace!(
                "dropping stale input from {player}: seq {} <= {floor}",
                package.seq
            );
            return false;
        }
        self.queues.entry(player).or_default().push_back(package);
        true
    }

    /// Validates and immediately marks one package applied; the event-driven
    /// path, where there is no tick to wait for.
    pub fn accept(&mut self, player: u64, package: InputPackage) -> Option<InputPackage> {
        if package.seq <= self.last_applied(player) {
            return None;
        }
        self.last_applied.insert(player, package.seq);
        Some(package)
    }

    /// Drains every queue, one package per player per round, in the given
    /// player order. Packages are marked applied as they are handed out.
    pub fn drain_round_robin(&mut self, order: &[u64]) -> Vec<(u64, InputPackage)> {
        let mut drained = Vec::new();
        loop {
            let mut any = false;
            for &player in order {
                if let Some(queue) = self.queues.get_mut(&player)
                    && let Some(package) = queue.pop_front()
                {
                    self.last_applied.insert(player, package.seq);
                    drained.push((player, package));
                    any = true;
                }
            }
            if !any {
                break;
            }
        }
        drained
    }

    pub fn last_applied(&self, player: u64) -> u64 {
        self.last_applied.get(&player).copied().unwrap_or(0)
    }

    pub fn pending(&self, player: u64) -> usize {
        self.queues.get(&player).map(VecDeque::len).unwrap_or(0)
    }

    pub fn remove_player(&mut self, player: u64) {
        self.queues.remove(&player);
        self.last_applied.remove(&player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(seq: u64) -> InputPackage {
        InputPackage {
            seq,
            timestamp: seq * 10,
            data: serde_json::json!({ "n": seq }),
        }
    }

    #[test]
    fn stale_seq_is_discarded() {
        let mut router = InputRouter::default();
        assert!(router.enqueue(1, package(1)));
        assert!(router.enqueue(1, package(2)));
        assert!(!router.enqueue(1, package(2)));
        assert!(!router.enqueue(1, package(1)));
        assert_eq!(router.pending(1), 2);
    }

    #[test]
    fn drain_interleaves_players_round_robin() {
        let mut router = InputRouter::default();
        router.enqueue(1, package(1));
        router.enqueue(1, package(2));
        router.enqueue(2, package(1));

        let drained = router.drain_round_robin(&[1, 2]);
        let order: Vec<u64> = drained.iter().map(|(player, _)| *player).collect();
        assert_eq!(order, vec![1, 2, 1]);
        assert_eq!(router.last_applied(1), 2);
        assert_eq!(router.last_applied(2), 1);
        assert_eq!(router.pending(1), 0);
    }

    #[test]
    fn seq_stays_monotonic_after_drain() {
        let mut router = InputRouter::default();
        router.enqueue(3, package(5));
        router.drain_round_robin(&[3]);
        assert!(!router.enqueue(3, package(5)));
        assert!(router.enqueue(3, package(6)));
    }

    #[test]
    fn accept_marks_applied_immediately() {
        let mut router = InputRouter::default();
        assert!(router.accept(7, package(1)).is_some());
        assert!(router.accept(7, package(1)).is_none());
        assert_eq!(router.last_applied(7), 1);
    }
}
