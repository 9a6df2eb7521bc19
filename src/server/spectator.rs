/// How a room decides whether a joining visitor plays or watches. Spectators
/// receive every snapshot but never contribute inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SpectatorMode {
    /// The embedding host decides, via the `spectate` handshake key.
    #[default]
    Manual,
    /// Visitors outside the configured play zone watch. The host reports the
    /// visitor's zone in the handshake; a visitor with no reported zone is
    /// treated as outside.
    Zone { play_zone: String },
    /// Joiners beyond `max_players` watch.
    Overflow,
}

impl SpectatorMode {
    pub fn classify(
        &self,
        requested: bool,
        zone: Option<&str>,
        current_players: usize,
        max_players: usize,
    ) -> bool {
        match self {
            SpectatorMode::Manual => requested,
            SpectatorMode::Zone { play_zone } => zone != Some(play_zone.as_str()),
            SpectatorMode::Overflow => current_players >= max_players,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_follows_the_request_flag() {
        let mode = SpectatorMode::Manual;
        assert!(!mode.classify(false, None, 0, 4));
        assert!(mode.classify(true, None, 0, 4));
    }

    #[test]
    fn zone_spectates_everyone_outside_the_play_zone() {
        let mode = SpectatorMode::Zone {
            play_zone: "arena".to_string(),
        };
        assert!(!mode.classify(false, Some("arena"), 0, 4));
        assert!(mode.classify(false, Some("lobby"), 0, 4));
        assert!(mode.classify(false, None, 0, 4));
    }

    #[test]
    fn overflow_spectates_past_the_player_cap() {
        let mode = SpectatorMode::Overflow;
        assert!(!mode.classify(false, None, 3, 4));
        assert!(mode.classify(false, None, 4, 4));
        assert!(mode.classify(false, None, 9, 4));
    }
}
