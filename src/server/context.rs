use std::collections::HashMap;

use crate::api::credentials::{Credentials, CredentialsError};

/// Everything the transport learned about a connection at handshake time.
/// Immutable for the life of the connection.
#[derive(Debug)]
pub struct PlayerContext {
    id: u64,
    credentials: Credentials,
    /// Spatial zone reported by the embedding host, when it has one.
    zone: Option<String>,
    /// The host asked for a read-only seat (manual spectator mode).
    spectate_requested: bool,
}

impl PlayerContext {
    pub fn from_handshake(map: &HashMap<String, String>) -> Result<Self, CredentialsError> {
        let credentials = Credentials::from_query(map)?;
        Ok(Self {
            id: credentials.session_id(),
            zone: map.get("zone").cloned(),
            spectate_requested: map.get("spectate").is_some_and(|v| v == "true"),
            credentials,
        })
    }

    pub fn new(credentials: Credentials) -> Self {
        Self {
            id: credentials.session_id(),
            credentials,
            zone: None,
            spectate_requested: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn display_name(&self) -> &str {
        &self.credentials.display_name
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    pub fn spectate_requested(&self) -> bool {
        self.spectate_requested
    }
}
