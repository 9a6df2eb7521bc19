use std::error::Error;
use std::fmt::Display;

use crate::api::credentials::CredentialsError;
use crate::api::message::OutputMessage;

#[derive(Debug)]
pub enum EmbersServerError {
    StartFailure,
    /// The first message on a connection was not a handshake.
    MessageNotHandshake,
    Credential(CredentialsError),
    /// Malformed frame after the handshake; the connection is closed.
    Protocol,
    GameTypeNotFound,
    /// Process-wide room cap reached; the client may retry later.
    RoomLimitReached,
    ConnectionFailure,
}

impl Display for EmbersServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbersServerError::StartFailure => f.write_str("server failed to start"),
            EmbersServerError::MessageNotHandshake => {
                f.write_str("expected a handshake as the first message")
            }
            EmbersServerError::Credential(err) => write!(f, "invalid credentials: {err}"),
            EmbersServerError::Protocol => f.write_str("malformed message"),
            EmbersServerError::GameTypeNotFound => f.write_str("unknown game type"),
            EmbersServerError::RoomLimitReached => {
                f.write_str("room limit reached, retry later")
            }
            EmbersServerError::ConnectionFailure => f.write_str("connection failure"),
        }
    }
}

impl Error for EmbersServerError {}

impl From<CredentialsError> for EmbersServerError {
    fn from(err: CredentialsError) -> Self {
        EmbersServerError::Credential(err)
    }
}

impl From<EmbersServerError> for OutputMessage {
    fn from(val: EmbersServerError) -> Self {
        let retryable = matches!(val, EmbersServerError::RoomLimitReached);
        OutputMessage::Error {
            description: val.to_string(),
            retryable,
        }
    }
}
