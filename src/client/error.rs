use std::error::Error;
use std::fmt::Display;

#[derive(Debug, PartialEq)]
pub enum EmbersClientError {
    ConnectionFailure,
    NotRunning,
    RoomNotFound,
    /// The join was answered with a failure; the server's reason, if any.
    JoinRejected(Option<String>),
    /// Spectator seats and finished rooms do not accept inputs.
    InputRejected,
    NoResponse,
    UnknownMessage,
}

impl Display for EmbersClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbersClientError::ConnectionFailure => f.write_str("connection failure"),
            EmbersClientError::NotRunning => f.write_str("client is not running"),
            EmbersClientError::RoomNotFound => f.write_str("room not found"),
            EmbersClientError::JoinRejected(Some(reason)) => {
                write!(f, "join rejected: {reason}")
            }
            EmbersClientError::JoinRejected(None) => f.write_str("join rejected"),
            EmbersClientError::InputRejected => {
                f.write_str("this seat does not accept inputs")
            }
            EmbersClientError::NoResponse => f.write_str("no response from the server"),
            EmbersClientError::UnknownMessage => f.write_str("unknown message"),
        }
    }
}

impl Error for EmbersClientError {}
