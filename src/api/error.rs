use std::error::Error;
use std::fmt::Display;

use crate::api::message::OutputMessage;

/// Errors shared by both halves of the wire.
#[derive(Debug, PartialEq)]
pub enum EmbersError {
    DeserializationFailure,
    UnknownMessage,
}

impl Display for EmbersError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbersError::DeserializationFailure => f.write_str("message could not be decoded"),
            EmbersError::UnknownMessage => f.write_str("unknown message method"),
        }
    }
}

impl Error for EmbersError {}

impl From<EmbersError> for OutputMessage {
    fn from(val: EmbersError) -> Self {
        OutputMessage::Error {
            description: val.to_string(),
            retryable: false,
        }
    }
}
