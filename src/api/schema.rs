use std::sync::Arc;

use crate::api::error::EmbersError;
use crate::api::message::{InputMessage, OutputMessage};

pub mod json;

/// A wire encoding. The transport layer only needs to know whether frames are
/// text or binary; everything else lives in the `Serialize`/`Deserialize`
/// impls for the concrete schema.
pub trait Schema: Send + Sync + 'static {
    fn schema_type() -> SchemaType;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    Text,
    Binary,
}

pub trait Serialize<S>
where
    S: Schema,
    Self: Sized,
{
    fn serialize(self) -> Vec<u8>;
}

pub trait Deserialize<S>
where
    S: Schema,
    Self: Sized,
{
    fn deserialize(buf: &[u8]) -> Result<Self, EmbersError>;
}

/// Object-safe bridge over a `Schema`, so rooms and session plumbing can stay
/// non-generic while the server/client builders keep the schema type
/// parameter at their surface.
pub trait Codec: Send + Sync {
    fn schema_type(&self) -> SchemaType;
    fn encode_output(&self, message: OutputMessage) -> Vec<u8>;
    fn decode_output(&self, buf: &[u8]) -> Result<OutputMessage, EmbersError>;
    fn encode_input(&self, message: InputMessage) -> Vec<u8>;
    fn decode_input(&self, buf: &[u8]) -> Result<InputMessage, EmbersError>;
}

pub struct SchemaCodec<S: Schema> {
    _marker: std::marker::PhantomData<S>,
}

impl<S: Schema> SchemaCodec<S> {
    pub fn shared() -> Arc<dyn Codec>
    where
        InputMessage: Serialize<S> + Deserialize<S>,
        OutputMessage: Serialize<S> + Deserialize<S>,
    {
        Arc::new(Self {
            _marker: std::marker::PhantomData,
        })
    }
}

impl<S> Codec for SchemaCodec<S>
where
    S: Schema,
    InputMessage: Serialize<S> + Deserialize<S>,
    OutputMessage: Serialize<S> + Deserialize<S>,
{
    fn schema_type(&self) -> SchemaType {
        S::schema_type()
    }

    fn encode_output(&self, message: OutputMessage) -> Vec<u8> {
        <OutputMessage as Serialize<S>>::serialize(message)
    }

    fn decode_output(&self, buf: &[u8]) -> Result<OutputMessage, EmbersError> {
        <OutputMessage as Deserialize<S>>::deserialize(buf)
    }

    fn encode_input(&self, message: InputMessage) -> Vec<u8> {
        <InputMessage as Serialize<S>>::serialize(message)
    }

    fn decode_input(&self, buf: &[u8]) -> Result<InputMessage, EmbersError> {
        <InputMessage as Deserialize<S>>::deserialize(buf)
    }
}
