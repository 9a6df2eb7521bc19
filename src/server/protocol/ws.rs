use std::{collections::HashMap, sync::Arc};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Bytes, Message, Utf8Bytes},
};

use crate::api::schema::SchemaType;
use crate::server::ServerResult;
use crate::server::error::EmbersServerError;
use crate::server::protocol::{self, NetworkProtocol, SessionManager};
use crate::server::runtime::GameRuntimeAnyHandle;

pub struct WebSocketProtocol {
    pub addr: String,
    pub port: u16,
}

impl WebSocketProtocol {
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
        }
    }
}

impl NetworkProtocol for WebSocketProtocol {
    async fn run(
        self,
        session_manager: Arc<SessionManager>,
        handlers: &'static HashMap<&'static str, Box<dyn GameRuntimeAnyHandle>>,
    ) -> ServerResult {
        let listener = TcpListener::bind((self.addr.as_str(), self.port))
            .await
            .map_err(|_| EmbersServerError::StartFailure)?;
        log::info!("listening on {}:{}", self.addr, self.port);

        loop {
            let Ok((stream, peer)) = listener.accept().await else {
                continue;
            };
            let session_manager = Arc::clone(&session_manager);

            tokio::spawn(async move {
                let Ok(ws_stream) = accept_async(stream).await else {
                    return;
                };
                let (mut writer, mut reader) = ws_stream.split();
                let schema_type = session_manager.codec().schema_type();

                // credentials are checked before any room work happens
                let Some(Ok(first)) = reader.next().await else {
                    return;
                };
                let Some(buffer) = frame_bytes(first) else {
                    return;
                };
                let (player_context, mut outbound) =
                    match protocol::handshake(&buffer, &session_manager, handlers) {
                        Ok(connected) => connected,
                        Err(err) => {
                            log::info!("handshake rejected from {peer}: {err}");
                            let raw = session_manager.codec().encode_output(err.into());
                            if let Some(frame) = into_frame(raw, schema_type) {
                                let _ = writer.send(frame).await;
                            }
                            return;
                        }
                    };

                let writer_task = tokio::spawn(async move {
                    while let Some(raw) = outbound.recv().await {
                        let Some(frame) = into_frame(raw, schema_type) else {
                            continue;
                        };
                        if writer.send(frame).await.is_err() {
                            break;
                        }
                    }
                });

                while let Some(Ok(frame)) = reader.next().await {
                    let Some(buffer) = frame_bytes(frame) else {
                        continue;
                    };
                    if let Err(err) = protocol::process_message(
                        &buffer,
                        &player_context,
                        &session_manager,
                        handlers,
                    ) {
                        log::info!("closing {}: {err}", player_context.id());
                        break;
                    }
                }

                protocol::disconnect(player_context.id(), &session_manager, handlers);
                writer_task.abort();
            });
        }
    }
}

fn frame_bytes(message: Message) -> Option<Vec<u8>> {
    match message {
        Message::Binary(bytes) => Some(bytes.into()),
        Message::Text(bytes) => Some(Bytes::from(bytes).into()),
        _ => None,
    }
}

fn into_frame(raw: Vec<u8>, schema_type: SchemaType) -> Option<Message> {
    match schema_type {
        SchemaType::Text => Utf8Bytes::try_from(raw).ok().map(Message::Text),
        SchemaType::Binary => Some(Message::Binary(raw.into())),
    }
}
