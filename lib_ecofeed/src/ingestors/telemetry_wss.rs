//! # Telemetry WSS Connector
//!
//! WebSocket transport for the live telemetry stream.
//! Location: lib_ecofeed/src/ingestors/telemetry_wss.rs
//!
//! The connector only performs the handshake and translates tungstenite
//! messages into [`Frame`]s. Liveness, backoff and decoding all live in the
//! session, which is what lets them be tested without a socket.

use futures_util::{FutureExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use futures_util::future::BoxFuture;

use crate::errors::TransportError;
use crate::ingestors::transport::{Frame, FrameStream, StreamConnector};

/// Dials `ws://` and `wss://` endpoints with tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Creates a connector.
    pub fn new() -> Self {
        Self
    }
}

/// Maps one tungstenite read result onto the transport vocabulary.
/// Raw `Frame` messages never surface while reading and are skipped.
fn translate(msg: Result<Message, tokio_tungstenite::tungstenite::Error>) -> Option<Result<Frame, TransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
        Ok(Message::Binary(bin)) => Some(Ok(Frame::Binary(bin.to_vec()))),
        // Ping/Pong keep a quiet feed alive without carrying data.
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Some(Ok(Frame::Liveness)),
        // A normal close (1000) reconnects too; the feed is meant to run
        // until the caller closes it.
        Ok(Message::Close(reason)) => {
            tracing::info!("WSS stream closed by remote host: {:?}", reason);
            let code = reason.map(|frame| u16::from(frame.code));
            Some(Err(TransportError::Closed(code)))
        }
        Ok(Message::Frame(_)) => None,
        Err(e) => Some(Err(TransportError::Reset(e.to_string()))),
    }
}

impl StreamConnector for WsConnector {
    fn connect<'a>(&'a self, endpoint: &'a Url) -> BoxFuture<'a, Result<FrameStream, TransportError>> {
        async move {
            tracing::info!("Connecting to telemetry WSS: {}", endpoint);
            let (ws_stream, _response) = connect_async(endpoint.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            tracing::info!("Successfully connected to telemetry stream.");

            let frames = ws_stream.filter_map(|msg| async move { translate(msg) });
            Ok(frames.boxed())
        }
        .boxed()
    }
}
