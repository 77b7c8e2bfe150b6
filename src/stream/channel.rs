//! Transport for the streaming channel.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::{ClientMessage, StreamEvent, SubscriptionRequest, TopicFilter};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("subscribe rejected for {topic}: {reason}")]
    SubscribeRejected { topic: String, reason: String },

    #[error("no active registration with id {0}")]
    NotRegistered(String),

    #[error("channel closed before confirmation")]
    Closed,
}

/// Request surface of the streaming channel.
///
/// Completion of `subscribe` means the request reached the channel; the
/// actual creation or rejection arrives later as a `subscriptionsCreated`
/// event.
#[async_trait]
pub trait StreamChannel: Send + Sync {
    async fn subscribe(
        &self,
        api_key: Option<String>,
        topics: Vec<String>,
    ) -> Result<(), StreamError>;

    async fn unsubscribe(&self, api_key: Option<String>, topic: String)
        -> Result<(), StreamError>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// WebSocket-backed channel.
pub struct WsChannel {
    sink: Mutex<WsSink>,
}

impl WsChannel {
    /// Connects and returns the channel together with the stream of decoded
    /// server events. A background task owns the read half; it stops when
    /// the connection drops or the receiver is gone.
    pub async fn connect(
        url: &str,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<StreamEvent>), StreamError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| StreamError::Connection(e.to_string()))?;
        let (sink, mut source) = ws.split();
        let (events, receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match StreamEvent::decode(&text) {
                        Ok(event) => {
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "undecodable stream frame"),
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!("stream connection closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = events.send(StreamEvent::Error {
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
        });

        Ok((Arc::new(Self { sink: Mutex::new(sink) }), receiver))
    }

    async fn send(&self, message: &ClientMessage) -> Result<(), StreamError> {
        let text = message
            .encode()
            .map_err(|e| StreamError::Encode(e.to_string()))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| StreamError::WebSocket(e.to_string()))
    }
}

#[async_trait]
impl StreamChannel for WsChannel {
    async fn subscribe(
        &self,
        api_key: Option<String>,
        topics: Vec<String>,
    ) -> Result<(), StreamError> {
        self.send(&ClientMessage::CreateSubscriptions {
            subscriptions: vec![SubscriptionRequest { api_key, topics }],
        })
        .await
    }

    async fn unsubscribe(
        &self,
        api_key: Option<String>,
        topic: String,
    ) -> Result<(), StreamError> {
        self.send(&ClientMessage::DeleteSubscriptions {
            subscriptions: vec![TopicFilter { api_key, topic }],
        })
        .await
    }
}

/// Builds the WebSocket URL for a configured stream endpoint, converting
/// http(s) schemes if needed.
pub fn ws_url(base: &str) -> String {
    if base.starts_with("http://") {
        base.replacen("http://", "ws://", 1)
    } else if base.starts_with("https://") {
        base.replacen("https://", "wss://", 1)
    } else if !base.starts_with("ws://") && !base.starts_with("wss://") {
        format!("wss://{}", base)
    } else {
        base.to_string()
    }
}

/// Records requests instead of sending them; for tests.
#[derive(Default)]
pub struct MockChannel {
    subscribes: std::sync::Mutex<Vec<(Option<String>, Vec<String>)>>,
    unsubscribes: std::sync::Mutex<Vec<(Option<String>, String)>>,
    fail_unsubscribe: std::sync::atomic::AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_unsubscribe(&self) {
        self.fail_unsubscribe
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn subscribes(&self) -> Vec<(Option<String>, Vec<String>)> {
        self.subscribes.lock().unwrap().clone()
    }

    pub fn unsubscribes(&self) -> Vec<(Option<String>, String)> {
        self.unsubscribes.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamChannel for MockChannel {
    async fn subscribe(
        &self,
        api_key: Option<String>,
        topics: Vec<String>,
    ) -> Result<(), StreamError> {
        self.subscribes.lock().unwrap().push((api_key, topics));
        Ok(())
    }

    async fn unsubscribe(
        &self,
        api_key: Option<String>,
        topic: String,
    ) -> Result<(), StreamError> {
        if self.fail_unsubscribe.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StreamError::WebSocket("mock unsubscribe failure".to_string()));
        }
        self.unsubscribes.lock().unwrap().push((api_key, topic));
        Ok(())
    }
}
