//! # Realtime
//!
//! Live updates from the broker, one typed stream per topic.
//!
//! ## Connection
//! - One socket per [`RealtimeClient`], shared by all of its subscriptions
//! - Opened lazily by the first [`RealtimeClient::subscribe`], closed when the last
//!   [`Subscription`] is dropped or closed
//! - `CONNECT` carries `Authorization: Bearer ..` read at every (re)connect, so
//!   [`RealtimeClient::set_token`] takes effect on the next connect
//! - Lost connections are retried after a fixed delay and every live
//!   subscription is sent again
//!
//! ## Delivery
//! - Frames for one subscription reach its stream in socket order, one item per frame
//! - Bodies that do not parse as the stream's type are logged and skipped
//! - Transport problems are logged, never handed to the consumer
use std::{
    collections::{HashMap, HashSet},
    marker::PhantomData,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    task::{Context, Poll},
    time::Duration,
};

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, Stream, StreamExt,
};
use models::stomp::{Command as FrameCommand, Frame};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::sleep,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;

pub use models::topics::{ALERTS, ALERTS_DELETED, GRIEVANCES};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Sink = SplitSink<Socket, Message>;
type Source = SplitStream<Socket>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Expected CONNECTED, got {0}")]
    Handshake(FrameCommand),

    #[error("Connection closed")]
    Closed,
}

enum Command {
    Subscribe(String),
    Unsubscribe(String),
}

struct Route {
    topic: String,
    sender: UnboundedSender<String>,
}

#[derive(Default)]
struct Registry {
    routes: HashMap<String, Route>,
    /// Present while a connection task runs. Dropping it deactivates the task.
    commands: Option<UnboundedSender<Command>>,
}

struct Shared {
    url: Url,
    reconnect_delay: Duration,
    token: Mutex<Option<String>>,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn topic_of(&self, id: &str) -> Option<String> {
        self.registry()
            .routes
            .get(id)
            .map(|route| route.topic.clone())
    }

    fn live_routes(&self) -> Vec<(String, String)> {
        self.registry()
            .routes
            .iter()
            .map(|(id, route)| (id.clone(), route.topic.clone()))
            .collect()
    }
}

#[derive(Clone)]
pub struct RealtimeClient {
    shared: Arc<Shared>,
}

impl RealtimeClient {
    pub fn new(url: Url, reconnect_delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                url,
                reconnect_delay,
                token: Mutex::new(None),
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ws_url.clone(), config.reconnect_delay)
    }

    /// Used from the next (re)connect on; an open connection is left alone.
    pub fn set_token(&self, token: Option<String>) {
        *self
            .shared
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Must be called inside a tokio runtime; the first subscription spawns the connection task.
    pub fn subscribe<T: DeserializeOwned>(&self, topic: &str) -> Subscription<T> {
        let id = format!("sub-{}", self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut registry = self.shared.registry();
        registry.routes.insert(
            id.clone(),
            Route {
                topic: topic.to_string(),
                sender,
            },
        );

        let delivered = registry
            .commands
            .as_ref()
            .is_some_and(|commands| commands.send(Command::Subscribe(id.clone())).is_ok());

        if !delivered {
            info!("Activating realtime connection to {}", self.shared.url);

            let (commands, inbox) = mpsc::unbounded_channel();
            registry.commands = Some(commands);
            tokio::spawn(run(self.shared.clone(), inbox));
        }

        debug!("Subscribed {id} to {topic}");

        Subscription {
            id,
            topic: topic.to_string(),
            receiver,
            shared: self.shared.clone(),
            closed: false,
            _event: PhantomData,
        }
    }

    /// Whether a connection task is running (connected or waiting to reconnect).
    pub fn is_active(&self) -> bool {
        self.shared.registry().commands.is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.registry().routes.len()
    }
}

/// Typed events from one topic. Ends only after [`Subscription::close`].
pub struct Subscription<T> {
    id: String,
    topic: String,
    receiver: UnboundedReceiver<String>,
    shared: Arc<Shared>,
    closed: bool,
    _event: PhantomData<fn() -> T>,
}

impl<T> Subscription<T> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Unsubscribes, deactivating the connection if this was the last subscription. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.receiver.close();

        let mut registry = self.shared.registry();
        if registry.routes.remove(&self.id).is_none() {
            return;
        }

        if registry.routes.is_empty() {
            if registry.commands.take().is_some() {
                info!("No subscriptions left, deactivating realtime connection");
            }
        } else if let Some(commands) = &registry.commands {
            let _ = commands.send(Command::Unsubscribe(self.id.clone()));
        }

        debug!("Closed {} on {}", self.id, self.topic);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: DeserializeOwned> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();

        loop {
            match this.receiver.poll_recv(cx) {
                Poll::Ready(Some(body)) => match serde_json::from_str(&body) {
                    Ok(event) => return Poll::Ready(Some(event)),
                    Err(e) => warn!(topic = %this.topic, "Dropping malformed payload: {e}"),
                },
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

async fn run(shared: Arc<Shared>, mut commands: UnboundedReceiver<Command>) {
    loop {
        match connection(&shared, &mut commands).await {
            Ok(()) => {
                info!("Realtime connection deactivated");
                return;
            }
            Err(TransportError::Broker(message)) => error!("Broker reported error: {message}"),
            Err(e) => warn!("Realtime connection lost: {e}"),
        }

        let retry = sleep(shared.reconnect_delay);
        tokio::pin!(retry);

        // Subscriptions made while offline are picked up from the registry on reconnect.
        loop {
            tokio::select! {
                _ = &mut retry => break,
                command = commands.recv() => {
                    if command.is_none() {
                        info!("Realtime connection deactivated while offline");
                        return;
                    }
                }
            }
        }

        info!("Reconnecting to {}", shared.url);
    }
}

/// Runs one socket session. `Ok` means the client deactivated it.
async fn connection(
    shared: &Shared,
    commands: &mut UnboundedReceiver<Command>,
) -> Result<(), TransportError> {
    let (socket, _) = connect_async(shared.url.as_str()).await?;
    let (mut sink, mut source) = socket.split();

    let host = shared.url.host_str().unwrap_or("localhost");
    let token = shared.token();
    send(&mut sink, Frame::connect(host, token.as_deref())).await?;

    let reply = next_frame(&mut source).await?;
    match reply.command {
        FrameCommand::Connected => info!("Realtime connected to {}", shared.url),
        FrameCommand::Error => return Err(broker_error(&reply)),
        other => return Err(TransportError::Handshake(other)),
    }

    // Commands queued before this point may repeat ids already subscribed here.
    let mut subscribed = HashSet::new();
    for (id, topic) in shared.live_routes() {
        send(&mut sink, Frame::subscribe(&id, &topic)).await?;
        subscribed.insert(id);
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Subscribe(id)) => {
                    if subscribed.contains(&id) {
                        continue;
                    }
                    if let Some(topic) = shared.topic_of(&id) {
                        send(&mut sink, Frame::subscribe(&id, &topic)).await?;
                        subscribed.insert(id);
                    }
                }
                Some(Command::Unsubscribe(id)) => {
                    if subscribed.remove(&id) {
                        send(&mut sink, Frame::unsubscribe(&id)).await?;
                    }
                }
                None => {
                    let _ = send(&mut sink, Frame::disconnect()).await;
                    let _ = sink.close().await;
                    return Ok(());
                }
            },
            frame = next_frame(&mut source) => dispatch(shared, frame?)?,
        }
    }
}

fn dispatch(shared: &Shared, frame: Frame) -> Result<(), TransportError> {
    match frame.command {
        FrameCommand::Message => {
            let Some(id) = frame.get("subscription").map(str::to_string) else {
                warn!("Dropping MESSAGE without subscription header");
                return Ok(());
            };

            let registry = shared.registry();
            match registry.routes.get(&id) {
                Some(route) => {
                    let _ = route.sender.send(frame.body);
                }
                None => debug!("Dropping message for closed {id}"),
            }

            Ok(())
        }
        FrameCommand::Error => Err(broker_error(&frame)),
        other => {
            debug!("Ignoring {other} frame");
            Ok(())
        }
    }
}

fn broker_error(frame: &Frame) -> TransportError {
    let message = frame.get("message").unwrap_or("unknown");

    if frame.body.is_empty() {
        TransportError::Broker(message.to_string())
    } else {
        TransportError::Broker(format!("{message} ({})", frame.body))
    }
}

async fn send(sink: &mut Sink, frame: Frame) -> Result<(), TransportError> {
    sink.send(Message::Text(frame.encode())).await?;

    Ok(())
}

/// Skips heart-beats, control messages and frames that fail to decode.
async fn next_frame(source: &mut Source) -> Result<Frame, TransportError> {
    loop {
        let message = source.next().await.ok_or(TransportError::Closed)??;

        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Close(_) => return Err(TransportError::Closed),
            _ => continue,
        };

        match Frame::parse(&text) {
            Ok(Some(frame)) => return Ok(frame),
            Ok(None) => {}
            Err(e) => warn!("Skipping undecodable frame: {e}"),
        }
    }
}
