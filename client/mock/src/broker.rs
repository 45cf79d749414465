//! STOMP broker over a plain WebSocket.
//!
//! Sessions must `CONNECT` with a bearer token the store issued, otherwise
//! they get an `ERROR` frame and are closed.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use models::stomp::{Command, Frame};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{debug, info, warn};

use crate::state::AppState;

struct Peer {
    outbound: mpsc::UnboundedSender<String>,
    subscriptions: HashMap<String, String>,
}

pub struct Broker {
    peers: Mutex<HashMap<u64, Peer>>,
    next_peer: AtomicU64,
    next_message: AtomicU64,
    kick: broadcast::Sender<()>,
    changed: Notify,
    connects: Mutex<Vec<Option<String>>>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        let (kick, _) = broadcast::channel(1);

        Self {
            peers: Mutex::new(HashMap::new()),
            next_peer: AtomicU64::new(0),
            next_message: AtomicU64::new(0),
            kick,
            changed: Notify::new(),
            connects: Mutex::new(Vec::new()),
        }
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<u64, Peer>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends `body` to every subscription on `destination`. Returns how many got it.
    pub fn publish(&self, destination: &str, body: &str) -> usize {
        let peers = self.peers();
        let mut delivered = 0;

        for peer in peers.values() {
            for (subscription, topic) in &peer.subscriptions {
                if topic != destination {
                    continue;
                }

                let message_id = self.next_message.fetch_add(1, Ordering::Relaxed);
                let frame = Frame::message(destination, subscription, &message_id.to_string(), body);

                if peer.outbound.send(frame.encode()).is_ok() {
                    delivered += 1;
                }
            }
        }

        debug!("Published to {destination}, {delivered} receivers");

        delivered
    }

    pub fn publish_json<T: Serialize>(&self, destination: &str, value: &T) -> usize {
        match serde_json::to_string(value) {
            Ok(body) => self.publish(destination, &body),
            Err(e) => {
                warn!("Failed to serialize message for {destination}: {e}");
                0
            }
        }
    }

    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.peers()
            .values()
            .flat_map(|peer| peer.subscriptions.values())
            .filter(|topic| *topic == destination)
            .count()
    }

    pub fn session_count(&self) -> usize {
        self.peers().len()
    }

    pub async fn wait_for_subscribers(&self, destination: &str, count: usize) {
        loop {
            let changed = self.changed.notified();

            if self.subscriber_count(destination) >= count {
                return;
            }

            changed.await;
        }
    }

    /// Closes every open session without a goodbye.
    pub fn drop_connections(&self) {
        info!("Dropping all broker sessions");

        let _ = self.kick.send(());
    }

    /// Token presented by each `CONNECT`, oldest first.
    pub fn connect_tokens(&self) -> Vec<Option<String>> {
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_connect(&self, token: Option<String>) {
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(token);
    }

    fn join(&self) -> (u64, mpsc::UnboundedReceiver<String>, broadcast::Receiver<()>) {
        let id = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let (outbound, inbox) = mpsc::unbounded_channel();

        self.peers().insert(
            id,
            Peer {
                outbound,
                subscriptions: HashMap::new(),
            },
        );
        self.changed.notify_waiters();

        (id, inbox, self.kick.subscribe())
    }

    fn subscribe(&self, peer: u64, subscription: &str, destination: &str) {
        if let Some(peer) = self.peers().get_mut(&peer) {
            peer.subscriptions
                .insert(subscription.to_string(), destination.to_string());
        }
        self.changed.notify_waiters();
    }

    fn unsubscribe(&self, peer: u64, subscription: &str) {
        if let Some(peer) = self.peers().get_mut(&peer) {
            peer.subscriptions.remove(subscription);
        }
        self.changed.notify_waiters();
    }

    fn leave(&self, peer: u64) {
        self.peers().remove(&peer);
        self.changed.notify_waiters();
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

async fn handle_session(mut socket: WebSocket, state: Arc<AppState>) {
    let Some(connect) = next_frame(&mut socket).await else {
        return;
    };

    if !matches!(connect.command, Command::Connect | Command::Stomp) {
        let _ = send(&mut socket, Frame::error("Expected CONNECT")).await;
        return;
    }

    let token = connect
        .get("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    state.broker.record_connect(token.clone());

    if !token.as_deref().is_some_and(|token| state.token_valid(token)) {
        warn!("Refusing broker session without a valid token");
        let _ = send(&mut socket, Frame::error("Unauthorized")).await;
        let _ = socket.close().await;
        return;
    }

    let connected = Frame::new(Command::Connected)
        .header("version", "1.2")
        .header("heart-beat", "0,0");
    if send(&mut socket, connected).await.is_err() {
        return;
    }

    let (peer, mut outbound, mut kicked) = state.broker.join();
    info!(peer, "Broker session opened");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => match Frame::parse(&text) {
                    Ok(Some(frame)) => {
                        if !handle_frame(&state, peer, frame) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let _ = send(&mut socket, Frame::error(&e.to_string())).await;
                        break;
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
            Some(text) = outbound.recv() => {
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            _ = kicked.recv() => break,
        }
    }

    state.broker.leave(peer);
    info!(peer, "Broker session closed");
}

/// Returns false when the client is done.
fn handle_frame(state: &AppState, peer: u64, frame: Frame) -> bool {
    match frame.command {
        Command::Subscribe => {
            if let (Some(id), Some(destination)) = (frame.get("id"), frame.get("destination")) {
                debug!(peer, "SUBSCRIBE {id} {destination}");
                state.broker.subscribe(peer, id, destination);
            }
            true
        }
        Command::Unsubscribe => {
            if let Some(id) = frame.get("id") {
                debug!(peer, "UNSUBSCRIBE {id}");
                state.broker.unsubscribe(peer, id);
            }
            true
        }
        Command::Disconnect => false,
        other => {
            debug!(peer, "Ignoring {other}");
            true
        }
    }
}

async fn next_frame(socket: &mut WebSocket) -> Option<Frame> {
    loop {
        match socket.recv().await? {
            Ok(Message::Text(text)) => match Frame::parse(&text) {
                Ok(Some(frame)) => return Some(frame),
                Ok(None) => {}
                Err(e) => {
                    warn!("Unreadable frame before CONNECT: {e}");
                    return None;
                }
            },
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

async fn send(socket: &mut WebSocket, frame: Frame) -> Result<(), axum::Error> {
    socket.send(Message::Text(frame.encode())).await
}
