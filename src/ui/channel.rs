//! UI channel adapter (§4.1): multiplexes the set of connected UI clients
//! behind a single broadcast sink and one inbound command stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use super::message::{Command, Message};

/// Per-client outbound queue depth. Bounded so one slow browser tab can't
/// stall the broadcast of every other client or the session loops that
/// call it.
const CLIENT_QUEUE_DEPTH: usize = 64;

pub type ClientId = u64;

/// Shared by every UI transport connection. Cloning is cheap (`Arc` inside);
/// construct once per process.
pub struct UiChannel {
    clients: Mutex<HashMap<ClientId, mpsc::Sender<Message>>>,
    next_id: AtomicU64,
    commands_tx: mpsc::UnboundedSender<(ClientId, Command)>,
}

impl UiChannel {
    /// Builds the adapter along with the receiving half of the inbound
    /// command stream, which the control plane drains.
    pub fn new() -> (UiChannel, mpsc::UnboundedReceiver<(ClientId, Command)>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        (
            UiChannel {
                clients: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                commands_tx,
            },
            commands_rx,
        )
    }

    /// Registers a new client and returns its id plus the receiving half of
    /// its outbound queue; the transport task should forward everything
    /// from that receiver onto the client's socket.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        self.clients.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, id: ClientId) {
        self.clients.lock().unwrap().remove(&id);
    }

    /// Sends `message` to a single client, e.g. a `hello` reply. Silently
    /// dropped if the client is gone or its queue is full.
    pub fn send_to(&self, id: ClientId, message: Message) {
        if let Some(tx) = self.clients.lock().unwrap().get(&id) {
            let _ = tx.try_send(message);
        }
    }

    /// Fans `message` out to every connected client. A full or closed
    /// client queue is silently skipped — the transport decides when to
    /// close a dead connection, not the broadcaster.
    pub fn broadcast(&self, message: Message) {
        let clients = self.clients.lock().unwrap();
        for tx in clients.values() {
            let _ = tx.try_send(message.clone());
        }
    }

    /// Called by a transport task when it receives a command from its client.
    pub fn submit(&self, id: ClientId, command: Command) {
        let _ = self.commands_tx.send((id, command));
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}
