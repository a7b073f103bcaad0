//! Callback dispatch for state-changing player operations.
//!
//! Callbacks run synchronously on the thread that issued the operation,
//! immediately after the corresponding remote call succeeds. Nothing is
//! awaited from listeners. An async subscription over the same events is
//! available as a broadcast stream.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

/// A state transition reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// Playback was started
    Play,

    /// Playback was paused
    Pause,

    /// Playback was stopped
    Stop,

    /// A relative seek was issued, offset in seconds
    Seek(f64),

    /// An absolute position was set, position in seconds
    PositionChanged(f64),
}

impl PlayerEvent {
    /// The subscription key this event is dispatched under.
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::Play => EventKind::Play,
            PlayerEvent::Pause => EventKind::Pause,
            PlayerEvent::Stop => EventKind::Stop,
            PlayerEvent::Seek(_) => EventKind::Seek,
            PlayerEvent::PositionChanged(_) => EventKind::PositionChanged,
        }
    }
}

/// Subscription key for [`PlayerEvent`] callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`PlayerEvent::Play`]
    Play,

    /// [`PlayerEvent::Pause`]
    Pause,

    /// [`PlayerEvent::Stop`]
    Stop,

    /// [`PlayerEvent::Seek`]
    Seek,

    /// [`PlayerEvent::PositionChanged`]
    PositionChanged,
}

/// Token identifying a registered callback, used to unregister it.
///
/// Closures are not comparable, so unsubscription is by token rather than
/// by the callback itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Callback = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;

/// Observer list firing registered callbacks on player state transitions.
pub struct EventChannel {
    handlers: Mutex<Vec<(HandlerId, EventKind, Callback)>>,
    next_id: AtomicU64,
    broadcast_tx: broadcast::Sender<PlayerEvent>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(64);
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            broadcast_tx,
        }
    }

    /// Register a callback for one event kind.
    pub fn on(&self, kind: EventKind, callback: impl Fn(&PlayerEvent) + Send + Sync + 'static) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.handlers.lock() {
            Ok(mut handlers) => handlers.push((id, kind, Arc::new(callback))),
            Err(_) => warn!("event handler list poisoned; callback not registered"),
        }
        id
    }

    /// Remove a previously registered callback.
    ///
    /// Returns whether a callback was removed.
    pub fn off(&self, id: HandlerId) -> bool {
        let Ok(mut handlers) = self.handlers.lock() else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _, _)| *handler_id != id);
        handlers.len() != before
    }

    /// Number of registered callbacks.
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().map(|handlers| handlers.len()).unwrap_or(0)
    }

    /// Subscribe to events as an async stream.
    pub fn subscribe(&self) -> BroadcastStream<PlayerEvent> {
        BroadcastStream::new(self.broadcast_tx.subscribe())
    }

    /// Fire all callbacks registered for this event's kind.
    ///
    /// The handler list is snapshotted before invocation, so callbacks may
    /// register or remove handlers without deadlocking.
    pub fn emit(&self, event: PlayerEvent) {
        let matching: Vec<Callback> = match self.handlers.lock() {
            Ok(handlers) => handlers
                .iter()
                .filter(|(_, kind, _)| *kind == event.kind())
                .map(|(_, _, callback)| callback.clone())
                .collect(),
            Err(_) => {
                warn!("event handler list poisoned; skipping dispatch");
                return;
            }
        };

        for callback in matching {
            callback(&event);
        }

        // No listeners is fine.
        let _ = self.broadcast_tx.send(event);
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("handlers", &self.handler_count())
            .finish()
    }
}
