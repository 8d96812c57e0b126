//! Event broadcasting for AudioSND
//!
//! `EventManager` fans each published event out to the listeners of its
//! channel on a background task pool. Listener failures (errors or panics)
//! are logged and never reach the publisher. Async consumers can also
//! `watch()` the raw event stream through a tokio broadcast channel.

mod channel;

pub use channel::{ChannelType, SndEvent};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Default capacity of the async watch channel
pub const DEFAULT_WATCH_CAPACITY: usize = 256;

const POOL_THREADS: usize = 2;

/// Receives events published on the manager.
pub trait EventListener: Send + Sync {
    /// Channel this listener is interested in; `None` receives every channel.
    fn channel(&self) -> Option<ChannelType> {
        None
    }

    /// Handle one event. Errors are logged by the manager.
    fn on_event(&self, event: &SndEvent) -> std::result::Result<(), String>;
}

/// Minimal publishing interface handed to components that only emit events
pub trait EventSink: Send + Sync {
    fn publish(&self, channel: ChannelType, payload: serde_json::Value);
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

type ListenerList = Arc<Vec<(ListenerId, Arc<dyn EventListener>)>>;

/// Owned runtime or borrowed handle used to run listener tasks
enum TaskPool {
    Owned(Option<Runtime>),
    Borrowed(Handle),
}

impl TaskPool {
    fn handle(&self) -> Option<Handle> {
        match self {
            TaskPool::Owned(rt) => rt.as_ref().map(|rt| rt.handle().clone()),
            TaskPool::Borrowed(handle) => Some(handle.clone()),
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Runtime::drop blocks and panics inside async contexts
        if let TaskPool::Owned(rt) = self {
            if let Some(rt) = rt.take() {
                rt.shutdown_background();
            }
        }
    }
}

/// Copy-on-write listener registry with parallel fan-out
pub struct EventManager {
    listeners: RwLock<ListenerList>,
    pool: TaskPool,
    tx: broadcast::Sender<SndEvent>,
}

impl EventManager {
    /// Create a manager with its own background task pool
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(POOL_THREADS)
            .thread_name("snd-events")
            .enable_all()
            .build()?;
        Ok(Self::with_pool(TaskPool::Owned(Some(runtime))))
    }

    /// Create a manager that schedules listener tasks on an existing runtime
    pub fn with_handle(handle: Handle) -> Self {
        Self::with_pool(TaskPool::Borrowed(handle))
    }

    fn with_pool(pool: TaskPool) -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_WATCH_CAPACITY);
        Self {
            listeners: RwLock::new(Arc::new(Vec::new())),
            pool,
            tx,
        }
    }

    /// Register a listener
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        let mut guard = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let mut next: Vec<_> = guard.as_ref().clone();
        next.push((id, listener));
        *guard = Arc::new(next);
        debug!("Listener subscribed ({} total)", guard.len());
        id
    }

    /// Remove a listener. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        let next: Vec<_> = guard
            .iter()
            .filter(|(lid, _)| *lid != id)
            .cloned()
            .collect();
        let removed = next.len() != before;
        *guard = Arc::new(next);
        removed
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Subscribe to the raw event stream (lossy for slow receivers)
    pub fn watch(&self) -> broadcast::Receiver<SndEvent> {
        self.tx.subscribe()
    }

    /// Publish an event on a channel.
    ///
    /// Each matching listener runs on its own pool task; ordering between
    /// listeners is not guaranteed.
    pub fn broadcast(&self, channel: ChannelType, payload: serde_json::Value) {
        let event = SndEvent::new(channel, payload);

        // No receivers is fine
        let _ = self.tx.send(event.clone());

        let Some(handle) = self.pool.handle() else {
            warn!("Event pool unavailable, dropping {} event", channel);
            return;
        };

        for (_, listener) in self.snapshot().iter() {
            if listener.channel().is_some_and(|c| c != channel) {
                continue;
            }
            let listener = Arc::clone(listener);
            let event = event.clone();
            handle.spawn_blocking(move || {
                match catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Listener failed on {}: {}", event.channel, e),
                    Err(_) => error!("Listener panicked on {}", event.channel),
                }
            });
        }
    }

    fn snapshot(&self) -> ListenerList {
        Arc::clone(&self.listeners.read().unwrap_or_else(|e| e.into_inner()))
    }
}

impl EventSink for EventManager {
    fn publish(&self, channel: ChannelType, payload: serde_json::Value) {
        self.broadcast(channel, payload);
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    struct ChannelListener {
        filter: Option<ChannelType>,
        tx: std::sync::Mutex<mpsc::Sender<ChannelType>>,
    }

    impl EventListener for ChannelListener {
        fn channel(&self) -> Option<ChannelType> {
            self.filter
        }

        fn on_event(&self, event: &SndEvent) -> std::result::Result<(), String> {
            let _ = self.tx.lock().unwrap().send(event.channel);
            Ok(())
        }
    }

    fn listener(filter: Option<ChannelType>) -> (Arc<ChannelListener>, mpsc::Receiver<ChannelType>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(ChannelListener {
                filter,
                tx: std::sync::Mutex::new(tx),
            }),
            rx,
        )
    }

    #[test]
    fn test_listener_filters_by_channel() {
        let manager = EventManager::new().unwrap();
        let (l, rx) = listener(Some(ChannelType::TrackPlayStopped));
        manager.subscribe(l);

        manager.broadcast(ChannelType::TrackPlayStarted, serde_json::Value::Null);
        manager.broadcast(ChannelType::TrackPlayStopped, serde_json::Value::Null);

        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, ChannelType::TrackPlayStopped);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_failing_listener_does_not_affect_others() {
        struct Panicking;
        impl EventListener for Panicking {
            fn on_event(&self, _: &SndEvent) -> std::result::Result<(), String> {
                panic!("listener bug");
            }
        }
        struct Failing;
        impl EventListener for Failing {
            fn on_event(&self, _: &SndEvent) -> std::result::Result<(), String> {
                Err("nope".to_string())
            }
        }

        let manager = EventManager::new().unwrap();
        manager.subscribe(Arc::new(Panicking));
        manager.subscribe(Arc::new(Failing));
        let (l, rx) = listener(None);
        manager.subscribe(l);

        manager.broadcast(ChannelType::DeviceChanged, serde_json::json!({"id": "x"}));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            ChannelType::DeviceChanged
        );
    }

    #[test]
    fn test_unsubscribe() {
        let manager = EventManager::new().unwrap();
        let (l, rx) = listener(None);
        let id = manager.subscribe(l);
        assert_eq!(manager.listener_count(), 1);

        assert!(manager.unsubscribe(id));
        assert!(!manager.unsubscribe(id));
        assert_eq!(manager.listener_count(), 0);

        manager.broadcast(ChannelType::BufferUnderrun, serde_json::Value::Null);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[tokio::test]
    async fn test_watch_receives_events() {
        let manager = EventManager::with_handle(Handle::current());
        let mut rx = manager.watch();
        manager.broadcast(ChannelType::MixerChannelAdded, serde_json::json!(3));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.channel, ChannelType::MixerChannelAdded);
        assert_eq!(event.payload, serde_json::json!(3));
    }
}
