//! Synchronous, typed event emission.
//!
//! Every component that announces changes owns an [`EventEmitter`] over its
//! own event enum. The enum's [`Event::name`] is the name listeners register
//! for, so payloads and names cannot drift apart.
//!
//! Dispatch happens inline on the emitting call. The listener registry lock
//! is released before handlers run, so a handler may register listeners or
//! emit on the same emitter.
//!
//! # Example
//!
//! ```rust,ignore
//! let log = TransactionLog::<i64>::new();
//! log.events().funnel(&["commit", "rollback"], LogEvent::Done);
//! log.events().once("done", |_| println!("committed and rolled back"));
//! ```

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

/// Name under which a listener receives every event.
pub const ANY_EVENT: &str = "*";

/// A payload that knows the name it is emitted under.
pub trait Event: Clone + Send + Sync + 'static {
    /// Name listeners register for.
    fn name(&self) -> &str;
}

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<E> {
    id: ListenerId,
    name: String,
    once: bool,
    handler: Handler<E>,
}

struct Registry<E> {
    next_id: u64,
    listeners: Vec<Listener<E>>,
}

impl<E> Registry<E> {
    fn register(&mut self, name: &str, once: bool, handler: Handler<E>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push(Listener {
            id,
            name: name.to_string(),
            once,
            handler,
        });
        id
    }
}

/// Owner of a set of listeners for events of type `E`.
pub struct EventEmitter<E: Event> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: Event> EventEmitter<E> {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Registers a handler for every emission of `name`.
    pub fn on<F>(&self, name: &str, handler: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.registry.lock().register(name, false, Arc::new(handler))
    }

    /// Registers a handler for the next emission of `name` only.
    pub fn once<F>(&self, name: &str, handler: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.registry.lock().register(name, true, Arc::new(handler))
    }

    /// Removes a listener. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|l| l.id != id);
        registry.listeners.len() != before
    }

    /// Removes every listener registered for `name`.
    pub fn remove_all(&self, name: &str) {
        self.registry.lock().listeners.retain(|l| l.name != name);
    }

    /// Number of listeners registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.registry
            .lock()
            .listeners
            .iter()
            .filter(|l| l.name == name)
            .count()
    }

    /// Delivers `event` to its listeners and to wildcard listeners.
    pub fn emit(&self, event: E) {
        let handlers: Vec<Handler<E>> = {
            let mut registry = self.registry.lock();
            let name = event.name();
            let matches =
                |l: &Listener<E>| l.name == name || l.name == ANY_EVENT;
            let handlers = registry
                .listeners
                .iter()
                .filter(|l| matches(*l))
                .map(|l| Arc::clone(&l.handler))
                .collect();
            registry.listeners.retain(|l| !(l.once && matches(l)));
            handlers
        };

        for handler in handlers {
            handler(&event);
        }
    }

    /// Emits `derived` each time every event in `names` has fired at least
    /// once since the last time `derived` was emitted.
    pub fn funnel(&self, names: &[&str], derived: E) -> Vec<ListenerId> {
        self.install_funnel(names, derived, false)
    }

    /// Like [`funnel`](Self::funnel), but emits `derived` a single time and
    /// then removes its listeners.
    pub fn funnel_once(&self, names: &[&str], derived: E) -> Vec<ListenerId> {
        self.install_funnel(names, derived, true)
    }

    /// Returns a handle that does not keep the listeners alive.
    pub fn downgrade(&self) -> WeakEmitter<E> {
        WeakEmitter {
            registry: Arc::downgrade(&self.registry),
        }
    }

    fn install_funnel(&self, names: &[&str], derived: E, once: bool) -> Vec<ListenerId> {
        let all: HashSet<String> = names.iter().map(|n| (*n).to_string()).collect();
        let state = Arc::new(Mutex::new(FunnelState {
            remaining: all.clone(),
            all,
            ids: Vec::new(),
        }));

        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let state = Arc::clone(&state);
            let weak = self.downgrade();
            let derived = derived.clone();
            let key = (*name).to_string();
            let name = key.clone();
            let id = self.on(&key, move |_| {
                let complete = {
                    let mut st = state.lock();
                    st.remaining.remove(&name);
                    if st.remaining.is_empty() {
                        st.remaining = st.all.clone();
                        true
                    } else {
                        false
                    }
                };
                if !complete {
                    return;
                }
                if once {
                    let ids = state.lock().ids.clone();
                    for id in ids {
                        weak.off(id);
                    }
                }
                weak.emit(derived.clone());
            });
            ids.push(id);
        }
        state.lock().ids = ids.clone();
        ids
    }
}

struct FunnelState {
    remaining: HashSet<String>,
    all: HashSet<String>,
    ids: Vec<ListenerId>,
}

impl<E: Event> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.registry.lock().listeners.len())
            .finish()
    }
}

/// Non-owning handle to an [`EventEmitter`].
///
/// Used where one object forwards events into another it does not own.
/// Operations are silent no-ops once the emitter has been dropped.
pub struct WeakEmitter<E: Event> {
    registry: Weak<Mutex<Registry<E>>>,
}

impl<E: Event> WeakEmitter<E> {
    /// Emits on the original emitter if it still exists.
    pub fn emit(&self, event: E) {
        if let Some(registry) = self.registry.upgrade() {
            EventEmitter { registry }.emit(event);
        }
    }

    /// Removes a listener from the original emitter if it still exists.
    pub fn off(&self, id: ListenerId) -> bool {
        match self.registry.upgrade() {
            Some(registry) => EventEmitter { registry }.off(id),
            None => false,
        }
    }

    /// Whether the original emitter has been dropped.
    pub fn is_dangling(&self) -> bool {
        self.registry.strong_count() == 0
    }
}

impl<E: Event> Clone for WeakEmitter<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Weak::clone(&self.registry),
        }
    }
}

impl<E: Event> fmt::Debug for WeakEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEmitter")
            .field("dangling", &self.is_dangling())
            .finish()
    }
}
