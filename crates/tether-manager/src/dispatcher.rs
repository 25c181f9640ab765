//! Listener tables and event fan-out.
//!
//! Per-connection listeners are keyed by [`ConnectionId`] and may be
//! registered before the connection exists. Global listeners see every
//! connection's events together with the originating id.
//!
//! `emit` snapshots the matching callbacks and releases the table lock
//! before calling them, so a listener may subscribe, unsubscribe, send or
//! close from inside its callback. A panicking listener is caught and
//! logged; the remaining listeners still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tether_core::{ConnectionEvent, ConnectionId, EventKind};
use tracing::{debug, error};

/// Callback for one connection's events.
pub type Listener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Callback for every connection's events.
pub type GlobalListener = Arc<dyn Fn(&ConnectionId, &ConnectionEvent) + Send + Sync>;

struct Entry<L> {
    token: u64,
    kind: EventKind,
    callback: L,
}

#[derive(Default)]
struct Tables {
    next_token: u64,
    by_connection: HashMap<ConnectionId, Vec<Entry<Listener>>>,
    global: Vec<Entry<GlobalListener>>,
}

impl Tables {
    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Scope {
    Connection(ConnectionId),
    Global,
}

/// Handle returned by `on` / `on_global`.
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`] or
/// pass it to the manager's `off`.
#[derive(Clone, Debug)]
pub struct Subscription {
    token: u64,
    scope: Scope,
    tables: Weak<Mutex<Tables>>,
}

impl Subscription {
    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(tables) = self.tables.upgrade() else {
            return false;
        };
        let mut tables = tables.lock();
        match &self.scope {
            Scope::Global => {
                let before = tables.global.len();
                tables.global.retain(|e| e.token != self.token);
                tables.global.len() != before
            }
            Scope::Connection(id) => {
                let Some(entries) = tables.by_connection.get_mut(id) else {
                    return false;
                };
                let before = entries.len();
                entries.retain(|e| e.token != self.token);
                let removed = entries.len() != before;
                if entries.is_empty() {
                    let _ = tables.by_connection.remove(id);
                }
                removed
            }
        }
    }

    /// Connection this subscription belongs to, or `None` for global ones.
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        match &self.scope {
            Scope::Connection(id) => Some(id),
            Scope::Global => None,
        }
    }
}

/// Per-connection and global listener tables.
#[derive(Default)]
pub struct EventDispatcher {
    tables: Arc<Mutex<Tables>>,
}

impl EventDispatcher {
    /// Empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `kind` events on connection `id`.
    pub fn subscribe(&self, id: ConnectionId, kind: EventKind, callback: Listener) -> Subscription {
        let mut tables = self.tables.lock();
        let token = tables.next_token();
        tables
            .by_connection
            .entry(id.clone())
            .or_default()
            .push(Entry {
                token,
                kind,
                callback,
            });
        Subscription {
            token,
            scope: Scope::Connection(id),
            tables: Arc::downgrade(&self.tables),
        }
    }

    /// Register `callback` for `kind` events on every connection.
    pub fn subscribe_global(&self, kind: EventKind, callback: GlobalListener) -> Subscription {
        let mut tables = self.tables.lock();
        let token = tables.next_token();
        tables.global.push(Entry {
            token,
            kind,
            callback,
        });
        Subscription {
            token,
            scope: Scope::Global,
            tables: Arc::downgrade(&self.tables),
        }
    }

    /// Deliver `event` to `id`'s listeners, then to global listeners.
    pub fn emit(&self, id: &ConnectionId, event: &ConnectionEvent) {
        let kind = event.kind();
        let (local, global): (Vec<Listener>, Vec<GlobalListener>) = {
            let tables = self.tables.lock();
            let local = tables
                .by_connection
                .get(id)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|e| e.kind == kind)
                        .map(|e| Arc::clone(&e.callback))
                        .collect()
                })
                .unwrap_or_default();
            let global = tables
                .global
                .iter()
                .filter(|e| e.kind == kind)
                .map(|e| Arc::clone(&e.callback))
                .collect();
            (local, global)
        };

        for callback in local {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(conn_id = %id, event = %kind, "listener panicked");
            }
        }
        for callback in global {
            if catch_unwind(AssertUnwindSafe(|| callback(id, event))).is_err() {
                error!(conn_id = %id, event = %kind, "global listener panicked");
            }
        }
    }

    /// Drop every listener registered for `id`. Returns how many were removed.
    pub fn clear_connection(&self, id: &ConnectionId) -> usize {
        let removed = self
            .tables
            .lock()
            .by_connection
            .remove(id)
            .map_or(0, |entries| entries.len());
        if removed > 0 {
            debug!(conn_id = %id, removed, "cleared connection listeners");
        }
        removed
    }

    /// Drop every global listener.
    pub fn clear_global(&self) {
        self.tables.lock().global.clear();
    }

    /// Listeners registered for `id`.
    pub fn listener_count(&self, id: &ConnectionId) -> usize {
        self.tables.lock().by_connection.get(id).map_or(0, Vec::len)
    }

    /// Per-connection listeners across all ids.
    pub fn total_listeners(&self) -> usize {
        self.tables.lock().by_connection.values().map(Vec::len).sum()
    }

    /// Global listeners.
    pub fn global_listener_count(&self) -> usize {
        self.tables.lock().global.len()
    }
}
