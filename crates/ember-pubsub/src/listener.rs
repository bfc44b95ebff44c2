//! Cluster pub/sub listeners and the set that holds them.
//!
//! The set is copy-on-write: delivery iterates a snapshot of the
//! registrations without taking a set-wide lock, and add/remove publish a
//! new snapshot. Each registration counts the invocations running on it
//! so that removal can wait them out. Once `remove` returns, the listener
//! is not called again; the one exception is a removal made from inside a
//! listener callback, which returns at once and may leave a call on another
//! thread still finishing.

use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex};

use arc_swap::ArcSwap;
use ember_cluster::ClusterNode;

use crate::message::PubSubEvent;

/// Receives events from every node of a cluster connection.
///
/// `node` is the node the event was attributed to, or `None` if the
/// sending connection is not part of the known topology. Called on the
/// delivering connection's task; implementations should hand heavy work
/// off rather than block.
pub trait ClusterPubSubListener: Send + Sync {
    fn on_event(&self, node: Option<&ClusterNode>, event: &PubSubEvent);
}

impl<F> ClusterPubSubListener for F
where
    F: Fn(Option<&ClusterNode>, &PubSubEvent) + Send + Sync,
{
    fn on_event(&self, node: Option<&ClusterNode>, event: &PubSubEvent) {
        self(node, event)
    }
}

/// Shared handle to a listener. Identity is the pointer: registering the
/// same `Arc` twice is a no-op, and removal takes the same `Arc` back.
pub type SharedListener = Arc<dyn ClusterPubSubListener>;

struct Registration {
    listener: SharedListener,
    state: Mutex<CallState>,
    idle: Condvar,
}

struct CallState {
    live: bool,
    in_flight: usize,
}

impl Registration {
    fn new(listener: SharedListener) -> Self {
        Self {
            listener,
            state: Mutex::new(CallState {
                live: true,
                in_flight: 0,
            }),
            idle: Condvar::new(),
        }
    }

    fn is(&self, listener: &SharedListener) -> bool {
        same_listener(&self.listener, listener)
    }

    /// Counts a call in, unless the registration was removed.
    fn enter(&self) -> Option<InFlight<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.live {
            return None;
        }
        state.in_flight += 1;
        drop(state);
        let depth = DEPTH.with(|d| {
            let previous = d.get();
            d.set(previous + 1);
            previous
        });
        Some(InFlight {
            registration: self,
            depth,
        })
    }

    /// Marks the registration dead and, when `wait` is set, blocks until
    /// no call is running on it.
    fn retire(&self, wait: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.live = false;
        if wait {
            while state.in_flight > 0 {
                state = self.idle.wait(state).unwrap_or_else(|e| e.into_inner());
            }
        }
    }
}

/// One running call. Dropping it, on return or unwind, counts the call out.
struct InFlight<'a> {
    registration: &'a Registration,
    depth: usize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(self.depth));
        let mut state = self
            .registration
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.registration.idle.notify_all();
        }
    }
}

fn same_listener(a: &SharedListener, b: &SharedListener) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

thread_local! {
    /// Number of listener callbacks running on this thread. Removal from
    /// inside a callback must not wait, or two callbacks removing each
    /// other on different threads would block forever.
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Set of listeners, without duplicates.
pub struct ListenerSet {
    entries: ArcSwap<Vec<Arc<Registration>>>,
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Adds a listener. Returns false if it was already registered.
    pub fn add(&self, listener: SharedListener) -> bool {
        let mut added = false;
        self.entries.rcu(|current| {
            if current.iter().any(|r| r.is(&listener)) {
                added = false;
                return Arc::clone(current);
            }
            added = true;
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::new(Registration::new(Arc::clone(&listener))));
            Arc::new(next)
        });
        added
    }

    /// Removes a listener. Returns false if it wasn't registered; that is
    /// not an error.
    ///
    /// Blocks until any invocation of this listener running on another
    /// thread has finished, except when called from inside a listener
    /// callback.
    pub fn remove(&self, listener: &SharedListener) -> bool {
        let mut removed: Option<Arc<Registration>> = None;
        self.entries.rcu(|current| {
            removed = current.iter().find(|r| r.is(listener)).cloned();
            if removed.is_none() {
                return Arc::clone(current);
            }
            Arc::new(
                current
                    .iter()
                    .filter(|r| !r.is(listener))
                    .cloned()
                    .collect::<Vec<_>>(),
            )
        });

        let Some(registration) = removed else {
            return false;
        };
        let in_callback = DEPTH.with(|d| d.get() > 0);
        registration.retire(!in_callback);
        true
    }

    pub fn contains(&self, listener: &SharedListener) -> bool {
        self.entries.load().iter().any(|r| r.is(listener))
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every registered listener once with the event.
    ///
    /// Listeners added while this runs may or may not see the event.
    /// Returns the number of listeners invoked.
    pub fn notify(&self, node: Option<&ClusterNode>, event: &PubSubEvent) -> usize {
        let entries = self.entries.load_full();
        let mut invoked = 0;
        for registration in entries.iter() {
            let Some(_call) = registration.enter() else {
                continue;
            };
            registration.listener.on_event(node, event);
            invoked += 1;
        }
        invoked
    }
}
