//! Single-flight users load controller.
//!
//! The controller owns one [`LoadState`] and replaces it wholesale on every
//! transition. A transition and the delivery of everything it queued happen
//! while one thread holds the dispatch role; any other thread that wants to
//! transition (a fetch completing, a `load()` from elsewhere) waits for the role.
//! Callbacks therefore never overlap each other or a later transition, arrive
//! in transition order, and may call back into the controller.

use std::{
    collections::VecDeque,
    fmt,
    pin::pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak,
    },
    thread::{self, ThreadId},
};

use shared::{error::FetchError, protocol::LoadState};
use tokio::{runtime::Handle, sync::mpsc, sync::Notify};
use tracing::{debug, info, warn};

use crate::source::UsersSource;

type ObserverFn = dyn Fn(&LoadState) + Send + Sync;

struct ObserverEntry {
    id: u64,
    /// Transitions numbered at or below this happened before subscription.
    since: u64,
    active: AtomicBool,
    callback: Box<ObserverFn>,
}

#[derive(Default)]
struct Core {
    state: LoadState,
    transitions: u64,
    observers: Vec<Arc<ObserverEntry>>,
    next_observer_id: u64,
    pending: VecDeque<(u64, LoadState)>,
    /// Thread currently transitioning and delivering.
    dispatcher: Option<ThreadId>,
}

impl Core {
    fn replace(&mut self, next: LoadState) {
        self.transitions += 1;
        self.pending.push_back((self.transitions, next.clone()));
        self.state = next;
    }
}

struct Inner {
    source: Arc<dyn UsersSource>,
    core: Mutex<Core>,
    dispatch_free: Condvar,
    settled: Notify,
}

impl Inner {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the dispatch role, waiting while another thread holds it.
    ///
    /// The flag is `true` when this thread already held the role, i.e. the
    /// caller is an observer re-entering the controller; the outer drain then
    /// delivers whatever the caller queues.
    fn enter(&self) -> (MutexGuard<'_, Core>, bool) {
        let me = thread::current().id();
        let mut core = self.lock_core();
        loop {
            match core.dispatcher {
                None => {
                    core.dispatcher = Some(me);
                    return (core, false);
                }
                Some(owner) if owner == me => return (core, true),
                Some(_) => {
                    core = self
                        .dispatch_free
                        .wait(core)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn transition(&self, next: LoadState) {
        let (mut core, nested) = self.enter();
        core.replace(next);
        drop(core);
        if !nested {
            self.drain();
        }
    }

    /// Delivers queued transitions, then gives up the dispatch role.
    fn drain(&self) {
        let mut guard = DispatchGuard {
            inner: self,
            armed: true,
        };

        loop {
            let (seq, state, observers) = {
                let mut core = self.lock_core();
                match core.pending.pop_front() {
                    Some((seq, state)) => (seq, state, core.observers.clone()),
                    None => {
                        core.dispatcher = None;
                        guard.armed = false;
                        break;
                    }
                }
            };

            for observer in observers {
                if observer.since < seq && observer.active.load(Ordering::Acquire) {
                    (observer.callback)(&state);
                }
            }
        }

        self.wake_waiters();
    }

    fn wake_waiters(&self) {
        self.dispatch_free.notify_all();
        self.settled.notify_waiters();
    }

    fn remove_observer(&self, id: u64) {
        self.lock_core().observers.retain(|entry| entry.id != id);
    }
}

/// Releases the dispatch role if an observer panics mid-delivery.
struct DispatchGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock_core().dispatcher = None;
            self.inner.wake_waiters();
        }
    }
}

/// Drives at most one users fetch at a time and publishes its lifecycle.
#[derive(Clone)]
pub struct LoadController {
    inner: Arc<Inner>,
}

impl LoadController {
    pub fn new(source: Arc<dyn UsersSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                core: Mutex::new(Core::default()),
                dispatch_free: Condvar::new(),
                settled: Notify::new(),
            }),
        }
    }

    /// Starts a fetch unless one is already in flight.
    ///
    /// The state is `Loading` by the time this returns, and observers have been
    /// told unless this call came from inside an observer. If another thread is
    /// delivering a transition, this waits for it to finish first. The fetch
    /// runs on the current tokio runtime; without one the load fails as a
    /// transport error.
    pub fn load(&self) {
        let (mut core, nested) = self.inner.enter();
        let in_flight = core.state.is_loading();
        if !in_flight {
            core.replace(LoadState::Loading);
        }
        drop(core);
        if !nested {
            self.inner.drain();
        }
        if in_flight {
            debug!("users load already in flight; ignoring");
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("no async runtime available for users fetch");
            self.inner.transition(LoadState::Failed(FetchError::transport(
                "no async runtime available",
            )));
            return;
        };

        let inner = Arc::clone(&self.inner);
        info!(source = %inner.source.describe(), "loading users");
        runtime.spawn(async move {
            let source = Arc::clone(&inner.source);
            let fetch = tokio::spawn(async move { source.fetch_users().await });

            let next = match fetch.await {
                Ok(Ok(users)) => {
                    info!(count = users.len(), "users loaded");
                    LoadState::Loaded(users)
                }
                Ok(Err(err)) => {
                    warn!(kind = %err.kind, error = %err, "users load failed");
                    LoadState::Failed(err)
                }
                Err(join_err) => {
                    warn!(error = %join_err, "users fetch task aborted");
                    LoadState::Failed(FetchError::transport(format!(
                        "fetch task aborted: {join_err}"
                    )))
                }
            };
            inner.transition(next);
        });
    }

    pub fn current_state(&self) -> LoadState {
        self.inner.lock_core().state.clone()
    }

    /// Registers `observer` for every transition after this call.
    ///
    /// Callbacks run on whichever thread holds the dispatch role and block
    /// other transitions while they run, so they should return promptly.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&LoadState) + Send + Sync + 'static,
    {
        let mut core = self.inner.lock_core();
        let id = core.next_observer_id;
        core.next_observer_id += 1;
        let entry = Arc::new(ObserverEntry {
            id,
            since: core.transitions,
            active: AtomicBool::new(true),
            callback: Box::new(observer),
        });
        core.observers.push(Arc::clone(&entry));

        Subscription {
            inner: Arc::downgrade(&self.inner),
            entry,
        }
    }

    /// Like [`subscribe`](Self::subscribe), forwarding transitions into a channel.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<LoadState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |state| {
            let _ = tx.send(state.clone());
        });
        (subscription, rx)
    }

    /// Waits until no fetch is in flight and every observer has been handed
    /// the resulting state, then returns that state.
    ///
    /// Returns `Idle` immediately if nothing was ever loaded.
    pub async fn settled(&self) -> LoadState {
        loop {
            let mut notified = pin!(self.inner.settled.notified());
            notified.as_mut().enable();

            {
                let core = self.inner.lock_core();
                if !core.state.is_loading() && core.dispatcher.is_none() {
                    return core.state.clone();
                }
            }
            notified.await;
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock_core().observers.len()
    }
}

impl fmt::Debug for LoadController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.lock_core();
        f.debug_struct("LoadController")
            .field("state", &core.state.label())
            .field("observers", &core.observers.len())
            .finish()
    }
}

/// Handle returned by [`LoadController::subscribe`]. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its observer"]
pub struct Subscription {
    inner: Weak<Inner>,
    entry: Arc<ObserverEntry>,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        self.entry.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.entry.active.store(false, Ordering::Release);
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_observer(self.entry.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.entry.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
