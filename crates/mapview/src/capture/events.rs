use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, warn};

static BUS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_bus_lock_poison_once(operation: &'static str) {
    if BUS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "scene change bus lock poisoned; recovered inner value");
    }
}

fn lock_state<'a>(state: &'a Mutex<BusState>, operation: &'static str) -> MutexGuard<'a, BusState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn_bus_lock_poison_once(operation);
            poisoned.into_inner()
        }
    }
}

/// The host's active scene changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneChange {
    pub previous: Option<String>,
    pub current: String,
}

#[derive(Debug, Default)]
struct BusState {
    next_id: u64,
    subscribers: Vec<(u64, VecDeque<SceneChange>)>,
}

/// Fan-out of scene change notifications from the host to its observers.
#[derive(Debug, Clone, Default)]
pub struct SceneChangeBus {
    state: Arc<Mutex<BusState>>,
}

impl SceneChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, change: SceneChange) {
        let mut state = lock_state(&self.state, "publish");
        for (_, queue) in &mut state.subscribers {
            queue.push_back(change.clone());
        }
    }

    /// Registers an observer that receives every change published from now on.
    pub fn subscribe(&self) -> SceneChangeSubscription {
        let mut state = lock_state(&self.state, "subscribe");
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push((id, VecDeque::new()));
        debug!(subscription = id, "scene_change_subscribed");
        SceneChangeSubscription {
            id,
            bus: Arc::downgrade(&self.state),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock_state(&self.state, "subscriber_count").subscribers.len()
    }
}

/// Deregisters from its bus when dropped.
#[derive(Debug)]
pub struct SceneChangeSubscription {
    id: u64,
    bus: Weak<Mutex<BusState>>,
}

impl SceneChangeSubscription {
    /// Pending changes, oldest first. Empty once the bus itself is gone.
    pub fn drain(&self) -> Vec<SceneChange> {
        let Some(state) = self.bus.upgrade() else {
            return Vec::new();
        };
        let mut state = lock_state(&state, "drain");
        state
            .subscribers
            .iter_mut()
            .find(|(id, _)| *id == self.id)
            .map(|(_, queue)| queue.drain(..).collect())
            .unwrap_or_default()
    }
}

impl Drop for SceneChangeSubscription {
    fn drop(&mut self) {
        let Some(state) = self.bus.upgrade() else {
            return;
        };
        lock_state(&state, "unsubscribe")
            .subscribers
            .retain(|(id, _)| *id != self.id);
        debug!(subscription = self.id, "scene_change_unsubscribed");
    }
}

/// Operator stop request, checked by the traversal at scene boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
