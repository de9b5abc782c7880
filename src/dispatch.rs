//! Broadcast of accepted commands to independent listeners
//!
//! The matcher never knows who is listening. Each publish is fire-and-forget:
//! no history is kept, and an error or panic in one listener is logged
//! without stopping delivery to the rest.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, warn};

use crate::command::CommandMatch;

pub trait CommandListener: Send {
    fn on_command(&mut self, command: &CommandMatch) -> anyhow::Result<()>;
}

impl<F> CommandListener for F
where
    F: FnMut(&CommandMatch) -> anyhow::Result<()> + Send,
{
    fn on_command(&mut self, command: &CommandMatch) -> anyhow::Result<()> {
        self(command)
    }
}

pub type SharedListener = Arc<Mutex<dyn CommandListener>>;

type Registry = Mutex<Vec<(u64, SharedListener)>>;

#[derive(Clone, Default)]
pub struct Dispatcher {
    listeners: Arc<Registry>,
    next_id: Arc<AtomicU64>,
}

/// Handle returned by `subscribe`; call `unsubscribe` to stop receiving
#[must_use = "dropping the subscription keeps the listener registered; call unsubscribe to remove it"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else { return };
        if let Ok(mut listeners) = registry.lock() {
            listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<L: CommandListener + 'static>(&self, listener: L) -> Subscription {
        self.subscribe_shared(Arc::new(Mutex::new(listener)))
    }

    /// Register a listener the caller keeps a handle to (e.g. the executor)
    pub fn subscribe_shared(&self, listener: SharedListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push((id, listener)),
            Err(_) => error!("Listener registry poisoned, subscription {} dropped", id),
        }
        Subscription { id, registry: Arc::downgrade(&self.listeners) }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver to every listener registered at call time; returns how many succeeded
    pub fn publish(&self, command: &CommandMatch) -> usize {
        // Snapshot so listeners may (un)subscribe while being notified
        let snapshot: Vec<(u64, SharedListener)> = match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => {
                error!("Listener registry poisoned, dropping {}", command.command);
                return 0;
            }
        };

        debug!("Publishing {} to {} listeners", command.command, snapshot.len());

        let mut delivered = 0;
        for (id, listener) in snapshot {
            let result = panic::catch_unwind(AssertUnwindSafe(|| match listener.lock() {
                Ok(mut l) => l.on_command(command),
                Err(_) => Err(anyhow::anyhow!("listener mutex poisoned")),
            }));
            match result {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Listener {} failed on {}: {:#}", id, command.command, e),
                Err(_) => error!("Listener {} panicked on {}", id, command.command),
            }
        }
        delivered
    }
}
