//! # Ordered Handler Lists
//!
//! Every notification channel in the core (per-type event delivery, connection
//! state changes, resynchronization, processor output) is a [`Listeners`] list.
//! Handlers run in registration order. Each registration returns its own
//! [`Subscription`], which removes exactly that registration and nothing else.
//!
//! A handler that returns an error or panics is logged and skipped; delivery to
//! the remaining handlers continues.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// A registered callback.
pub type Handler<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

/// Removal half of a registration, implemented by every handler list.
trait Detach {
    fn detach(&self, id: u64) -> bool;
}

/// # Subscription
///
/// The capability to remove one handler registration. Dropping it leaves the
/// handler registered; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    channel: &'static str,
    target: Weak<dyn Detach + Send + Sync>,
    cleanup: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// The registration id, unique within its channel.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The channel the handler is registered on.
    pub fn channel(&self) -> &'static str {
        self.channel
    }

    /// Removes the handler. Returns `false` if it was already gone or the
    /// channel no longer exists.
    pub fn unsubscribe(self) -> bool {
        let removed = match self.target.upgrade() {
            Some(list) => list.detach(self.id),
            None => false,
        };
        if removed {
            if let Some(cleanup) = self.cleanup {
                cleanup();
            }
        }
        removed
    }

    /// Runs `cleanup` once this registration has actually been removed.
    pub(crate) fn on_removed<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish()
    }
}

/// An ordered list of handlers for events of type `E`.
pub struct Listeners<E> {
    channel: &'static str,
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler<E>)>>,
}

impl<E: 'static> Listeners<E> {
    /// Creates an empty list. `channel` names the list in log lines.
    pub fn new(channel: &'static str) -> Arc<Self> {
        Arc::new(Self {
            channel,
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        })
    }

    /// Appends a handler and returns the capability that removes it.
    pub fn add<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, Arc::new(handler)));

        let target: Arc<dyn Detach + Send + Sync> = self.clone();
        Subscription {
            id,
            channel: self.channel,
            target: Arc::downgrade(&target),
            cleanup: None,
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// True when no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.handlers.lock().clear();
    }

    /// Delivers `event` to every handler in registration order and returns how
    /// many handled it without error.
    ///
    /// The lock is not held while handlers run, so a handler may subscribe or
    /// unsubscribe on the same list. A handler removed by an earlier handler
    /// during the same delivery is not invoked.
    pub fn emit(&self, event: &E) -> usize {
        let handlers: Vec<(u64, Handler<E>)> = self.handlers.lock().clone();
        let mut delivered = 0;

        for (id, handler) in handlers {
            if !self.contains(id) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    log::warn!("{} handler #{} failed: {:#}", self.channel, id, e);
                }
                Err(payload) => {
                    log::warn!(
                        "{} handler #{} panicked: {}",
                        self.channel,
                        id,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        delivered
    }

    fn contains(&self, id: u64) -> bool {
        self.handlers.lock().iter().any(|(h, _)| *h == id)
    }
}

impl<E> Detach for Listeners<E> {
    fn detach(&self, id: u64) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
