//! Update channel for pushed device snapshots.
//!
//! The cloud client publishes a full replacement [`Device`] whenever the
//! appliance reports a change. Listeners are keyed by device identifier and
//! invoked synchronously, in registration order, on the publishing task.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::data::Device;

type Callback = Arc<dyn Fn(Arc<Device>) + Send + Sync>;

/// Callback handle for unregistering callbacks.
///
/// Unregistering is idempotent, and dropping the handle unregisters too.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub fn new(id: u64, unregister_fn: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            unregister_fn: Mutex::new(Some(Box::new(unregister_fn))),
        }
    }

    /// Unregister this callback. Calling this more than once has no effect.
    pub fn unregister(&self) {
        // Take first so the closure runs without the handle lock held.
        let f = self.unregister_fn.lock().take();
        if let Some(f) = f {
            f();
        }
    }

    /// Check if the callback is still registered through this handle.
    pub fn is_registered(&self) -> bool {
        self.unregister_fn.lock().is_some()
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("id", &self.id)
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.get_mut().take() {
            f();
        }
    }
}

struct Listener {
    id: u64,
    /// `None` listens to every device.
    device_id: Option<String>,
    active: Arc<AtomicBool>,
    callback: Callback,
}

/// Publish/subscribe channel of device snapshots keyed by device identifier.
pub struct UpdateChannel {
    listeners: Arc<RwLock<Vec<Listener>>>,
    update_tx: broadcast::Sender<Arc<Device>>,
    callback_counter: AtomicU64,
}

impl UpdateChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        let (update_tx, _) = broadcast::channel(32);

        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            update_tx,
            callback_counter: AtomicU64::new(0),
        }
    }

    /// Register a callback for updates of a single device.
    pub fn add_listener<F>(&self, device_id: impl Into<String>, callback: F) -> CallbackHandle
    where
        F: Fn(Arc<Device>) + Send + Sync + 'static,
    {
        self.register(Some(device_id.into()), Arc::new(callback))
    }

    /// Register a callback for updates of every device.
    pub fn add_global_listener<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(Arc<Device>) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(callback))
    }

    fn register(&self, device_id: Option<String>, callback: Callback) -> CallbackHandle {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));

        debug!("Registering listener {} for {:?}", callback_id, device_id);

        self.listeners.write().push(Listener {
            id: callback_id,
            device_id,
            active: active.clone(),
            callback,
        });

        let listeners = Arc::downgrade(&self.listeners);
        CallbackHandle::new(callback_id, move || {
            active.store(false, Ordering::SeqCst);
            if let Some(listeners) = listeners.upgrade() {
                listeners.write().retain(|l| l.id != callback_id);
            }
            debug!("Unregistered listener {}", callback_id);
        })
    }

    /// Subscribe to every published snapshot as a stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Device>> {
        self.update_tx.subscribe()
    }

    /// Deliver a snapshot to the matching listeners.
    ///
    /// Returns the number of callbacks invoked.
    pub fn publish(&self, device: Device) -> usize {
        let device = Arc::new(device);

        // Listeners may register or unregister from inside a callback, so
        // invoke them without holding the registry lock.
        let matching: Vec<(Arc<AtomicBool>, Callback)> = self
            .listeners
            .read()
            .iter()
            .filter(|l| {
                l.device_id
                    .as_deref()
                    .map_or(true, |id| id == device.device_id)
            })
            .map(|l| (l.active.clone(), l.callback.clone()))
            .collect();

        trace!(
            "Publishing update for {} to {} listeners",
            device.device_id,
            matching.len()
        );

        let mut delivered = 0;
        for (active, callback) in matching {
            if active.load(Ordering::SeqCst) {
                callback(device.clone());
                delivered += 1;
            }
        }

        let _ = self.update_tx.send(device);
        delivered
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        let mut listeners = self.listeners.write();
        for listener in listeners.iter() {
            listener.active.store(false, Ordering::SeqCst);
        }
        listeners.clear();
    }
}

impl Default for UpdateChannel {
    fn default() -> Self {
        Self::new()
    }
}
