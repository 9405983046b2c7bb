//! Per-consumer bindings.
//!
//! A [`Binding`] connects one consumer to the slice of a [`Store`] at a tracked path.  It is
//! notified of every store mutation, re-reads its slice and only calls the consumer's render
//! callback when the slice is no longer the same (see [`Value::is_same`]).  Writes through the
//! binding only replace the tracked slice.
//!
//! Bindings and setters do not keep the store alive.  Once every [`Store`] handle is gone, for
//! a provided store once its provider is unmounted, their operations fail with
//! [`StoreError::StoreNotFound`].

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::accessor::{read_path, write_path, Update};
use crate::path::Path;
use crate::store::{Store, StoreError, Unsubscribe, WeakStore};
use crate::value::Value;

/// Called with the new slice whenever it changes.
pub type Render = Arc<dyn Fn(Option<&Value>) + Send + Sync + 'static>;

/// A consumer attached to the slice of a store at a path.
///
/// Dropping the binding detaches the consumer.
pub struct Binding {
    store: WeakStore,
    path: Path,
    snapshot: Arc<Mutex<Option<Value>>>,
    unsubscribe: Unsubscribe,
}

impl Binding {
    /// Reads the current slice and subscribes to the store.
    ///
    /// `on_render` is not called for the initial slice, use [`Binding::value`].
    pub fn attach<F>(store: &Store, path: Path, on_render: F) -> Self
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let snapshot = Arc::new(Mutex::new(read_path(&store.get(), &path)));
        trace!("attaching binding. path: '{}'", path);

        let weak_store = store.downgrade();
        let subscriber = {
            let weak_store = weak_store.clone();
            let snapshot = snapshot.clone();
            let path = path.clone();
            let on_render: Render = Arc::new(on_render);
            move || rerender_if_changed(&weak_store, &path, &snapshot, &on_render)
        };
        let unsubscribe = store.on_change(subscriber);

        Self {
            store: weak_store,
            path,
            snapshot,
            unsubscribe,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The slice as of the last render.
    pub fn value(&self) -> Option<Value> {
        self.snapshot.lock().clone()
    }

    /// Reads the slice from the store's current tree.
    pub fn read(&self) -> Result<Option<Value>, StoreError> {
        let store = self.store.store()?;
        Ok(read_path(&store.get(), &self.path))
    }

    /// Replaces the tracked slice, see [`ScopedSetter::set`].
    pub fn set(&self, update: impl Into<Update>) -> Result<(), StoreError> {
        self.setter().set(update)
    }

    /// A setter for the tracked slice that can outlive the binding.
    pub fn setter(&self) -> ScopedSetter {
        ScopedSetter {
            store: self.store.clone(),
            path: self.path.clone(),
        }
    }

    /// Stops receiving notifications, same as dropping the binding.
    pub fn detach(self) {}
}

impl Drop for Binding {
    fn drop(&mut self) {
        trace!("detaching binding. path: '{}'", self.path);
        self.unsubscribe.unsubscribe();
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("path", &self.path)
            .field("snapshot", &*self.snapshot.lock())
            .finish()
    }
}

fn rerender_if_changed(
    store: &WeakStore,
    path: &Path,
    snapshot: &Mutex<Option<Value>>,
    on_render: &Render,
) {
    let Some(store) = store.upgrade() else {
        return;
    };
    let next = read_path(&store.get(), path);

    {
        let mut previous = snapshot.lock();
        if Value::is_same_slice(previous.as_ref(), next.as_ref()) {
            trace!("slice unchanged. path: '{}'", path);
            return;
        }
        *previous = next.clone();
    }

    trace!("slice changed, rendering. path: '{}'", path);
    on_render(next.as_ref());
}

/// Writes the slice of a store at one path.
#[derive(Debug, Clone)]
pub struct ScopedSetter {
    store: WeakStore,
    path: Path,
}

impl ScopedSetter {
    pub fn new(store: &Store, path: Path) -> Self {
        Self {
            store: store.downgrade(),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the value at the path, or applies an updater to it, via [`Store::set`].
    ///
    /// Only the objects on the path are copied, every other part of the tree is shared with the
    /// previous tree.  Subscribers are notified as for any other `set`.
    pub fn set(&self, update: impl Into<Update>) -> Result<(), StoreError> {
        let store = self.store.store()?;
        let path = self.path.clone();
        let update = update.into();
        store.update(move |previous| write_path(previous, &path, update));
        Ok(())
    }
}
