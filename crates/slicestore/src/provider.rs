//! Provider scopes.
//!
//! A [`Provider`] owns the store for everything mounted below it.  Consumers are handed a
//! [`Scope`] and obtain the store through it, a scope created outside any provider, or whose
//! provider has been unmounted, has no store and every lookup fails with
//! [`StoreError::StoreNotFound`].
//!
//! The provider is the only owner of its store.  Scopes, bindings, setters and the whole-store
//! accessors only refer to it, so after unmount they fail with the same error.
//!
//! ```
//! use serde_json::json;
//! use slicestore::{use_set_store, use_store, Provider, Tree};
//!
//! let provider = Provider::mount(Tree::try_from(json!({"count": 0})).unwrap());
//! let scope = provider.scope();
//!
//! let count = use_store(&scope, |state| state.at("count"), |_| {}).unwrap();
//! count.set(json!(1)).unwrap();
//! assert_eq!(count.value().and_then(|value| value.as_i64()), Some(1));
//!
//! provider.unmount();
//! assert!(count.set(json!(2)).is_err());
//! assert!(use_set_store(&scope).is_err());
//! ```

use tracing::{debug, info};

use crate::accessor::read_path;
use crate::binding::Binding;
use crate::path::Path;
use crate::recorder::{track, Placeholder};
use crate::store::{Patch, Store, StoreError, StoreOptions, WeakStore};
use crate::value::{Tree, Value};

/// Owns the store of one mounted scope.
///
/// The store lives exactly as long as the provider, the handle returned by [`Provider::store`]
/// is the same for the whole lifetime.  Clones of that handle are owners too, consumers are
/// given a [`Scope`] instead.
#[derive(Debug)]
pub struct Provider {
    store: Store,
}

impl Provider {
    pub fn mount(initial: Tree) -> Self {
        Self::mount_with_options(initial, StoreOptions::default())
    }

    pub fn mount_with_options(initial: Tree, options: StoreOptions) -> Self {
        info!("Mounting provider. store: {}", options.name);
        Self {
            store: Store::with_options(initial, options),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The scope to hand to consumers mounted below this provider.
    pub fn scope(&self) -> Scope {
        Scope {
            store: Some(self.store.downgrade()),
        }
    }

    /// Ends the lifetime of the store, same as dropping the provider.
    pub fn unmount(self) {}
}

impl Drop for Provider {
    fn drop(&mut self) {
        debug!("Unmounting provider. store: {}", self.store.options().name);
    }
}

/// The context a consumer is mounted in, see the module docs.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    store: Option<WeakStore>,
}

impl Scope {
    /// A scope outside of any provider.
    pub fn root() -> Self {
        Self::default()
    }

    /// True while the provider this scope was created from is mounted.
    pub fn is_active(&self) -> bool {
        self.store().is_ok()
    }

    fn weak_store(&self) -> Result<&WeakStore, StoreError> {
        self.store
            .as_ref()
            .ok_or(StoreError::StoreNotFound)
    }

    /// The store of the nearest provider, only held for the duration of one operation.
    pub(crate) fn store(&self) -> Result<Store, StoreError> {
        self.weak_store()?.store()
    }
}

/// Attaches a consumer to the slice `selector` walks to, see [`Binding`].
///
/// The returned binding holds the tracked value and the scoped setter.
pub fn use_store<S, F>(scope: &Scope, selector: S, on_render: F) -> Result<Binding, StoreError>
where
    S: FnOnce(Placeholder) -> Placeholder,
    F: Fn(Option<&Value>) + Send + Sync + 'static,
{
    use_store_at(scope, track(selector), on_render)
}

/// Like [`use_store`], with the path given explicitly.
pub fn use_store_at<F>(scope: &Scope, path: Path, on_render: F) -> Result<Binding, StoreError>
where
    F: Fn(Option<&Value>) + Send + Sync + 'static,
{
    let store = scope.store()?;
    Ok(Binding::attach(&store, path, on_render))
}

/// Whole-store setter.
#[derive(Debug, Clone)]
pub struct SetStore {
    store: WeakStore,
}

impl SetStore {
    pub fn set(&self, patch: impl Into<Patch>) -> Result<(), StoreError> {
        self.store.store()?.set(patch);
        Ok(())
    }
}

/// Whole-store getter.
#[derive(Debug, Clone)]
pub struct GetStore {
    store: WeakStore,
}

impl GetStore {
    pub fn get(&self) -> Result<Tree, StoreError> {
        Ok(self.store.store()?.get())
    }

    pub fn get_at(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        Ok(read_path(&self.get()?, path))
    }
}

/// Whole-store reset.
#[derive(Debug, Clone)]
pub struct ResetStore {
    store: WeakStore,
}

impl ResetStore {
    pub fn reset(&self) -> Result<(), StoreError> {
        self.store.store()?.reset();
        Ok(())
    }
}

pub fn use_set_store(scope: &Scope) -> Result<SetStore, StoreError> {
    Ok(SetStore {
        store: scope.store()?.downgrade(),
    })
}

pub fn use_get_store(scope: &Scope) -> Result<GetStore, StoreError> {
    Ok(GetStore {
        store: scope.store()?.downgrade(),
    })
}

pub fn use_reset_store(scope: &Scope) -> Result<ResetStore, StoreError> {
    Ok(ResetStore {
        store: scope.store()?.downgrade(),
    })
}
