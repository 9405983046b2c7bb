//! A state container with fine-grained, path-tracked subscriptions.
//!
//! A [`Store`] owns an immutable state tree and a set of subscribers.  Consumers declare the
//! slice of the tree they depend on with a selector, the selector is run once against a
//! recording placeholder to learn its path, and the consumer is only re-rendered when the value
//! at that path changes.  Writes made through a consumer's binding only replace that slice,
//! every other part of the tree keeps its identity.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use serde_json::json;
//! use slicestore::{track, Binding, Store, Tree};
//!
//! let store = Store::new(Tree::try_from(json!({"count": 0, "user": {"name": "a"}})).unwrap());
//!
//! let count_renders = Arc::new(AtomicUsize::new(0));
//! let count_renders_for_consumer = count_renders.clone();
//! let count = Binding::attach(&store, track(|state| state.at("count")), move |_| {
//!     count_renders_for_consumer.fetch_add(1, Ordering::SeqCst);
//! });
//! let name = Binding::attach(&store, track(|state| state.at("user").at("name")), |_| {});
//!
//! name.set(json!("b")).unwrap();
//!
//! assert_eq!(store.get().to_json(), json!({"count": 0, "user": {"name": "b"}}));
//! // the count slice did not change, so its consumer was not re-rendered
//! assert_eq!(count_renders.load(Ordering::SeqCst), 0);
//! # drop(count);
//! ```

pub mod accessor;
pub mod binding;
pub mod path;
pub mod provider;
pub mod recorder;
pub mod store;
pub mod value;

pub use accessor::{read_path, write_path, Update};
pub use binding::{Binding, Render, ScopedSetter};
pub use path::{Path, PathError};
pub use provider::{
    use_get_store, use_reset_store, use_set_store, use_store, use_store_at, GetStore, Provider, ResetStore, Scope,
    SetStore,
};
pub use recorder::{create_path_recorder, track, PathRecorder, Placeholder};
pub use store::{Patch, Store, StoreError, StoreOptions, Subscriber, Unsubscribe, WeakStore};
pub use value::{Tree, Value, ValueError};
