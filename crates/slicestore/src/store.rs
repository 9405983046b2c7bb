use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::ops::Bound;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use thiserror::Error;
use tracing::{debug, trace, Level};

use crate::value::Tree;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store not found. The consumer is not mounted below an active provider.")]
    StoreNotFound,
}

/// A change notification callback, see [`Store::subscribe`].
pub type Subscriber = Arc<dyn Fn() + Send + Sync + 'static>;

/// How [`Store::set`] computes the next tree.
pub enum Patch {
    /// Top-level entries that replace those of the current tree.
    Partial(Tree),
    /// A function from the current tree to the top-level entries to replace.
    With(Box<dyn FnOnce(&Tree) -> Tree>),
}

impl Patch {
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&Tree) -> Tree + 'static,
    {
        Patch::With(Box::new(f))
    }

    fn resolve(self, current: &Tree) -> Tree {
        match self {
            Patch::Partial(partial) => partial,
            Patch::With(f) => f(current),
        }
    }
}

impl Debug for Patch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Patch::Partial(partial) => f.debug_tuple("Partial").field(partial).finish(),
            Patch::With(_) => f.write_str("With(..)"),
        }
    }
}

impl From<Tree> for Patch {
    fn from(partial: Tree) -> Self {
        Patch::Partial(partial)
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)] // if we add new fields, give them default values when deserializing old options
pub struct StoreOptions {
    /// Used to identify the store in logs.
    pub name: String,
    /// When false, [`Store::reset`] replaces the tree without notifying subscribers.
    pub notify_on_reset: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            notify_on_reset: true,
        }
    }
}

/// Identifies a subscriber by the address of its `Arc` allocation.
///
/// Registered subscribers are kept alive by [`Subscribers::entries`], so an address cannot be
/// reused while it is in the index.
fn subscriber_key(subscriber: &Subscriber) -> usize {
    Arc::as_ptr(subscriber) as *const () as usize
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    /// Ordered by id, i.e. by insertion.
    entries: BTreeMap<u64, Subscriber>,
    ids: HashMap<usize, u64>,
}

impl Subscribers {
    fn find(&self, subscriber: &Subscriber) -> Option<u64> {
        self.ids
            .get(&subscriber_key(subscriber))
            .copied()
    }

    fn insert(&mut self, subscriber: Subscriber) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.ids
            .insert(subscriber_key(&subscriber), id);
        self.entries.insert(id, subscriber);
        id
    }

    fn remove(&mut self, id: u64) -> Option<Subscriber> {
        let removed = self.entries.remove(&id)?;
        self.ids.remove(&subscriber_key(&removed));
        Some(removed)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// The first subscriber registered after `previous`.
    fn next_after(&self, previous: Option<u64>) -> Option<(u64, Subscriber)> {
        let lower = match previous {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(id, subscriber)| (*id, subscriber.clone()))
    }
}

struct Engine {
    options: StoreOptions,
    initial: Tree,
    /// Held from reading the current tree until the next one is stored.
    write: ReentrantMutex<()>,
    state: Mutex<Tree>,
    subscribers: Mutex<Subscribers>,
}

/// A handle to a store engine.
///
/// The engine owns the current state tree and the set of subscribers.  Handles are cheap to clone
/// and all clones operate on the same engine.
///
/// Every mutation replaces the tree, trees previously returned by [`Store::get`] remain valid,
/// unchanged, snapshots.  Subscribers are notified synchronously, in registration order, after
/// every mutation.
///
/// Writes are serialized: an updater always receives the tree committed by the previous write,
/// also when handles are used from several threads.  The write lock is re-entrant and released
/// before subscribers run, so updaters and subscribers may use the store, including calling
/// [`Store::set`] again.  A `set` from a subscriber runs a complete set/notify cycle before the
/// outer notification pass continues.
#[derive(Clone)]
pub struct Store {
    engine: Arc<Engine>,
}

impl Store {
    pub fn new(initial: Tree) -> Self {
        Self::with_options(initial, StoreOptions::default())
    }

    pub fn with_options(initial: Tree, options: StoreOptions) -> Self {
        debug!("Creating store. name: {}, keys: {}", options.name, initial.len());
        let initial = initial.deep_copy();
        let state = initial.deep_copy();
        Self {
            engine: Arc::new(Engine {
                options,
                initial,
                write: ReentrantMutex::new(()),
                state: Mutex::new(state),
                subscribers: Mutex::new(Subscribers::default()),
            }),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.engine.options
    }

    /// The current tree.
    pub fn get(&self) -> Tree {
        self.engine.state.lock().clone()
    }

    /// The tree the store was created with, see [`Store::reset`].
    pub fn initial(&self) -> Tree {
        self.engine.initial.clone()
    }

    /// Replaces the current tree with the result of merging the patch into it and notifies
    /// every subscriber.
    ///
    /// Only the top-level keys of the patch are replaced, the other top-level entries of the
    /// current tree are kept as they are.
    #[tracing::instrument(level = Level::DEBUG, skip_all, fields(store = %self.engine.options.name))]
    pub fn set(&self, patch: impl Into<Patch>) {
        let patch = patch.into();
        trace!("patch: {:?}", patch);

        {
            let _write = self.engine.write.lock();

            let partial = patch.resolve(&self.get());
            // the updater may itself have set the store
            let next = self.get().merge(&partial);

            let keys: Vec<&String> = partial.keys().collect();
            debug!("Setting. keys: {:?}", keys);

            *self.engine.state.lock() = next;
        }

        self.notify();
    }

    /// Shorthand for [`Store::set`] with a [`Patch::Partial`].
    pub fn merge(&self, partial: Tree) {
        self.set(Patch::Partial(partial))
    }

    /// Shorthand for [`Store::set`] with a [`Patch::With`].
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Tree) -> Tree + 'static,
    {
        self.set(Patch::with(f))
    }

    /// Replaces the current tree with a fresh copy of the initial tree.
    ///
    /// The copy shares no nodes with the initial tree or any previous state.
    #[tracing::instrument(level = Level::DEBUG, skip_all, fields(store = %self.engine.options.name))]
    pub fn reset(&self) {
        debug!("Resetting");

        {
            let _write = self.engine.write.lock();
            *self.engine.state.lock() = self.engine.initial.deep_copy();
        }

        if self.engine.options.notify_on_reset {
            self.notify();
        }
    }

    /// Registers `subscriber`, to be called after every mutation.
    ///
    /// Registering the same subscriber (the same `Arc`) again does not add a second entry, both
    /// returned handles then refer to the same registration.
    pub fn subscribe(&self, subscriber: Subscriber) -> Unsubscribe {
        let mut subscribers = self.engine.subscribers.lock();
        let id = match subscribers.find(&subscriber) {
            Some(id) => id,
            None => subscribers.insert(subscriber),
        };
        trace!("subscribed. id: {}, subscribers: {}", id, subscribers.len());

        Unsubscribe {
            id,
            engine: Arc::downgrade(&self.engine),
        }
    }

    /// Registers a closure, see [`Store::subscribe`].
    pub fn on_change<F>(&self, f: F) -> Unsubscribe
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(f))
    }

    pub fn subscriber_count(&self) -> usize {
        self.engine
            .subscribers
            .lock()
            .len()
    }

    /// True if both handles refer to the same engine.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine)
    }

    /// A handle that does not keep the engine alive.
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            engine: Arc::downgrade(&self.engine),
        }
    }

    /// Calls each subscriber once.
    ///
    /// The subscriber set is re-examined before each call: subscribers removed by an earlier
    /// callback are skipped, subscribers added by an earlier callback are called too.
    fn notify(&self) {
        trace!("Notifying. subscribers: {}", self.subscriber_count());

        let mut previous = None;
        loop {
            let next = self
                .engine
                .subscribers
                .lock()
                .next_after(previous);
            let Some((id, subscriber)) = next else {
                break;
            };
            previous = Some(id);
            subscriber();
        }
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.engine.options.name)
            .field("state", &*self.engine.state.lock())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// See [`Store::downgrade`].
#[derive(Clone)]
pub struct WeakStore {
    engine: Weak<Engine>,
}

impl WeakStore {
    /// `None` once every [`Store`] handle is gone.
    pub fn upgrade(&self) -> Option<Store> {
        self.engine
            .upgrade()
            .map(|engine| Store {
                engine,
            })
    }

    /// Like [`WeakStore::upgrade`], failing with [`StoreError::StoreNotFound`].
    pub fn store(&self) -> Result<Store, StoreError> {
        self.upgrade()
            .ok_or(StoreError::StoreNotFound)
    }
}

impl Debug for WeakStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakStore")
            .field("alive", &(self.engine.strong_count() > 0))
            .finish()
    }
}

/// Removes one registration from a store, see [`Store::subscribe`].
///
/// Dropping an `Unsubscribe` does not unsubscribe.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    id: u64,
    engine: Weak<Engine>,
}

impl Unsubscribe {
    /// Safe to call more than once, and after the store is gone.
    pub fn unsubscribe(&self) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        let removed = engine
            .subscribers
            .lock()
            .remove(self.id);
        if removed.is_some() {
            trace!("unsubscribed. id: {}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::value::Value;

    fn tree(value: serde_json::Value) -> Tree {
        Tree::try_from(value).expect("object")
    }

    fn counter(store: &Store) -> (Arc<AtomicUsize>, Unsubscribe) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_subscriber = calls.clone();
        let unsubscribe = store.on_change(move || {
            calls_for_subscriber.fetch_add(1, Ordering::SeqCst);
        });
        (calls, unsubscribe)
    }

    #[test]
    pub fn set_merges_the_top_level() {
        // given
        let store = Store::new(tree(json!({"count": 0, "user": {"name": "a"}})));
        let user_before = store.get().get("user").cloned().unwrap();

        // when
        store.set(tree(json!({"count": 5})));

        // then
        let state = store.get();
        assert_eq!(state.to_json(), json!({"count": 5, "user": {"name": "a"}}));
        assert!(state.get("user").unwrap().is_same(&user_before));
    }

    #[test]
    pub fn set_with_updater_receives_the_current_tree() {
        // given
        let store = Store::new(tree(json!({"count": 1, "other": true})));

        // when
        store.update(|current| {
            let count = current.get("count").and_then(Value::as_i64).unwrap();
            Tree::from_entries([("count", Value::from(json!(count + 1)))])
        });

        // then
        assert_eq!(store.get().to_json(), json!({"count": 2, "other": true}));
    }

    #[test]
    pub fn previous_trees_are_snapshots() {
        // given
        let store = Store::new(tree(json!({"count": 0})));
        let snapshot = store.get();

        // when
        store.merge(tree(json!({"count": 1})));

        // then
        assert_eq!(snapshot.to_json(), json!({"count": 0}));
        assert_eq!(store.get().to_json(), json!({"count": 1}));
    }

    #[test]
    pub fn each_set_notifies_every_subscriber_once() {
        // given
        let store = Store::new(tree(json!({"count": 0})));
        let (first, _) = counter(&store);
        let (second, _) = counter(&store);

        // when
        store.merge(tree(json!({"count": 1})));
        store.merge(tree(json!({"count": 1})));

        // then
        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    pub fn subscribers_are_notified_in_registration_order() {
        // given
        let store = Store::new(tree(json!({})));
        let order = Arc::new(Mutex::new(Vec::new()));
        for index in 0..3 {
            let order = order.clone();
            store.on_change(move || order.lock().push(index));
        }

        // when
        store.merge(tree(json!({"a": 1})));

        // then
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    pub fn unsubscribed_callback_is_not_called() {
        // given
        let store = Store::new(tree(json!({"count": 0})));
        let (calls, unsubscribe) = counter(&store);

        // when
        unsubscribe.unsubscribe();
        unsubscribe.unsubscribe();
        store.merge(tree(json!({"count": 1})));

        // then
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    pub fn subscribing_the_same_callback_twice_registers_it_once() {
        // given
        let store = Store::new(tree(json!({})));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_subscriber = calls.clone();
        let subscriber: Subscriber = Arc::new(move || {
            calls_for_subscriber.fetch_add(1, Ordering::SeqCst);
        });

        // when
        let first = store.subscribe(subscriber.clone());
        let _second = store.subscribe(subscriber);
        store.merge(tree(json!({"a": 1})));

        // then
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.subscriber_count(), 1);

        // and either handle removes the registration
        first.unsubscribe();
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    pub fn callback_can_subscribe_again_after_unsubscribing() {
        // given
        let store = Store::new(tree(json!({})));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_subscriber = calls.clone();
        let subscriber: Subscriber = Arc::new(move || {
            calls_for_subscriber.fetch_add(1, Ordering::SeqCst);
        });
        store
            .subscribe(subscriber.clone())
            .unsubscribe();

        // when
        let _first = store.subscribe(subscriber.clone());
        let _second = store.subscribe(subscriber);
        store.merge(tree(json!({"a": 1})));

        // then
        assert_eq!(store.subscriber_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    pub fn unsubscribe_only_removes_its_own_callback() {
        // given
        let store = Store::new(tree(json!({})));
        let (removed, unsubscribe) = counter(&store);
        let (kept, _) = counter(&store);

        // when
        unsubscribe.unsubscribe();
        store.merge(tree(json!({"a": 1})));

        // then
        assert_eq!(removed.load(Ordering::SeqCst), 0);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
    }

    #[test]
    pub fn unsubscribe_after_the_store_is_dropped_is_a_no_op() {
        // given
        let store = Store::new(tree(json!({})));
        let (_, unsubscribe) = counter(&store);

        // when
        drop(store);

        // then
        unsubscribe.unsubscribe();
    }

    #[test]
    pub fn subscriber_removed_during_a_pass_is_skipped() {
        // given
        let store = Store::new(tree(json!({})));
        let pending: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));

        // and a subscriber that removes the one registered after it
        let pending_for_remover = pending.clone();
        store.on_change(move || {
            if let Some(unsubscribe) = pending_for_remover.lock().take() {
                unsubscribe.unsubscribe();
            }
        });
        let (removed_calls, removed) = counter(&store);
        *pending.lock() = Some(removed);

        // when
        store.merge(tree(json!({"a": 1})));

        // then
        assert_eq!(removed_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.subscriber_count(), 1);
    }

    #[test]
    pub fn subscriber_added_during_a_pass_is_called() {
        // given
        let store = Store::new(tree(json!({})));
        let added_calls = Arc::new(AtomicUsize::new(0));

        // and a subscriber that registers another one, once
        let store_for_adder = store.clone();
        let added_calls_for_adder = added_calls.clone();
        let added = Arc::new(Mutex::new(false));
        store.on_change(move || {
            let mut added = added.lock();
            if !*added {
                *added = true;
                let added_calls = added_calls_for_adder.clone();
                store_for_adder.on_change(move || {
                    added_calls.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        // when
        store.merge(tree(json!({"a": 1})));

        // then
        assert_eq!(added_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.subscriber_count(), 2);
    }

    #[test]
    pub fn reset_restores_a_fresh_copy_of_the_initial_tree() {
        // given
        let initial = tree(json!({"count": 0, "user": {"name": "a"}}));
        let store = Store::new(initial.clone());
        let (calls, _) = counter(&store);
        store.merge(tree(json!({"count": 5, "extra": 1})));

        // when
        store.reset();

        // then
        let state = store.get();
        assert_eq!(state, initial);
        assert!(!state.ptr_eq(&initial));
        assert!(!state.ptr_eq(&store.initial()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    pub fn changes_after_reset_do_not_leak_into_the_next_reset() {
        // given
        let initial = tree(json!({"count": 0, "user": {"name": "a"}}));
        let store = Store::new(initial.clone());
        store.reset();

        // when
        let reset_state = store.get();
        store.merge(reset_state.with("user", Value::from(json!({"name": "changed"}))));
        store.reset();

        // then
        assert_eq!(store.get(), initial);
    }

    #[test]
    pub fn reset_without_notification() {
        // given
        let store = Store::with_options(tree(json!({"count": 0})), StoreOptions {
            name: "quiet".to_string(),
            notify_on_reset: false,
        });
        let (calls, _) = counter(&store);
        store.merge(tree(json!({"count": 1})));

        // when
        store.reset();

        // then
        assert_eq!(store.get().to_json(), json!({"count": 0}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    pub fn stores_do_not_share_nodes() {
        // given
        let initial = tree(json!({"user": {"name": "a"}}));

        // when
        let first = Store::new(initial.clone());
        let second = Store::new(initial);

        // then
        assert!(!first.ptr_eq(&second));
        assert!(
            !first.get().get("user").unwrap().is_same(second.get().get("user").unwrap())
        );
    }

    #[test]
    pub fn reentrant_set_runs_a_nested_cycle() {
        // given
        let store = Store::new(tree(json!({"count": 0})));
        let seen = Arc::new(Mutex::new(Vec::new()));

        // and a subscriber that bumps the count until it reaches 2
        let store_for_subscriber = store.clone();
        let seen_for_subscriber = seen.clone();
        store.on_change(move || {
            let count = store_for_subscriber
                .get()
                .get("count")
                .and_then(Value::as_i64)
                .unwrap();
            seen_for_subscriber.lock().push(count);
            if count < 2 {
                store_for_subscriber.merge(Tree::from_entries([("count", Value::from(json!(count + 1)))]));
            }
        });

        // when
        store.merge(tree(json!({"count": 1})));

        // then
        assert_eq!(store.get().to_json(), json!({"count": 2}));
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    pub fn concurrent_updaters_see_every_previous_write() {
        // given
        let store = Store::new(tree(json!({"count": 0})));
        let (calls, _) = counter(&store);

        // when
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        store.update(|current| {
                            let count = current.get("count").and_then(Value::as_i64).unwrap();
                            Tree::from_entries([("count", Value::from(json!(count + 1)))])
                        });
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        // then
        assert_eq!(store.get().to_json(), json!({"count": 4000}));
        assert_eq!(calls.load(Ordering::SeqCst), 4000);
    }

    #[test]
    pub fn updater_may_set_the_same_store() {
        // given
        let store = Store::new(tree(json!({"count": 0, "flag": false})));
        let store_for_updater = store.clone();

        // when
        store.update(move |_| {
            store_for_updater.merge(tree(json!({"flag": true})));
            tree(json!({"count": 1}))
        });

        // then
        assert_eq!(store.get().to_json(), json!({"count": 1, "flag": true}));
    }

    #[test]
    pub fn options_deserialize_with_defaults() {
        // when
        let options: StoreOptions = serde_json::from_value(json!({"name": "app"})).unwrap();

        // then
        assert_eq!(options.name, "app");
        assert!(options.notify_on_reset);
    }
}
