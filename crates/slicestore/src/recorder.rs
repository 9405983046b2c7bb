//! Path recording.
//!
//! A selector is a function that walks from the root of the state to the slice a consumer depends
//! on.  Instead of running it against real data, it is given a [`Placeholder`] that records every
//! key it is asked for, yielding the path the selector would have walked.
//!
//! ```
//! use slicestore::{track, Path};
//!
//! let path = track(|state| state.at("user").at("address").at("city"));
//!
//! assert_eq!(path, Path::from(["user", "address", "city"]));
//! ```
//!
//! Only unconditional chains of key accesses can be recorded.  The placeholder has no value, so a
//! selector that decides which key to access based on the data it sees will record a path that
//! has nothing to do with what it would read from a real tree.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::path::Path;

/// A stand-in for the root of the state, see the module docs.
///
/// Every [`Placeholder::at`] call appends a key to the log shared by all clones of the
/// placeholder and returns the same placeholder, so chained accesses are recorded in order.
#[derive(Debug, Clone)]
pub struct Placeholder {
    keys: Rc<RefCell<Vec<String>>>,
}

impl Placeholder {
    pub fn at(self, key: impl Into<String>) -> Self {
        self.keys
            .borrow_mut()
            .push(key.into());
        self
    }
}

/// Read side of a recording, see [`create_path_recorder`].
#[derive(Debug)]
pub struct PathRecorder {
    keys: Rc<RefCell<Vec<String>>>,
}

impl PathRecorder {
    /// The keys recorded so far.
    ///
    /// The returned path is a copy, later accesses on the placeholder do not affect it.
    pub fn path(&self) -> Path {
        Path::from(self.keys.borrow().clone())
    }
}

/// Creates a placeholder and the recorder that observes it.
pub fn create_path_recorder() -> (Placeholder, PathRecorder) {
    let keys = Rc::new(RefCell::new(Vec::new()));
    (
        Placeholder {
            keys: keys.clone(),
        },
        PathRecorder {
            keys,
        },
    )
}

/// Runs `selector` against a placeholder and returns the path it walked.
///
/// A selector that accesses nothing, e.g. `|state| state`, tracks the whole tree.
pub fn track<F>(selector: F) -> Path
where
    F: FnOnce(Placeholder) -> Placeholder,
{
    let (placeholder, recorder) = create_path_recorder();
    let _ = selector(placeholder);
    let path = recorder.path();
    trace!("tracked selector. path: '{}'", path);
    path
}
