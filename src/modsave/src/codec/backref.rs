//! Lossy back-edge wrapper for cyclic object graphs.
//!
//! Engine objects reference each other both ways (a machine knows its
//! inventory, the inventory knows its machine). The forward edge is owned
//! and serializes structurally; the back edge is held through [`BackRef`],
//! which always encodes as `null` and comes back dangling after a decode.
//! Dropping the cycle edge is intentional and lossy - owners are expected to
//! rebind back-references after loading.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// A non-owning back-reference that is dropped during serialization.
pub struct BackRef<T>(Weak<RefCell<T>>);

impl<T> BackRef<T> {
    /// Create a back-reference to `target`.
    pub fn new(target: &Rc<RefCell<T>>) -> Self {
        BackRef(Rc::downgrade(target))
    }

    /// Create a dangling back-reference, the state every [`BackRef`] decodes
    /// into.
    pub fn empty() -> Self {
        BackRef(Weak::new())
    }

    /// Access the referenced value, if the owner is still alive.
    pub fn upgrade(&self) -> Option<Rc<RefCell<T>>> {
        self.0.upgrade()
    }

    /// Point this back-reference at `target`. Used to restore graph edges
    /// after a decode.
    pub fn rebind(&mut self, target: &Rc<RefCell<T>>) {
        self.0 = Rc::downgrade(target);
    }

    /// Whether the referenced value has been dropped (or was never set).
    pub fn is_dangling(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl<T> Default for BackRef<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Clone for BackRef<T> {
    fn clone(&self) -> Self {
        BackRef(self.0.clone())
    }
}

impl<T> fmt::Debug for BackRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dangling() {
            f.write_str("BackRef(dangling)")
        } else {
            f.write_str("BackRef(live)")
        }
    }
}

impl<T> Serialize for BackRef<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // The cycle edge is omitted: always null, never the target.
        serializer.serialize_unit()
    }
}

impl<'de, T> Deserialize<'de> for BackRef<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Accept whatever is in the file (old saves may predate the null
        // form) and discard it.
        IgnoredAny::deserialize(deserializer)?;
        Ok(BackRef::empty())
    }
}
