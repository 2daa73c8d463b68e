/*!
Kernel identities.

Every distinct kernel shape gets a stable numeric identity the first time it is
requested. Generated kernel names are derived from it, so repeated invocations of
the same logical kernel produce the same name and can be recognized by a program
cache downstream.

```
# use krnl_source::kernel::name::{IdentityCache, ShapeKey};
let cache = IdentityCache::new();
let saxpy = cache.get_identity(&ShapeKey::new("saxpy"));
let scale = cache.get_identity(&ShapeKey::new("scale"));
assert_eq!(cache.get_identity(&ShapeKey::new("saxpy")), saxpy);
assert_ne!(saxpy, scale);
```
*/

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display},
    hash::Hash,
    sync::atomic::{AtomicUsize, Ordering},
};

/** A stable fingerprint of a kernel shape.

Supplied by the caller, typically a registration token such as the path of the
function describing the kernel, or a hash of its structure. */
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeKey(String);

impl ShapeKey {
    /// A key from a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
    /// A key from the hash of `value`.
    ///
    /// Uses [`fxhash`], which is stable across runs of the same build.
    pub fn from_hash<H: Hash + ?Sized>(value: &H) -> Self {
        Self(format!("{:016x}", fxhash::hash64(value)))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ShapeKey {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for ShapeKey {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&ShapeKey> for ShapeKey {
    fn from(key: &ShapeKey) -> Self {
        key.clone()
    }
}

impl Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/** Memoized kernel identities.

Ids are allocated from a single counter starting at 0. Allocation happens under
the map entry's lock, so concurrent first requests for one key observe the same
id and advance the counter once. */
#[derive(Debug, Default)]
pub struct IdentityCache {
    ids: DashMap<ShapeKey, usize>,
    next: AtomicUsize,
}

impl IdentityCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }
    /// The process wide cache.
    pub fn global() -> &'static Self {
        static GLOBAL: Lazy<IdentityCache> = Lazy::new(IdentityCache::new);
        &GLOBAL
    }
    /// The identity of `key`, allocating one if it is new.
    pub fn get_identity(&self, key: &ShapeKey) -> usize {
        if let Some(id) = self.ids.get(key) {
            return *id;
        }
        let id = *self.ids.entry(key.clone()).or_insert_with(|| {
            let id = self.next.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(shape = %key, id, "kernel identity allocated");
            id
        });
        id
    }
    /// The identity of `key`, if one was allocated.
    pub fn get(&self, key: &ShapeKey) -> Option<usize> {
        self.ids.get(key).map(|id| *id)
    }
    /// The number of identities allocated.
    pub fn allocated(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
    pub fn len(&self) -> usize {
        self.ids.len()
    }
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// The identity of `key` in the [global](IdentityCache::global) cache.
pub fn get_identity(key: &ShapeKey) -> usize {
    IdentityCache::global().get_identity(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn identities_start_at_zero() {
        let cache = IdentityCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.get_identity(&"a".into()), 0);
        assert_eq!(cache.get_identity(&"b".into()), 1);
        assert_eq!(cache.get_identity(&"a".into()), 0);
        assert_eq!(cache.allocated(), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"c".into()), None);
    }

    #[test]
    fn concurrent_first_requests_allocate_once() {
        const THREADS: usize = 16;
        let cache = Arc::new(IdentityCache::new());
        cache.get_identity(&"warmup".into());
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.get_identity(&ShapeKey::new("contended"))
                })
            })
            .collect();
        let ids: Vec<usize> = handles.into_iter().map(|x| x.join().unwrap()).collect();
        assert!(ids.iter().all(|id| *id == 1));
        assert_eq!(cache.allocated(), 2);
    }

    #[test]
    fn shape_key_from_hash() {
        let a = ShapeKey::from_hash(&("saxpy", 3u32));
        let b = ShapeKey::from_hash(&("saxpy", 3u32));
        let c = ShapeKey::from_hash(&("saxpy", 4u32));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 16);
    }
}
