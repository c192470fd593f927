//! Specialized collection types

use std::sync::{Arc, RwLock};

pub use slotmap::{SlotMap, DefaultKey};

/// Handle-based map using slot map for stable references
pub type HandleMap<T> = SlotMap<DefaultKey, T>;

/// Handle type for stable references
pub type Handle = DefaultKey;

/// Typed handle for type-safe asset references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypedHandle<T> {
    key: DefaultKey,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> TypedHandle<T> {
    /// Create a new typed handle from a key
    pub fn new(key: DefaultKey) -> Self {
        Self {
            key,
            _phantom: std::marker::PhantomData,
        }
    }
    
    /// Get the underlying key
    pub fn key(&self) -> DefaultKey {
        self.key
    }
}

/// Free list for object pooling
pub struct FreeList<T> {
    items: Vec<Option<T>>,
    free_indices: Vec<usize>,
}

impl<T> FreeList<T> {
    /// Create a new free list
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            free_indices: Vec::new(),
        }
    }
    
    /// Insert an item and return its index
    pub fn insert(&mut self, item: T) -> usize {
        if let Some(index) = self.free_indices.pop() {
            self.items[index] = Some(item);
            index
        } else {
            let index = self.items.len();
            self.items.push(Some(item));
            index
        }
    }
    
    /// Remove an item by index
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index < self.items.len() {
            if let Some(item) = self.items[index].take() {
                self.free_indices.push(index);
                Some(item)
            } else {
                None
            }
        } else {
            None
        }
    }
    
    /// Get an item by index
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)?.as_ref()
    }
    
    /// Get a mutable reference to an item by index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)?.as_mut()
    }
}

impl<T> Default for FreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only list supporting lock-free-style iteration over a stable snapshot.
///
/// Entries are never removed, only appended, matching the pipeline-variant and
/// scratch-allocator usage this type serves: readers take a cheap `Arc` snapshot
/// and iterate it without blocking concurrent inserts for more than the instant
/// it takes to publish a new snapshot. Nodes are never freed while the list is
/// alive, so a snapshot taken by one thread remains valid even if another thread
/// inserts immediately after.
pub struct LockFreeList<T> {
    snapshot: RwLock<Arc<Vec<Arc<T>>>>,
}

impl<T> Default for LockFreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LockFreeList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Appends an item and returns a handle to it.
    pub fn insert(&self, item: T) -> Arc<T> {
        let item = Arc::new(item);
        let mut guard = self.snapshot.write().expect("lock-free list poisoned");
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(Arc::clone(&item));
        *guard = Arc::new(next);
        item
    }

    /// Returns a stable snapshot of the current contents.
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        Arc::clone(&self.snapshot.read().expect("lock-free list poisoned"))
    }

    /// Finds the first entry matching `pred` in the current snapshot.
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<Arc<T>> {
        self.snapshot().iter().find(|item| pred(item)).cloned()
    }
}

/// Atomically stores the greater of the current and desired `u64` values.
///
/// Returns the value that was previously stored.
pub fn atomic_max_u64(value: &std::sync::atomic::AtomicU64, desired: u64) -> u64 {
    use std::sync::atomic::Ordering;
    let mut current = value.load(Ordering::Acquire);
    while desired > current {
        match value.compare_exchange_weak(current, desired, Ordering::Release, Ordering::Acquire) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn lock_free_list_preserves_insertion_order() {
        let list = LockFreeList::new();
        list.insert(1);
        list.insert(2);
        list.insert(3);
        let values: Vec<i32> = list.snapshot().iter().map(|v| **v).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn atomic_max_only_increases() {
        let value = AtomicU64::new(5);
        assert_eq!(atomic_max_u64(&value, 3), 5);
        assert_eq!(value.load(std::sync::atomic::Ordering::Acquire), 5);
        assert_eq!(atomic_max_u64(&value, 10), 5);
        assert_eq!(value.load(std::sync::atomic::Ordering::Acquire), 10);
    }
}
