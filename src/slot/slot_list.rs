use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};

use derive_more::Display;
use parking_lot::{Mutex, RwLock};

use super::{ArraySourceRef, InputSlot};

/// The stable identity of a [`SlotList`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("slot list {_0}")]
pub struct SlotListId(u64);

impl SlotListId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An observer of sub-slot insertion and removal on a [`SlotList`].
///
/// Observers are notified after the list has been updated and its lock released, so they may inspect the list.
pub trait SlotListObserver: Send + Sync {
    /// A sub-slot was inserted at `index` of `list`.
    fn slot_inserted(&self, list: &SlotList, index: usize);

    /// A sub-slot was removed from `index` of `list`.
    fn slot_removed(&self, list: &SlotList, index: usize);
}

/// An ordered list of sub-slots sharing one name.
///
/// Each sub-slot is an [`InputSlot`], which may be unconnected.
/// A list has a stable [`SlotListId`] that observers and operators key lookup tables off.
pub struct SlotList {
    id: SlotListId,
    name: &'static str,
    slots: RwLock<Vec<Arc<InputSlot>>>,
    observers: Mutex<Vec<Weak<dyn SlotListObserver>>>,
}

impl std::fmt::Debug for SlotList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotList")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

enum Change {
    Inserted(usize),
    Removed(usize),
}

impl SlotList {
    /// Create a new empty slot list.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            id: SlotListId::next(),
            name,
            slots: RwLock::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Return the identity of the list.
    #[must_use]
    pub fn id(&self) -> SlotListId {
        self.id
    }

    /// Return the name of the list.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the number of sub-slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns true if the list has no sub-slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Return the sub-slot at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Arc<InputSlot>> {
        self.slots.read().get(index).cloned()
    }

    /// Return a snapshot of the sub-slots.
    #[must_use]
    pub fn slots(&self) -> Vec<Arc<InputSlot>> {
        self.slots.read().clone()
    }

    /// Returns true if the list is not empty and every sub-slot is ready.
    #[must_use]
    pub fn ready(&self) -> bool {
        let slots = self.slots.read();
        !slots.is_empty() && slots.iter().all(|slot| slot.ready())
    }

    /// Subscribe `observer` to insertions and removals.
    ///
    /// The observer is held weakly and is dropped from the list once it no longer exists.
    pub fn subscribe(&self, observer: Weak<dyn SlotListObserver>) {
        self.observers.lock().push(observer);
    }

    /// Append a new sub-slot connected to `source` and return its index.
    pub fn push(&self, source: ArraySourceRef) -> usize {
        let slot = Arc::new(InputSlot::new_connected(self.name, source));
        self.push_slot(slot)
    }

    /// Append `slot` and return its index.
    pub fn push_slot(&self, slot: Arc<InputSlot>) -> usize {
        let index = {
            let mut slots = self.slots.write();
            slots.push(slot);
            slots.len() - 1
        };
        self.notify(&Change::Inserted(index));
        index
    }

    /// Insert a new sub-slot connected to `source` at `index`.
    ///
    /// # Panics
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, source: ArraySourceRef) {
        let slot = Arc::new(InputSlot::new_connected(self.name, source));
        self.insert_slot(index, slot);
    }

    /// Insert `slot` at `index`.
    ///
    /// # Panics
    /// Panics if `index > len`.
    pub fn insert_slot(&self, index: usize, slot: Arc<InputSlot>) {
        self.slots.write().insert(index, slot);
        self.notify(&Change::Inserted(index));
    }

    /// Remove and return the sub-slot at `index`.
    ///
    /// Returns [`None`] if `index` is out of bounds.
    pub fn remove(&self, index: usize) -> Option<Arc<InputSlot>> {
        let removed = {
            let mut slots = self.slots.write();
            (index < slots.len()).then(|| slots.remove(index))
        };
        if removed.is_some() {
            self.notify(&Change::Removed(index));
        }
        removed
    }

    /// Connect the sub-slot at `index` to `source`.
    ///
    /// Returns false if `index` is out of bounds.
    pub fn set(&self, index: usize, source: ArraySourceRef) -> bool {
        match self.get(index) {
            Some(slot) => {
                slot.connect(source);
                true
            }
            None => false,
        }
    }

    /// Resize the list to `len` sub-slots, appending unconnected sub-slots or removing sub-slots from the end.
    pub fn resize(&self, len: usize) {
        while self.len() > len {
            self.remove(self.len() - 1);
        }
        while self.len() < len {
            self.push_slot(Arc::new(InputSlot::new(self.name)));
        }
    }

    fn notify(&self, change: &Change) {
        let observers: Vec<Arc<dyn SlotListObserver>> = {
            let mut observers = self.observers.lock();
            observers.retain(|observer| observer.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            match *change {
                Change::Inserted(index) => observer.slot_inserted(self, index),
                Change::Removed(index) => observer.slot_removed(self, index),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{array::AxisTags, slot::MemorySource};

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl SlotListObserver for Recorder {
        fn slot_inserted(&self, list: &SlotList, index: usize) {
            self.0.lock().push(format!("+{index}/{}", list.len()));
        }

        fn slot_removed(&self, list: &SlotList, index: usize) {
            self.0.lock().push(format!("-{index}/{}", list.len()));
        }
    }

    fn source() -> ArraySourceRef {
        Arc::new(MemorySource::from_elements(vec![1], AxisTags::from_keys("x"), vec![0u8]).unwrap())
    }

    #[test]
    fn slot_list_ids_are_unique() {
        let list0 = SlotList::new("Images");
        let list1 = SlotList::new("Images");
        assert_ne!(list0.id(), list1.id());
        assert_eq!(list0.name(), "Images");
    }

    #[test]
    fn slot_list_insert_remove_notify() {
        let list = SlotList::new("Images");
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn SlotListObserver> = recorder.clone();
        list.subscribe(Arc::downgrade(&observer));
        assert!(!list.ready());
        assert_eq!(list.push(source()), 0);
        list.insert(0, source());
        list.resize(3);
        assert_eq!(list.len(), 3);
        assert!(!list.ready());
        assert!(list.set(2, source()));
        assert!(!list.set(3, source()));
        assert!(list.ready());
        assert!(list.remove(1).is_some());
        assert!(list.remove(5).is_none());
        list.resize(1);
        assert_eq!(
            *recorder.0.lock(),
            vec!["+0/1", "+0/2", "+2/3", "-1/2", "-1/1"]
        );
        drop(observer);
        drop(recorder);
        list.push(source());
        assert!(list.observers.lock().is_empty());
    }
}
