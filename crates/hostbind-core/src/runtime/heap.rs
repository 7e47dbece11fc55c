//! Generational object heap backing the host runtime.
//!
//! Objects are stored in a Vec with generation tracking. When an object's
//! reference count reaches zero its slot is emptied, the generation is bumped
//! and the index goes on the free list. Handles carry the generation they
//! were issued with, so a handle (or weak handle) to a freed object can be
//! detected instead of silently aliasing whatever reuses the slot.

use super::value::HostValue;

/// Handle to an object in the host heap.
///
/// This is the raw, uncounted handle: holding one does not keep the object
/// alive. `HostObject` is the owning wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl ObjectHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Non-owning reference to a host object.
///
/// Never keeps the target alive; `runtime::upgrade` checks whether the
/// target still exists before producing a counted reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WeakHandle(pub(crate) ObjectHandle);

pub(crate) struct ObjectHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
}

struct HeapSlot {
    generation: u32,
    value: Option<HostValue>,
    ref_count: u32,
    immortal: bool,
}

impl ObjectHeap {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Allocate a new object with a reference count of one.
    pub(crate) fn allocate(&mut self, value: HostValue) -> ObjectHandle {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            slot.ref_count = 1;
            slot.immortal = false;
            ObjectHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                value: Some(value),
                ref_count: 1,
                immortal: false,
            });
            ObjectHandle::new(index, 0)
        }
    }

    /// Allocate an object that is never freed, whatever its count.
    pub(crate) fn allocate_immortal(&mut self, value: HostValue) -> ObjectHandle {
        let handle = self.allocate(value);
        self.slots[handle.index as usize].immortal = true;
        handle
    }

    fn slot(&self, handle: ObjectHandle) -> Option<&HeapSlot> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    fn slot_mut(&mut self, handle: ObjectHandle) -> Option<&mut HeapSlot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    /// Returns None if the handle is stale.
    pub(crate) fn get(&self, handle: ObjectHandle) -> Option<&HostValue> {
        self.slot(handle)?.value.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut HostValue> {
        self.slot_mut(handle)?.value.as_mut()
    }

    /// Increment the reference count. Returns false for stale handles.
    pub(crate) fn add_ref(&mut self, handle: ObjectHandle) -> bool {
        match self.slot_mut(handle) {
            Some(slot) => {
                slot.ref_count = slot.ref_count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Decrement the reference count.
    ///
    /// When the count reaches zero the value is moved out and returned so the
    /// caller can tear it down without holding a borrow of the heap.
    pub(crate) fn release(&mut self, handle: ObjectHandle) -> Option<HostValue> {
        let slot = self.slot_mut(handle)?;
        slot.ref_count = slot.ref_count.saturating_sub(1);
        if slot.ref_count > 0 || slot.immortal {
            return None;
        }
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.live -= 1;
        value
    }

    pub(crate) fn ref_count(&self, handle: ObjectHandle) -> Option<u32> {
        self.slot(handle).map(|slot| slot.ref_count)
    }

    pub(crate) fn is_live(&self, handle: ObjectHandle) -> bool {
        self.slot(handle).is_some()
    }

    /// Number of objects currently allocated, immortals included.
    pub(crate) fn live_count(&self) -> usize {
        self.live
    }
}
