//! Handle registries.
//!
//! Both lists identify a handle by the address of its registration
//! slot. Append is O(1); removal is O(1) swap-remove, using the
//! registry index each slot carries.

use std::ptr::NonNull;

use crate::handle::{GcSlot, RawSlot, UNREGISTERED};

/// Registered handle slots, managed and raw.
pub(crate) struct HandleRegistry {
    managed: Vec<NonNull<GcSlot>>,
    raw: Vec<NonNull<RawSlot>>,
}

impl HandleRegistry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            managed: Vec::with_capacity(capacity),
            raw: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn attach_managed(&mut self, slot: NonNull<GcSlot>) {
        debug_assert!(!unsafe { slot.as_ref() }.is_attached());
        unsafe { slot.as_ref() }.set_registry_index(self.managed.len());
        self.managed.push(slot);
    }

    pub(crate) fn detach_managed(&mut self, slot: &GcSlot) {
        let index = slot.registry_index();
        debug_assert!(index != UNREGISTERED, "detach of unregistered handle");
        if index == UNREGISTERED || index >= self.managed.len() {
            return;
        }
        debug_assert!(std::ptr::eq(self.managed[index].as_ptr(), slot));

        self.managed.swap_remove(index);
        if let Some(moved) = self.managed.get(index) {
            unsafe { moved.as_ref() }.set_registry_index(index);
        }
        slot.set_registry_index(UNREGISTERED);
    }

    pub(crate) fn attach_raw(&mut self, slot: NonNull<RawSlot>) {
        debug_assert!(!unsafe { slot.as_ref() }.is_attached());
        unsafe { slot.as_ref() }.set_registry_index(self.raw.len());
        self.raw.push(slot);
    }

    pub(crate) fn detach_raw(&mut self, slot: &RawSlot) {
        let index = slot.registry_index();
        debug_assert!(index != UNREGISTERED, "detach of unregistered handle");
        if index == UNREGISTERED || index >= self.raw.len() {
            return;
        }
        debug_assert!(std::ptr::eq(self.raw[index].as_ptr(), slot));

        self.raw.swap_remove(index);
        if let Some(moved) = self.raw.get(index) {
            unsafe { moved.as_ref() }.set_registry_index(index);
        }
        slot.set_registry_index(UNREGISTERED);
    }

    #[inline]
    pub(crate) fn managed(&self) -> &[NonNull<GcSlot>] {
        &self.managed
    }

    #[inline]
    pub(crate) fn raw(&self) -> &[NonNull<RawSlot>] {
        &self.raw
    }

    #[inline]
    pub(crate) fn total_handles(&self) -> usize {
        self.managed.len() + self.raw.len()
    }
}

// Safety: the registry stores raw slot pointers whose referents stay
// alive until detached, and every attach/detach happens through the
// graph's handle lock.
unsafe impl Send for HandleRegistry {}
