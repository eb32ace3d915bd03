//! Managed and raw handle types.
//!
//! A handle is a smart-pointer-like value registered with the
//! process-wide graph. The graph identifies a handle by the address
//! of its registration slot, so slot addresses must stay stable for
//! as long as the slot is registered:
//!
//! - [`GcRoot`] boxes its slot. The root value itself moves freely
//!   (returned, stored, sent across threads) while the registered
//!   storage stays put on the plain heap, outside every managed
//!   allocation. A root therefore always anchors its target during a
//!   collection.
//! - [`Gc`] and [`RawGc`] embed their slot directly. They start empty
//!   and detached; when their containing object enters the managed
//!   domain via [`GcRoot::new`], each embedded handle is registered
//!   at its final in-place address (see [`Trace`]). Their own `Drop`
//!   deregisters them when the containing object is destroyed.
//!
//! Handle contents are read and written only with the graph's handle
//! lock held, which makes a collection's snapshot atomic with respect
//! to handle mutation.

use std::any::Any;
use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::graph::Graph;
use crate::trace::{Trace, Tracer};

/// Type-erased strong reference to a managed payload.
pub(crate) type Strong = Arc<dyn Any + Send + Sync>;

/// Registry index of a slot that is not currently attached.
pub(crate) const UNREGISTERED: usize = usize::MAX;

// =============================================================================
// Payload
// =============================================================================

/// Heap cell holding a managed value.
///
/// The wrapper's `Drop` runs before the value's own fields drop, so
/// the allocation's range leaves the directory before the embedded
/// handles detach. A collection interleaving between the two steps
/// sees handles whose storage is inside no registered range and
/// classifies them as roots, which errs on the side of keeping their
/// targets alive.
#[repr(transparent)]
pub(crate) struct Payload<T> {
    pub(crate) value: T,
}

impl<T> Drop for Payload<T> {
    fn drop(&mut self) {
        if mem::size_of::<T>() > 0 {
            Graph::global().remove_range(self as *const Self as usize);
        }
    }
}

// =============================================================================
// Registration slots
// =============================================================================

/// Registration record embedded in every managed handle.
///
/// Opaque to user code; [`Tracer`] implementations receive slots and
/// hand them back to the registry unchanged.
pub struct GcSlot {
    /// Strong reference to the payload, if any. Guarded by the
    /// graph's handle lock.
    strong: UnsafeCell<Option<Strong>>,
    /// Position in the managed-handle registry, or `UNREGISTERED`.
    index: Cell<usize>,
}

impl GcSlot {
    pub(crate) fn empty() -> Self {
        Self {
            strong: UnsafeCell::new(None),
            index: Cell::new(UNREGISTERED),
        }
    }

    pub(crate) fn holding(strong: Strong) -> Self {
        Self {
            strong: UnsafeCell::new(Some(strong)),
            index: Cell::new(UNREGISTERED),
        }
    }

    /// Borrow the strong reference.
    ///
    /// # Safety
    ///
    /// The caller must hold the graph's handle lock or have exclusive
    /// access to the slot.
    pub(crate) unsafe fn strong_ref(&self) -> Option<&Strong> {
        (*self.strong.get()).as_ref()
    }

    /// Move the strong reference out, leaving the slot empty.
    ///
    /// # Safety
    ///
    /// As for [`GcSlot::strong_ref`].
    pub(crate) unsafe fn take_strong(&self) -> Option<Strong> {
        (*self.strong.get()).take()
    }

    /// Replace the strong reference, returning the previous one.
    ///
    /// # Safety
    ///
    /// As for [`GcSlot::strong_ref`].
    pub(crate) unsafe fn replace_strong(&self, strong: Option<Strong>) -> Option<Strong> {
        mem::replace(&mut *self.strong.get(), strong)
    }

    #[inline]
    pub(crate) fn registry_index(&self) -> usize {
        self.index.get()
    }

    #[inline]
    pub(crate) fn set_registry_index(&self, index: usize) {
        self.index.set(index);
    }

    #[inline]
    pub(crate) fn is_attached(&self) -> bool {
        self.index.get() != UNREGISTERED
    }
}

// Safety: the interior cells are only touched with the graph's handle
// lock held, or while the slot is still exclusively owned (before
// attach, during drop).
unsafe impl Send for GcSlot {}
unsafe impl Sync for GcSlot {}

/// Registration record embedded in every raw handle.
///
/// Carries a plain payload address instead of a strong reference.
pub struct RawSlot {
    /// Observed payload address; 0 when empty. Guarded by the graph's
    /// handle lock.
    addr: Cell<usize>,
    /// Position in the raw-handle registry, or `UNREGISTERED`.
    index: Cell<usize>,
}

impl RawSlot {
    pub(crate) fn empty() -> Self {
        Self {
            addr: Cell::new(0),
            index: Cell::new(UNREGISTERED),
        }
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        self.addr.get()
    }

    #[inline]
    pub(crate) fn set_addr(&self, addr: usize) {
        self.addr.set(addr);
    }

    #[inline]
    pub(crate) fn registry_index(&self) -> usize {
        self.index.get()
    }

    #[inline]
    pub(crate) fn set_registry_index(&self, index: usize) {
        self.index.set(index);
    }

    #[inline]
    pub(crate) fn is_attached(&self) -> bool {
        self.index.get() != UNREGISTERED
    }
}

// Safety: as for GcSlot.
unsafe impl Send for RawSlot {}
unsafe impl Sync for RawSlot {}

// =============================================================================
// GcRoot
// =============================================================================

/// An owning root handle to a managed object.
///
/// Roots live on the stack, in statics, or inside unmanaged
/// structures; their registered storage is never inside a managed
/// allocation, so every object reachable from a live root survives
/// every collection.
///
/// Dropping the last root of an acyclic object releases it through
/// plain reference counting; objects bound in cycles are recovered by
/// [`collect`](crate::collect).
pub struct GcRoot<T> {
    /// Heap cell owned by this root, freed in `Drop`. Kept as a raw
    /// pointer because the registry aliases it for the root's whole
    /// lifetime.
    slot: NonNull<GcSlot>,
    payload: *const T,
}

impl<T: Trace + Send + Sync + 'static> GcRoot<T> {
    /// Move `value` into the managed domain and return the first root
    /// handle to it.
    ///
    /// Registers the payload's memory range, registers every embedded
    /// handle reported by the value's [`Trace`] implementation at its
    /// in-place address, and attaches the root itself.
    pub fn new(value: T) -> Self {
        let graph = Graph::global();
        let arc: Arc<Payload<T>> = Arc::new(Payload { value });
        let base = Arc::as_ptr(&arc) as usize;

        if mem::size_of::<T>() > 0 {
            graph.add_range(base, mem::size_of::<T>());
        }
        graph.adopt(&arc.value);

        let strong: Strong = arc;
        let slot = NonNull::from(Box::leak(Box::new(GcSlot::holding(strong))));
        graph.attach_managed_slot(unsafe { slot.as_ref() });

        GcRoot {
            slot,
            payload: base as *const T,
        }
    }
}

impl<T> GcRoot<T> {
    /// Raw pointer to the payload.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.payload
    }

    #[inline]
    fn slot(&self) -> &GcSlot {
        // Safety: the slot cell lives until this root's Drop frees it.
        unsafe { self.slot.as_ref() }
    }
}

impl<T> Clone for GcRoot<T> {
    fn clone(&self) -> Self {
        let graph = Graph::global();
        let mut registry = graph.lock_handles();
        // A live root's slot always holds its reference; it is never
        // drained because root storage is outside every range.
        let cell = match unsafe { self.slot().strong_ref() } {
            Some(strong) => GcSlot::holding(strong.clone()),
            None => GcSlot::empty(),
        };
        let slot = NonNull::from(Box::leak(Box::new(cell)));
        registry.attach_managed(slot);
        drop(registry);

        GcRoot {
            slot,
            payload: self.payload,
        }
    }
}

impl<T> Deref for GcRoot<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // The slot holds the strong reference for as long as this
        // root exists, so the payload outlives `self`.
        unsafe { &*self.payload }
    }
}

impl<T> Drop for GcRoot<T> {
    fn drop(&mut self) {
        let graph = Graph::global();
        let strong = {
            let mut registry = graph.lock_handles();
            registry.detach_managed(self.slot());
            unsafe { self.slot().take_strong() }
        };
        // The payload destructor may reacquire graph locks.
        drop(strong);
        // Detached and emptied: nothing aliases the cell any more.
        unsafe { drop(Box::from_raw(self.slot.as_ptr())) };
    }
}

impl<T: fmt::Debug> fmt::Debug for GcRoot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcRoot({:?})", &**self)
    }
}

// Safety: the slot is lock-guarded and the payload pointer is only
// dereferenced through Deref, which requires `&self`.
unsafe impl<T: Send + Sync> Send for GcRoot<T> {}
unsafe impl<T: Send + Sync> Sync for GcRoot<T> {}

// =============================================================================
// Gc
// =============================================================================

/// An embeddable managed handle: a field of a managed object that
/// owns a strong reference to another managed object.
///
/// A `Gc` starts empty and unregistered. Embedding it in a value
/// passed to [`GcRoot::new`] registers it at its final storage
/// address; only then may it be assigned. Reads and writes take the
/// graph's handle lock and block for the duration of an in-flight
/// collection.
pub struct Gc<T> {
    slot: GcSlot,
    _marker: PhantomData<T>,
}

impl<T> Gc<T> {
    /// Create an empty, unregistered handle.
    pub fn new() -> Self {
        Self {
            slot: GcSlot::empty(),
            _marker: PhantomData,
        }
    }

    /// Point this handle at the target of `root`.
    ///
    /// # Panics
    ///
    /// Panics if the handle was never registered, i.e. its containing
    /// object has not been allocated with [`GcRoot::new`].
    pub fn set(&self, target: &GcRoot<T>) {
        let graph = Graph::global();
        let old = {
            let _registry = graph.lock_handles();
            assert!(
                self.slot.is_attached(),
                "handle is not registered; allocate its containing object with GcRoot::new first"
            );
            let strong = unsafe { target.slot().strong_ref() }.cloned();
            unsafe { self.slot.replace_strong(strong) }
        };
        // Dropping the displaced reference may run a payload
        // destructor, which reacquires graph locks.
        drop(old);
    }

    /// Drop this handle's strong reference, if any.
    pub fn clear(&self) {
        let graph = Graph::global();
        let old = {
            let _registry = graph.lock_handles();
            unsafe { self.slot.take_strong() }
        };
        drop(old);
    }

    /// Obtain a new root handle to this handle's target.
    ///
    /// Returns `None` when the handle is empty (never assigned,
    /// cleared, or drained by a collection).
    pub fn get(&self) -> Option<GcRoot<T>> {
        let graph = Graph::global();
        let mut registry = graph.lock_handles();
        let strong = unsafe { self.slot.strong_ref() }?.clone();
        let payload = Arc::as_ptr(&strong) as *const u8 as *const T;
        let slot = NonNull::from(Box::leak(Box::new(GcSlot::holding(strong))));
        registry.attach_managed(slot);
        drop(registry);

        Some(GcRoot { slot, payload })
    }

    /// True when the handle holds no strong reference.
    pub fn is_empty(&self) -> bool {
        let graph = Graph::global();
        let _registry = graph.lock_handles();
        unsafe { self.slot.strong_ref() }.is_none()
    }
}

impl<T> Default for Gc<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Gc<T> {
    fn drop(&mut self) {
        let graph = Graph::global();
        let strong = {
            let mut registry = graph.lock_handles();
            if self.slot.is_attached() {
                registry.detach_managed(&self.slot);
            }
            unsafe { self.slot.take_strong() }
        };
        drop(strong);
    }
}

/// Safety: reports the handle's own registration slot, which lives at
/// the handle's in-place storage address.
unsafe impl<T> Trace for Gc<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.trace_managed(&self.slot);
    }
}

// =============================================================================
// RawGc
// =============================================================================

/// An embeddable non-owning observer of a managed object.
///
/// Records a plain payload address. During a collection the address
/// participates in reachability like a managed handle's storage does,
/// but a raw handle neither keeps its target alive nor is ever
/// drained; when the target dies the stored address simply dangles.
///
/// Used for back-references and weak-like fields that must not pin a
/// cycle.
pub struct RawGc<T> {
    slot: RawSlot,
    _marker: PhantomData<*const T>,
}

impl<T> RawGc<T> {
    /// Create an empty, unregistered observer.
    pub fn new() -> Self {
        Self {
            slot: RawSlot::empty(),
            _marker: PhantomData,
        }
    }

    /// Point this observer at the target of `root`.
    ///
    /// # Panics
    ///
    /// Panics if the handle was never registered, i.e. its containing
    /// object has not been allocated with [`GcRoot::new`].
    pub fn set(&self, target: &GcRoot<T>) {
        let graph = Graph::global();
        let _registry = graph.lock_handles();
        assert!(
            self.slot.is_attached(),
            "handle is not registered; allocate its containing object with GcRoot::new first"
        );
        self.slot.set_addr(target.as_ptr() as usize);
    }

    /// Forget the observed address.
    pub fn clear(&self) {
        let graph = Graph::global();
        let _registry = graph.lock_handles();
        self.slot.set_addr(0);
    }

    /// The observed payload address, or null when empty.
    ///
    /// The pointer is not kept alive by this handle; dereferencing it
    /// is sound only while some strong reference pins the target.
    pub fn as_ptr(&self) -> *const T {
        let graph = Graph::global();
        let _registry = graph.lock_handles();
        self.slot.addr() as *const T
    }

    /// True when no address is recorded.
    pub fn is_empty(&self) -> bool {
        self.as_ptr().is_null()
    }
}

impl<T> Default for RawGc<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for RawGc<T> {
    fn drop(&mut self) {
        let graph = Graph::global();
        let mut registry = graph.lock_handles();
        if self.slot.is_attached() {
            registry.detach_raw(&self.slot);
        }
    }
}

/// Safety: reports the handle's own registration slot, which lives at
/// the handle's in-place storage address.
unsafe impl<T> Trace for RawGc<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.trace_raw(&self.slot);
    }
}

// Safety: RawGc carries only an address; the slot is lock-guarded.
unsafe impl<T> Send for RawGc<T> {}
unsafe impl<T> Sync for RawGc<T> {}
