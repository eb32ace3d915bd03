//! Adoption-time traversal of embedded handles.
//!
//! The `Trace` trait is the seam between user objects and the
//! registry. When a value enters the managed domain its `Trace`
//! implementation is run once, with the value already at its final
//! heap address, so that every embedded handle can be registered at
//! the storage address it will occupy for the object's lifetime.

use crate::handle::{GcSlot, RawSlot};

/// Trait for types that can live in the managed domain.
///
/// # Safety
///
/// Implementations must report, via the tracer, every [`Gc`] and
/// [`RawGc`] embedded in `self`, exactly once each, and nothing else.
/// Every reported handle must:
///
/// 1. Live at a stable address for the containing object's whole
///    lifetime: a plain field, an `Option`, or a fixed-size array
///    element. Handles inside growable containers (`Vec`, `HashMap`,
///    ...) must not be reported; reallocation would move their
///    registered storage out from under the registry.
/// 2. Be dropped in place when the containing object is dropped
///    (never skipped with `ManuallyDrop` or `mem::forget`).
///
/// The traversal runs with the registry's handle lock held, so
/// implementations must only visit handles; they must not read or
/// assign handle contents, and must not create managed objects.
///
/// # Example
///
/// ```ignore
/// use graph_gc::{Gc, RawGc, Trace, Tracer};
///
/// struct Node {
///     next: Gc<Node>,
///     owner: RawGc<Node>,
///     label: String,
/// }
///
/// unsafe impl Trace for Node {
///     fn trace(&self, tracer: &mut dyn Tracer) {
///         self.next.trace(tracer);
///         self.owner.trace(tracer);
///         // `label` embeds no handles
///     }
/// }
/// ```
///
/// [`Gc`]: crate::Gc
/// [`RawGc`]: crate::RawGc
pub unsafe trait Trace {
    /// Visit every handle embedded in this value.
    fn trace(&self, tracer: &mut dyn Tracer);
}

/// Visitor for embedded handles.
///
/// User code never implements this; it receives a tracer in
/// [`Trace::trace`] and forwards it to each embedded handle.
pub trait Tracer {
    /// Visit the registration slot of a managed handle.
    fn trace_managed(&mut self, slot: &GcSlot);

    /// Visit the registration slot of a raw handle.
    fn trace_raw(&mut self, slot: &RawSlot);
}

// =============================================================================
// Trace implementations for handle-free primitives
// =============================================================================

/// Safety: primitives embed no handles.
unsafe impl Trace for () {
    #[inline]
    fn trace(&self, _tracer: &mut dyn Tracer) {}
}

unsafe impl Trace for bool {
    #[inline]
    fn trace(&self, _tracer: &mut dyn Tracer) {}
}

unsafe impl Trace for i64 {
    #[inline]
    fn trace(&self, _tracer: &mut dyn Tracer) {}
}

unsafe impl Trace for u64 {
    #[inline]
    fn trace(&self, _tracer: &mut dyn Tracer) {}
}

unsafe impl Trace for usize {
    #[inline]
    fn trace(&self, _tracer: &mut dyn Tracer) {}
}

unsafe impl Trace for f64 {
    #[inline]
    fn trace(&self, _tracer: &mut dyn Tracer) {}
}

unsafe impl Trace for String {
    #[inline]
    fn trace(&self, _tracer: &mut dyn Tracer) {}
}

// =============================================================================
// Trace implementations for fixed-shape containers
// =============================================================================

/// Safety: forwards to the payload, which sits inline at a stable
/// address.
unsafe impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Some(inner) = self {
            inner.trace(tracer);
        }
    }
}

/// Safety: array elements sit inline at stable addresses.
unsafe impl<T: Trace, const N: usize> Trace for [T; N] {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingTracer {
        managed: usize,
        raw: usize,
    }

    impl Tracer for CountingTracer {
        fn trace_managed(&mut self, _slot: &GcSlot) {
            self.managed += 1;
        }
        fn trace_raw(&mut self, _slot: &RawSlot) {
            self.raw += 1;
        }
    }

    #[test]
    fn test_primitives_report_nothing() {
        let mut tracer = CountingTracer { managed: 0, raw: 0 };

        true.trace(&mut tracer);
        42u64.trace(&mut tracer);
        3.14f64.trace(&mut tracer);
        "hello".to_string().trace(&mut tracer);

        assert_eq!(tracer.managed, 0);
        assert_eq!(tracer.raw, 0);
    }

    #[test]
    fn test_option_forwards() {
        let mut tracer = CountingTracer { managed: 0, raw: 0 };

        let handle: Option<crate::Gc<u64>> = Some(crate::Gc::new());
        handle.trace(&mut tracer);
        let empty: Option<crate::Gc<u64>> = None;
        empty.trace(&mut tracer);

        assert_eq!(tracer.managed, 1);
    }

    #[test]
    fn test_array_visits_every_element() {
        let mut tracer = CountingTracer { managed: 0, raw: 0 };

        let handles: [crate::Gc<u64>; 3] = [crate::Gc::new(), crate::Gc::new(), crate::Gc::new()];
        handles.trace(&mut tracer);

        assert_eq!(tracer.managed, 3);
    }
}
