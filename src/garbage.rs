//! Deferred reclamation bundle.

use std::fmt;

use crate::handle::Strong;

/// Strong references to every object a collection found unreachable.
///
/// The bundle exists to move destructor execution out of the
/// collector's critical section: dropping it releases the references
/// and runs the destructors at a site of the caller's choosing.
/// Destructor code runs outside all collector locks and may allocate,
/// register new handles, and call [`collect`](crate::collect) again.
///
/// Move-only: a bundle cannot be cloned, and the references it holds
/// can only be released by dropping it.
pub struct Garbage {
    objects: Vec<Strong>,
}

impl Garbage {
    pub(crate) fn new(objects: Vec<Strong>) -> Self {
        Self { objects }
    }

    pub(crate) fn empty() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Number of unreachable objects owned by this bundle.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when the collection found nothing to reclaim.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl fmt::Debug for Garbage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Garbage")
            .field("objects", &self.objects.len())
            .finish()
    }
}
