//! The cycle-collection pass.
//!
//! One pass is stop-the-world and conservative by containment: an
//! address points at an allocation iff it falls numerically inside a
//! registered range. No per-type layout information is consulted.
//! This is sound because the only addresses examined are those stored
//! in registered handles, which by construction point at registered
//! allocations.
//!
//! The pass runs in three phases under both registry locks:
//!
//! 1. **Snapshot** — classify every live handle as *root* (its own
//!    storage lies outside every range) or *interior* (embedded in
//!    some managed object).
//! 2. **Trace** — starting from the roots, repeatedly promote every
//!    pending handle whose storage is embedded in an object already
//!    proven reachable. Reachability at range granularity is exactly
//!    the transitive closure of "stored inside" over parent ranges.
//! 3. **Extract** — every managed handle never promoted is internal
//!    to an unreachable subgraph; its strong reference is drained
//!    into the result. Draining breaks cycles at the refcount level
//!    and lets reference counting finish the reclamation when the
//!    caller drops the returned bundle.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::graph::{HandleRegistry, RangeSet};
use crate::handle::{GcSlot, Strong};

/// Which kind of handle a scan entry describes.
#[derive(Clone, Copy)]
enum ScanHandle {
    /// Owns a strong reference; may be drained.
    Managed(NonNull<GcSlot>),
    /// Observes an address; participates in tracing but is never
    /// drained.
    Raw,
}

/// Transient per-handle record.
struct ScanInfo {
    handle: ScanHandle,
    /// Address of the handle's own storage.
    storage: usize,
    /// Range containing the handle's target, if any.
    target: Option<u32>,
}

/// Transient per-range record.
struct RangeInfo {
    begin: usize,
    end: usize,
    /// At least one managed handle points into this range.
    managed: bool,
    /// Already processed as a parent during the trace.
    scanned: bool,
}

/// Scratch state for one collection pass.
pub(crate) struct CyclePass {
    infos: Vec<ScanInfo>,
    rngs: Vec<RangeInfo>,
    /// Entries proven reachable; grows as the trace promotes pending
    /// entries.
    keep: Vec<u32>,
    /// Entries not yet proven reachable.
    scan: Vec<u32>,
}

impl CyclePass {
    pub(crate) fn with_capacity(handles: usize, ranges: usize) -> Self {
        Self {
            infos: Vec::with_capacity(handles),
            rngs: Vec::with_capacity(ranges),
            keep: Vec::with_capacity(handles),
            scan: Vec::with_capacity(handles),
        }
    }

    /// Run the full pass. The caller holds both registry locks for
    /// the duration.
    pub(crate) fn run(&mut self, ranges: &RangeSet, registry: &HandleRegistry) -> Vec<Strong> {
        self.snapshot(ranges, registry);
        self.trace();
        self.extract()
    }

    /// Phase 1: classify every live handle.
    fn snapshot(&mut self, ranges: &RangeSet, registry: &HandleRegistry) {
        for range in ranges.iter() {
            self.rngs.push(RangeInfo {
                begin: range.begin,
                end: range.end,
                managed: false,
                scanned: false,
            });
        }

        for &slot_ptr in registry.managed() {
            // Safety: attached slots stay alive until detached, and
            // detaching requires the handle lock the caller holds.
            let slot = unsafe { slot_ptr.as_ref() };
            let payload = match unsafe { slot.strong_ref() } {
                Some(strong) => Arc::as_ptr(strong) as *const u8 as usize,
                // An empty handle neither keeps anything alive nor
                // participates in tracing.
                None => continue,
            };

            let target = ranges.find(payload);
            if let Some(index) = target {
                self.rngs[index].managed = true;
            }

            let storage = slot_ptr.as_ptr() as usize;
            let index = self.infos.len() as u32;
            self.infos.push(ScanInfo {
                handle: ScanHandle::Managed(slot_ptr),
                storage,
                target: target.map(|t| t as u32),
            });

            // A handle stored outside every range is a root. A handle
            // whose target resolves to no range is kept as a root as
            // well: no parent range exists through which the trace
            // could ever reach it. Storage is classified with the
            // same closed-bound lookup as payloads; a separate
            // half-open storage test was tempting but rejected, the
            // closed bound being deliberate and uniform.
            if target.is_none() || ranges.find(storage).is_none() {
                self.keep.push(index);
            } else {
                self.scan.push(index);
            }
        }

        for &slot_ptr in registry.raw() {
            let slot = unsafe { slot_ptr.as_ref() };
            let target = match ranges.find(slot.addr()) {
                Some(index) => index,
                // Raw handles observing nothing in the managed domain
                // are irrelevant to the trace.
                None => continue,
            };

            let storage = slot_ptr.as_ptr() as usize;
            let index = self.infos.len() as u32;
            self.infos.push(ScanInfo {
                handle: ScanHandle::Raw,
                storage,
                target: Some(target as u32),
            });

            if ranges.find(storage).is_some() {
                self.scan.push(index);
            } else {
                self.keep.push(index);
            }
        }
    }

    /// Phase 2: promote every handle stored inside a reachable object.
    fn trace(&mut self) {
        let mut i = 0;
        while i != self.keep.len() {
            let target = self.infos[self.keep[i] as usize].target;
            i += 1;

            let range = match target {
                Some(index) => index as usize,
                None => continue,
            };
            if self.rngs[range].scanned {
                continue;
            }
            let (begin, end) = (self.rngs[range].begin, self.rngs[range].end);

            // Every pending handle embedded in the parent object
            // becomes a root of the next wave. Worklist order is
            // irrelevant, so unordered removal suffices.
            let mut j = 0;
            while j != self.scan.len() {
                let pending = self.scan[j];
                let storage = self.infos[pending as usize].storage;
                if storage >= begin && storage < end {
                    self.keep.push(pending);
                    self.scan.swap_remove(j);
                } else {
                    j += 1;
                }
            }

            self.rngs[range].scanned = true;
        }
    }

    /// Phase 3: drain strong references out of every managed handle
    /// the trace never reached.
    fn extract(&self) -> Vec<Strong> {
        let mut unreachable = Vec::with_capacity(self.scan.len());
        for &index in &self.scan {
            let info = &self.infos[index as usize];
            let ScanHandle::Managed(slot_ptr) = info.handle else {
                continue;
            };
            if let Some(target) = info.target {
                debug_assert!(self.rngs[target as usize].managed);
            }

            // Safety: slot liveness as in `snapshot`; the handle lock
            // is still held.
            let slot = unsafe { slot_ptr.as_ref() };
            if let Some(strong) = unsafe { slot.take_strong() } {
                unreachable.push(strong);
            }
        }
        unreachable
    }
}
