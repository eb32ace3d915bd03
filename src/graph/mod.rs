//! Process-wide registry of handles and allocation ranges.
//!
//! The graph is a singleton. Two locks serialise mutation: the
//! *range lock* guards the allocation directory, the *handle lock*
//! guards both handle lists. Mutator operations take exactly one
//! lock; a collection takes both through [`Graph::lock_all`] and
//! holds them for the whole pass, so its snapshot is atomic with
//! respect to every attach, detach, and range update.

mod ranges;
mod registry;

pub(crate) use ranges::RangeSet;
pub(crate) use registry::HandleRegistry;

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};

use crate::collector::CyclePass;
use crate::config::{ConfigError, GraphConfig};
use crate::garbage::Garbage;
use crate::handle::{GcSlot, RawSlot};
use crate::stats::GcStats;
use crate::trace::{Trace, Tracer};

static GRAPH: OnceLock<Graph> = OnceLock::new();

/// Process-wide collector state.
///
/// Never torn down: on process exit, objects still bound in
/// uncollected cycles leak and their destructors do not run. Clear
/// global and static handles (and drop a final [`collect`] bundle)
/// before exit if destructor execution matters.
///
/// [`collect`]: Graph::collect
pub struct Graph {
    /// Allocation directory, behind the range lock.
    ranges: Mutex<RangeSet>,
    /// Handle lists, behind the handle lock.
    handles: Mutex<HandleRegistry>,
    /// Entry guard: set while a collection pass is in flight.
    collecting: AtomicBool,
    stats: GcStats,
    config: GraphConfig,
}

impl Graph {
    /// The process-wide graph, created with the default configuration
    /// on first access.
    pub fn global() -> &'static Graph {
        GRAPH.get_or_init(|| Graph::with_config(GraphConfig::default()))
    }

    /// Install a custom configuration.
    ///
    /// Fails with [`ConfigError::AlreadyInitialized`] once the graph
    /// has been touched by any handle, allocation, or collection.
    pub fn init(config: GraphConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut installed = false;
        GRAPH.get_or_init(|| {
            installed = true;
            Graph::with_config(config)
        });
        if installed {
            Ok(())
        } else {
            Err(ConfigError::AlreadyInitialized)
        }
    }

    fn with_config(config: GraphConfig) -> Self {
        Self {
            ranges: Mutex::new(RangeSet::with_capacity(config.range_capacity)),
            handles: Mutex::new(HandleRegistry::with_capacity(config.handle_capacity)),
            collecting: AtomicBool::new(false),
            stats: GcStats::new(),
            config,
        }
    }

    // =========================================================================
    // Mutator operations (single lock each)
    // =========================================================================

    /// Register the allocation `[base, base + size)`.
    pub(crate) fn add_range(&self, base: usize, size: usize) {
        self.ranges.lock().add(base, size);
    }

    /// Deregister the allocation containing `base`.
    pub(crate) fn remove_range(&self, base: usize) {
        self.ranges.lock().remove(base);
    }

    /// Attach one managed slot (root creation, clone).
    pub(crate) fn attach_managed_slot(&self, slot: &GcSlot) {
        self.handles.lock().attach_managed(NonNull::from(slot));
    }

    /// Acquire the handle lock for a handle-lifecycle operation.
    pub(crate) fn lock_handles(&self) -> MutexGuard<'_, HandleRegistry> {
        self.handles.lock()
    }

    /// Register every embedded handle of a freshly allocated value at
    /// its in-place storage address.
    pub(crate) fn adopt(&self, value: &dyn Trace) {
        let mut registry = self.handles.lock();
        let mut adopter = Adopter {
            registry: &mut *registry,
        };
        value.trace(&mut adopter);
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of currently registered allocation ranges.
    pub fn allocated_objects(&self) -> usize {
        self.ranges.lock().len()
    }

    /// Sum of the sizes of all registered allocation ranges, in bytes.
    pub fn allocated_bytes(&self) -> usize {
        self.ranges.lock().total_bytes()
    }

    /// Collection statistics.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Run one cycle-collection pass.
    ///
    /// Returns the bundle of strong references to every object found
    /// unreachable. No destructor runs before this call returns;
    /// dropping the bundle runs them all, outside the collector's
    /// locks.
    ///
    /// If another collection is already in flight the call returns an
    /// empty bundle immediately and emits an advisory line on stderr.
    pub fn collect(&self) -> Garbage {
        if self.collecting.swap(true, Ordering::AcqRel) {
            self.stats.record_rejected();
            if self.config.verbose {
                eprintln!("collection already in progress");
            }
            return Garbage::empty();
        }

        let started = Instant::now();
        let unreachable = {
            let (ranges, registry) = self.lock_all();
            let mut pass = CyclePass::with_capacity(registry.total_handles(), ranges.len());
            pass.run(&ranges, &registry)
        };
        self.collecting.store(false, Ordering::Release);

        let elapsed = started.elapsed();
        self.stats.record_collection(elapsed, unreachable.len());
        if self.config.verbose {
            eprintln!(
                "Collected {} objects in {:.6} seconds",
                unreachable.len(),
                elapsed.as_secs_f64()
            );
        }

        Garbage::new(unreachable)
    }

    /// Acquire both registry locks.
    ///
    /// Fixed order: ranges, then handles. Every operation that needs
    /// both locks must come through here so that only one lock order
    /// exists in the process.
    fn lock_all(&self) -> (MutexGuard<'_, RangeSet>, MutexGuard<'_, HandleRegistry>) {
        let ranges = self.ranges.lock();
        let handles = self.handles.lock();
        (ranges, handles)
    }
}

/// Tracer that attaches every reported slot.
struct Adopter<'a> {
    registry: &'a mut HandleRegistry,
}

impl Tracer for Adopter<'_> {
    fn trace_managed(&mut self, slot: &GcSlot) {
        self.registry.attach_managed(NonNull::from(slot));
    }

    fn trace_raw(&mut self, slot: &RawSlot) {
        self.registry.attach_raw(NonNull::from(slot));
    }
}
