//! Cycle-collecting registry for reference-counted smart pointers.
//!
//! Reference counting reclaims acyclic garbage the moment the last
//! strong reference drops, but objects bound in reference cycles keep
//! each other alive forever. This crate supplies the missing half: a
//! process-wide registry of handles and allocations, and a
//! stop-the-world tracing pass that finds the cycles reference
//! counting cannot and hands their strong references back to the
//! caller for deferred destruction.
//!
//! # Architecture
//!
//! - **Handles** ([`GcRoot`], [`Gc`], [`RawGc`]): smart-pointer-like
//!   values registered with the graph by the address of their storage.
//!   Roots live outside the managed heap; `Gc` and `RawGc` are fields
//!   embedded in managed objects, registered in place when the object
//!   is allocated (see [`Trace`]).
//! - **Graph** ([`Graph`]): the process-wide singleton tracking every
//!   live handle and every allocation range behind two locks.
//! - **Collection** ([`collect`]): a conservative-by-containment
//!   trace. A handle is reachable iff its storage lies inside an
//!   object already proven reachable, starting from the roots; every
//!   managed handle the trace never reaches has its strong reference
//!   drained into a [`Garbage`] bundle.
//! - **Reclamation** ([`Garbage`]): dropping the bundle releases the
//!   drained references and runs the destructors, outside the
//!   collector's locks.
//!
//! # Usage
//!
//! ```ignore
//! use graph_gc::{collect, Gc, GcRoot, Trace, Tracer};
//!
//! struct Node {
//!     next: Gc<Node>,
//! }
//!
//! unsafe impl Trace for Node {
//!     fn trace(&self, tracer: &mut dyn Tracer) {
//!         self.next.trace(tracer);
//!     }
//! }
//!
//! let a = GcRoot::new(Node { next: Gc::new() });
//! let b = GcRoot::new(Node { next: Gc::new() });
//! a.next.set(&b);
//! b.next.set(&a);
//! drop((a, b));                   // the cycle keeps itself alive
//!
//! let garbage = collect();        // ...until a collection finds it
//! assert_eq!(garbage.len(), 2);
//! drop(garbage);                  // destructors run here
//! ```
//!
//! # Concurrency
//!
//! Collection is stop-the-world: handle and allocation operations
//! block for the duration of an in-flight pass. Only one collection
//! runs at a time; a concurrent attempt returns an empty bundle
//! immediately. Distinct handles may be used freely from distinct
//! threads.
//!
//! # Process exit
//!
//! The graph is never torn down. Objects still bound in uncollected
//! cycles at process exit leak and their destructors do not run;
//! clear global and static handles and drop a final [`collect`]
//! bundle before exiting if destructor execution matters.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod collector;
pub mod config;
mod garbage;
mod graph;
mod handle;
pub mod stats;
pub mod trace;

pub use config::{ConfigError, GraphConfig};
pub use garbage::Garbage;
pub use graph::Graph;
pub use handle::{Gc, GcRoot, GcSlot, RawGc, RawSlot};
pub use stats::GcStats;
pub use trace::{Trace, Tracer};

/// Run one cycle-collection pass on the process-wide graph.
///
/// See [`Graph::collect`].
pub fn collect() -> Garbage {
    Graph::global().collect()
}

/// Number of currently registered allocation ranges.
pub fn allocated_objects() -> usize {
    Graph::global().allocated_objects()
}

/// Sum of the sizes of all registered allocation ranges, in bytes.
pub fn allocated_bytes() -> usize {
    Graph::global().allocated_bytes()
}
