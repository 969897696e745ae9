//! Traversal engines over the catalog graph.
//!
//! A traversal starts at one or more root catalogs (the repository HEAD, an
//! explicit root hash, or the named snapshots of the tag history), fetches
//! catalogs through an [crate::fetcher::ObjectFetcher] and invokes the
//! registered listeners once per visited catalog, in a configurable order.

use std::sync::Arc;

use crate::{CatalogDigest, MountPoint};

mod params;
mod parallel;
mod sequential;
mod stream;
mod tracker;
mod walk;


pub use self::parallel::CatalogTraversalParallel;
pub use self::params::{HistoryDepth, TraversalParams};
pub use self::sequential::CatalogTraversal;
pub use self::stream::visit_stream;

/// Order in which the catalogs of a revision's nested tree are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    /// Root first, then the nested tree from the top down; the tree of a
    /// newer revision is emitted in full before its predecessor's root.
    #[default]
    BreadthFirst,
    /// Post-order: a catalog is emitted only after its entire nested subtree,
    /// and the oldest reachable revision's tree comes first.
    DepthFirst,
}

/// A single visit of one catalog, handed to every registered listener.
pub struct CatalogVisit<'a, C> {
    pub catalog: &'a C,
    /// Depth below the current revision walk's root; 0 at the root.
    pub tree_level: usize,
    /// The visited catalog's own revision.
    pub revision: u64,
    handle: Option<&'a Arc<C>>,
}

impl<C> CatalogVisit<'_, C> {
    /// Clones out an owning handle to the visited catalog.
    ///
    /// Returns `Some` only when the session runs with
    /// [TraversalParams::no_close] set; otherwise the session keeps ownership
    /// and releases the catalog as soon as the listener returns.
    pub fn retain(&self) -> Option<Arc<C>> {
        self.handle.cloned()
    }
}

/// Callback interface for traversal consumers.
///
/// Listener invocations are serialized even by the parallel engine, so
/// implementations do not need to be re-entrant.
pub trait VisitListener<C>: Send + Sync {
    fn on_visit(&self, visit: &CatalogVisit<'_, C>);

    /// Reports a catalog that could not be loaded and was pruned from the
    /// traversal. Only invoked when load failures are ignored.
    fn on_load_failure(&self, _digest: &CatalogDigest, _mountpoint: &MountPoint) {}
}

/// Plain closures work as listeners; they observe every visit and ignore
/// load-failure reports.
impl<C, F> VisitListener<C> for F
where
    F: for<'a> Fn(&CatalogVisit<'a, C>) + Send + Sync,
{
    fn on_visit(&self, visit: &CatalogVisit<'_, C>) {
        self(visit)
    }
}
