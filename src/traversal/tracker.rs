use std::collections::HashSet;

use crate::CatalogDigest;

/// Session-scoped memory of already-visited objects.
///
/// Two sets are kept: every visited catalog hash, and the subset of hashes
/// that entered as revision roots. Nested catalogs consult the former,
/// revision roots consult both. Insertion doubles as the admission test:
/// whichever caller inserts a digest first owns its expansion, so concurrent
/// workers can never both descend into the same catalog or revision.
#[derive(Debug, Default)]
pub(crate) struct VisitTracker {
    visited_catalogs: HashSet<CatalogDigest>,
    visited_roots: HashSet<CatalogDigest>,
}

impl VisitTracker {
    /// Records a catalog hash; `true` when it had not been seen before.
    pub fn admit_catalog(&mut self, digest: &CatalogDigest) -> bool {
        self.visited_catalogs.insert(digest.clone())
    }

    /// Records a revision-root hash; `true` when no revision walk has entered
    /// through it before.
    pub fn admit_root(&mut self, digest: &CatalogDigest) -> bool {
        self.visited_roots.insert(digest.clone())
    }

    #[cfg(test)]
    pub fn catalog_count(&self) -> usize {
        self.visited_catalogs.len()
    }

    #[cfg(test)]
    pub fn root_count(&self) -> usize {
        self.visited_roots.len()
    }
}
