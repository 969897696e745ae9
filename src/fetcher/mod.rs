use std::sync::Arc;

use async_trait::async_trait;

use crate::{CatalogDigest, CatalogHandle, Error, MountPoint, TagHistory};

mod memory;

pub use self::memory::{MemoryCatalog, MemoryObjectFetcher};

/// Capability to resolve content hashes into repository objects.
///
/// This is the only collaborator the traversal engines depend on. How the
/// objects are obtained (network, disk cache, in-memory store) is entirely up
/// to the implementation; the engines assume it is safe to call from several
/// tasks at once.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    type Catalog: CatalogHandle + 'static;

    /// Resolves the repository HEAD to the current root catalog hash.
    async fn fetch_head(&self) -> Result<CatalogDigest, Error>;

    /// Looks up the repository's tag history. `Ok(None)` means the repository
    /// has no tag history object.
    async fn fetch_tag_history(&self) -> Result<Option<TagHistory>, Error>;

    /// Looks up a single catalog by its digest.
    ///
    /// `Ok(None)` means the object is not available in backing storage and is
    /// distinguishable from transport errors, which are `Err`. The expected
    /// mount point is supplied so implementations may verify that the stored
    /// object is consistent with the reference that led to it.
    async fn fetch_catalog(
        &self,
        digest: &CatalogDigest,
        mountpoint: &MountPoint,
    ) -> Result<Option<Self::Catalog>, Error>;
}

#[async_trait]
impl<F: ObjectFetcher> ObjectFetcher for Arc<F> {
    type Catalog = F::Catalog;

    async fn fetch_head(&self) -> Result<CatalogDigest, Error> {
        self.as_ref().fetch_head().await
    }

    async fn fetch_tag_history(&self) -> Result<Option<TagHistory>, Error> {
        self.as_ref().fetch_tag_history().await
    }

    async fn fetch_catalog(
        &self,
        digest: &CatalogDigest,
        mountpoint: &MountPoint,
    ) -> Result<Option<Self::Catalog>, Error> {
        self.as_ref().fetch_catalog(digest, mountpoint).await
    }
}
