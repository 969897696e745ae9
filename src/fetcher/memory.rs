use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::instrument;

use super::ObjectFetcher;
use crate::{CatalogDigest, CatalogHandle, Error, MountPoint, NestedReference, TagHistory};

/// Owned catalog value as stored by the [MemoryObjectFetcher].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCatalog {
    digest: CatalogDigest,
    revision: u64,
    mountpoint: MountPoint,
    timestamp: u64,
    previous_root: Option<CatalogDigest>,
    nested: Vec<NestedReference>,
}

impl MemoryCatalog {
    pub fn new(
        digest: CatalogDigest,
        revision: u64,
        mountpoint: MountPoint,
        timestamp: u64,
    ) -> Self {
        Self {
            digest,
            revision,
            mountpoint,
            timestamp,
            previous_root: None,
            nested: Vec::new(),
        }
    }

    /// Links this catalog to the root catalog of the preceding revision.
    /// Only meaningful on root catalogs.
    pub fn with_previous_root(mut self, digest: CatalogDigest) -> Self {
        self.previous_root = Some(digest);
        self
    }

    /// Appends a nested catalog reference, preserving insertion order.
    ///
    /// The referenced mount point must lie strictly below this catalog's own
    /// mount point.
    pub fn push_nested(&mut self, reference: NestedReference) -> Result<(), Error> {
        if !reference.mountpoint.is_proper_extension_of(&self.mountpoint) {
            return Err(Error::InvalidRequest(format!(
                "nested mount point '{}' does not extend '{}'",
                reference.mountpoint, self.mountpoint
            )));
        }
        self.nested.push(reference);
        Ok(())
    }
}

impl CatalogHandle for MemoryCatalog {
    fn digest(&self) -> &CatalogDigest {
        &self.digest
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn mountpoint(&self) -> &MountPoint {
        &self.mountpoint
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn previous_root(&self) -> Option<&CatalogDigest> {
        self.previous_root.as_ref()
    }

    fn nested_children(&self) -> &[NestedReference] {
        &self.nested
    }
}

#[derive(Default)]
struct Inner {
    catalogs: HashMap<CatalogDigest, MemoryCatalog>,
    head: Option<CatalogDigest>,
    tag_history: Option<TagHistory>,
    unavailable: HashSet<CatalogDigest>,
}

/// In-memory [ObjectFetcher] backend.
///
/// Primarily useful for tests and small tools; objects can be marked
/// unavailable after registration to simulate partially garbage-collected
/// backing storage.
#[derive(Clone, Default)]
pub struct MemoryObjectFetcher {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryObjectFetcher {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert_catalog(&self, catalog: MemoryCatalog) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.catalogs.insert(catalog.digest.clone(), catalog);
    }

    pub fn set_head(&self, digest: CatalogDigest) {
        self.inner.write().expect("lock poisoned").head = Some(digest);
    }

    pub fn set_tag_history(&self, tag_history: TagHistory) {
        self.inner.write().expect("lock poisoned").tag_history = Some(tag_history);
    }

    /// Makes subsequent fetches of `digest` report the object as not found,
    /// without forgetting the stored catalog.
    pub fn mark_unavailable(&self, digest: CatalogDigest) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.unavailable.insert(digest);
    }

    pub fn mark_available(&self, digest: &CatalogDigest) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.unavailable.remove(digest);
    }
}

#[async_trait]
impl ObjectFetcher for MemoryObjectFetcher {
    type Catalog = MemoryCatalog;

    async fn fetch_head(&self) -> Result<CatalogDigest, Error> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .head
            .clone()
            .ok_or_else(|| Error::StorageError("repository head is not set".to_string()))
    }

    async fn fetch_tag_history(&self) -> Result<Option<TagHistory>, Error> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.tag_history.clone())
    }

    #[instrument(skip(self, digest, mountpoint), fields(catalog.digest = %digest, catalog.mountpoint = %mountpoint))]
    async fn fetch_catalog(
        &self,
        digest: &CatalogDigest,
        mountpoint: &MountPoint,
    ) -> Result<Option<Self::Catalog>, Error> {
        let inner = self.inner.read().expect("lock poisoned");

        if inner.unavailable.contains(digest) {
            return Ok(None);
        }

        match inner.catalogs.get(digest) {
            None => Ok(None),

            Some(catalog) => {
                // Detect corruptions: the stored catalog must carry the digest
                // it is filed under and sit at the expected mount point.
                if catalog.digest != *digest {
                    return Err(Error::StorageError(format!(
                        "requested catalog with digest {}, but got {}",
                        digest, catalog.digest
                    )));
                }
                if catalog.mountpoint != *mountpoint {
                    return Err(Error::StorageError(format!(
                        "catalog {} expected at '{}', but stored at '{}'",
                        digest, mountpoint, catalog.mountpoint
                    )));
                }

                Ok(Some(catalog.clone()))
            }
        }
    }
}
