use crate::{CatalogDigest, Error};

/// A labelled snapshot recorded in the repository's tag history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSnapshot {
    pub name: String,
    pub root_digest: CatalogDigest,
    pub revision: u64,
    pub timestamp: u64,
}

/// The set of named snapshots of a repository.
///
/// The tag history is itself a content-addressed object and is obtained
/// through [crate::fetcher::ObjectFetcher::fetch_tag_history].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagHistory {
    snapshots: Vec<NamedSnapshot>,
}

impl TagHistory {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records a snapshot. Snapshot names are unique within a tag history.
    pub fn insert(&mut self, snapshot: NamedSnapshot) -> Result<(), Error> {
        if self.snapshots.iter().any(|s| s.name == snapshot.name) {
            return Err(Error::InvalidRequest(format!(
                "duplicate snapshot name: {:?}",
                snapshot.name
            )));
        }
        self.snapshots.push(snapshot);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Snapshots in insertion order.
    pub fn snapshots(&self) -> impl Iterator<Item = &NamedSnapshot> {
        self.snapshots.iter()
    }

    /// Snapshots ordered by ascending revision, ties broken by ascending
    /// timestamp. This is the order snapshot traversals walk them in.
    pub fn by_ascending_revision(&self) -> Vec<&NamedSnapshot> {
        let mut sorted: Vec<&NamedSnapshot> = self.snapshots.iter().collect();
        sorted.sort_by_key(|s| (s.revision, s.timestamp));
        sorted
    }
}
