//! Shared fixture data: deterministic digests and small in-memory
//! repositories used by the test suites.

use std::collections::BTreeMap;

use lazy_static::lazy_static;

use crate::fetcher::{MemoryCatalog, MemoryObjectFetcher};
use crate::{
    CatalogDigest, CatalogHandle, MountPoint, NamedSnapshot, NestedReference, TagHistory,
    DIGEST_LEN,
};

lazy_static! {
    pub static ref DUMMY_DIGEST: CatalogDigest = {
        let u = [0u8; DIGEST_LEN];
        (&u).into()
    };
    pub static ref DUMMY_DIGEST_2: CatalogDigest = {
        let mut u = [0u8; DIGEST_LEN];
        u[0] = 0x10;
        (&u).into()
    };
}

/// Root catalog publication times for [six_revision_repository], indexed by
/// `revision - 1`.
pub const REVISION_TIMESTAMPS: [u64; 6] = [
    565_056_000,   // revision 1
    1_103_846_400, // revision 2
    1_236_297_600, // revision 3
    1_279_411_200, // revision 4
    1_416_096_000, // revision 5
    1_416_182_400, // revision 6
];

pub fn root_timestamp(revision: u64) -> u64 {
    REVISION_TIMESTAMPS[revision as usize - 1]
}

/// A fully registered in-memory repository plus lookup tables into it.
pub struct RepositoryFixture {
    pub fetcher: MemoryObjectFetcher,
    roots: BTreeMap<u64, CatalogDigest>,
    catalogs: BTreeMap<(u64, String), CatalogDigest>,
}

impl RepositoryFixture {
    pub fn root_digest(&self, revision: u64) -> CatalogDigest {
        self.roots
            .get(&revision)
            .expect("unknown revision")
            .clone()
    }

    /// Digest of the catalog created at `(revision, mountpoint)`. Shared
    /// catalogs are keyed under the revision that introduced them.
    pub fn digest_of(&self, revision: u64, mountpoint: &str) -> CatalogDigest {
        self.catalogs
            .get(&(revision, mountpoint.to_string()))
            .expect("unknown catalog")
            .clone()
    }

    pub fn unique_catalog_count(&self) -> usize {
        self.catalogs.len()
    }

    /// All `(revision, mountpoint)` pairs the fixture registered, keyed by
    /// the revision that introduced the catalog.
    pub fn all_catalogs(&self) -> impl Iterator<Item = (u64, &str)> {
        self.catalogs.keys().map(|(rev, mp)| (*rev, mp.as_str()))
    }
}

#[derive(Default)]
struct RepositoryBuilder {
    next_digest: u64,
    revisions: BTreeMap<u64, BTreeMap<String, MemoryCatalog>>,
    roots: BTreeMap<u64, CatalogDigest>,
}

impl RepositoryBuilder {
    fn fresh_digest(&mut self) -> CatalogDigest {
        let mut bytes = [0u8; DIGEST_LEN];
        bytes[..8].copy_from_slice(&self.next_digest.to_be_bytes());
        self.next_digest += 1;
        (&bytes).into()
    }

    /// Creates the root catalog of `revision`, linked to the previous
    /// revision's root when one exists.
    fn begin_revision(&mut self, revision: u64, timestamp: u64) {
        let digest = self.fresh_digest();
        let mut root = MemoryCatalog::new(digest.clone(), revision, MountPoint::root(), timestamp);
        if let Some(previous) = self.roots.get(&(revision - 1)) {
            root = root.with_previous_root(previous.clone());
        }
        self.roots.insert(revision, digest);
        let mut tree = BTreeMap::new();
        tree.insert(String::new(), root);
        self.revisions.insert(revision, tree);
    }

    /// Creates a nested catalog and registers it in its parent catalog of the
    /// same revision. Registration order is the parent's stored child order.
    fn create(&mut self, revision: u64, mountpoint: &str, parent: &str, timestamp: u64) {
        let digest = self.fresh_digest();
        let catalog = MemoryCatalog::new(
            digest.clone(),
            revision,
            MountPoint::new(mountpoint).expect("fixture mount point"),
            timestamp,
        );
        let tree = self.revisions.get_mut(&revision).expect("unknown revision");
        tree.get_mut(parent)
            .expect("parent catalog missing")
            .push_nested(NestedReference {
                digest,
                mountpoint: MountPoint::new(mountpoint).expect("fixture mount point"),
            })
            .expect("fixture nesting");
        tree.insert(mountpoint.to_string(), catalog);
    }

    /// References an unchanged catalog of an older revision from `parent` in
    /// `revision`, without creating a new object.
    fn share(&mut self, revision: u64, parent: &str, source_revision: u64, mountpoint: &str) {
        let digest = self.revisions[&source_revision][mountpoint].digest().clone();
        let reference = NestedReference {
            digest,
            mountpoint: MountPoint::new(mountpoint).expect("fixture mount point"),
        };
        self.revisions
            .get_mut(&revision)
            .expect("unknown revision")
            .get_mut(parent)
            .expect("parent catalog missing")
            .push_nested(reference)
            .expect("fixture nesting");
    }

    fn branch_10(&mut self, revision: u64, ts: u64) {
        self.create(revision, "/00/10", "", ts + 1);
        self.create(revision, "/00/10/20", "/00/10", ts + 2);
        self.create(revision, "/00/10/21", "/00/10", ts + 3);
        self.create(revision, "/00/10/20/30", "/00/10/20", ts + 4);
        self.create(revision, "/00/10/20/31", "/00/10/20", ts + 5);
        self.create(revision, "/00/10/20/32", "/00/10/20", ts + 6);
        self.create(revision, "/00/10/20/30/40", "/00/10/20/30", ts + 7);
    }

    fn branch_11(&mut self, revision: u64, ts: u64) {
        self.create(revision, "/00/11", "", ts + 8);
        self.create(revision, "/00/11/22", "/00/11", ts + 9);
        self.create(revision, "/00/11/23", "/00/11", ts + 10);
        self.create(revision, "/00/11/24", "/00/11", ts + 11);
        self.create(revision, "/00/11/22/33", "/00/11/22", ts + 12);
        self.create(revision, "/00/11/22/34", "/00/11/22", ts + 13);
        self.create(revision, "/00/11/22/34/41", "/00/11/22/34", ts + 14);
        self.create(revision, "/00/11/22/34/42", "/00/11/22/34", ts + 15);
        self.create(revision, "/00/11/22/34/43", "/00/11/22/34", ts + 16);
    }

    fn branch_12(&mut self, revision: u64, ts: u64) {
        self.create(revision, "/00/12", "", ts + 17);
        self.create(revision, "/00/12/25", "/00/12", ts + 18);
        self.create(revision, "/00/12/26", "/00/12", ts + 19);
        self.create(revision, "/00/12/27", "/00/12", ts + 20);
        self.create(revision, "/00/12/26/35", "/00/12/26", ts + 21);
        self.create(revision, "/00/12/26/36", "/00/12/26", ts + 22);
        self.create(revision, "/00/12/26/37", "/00/12/26", ts + 23);
        self.create(revision, "/00/12/26/38", "/00/12/26", ts + 24);
    }

    fn branch_13(&mut self, revision: u64, ts: u64) {
        self.create(revision, "/00/13", "", ts + 25);
        self.create(revision, "/00/13/28", "/00/13", ts + 26);
        self.create(revision, "/00/13/29", "/00/13", ts + 27);
    }

    fn finish(self, head_revision: u64, tags: &[(&str, u64)]) -> RepositoryFixture {
        let fetcher = MemoryObjectFetcher::new();
        let mut catalogs = BTreeMap::new();

        for (revision, tree) in &self.revisions {
            for (mountpoint, catalog) in tree {
                catalogs.insert((*revision, mountpoint.clone()), catalog.digest().clone());
                fetcher.insert_catalog(catalog.clone());
            }
        }

        fetcher.set_head(self.roots[&head_revision].clone());

        let mut history = TagHistory::new();
        for (name, revision) in tags {
            history
                .insert(NamedSnapshot {
                    name: name.to_string(),
                    root_digest: self.roots[revision].clone(),
                    revision: *revision,
                    timestamp: root_timestamp(*revision),
                })
                .expect("fixture tag");
        }
        fetcher.set_tag_history(history);

        RepositoryFixture {
            fetcher,
            roots: self.roots,
            catalogs,
        }
    }
}

/// Six revisions with cross-revision sharing of unchanged branches.
///
/// ```text
/// revision 1: root only
/// revision 2: adds /00/10 (7 catalogs)
/// revision 3: adds /00/11 (9 catalogs), shares /00/10 from revision 2
/// revision 4: adds /00/12 (8 catalogs), recreates /00/11, shares /00/10
/// revision 5: adds /00/13 (3 catalogs), shares /00/10, /00/11, /00/12
/// revision 6: drops /00/10, shares /00/11, /00/12, /00/13
/// ```
///
/// 42 distinct catalogs in total; the revision-6 tree holds 21 of them, the
/// revision-5 tree 28. Named snapshots are recorded for revisions 2, 5 and 6.
pub fn six_revision_repository() -> RepositoryFixture {
    let mut b = RepositoryBuilder::default();

    b.begin_revision(1, root_timestamp(1));

    b.begin_revision(2, root_timestamp(2));
    b.branch_10(2, root_timestamp(2));

    b.begin_revision(3, root_timestamp(3));
    b.branch_11(3, root_timestamp(3));
    b.share(3, "", 2, "/00/10");

    b.begin_revision(4, root_timestamp(4));
    b.branch_12(4, root_timestamp(4));
    b.branch_11(4, root_timestamp(4));
    b.share(4, "", 2, "/00/10");

    b.begin_revision(5, root_timestamp(5));
    b.branch_13(5, root_timestamp(5));
    b.share(5, "", 2, "/00/10");
    b.share(5, "", 4, "/00/11");
    b.share(5, "", 4, "/00/12");

    b.begin_revision(6, root_timestamp(6));
    b.share(6, "", 4, "/00/11");
    b.share(6, "", 4, "/00/12");
    b.share(6, "", 5, "/00/13");

    b.finish(
        6,
        &[("release-2", 2), ("release-5", 5), ("release-6", 6)],
    )
}

/// A single revision with a deterministically branching nested tree of
/// `num_catalogs` catalogs below the root. Exercises wide fan-out without
/// any history axis.
pub fn wide_revision_repository(num_catalogs: usize) -> RepositoryFixture {
    let mut b = RepositoryBuilder::default();
    let timestamp = 1_500_000_000;
    b.begin_revision(1, timestamp);
    make_subtree(&mut b, 1, "", timestamp, num_catalogs);
    b.finish(1, &[])
}

fn make_subtree(
    b: &mut RepositoryBuilder,
    revision: u64,
    parent: &str,
    timestamp: u64,
    num_catalogs: usize,
) {
    let mut remaining = num_catalogs;
    let mut i = 0;
    while remaining > 0 {
        // deterministic pseudo-random branch size between 1 and `remaining`
        let branch_size = ((remaining / ((remaining % 10) + 1)) % remaining) + 1;
        let path = format!("{}/{}", parent, i);
        b.create(revision, &path, parent, timestamp);
        make_subtree(b, revision, &path, timestamp, branch_size - 1);
        remaining -= branch_size;
        i += 1;
    }
}
