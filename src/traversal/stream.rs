use std::collections::{HashSet, VecDeque};

use async_stream::stream;
use futures::stream::BoxStream;
use tracing::warn;

use crate::catalog::CatalogHandle;
use crate::fetcher::ObjectFetcher;
use crate::{CatalogDigest, Error, MountPoint};

/// Streams one revision's catalogs from the root towards the leaves.
///
/// This is mostly breadth-first, but each catalog is yielded at most once,
/// so subtrees shared within the revision appear a single time. Unavailable
/// catalogs surface as `Err` items; the stream continues with their siblings.
pub fn visit_stream<'a, F: ObjectFetcher + 'static>(
    fetcher: F,
    root_digest: &CatalogDigest,
) -> BoxStream<'a, Result<F::Catalog, Error>> {
    // The catalogs that still need to be fetched. The next element is picked
    // from the front, newly discovered children are enqueued at the back.
    let mut worklist: VecDeque<(CatalogDigest, MountPoint)> =
        VecDeque::from([(root_digest.clone(), MountPoint::root())]);
    // Digests already handed to the consumer.
    let mut yielded: HashSet<CatalogDigest> = HashSet::new();

    let stream = stream! {
        while let Some((digest, mountpoint)) = worklist.pop_front() {
            match fetcher.fetch_catalog(&digest, &mountpoint).await {
                Ok(None) => {
                    warn!(catalog.digest = %digest, "catalog does not exist");
                    yield Err(Error::MissingCatalog { digest, mountpoint });
                }
                Err(e) => {
                    warn!(catalog.digest = %digest, "failed to look up catalog");
                    yield Err(e);
                }
                Ok(Some(catalog)) => {
                    yielded.insert(digest);

                    for child in catalog.nested_children() {
                        if yielded.contains(&child.digest)
                            || worklist.iter().any(|(queued, _)| *queued == child.digest)
                        {
                            continue;
                        }
                        worklist.push_back((child.digest.clone(), child.mountpoint.clone()));
                    }

                    yield Ok(catalog);
                }
            }
        }
    };

    Box::pin(stream)
}
