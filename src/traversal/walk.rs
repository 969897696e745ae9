//! Pieces of the revision-walk machinery shared by both engines.

use std::sync::{Arc, Mutex};

use tracing::warn;

use super::params::{HistoryDepth, TraversalParams};
use super::tracker::VisitTracker;
use super::{CatalogVisit, VisitListener};
use crate::fetcher::ObjectFetcher;
use crate::{CatalogDigest, CatalogHandle, Error, MountPoint};

/// Result of fetching a catalog under the session's failure policy.
pub(super) enum FetchOutcome<C> {
    Loaded(Arc<C>),
    /// The object is unavailable and the walk prunes it.
    Pruned,
}

/// Fetches a catalog, applying the failure policy.
///
/// `fatal` marks fetches whose failure always aborts the walk (entry roots);
/// everything else is pruned when load failures are ignored.
pub(super) async fn fetch_or_prune<F: ObjectFetcher>(
    fetcher: &F,
    params: &TraversalParams,
    listeners: &[Arc<dyn VisitListener<F::Catalog>>],
    digest: &CatalogDigest,
    mountpoint: &MountPoint,
    fatal: bool,
) -> Result<FetchOutcome<F::Catalog>, Error> {
    let error = match fetcher.fetch_catalog(digest, mountpoint).await {
        Ok(Some(catalog)) => return Ok(FetchOutcome::Loaded(Arc::new(catalog))),
        Ok(None) => Error::MissingCatalog {
            digest: digest.clone(),
            mountpoint: mountpoint.clone(),
        },
        Err(e) => e,
    };

    if fatal || !params.ignore_load_failure {
        if !params.quiet {
            warn!(catalog.digest = %digest, catalog.mountpoint = %mountpoint, "failed to load catalog");
        }
        return Err(error);
    }

    report_load_failure(listeners, params, digest, mountpoint);
    Ok(FetchOutcome::Pruned)
}

pub(super) fn report_load_failure<C>(
    listeners: &[Arc<dyn VisitListener<C>>],
    params: &TraversalParams,
    digest: &CatalogDigest,
    mountpoint: &MountPoint,
) {
    if !params.quiet {
        warn!(catalog.digest = %digest, catalog.mountpoint = %mountpoint, "failed to load catalog, pruning its subtree");
    }
    for listener in listeners {
        listener.on_load_failure(digest, mountpoint);
    }
}

/// Invokes every listener for one visited catalog.
pub(super) fn fan_out<C: CatalogHandle>(
    listeners: &[Arc<dyn VisitListener<C>>],
    params: &TraversalParams,
    catalog: &Arc<C>,
    tree_level: usize,
) {
    let visit = CatalogVisit {
        catalog: catalog.as_ref(),
        tree_level,
        revision: catalog.revision(),
        handle: params.no_close.then_some(catalog),
    };
    for listener in listeners {
        listener.on_visit(&visit);
    }
}

/// Admission test for one catalog. A refused catalog is neither emitted nor
/// descended into; refusing a revision root therefore ends the walk.
///
/// Revision roots are gated by both bookkeeping sets: a root already recorded
/// in either the visited-root or the visited-catalog set is refused.
pub(super) fn admit(
    params: &TraversalParams,
    tracker: &Mutex<VisitTracker>,
    digest: &CatalogDigest,
    is_revision_root: bool,
) -> bool {
    if !params.no_repeat_history {
        return true;
    }
    let mut tracker = tracker.lock().expect("lock poisoned");
    if is_revision_root {
        let fresh_root = tracker.admit_root(digest);
        let fresh_catalog = tracker.admit_catalog(digest);
        fresh_root && fresh_catalog
    } else {
        tracker.admit_catalog(digest)
    }
}

/// Decides whether the walk descends from `root` to the preceding revision.
///
/// Descent requires remaining history budget, an existing predecessor, and a
/// root that is still younger than the timestamp cutoff: the first root at or
/// below the cutoff is the last one entered.
pub(super) fn next_in_history<C: CatalogHandle>(
    params: &TraversalParams,
    root: &C,
    budget: HistoryDepth,
) -> Option<(CatalogDigest, HistoryDepth)> {
    let remaining = budget.descend()?;
    let previous = root.previous_root()?.clone();
    if let Some(cutoff) = params.timestamp_cutoff {
        if root.timestamp() <= cutoff {
            return None;
        }
    }
    Some((previous, remaining))
}

/// Resolves the chain of revision roots a depth-first walk covers, newest
/// first. The caller emits the corresponding trees in reverse.
pub(super) async fn resolve_history_chain<F: ObjectFetcher>(
    fetcher: &F,
    params: &TraversalParams,
    listeners: &[Arc<dyn VisitListener<F::Catalog>>],
    tracker: &Mutex<VisitTracker>,
    entry: CatalogDigest,
    mut budget: HistoryDepth,
    entry_fatal: bool,
) -> Result<Vec<Arc<F::Catalog>>, Error> {
    let mut chain = Vec::new();
    let mut next = Some(entry);
    let mut at_entry = true;

    while let Some(digest) = next.take() {
        if !admit(params, tracker, &digest, true) {
            break;
        }
        let root = match fetch_or_prune(
            fetcher,
            params,
            listeners,
            &digest,
            &MountPoint::root(),
            at_entry && entry_fatal,
        )
        .await?
        {
            FetchOutcome::Loaded(catalog) => catalog,
            FetchOutcome::Pruned => break,
        };
        if let Some((previous, remaining)) = next_in_history(params, root.as_ref(), budget) {
            next = Some(previous);
            budget = remaining;
        }
        chain.push(root);
        at_entry = false;
    }

    Ok(chain)
}
