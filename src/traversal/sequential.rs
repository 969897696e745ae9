use std::sync::{Arc, Mutex};

use tracing::instrument;

use super::params::{HistoryDepth, TraversalParams};
use super::tracker::VisitTracker;
use super::walk::{
    admit, fan_out, fetch_or_prune, next_in_history, resolve_history_chain, FetchOutcome,
};
use super::{TraversalOrder, VisitListener};
use crate::fetcher::ObjectFetcher;
use crate::{CatalogDigest, CatalogHandle, Error, MountPoint, NestedReference};

/// Single-threaded traversal engine.
///
/// Repeated entry-point calls on one instance share the deduplication state,
/// so a catalog visited by an earlier call is skipped by later ones when
/// [TraversalParams::no_repeat_history] is set.
pub struct CatalogTraversal<F: ObjectFetcher> {
    fetcher: F,
    params: TraversalParams,
    listeners: Vec<Arc<dyn VisitListener<F::Catalog>>>,
    tracker: Mutex<VisitTracker>,
}

impl<F: ObjectFetcher> CatalogTraversal<F> {
    pub fn new(fetcher: F, params: TraversalParams) -> Result<Self, Error> {
        params.validate()?;
        Ok(Self {
            fetcher,
            params,
            listeners: Vec::new(),
            tracker: Mutex::new(VisitTracker::default()),
        })
    }

    /// Registers a listener; every listener receives every visit.
    pub fn register_listener<L>(&mut self, listener: L)
    where
        L: VisitListener<F::Catalog> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Walks the repository starting from the current HEAD.
    #[instrument(skip(self), err)]
    pub async fn traverse(&self, order: TraversalOrder) -> Result<(), Error> {
        let head = self.fetcher.fetch_head().await?;
        self.run_walks(head, self.params.history, order, true).await
    }

    /// Walks the repository starting from an explicit root catalog.
    #[instrument(skip(self), fields(catalog.digest = %root), err)]
    pub async fn traverse_from(
        &self,
        root: CatalogDigest,
        order: TraversalOrder,
    ) -> Result<(), Error> {
        self.run_walks(root, self.params.history, order, true).await
    }

    /// Walks a single revision's nested tree, without history descent.
    #[instrument(skip(self), fields(catalog.digest = %root), err)]
    pub async fn traverse_revision(
        &self,
        root: CatalogDigest,
        order: TraversalOrder,
    ) -> Result<(), Error> {
        self.run_walks(root, HistoryDepth::Depth(0), order, true)
            .await
    }

    /// Walks every named snapshot of the tag history, in ascending revision
    /// order, each as a single-revision walk. The history and timestamp
    /// parameters do not restrict the snapshot set.
    #[instrument(skip(self), err)]
    pub async fn traverse_named_snapshots(&self, order: TraversalOrder) -> Result<(), Error> {
        let Some(history) = self.fetcher.fetch_tag_history().await? else {
            return Ok(());
        };
        for snapshot in history.by_ascending_revision() {
            self.run_walks(
                snapshot.root_digest.clone(),
                HistoryDepth::Depth(0),
                order,
                false,
            )
            .await?;
        }
        Ok(())
    }

    async fn run_walks(
        &self,
        entry: CatalogDigest,
        budget: HistoryDepth,
        order: TraversalOrder,
        entry_fatal: bool,
    ) -> Result<(), Error> {
        match order {
            TraversalOrder::BreadthFirst => {
                self.walk_breadth_first(entry, budget, entry_fatal).await
            }
            TraversalOrder::DepthFirst => self.walk_depth_first(entry, budget, entry_fatal).await,
        }
    }

    /// Emits each revision's tree top-down, newest revision first.
    async fn walk_breadth_first(
        &self,
        entry: CatalogDigest,
        mut budget: HistoryDepth,
        entry_fatal: bool,
    ) -> Result<(), Error> {
        let mut next = Some(entry);
        let mut at_entry = true;

        while let Some(root_digest) = next.take() {
            if !admit(&self.params, &self.tracker, &root_digest, true) {
                break;
            }
            let root = match fetch_or_prune(
                &self.fetcher,
                &self.params,
                &self.listeners,
                &root_digest,
                &MountPoint::root(),
                at_entry && entry_fatal,
            )
            .await?
            {
                FetchOutcome::Loaded(catalog) => catalog,
                FetchOutcome::Pruned => break,
            };

            self.expand_pre_order(root.clone()).await?;

            if let Some((previous, remaining)) =
                next_in_history(&self.params, root.as_ref(), budget)
            {
                next = Some(previous);
                budget = remaining;
            }
            at_entry = false;
        }

        Ok(())
    }

    /// Emits each revision's tree bottom-up, oldest revision first.
    async fn walk_depth_first(
        &self,
        entry: CatalogDigest,
        budget: HistoryDepth,
        entry_fatal: bool,
    ) -> Result<(), Error> {
        let chain = resolve_history_chain(
            &self.fetcher,
            &self.params,
            &self.listeners,
            &self.tracker,
            entry,
            budget,
            entry_fatal,
        )
        .await?;

        for root in chain.into_iter().rev() {
            self.expand_post_order(root).await?;
        }
        Ok(())
    }

    /// Pre-order expansion of one revision tree: a catalog is emitted when it
    /// is taken off the work stack, its children follow in stored order.
    async fn expand_pre_order(&self, root: Arc<F::Catalog>) -> Result<(), Error> {
        let mut stack: Vec<(NestedReference, usize)> = Vec::new();

        fan_out(&self.listeners, &self.params, &root, 0);
        push_children(&mut stack, root.as_ref(), 1);

        while let Some((reference, tree_level)) = stack.pop() {
            if !admit(&self.params, &self.tracker, &reference.digest, false) {
                continue;
            }
            let catalog = match fetch_or_prune(
                &self.fetcher,
                &self.params,
                &self.listeners,
                &reference.digest,
                &reference.mountpoint,
                false,
            )
            .await?
            {
                FetchOutcome::Loaded(catalog) => catalog,
                FetchOutcome::Pruned => continue,
            };
            fan_out(&self.listeners, &self.params, &catalog, tree_level);
            push_children(&mut stack, catalog.as_ref(), tree_level + 1);
        }

        Ok(())
    }

    /// Post-order expansion of one revision tree: a frame emits its catalog
    /// once all child subtrees have been emitted.
    async fn expand_post_order(&self, root: Arc<F::Catalog>) -> Result<(), Error> {
        struct Frame<C> {
            catalog: Arc<C>,
            tree_level: usize,
            next_child: usize,
        }

        let mut stack = vec![Frame {
            catalog: root,
            tree_level: 0,
            next_child: 0,
        }];

        while !stack.is_empty() {
            let pending_child = {
                let frame = stack.last_mut().expect("stack is non-empty");
                let children = frame.catalog.nested_children();
                if frame.next_child < children.len() {
                    let reference = children[frame.next_child].clone();
                    frame.next_child += 1;
                    Some((reference, frame.tree_level + 1))
                } else {
                    None
                }
            };

            match pending_child {
                Some((reference, tree_level)) => {
                    if !admit(&self.params, &self.tracker, &reference.digest, false) {
                        continue;
                    }
                    match fetch_or_prune(
                        &self.fetcher,
                        &self.params,
                        &self.listeners,
                        &reference.digest,
                        &reference.mountpoint,
                        false,
                    )
                    .await?
                    {
                        FetchOutcome::Loaded(catalog) => stack.push(Frame {
                            catalog,
                            tree_level,
                            next_child: 0,
                        }),
                        FetchOutcome::Pruned => continue,
                    }
                }
                None => {
                    let frame = stack.pop().expect("stack is non-empty");
                    fan_out(&self.listeners, &self.params, &frame.catalog, frame.tree_level);
                }
            }
        }

        Ok(())
    }
}

fn push_children<C: CatalogHandle>(
    stack: &mut Vec<(NestedReference, usize)>,
    catalog: &C,
    tree_level: usize,
) {
    // reversed so the stack pops them in stored order
    for reference in catalog.nested_children().iter().rev() {
        stack.push((reference.clone(), tree_level));
    }
}
