use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::instrument;

use super::params::{HistoryDepth, TraversalParams};
use super::tracker::VisitTracker;
use super::walk::{
    admit, fan_out, fetch_or_prune, next_in_history, report_load_failure, resolve_history_chain,
    FetchOutcome,
};
use super::{TraversalOrder, VisitListener};
use crate::catalog::CatalogHandle;
use crate::fetcher::ObjectFetcher;
use crate::{CatalogDigest, Error, MountPoint, NestedReference};

/// Traversal engine that spreads object fetches over a pool of worker tasks.
///
/// The engine visits exactly the catalogs the sequential engine would visit
/// for the same parameters. In depth-first mode a catalog is still emitted
/// only after its entire nested subtree; sibling order is unspecified.
/// Listener invocations are serialized, so listeners need not be re-entrant.
pub struct CatalogTraversalParallel<F: ObjectFetcher + 'static> {
    fetcher: Arc<F>,
    params: TraversalParams,
    listeners: Vec<Arc<dyn VisitListener<F::Catalog>>>,
    tracker: Arc<Mutex<VisitTracker>>,
}

impl<F: ObjectFetcher + 'static> CatalogTraversalParallel<F> {
    pub fn new(fetcher: F, params: TraversalParams) -> Result<Self, Error> {
        params.validate()?;
        Ok(Self {
            fetcher: Arc::new(fetcher),
            params,
            listeners: Vec::new(),
            tracker: Arc::new(Mutex::new(VisitTracker::default())),
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
    /// order, each as a single-revision walk.
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

    /// Revision walks are scheduled exactly like the sequential engine's;
    /// only the expansion of each revision tree is parallel.
    async fn run_walks(
        &self,
        entry: CatalogDigest,
        mut budget: HistoryDepth,
        order: TraversalOrder,
        entry_fatal: bool,
    ) -> Result<(), Error> {
        match order {
            TraversalOrder::BreadthFirst => {
                let mut next = Some(entry);
                let mut at_entry = true;
                while let Some(root_digest) = next.take() {
                    if !admit(&self.params, &self.tracker, &root_digest, true) {
                        break;
                    }
                    let root = match fetch_or_prune(
                        self.fetcher.as_ref(),
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

                    self.expand_parallel(root.clone(), order).await?;

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
            TraversalOrder::DepthFirst => {
                let chain = resolve_history_chain(
                    self.fetcher.as_ref(),
                    &self.params,
                    &self.listeners,
                    &self.tracker,
                    entry,
                    budget,
                    entry_fatal,
                )
                .await?;
                for root in chain.into_iter().rev() {
                    self.expand_parallel(root, order).await?;
                }
                Ok(())
            }
        }
    }

    /// Runs the worker pool over one revision tree.
    async fn expand_parallel(
        &self,
        root: Arc<F::Catalog>,
        order: TraversalOrder,
    ) -> Result<(), Error> {
        let state = Arc::new(WalkState {
            fetcher: self.fetcher.clone(),
            params: self.params.clone(),
            listeners: self.listeners.clone(),
            tracker: self.tracker.clone(),
            order,
            emit_lock: tokio::sync::Mutex::new(()),
            failure: Mutex::new(None),
            failed: AtomicBool::new(false),
        });

        let (tx, rx) = mpsc::unbounded_channel::<Job<F::Catalog>>();

        // Seed the queue with the root's children. Each job carries a sender
        // clone, so the queue closes exactly when no work is left anywhere.
        match order {
            TraversalOrder::BreadthFirst => {
                state.emit(&root, 0).await;
                for reference in root.nested_children() {
                    let job = Job {
                        reference: reference.clone(),
                        tree_level: 1,
                        parent: None,
                        tx: tx.clone(),
                    };
                    let _ = tx.send(job);
                }
            }
            TraversalOrder::DepthFirst => {
                let children = root.nested_children();
                if children.is_empty() {
                    state.emit(&root, 0).await;
                } else {
                    let node = Arc::new(PendingNode {
                        catalog: root.clone(),
                        tree_level: 0,
                        pending: AtomicUsize::new(children.len()),
                        parent: None,
                    });
                    for reference in children {
                        let job = Job {
                            reference: reference.clone(),
                            tree_level: 1,
                            parent: Some(node.clone()),
                            tx: tx.clone(),
                        };
                        let _ = tx.send(job);
                    }
                }
            }
        }
        drop(tx);

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = JoinSet::new();
        for _ in 0..self.params.num_threads {
            workers.spawn(worker_loop(state.clone(), rx.clone()));
        }
        while let Some(joined) = workers.join_next().await {
            joined?;
        }

        if let Some(error) = state.failure.lock().expect("lock poisoned").take() {
            return Err(error);
        }
        Ok(())
    }
}

/// One unit of work: fetch the referenced catalog and schedule its children.
struct Job<C> {
    reference: NestedReference,
    tree_level: usize,
    /// Depth-first only: the node whose counter this subtree resolves.
    parent: Option<Arc<PendingNode<C>>>,
    tx: UnboundedSender<Job<C>>,
}

/// A fetched catalog whose emission is blocked until every nested child
/// subtree has been emitted (or pruned).
struct PendingNode<C> {
    catalog: Arc<C>,
    tree_level: usize,
    pending: AtomicUsize,
    parent: Option<Arc<PendingNode<C>>>,
}

struct WalkState<F: ObjectFetcher> {
    fetcher: Arc<F>,
    params: TraversalParams,
    listeners: Vec<Arc<dyn VisitListener<F::Catalog>>>,
    tracker: Arc<Mutex<VisitTracker>>,
    order: TraversalOrder,
    emit_lock: tokio::sync::Mutex<()>,
    failure: Mutex<Option<Error>>,
    failed: AtomicBool,
}

async fn worker_loop<F: ObjectFetcher + 'static>(
    state: Arc<WalkState<F>>,
    rx: Arc<tokio::sync::Mutex<UnboundedReceiver<Job<F::Catalog>>>>,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else { break };
        if state.failed.load(Ordering::SeqCst) {
            // drain the queue so the channel closes and every worker exits
            continue;
        }
        state.process(job).await;
    }
}

impl<F: ObjectFetcher + 'static> WalkState<F> {
    async fn process(&self, job: Job<F::Catalog>) {
        if !admit(&self.params, &self.tracker, &job.reference.digest, false) {
            // an already-visited subtree counts as resolved for its parent
            self.resolve_child(job.parent.clone()).await;
            return;
        }

        let catalog = match self
            .fetcher
            .fetch_catalog(&job.reference.digest, &job.reference.mountpoint)
            .await
        {
            Ok(Some(catalog)) => Arc::new(catalog),
            Ok(None) => {
                let error = Error::MissingCatalog {
                    digest: job.reference.digest.clone(),
                    mountpoint: job.reference.mountpoint.clone(),
                };
                self.handle_load_failure(error, &job).await;
                return;
            }
            Err(error) => {
                self.handle_load_failure(error, &job).await;
                return;
            }
        };

        match self.order {
            TraversalOrder::BreadthFirst => {
                self.emit(&catalog, job.tree_level).await;
                for reference in catalog.nested_children() {
                    let child = Job {
                        reference: reference.clone(),
                        tree_level: job.tree_level + 1,
                        parent: None,
                        tx: job.tx.clone(),
                    };
                    let _ = job.tx.send(child);
                }
            }
            TraversalOrder::DepthFirst => {
                let children = catalog.nested_children();
                if children.is_empty() {
                    self.emit(&catalog, job.tree_level).await;
                    self.resolve_child(job.parent.clone()).await;
                } else {
                    let node = Arc::new(PendingNode {
                        catalog: catalog.clone(),
                        tree_level: job.tree_level,
                        pending: AtomicUsize::new(children.len()),
                        parent: job.parent.clone(),
                    });
                    for reference in children {
                        let child = Job {
                            reference: reference.clone(),
                            tree_level: job.tree_level + 1,
                            parent: Some(node.clone()),
                            tx: job.tx.clone(),
                        };
                        let _ = job.tx.send(child);
                    }
                }
            }
        }
    }

    async fn handle_load_failure(&self, error: Error, job: &Job<F::Catalog>) {
        if self.params.ignore_load_failure {
            report_load_failure(
                &self.listeners,
                &self.params,
                &job.reference.digest,
                &job.reference.mountpoint,
            );
            self.resolve_child(job.parent.clone()).await;
        } else {
            let mut failure = self.failure.lock().expect("lock poisoned");
            if failure.is_none() {
                *failure = Some(error);
            }
            self.failed.store(true, Ordering::SeqCst);
        }
    }

    /// Serialized listener fan-out; goes quiet once the walk has failed.
    async fn emit(&self, catalog: &Arc<F::Catalog>, tree_level: usize) {
        if self.failed.load(Ordering::SeqCst) {
            return;
        }
        let _guard = self.emit_lock.lock().await;
        if self.failed.load(Ordering::SeqCst) {
            return;
        }
        fan_out(&self.listeners, &self.params, catalog, tree_level);
    }

    /// Marks one child subtree of `parent` as emitted; emits the parent (and
    /// transitively its ancestors) once the last child resolves.
    async fn resolve_child(&self, parent: Option<Arc<PendingNode<F::Catalog>>>) {
        if let Some(parent) = parent {
            if parent.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.finish_node(parent).await;
            }
        }
    }

    async fn finish_node(&self, node: Arc<PendingNode<F::Catalog>>) {
        let mut current = node;
        loop {
            self.emit(&current.catalog, current.tree_level).await;
            match &current.parent {
                Some(parent) => {
                    if parent.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                        let parent = parent.clone();
                        current = parent;
                    } else {
                        break;
                    }
                }
                None => break,
            }
        }
    }
}
