//! # Prefetch Scheduler
//!
//! Turns a prefetch plan into delayed, cancellable tasks that prime the cache store
//! with catalog pages the shopper is likely to open next.
//!
//! Every call to [`PrefetchScheduler::schedule_prefetches`] starts a new view and
//! cancels the tasks of the previous one that have not started yet. A task that has
//! started its network call runs to completion and may populate the cache.

use super::plan::{plan_prefetches, PageContext, PrefetchConfig, PrefetchPriority};
use crate::caching::key::{keys, QueryKey};
use crate::commerce::remote::RemoteDataService;
use crate::commerce::types::{CommerceData, ProductListParams};
use crate::commerce::CommerceCache;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifier of a scheduled view
pub type ViewId = u64;

/// Identifier of a prefetch task
pub type TaskId = Uuid;

/// A pending speculative fetch
#[derive(Debug, Clone)]
pub struct PrefetchTask {
    pub id: TaskId,
    pub view: ViewId,
    pub key: QueryKey,
    pub page: u32,
    pub priority: PrefetchPriority,
    pub not_before: Instant,
    pub cancel_token: CancellationToken,
}

/// Scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchStats {
    pub scheduled: u64,
    /// Planned pages skipped because they were fresh or already fetching
    pub skipped: u64,
    pub cancelled: u64,
    pub started: u64,
}

#[derive(Default)]
struct SchedulerCounters {
    scheduled: AtomicU64,
    skipped: AtomicU64,
    cancelled: AtomicU64,
    started: AtomicU64,
}

struct SchedulerInner {
    store: CommerceCache,
    remote: Arc<dyn RemoteDataService>,
    config: PrefetchConfig,
    tasks: DashMap<TaskId, PrefetchTask>,
    current_view: AtomicU64,
    /// Parent of every abort token handed to the remote service
    shutdown: CancellationToken,
    counters: SchedulerCounters,
}

/// Priority-ordered, cancellable prefetch scheduler
#[derive(Clone)]
pub struct PrefetchScheduler {
    inner: Arc<SchedulerInner>,
}

impl PrefetchScheduler {
    /// Create a new scheduler over an explicitly constructed store
    pub fn new(
        store: CommerceCache,
        remote: Arc<dyn RemoteDataService>,
        config: PrefetchConfig,
    ) -> Self {
        info!(
            enabled = config.enabled,
            medium_delay = ?config.medium_delay,
            low_delay = ?config.low_delay,
            "Prefetch scheduler initialized"
        );
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                remote,
                config,
                tasks: DashMap::new(),
                current_view: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
                counters: SchedulerCounters::default(),
            }),
        }
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.inner.config
    }

    /// The most recently scheduled view
    pub fn current_view(&self) -> ViewId {
        self.inner.current_view.load(Ordering::SeqCst)
    }

    /// Schedule prefetches for the view the shopper just opened
    ///
    /// Pending tasks of earlier views are cancelled first. Pages whose cache entry is
    /// fresh or already being fetched get no task.
    pub fn schedule_prefetches(&self, context: &PageContext) -> ViewId {
        let view = self.inner.current_view.fetch_add(1, Ordering::SeqCst) + 1;
        let superseded = self.cancel_where(|task| task.view < view);

        if self.inner.shutdown.is_cancelled() {
            return view;
        }

        let now = Instant::now();
        let mut scheduled = 0usize;
        for planned in plan_prefetches(context, &self.inner.config) {
            if self.inner.store.is_fresh(&planned.key) || self.inner.store.is_fetching(&planned.key) {
                self.inner.counters.skipped.fetch_add(1, Ordering::Relaxed);
                debug!(key = %planned.key, page = planned.page, "Skipping prefetch of fresh page");
                continue;
            }

            let task = PrefetchTask {
                id: Uuid::new_v4(),
                view,
                key: planned.key,
                page: planned.page,
                priority: planned.priority,
                not_before: now + planned.delay,
                cancel_token: CancellationToken::new(),
            };
            self.inner.tasks.insert(task.id, task.clone());
            self.spawn_task(task, planned.params);
            scheduled += 1;
        }

        self.inner
            .counters
            .scheduled
            .fetch_add(scheduled as u64, Ordering::Relaxed);
        debug!(
            view,
            page = context.current_page(),
            total_pages = context.total_pages,
            scheduled,
            superseded,
            "Prefetches scheduled"
        );
        view
    }

    /// Cancel one pending task
    pub fn cancel(&self, task_id: TaskId) -> bool {
        match self.inner.tasks.remove(&task_id) {
            Some((_, task)) => {
                task.cancel_token.cancel();
                self.inner.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending task
    pub fn cancel_all(&self) -> usize {
        self.cancel_where(|_| true)
    }

    /// Tasks that have not started their fetch, highest priority first
    pub fn pending_tasks(&self) -> Vec<PrefetchTask> {
        let mut tasks: Vec<PrefetchTask> = self
            .inner
            .tasks
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.not_before.cmp(&b.not_before))
        });
        tasks
    }

    /// Cancel pending tasks and abort running network calls
    ///
    /// No further prefetches are scheduled afterwards.
    pub fn shutdown(&self) {
        let cancelled = self.cancel_all();
        self.inner.shutdown.cancel();
        info!(cancelled, "Prefetch scheduler shut down");
    }

    pub fn stats(&self) -> PrefetchStats {
        let counters = &self.inner.counters;
        PrefetchStats {
            scheduled: counters.scheduled.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
            started: counters.started.load(Ordering::Relaxed),
        }
    }

    fn cancel_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&PrefetchTask) -> bool,
    {
        let ids: Vec<TaskId> = self
            .inner
            .tasks
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        let mut cancelled = 0;
        for id in ids {
            if let Some((_, task)) = self.inner.tasks.remove_if(&id, |_, task| predicate(task)) {
                task.cancel_token.cancel();
                cancelled += 1;
            }
        }

        self.inner
            .counters
            .cancelled
            .fetch_add(cancelled as u64, Ordering::Relaxed);
        cancelled
    }

    fn spawn_task(&self, task: PrefetchTask, params: ProductListParams) {
        let inner = self.inner.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task.cancel_token.cancelled() => {
                    debug!(key = %task.key, priority = %task.priority, "Prefetch cancelled before start");
                    return;
                }
                _ = tokio::time::sleep_until(task.not_before) => {}
            }

            // Claiming the task makes it non-cancellable; losing the race means it was cancelled
            if inner.tasks.remove(&task.id).is_none() {
                return;
            }
            inner.counters.started.fetch_add(1, Ordering::Relaxed);

            let remote = inner.remote.clone();
            let abort = inner.shutdown.child_token();
            debug!(key = %task.key, page = task.page, priority = %task.priority, "Prefetch started");
            inner
                .store
                .prefetch(task.key.clone(), keys::products::TIER, move || async move {
                    remote
                        .list_products(&params, abort)
                        .await
                        .map(CommerceData::ProductPage)
                })
                .await;
        });
    }
}
