use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use buildnpm_core::{DependencyGraph, DependencyNode, PreviousBuildIndex};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::client::ChecksumLookup;

pub const DEFAULT_THREADS: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichOptions {
    /// Worker count; zero or negative runs on a single worker.
    pub threads: i32,
    /// How many failures are kept; later ones are only counted.
    pub max_errors: usize,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            max_errors: 1,
        }
    }
}

impl EnrichOptions {
    pub fn worker_count(&self) -> usize {
        if self.threads <= 0 {
            1
        } else {
            self.threads as usize
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub from_previous_build: usize,
    pub from_registry: usize,
    pub not_found: usize,
    pub failed: usize,
}

/// Thread-safe sink for task failures. Never cancels other tasks.
#[derive(Debug)]
pub struct ErrorCollector {
    capacity: usize,
    errors: Mutex<Vec<anyhow::Error>>,
    total: AtomicUsize,
}

impl ErrorCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            errors: Mutex::new(Vec::new()),
            total: AtomicUsize::new(0),
        }
    }

    pub fn record(&self, error: anyhow::Error) {
        self.total.fetch_add(1, Ordering::SeqCst);
        let mut errors = self
            .errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if errors.len() < self.capacity {
            errors.push(error);
        } else {
            debug!("error collector full, dropping: {error:#}");
        }
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// `Ok` when nothing was recorded, otherwise the first recorded error,
    /// noting how many other failures followed it.
    pub fn into_result(self) -> Result<()> {
        let total = self.total();
        let mut errors = self
            .errors
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if errors.is_empty() {
            return Ok(());
        }
        let first = errors.swap_remove(0);
        match total.saturating_sub(1) {
            0 => Err(first),
            1 => Err(first.context("1 more dependency failed")),
            more => Err(first.context(format!("{more} more dependencies failed"))),
        }
    }
}

#[derive(Default)]
struct Counters {
    from_previous_build: AtomicUsize,
    from_registry: AtomicUsize,
    not_found: AtomicUsize,
}

/// Fills `checksum` / `file_type` on every node of `graph`.
///
/// Each node is a separate task on a fixed-size pool and only that task
/// touches it. Every node is attempted even after a failure; the first
/// recorded failure is returned once the pool drains.
pub fn enrich_checksums<L>(
    graph: &mut DependencyGraph,
    previous: &PreviousBuildIndex,
    lookup: &L,
    options: &EnrichOptions,
    on_node_done: &(dyn Fn(&DependencyNode) + Sync),
) -> Result<EnrichSummary>
where
    L: ChecksumLookup + Sync + ?Sized,
{
    let workers = options.worker_count();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("buildnpm-checksum-{index}"))
        .build()
        .context("failed to start checksum worker pool")?;
    info!(
        dependencies = graph.len(),
        workers, "collecting dependency checksums"
    );

    let collector = ErrorCollector::new(options.max_errors);
    let counters = Counters::default();
    let tasks: Vec<&mut DependencyNode> = graph.nodes_mut().collect();

    pool.install(|| {
        tasks.into_par_iter().for_each(|node| {
            if let Err(err) = enrich_node(node, previous, lookup, &counters) {
                collector.record(err);
            }
            on_node_done(node);
        });
    });

    let summary = EnrichSummary {
        from_previous_build: counters.from_previous_build.into_inner(),
        from_registry: counters.from_registry.into_inner(),
        not_found: counters.not_found.into_inner(),
        failed: collector.total(),
    };
    if summary.failed > 0 {
        warn!(
            failed = summary.failed,
            "checksum collection failed for some dependencies"
        );
    }
    debug!(?summary, "checksum collection finished");

    collector.into_result()?;
    Ok(summary)
}

fn enrich_node<L>(
    node: &mut DependencyNode,
    previous: &PreviousBuildIndex,
    lookup: &L,
    counters: &Counters,
) -> Result<()>
where
    L: ChecksumLookup + Sync + ?Sized,
{
    let id = node.id();
    if let Some(recorded) = previous.get(&id) {
        node.checksum = Some(recorded.checksum.clone());
        node.file_type = recorded.file_type.clone();
        counters.from_previous_build.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    let found = lookup
        .lookup(&node.name, &node.version)
        .with_context(|| format!("failed to collect checksum for {id}"))?;
    match found {
        Some(remote) => {
            node.checksum = Some(remote.checksum);
            node.file_type = remote.file_type;
            counters.from_registry.fetch_add(1, Ordering::Relaxed);
        }
        None => {
            counters.not_found.fetch_add(1, Ordering::Relaxed);
        }
    }
    Ok(())
}
