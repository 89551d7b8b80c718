use rayon::prelude::*;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use tracing::{debug, info};

use crate::error::Error;
use crate::executor::DeletionExecutor;
use crate::report::{Advisory, RunEvent};
use crate::scanner::ScanItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    Sequential,
    Parallel(NonZeroUsize),
}

impl ConcurrencyMode {
    pub fn worker_count(&self) -> usize {
        match self {
            ConcurrencyMode::Sequential => 1,
            ConcurrencyMode::Parallel(threads) => threads.get(),
        }
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyMode::Sequential => write!(f, "sequential"),
            ConcurrencyMode::Parallel(threads) => write!(f, "parallel, {} threads", threads),
        }
    }
}

/// Explicit operator choice, overriding the topology default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyOverride {
    Sequential,
    /// `None` keeps the configured default thread count.
    Parallel(Option<NonZeroUsize>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyDecision {
    pub mode: ConcurrencyMode,
    pub advisory: Option<Advisory>,
}

/// Network roots default to a worker pool, local roots to sequential deletion.
pub fn select_concurrency(
    is_network: bool,
    requested: Option<ConcurrencyOverride>,
    default_threads: NonZeroUsize,
) -> ConcurrencyDecision {
    let (mode, advisory) = match (requested, is_network) {
        (Some(ConcurrencyOverride::Sequential), true) => {
            (ConcurrencyMode::Sequential, Some(Advisory::SequentialOnNetwork))
        }
        (Some(ConcurrencyOverride::Sequential), false) => (ConcurrencyMode::Sequential, None),
        (Some(ConcurrencyOverride::Parallel(threads)), _) => (
            ConcurrencyMode::Parallel(threads.unwrap_or(default_threads)),
            None,
        ),
        (None, true) => (ConcurrencyMode::Parallel(default_threads), None),
        (None, false) => (ConcurrencyMode::Sequential, None),
    };
    ConcurrencyDecision { mode, advisory }
}

/// Feeds scan items to the deletion executor, either inline or through a
/// fixed-size worker pool.
///
/// Enumeration stays sequential in both modes; only deletions fan out. `run`
/// returns once every item has been handled and every worker has dropped its
/// event sender, so the report owner sees all outcomes before cleanup starts.
pub struct Orchestrator<'a> {
    executor: DeletionExecutor,
    mode: ConcurrencyMode,
    cancel: &'a AtomicBool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(executor: DeletionExecutor, mode: ConcurrencyMode, cancel: &'a AtomicBool) -> Self {
        Self {
            executor,
            mode,
            cancel,
        }
    }

    pub fn run<I>(&self, items: I, events: Sender<RunEvent>) -> Result<(), Error>
    where
        I: Iterator<Item = ScanItem> + Send,
    {
        let cancel = self.cancel;
        let items = items.take_while(move |_| !cancel.load(Ordering::Relaxed));

        match self.mode {
            ConcurrencyMode::Sequential => {
                info!("Processing files sequentially");
                for item in items {
                    self.handle(item, &events);
                }
            }
            ConcurrencyMode::Parallel(threads) => {
                info!("Processing files with {} worker threads", threads);
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads.get())
                    .thread_name(|i| format!("retention-worker-{}", i))
                    .build()?;
                pool.install(|| {
                    items
                        .par_bridge()
                        .for_each_with(events, |events, item| self.handle(item, events));
                });
            }
        }
        Ok(())
    }

    fn handle(&self, item: ScanItem, events: &Sender<RunEvent>) {
        match item {
            ScanItem::Error(error) => emit(events, RunEvent::Failed(error)),
            ScanItem::Candidate { candidate, expired } => {
                emit(events, RunEvent::Scanned { expired });
                if !expired {
                    return;
                }
                let event = match self.executor.delete(&candidate) {
                    Ok(outcome) => RunEvent::Outcome {
                        path: candidate.path,
                        outcome,
                    },
                    Err(err) => RunEvent::Failed(err.into()),
                };
                emit(events, event);
            }
        }
    }
}

fn emit(events: &Sender<RunEvent>, event: RunEvent) {
    if let Err(err) = events.send(event) {
        debug!("Report collector is gone, dropping {:?}", err.0);
    }
}
