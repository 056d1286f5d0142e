//! Fixed-size worker pool for independent per-row tasks.
//!
//! Every worker thread owns a context (typically an open feature index)
//! that it builds lazily on its first task and reuses afterwards. Results
//! come back through a channel in completion order, tagged with the task
//! index so callers can restore a deterministic order after the barrier.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, bail, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use indicatif::ProgressBar;
use log::{debug, info, warn};

use crate::mapper::{map_row, GenomicRecord, MappedRecord};
use crate::query::{AnnotationStore, QueryService};

/// Task counts for one dispatch. `completed + failed == submitted` unless a
/// worker failed to initialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Everything collected by one dispatch, in completion order.
#[derive(Debug)]
pub struct Dispatched<R> {
    pub batches: Vec<(usize, Vec<R>)>,
    pub stats: DispatchStats,
}

impl<R> Dispatched<R> {
    /// Flatten the batches in task-index order.
    pub fn into_ordered(mut self) -> Vec<R> {
        self.batches.sort_by_key(|(task, _)| *task);
        self.batches.into_iter().flat_map(|(_, records)| records).collect()
    }
}

enum Completion<R> {
    Done { task: usize, records: Vec<R> },
    Failed { task: usize, reason: String },
    InitFailed { worker: usize, error: anyhow::Error },
}

/// Runs tasks on `workers` long-lived threads.
///
/// Failure policy: a task that errors or panics is logged, counted and
/// skipped. A worker whose task panicked drops its context and builds a
/// fresh one for its next task. If a context cannot be built at all, the
/// remaining tasks are abandoned and the dispatch returns that error.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    workers: usize,
    progress: ProgressBar,
}

impl Dispatcher {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report each finished task (completed or failed) on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    /// Submit one task per item and block until all of them have finished.
    ///
    /// `init` builds a worker's context; `task` maps one item with it.
    pub fn dispatch<T, R, C, I, F>(&self, items: Vec<T>, init: I, task: F) -> Result<Dispatched<R>>
    where
        T: Send,
        R: Send,
        I: Fn() -> Result<C> + Sync,
        F: Fn(&mut C, T) -> Result<Vec<R>> + Sync,
    {
        if self.workers == 0 {
            bail!("worker count must be at least 1");
        }

        let submitted = items.len();
        self.progress.set_length(submitted as u64);

        // Everything is queued up front; workers exit once the queue drains.
        let (task_tx, task_rx) = unbounded::<(usize, T)>();
        for job in items.into_iter().enumerate() {
            task_tx
                .send(job)
                .map_err(|_| anyhow!("task queue closed before submission finished"))?;
        }
        drop(task_tx);

        let abort = AtomicBool::new(false);
        let (done_tx, done_rx) = unbounded::<Completion<R>>();

        let r = crossbeam_utils::thread::scope(|s| -> Result<Dispatched<R>> {
            for worker in 0..self.workers {
                let tasks = task_rx.clone();
                let done = done_tx.clone();
                let (init, task, abort) = (&init, &task, &abort);
                s.spawn(move |_| run_worker(worker, init, task, tasks, done, abort));
            }
            // Only the workers hold senders now, so the loop below also ends
            // if they all stop early.
            drop(done_tx);

            let mut stats = DispatchStats {
                submitted,
                ..DispatchStats::default()
            };
            let mut batches = Vec::with_capacity(submitted);
            let mut init_error: Option<anyhow::Error> = None;

            for completion in done_rx.iter() {
                match completion {
                    Completion::Done { task, records } => {
                        stats.completed += 1;
                        batches.push((task, records));
                        self.progress.inc(1);
                    }
                    Completion::Failed { task, reason } => {
                        stats.failed += 1;
                        warn!("Task {} failed and was skipped: {}", task, reason);
                        self.progress.inc(1);
                    }
                    Completion::InitFailed { worker, error } => {
                        abort.store(true, Ordering::Relaxed);
                        init_error.get_or_insert(error.context(format!("worker {worker} could not be initialized")));
                    }
                }
                if stats.completed + stats.failed == submitted {
                    break;
                }
            }

            if let Some(e) = init_error {
                return Err(e);
            }
            Ok(Dispatched { batches, stats })
        });

        match r {
            Ok(v) => v,
            Err(e) => Err(anyhow!(decipher_panic(e))),
        }
    }
}

fn run_worker<T, R, C, I, F>(
    worker: usize,
    init: &I,
    task: &F,
    tasks: Receiver<(usize, T)>,
    done: Sender<Completion<R>>,
    abort: &AtomicBool,
) where
    I: Fn() -> Result<C>,
    F: Fn(&mut C, T) -> Result<Vec<R>>,
{
    let mut context: Option<C> = None;

    for (index, item) in tasks.iter() {
        if abort.load(Ordering::Relaxed) {
            break;
        }

        let mut ctx = match context.take() {
            Some(ctx) => ctx,
            None => match init() {
                Ok(ctx) => {
                    debug!("worker {worker} initialized its context");
                    ctx
                }
                Err(error) => {
                    abort.store(true, Ordering::Relaxed);
                    let _ = done.send(Completion::InitFailed { worker, error });
                    return;
                }
            },
        };

        let completion = match panic::catch_unwind(AssertUnwindSafe(|| task(&mut ctx, item))) {
            Ok(Ok(records)) => {
                context = Some(ctx);
                Completion::Done { task: index, records }
            }
            Ok(Err(e)) => {
                context = Some(ctx);
                Completion::Failed {
                    task: index,
                    reason: format!("{e:#}"),
                }
            }
            // the context may be half-updated; it is dropped here
            Err(p) => Completion::Failed {
                task: index,
                reason: format!("panicked: {}", decipher_panic(p)),
            },
        };

        if done.send(completion).is_err() {
            break;
        }
    }
}

fn decipher_panic(p: Box<dyn Any + 'static + Send>) -> String {
    if let Some(&s) = p.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Ok(s) = p.downcast::<String>() {
        *s
    } else {
        "thread panicked with unrecognized type".to_string()
    }
}

/// Map every row on the dispatcher's pool. Each worker opens its own query
/// service through `open`. The result is in input-row order.
pub fn map_rows<S, O>(
    dispatcher: &Dispatcher,
    rows: Vec<GenomicRecord>,
    open: O,
) -> Result<(Vec<MappedRecord>, DispatchStats)>
where
    S: AnnotationStore,
    O: Fn() -> Result<QueryService<S>> + Sync,
{
    info!(
        "Mapping {} rows onto transcripts with {} workers",
        rows.len(),
        dispatcher.workers()
    );

    let dispatched = dispatcher.dispatch(rows, open, |svc, row| Ok(map_row(svc, &row)))?;
    let stats = dispatched.stats;
    let mapped = dispatched.into_ordered();

    info!(
        "Mapped {} of {} rows ({} failed) into {} transcript records",
        stats.completed,
        stats.submitted,
        stats.failed,
        mapped.len()
    );
    Ok((mapped, stats))
}
