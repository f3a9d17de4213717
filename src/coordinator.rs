use {
    crate::{
        SearchResult,
        allocator::BlockAllocator,
        derive::Deriver,
        found::{FoundKey, ResultSink},
        journal::{ProgressJournal, Replay},
        range::{ActiveRange, KeyRange},
        rotation::{RangeRotator, RotationController},
        search::{SearchContext, SearchStats},
        signal::{StopReason, StopSignal},
    },
    rand::{RngCore, SeedableRng, rngs::StdRng},
    std::{
        fmt,
        path::PathBuf,
        sync::{Arc, OnceLock},
        thread,
        time::Duration,
    },
    tracing::{error, info},
};

/// What to do with an existing progress journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Discard the journal and search every range from scratch.
    Fresh,

    /// Skip every block recorded in the journal.
    #[default]
    Resume,
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reason: StopReason,

    /// The matching key, when the run stopped on a match.
    pub found: Option<FoundKey>,

    /// Keys checked during this run.
    pub keys_checked: u64,

    /// Blocks completed, replayed ones included.
    pub blocks_completed: u64,

    /// Blocks skipped because the journal already recorded them.
    pub resumed_blocks: u64,

    pub elapsed: Duration,
}

/// Validated run configuration, see [`CoordinatorBuilder`](crate::CoordinatorBuilder).
pub(crate) struct Config {
    pub workers: usize,
    pub block_size: u64,
    pub rotation_period: Duration,
    pub report_interval: Duration,
    pub start_mode: StartMode,
    pub journal_path: PathBuf,
    pub result_path: PathBuf,
    pub seed: Option<u64>,
}

/// Runs a search over a set of key ranges with a pool of workers.
pub struct Coordinator<D> {
    ranges: Vec<Arc<KeyRange>>,
    deriver: D,
    config: Config,
    stop: StopSignal,
}

impl<D: Deriver> Coordinator<D> {
    pub(crate) fn new(ranges: Vec<Arc<KeyRange>>, deriver: D, config: Config) -> Self {
        Self {
            ranges,
            deriver,
            config,
            stop: StopSignal::new(),
        }
    }

    /// Handle that stops the run from outside, e.g. on SIGINT.
    ///
    /// Triggering it before [`run()`](Self::run) makes the run return
    /// immediately.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Searches until a key matches, the stop signal fires, or every range is
    /// exhausted.
    ///
    /// Fails only if the journal cannot be opened.
    pub fn run(self) -> SearchResult<RunSummary> {
        let Self {
            ranges,
            deriver,
            config,
            stop,
        } = self;

        let (journal, replay) = match config.start_mode {
            StartMode::Fresh => (ProgressJournal::fresh(&config.journal_path)?, Replay::default()),
            StartMode::Resume => ProgressJournal::resume(&config.journal_path)?,
        };
        let allocator = BlockAllocator::new();
        for record in &replay.records {
            allocator.reserve(record.block);
        }
        let resumed_blocks = replay.last_sequence();

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut rotator = RangeRotator::new(ranges.clone(), StdRng::seed_from_u64(rng.next_u64()));
        let stats = SearchStats::new(resumed_blocks);

        let Some(initial) = rotator.next_where(|range| !allocator.is_exhausted(range.bounds()))
        else {
            info!(resumed_blocks, "every key range already searched");
            stop.trigger(StopReason::Exhausted);
            return Ok(RunSummary {
                reason: stop.reason().unwrap_or(StopReason::Exhausted),
                found: None,
                keys_checked: 0,
                blocks_completed: resumed_blocks,
                resumed_blocks,
                elapsed: stats.elapsed(),
            });
        };

        info!(
            workers = config.workers,
            block_size = config.block_size,
            ranges = ranges.len(),
            mode = %config.start_mode,
            resumed_blocks,
            "starting search"
        );

        let context = SearchContext {
            deriver,
            allocator,
            active: ActiveRange::new(initial),
            ranges,
            journal,
            results: ResultSink::new(config.result_path),
            found: OnceLock::new(),
            stop,
            stats,
            block_size: config.block_size,
        };

        let rotation = RotationController::new(
            &context.active,
            rotator,
            config.rotation_period,
            context.stop.clone(),
            |range: &KeyRange| context.allocator.is_exhausted(range.bounds()),
        );

        thread::scope(|s| {
            let ctx = &context;
            let rotation = &rotation;
            s.spawn(move || rotation.run());

            if !config.report_interval.is_zero() {
                let interval = config.report_interval;
                s.spawn(move || ctx.report_progress(interval));
            }

            let workers: Vec<_> = (0..config.workers)
                .map(|id| {
                    let rng = StdRng::seed_from_u64(rng.next_u64());
                    s.spawn(move || ctx.run_worker(id, rng, rotation))
                })
                .collect();
            for worker in workers {
                if worker.join().is_err() {
                    error!("worker panicked");
                }
            }

            // Workers only return on their own once nothing is left.
            if ctx.stop.trigger(StopReason::Exhausted) {
                info!("all key ranges exhausted");
            }
        });

        let summary = RunSummary {
            reason: context.stop.reason().unwrap_or(StopReason::Exhausted),
            keys_checked: context.stats.keys_checked(),
            blocks_completed: context.stats.blocks_completed(),
            resumed_blocks,
            elapsed: context.stats.elapsed(),
            found: context.found.into_inner(),
        };
        info!(
            reason = %summary.reason,
            keys = summary.keys_checked,
            blocks = summary.blocks_completed,
            elapsed = ?summary.elapsed,
            "search finished"
        );
        Ok(summary)
    }
}
