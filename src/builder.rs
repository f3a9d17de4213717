use {
    super::{Coordinator, Deriver, KeyRange, SearchError, SearchResult, StartMode, coordinator::Config},
    std::{num::NonZeroUsize, path::PathBuf, sync::Arc, thread, time::Duration},
};

/// Default number of keys per block.
pub const DEFAULT_BLOCK_SIZE: u64 = 100_000;

/// Default time between range rotations.
pub const DEFAULT_ROTATION_PERIOD: Duration = Duration::from_secs(60);

/// Default time between progress reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

pub const DEFAULT_JOURNAL_PATH: &str = "progress.dat";

pub const DEFAULT_RESULT_PATH: &str = "found_keys.txt";

/// Coordinator builder.
pub struct CoordinatorBuilder<D> {
    ranges: Vec<KeyRange>,
    deriver: D,
    workers: usize,
    block_size: u64,
    rotation_period: Duration,
    report_interval: Duration,
    start_mode: StartMode,
    journal_path: PathBuf,
    result_path: PathBuf,
    seed: Option<u64>,
}

impl<D: Deriver> CoordinatorBuilder<D> {
    /// Create new coordinator builder searching `ranges` with `deriver`.
    ///
    /// Uses one worker per available CPU.
    pub fn new<I: IntoIterator<Item = KeyRange>>(ranges: I, deriver: D) -> Self {
        Self {
            ranges: ranges.into_iter().collect(),
            deriver,
            workers: thread::available_parallelism().map_or(1, NonZeroUsize::get),
            block_size: DEFAULT_BLOCK_SIZE,
            rotation_period: DEFAULT_ROTATION_PERIOD,
            report_interval: DEFAULT_REPORT_INTERVAL,
            start_mode: StartMode::default(),
            journal_path: DEFAULT_JOURNAL_PATH.into(),
            result_path: DEFAULT_RESULT_PATH.into(),
            seed: None,
        }
    }

    /// Number of concurrent search workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Keys per block; smaller blocks are handed out under contention.
    pub fn block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn rotation_period(mut self, period: Duration) -> Self {
        self.rotation_period = period;
        self
    }

    /// Time between progress reports, zero disables them.
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn start_mode(mut self, mode: StartMode) -> Self {
        self.start_mode = mode;
        self
    }

    pub fn journal_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.journal_path = path.into();
        self
    }

    pub fn result_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.result_path = path.into();
        self
    }

    /// Makes block placement and rotation order reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the coordinator.
    pub fn build(self) -> SearchResult<Coordinator<D>> {
        if self.ranges.is_empty() {
            return Err(SearchError::NoRanges);
        }
        if self.workers == 0 {
            return Err(SearchError::ZeroWorkers);
        }
        if self.block_size == 0 {
            return Err(SearchError::ZeroBlockSize);
        }
        if self.rotation_period.is_zero() {
            return Err(SearchError::ZeroRotationPeriod);
        }

        let config = Config {
            workers: self.workers,
            block_size: self.block_size,
            rotation_period: self.rotation_period,
            report_interval: self.report_interval,
            start_mode: self.start_mode,
            journal_path: self.journal_path,
            result_path: self.result_path,
            seed: self.seed,
        };
        let ranges = self.ranges.into_iter().map(Arc::new).collect();
        Ok(Coordinator::new(ranges, self.deriver, config))
    }
}
