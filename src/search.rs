use {
    crate::{
        Key,
        allocator::{Allocation, Block, BlockAllocator},
        derive::Deriver,
        found::{FoundKey, ResultSink},
        journal::ProgressJournal,
        range::{ActiveRange, KeyRange, TargetSet},
        rotation::RotationController,
        signal::{StopReason, StopSignal},
    },
    rand::rngs::StdRng,
    std::{
        sync::{
            Arc,
            OnceLock,
            atomic::{AtomicU64, Ordering},
        },
        time::{Duration, Instant},
    },
    tracing::{debug, error, info, info_span},
};

/// Keys searched between two looks at the stop signal.
pub const STOP_CHECK_INTERVAL: u64 = 256;

/// How long a worker idles when no range can be rotated in.
const EXHAUSTED_BACKOFF: Duration = Duration::from_millis(20);

/// Result of searching one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Every key was checked, nothing matched.
    Completed,

    /// A key matched; keys after it were not checked.
    Found(FoundKey),

    /// The stop signal fired before the block was done.
    Interrupted,
}

/// Progress counters of one run.
pub struct SearchStats {
    keys_checked: AtomicU64,
    blocks_completed: AtomicU64,
    started: Instant,
}

impl SearchStats {
    /// Counters starting at `blocks_completed` blocks, e.g. from a journal.
    pub fn new(blocks_completed: u64) -> Self {
        Self {
            keys_checked: AtomicU64::new(0),
            blocks_completed: AtomicU64::new(blocks_completed),
            started: Instant::now(),
        }
    }

    /// Keys checked during this run.
    pub fn keys_checked(&self) -> u64 {
        self.keys_checked.load(Ordering::Relaxed)
    }

    /// Blocks completed, including those replayed from the journal.
    pub fn blocks_completed(&self) -> u64 {
        self.blocks_completed.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Keys per second since the run started.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.keys_checked() as f64 / secs
        } else {
            0.0
        }
    }

    fn complete_block(&self) {
        self.blocks_completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Checks every key of `block` in ascending order.
///
/// Keys checked are added to `keys_checked` in batches of
/// [`STOP_CHECK_INTERVAL`], which is also how often `stop` is polled.
pub fn search_block<D: Deriver + ?Sized>(
    deriver: &D,
    block: Block,
    targets: &TargetSet,
    stop: &StopSignal,
    keys_checked: &AtomicU64,
) -> BlockOutcome {
    let mut key = block.min();
    let mut pending = 0u64;
    loop {
        if pending % STOP_CHECK_INTERVAL == 0 {
            keys_checked.fetch_add(pending, Ordering::Relaxed);
            pending = 0;
            if stop.is_triggered() {
                return BlockOutcome::Interrupted;
            }
        }

        pending += 1;
        if let Some(identifier) = deriver.derive(&key) {
            if targets.contains(&identifier) {
                keys_checked.fetch_add(pending, Ordering::Relaxed);
                return BlockOutcome::Found(FoundKey {
                    private_key: key,
                    wallet_import: deriver.wallet_import(&key),
                    identifier,
                });
            }
        }

        if key == block.max() {
            break;
        }
        key += Key::from(1u64);
    }
    keys_checked.fetch_add(pending, Ordering::Relaxed);
    BlockOutcome::Completed
}

/// State shared by all workers of a run.
pub(crate) struct SearchContext<D> {
    pub deriver: D,
    pub allocator: BlockAllocator,
    pub active: ActiveRange,
    pub ranges: Vec<Arc<KeyRange>>,
    pub journal: ProgressJournal,
    pub results: ResultSink,
    pub found: OnceLock<FoundKey>,
    pub stop: StopSignal,
    pub stats: SearchStats,
    pub block_size: u64,
}

impl<D: Deriver> SearchContext<D> {
    /// Records a match and stops the run.
    ///
    /// Only the first match of a run is kept and written out; returns `false`
    /// for any later one.
    pub fn record_found(&self, found: FoundKey) -> bool {
        if let Err(late) = self.found.set(found.clone()) {
            debug!(private_key = %late.private_key_hex(), "ignoring match after the first");
            return false;
        }

        info!(
            private_key = %found.private_key_hex(),
            identifier = %found.identifier,
            "found matching key"
        );
        if let Err(e) = self.results.write(&found) {
            error!(path = %self.results.path().display(), "failed to write found key: {e}");
        }
        self.stop.trigger(StopReason::Found);
        true
    }

    /// Returns `true` once no configured range has a free key left.
    pub fn all_exhausted(&self) -> bool {
        self.ranges
            .iter()
            .all(|range| self.allocator.is_exhausted(range.bounds()))
    }

    /// Worker loop: allocate, search, journal, repeat.
    ///
    /// A worker that finds the active range exhausted asks `rotation` for
    /// the next one. Returns when the stop signal fires or every range is
    /// exhausted.
    pub fn run_worker<F>(&self, id: usize, mut rng: StdRng, rotation: &RotationController<'_, F>)
    where
        F: Fn(&KeyRange) -> bool,
    {
        let _span = info_span!("worker", id).entered();
        debug!("worker started");

        while !self.stop.is_triggered() {
            let range = self.active.load();
            let block = match self
                .allocator
                .allocate(&mut rng, range.bounds(), self.block_size)
            {
                Allocation::Reserved(block) => block,
                Allocation::Contended(block) => {
                    debug!(%block, "allocation contended, searching a smaller block");
                    block
                }
                Allocation::Exhausted => {
                    if self.all_exhausted() {
                        debug!("all key ranges exhausted");
                        break;
                    }
                    debug!(bounds = %range.bounds(), "active range exhausted, rotating");
                    if !rotation.rotate_from(&range) {
                        self.stop.wait_timeout(EXHAUSTED_BACKOFF);
                    }
                    continue;
                }
            };

            debug!(%block, "searching block");
            match search_block(
                &self.deriver,
                block,
                range.targets(),
                &self.stop,
                &self.stats.keys_checked,
            ) {
                BlockOutcome::Completed => {
                    self.stats.complete_block();
                    self.journal.checkpoint(block);
                }
                BlockOutcome::Found(found) => {
                    self.record_found(found);
                    break;
                }
                BlockOutcome::Interrupted => break,
            }
        }

        debug!("worker stopped");
    }

    /// Logs throughput every `interval` until the stop signal fires.
    pub fn report_progress(&self, interval: Duration) {
        while !self.stop.wait_timeout(interval) {
            info!(
                keys = self.stats.keys_checked(),
                blocks = self.stats.blocks_completed(),
                rate = format_args!("{:.2} keys/s", self.stats.rate()),
                "progress"
            );
        }
    }
}
