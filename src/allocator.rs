use {
    crate::{
        Key,
        interval::{Interval, IntervalTree},
    },
    parking_lot::Mutex,
    rand::{Rng, RngCore},
};

/// Block of keys handed out to a single worker.
pub type Block = Interval;

/// Random draws tried at each working size before sweeping for a free slot.
const DRAWS_PER_SIZE: usize = 4;

/// Outcome of a block allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// Block of the desired size (or the window's tail, if the window is not
    /// a multiple of it).
    Reserved(Block),

    /// Contention forced the allocator to shrink below the desired size.
    ///
    /// The block is valid but small: callers should treat it as a sign of
    /// low progress, not as an error.
    Contended(Block),

    /// Every key of the window is already reserved.
    Exhausted,
}

impl Allocation {
    /// The reserved block, if any.
    pub fn block(&self) -> Option<Block> {
        match self {
            Allocation::Reserved(block) | Allocation::Contended(block) => Some(*block),
            Allocation::Exhausted => None,
        }
    }
}

/// Hands out non-overlapping blocks of a key window.
///
/// Every block ever returned stays recorded in an [`IntervalTree`], so a block
/// can only be handed out once per run. The overlap check and the insertion
/// happen under a single lock, which makes each allocation an atomic reserve.
#[derive(Default)]
pub struct BlockAllocator {
    tree: Mutex<IntervalTree>,
}

impl From<IntervalTree> for BlockAllocator {
    fn from(tree: IntervalTree) -> Self {
        Self {
            tree: Mutex::new(tree),
        }
    }
}

impl BlockAllocator {
    /// Creates an allocator with nothing reserved.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reserved blocks, including those seeded on resume.
    pub fn reserved(&self) -> usize {
        self.tree.lock().len()
    }

    /// Marks a block as taken without going through allocation.
    ///
    /// Used to replay blocks completed by a previous run.
    pub fn reserve(&self, block: Block) {
        self.tree.lock().insert(block);
    }

    /// Returns `true` if no free key is left in `window`.
    pub fn is_exhausted(&self, window: Interval) -> bool {
        self.tree.lock().covers(window)
    }

    /// Reserves a block of up to `desired` keys inside `window`.
    ///
    /// Start positions are drawn uniformly among the offsets of `window` that
    /// are multiples of the working size; the last slot is cut short at the
    /// window's end. When a few draws collide with reserved blocks, free gaps
    /// are swept for the first slot that fits. Only if no slot of the working
    /// size is free at all, the size shrinks by 10% and the search repeats.
    pub fn allocate<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
        window: Interval,
        desired: u64,
    ) -> Allocation {
        let span = window.max() - window.min();
        let initial = match u64::try_from(span) {
            Ok(span) if span < desired => span + 1,
            _ => desired,
        };
        let mut size = initial;

        let mut tree = self.tree.lock();
        let mut gaps: Option<Vec<Interval>> = None;

        while size > 0 {
            let found = (0..DRAWS_PER_SIZE)
                .map(|_| random_slot(rng, window, size))
                .find(|slot| !tree.overlaps(slot.min(), slot.max()))
                .or_else(|| {
                    gaps.get_or_insert_with(|| tree.gaps(window))
                        .iter()
                        .find_map(|gap| aligned_slot(window, *gap, size))
                });

            if let Some(block) = found {
                tree.insert(block);
                return if size < initial {
                    Allocation::Contended(block)
                } else {
                    Allocation::Reserved(block)
                };
            }

            // Gaps cannot change while the lock is held.
            size = shrink(size);
        }

        Allocation::Exhausted
    }
}

/// `size * 9 / 10` without overflowing for sizes near `u64::MAX`.
fn shrink(size: u64) -> u64 {
    size / 10 * 9 + size % 10 * 9 / 10
}

/// Uniformly random `size`-aligned slot of `window`.
fn random_slot<R: RngCore + ?Sized>(rng: &mut R, window: Interval, size: u64) -> Block {
    let size = Key::from(size);
    let last_slot = (window.max() - window.min()) / size;
    let start = window.min() + random_up_to(rng, last_slot) * size;
    slot_at(window, start, size)
}

/// First `size`-aligned slot of `window` that fits entirely into `gap`.
fn aligned_slot(window: Interval, gap: Interval, size: u64) -> Option<Block> {
    let size = Key::from(size);
    let offset = gap.min() - window.min();
    let mut index = offset / size;
    if index * size < offset {
        index += Key::from(1u64);
    }
    let start = window.min().checked_add(index.checked_mul(size)?)?;
    if start > gap.max() {
        return None;
    }
    let slot = slot_at(window, start, size);
    (slot.max() <= gap.max()).then_some(slot)
}

fn slot_at(window: Interval, start: Key, size: Key) -> Block {
    let end = start
        .saturating_add(size - Key::from(1u64))
        .min(window.max());
    Block::new(start, end).unwrap_or_else(|| Block::point(start))
}

/// Uniform random key in `[0..=bound]`.
pub(crate) fn random_up_to<R: RngCore + ?Sized>(rng: &mut R, bound: Key) -> Key {
    if let Ok(bound) = u64::try_from(bound) {
        return Key::from(rng.gen_range(0..=bound));
    }

    // Rejection sampling over the bit length of `bound`: fewer than two draws
    // on average.
    let shift = Key::BITS - bound.bit_len();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let candidate = Key::from_be_bytes(bytes) >> shift;
        if candidate <= bound {
            return candidate;
        }
    }
}
