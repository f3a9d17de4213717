use {
    crate::{
        range::{ActiveRange, KeyRange},
        signal::StopSignal,
    },
    parking_lot::Mutex,
    rand::{Rng, rngs::StdRng},
    std::{collections::HashSet, sync::Arc, time::Duration},
    tracing::{debug, info},
};

/// Picks ranges at random without replacement.
///
/// Once every range has been handed out the exclusion set is cleared and a
/// new round starts.
pub struct RangeRotator {
    ranges: Vec<Arc<KeyRange>>,
    used: HashSet<usize>,
    rng: StdRng,
}

impl RangeRotator {
    pub fn new(ranges: Vec<Arc<KeyRange>>, rng: StdRng) -> Self {
        Self {
            ranges,
            used: HashSet::new(),
            rng,
        }
    }

    /// Next range of the current round.
    pub fn next_range(&mut self) -> Option<Arc<KeyRange>> {
        self.next_where(|_| true)
    }

    /// Next range of the current round that satisfies `eligible`.
    ///
    /// Ineligible ranges are left out of the draw but do not count as used.
    /// `None` only if no range at all is eligible.
    pub fn next_where<F>(&mut self, is_eligible: F) -> Option<Arc<KeyRange>>
    where
        F: Fn(&KeyRange) -> bool,
    {
        let eligible: Vec<usize> = (0..self.ranges.len())
            .filter(|&idx| is_eligible(&self.ranges[idx]))
            .collect();
        if eligible.is_empty() {
            return None;
        }

        let mut candidates: Vec<usize> = eligible
            .iter()
            .copied()
            .filter(|idx| !self.used.contains(idx))
            .collect();
        if candidates.is_empty() {
            self.used.clear();
            candidates = eligible;
        }

        let idx = candidates[self.rng.gen_range(0..candidates.len())];
        self.used.insert(idx);
        if self.used.len() == self.ranges.len() {
            self.used.clear();
        }
        Some(Arc::clone(&self.ranges[idx]))
    }
}

/// Publishes new active ranges, periodically and on request.
///
/// Workers pick the new range up at their next allocation; blocks already
/// being searched are not affected.
pub struct RotationController<'a, F> {
    active: &'a ActiveRange,
    rotator: Mutex<RangeRotator>,
    period: Duration,
    stop: StopSignal,
    exhausted: F,
}

impl<'a, F> RotationController<'a, F>
where
    F: Fn(&KeyRange) -> bool,
{
    /// `exhausted` tells which ranges have nothing left to allocate; those
    /// are never published.
    pub fn new(
        active: &'a ActiveRange,
        rotator: RangeRotator,
        period: Duration,
        stop: StopSignal,
        exhausted: F,
    ) -> Self {
        Self {
            active,
            rotator: Mutex::new(rotator),
            period,
            stop,
            exhausted,
        }
    }

    /// Publishes one new range; `false` if every range is exhausted.
    pub fn rotate(&self) -> bool {
        let mut rotator = self.rotator.lock();
        self.publish_next(&mut rotator)
    }

    /// Rotates away from `seen`, unless another rotation already did.
    ///
    /// Lets every worker that ran out of keys ask for a new range without
    /// skipping over the one a faster worker just published. `false` if
    /// every range is exhausted.
    pub fn rotate_from(&self, seen: &Arc<KeyRange>) -> bool {
        let mut rotator = self.rotator.lock();
        if !Arc::ptr_eq(&self.active.load(), seen) {
            return true;
        }
        self.publish_next(&mut rotator)
    }

    fn publish_next(&self, rotator: &mut RangeRotator) -> bool {
        let exhausted = &self.exhausted;
        match rotator.next_where(|range| !exhausted(range)) {
            Some(next) => {
                let bounds = next.bounds();
                self.active.swap(next);
                info!(%bounds, "rotated to next key range");
                true
            }
            None => false,
        }
    }

    /// Rotates every period until the stop signal fires.
    pub fn run(&self) {
        while !self.stop.wait_timeout(self.period) {
            if !self.rotate() {
                debug!("no range left to rotate to");
            }
        }
        debug!("rotation stopped");
    }
}
