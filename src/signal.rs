use {
    parking_lot::{Condvar, Mutex},
    std::{
        fmt,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::{Duration, Instant},
    },
};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A worker matched a target identifier.
    Found,

    /// Stop requested from outside the coordinator.
    Shutdown,

    /// Every configured range has been searched.
    Exhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Found => "found",
            StopReason::Shutdown => "shutdown",
            StopReason::Exhausted => "exhausted",
        })
    }
}

struct Inner {
    fired: AtomicBool,
    reason: Mutex<Option<StopReason>>,
    cvar: Condvar,
}

/// Single-fire stop broadcast shared by workers and background threads.
///
/// Cloning yields another handle to the same signal. Triggering more than
/// once is allowed; only the first trigger counts.
#[derive(Clone)]
pub struct StopSignal(Arc<Inner>);

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StopSignal").field(&self.reason()).finish()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            fired: AtomicBool::new(false),
            reason: Mutex::new(None),
            cvar: Condvar::new(),
        }))
    }

    /// Fires the signal.
    ///
    /// Returns `true` for the call that actually fired it.
    pub fn trigger(&self, reason: StopReason) -> bool {
        let mut slot = self.0.reason.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason);
        self.0.fired.store(true, Ordering::Release);
        self.0.cvar.notify_all();
        true
    }

    /// Cheap check meant for hot loops.
    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.0.fired.load(Ordering::Acquire)
    }

    /// Reason recorded by the first trigger.
    pub fn reason(&self) -> Option<StopReason> {
        *self.0.reason.lock()
    }

    /// Blocks until the signal fires or `timeout` elapses.
    ///
    /// Returns `true` if the signal has fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.0.reason.lock();
        while slot.is_none() {
            if self.0.cvar.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        slot.is_some()
    }
}
