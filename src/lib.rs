//! Randomized, resumable partitioning of a private-key space among
//! concurrent search workers.
//!
//! Workers draw non-overlapping blocks of keys from the active [`KeyRange`],
//! derive every key's public identifier and compare it against the range's
//! targets. Completed blocks are journaled so that an interrupted search can
//! resume without re-scanning them, and the active range is rotated on a
//! timer.
//!
//! ```no_run
//! use keysweep::{CoordinatorBuilder, Secp256k1Deriver, load_ranges};
//!
//! let ranges = load_ranges("ranges.json")?;
//! let summary = CoordinatorBuilder::new(ranges, Secp256k1Deriver::default())
//!     .workers(4)
//!     .build()?
//!     .run()?;
//! println!("stopped: {}", summary.reason);
//! # Ok::<(), keysweep::SearchError>(())
//! ```

mod allocator;
mod builder;
mod coordinator;
mod derive;
mod error;
mod found;
mod interval;
mod journal;
mod range;
mod rotation;
mod search;
mod signal;

pub use {
    allocator::{Allocation, Block, BlockAllocator},
    builder::{
        CoordinatorBuilder,
        DEFAULT_BLOCK_SIZE,
        DEFAULT_JOURNAL_PATH,
        DEFAULT_REPORT_INTERVAL,
        DEFAULT_RESULT_PATH,
        DEFAULT_ROTATION_PERIOD,
    },
    coordinator::{Coordinator, RunSummary, StartMode},
    derive::{Deriver, IdentifierFormat, Secp256k1Deriver, to_wif},
    error::{SearchError, SearchResult},
    found::{FoundKey, ResultSink},
    interval::{Interval, IntervalTree},
    journal::{ProgressJournal, ProgressRecord, RECORD_LEN, Replay},
    range::{ActiveRange, KeyRange, TargetSet, load_ranges, parse_key},
    rotation::{RangeRotator, RotationController},
    search::{BlockOutcome, STOP_CHECK_INTERVAL, SearchStats, search_block},
    signal::{StopReason, StopSignal},
};

/// Private key, a 256-bit unsigned integer.
pub type Key = alloy_primitives::U256;

/// Public value derived from a private key, e.g. a hex-encoded public key.
pub type Identifier = String;
