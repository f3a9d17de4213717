use {
    crate::{Key, SearchResult, allocator::Block},
    parking_lot::Mutex,
    std::{
        fs::{self, File, OpenOptions},
        io::{self, Write},
        path::{Path, PathBuf},
        sync::atomic::{AtomicU32, Ordering},
    },
    tracing::{debug, error, info, warn},
};

/// Size of one encoded record: two 32-byte big-endian bounds and a 8-byte
/// big-endian sequence number.
pub const RECORD_LEN: usize = 32 + 32 + 8;

/// Consecutive append failures after which they are reported as errors.
const FAILURE_ESCALATION: u32 = 3;

/// One completed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressRecord {
    pub block: Block,

    /// Position of the record in the journal, starting at 1.
    pub sequence: u64,
}

impl ProgressRecord {
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[..32].copy_from_slice(&self.block.min().to_be_bytes::<32>());
        buf[32..64].copy_from_slice(&self.block.max().to_be_bytes::<32>());
        buf[64..].copy_from_slice(&self.sequence.to_be_bytes());
        buf
    }

    /// Decodes a record; `None` if the bounds are inverted or the sequence
    /// is zero (e.g. a zero-filled tail).
    pub fn decode(buf: &[u8; RECORD_LEN]) -> Option<Self> {
        let min = Key::from_be_slice(&buf[..32]);
        let max = Key::from_be_slice(&buf[32..64]);
        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&buf[64..]);
        let sequence = u64::from_be_bytes(sequence);
        if sequence == 0 {
            return None;
        }
        Some(Self {
            block: Block::new(min, max)?,
            sequence,
        })
    }
}

/// Records recovered from a journal file.
#[derive(Debug, Default)]
pub struct Replay {
    pub records: Vec<ProgressRecord>,

    /// Trailing bytes after the last well-formed record.
    pub discarded: u64,
}

impl Replay {
    /// Sequence number of the last record, 0 for an empty journal.
    ///
    /// Sequences run 1, 2, 3... in file order, so this is also the number of
    /// records.
    pub fn last_sequence(&self) -> u64 {
        self.records.last().map_or(0, |r| r.sequence)
    }

    /// Length of the well-formed prefix of the file.
    fn valid_len(&self) -> u64 {
        (self.records.len() * RECORD_LEN) as u64
    }
}

/// Open journal file together with what has been durably written to it.
struct Tail {
    file: File,
    /// Length of the well-formed prefix.
    len: u64,
    /// Sequence of the last record written.
    sequence: u64,
}

impl Tail {
    /// Writes the next record, leaving the file as it was on failure.
    fn push(&mut self, block: Block) -> io::Result<u64> {
        // A failed write may have left a partial record behind.
        if self.file.metadata()?.len() != self.len {
            self.file.set_len(self.len)?;
        }

        let sequence = self.sequence + 1;
        let record = ProgressRecord { block, sequence }.encode();
        if let Err(e) = self.write_synced(&record) {
            if let Err(truncate) = self.file.set_len(self.len) {
                debug!("failed to cut partial record: {truncate}");
            }
            return Err(e);
        }

        self.len += RECORD_LEN as u64;
        self.sequence = sequence;
        Ok(sequence)
    }

    fn write_synced(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        self.file.sync_data()
    }
}

/// Append-only log of completed blocks.
///
/// Appends from all workers go through one mutex, which also hands out the
/// sequence numbers: records in the file are numbered 1, 2, 3... in order.
/// Each append is synced to disk before returning.
pub struct ProgressJournal {
    path: PathBuf,
    tail: Mutex<Tail>,
    failures: AtomicU32,
}

impl ProgressJournal {
    /// Discards any existing journal at `path` and starts an empty one.
    pub fn fresh<P: AsRef<Path>>(path: P) -> SearchResult<Self> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "discarded previous journal"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Self::open(path, &Replay::default())
    }

    /// Replays the journal at `path` and reopens it for appending.
    ///
    /// A partial or malformed tail is cut off so that new records line up
    /// with the existing ones and continue their numbering.
    pub fn resume<P: AsRef<Path>>(path: P) -> SearchResult<(Self, Replay)> {
        let path = path.as_ref();
        let replay = Self::read_all(path)?;
        if replay.discarded > 0 {
            warn!(
                path = %path.display(),
                discarded = replay.discarded,
                "truncating journal after last complete record"
            );
            OpenOptions::new()
                .write(true)
                .open(path)?
                .set_len(replay.valid_len())?;
        }
        info!(
            path = %path.display(),
            records = replay.records.len(),
            sequence = replay.last_sequence(),
            "replayed journal"
        );
        Ok((Self::open(path, &replay)?, replay))
    }

    /// Reads every well-formed record of the journal at `path`.
    ///
    /// Replay stops at the first incomplete or malformed record, which is what
    /// a crash during the last write leaves behind. A record whose sequence
    /// does not follow its predecessor's counts as malformed. A missing file
    /// is an empty journal.
    pub fn read_all<P: AsRef<Path>>(path: P) -> SearchResult<Replay> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e.into()),
        };

        let mut replay = Replay::default();
        for chunk in bytes.chunks(RECORD_LEN) {
            let record = <&[u8; RECORD_LEN]>::try_from(chunk)
                .ok()
                .and_then(ProgressRecord::decode)
                .filter(|record| record.sequence == replay.last_sequence() + 1);
            match record {
                Some(record) => replay.records.push(record),
                None => break,
            }
        }
        replay.discarded = bytes.len() as u64 - replay.valid_len();
        Ok(replay)
    }

    fn open(path: &Path, replay: &Replay) -> SearchResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            tail: Mutex::new(Tail {
                file,
                len: replay.valid_len(),
                sequence: replay.last_sequence(),
            }),
            failures: AtomicU32::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence of the last record written, 0 for an empty journal.
    pub fn sequence(&self) -> u64 {
        self.tail.lock().sequence
    }

    /// Durably appends one record, returning its sequence number.
    ///
    /// On failure nothing of the record stays in the file and the sequence
    /// number is not used up.
    pub fn append(&self, block: Block) -> io::Result<u64> {
        self.tail.lock().push(block)
    }

    /// Appends a record, logging instead of failing.
    ///
    /// A lost checkpoint costs a re-scan after resume, never the run itself.
    pub fn checkpoint(&self, block: Block) -> Option<u64> {
        match self.append(block) {
            Ok(sequence) => {
                self.failures.store(0, Ordering::Relaxed);
                debug!(%block, sequence, "journaled block");
                Some(sequence)
            }
            Err(e) => {
                let streak = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if streak >= FAILURE_ESCALATION {
                    error!(
                        path = %self.path.display(),
                        streak,
                        "journal appends keep failing: {e}"
                    );
                } else {
                    warn!(path = %self.path.display(), %block, "failed to journal block: {e}");
                }
                None
            }
        }
    }

    /// Consecutive failed appends.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Swaps the file handle for a read-only one, so every write fails.
    #[cfg(test)]
    pub(crate) fn make_read_only(&self) {
        let file = File::open(&self.path).expect("journal file exists");
        self.tail.lock().file = file;
    }

    /// Reopens the file for appending after [`make_read_only`].
    ///
    /// [`make_read_only`]: Self::make_read_only
    #[cfg(test)]
    pub(crate) fn make_writable(&self) {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .expect("journal file exists");
        self.tail.lock().file = file;
    }
}
