use {
    keysweep::{
        CoordinatorBuilder,
        Deriver,
        IdentifierFormat,
        Key,
        KeyRange,
        ProgressJournal,
        RECORD_LEN,
        SearchError,
        Secp256k1Deriver,
        StartMode,
        StopReason,
        TargetSet,
        to_wif,
    },
    parking_lot::Mutex,
    std::{
        fs::{self, OpenOptions},
        io::Write,
        path::Path,
        thread,
        time::Duration,
    },
    tempfile::TempDir,
};

/// Identifier is the key in decimal; remembers every key it was asked for.
#[derive(Default)]
struct DecimalDeriver {
    derived: Mutex<Vec<Key>>,
}

impl DecimalDeriver {
    fn derived(&self) -> Vec<Key> {
        self.derived.lock().clone()
    }
}

impl Deriver for DecimalDeriver {
    fn derive(&self, key: &Key) -> Option<String> {
        self.derived.lock().push(*key);
        Some(key.to_string())
    }
}

fn range(min: u64, max: u64, targets: &str) -> KeyRange {
    KeyRange::try_new(Key::from(min), Key::from(max), TargetSet::parse(targets)).unwrap()
}

fn builder<D: Deriver>(dir: &TempDir, ranges: Vec<KeyRange>, deriver: D) -> CoordinatorBuilder<D> {
    CoordinatorBuilder::new(ranges, deriver)
        .journal_path(dir.path().join("progress.dat"))
        .result_path(dir.path().join("found_keys.txt"))
        .report_interval(Duration::ZERO)
        .seed(42)
}

/// Writes a journal of the given `[min, max]` blocks.
fn write_journal(path: &Path, blocks: &[(u64, u64)]) {
    let journal = ProgressJournal::fresh(path).unwrap();
    for &(min, max) in blocks {
        let block = keysweep::Block::new(Key::from(min), Key::from(max)).unwrap();
        journal.append(block).unwrap();
    }
}

/// Sequence numbers in file order.
fn sequences(path: &Path) -> Vec<u64> {
    let replay = ProgressJournal::read_all(path).unwrap();
    assert_eq!(replay.discarded, 0);
    replay.records.iter().map(|r| r.sequence).collect()
}

fn assert_tiles(path: &Path, min: u64, max: u64) {
    let replay = ProgressJournal::read_all(path).unwrap();
    let mut blocks: Vec<_> = replay.records.iter().map(|r| r.block).collect();
    blocks.sort_by_key(|b| b.min());
    assert_eq!(blocks.first().unwrap().min(), Key::from(min));
    assert_eq!(blocks.last().unwrap().max(), Key::from(max));
    for pair in blocks.windows(2) {
        assert_eq!(pair[0].max() + Key::from(1u64), pair[1].min(), "{} {}", pair[0], pair[1]);
    }
}

#[test]
fn finds_key_in_small_range() {
    let dir = tempfile::tempdir().unwrap();
    let deriver = DecimalDeriver::default();
    let summary = builder(&dir, vec![range(0, 999, "42")], &deriver)
        .workers(1)
        .block_size(100)
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.reason, StopReason::Found);
    let found = summary.found.unwrap();
    assert_eq!(found.private_key, Key::from(42u64));
    assert_eq!(found.identifier, "42");
    assert!(deriver.derived().len() < 1_000);

    let contents = fs::read_to_string(dir.path().join("found_keys.txt")).unwrap();
    assert!(contents.starts_with(&format!("Private key: {:0>64}\n", "2a")));
    assert!(contents.contains("Public identifier: 42\n"));
    assert_eq!(contents.matches("Private key:").count(), 1);

    // The block holding the match is never journaled.
    let replay = ProgressJournal::read_all(dir.path().join("progress.dat")).unwrap();
    assert!(replay.records.iter().all(|r| !r.block.contains(Key::from(42u64))));
}

#[test]
fn finds_secp256k1_key() {
    let dir = tempfile::tempdir().unwrap();
    let deriver = Secp256k1Deriver::new(IdentifierFormat::P2pkh);
    let target = deriver.derive(&Key::from(42u64)).unwrap();

    let summary = builder(&dir, vec![range(0, 499, &target)], deriver)
        .workers(2)
        .block_size(50)
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.reason, StopReason::Found);
    let found = summary.found.unwrap();
    assert_eq!(found.private_key, Key::from(42u64));
    assert_eq!(found.identifier, target);
    assert_eq!(found.wallet_import, Some(to_wif(&Key::from(42u64))));

    let contents = fs::read_to_string(dir.path().join("found_keys.txt")).unwrap();
    assert!(contents.contains(&format!("WIF: {}\n", to_wif(&Key::from(42u64)))));
}

#[test]
fn exhaustive_run_journals_every_block() {
    let dir = tempfile::tempdir().unwrap();
    let deriver = DecimalDeriver::default();
    let summary = builder(&dir, vec![range(0, 99, "")], &deriver)
        .workers(4)
        .block_size(10)
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.reason, StopReason::Exhausted);
    assert!(summary.found.is_none());
    assert_eq!(summary.keys_checked, 100);
    assert_eq!(summary.blocks_completed, 10);
    assert_eq!(summary.resumed_blocks, 0);

    let mut derived = deriver.derived();
    derived.sort();
    assert_eq!(derived, (0..100u64).map(Key::from).collect::<Vec<_>>());

    let journal = dir.path().join("progress.dat");
    assert_eq!(sequences(&journal), (1..=10).collect::<Vec<_>>());
    let replay = ProgressJournal::read_all(&journal).unwrap();
    assert!(replay.records.iter().all(|r| r.block.len() == Key::from(10u64)));
    assert_tiles(&journal, 0, 99);
}

#[test]
fn many_workers_number_records_in_file_order() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("progress.dat");
    for round in 0..2 {
        let summary = builder(&dir, vec![range(0, 999, "")], DecimalDeriver::default())
            .workers(8)
            .block_size(1)
            .start_mode(StartMode::Fresh)
            .seed(round)
            .build()
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(summary.blocks_completed, 1_000);
        assert_eq!(sequences(&journal), (1..=1_000).collect::<Vec<_>>());
        let (journal, replay) = ProgressJournal::resume(&journal).unwrap();
        assert_eq!(replay.last_sequence(), 1_000);
        assert_eq!(journal.sequence(), 1_000);
    }
}

#[test]
fn resume_skips_journaled_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("progress.dat");
    write_journal(&journal, &[(0, 9), (10, 19), (20, 29), (30, 39), (40, 49)]);

    let deriver = DecimalDeriver::default();
    let summary = builder(&dir, vec![range(0, 99, "")], &deriver)
        .workers(2)
        .block_size(10)
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.reason, StopReason::Exhausted);
    assert_eq!(summary.resumed_blocks, 5);
    assert_eq!(summary.blocks_completed, 10);
    assert_eq!(summary.keys_checked, 50);
    assert!(deriver.derived().iter().all(|key| *key >= Key::from(50u64)));

    assert_eq!(sequences(&journal), (1..=10).collect::<Vec<_>>());
    assert_tiles(&journal, 0, 99);
}

#[test]
fn resume_truncates_partial_record() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("progress.dat");
    write_journal(&journal, &[(0, 9), (10, 19), (20, 29)]);
    OpenOptions::new()
        .append(true)
        .open(&journal)
        .unwrap()
        .write_all(&[0xab; 17])
        .unwrap();

    let summary = builder(&dir, vec![range(0, 99, "")], DecimalDeriver::default())
        .workers(1)
        .block_size(10)
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.resumed_blocks, 3);
    assert_eq!(summary.keys_checked, 70);
    assert_eq!(summary.blocks_completed, 10);
    assert_eq!(fs::metadata(&journal).unwrap().len(), (10 * RECORD_LEN) as u64);
    assert_eq!(sequences(&journal), (1..=10).collect::<Vec<_>>());
    assert_tiles(&journal, 0, 99);
}

#[test]
fn resume_ignores_zero_filled_tail() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("progress.dat");
    write_journal(&journal, &[(10, 19), (20, 29), (30, 39)]);
    OpenOptions::new()
        .append(true)
        .open(&journal)
        .unwrap()
        .write_all(&[0; RECORD_LEN])
        .unwrap();

    let deriver = DecimalDeriver::default();
    let summary = builder(&dir, vec![range(0, 99, "")], &deriver)
        .workers(1)
        .block_size(10)
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.resumed_blocks, 3);
    assert_eq!(summary.keys_checked, 70);
    // Key 0 was not taken for a journaled block.
    assert!(deriver.derived().contains(&Key::ZERO));
    assert_eq!(sequences(&journal), (1..=10).collect::<Vec<_>>());
    assert_tiles(&journal, 0, 99);
}

#[test]
fn fresh_start_discards_journal() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("progress.dat");
    write_journal(&journal, &[(0, 49)]);

    let summary = builder(&dir, vec![range(0, 99, "")], DecimalDeriver::default())
        .workers(2)
        .block_size(10)
        .start_mode(StartMode::Fresh)
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.resumed_blocks, 0);
    assert_eq!(summary.keys_checked, 100);
    assert_eq!(sequences(&journal), (1..=10).collect::<Vec<_>>());
}

#[test]
fn fully_journaled_ranges_finish_at_once() {
    let dir = tempfile::tempdir().unwrap();
    write_journal(&dir.path().join("progress.dat"), &[(0, 99)]);

    let deriver = DecimalDeriver::default();
    let summary = builder(&dir, vec![range(0, 99, "5")], &deriver)
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.reason, StopReason::Exhausted);
    assert_eq!(summary.keys_checked, 0);
    assert_eq!(summary.blocks_completed, 1);
    assert!(deriver.derived().is_empty());
}

#[test]
fn rotates_into_range_holding_the_target() {
    let dir = tempfile::tempdir().unwrap();
    let summary = builder(
        &dir,
        vec![range(0, 99, ""), range(1_000, 1_099, "1050")],
        DecimalDeriver::default(),
    )
    .workers(1)
    .block_size(10)
    .rotation_period(Duration::from_millis(10))
    .build()
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(summary.reason, StopReason::Found);
    assert_eq!(summary.found.unwrap().private_key, Key::from(1_050u64));
}

#[test]
fn external_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let wide = KeyRange::try_new(Key::ZERO, Key::from(1u64) << 200usize, TargetSet::parse("x"))
        .unwrap();
    let coordinator = builder(&dir, vec![wide], DecimalDeriver::default())
        .workers(2)
        .block_size(1_000)
        .build()
        .unwrap();
    let stop = coordinator.stop_signal();

    let summary = thread::scope(|s| {
        let run = s.spawn(|| coordinator.run());
        thread::sleep(Duration::from_millis(50));
        assert!(stop.trigger(StopReason::Shutdown));
        run.join().unwrap().unwrap()
    });

    assert_eq!(summary.reason, StopReason::Shutdown);
    assert!(summary.found.is_none());
    assert!(!dir.path().join("found_keys.txt").exists());

    // Every journaled block was searched completely.
    let replay = ProgressJournal::read_all(dir.path().join("progress.dat")).unwrap();
    assert_eq!(replay.records.len() as u64, summary.blocks_completed);
    assert!(summary.keys_checked >= summary.blocks_completed * 1_000);
}

#[test]
fn stopped_before_run() {
    let dir = tempfile::tempdir().unwrap();
    let deriver = DecimalDeriver::default();
    let coordinator = builder(&dir, vec![range(0, 99, "")], &deriver)
        .build()
        .unwrap();
    coordinator.stop_signal().trigger(StopReason::Shutdown);

    let summary = coordinator.run().unwrap();
    assert_eq!(summary.reason, StopReason::Shutdown);
    assert_eq!(summary.keys_checked, 0);
    assert!(deriver.derived().is_empty());
}

#[test]
fn invalid_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let build = |ranges: Vec<KeyRange>| builder(&dir, ranges, DecimalDeriver::default());

    assert!(matches!(build(vec![]).build(), Err(SearchError::NoRanges)));
    assert!(matches!(
        build(vec![range(0, 9, "")]).workers(0).build(),
        Err(SearchError::ZeroWorkers)
    ));
    assert!(matches!(
        build(vec![range(0, 9, "")]).block_size(0).build(),
        Err(SearchError::ZeroBlockSize)
    ));
    assert!(matches!(
        build(vec![range(0, 9, "")])
            .rotation_period(Duration::ZERO)
            .build(),
        Err(SearchError::ZeroRotationPeriod)
    ));
    assert!(build(vec![range(0, 9, "")]).build().is_ok());
}
