use {
    crate::{Identifier, Key, SearchError, SearchResult, interval::Interval},
    arc_swap::ArcSwap,
    rapidhash::RapidBuildHasher,
    serde::Deserialize,
    std::{collections::HashSet, fs, path::Path, sync::Arc},
};

/// Identifiers a search window is looking for.
#[derive(Debug, Default)]
pub struct TargetSet(HashSet<Identifier, RapidBuildHasher>);

impl TargetSet {
    /// Parses a comma-delimited identifier list, e.g. `"04ab.., 04cd.."`.
    pub fn parse(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.0.iter()
    }
}

impl FromIterator<Identifier> for TargetSet {
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Search window together with the identifiers it is searched for.
#[derive(Debug)]
pub struct KeyRange {
    bounds: Interval,
    targets: TargetSet,
}

impl KeyRange {
    pub fn new(bounds: Interval, targets: TargetSet) -> Self {
        Self { bounds, targets }
    }

    /// Builds a range from raw bounds, rejecting `min > max`.
    pub fn try_new(min: Key, max: Key, targets: TargetSet) -> SearchResult<Self> {
        let bounds = Interval::new(min, max).ok_or(SearchError::InvertedRange { min, max })?;
        Ok(Self::new(bounds, targets))
    }

    pub fn bounds(&self) -> Interval {
        self.bounds
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }
}

/// Range that new block allocations currently draw from.
///
/// The whole range is swapped at once: a reader either sees the old range and
/// its targets or the new one, never a mix.
pub struct ActiveRange(ArcSwap<KeyRange>);

impl ActiveRange {
    pub fn new(initial: Arc<KeyRange>) -> Self {
        Self(ArcSwap::new(initial))
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<KeyRange> {
        self.0.load_full()
    }

    /// Publishes a new range, returning the previous one.
    pub fn swap(&self, next: Arc<KeyRange>) -> Arc<KeyRange> {
        self.0.swap(next)
    }
}

#[derive(Deserialize)]
struct RangesFile {
    ranges: Vec<RangeEntry>,
}

#[derive(Deserialize)]
struct RangeEntry {
    min: String,
    max: String,
    /// Comma-delimited target identifiers.
    status: String,
}

/// Parses a hex key, with or without a `0x` prefix.
pub fn parse_key(hex: &str) -> SearchResult<Key> {
    let digits = hex
        .trim()
        .strip_prefix("0x")
        .or_else(|| hex.trim().strip_prefix("0X"))
        .unwrap_or(hex.trim());
    if digits.is_empty() {
        return Err(SearchError::InvalidBound(hex.to_owned()));
    }
    Key::from_str_radix(digits, 16).map_err(|_| SearchError::InvalidBound(hex.to_owned()))
}

/// Loads key ranges from a JSON file of the form
/// `{"ranges": [{"min": "0x..", "max": "0x..", "status": "id1, id2"}]}`.
pub fn load_ranges<P: AsRef<Path>>(path: P) -> SearchResult<Vec<KeyRange>> {
    let file: RangesFile = serde_json::from_slice(&fs::read(path)?)?;
    let ranges = file
        .ranges
        .into_iter()
        .map(|entry| {
            KeyRange::try_new(
                parse_key(&entry.min)?,
                parse_key(&entry.max)?,
                TargetSet::parse(&entry.status),
            )
        })
        .collect::<SearchResult<Vec<_>>>()?;
    if ranges.is_empty() {
        return Err(SearchError::NoRanges);
    }
    Ok(ranges)
}
