use {crate::Key, std::fmt};

/// An inclusive interval of keys, i.e. `[min..=max]`.
///
/// Used both for blocks handed out to workers and for the bounds of a search
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    min: Key,
    max: Key,
}

impl Interval {
    /// Creates a new interval, `None` if `min > max`.
    pub fn new(min: Key, max: Key) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    /// Single key interval.
    pub fn point(key: Key) -> Self {
        Self { min: key, max: key }
    }

    pub fn min(&self) -> Key {
        self.min
    }

    pub fn max(&self) -> Key {
        self.max
    }

    /// Number of keys in the interval.
    ///
    /// Saturates at `Key::MAX` for the full keyspace, which holds one key more
    /// than can be represented.
    pub fn len(&self) -> Key {
        (self.max - self.min).saturating_add(Key::from(1u64))
    }

    /// Check if the given key is in the interval.
    pub fn contains(&self, key: Key) -> bool {
        key >= self.min && key <= self.max
    }

    /// Check if `[min..=max]` shares at least one key with the interval.
    pub fn intersects(&self, min: Key, max: Key) -> bool {
        min <= self.max && max >= self.min
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:x}..={:x}]", self.min, self.max)
    }
}

struct TreeNode {
    interval: Interval,
    /// Largest `max` over the subtree rooted at this node.
    max_end: Key,
    left: Option<Box<TreeNode>>,
    right: Option<Box<TreeNode>>,
}

impl TreeNode {
    fn new(interval: Interval) -> Self {
        Self {
            interval,
            max_end: interval.max,
            left: None,
            right: None,
        }
    }
}

/// Augmented interval tree of occupied key intervals.
///
/// Nodes are ordered by interval `min` (ties go right) and carry the largest
/// endpoint of their subtree, which lets overlap queries follow a single path
/// from the root. The tree is never rebalanced and intervals are never
/// removed: it only grows for the lifetime of a run.
#[derive(Default)]
pub struct IntervalTree {
    root: Option<Box<TreeNode>>,
    len: usize,
}

impl IntervalTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored intervals.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Adds an occupied interval.
    ///
    /// Every node on the descent path gets its `max_end` raised to cover the
    /// new interval.
    pub fn insert(&mut self, interval: Interval) {
        let mut slot = &mut self.root;
        while let Some(node) = slot {
            if node.max_end < interval.max {
                node.max_end = interval.max;
            }
            slot = if interval.min < node.interval.min {
                &mut node.left
            } else {
                &mut node.right
            };
        }
        *slot = Some(Box::new(TreeNode::new(interval)));
        self.len += 1;
    }

    /// Returns `true` if any stored interval intersects `[min..=max]`.
    pub fn overlaps(&self, min: Key, max: Key) -> bool {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            if node.interval.intersects(min, max) {
                return true;
            }
            // If the left subtree reaches `min` and holds no match, no interval
            // on the right can match either: their mins are even larger.
            current = match node.left.as_deref() {
                Some(left) if left.max_end >= min => Some(left),
                _ => node.right.as_deref(),
            };
        }
        false
    }

    /// In-order iterator, i.e. intervals sorted by `min`.
    pub fn iter(&self) -> Iter<'_> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left(self.root.as_deref());
        iter
    }

    /// Free sub-intervals of `window`, in ascending order.
    pub fn gaps(&self, window: Interval) -> Vec<Interval> {
        let mut gaps = Vec::new();
        let mut cursor = window.min;
        for occupied in self.iter() {
            if occupied.min > window.max {
                break;
            }
            if occupied.max < cursor {
                continue;
            }
            if occupied.min > cursor {
                gaps.push(Interval {
                    min: cursor,
                    max: occupied.min - Key::from(1u64),
                });
            }
            match occupied.max.checked_add(Key::from(1u64)) {
                Some(next) if next <= window.max => cursor = cursor.max(next),
                _ => return gaps,
            }
        }
        gaps.push(Interval {
            min: cursor,
            max: window.max,
        });
        gaps
    }

    /// Returns `true` if stored intervals leave no free key in `window`.
    pub fn covers(&self, window: Interval) -> bool {
        self.gaps(window).is_empty()
    }
}

impl Drop for IntervalTree {
    fn drop(&mut self) {
        // Unbalanced trees can be as deep as they are long; unlink nodes one
        // by one instead of letting `Box` drop recurse.
        let mut stack: Vec<Box<TreeNode>> = self.root.take().into_iter().collect();
        while let Some(mut node) = stack.pop() {
            stack.extend(node.left.take());
            stack.extend(node.right.take());
        }
    }
}

impl FromIterator<Interval> for IntervalTree {
    fn from_iter<I: IntoIterator<Item = Interval>>(iter: I) -> Self {
        let mut tree = Self::new();
        iter.into_iter().for_each(|interval| tree.insert(interval));
        tree
    }
}

/// In-order iterator over the intervals of an [`IntervalTree`].
pub struct Iter<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iter<'a> {
    fn push_left(&mut self, mut node: Option<&'a TreeNode>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = n.left.as_deref();
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Interval;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        Some(&node.interval)
    }
}
