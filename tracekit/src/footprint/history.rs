//! Fixed-capacity local history rings
//!
//! Each static instruction keeps a short window of its recent behavior:
//! address strides for loads/stores, taken/not-taken outcomes for branches.
//! Both rings overwrite their oldest slot once full, so the (k+N)-th push
//! replaces the k-th and memory per entry never grows.

/// Number of recent strides / branch outcomes kept per instruction
pub const LOCAL_HISTORY_LEN: usize = 50;

// The branch ring packs outcomes into a single u64
const _: () = assert!(LOCAL_HISTORY_LEN <= 64);

// =============================================================================
// GENERIC RING
// =============================================================================

/// Ring of the last `N` values pushed
#[derive(Debug, Clone)]
pub struct HistoryRing<T, const N: usize> {
    slots: [T; N],
    /// Slot the next push writes
    cursor: usize,
    len: usize,
}

impl<T: Copy + Default, const N: usize> Default for HistoryRing<T, N> {
    fn default() -> Self {
        Self { slots: [T::default(); N], cursor: 0, len: 0 }
    }
}

impl<T: Copy + Default, const N: usize> HistoryRing<T, N> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: T) {
        self.slots[self.cursor] = value;
        self.cursor = (self.cursor + 1) % N;
        self.len = (self.len + 1).min(N);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Values from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let start = if self.len < N { 0 } else { self.cursor };
        (0..self.len).map(move |i| self.slots[(start + i) % N])
    }
}

/// Recent address strides of a load/store
pub type StrideRing = HistoryRing<i64, LOCAL_HISTORY_LEN>;

// =============================================================================
// BRANCH OUTCOME RING
// =============================================================================

/// Circular bitset of the last [`LOCAL_HISTORY_LEN`] branch outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchHistory {
    bits: u64,
    cursor: u32,
    len: u32,
}

impl BranchHistory {
    const CAPACITY: u32 = LOCAL_HISTORY_LEN as u32;

    pub fn push(&mut self, taken: bool) {
        let mask = 1u64 << self.cursor;
        if taken {
            self.bits |= mask;
        } else {
            self.bits &= !mask;
        }
        self.cursor = (self.cursor + 1) % Self::CAPACITY;
        self.len = (self.len + 1).min(Self::CAPACITY);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Outcomes from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        let start = if self.len < Self::CAPACITY { 0 } else { self.cursor };
        (0..self.len).map(move |i| self.bits & (1u64 << ((start + i) % Self::CAPACITY)) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_insertion_order_before_wrap() {
        let mut ring = StrideRing::new();
        ring.push(4);
        ring.push(-8);
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![4, -8]);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_ring_overwrites_oldest_after_capacity() {
        let mut ring = StrideRing::new();
        for value in 0..53 {
            ring.push(value);
        }

        assert_eq!(ring.len(), LOCAL_HISTORY_LEN);
        let expected: Vec<i64> = (3..53).collect();
        assert_eq!(ring.iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_ring_exactly_full() {
        let mut ring = HistoryRing::<u8, 3>::new();
        for value in [1, 2, 3] {
            ring.push(value);
        }
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        ring.push(4);
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_branch_history_wraps() {
        let mut history = BranchHistory::default();
        // 53 pushes: the first three are taken, everything after is not taken
        for i in 0..53 {
            history.push(i < 3);
        }
        assert_eq!(history.len(), LOCAL_HISTORY_LEN);
        assert!(history.iter().all(|taken| !taken), "the three taken outcomes were overwritten");

        history.push(true);
        assert_eq!(history.iter().last(), Some(true));
        assert_eq!(history.iter().filter(|&t| t).count(), 1);
    }

    #[test]
    fn test_branch_history_overwrites_in_circular_order() {
        let mut history = BranchHistory::default();
        let pattern: Vec<bool> = (0..53).map(|i| i % 3 == 0).collect();
        for &taken in &pattern {
            history.push(taken);
        }
        assert_eq!(history.iter().collect::<Vec<_>>(), pattern[3..].to_vec());
    }
}
