//! In-memory cache of available addresses.
//!
//! An array-backed binary min-heap ordered by [`Address`]'s byte-wise `Ord`,
//! plus a membership set so that `push` is idempotent. Complexity: `push` and
//! `pop` are O(log n); `remove` is an O(n) scan followed by an O(log n) sift.
//!
//! The heap is a cache. It may lag the store, and the coordinator's
//! conditional transaction is what settles races.

use super::address::Address;
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Default)]
struct HeapInner {
    items: Vec<Address>,
    members: HashSet<Address>,
}

impl HeapInner {
    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.items[idx] >= self.items[parent] {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;
            if left < len && self.items[left] < self.items[smallest] {
                smallest = left;
            }
            if right < len && self.items[right] < self.items[smallest] {
                smallest = right;
            }
            if smallest == idx {
                return;
            }
            self.items.swap(idx, smallest);
            idx = smallest;
        }
    }

    /// Remove the element at `idx` and restore the heap property.
    fn remove_at(&mut self, idx: usize) -> Address {
        let removed = self.items.swap_remove(idx);
        if idx < self.items.len() {
            self.sift_down(idx);
            self.sift_up(idx);
        }
        self.members.remove(&removed);
        removed
    }
}

/// Thread-safe min-heap of available addresses.
#[derive(Debug, Default)]
pub struct AvailabilityHeap {
    inner: Mutex<HeapInner>,
}

impl AvailabilityHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a heap from an arbitrary list. Duplicates are dropped.
    pub fn from_addresses(addrs: impl IntoIterator<Item = Address>) -> Self {
        let mut inner = HeapInner::default();
        for addr in addrs {
            if inner.members.insert(addr) {
                inner.items.push(addr);
            }
        }
        for idx in (0..inner.items.len() / 2).rev() {
            inner.sift_down(idx);
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Insert an address. Returns false if it was already present.
    pub fn push(&self, addr: Address) -> bool {
        let mut inner = self.inner.lock();
        if !inner.members.insert(addr) {
            return false;
        }
        inner.items.push(addr);
        let last = inner.items.len() - 1;
        inner.sift_up(last);
        true
    }

    /// Remove and return the lowest address.
    pub fn pop(&self) -> Option<Address> {
        let mut inner = self.inner.lock();
        if inner.items.is_empty() {
            return None;
        }
        Some(inner.remove_at(0))
    }

    /// Remove a specific address. Returns whether it was present.
    pub fn remove(&self, addr: &Address) -> bool {
        let mut inner = self.inner.lock();
        if !inner.members.contains(addr) {
            return false;
        }
        match inner.items.iter().position(|a| a == addr) {
            Some(idx) => {
                inner.remove_at(idx);
                true
            }
            None => false,
        }
    }

    /// Lowest address without removing it.
    pub fn peek(&self) -> Option<Address> {
        self.inner.lock().items.first().copied()
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.inner.lock().members.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Copy of the contents in ascending order, for diagnostics.
    pub fn snapshot_sorted(&self) -> Vec<Address> {
        let mut items = self.inner.lock().items.clone();
        items.sort();
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn drain(heap: &AvailabilityHeap) -> Vec<Address> {
        std::iter::from_fn(|| heap.pop()).collect()
    }

    #[test]
    fn test_pop_returns_byte_order_minimum() {
        let heap = AvailabilityHeap::new();
        for a in ["10.0.0.10", "10.0.0.9", "10.0.0.100", "10.0.0.2"] {
            heap.push(addr(a));
        }
        assert_eq!(
            drain(&heap),
            vec![addr("10.0.0.2"), addr("10.0.0.9"), addr("10.0.0.10"), addr("10.0.0.100")]
        );
        assert_eq!(heap.pop(), None);
    }

    #[test]
    fn test_push_is_idempotent() {
        let heap = AvailabilityHeap::new();
        assert!(heap.push(addr("10.0.0.5")));
        assert!(!heap.push(addr("10.0.0.5")));
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.pop(), Some(addr("10.0.0.5")));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_remove() {
        let heap = AvailabilityHeap::from_addresses(
            ["10.0.0.5", "10.0.0.2", "10.0.0.9", "10.0.0.3", "10.0.0.7"].map(addr),
        );
        assert!(heap.remove(&addr("10.0.0.3")));
        assert!(!heap.remove(&addr("10.0.0.3")));
        assert!(!heap.remove(&addr("10.0.0.200")));
        assert!(!heap.contains(&addr("10.0.0.3")));
        assert_eq!(
            drain(&heap),
            vec![addr("10.0.0.2"), addr("10.0.0.5"), addr("10.0.0.7"), addr("10.0.0.9")]
        );
    }

    #[test]
    fn test_remove_then_push_again() {
        let heap = AvailabilityHeap::new();
        heap.push(addr("10.0.0.2"));
        heap.remove(&addr("10.0.0.2"));
        assert!(heap.push(addr("10.0.0.2")));
        assert_eq!(heap.peek(), Some(addr("10.0.0.2")));
    }

    #[test]
    fn test_from_addresses_drops_duplicates() {
        let heap =
            AvailabilityHeap::from_addresses(["10.0.0.5", "10.0.0.2", "10.0.0.5"].map(addr));
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.snapshot_sorted(), vec![addr("10.0.0.2"), addr("10.0.0.5")]);
    }

    #[test]
    fn test_heap_order_holds_under_mixed_operations() {
        let heap = AvailabilityHeap::new();
        let space = crate::pool::address::AddressSpace::parse("10.0.0.0/25").unwrap();
        let all: Vec<Address> = space.usable().collect();

        // Insert in a scrambled but deterministic order.
        for (i, _) in all.iter().enumerate() {
            heap.push(all[(i * 37) % all.len()]);
        }
        for a in all.iter().step_by(3) {
            assert!(heap.remove(a));
        }

        let expected: Vec<Address> = all
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 3 != 0)
            .map(|(_, a)| *a)
            .collect();
        assert_eq!(drain(&heap), expected);
    }

    #[test]
    fn test_ipv6_ordering() {
        let heap = AvailabilityHeap::from_addresses(["fd00::a", "fd00::9", "fd00::1:0"].map(addr));
        assert_eq!(drain(&heap), vec![addr("fd00::9"), addr("fd00::a"), addr("fd00::1:0")]);
    }
}
