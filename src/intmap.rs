//! `IntMap` — an open-addressing hash table specialized for dense,
//! caller-hashed `u64` keys.
//!
//! The table stores entries inline in a single backing array (parallel
//! key/value layout: one `Vec<Entry<V>>`, chosen over struct-of-arrays
//! because probing mostly touches the key field, and keeping `(key, val)`
//! adjacent keeps both on the same cache line for the common case where the
//! entry is found on the first probe). The key `0` can never appear as a
//! live entry in that array — it is the in-band sentinel for "empty slot" —
//! so it is shadowed by two side fields, `has_zero`/`zero_val`, and handled
//! before any probing happens. This buys single-compare emptiness checks
//! without a parallel occupancy bitmap.
//!
//! Deletion uses backward-shift (Robin-Hood-style) relocation rather than
//! tombstones: `Get` and `Put` terminate a probe sequence the moment they
//! see an empty slot, so every entry in a cluster must stay reachable from
//! its own ideal index after a deletion, without leaving a "hole" that a
//! later tombstone-sweep would need to clean up.

use std::mem;

const DEFAULT_CAPACITY: usize = 8;
const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

#[derive(Clone, Copy)]
struct Entry<V> {
    key: u64,
    val: V,
}

impl<V: Copy + Default> Entry<V> {
    fn empty() -> Self {
        Entry { key: 0, val: V::default() }
    }
}

/// Diffuses a key's bits before masking it into a table index.
///
/// Callers are expected to already hand in well-distributed 64-bit hashes,
/// but a cheap multiply-shift finalizer (the splitmix64 finalizer) is
/// applied regardless so that pathological inputs — e.g. small sequential
/// keys, which dense-fill workloads use heavily — don't all land in the
/// low bits of the table and build one long cluster.
#[inline]
fn mix(mut k: u64) -> u64 {
    k ^= k >> 30;
    k = k.wrapping_mul(0xbf58476d1ce4e5b9);
    k ^= k >> 27;
    k = k.wrapping_mul(0x94d049bb133111eb);
    k ^= k >> 31;
    k
}

/// Open-addressing `u64 -> V` table. See the module docs for the design.
pub struct IntMap<V> {
    entries: Vec<Entry<V>>,
    mask: u64,
    size: usize,
    has_zero: bool,
    zero_val: V,
}

impl<V: Copy + Default> IntMap<V> {
    /// Creates a table with at least `capacity` slots, rounded up to the
    /// next power of two (minimum 8).
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(DEFAULT_CAPACITY).next_power_of_two();
        Self {
            entries: vec![Entry::empty(); cap],
            mask: (cap - 1) as u64,
            size: 0,
            has_zero: false,
            zero_val: V::default(),
        }
    }

    /// Number of live entries, including the zero-key shadow if set.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Current backing array length (always a power of two).
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    fn probe_start(&self, key: u64) -> usize {
        (mix(key) & self.mask) as usize
    }

    #[inline]
    fn next_index(&self, idx: usize) -> usize {
        ((idx as u64 + 1) & self.mask) as usize
    }

    /// Inserts or overwrites `key -> val`. Returns the previous value, if
    /// any.
    pub fn put(&mut self, key: u64, val: V) -> Option<V> {
        if key == 0 {
            let prev = if self.has_zero { Some(self.zero_val) } else { None };
            self.has_zero = true;
            self.zero_val = val;
            if prev.is_none() {
                self.size += 1;
            }
            return prev;
        }

        let mut idx = self.probe_start(key);
        loop {
            let slot_key = self.entries[idx].key;
            if slot_key == key {
                let prev = self.entries[idx].val;
                self.entries[idx].val = val;
                return Some(prev);
            }
            if slot_key == 0 {
                self.entries[idx] = Entry { key, val };
                self.size += 1;
                if self.size * MAX_LOAD_DEN >= self.entries.len() * MAX_LOAD_NUM {
                    self.grow();
                }
                return None;
            }
            idx = self.next_index(idx);
        }
    }

    /// Looks up `key`, returning `(value, true)` if present or
    /// `(V::default(), false)` otherwise.
    pub fn get(&self, key: u64) -> (V, bool) {
        if key == 0 {
            return if self.has_zero { (self.zero_val, true) } else { (V::default(), false) };
        }

        let mut idx = self.probe_start(key);
        loop {
            let entry = &self.entries[idx];
            if entry.key == key {
                return (entry.val, true);
            }
            if entry.key == 0 {
                return (V::default(), false);
            }
            idx = self.next_index(idx);
        }
    }

    pub fn contains_key(&self, key: u64) -> bool {
        self.get(key).1
    }

    /// Removes `key`, returning `(old_value, true)` if it was present or
    /// `(V::default(), false)` otherwise. Relocates the remainder of the
    /// probe cluster backward so later `Get`s still terminate correctly.
    pub fn delete(&mut self, key: u64) -> (V, bool) {
        if key == 0 {
            if self.has_zero {
                self.has_zero = false;
                self.size -= 1;
                return (mem::replace(&mut self.zero_val, V::default()), true);
            }
            return (V::default(), false);
        }

        let mut idx = self.probe_start(key);
        loop {
            let slot_key = self.entries[idx].key;
            if slot_key == 0 {
                return (V::default(), false);
            }
            if slot_key == key {
                break;
            }
            idx = self.next_index(idx);
        }

        let removed = self.entries[idx].val;
        self.entries[idx] = Entry::empty();
        self.size -= 1;
        self.backward_shift_from(idx);
        (removed, true)
    }

    /// Backward-shift deletion: walk the cluster following the freshly
    /// emptied slot and pull back any entry whose ideal index no longer
    /// requires it to sit after the gap.
    fn backward_shift_from(&mut self, mut empty: usize) {
        let mut j = self.next_index(empty);
        loop {
            let key_j = self.entries[j].key;
            if key_j == 0 {
                break;
            }

            let ideal = (mix(key_j) & self.mask) as usize;
            let should_move = if empty <= j {
                ideal <= empty || ideal > j
            } else {
                ideal <= empty && ideal > j
            };

            if should_move {
                self.entries[empty] = self.entries[j];
                self.entries[j] = Entry::empty();
                empty = j;
            }

            j = self.next_index(j);
        }
    }

    /// Doubles the backing array and reinserts every live entry at its
    /// newly masked index. The zero-key shadow is untouched (it never
    /// lives in the array).
    fn grow(&mut self) {
        let new_cap = self.entries.len() * 2;
        let old = mem::replace(&mut self.entries, vec![Entry::empty(); new_cap]);
        self.mask = (new_cap - 1) as u64;

        for entry in old {
            if entry.key == 0 {
                continue;
            }
            let mut idx = self.probe_start(entry.key);
            while self.entries[idx].key != 0 {
                idx = self.next_index(idx);
            }
            self.entries[idx] = entry;
        }
    }

    /// Removes every entry, keeping the current capacity.
    pub fn clear(&mut self) {
        for e in self.entries.iter_mut() {
            *e = Entry::empty();
        }
        self.has_zero = false;
        self.zero_val = V::default();
        self.size = 0;
    }

    /// Visits every live key/value pair. No iteration order is guaranteed.
    pub fn for_each<F: FnMut(u64, V)>(&self, mut f: F) {
        if self.has_zero {
            f(0, self.zero_val);
        }
        for entry in &self.entries {
            if entry.key != 0 {
                f(entry.key, entry.val);
            }
        }
    }

    /// Visits up to `max_visits` consecutive backing-array slots (live or
    /// empty) starting at `start`, wrapping around the table, and returns
    /// the index to resume from on the next call.
    ///
    /// This lets a caller (the expiration sweeper) bound the cost of a
    /// single wake-up while still guaranteeing every slot is visited again
    /// within a bounded number of wakes, since the cursor only ever moves
    /// forward through a fixed-size ring. The zero-key shadow is not part
    /// of the backing array and is not visited here; callers that need to
    /// consider it should check it separately via [`IntMap::get`].
    pub fn scan_chunk<F: FnMut(u64, V)>(&self, start: usize, max_visits: usize, mut f: F) -> usize {
        let cap = self.entries.len();
        if cap == 0 {
            return 0;
        }
        let mut idx = start % cap;
        for _ in 0..max_visits.min(cap) {
            let entry = &self.entries[idx];
            if entry.key != 0 {
                f(entry.key, entry.val);
            }
            idx = (idx + 1) % cap;
        }
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let mut m: IntMap<u32> = IntMap::new(16);
        m.put(42, 7);
        assert_eq!(m.get(42), (7, true));
        assert_eq!(m.get(43), (0, false));
    }

    #[test]
    fn test_zero_key_shadow_roundtrip() {
        let mut m: IntMap<u32> = IntMap::new(16);
        assert_eq!(m.get(0), (0, false));
        m.put(0, 99);
        assert_eq!(m.get(0), (99, true));
        assert_eq!(m.len(), 1);
        let (old, hit) = m.delete(0);
        assert_eq!((old, hit), (99, true));
        assert_eq!(m.get(0), (0, false));
        assert_eq!(m.delete(0), (0, false));
    }

    #[test]
    fn test_overwrite_does_not_grow_size() {
        let mut m: IntMap<u32> = IntMap::new(16);
        m.put(1, 10);
        let len_before = m.len();
        m.put(1, 20);
        assert_eq!(m.len(), len_before);
        assert_eq!(m.get(1), (20, true));
    }

    #[test]
    fn test_dense_fill_then_lookup() {
        let n: u64 = 200_000;
        let mut m: IntMap<u64> = IntMap::new(64);
        for i in 0..n {
            m.put(i, i);
        }
        for i in 0..n {
            assert_eq!(m.get(i), (i, true), "key {i}");
        }
        assert_eq!(m.get(n), (0, false));
        assert_eq!(m.len() as u64, n);
    }

    #[test]
    fn test_full_delete_cycle() {
        let n: u64 = 200;
        let mut m: IntMap<u64> = IntMap::new(64);
        for i in 0..n {
            m.put(i, i);
        }
        for i in 0..n {
            assert_eq!(m.delete(i), (i, true));
        }
        for i in 0..n {
            assert_eq!(m.delete(i), (0, false));
        }
        assert_eq!(m.delete(n + 1), (0, false));
        assert!(m.is_empty());
    }

    #[test]
    fn test_delete_preserves_probe_chain_for_survivors() {
        // Force a cluster by filling a small table densely, then delete
        // from the middle and confirm every survivor is still reachable.
        let mut m: IntMap<u64> = IntMap::new(8);
        let keys: Vec<u64> = (1..=6).collect();
        for &k in &keys {
            m.put(k, k * 10);
        }
        m.delete(keys[2]);
        for &k in &keys {
            if k == keys[2] {
                assert_eq!(m.get(k), (0, false));
            } else {
                assert_eq!(m.get(k), (k * 10, true));
            }
        }
    }

    #[test]
    fn test_capacity_is_always_power_of_two() {
        let m: IntMap<u32> = IntMap::new(100);
        assert!(m.capacity().is_power_of_two());
        assert!(m.capacity() >= 100);
    }

    #[test]
    fn test_clear_resets_zero_and_size() {
        let mut m: IntMap<u32> = IntMap::new(16);
        m.put(0, 1);
        m.put(5, 2);
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.get(0), (0, false));
        assert_eq!(m.get(5), (0, false));
    }

    #[test]
    fn test_scan_chunk_eventually_covers_every_live_key() {
        let mut m: IntMap<u64> = IntMap::new(16);
        for i in 1..=10u64 {
            m.put(i, i);
        }
        let mut seen = std::collections::HashSet::new();
        let mut cursor = 0usize;
        for _ in 0..m.capacity() {
            cursor = m.scan_chunk(cursor, 2, |k, v| {
                seen.insert((k, v));
            });
        }
        for i in 1..=10u64 {
            assert!(seen.contains(&(i, i)), "missed key {i}");
        }
    }

    #[test]
    fn test_for_each_visits_all_live_entries_including_zero() {
        let mut m: IntMap<u32> = IntMap::new(16);
        m.put(0, 1);
        m.put(1, 2);
        m.put(2, 3);
        let mut seen = std::collections::HashSet::new();
        m.for_each(|k, v| {
            seen.insert((k, v));
        });
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&(0, 1)));
        assert!(seen.contains(&(1, 2)));
        assert!(seen.contains(&(2, 3)));
    }
}
