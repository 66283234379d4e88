//! Arena — chunked byte-slab storage with free-list recycling.
//!
//! The arena owns a growing list of fixed-size chunks. Within a chunk,
//! slabs are laid out contiguously as `[header | payload]` and allocated by
//! bumping a per-chunk cursor. A slab-id packs a chunk index and an
//! in-chunk byte offset into a single `u64`, so resolving a slab never
//! needs a side table. Freed slabs are not compacted; their id is filed by
//! size class onto a free list and handed back to the next allocation
//! request whose class matches, which is what bounds fragmentation without
//! needing a compacting collector.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::debug;

/// `capacity(u32) | length(u32) | created_at_ms(i64) | alive(u8)`
const HEADER_LEN: usize = 4 + 4 + 8 + 1;
const MIN_SLOT_SIZE: usize = 32;

/// Opaque handle naming a slab. Packs a 32-bit chunk index in the high
/// bits and a 32-bit in-chunk byte offset in the low bits.
pub type SlabId = u64;

#[inline]
fn pack(chunk: u32, offset: u32) -> SlabId {
    (chunk as u64) << 32 | offset as u64
}

#[inline]
fn unpack(id: SlabId) -> (u32, u32) {
    ((id >> 32) as u32, id as u32)
}

struct Chunk {
    bytes: Vec<u8>,
    used: usize,
}

impl Chunk {
    fn new(size: usize) -> Self {
        Self { bytes: vec![0u8; size], used: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.used
    }
}

/// Chunked, free-list-recycling byte-slab allocator.
pub struct Arena {
    default_chunk_size: usize,
    chunks: Vec<Chunk>,
    free_lists: HashMap<usize, Vec<SlabId>>,
    live_count: usize,
    live_bytes: i64,
}

impl Arena {
    pub fn new(default_chunk_size: usize) -> Self {
        let chunk_size = default_chunk_size.max(HEADER_LEN + MIN_SLOT_SIZE);
        Self {
            default_chunk_size: chunk_size,
            chunks: vec![Chunk::new(chunk_size)],
            free_lists: HashMap::new(),
            live_count: 0,
            live_bytes: 0,
        }
    }

    /// Number of slabs currently marked alive.
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Sum of the payload lengths of every live slab (does not include
    /// header or free-list slack).
    pub fn live_bytes(&self) -> i64 {
        self.live_bytes
    }

    #[inline]
    fn slot_size_for(payload_len: usize) -> usize {
        (HEADER_LEN + payload_len).next_power_of_two().max(MIN_SLOT_SIZE)
    }

    fn write_header(bytes: &mut [u8], capacity: u32, length: u32, created_at_ms: i64, alive: bool) {
        LittleEndian::write_u32(&mut bytes[0..4], capacity);
        LittleEndian::write_u32(&mut bytes[4..8], length);
        LittleEndian::write_i64(&mut bytes[8..16], created_at_ms);
        bytes[16] = alive as u8;
    }

    fn read_header(bytes: &[u8]) -> (u32, u32, i64, bool) {
        let capacity = LittleEndian::read_u32(&bytes[0..4]);
        let length = LittleEndian::read_u32(&bytes[4..8]);
        let created_at_ms = LittleEndian::read_i64(&bytes[8..16]);
        let alive = bytes[16] != 0;
        (capacity, length, created_at_ms, alive)
    }

    fn slot_mut(&mut self, id: SlabId, slot_size: usize) -> &mut [u8] {
        let (chunk_idx, offset) = unpack(id);
        let chunk = &mut self.chunks[chunk_idx as usize].bytes;
        &mut chunk[offset as usize..offset as usize + slot_size]
    }

    fn slot(&self, id: SlabId, slot_size: usize) -> &[u8] {
        let (chunk_idx, offset) = unpack(id);
        let chunk = &self.chunks[chunk_idx as usize].bytes;
        &chunk[offset as usize..offset as usize + slot_size]
    }

    /// Allocates a slab holding `payload`, stamped with `created_at_ms`.
    /// Prefers a free-list slot of the matching size class before bumping
    /// a chunk.
    pub fn alloc(&mut self, payload: &[u8], created_at_ms: i64) -> SlabId {
        let slot_size = Self::slot_size_for(payload.len());

        let id = if let Some(id) = self.free_lists.get_mut(&slot_size).and_then(Vec::pop) {
            id
        } else {
            self.bump_alloc(slot_size)
        };

        let slot = self.slot_mut(id, slot_size);
        Self::write_header(slot, slot_size as u32, payload.len() as u32, created_at_ms, true);
        slot[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);

        self.live_count += 1;
        self.live_bytes += payload.len() as i64;
        id
    }

    fn bump_alloc(&mut self, slot_size: usize) -> SlabId {
        let last_idx = self.chunks.len() - 1;
        if self.chunks[last_idx].remaining() >= slot_size {
            let chunk = &mut self.chunks[last_idx];
            let offset = chunk.used as u32;
            chunk.used += slot_size;
            return pack(last_idx as u32, offset);
        }

        let new_chunk_size = self.default_chunk_size.max(slot_size);
        debug!(size = new_chunk_size, "arena: allocating new chunk");
        self.chunks.push(Chunk::new(new_chunk_size));
        let idx = self.chunks.len() - 1;
        self.chunks[idx].used = slot_size;
        pack(idx as u32, 0)
    }

    /// Returns a copy of the slab's payload bytes and its creation
    /// timestamp. Calling this on a freed slab-id is a logic error on the
    /// caller's part (the arena trusts its caller never retains one); in
    /// debug builds this is checked with a `debug_assert!`.
    pub fn get(&self, id: SlabId) -> (Bytes, i64) {
        // Peek at the header first to learn the slot size, then re-slice.
        let (chunk_idx, offset) = unpack(id);
        let chunk = &self.chunks[chunk_idx as usize].bytes;
        let header = &chunk[offset as usize..offset as usize + HEADER_LEN];
        let (capacity, length, created_at_ms, alive) = Self::read_header(header);
        debug_assert!(alive, "arena::get called on a freed slab-id");

        let slot = self.slot(id, capacity as usize);
        let payload = &slot[HEADER_LEN..HEADER_LEN + length as usize];
        (Bytes::copy_from_slice(payload), created_at_ms)
    }

    /// Marks a slab dead and files it on the free list for its size
    /// class. The underlying bytes are left in the chunk until reused.
    pub fn free(&mut self, id: SlabId) {
        let (chunk_idx, offset) = unpack(id);
        let chunk = &self.chunks[chunk_idx as usize].bytes;
        let header = &chunk[offset as usize..offset as usize + HEADER_LEN];
        let (capacity, length, _created_at_ms, alive) = Self::read_header(header);
        if !alive {
            return;
        }

        let slot = self.slot_mut(id, capacity as usize);
        slot[16] = 0; // alive = false

        self.live_count -= 1;
        self.live_bytes -= length as i64;
        self.free_lists.entry(capacity as usize).or_default().push(id);
    }

    /// Drops every chunk and free list, resetting the arena to empty.
    pub fn clear(&mut self) {
        self.chunks = vec![Chunk::new(self.default_chunk_size)];
        self.free_lists.clear();
        self.live_count = 0;
        self.live_bytes = 0;
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_get_roundtrip() {
        let mut a = Arena::new(1024);
        let id = a.alloc(b"hello world", 1000);
        let (bytes, ts) = a.get(id);
        assert_eq!(&bytes[..], b"hello world");
        assert_eq!(ts, 1000);
        assert_eq!(a.live_count(), 1);
        assert_eq!(a.live_bytes(), 11);
    }

    #[test]
    fn test_free_then_reuse_via_free_list() {
        let mut a = Arena::new(1024);
        let id1 = a.alloc(b"short", 1);
        a.free(id1);
        assert_eq!(a.live_count(), 0);

        let id2 = a.alloc(b"other", 2);
        // Reused the same size class; allocator should not have grown the
        // chunk count to satisfy this second allocation.
        assert_eq!(a.chunk_count(), 1);
        let (bytes, ts) = a.get(id2);
        assert_eq!(&bytes[..], b"other");
        assert_eq!(ts, 2);
    }

    #[test]
    fn test_grows_chunks_when_full() {
        let mut a = Arena::new(64);
        let mut ids = vec![];
        for i in 0..20u8 {
            ids.push(a.alloc(&[i; 16], i as i64));
        }
        assert!(a.chunk_count() > 1);
        for (i, id) in ids.iter().enumerate() {
            let (bytes, ts) = a.get(*id);
            assert_eq!(&bytes[..], &[i as u8; 16][..]);
            assert_eq!(ts, i as i64);
        }
    }

    #[test]
    fn test_oversized_payload_gets_its_own_chunk() {
        let mut a = Arena::new(64);
        let big = vec![7u8; 4096];
        let id = a.alloc(&big, 5);
        let (bytes, _) = a.get(id);
        assert_eq!(bytes.len(), big.len());
    }

    #[test]
    fn test_clear_resets_counters() {
        let mut a = Arena::new(1024);
        a.alloc(b"a", 1);
        a.alloc(b"b", 2);
        a.clear();
        assert_eq!(a.live_count(), 0);
        assert_eq!(a.live_bytes(), 0);
        assert_eq!(a.chunk_count(), 1);
    }

    #[test]
    fn test_stretched_arena_peak_chunk_count_bounded_by_reuse() {
        let mut a = Arena::new(4096);
        let mut ids = vec![];
        for i in 0..200u32 {
            ids.push(a.alloc(&[0u8; 32], i as i64));
        }
        for id in ids.drain(..100) {
            a.free(id);
        }
        let chunks_before_refill = a.chunk_count();
        for i in 0..100u32 {
            a.alloc(&[1u8; 32], i as i64);
        }
        // Refilling the freed slots should reuse free-list entries rather
        // than growing the chunk list further.
        assert_eq!(a.chunk_count(), chunks_before_refill);
    }
}
