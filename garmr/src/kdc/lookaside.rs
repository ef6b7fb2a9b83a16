//! Replay suppression for the KDC front end.
//!
//! Clients on lossy transports retransmit aggressively, and without
//! protection every copy of a request would be processed from scratch. The
//! lookaside cache remembers each reply recently sent, keyed by the exact
//! bytes of the request that produced it, so a retransmitted packet is
//! answered from the cache instead of going through decode and processing a
//! second time.
//!
//! Entries are indexed two ways. A seeded-hash bucket table serves lookups;
//! an insertion-ordered queue serves expiry. The queue owns the entries, the
//! bucket chains hold only their sequence numbers. Since every entry lives
//! for the same fixed time, insertion order is expiration order and eviction
//! only ever looks at the oldest end of the queue. Eviction is lazy: nothing
//! is discarded until the next [ReplayCache::insert] sweeps.

use std::collections::BTreeMap;
use std::mem;

use log::{debug, warn};
use rand::Rng;
use thiserror::Error;

use crate::config::LookasideConfig;
use crate::time::{Clock, SystemClock, Timestamp};

// HASH FUNCTION /////////////////////////////////

/// MurmurHash3, 32-bit x86 variant.
///
/// Non-cryptographic; it only has to spread request packets evenly over the
/// bucket table, and it has to do so fast. The seed keeps remote senders
/// from precomputing colliding requests against a known table layout.
/// Output is bit-exact with the published reference implementation.
pub fn murmur3_32(seed: u32, data: &[u8]) -> u32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    let mut h = seed;

    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h ^= k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    // Fold in the 0-3 tail bytes; with an empty tail this mixes in zero,
    // a no-op, matching the reference behavior.
    let mut k = 0u32;
    for (i, &b) in blocks.remainder().iter().enumerate() {
        k |= u32::from(b) << (8 * i);
    }
    h ^= k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

// CACHE /////////////////////////////////////////

/// Returned when an insert could not copy the packet buffers.
///
/// The cache is best-effort: callers are expected to log and discard this
/// rather than fail the request whose reply was already computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("lookaside cache insert failed: out of memory")]
pub struct InsertError;

/// Lifetime counters of a [ReplayCache], for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookasideStats {
    /// Lookups performed, hit or miss.
    pub calls: u64,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Entries ever inserted. Never decremented, so this counts traffic,
    /// not occupancy; see [ReplayCache::len] for the live count.
    pub num_entries: u64,
    /// Largest hit count any entry had accumulated by the time it was
    /// evicted. High values mean the stale window is doing real work.
    pub max_hits_per_entry: u32,
    /// Bytes currently held by live entries, header overhead included.
    pub total_size: usize,
}

/// One cached request/reply pair.
#[derive(Debug)]
struct CacheEntry {
    req_packet: Vec<u8>,
    reply_packet: Option<Vec<u8>>,
    /// Lookups this entry has answered.
    num_hits: u32,
    /// Insertion time, whole seconds.
    timein: Timestamp,
    /// Index of the hash chain this entry is filed under.
    bucket: usize,
}

impl CacheEntry {
    fn reply_len(&self) -> usize {
        self.reply_packet.as_ref().map_or(0, Vec::len)
    }
}

/// Accounted footprint of an entry: header plus both buffers.
fn entry_size(req_len: usize, reply_len: usize) -> usize {
    mem::size_of::<CacheEntry>() + req_len + reply_len
}

/// Stale in either clock direction: a backwards jump of more than the
/// stale window also expires an entry rather than pinning it forever.
fn is_stale(timein: Timestamp, now: Timestamp, stale_after: i64) -> bool {
    timein.abs_diff(now) >= stale_after.unsigned_abs()
}

/// The replay lookaside cache.
///
/// All operations take `&mut self`; the exclusive borrow is the
/// serialization discipline. A cache shared across threads goes behind a
/// `Mutex` owned by the caller.
#[derive(Debug)]
pub struct ReplayCache {
    /// Hash chains holding sequence numbers, newest first.
    buckets: Vec<Vec<u64>>,
    /// All entries in insertion order, keyed by sequence number. This map
    /// is the canonical owner; eviction pops from its low end.
    queue: BTreeMap<u64, CacheEntry>,
    /// Sequence number the next insert will use.
    next_seq: u64,
    /// Per-cache hash seed, drawn once at construction.
    seed: u32,
    clock: Box<dyn Clock>,
    max_bytes: usize,
    stale_after: i64,
    total_size: usize,
    calls: u64,
    hits: u64,
    num_entries: u64,
    max_hits_per_entry: u32,
    /// When `Some(n)`, the n-th upcoming buffer copy (zero-based) fails and
    /// the failpoint disarms. Simulates allocation exhaustion in tests.
    #[cfg(test)]
    pub(crate) fail_copy_after: Option<u32>,
}

impl ReplayCache {
    pub fn new(cfg: &LookasideConfig) -> Self {
        Self::with_clock(cfg, Box::new(SystemClock))
    }

    /// Construct with an explicit clock. Tests use this to steer time.
    pub fn with_clock(cfg: &LookasideConfig, clock: Box<dyn Clock>) -> Self {
        // A zero-bucket table could hold nothing; clamp rather than panic.
        if cfg.hash_buckets == 0 {
            warn!("lookaside hash_buckets is 0, clamping to 1");
        }
        let buckets = cfg.hash_buckets.max(1);
        Self {
            buckets: vec![Vec::new(); buckets],
            queue: BTreeMap::new(),
            next_seq: 0,
            seed: rand::thread_rng().gen(),
            clock,
            max_bytes: cfg.max_bytes,
            stale_after: cfg.stale_after_secs,
            total_size: 0,
            calls: 0,
            hits: 0,
            num_entries: 0,
            max_hits_per_entry: 0,
            #[cfg(test)]
            fail_copy_after: None,
        }
    }

    /// Look up a request by its exact bytes.
    ///
    /// On a hit, returns a copy of the stored reply; the caller may do with
    /// it what it pleases. An entry stored without a reply yields an empty
    /// buffer. A miss has no effect beyond the call counter; in particular
    /// lookups never evict, no matter how stale the entry.
    pub fn lookup(&mut self, req_packet: &[u8]) -> Option<Vec<u8>> {
        self.calls += 1;
        let seq = self.find(req_packet)?;
        let entry = self.queue.get_mut(&seq)?;
        entry.num_hits += 1;
        let reply = entry.reply_packet.clone().unwrap_or_default();
        self.hits += 1;
        Some(reply)
    }

    /// Insert a request and the reply it produced.
    ///
    /// First sweeps the oldest end of the queue, discarding entries that are
    /// stale or that stand between `total_size` and the byte budget; the
    /// sweep stops at the first entry that is neither. The budget is soft:
    /// an entry larger than everything freeable still goes in, so the cache
    /// can overshoot `max_bytes` by at most the newest entry's footprint.
    ///
    /// Both buffers are copied into owned storage with fallible allocation.
    /// On copy failure the cache is left exactly as the sweep left it and
    /// the error is returned for the caller to discard.
    pub fn insert(
        &mut self,
        req_packet: &[u8],
        reply_packet: Option<&[u8]>,
    ) -> Result<(), InsertError> {
        let esize = entry_size(req_packet.len(), reply_packet.map_or(0, <[u8]>::len));
        let now = self.clock.now();

        let mut discarded = 0usize;
        loop {
            let (seq, entry_hits) = match self.queue.iter().next() {
                Some((&seq, e))
                    if is_stale(e.timein, now, self.stale_after)
                        || self.total_size + esize > self.max_bytes =>
                {
                    (seq, e.num_hits)
                }
                _ => break,
            };
            self.max_hits_per_entry = self.max_hits_per_entry.max(entry_hits);
            self.discard(seq);
            discarded += 1;
        }
        if discarded > 0 {
            debug!(
                "lookaside sweep discarded {discarded} entries, {} bytes in use",
                self.total_size
            );
        }

        let req = self.copy_packet(req_packet)?;
        let reply = match reply_packet {
            Some(r) => Some(self.copy_packet(r)?),
            None => None,
        };

        let bucket = self.bucket_of(req_packet);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert(
            seq,
            CacheEntry {
                req_packet: req,
                reply_packet: reply,
                num_hits: 0,
                timein: now,
                bucket,
            },
        );
        // Retransmissions cluster right after the first send, so the newest
        // entry goes to the front of its chain.
        self.buckets[bucket].insert(0, seq);
        self.total_size += esize;
        self.num_entries += 1;
        Ok(())
    }

    /// Drop the entry for this exact request, if present.
    pub fn remove(&mut self, req_packet: &[u8]) {
        if let Some(seq) = self.find(req_packet) {
            self.discard(seq);
        }
    }

    /// Release every entry. Counters survive; this is the shutdown path,
    /// but the cache remains usable afterwards.
    pub fn clear(&mut self) {
        for chain in &mut self.buckets {
            chain.clear();
        }
        self.queue.clear();
        self.total_size = 0;
    }

    pub fn stats(&self) -> LookasideStats {
        LookasideStats {
            calls: self.calls,
            hits: self.hits,
            num_entries: self.num_entries,
            max_hits_per_entry: self.max_hits_per_entry,
            total_size: self.total_size,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn bucket_of(&self, req_packet: &[u8]) -> usize {
        murmur3_32(self.seed, req_packet) as usize % self.buckets.len()
    }

    /// Scan the request's hash chain for a byte-exact match.
    fn find(&self, req_packet: &[u8]) -> Option<u64> {
        let chain = &self.buckets[self.bucket_of(req_packet)];
        chain.iter().copied().find(|seq| {
            matches!(self.queue.get(seq), Some(e) if e.req_packet.as_slice() == req_packet)
        })
    }

    /// Excise one entry from both the queue and its hash chain.
    fn discard(&mut self, seq: u64) {
        let entry = match self.queue.remove(&seq) {
            Some(e) => e,
            None => return,
        };
        self.total_size -= entry_size(entry.req_packet.len(), entry.reply_len());
        let chain = &mut self.buckets[entry.bucket];
        if let Some(pos) = chain.iter().position(|&s| s == seq) {
            chain.remove(pos);
        }
    }

    /// Copy a packet into owned storage without aborting on exhaustion.
    fn copy_packet(&mut self, src: &[u8]) -> Result<Vec<u8>, InsertError> {
        #[cfg(test)]
        if let Some(n) = self.fail_copy_after {
            if n == 0 {
                self.fail_copy_after = None;
                return Err(InsertError);
            }
            self.fail_copy_after = Some(n - 1);
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(src.len()).map_err(|_| InsertError)?;
        buf.extend_from_slice(src);
        Ok(buf)
    }
}
