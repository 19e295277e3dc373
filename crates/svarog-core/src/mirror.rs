//! Seqlock-protected RAM mirror.
//!
//! Each registered block owns one mirror: the RAM-resident image of its
//! payload. Readers (possibly on other threads) take lock-free snapshots
//! concurrent with the single manager-side writer.
//!
//! The protocol packs a 32-bit sequence and a 32-bit version into one
//! 64-bit meta word updated as a unit:
//!
//! - sequence even = stable, odd = write in progress;
//! - version increments on every write of a *versioned* mirror whether or
//!   not the payload changed, so a reader comparing the whole meta word
//!   cannot be fooled by an A→B→A payload (the ABA defence).
//!
//! Plain mirrors leave the version half at zero; both flavours share the
//! same type and the same full-meta comparison.

use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{Error, Result};
use crate::medium::ERASED_BYTE;

/// Bound on reader restart attempts before the snapshot fails.
pub const SEQLOCK_MAX_RETRIES: u32 = 1000;

/// Per-mirror seqlock statistics.
///
/// Counters use relaxed atomics; they are monitoring data, not
/// synchronisation.
#[derive(Debug, Default)]
pub struct SeqlockStats {
    read_count: AtomicU64,
    read_retries: AtomicU64,
    write_count: AtomicU64,
    max_retries: AtomicU32,
    data_tears: AtomicU64,
}

/// Plain-data snapshot of [`SeqlockStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqlockStatsSnapshot {
    /// Snapshot attempts (including retries).
    pub read_count: u64,
    /// Reader restarts.
    pub read_retries: u64,
    /// Completed writes.
    pub write_count: u64,
    /// Worst-case retries a single snapshot needed.
    pub max_retries: u32,
    /// Times a reader observed the meta word change under it.
    pub data_tears: u64,
}

impl SeqlockStats {
    fn snapshot(&self) -> SeqlockStatsSnapshot {
        SeqlockStatsSnapshot {
            read_count: self.read_count.load(Ordering::Relaxed),
            read_retries: self.read_retries.load(Ordering::Relaxed),
            write_count: self.write_count.load(Ordering::Relaxed),
            max_retries: self.max_retries.load(Ordering::Relaxed),
            data_tears: self.data_tears.load(Ordering::Relaxed),
        }
    }

    fn record_max_retries(&self, retries: u32) {
        // Monotonic max; racing updates may lose, which is fine for a stat.
        if retries > self.max_retries.load(Ordering::Relaxed) {
            self.max_retries.store(retries, Ordering::Relaxed);
        }
    }
}

/// A seqlock-protected payload buffer.
pub struct MirrorSeqlock {
    /// Combined meta word: low half sequence, high half version.
    meta: AtomicU64,
    /// Payload bytes. Written only by the single serialised writer.
    data: UnsafeCell<Box<[u8]>>,
    /// Additive checksum of the last written payload (dirty detection).
    checksum: AtomicU32,
    versioned: bool,
    max_read_retries: u32,
    stats: SeqlockStats,
}

// SAFETY: `MirrorSeqlock` is `Send`/`Sync` under the seqlock protocol.
// - Condition 1: the payload cell is mutated only by the single writer the
//   job queue serialises; concurrent writers are excluded by construction.
// - Condition 2: readers copy the payload between two acquire loads of the
//   meta word and discard the copy unless both loads agree, so a torn read
//   is never returned.
// Reason: lock-free snapshots from other threads are the point of the type.
unsafe impl Send for MirrorSeqlock {}
unsafe impl Sync for MirrorSeqlock {}

impl std::fmt::Debug for MirrorSeqlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorSeqlock")
            .field("len", &self.len())
            .field("versioned", &self.versioned)
            .field("sequence", &self.sequence())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

fn additive_checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
}

const fn pack(version: u32, sequence: u32) -> u64 {
    (version as u64) << 32 | sequence as u64
}

impl MirrorSeqlock {
    /// Creates a mirror of `size` bytes filled with the erase pattern.
    ///
    /// `versioned` selects the ABA-immune flavour.
    #[must_use]
    pub fn new(size: usize, versioned: bool) -> Self {
        Self::with_retry_bound(size, versioned, SEQLOCK_MAX_RETRIES)
    }

    /// Creates a mirror with an explicit reader retry bound.
    #[must_use]
    pub fn with_retry_bound(size: usize, versioned: bool, max_read_retries: u32) -> Self {
        Self {
            meta: AtomicU64::new(0),
            data: UnsafeCell::new(vec![ERASED_BYTE; size].into_boxed_slice()),
            checksum: AtomicU32::new(0),
            versioned,
            max_read_retries,
            stats: SeqlockStats::default(),
        }
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        // SAFETY: the box itself (pointer and length) is never replaced
        // after construction; only the pointed-to bytes are written.
        unsafe { (&*self.data.get()).len() }
    }

    /// Whether the payload is zero-sized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this mirror increments its version on every write.
    #[must_use]
    pub fn is_versioned(&self) -> bool {
        self.versioned
    }

    /// Current sequence counter (even when stable).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // deliberately taking the low half
    pub fn sequence(&self) -> u32 {
        self.meta.load(Ordering::Acquire) as u32
    }

    /// Current version counter (always 0 for plain mirrors).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // deliberately taking the high half
    pub fn version(&self) -> u32 {
        (self.meta.load(Ordering::Acquire) >> 32) as u32
    }

    /// Last written additive checksum.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.checksum.load(Ordering::Acquire)
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> SeqlockStatsSnapshot {
        self.stats.snapshot()
    }

    /// Takes a consistent snapshot of the payload into `buf`.
    ///
    /// Returns the version the snapshot was taken at. The read is bounded:
    /// after `max_read_retries` restarts it gives up with
    /// [`Error::MirrorContended`] rather than spinning forever behind a
    /// stuck writer.
    #[allow(clippy::cast_possible_truncation)] // low half of the meta word
    pub fn read(&self, buf: &mut [u8]) -> Result<u32> {
        if buf.len() != self.len() {
            return Err(Error::MirrorSize {
                expected: self.len(),
                got: buf.len(),
            });
        }

        let mut retries = 0u32;
        while retries < self.max_read_retries {
            self.stats.read_count.fetch_add(1, Ordering::Relaxed);

            let meta1 = self.meta.load(Ordering::Acquire);
            if meta1 as u32 & 1 != 0 {
                // Writer in progress.
                retries += 1;
                self.stats.read_retries.fetch_add(1, Ordering::Relaxed);
                std::hint::spin_loop();
                continue;
            }

            // SAFETY: this copy races with the writer by design. The bytes
            // read here are only surfaced to the caller if the meta word is
            // unchanged across the copy (checked below); a concurrent write
            // forces a restart and the potentially torn bytes are discarded.
            unsafe {
                let src = (*self.data.get()).as_ptr();
                std::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len());
            }

            fence(Ordering::Acquire);

            let meta2 = self.meta.load(Ordering::Acquire);
            if meta1 == meta2 {
                self.stats.record_max_retries(retries);
                return Ok((meta2 >> 32) as u32);
            }

            retries += 1;
            self.stats.read_retries.fetch_add(1, Ordering::Relaxed);
            self.stats.data_tears.fetch_add(1, Ordering::Relaxed);
        }

        error!(
            retries = self.max_read_retries,
            "mirror snapshot failed: retry bound exhausted"
        );
        Err(Error::MirrorContended(self.max_read_retries))
    }

    /// Publishes a new payload.
    ///
    /// Must only be called from the single serialised writer flow; the job
    /// queue guarantees at most one writer per mirror at a time.
    #[allow(clippy::cast_possible_truncation)] // halves of the meta word
    pub fn write(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.len() {
            return Err(Error::MirrorSize {
                expected: self.len(),
                got: data.len(),
            });
        }

        let old = self.meta.load(Ordering::Relaxed);
        let seq = old as u32;
        let version = (old >> 32) as u32;
        let new_version = if self.versioned {
            version.wrapping_add(1)
        } else {
            version
        };

        // Mark the write in progress (odd sequence).
        self.meta
            .store(pack(new_version, seq.wrapping_add(1)), Ordering::Release);
        fence(Ordering::Release);

        // SAFETY: single-writer invariant (see above); readers observing
        // the odd sequence restart instead of using these bytes.
        unsafe {
            let dst = (*self.data.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        self.checksum
            .store(additive_checksum(data), Ordering::Release);

        // Mark the write complete (even sequence).
        self.meta
            .store(pack(new_version, seq.wrapping_add(2)), Ordering::Release);

        self.stats.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_mirror_holds_erase_pattern() {
        let mirror = MirrorSeqlock::new(32, true);
        let mut buf = [0u8; 32];
        let version = mirror.read(&mut buf).unwrap();
        assert_eq!(version, 0);
        assert!(buf.iter().all(|&b| b == ERASED_BYTE));
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let mirror = MirrorSeqlock::new(8, true);
        mirror.write(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let mut buf = [0u8; 8];
        let version = mirror.read(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(version, 1);
        assert_eq!(mirror.sequence(), 2);
        assert_eq!(mirror.checksum(), 36);
    }

    #[test]
    fn test_version_increments_even_when_payload_unchanged() {
        let mirror = MirrorSeqlock::new(4, true);
        let payload = [0xAB; 4];
        mirror.write(&payload).unwrap();
        mirror.write(&payload).unwrap();
        mirror.write(&payload).unwrap();
        assert_eq!(mirror.version(), 3);
        assert_eq!(mirror.sequence(), 6);
    }

    #[test]
    fn test_plain_mirror_keeps_version_zero() {
        let mirror = MirrorSeqlock::new(4, false);
        mirror.write(&[1; 4]).unwrap();
        mirror.write(&[2; 4]).unwrap();
        assert_eq!(mirror.version(), 0);
        assert_eq!(mirror.sequence(), 4);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let mirror = MirrorSeqlock::new(8, true);
        let mut short = [0u8; 4];
        assert!(matches!(
            mirror.read(&mut short),
            Err(Error::MirrorSize { expected: 8, got: 4 })
        ));
        assert!(matches!(
            mirror.write(&[0u8; 16]),
            Err(Error::MirrorSize { expected: 8, got: 16 })
        ));
    }

    #[test]
    fn test_stats_accumulate() {
        let mirror = MirrorSeqlock::new(4, true);
        mirror.write(&[1; 4]).unwrap();
        let mut buf = [0u8; 4];
        mirror.read(&mut buf).unwrap();
        mirror.read(&mut buf).unwrap();

        let stats = mirror.stats();
        assert_eq!(stats.write_count, 1);
        assert_eq!(stats.read_count, 2);
        assert_eq!(stats.read_retries, 0);
        assert_eq!(stats.data_tears, 0);
    }

    #[test]
    fn test_sequence_wraps_without_panicking() {
        let mirror = MirrorSeqlock::new(1, false);
        mirror.meta.store(u64::from(u32::MAX - 1), Ordering::Release);
        mirror.write(&[7]).unwrap();
        assert_eq!(mirror.sequence(), 0);
    }
}
