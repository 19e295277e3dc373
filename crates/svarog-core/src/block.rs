//! Block types and the Native / Redundant / Dataset engine.
//!
//! The engine is built from two atoms: [`try_read_slot`] (read payload,
//! check parity) and [`write_slot_with_crc`] (erase, program payload,
//! program parity page). The three block flavours compose them into
//! fallback ladders:
//!
//! - **Native**: one slot, ROM default on failure.
//! - **Redundant**: primary + backup with read failover and write-time
//!   read-back verification.
//! - **Dataset**: N consecutive slots rotated round-robin on write,
//!   scanned from the live index on read.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crc::{self, CrcKind};
use crate::layout::SlotLayout;
use crate::memif::MemIf;
use crate::mirror::MirrorSeqlock;

/// Public handle of a registered block.
pub type BlockId = u16;

/// Redundant writes read back and compare payloads up to this size.
const REDUNDANT_VERIFY_LIMIT: usize = 256;

/// Storage flavour of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    /// Single slot with optional ROM fallback.
    Native,
    /// Primary plus backup slot, with an optional persisted version cell.
    Redundant {
        /// Slot-aligned offset of the backup copy.
        backup_offset: u32,
        /// Slot-aligned offset of the one-byte version cell, if persisted.
        version_cell: Option<u32>,
    },
    /// `count` consecutive slots rotated on write.
    Dataset {
        /// Number of dataset copies (1..=8).
        count: u8,
    },
}

/// Observable state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockState {
    /// Never touched by any job.
    Uninitialized,
    /// Last I/O succeeded cleanly.
    Valid,
    /// All paths failed.
    Invalid,
    /// Reserved for future use.
    Recovering,
    /// Last read succeeded via a fallback copy; the primary is suspect.
    Recovered,
}

/// Per-block job result word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum JobResult {
    /// Request completed successfully.
    Ok = 0,
    /// Request failed.
    NotOk = 1,
    /// Request queued but not yet completed.
    Pending = 2,
    /// Reserved: integrity check failed.
    IntegrityFailed = 3,
    /// Reserved: block skipped.
    BlockSkipped = 4,
}

impl JobResult {
    /// Wire value of the result word.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Immutable configuration of a block, fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Unique public handle.
    pub block_id: BlockId,
    /// User-visible payload size in bytes.
    pub block_size: usize,
    /// Storage flavour.
    pub block_type: BlockType,
    /// Parity variant protecting each slot.
    pub crc_kind: CrcKind,
    /// Scheduling priority, 0 highest.
    pub priority: u8,
    /// Biases scheduling: boosts the effective priority by two levels.
    pub immediate: bool,
    /// Rejects write requests.
    pub write_protected: bool,
    /// ROM default used as the last fallback on read failure.
    pub rom_default: Option<Vec<u8>>,
    /// Slot-aligned offset of the primary slot.
    pub primary_offset: u32,
    /// Whether the RAM mirror carries the ABA-immune version counter.
    pub versioned_mirror: bool,
}

impl BlockConfig {
    /// A native block with no parity, default priority 10.
    #[must_use]
    pub fn new(block_id: BlockId, block_size: usize, primary_offset: u32) -> Self {
        Self {
            block_id,
            block_size,
            block_type: BlockType::Native,
            crc_kind: CrcKind::None,
            priority: 10,
            immediate: false,
            write_protected: false,
            rom_default: None,
            primary_offset,
            versioned_mirror: true,
        }
    }

    /// Selects the parity variant.
    #[must_use]
    pub fn crc(mut self, kind: CrcKind) -> Self {
        self.crc_kind = kind;
        self
    }

    /// Sets the scheduling priority (0 highest).
    #[must_use]
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Flags the block for immediate scheduling.
    #[must_use]
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Rejects writes to this block.
    #[must_use]
    pub fn write_protected(mut self) -> Self {
        self.write_protected = true;
        self
    }

    /// Installs a ROM default used as the last read fallback.
    #[must_use]
    pub fn rom_default(mut self, rom: Vec<u8>) -> Self {
        self.rom_default = Some(rom);
        self
    }

    /// Turns the block redundant with the given backup slot.
    #[must_use]
    pub fn redundant(mut self, backup_offset: u32, version_cell: Option<u32>) -> Self {
        self.block_type = BlockType::Redundant {
            backup_offset,
            version_cell,
        };
        self
    }

    /// Turns the block into a dataset of `count` rotating copies.
    #[must_use]
    pub fn dataset(mut self, count: u8) -> Self {
        self.block_type = BlockType::Dataset { count };
        self
    }

    /// Uses the plain (unversioned) mirror flavour.
    #[must_use]
    pub fn plain_mirror(mut self) -> Self {
        self.versioned_mirror = false;
        self
    }
}

/// Runtime record of a registered block.
#[derive(Debug)]
pub(crate) struct BlockEntry {
    pub cfg: BlockConfig,
    pub layout: SlotLayout,
    pub state: BlockState,
    pub result: JobResult,
    pub erase_count: u32,
    pub active_version: u8,
    pub active_index: u8,
    pub mirror: Arc<MirrorSeqlock>,
}

impl BlockEntry {
    pub(crate) fn new(cfg: BlockConfig, layout: SlotLayout, max_read_retries: u32) -> Self {
        let mirror = Arc::new(MirrorSeqlock::with_retry_bound(
            cfg.block_size,
            cfg.versioned_mirror,
            max_read_retries,
        ));
        Self {
            cfg,
            layout,
            state: BlockState::Uninitialized,
            result: JobResult::Pending,
            erase_count: 0,
            active_version: 0,
            active_index: 0,
            mirror,
        }
    }
}

/// How a read resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// The live copy verified; `out` holds the stored payload.
    Clean,
    /// A fallback copy verified; `out` holds it and the primary is suspect.
    Recovered,
    /// Every copy failed; `out` holds the ROM default.
    RomFallback,
    /// Every path failed; `out` is unspecified.
    Failed,
}

impl ReadOutcome {
    /// Whether `out` carries usable payload bytes.
    pub(crate) fn has_payload(self) -> bool {
        !matches!(self, ReadOutcome::Failed)
    }

    /// Whether the read counts as a successful job.
    pub(crate) fn is_ok(self) -> bool {
        matches!(self, ReadOutcome::Clean | ReadOutcome::Recovered)
    }
}

/// Computes the parity word for `data`, routed through the CRC fault hook.
fn slot_checksum(memif: &MemIf, kind: CrcKind, data: &[u8]) -> u32 {
    let computed = crc::checksum(kind, data);
    memif.faults().lock().on_crc(computed, kind)
}

/// Reads one slot and checks its parity word.
///
/// No fallback happens here; the block-flavour ladder decides what a
/// failure means.
pub(crate) fn try_read_slot(
    memif: &mut MemIf,
    slot_offset: u32,
    out: &mut [u8],
    crc_kind: CrcKind,
) -> bool {
    if memif.read(slot_offset, out).is_err() {
        return false;
    }
    if crc_kind == CrcKind::None {
        return true;
    }

    let crc_offset = slot_offset + out.len() as u32;
    let mut word = [0u8; 4];
    let width = crc_kind.width();
    if memif.read(crc_offset, &mut word[..width]).is_err() {
        debug!(offset = crc_offset, "parity word read failed");
        return false;
    }

    let stored = crc::decode_word(crc_kind, &word);
    let computed = slot_checksum(memif, crc_kind, out);
    if stored != computed {
        debug!(
            offset = slot_offset,
            stored = format_args!("{stored:#x}"),
            computed = format_args!("{computed:#x}"),
            "parity mismatch"
        );
        return false;
    }
    true
}

/// Erases the slot and programs payload plus parity page.
///
/// The parity word occupies the leading bytes of its own page; the rest of
/// the page is erase-state filler, so programming it never disturbs the
/// payload pages.
pub(crate) fn write_slot_with_crc(
    memif: &mut MemIf,
    slot_offset: u32,
    data: &[u8],
    crc_kind: CrcKind,
    slot_size: u32,
) -> bool {
    if memif.erase(slot_offset, slot_size).is_err() {
        warn!(offset = slot_offset, "slot erase failed");
        return false;
    }
    if memif.write(slot_offset, data).is_err() {
        warn!(offset = slot_offset, "payload program failed");
        return false;
    }

    if crc_kind != CrcKind::None {
        let crc = slot_checksum(memif, crc_kind, data);
        let page = memif.geometry().page_size as usize;
        let mut crc_page = vec![crate::medium::ERASED_BYTE; page];
        crc::encode_word(crc_kind, crc, &mut crc_page);

        let crc_offset = slot_offset + data.len() as u32;
        if memif.write(crc_offset, &crc_page).is_err() {
            warn!(offset = crc_offset, "parity page program failed");
            return false;
        }
    }
    true
}

fn apply_rom_fallback(entry: &BlockEntry, out: &mut [u8]) -> bool {
    if let Some(rom) = &entry.cfg.rom_default {
        let span = rom.len().min(out.len());
        out[..span].copy_from_slice(&rom[..span]);
        warn!(block = entry.cfg.block_id, "loaded ROM default");
        true
    } else {
        false
    }
}

/// Dispatches a read to the block's flavour ladder.
pub(crate) fn read_block(entry: &mut BlockEntry, memif: &mut MemIf, out: &mut [u8]) -> ReadOutcome {
    match entry.cfg.block_type {
        BlockType::Native => read_native(entry, memif, out),
        BlockType::Redundant { backup_offset, .. } => {
            read_redundant(entry, memif, out, backup_offset)
        }
        BlockType::Dataset { count } => read_dataset(entry, memif, out, count),
    }
}

/// Dispatches a write to the block's flavour ladder.
pub(crate) fn write_block(entry: &mut BlockEntry, memif: &mut MemIf, data: &[u8]) -> bool {
    match entry.cfg.block_type {
        BlockType::Native => write_native(entry, memif, data),
        BlockType::Redundant {
            backup_offset,
            version_cell,
        } => write_redundant(entry, memif, data, backup_offset, version_cell),
        BlockType::Dataset { count } => write_dataset(entry, memif, data, count),
    }
}

fn read_native(entry: &mut BlockEntry, memif: &mut MemIf, out: &mut [u8]) -> ReadOutcome {
    if try_read_slot(memif, entry.cfg.primary_offset, out, entry.cfg.crc_kind) {
        entry.state = BlockState::Valid;
        return ReadOutcome::Clean;
    }

    entry.state = BlockState::Invalid;
    if apply_rom_fallback(entry, out) {
        ReadOutcome::RomFallback
    } else {
        ReadOutcome::Failed
    }
}

fn write_native(entry: &mut BlockEntry, memif: &mut MemIf, data: &[u8]) -> bool {
    let ok = write_slot_with_crc(
        memif,
        entry.cfg.primary_offset,
        data,
        entry.cfg.crc_kind,
        entry.layout.slot_size,
    );
    if ok {
        entry.erase_count += 1;
        entry.state = BlockState::Valid;
        info!(block = entry.cfg.block_id, "native block written");
    } else {
        entry.state = BlockState::Invalid;
    }
    ok
}

fn read_redundant(
    entry: &mut BlockEntry,
    memif: &mut MemIf,
    out: &mut [u8],
    backup_offset: u32,
) -> ReadOutcome {
    if try_read_slot(memif, entry.cfg.primary_offset, out, entry.cfg.crc_kind) {
        entry.state = BlockState::Valid;
        return ReadOutcome::Clean;
    }

    warn!(
        block = entry.cfg.block_id,
        "primary copy failed, trying backup"
    );
    if try_read_slot(memif, backup_offset, out, entry.cfg.crc_kind) {
        info!(block = entry.cfg.block_id, "recovered from backup copy");
        entry.state = BlockState::Recovered;
        return ReadOutcome::Recovered;
    }

    entry.state = BlockState::Invalid;
    if apply_rom_fallback(entry, out) {
        ReadOutcome::RomFallback
    } else {
        ReadOutcome::Failed
    }
}

fn write_redundant(
    entry: &mut BlockEntry,
    memif: &mut MemIf,
    data: &[u8],
    backup_offset: u32,
    version_cell: Option<u32>,
) -> bool {
    // Primary first; a failure here leaves the backup untouched so the
    // previous generation stays readable.
    if !write_slot_with_crc(
        memif,
        entry.cfg.primary_offset,
        data,
        entry.cfg.crc_kind,
        entry.layout.slot_size,
    ) {
        warn!(block = entry.cfg.block_id, "primary write failed");
        entry.state = BlockState::Invalid;
        return false;
    }

    // Size-bounded read-back verification of the primary.
    if data.len() <= REDUNDANT_VERIFY_LIMIT {
        let mut readback = vec![0u8; data.len()];
        if !try_read_slot(
            memif,
            entry.cfg.primary_offset,
            &mut readback,
            entry.cfg.crc_kind,
        ) {
            warn!(block = entry.cfg.block_id, "primary verification failed");
            entry.state = BlockState::Invalid;
            return false;
        }
        memif.faults().lock().on_verify(&mut readback);
        if readback != data {
            warn!(
                block = entry.cfg.block_id,
                "primary read-back does not match written data"
            );
            entry.state = BlockState::Invalid;
            return false;
        }
    }

    // Backup failure is logged but not fatal: the primary is intact.
    if !write_slot_with_crc(
        memif,
        backup_offset,
        data,
        entry.cfg.crc_kind,
        entry.layout.slot_size,
    ) {
        warn!(
            block = entry.cfg.block_id,
            "backup write failed (primary OK)"
        );
    }

    entry.active_version = entry.active_version.wrapping_add(1);
    if let Some(cell) = version_cell {
        // The version cell owns its slot, so the erase cannot clip data.
        if memif.erase(cell, entry.layout.slot_size).is_err()
            || memif.write(cell, &[entry.active_version]).is_err()
        {
            warn!(block = entry.cfg.block_id, "version cell update failed");
        }
    }

    entry.erase_count += 1;
    entry.state = BlockState::Valid;
    info!(
        block = entry.cfg.block_id,
        version = entry.active_version,
        "redundant block written"
    );
    true
}

fn read_dataset(
    entry: &mut BlockEntry,
    memif: &mut MemIf,
    out: &mut [u8],
    count: u8,
) -> ReadOutcome {
    for step in 0..count {
        let index = (entry.active_index + step) % count;
        let offset = entry.cfg.primary_offset + u32::from(index) * entry.layout.slot_size;

        if try_read_slot(memif, offset, out, entry.cfg.crc_kind) {
            if step == 0 {
                entry.state = BlockState::Valid;
                return ReadOutcome::Clean;
            }
            warn!(
                block = entry.cfg.block_id,
                index, "dataset fell back to an older copy"
            );
            entry.state = BlockState::Recovered;
            entry.active_index = index;
            return ReadOutcome::Recovered;
        }
    }

    entry.state = BlockState::Invalid;
    if apply_rom_fallback(entry, out) {
        ReadOutcome::RomFallback
    } else {
        ReadOutcome::Failed
    }
}

fn write_dataset(entry: &mut BlockEntry, memif: &mut MemIf, data: &[u8], count: u8) -> bool {
    let next_index = (entry.active_index + 1) % count;
    let offset = entry.cfg.primary_offset + u32::from(next_index) * entry.layout.slot_size;

    if !write_slot_with_crc(
        memif,
        offset,
        data,
        entry.cfg.crc_kind,
        entry.layout.slot_size,
    ) {
        // The previous copy stays live.
        warn!(
            block = entry.cfg.block_id,
            index = next_index,
            "dataset write failed, keeping previous copy"
        );
        entry.state = BlockState::Invalid;
        return false;
    }

    entry.active_index = next_index;
    entry.erase_count += 1;
    entry.state = BlockState::Valid;
    info!(
        block = entry.cfg.block_id,
        index = next_index,
        "dataset block written"
    );
    true
}
