//! Slot layout calculation and registration-time validation.
//!
//! A slot is a fixed-size, erase-block-aligned region hosting one copy of a
//! block: payload, parity word, reserved padding. The calculator maps a
//! block configuration onto concrete offsets and rejects anything that
//! would let two slots overlap or put the parity word inside a payload
//! page.

use crate::block::{BlockConfig, BlockType};
use crate::error::{Error, Result};
use crate::medium::Geometry;

/// Most dataset copies a single block may rotate through.
pub const MAX_DATASET_SLOTS: u8 = 8;

/// Concrete on-medium layout of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    /// Offset of the payload region (the slot start).
    pub data_offset: u32,
    /// Payload size in bytes.
    pub data_size: usize,
    /// Offset of the parity word.
    pub crc_offset: u32,
    /// Parity word size in bytes.
    pub crc_size: usize,
    /// Total slot span in bytes.
    pub slot_size: u32,
}

/// Computes the slot layout for a block without validating it.
#[must_use]
pub fn compute(cfg: &BlockConfig, geometry: &Geometry) -> SlotLayout {
    let slot_size = geometry.block_size;
    SlotLayout {
        data_offset: cfg.primary_offset,
        data_size: cfg.block_size,
        crc_offset: cfg.primary_offset + cfg.block_size as u32,
        crc_size: cfg.crc_kind.width(),
        slot_size,
    }
}

/// Validates a block configuration against the medium geometry and returns
/// its layout.
///
/// Enforced invariants:
///
/// - the slot offset is slot-aligned and the slot fits on the medium,
/// - `block_size + crc_size <= slot_size`,
/// - a parity word, when present, starts on a page boundary,
/// - a redundant backup slot is aligned, behind the primary, and on-medium,
/// - a version cell occupies its own dedicated slot,
/// - a dataset span of `count` consecutive slots fits on the medium.
pub fn validate(cfg: &BlockConfig, geometry: &Geometry) -> Result<SlotLayout> {
    let layout = compute(cfg, geometry);
    let slot = layout.slot_size;

    if cfg.block_size == 0 {
        return Err(Error::Layout(format!(
            "block {}: payload size must be non-zero",
            cfg.block_id
        )));
    }
    if cfg.primary_offset % slot != 0 {
        return Err(Error::Layout(format!(
            "block {}: offset {:#06x} is not aligned to the {slot}-byte slot",
            cfg.block_id, cfg.primary_offset
        )));
    }
    if cfg.block_size + layout.crc_size > slot as usize {
        return Err(Error::Layout(format!(
            "block {}: payload {} + crc {} exceeds slot size {slot}",
            cfg.block_id, cfg.block_size, layout.crc_size
        )));
    }
    if layout.crc_size > 0 && !geometry.is_page_aligned(layout.crc_offset) {
        return Err(Error::Layout(format!(
            "block {}: crc offset {:#06x} is not page-aligned",
            cfg.block_id, layout.crc_offset
        )));
    }

    let check_slot_on_medium = |what: &str, offset: u32, span: u32| -> Result<()> {
        if offset % slot != 0 {
            return Err(Error::Layout(format!(
                "block {}: {what} offset {offset:#06x} is not slot-aligned",
                cfg.block_id
            )));
        }
        if u64::from(offset) + u64::from(span) > u64::from(geometry.capacity) {
            return Err(Error::Layout(format!(
                "block {}: {what} at {offset:#06x} (+{span}) exceeds capacity {}",
                cfg.block_id, geometry.capacity
            )));
        }
        Ok(())
    };

    check_slot_on_medium("primary slot", cfg.primary_offset, slot)?;

    match cfg.block_type {
        BlockType::Native => {}
        BlockType::Redundant {
            backup_offset,
            version_cell,
        } => {
            check_slot_on_medium("backup slot", backup_offset, slot)?;
            if backup_offset < cfg.primary_offset + slot {
                return Err(Error::Layout(format!(
                    "block {}: backup slot {backup_offset:#06x} overlaps the primary",
                    cfg.block_id
                )));
            }
            if let Some(cell) = version_cell {
                // The version cell lives in its own slot: programming the
                // single byte erases the covering block, which must not host
                // any other data.
                check_slot_on_medium("version cell", cell, slot)?;
            }
        }
        BlockType::Dataset { count } => {
            if count == 0 || count > MAX_DATASET_SLOTS {
                return Err(Error::Layout(format!(
                    "block {}: dataset count {count} outside 1..={MAX_DATASET_SLOTS}",
                    cfg.block_id
                )));
            }
            check_slot_on_medium("dataset span", cfg.primary_offset, u32::from(count) * slot)?;
        }
    }

    Ok(layout)
}

/// Slot-granular regions `(offset, len)` a block occupies on the medium.
///
/// Used for the registry-wide disjointness check.
#[must_use]
pub(crate) fn regions(cfg: &BlockConfig, layout: &SlotLayout) -> Vec<(u32, u32)> {
    let slot = layout.slot_size;
    match cfg.block_type {
        BlockType::Native => vec![(cfg.primary_offset, slot)],
        BlockType::Redundant {
            backup_offset,
            version_cell,
        } => {
            let mut regions = vec![(cfg.primary_offset, slot), (backup_offset, slot)];
            if let Some(cell) = version_cell {
                regions.push((cell, slot));
            }
            regions
        }
        BlockType::Dataset { count } => {
            vec![(cfg.primary_offset, u32::from(count) * slot)]
        }
    }
}

/// Whether two `(offset, len)` regions overlap.
pub(crate) fn overlaps(a: (u32, u32), b: (u32, u32)) -> bool {
    let (a_start, a_len) = a;
    let (b_start, b_len) = b;
    u64::from(a_start) < u64::from(b_start) + u64::from(b_len)
        && u64::from(b_start) < u64::from(a_start) + u64::from(a_len)
}
