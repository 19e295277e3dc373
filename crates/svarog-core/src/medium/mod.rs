//! Storage medium contract: byte read, page program, block erase.
//!
//! The core consumes this trait and nothing else from the physical layer.
//! [`SimEeprom`] is the bundled RAM-backed implementation used by the test
//! harness and the default manager constructor.

mod sim;

pub use sim::SimEeprom;

use serde::{Deserialize, Serialize};

use crate::error::MediumError;

/// Byte value of an erased cell.
pub const ERASED_BYTE: u8 = 0xFF;

/// Physical geometry of a medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// Total capacity in bytes.
    pub capacity: u32,
    /// Program granularity in bytes.
    pub page_size: u32,
    /// Erase granularity in bytes.
    pub block_size: u32,
    /// Erase cycles each block survives.
    pub endurance: u32,
}

impl Geometry {
    /// Validates the internal consistency of the geometry.
    ///
    /// Pages must divide blocks, blocks must divide the capacity, and all
    /// units must be non-zero.
    pub fn validate(&self) -> Result<(), MediumError> {
        if self.capacity == 0 || self.page_size == 0 || self.block_size == 0 {
            return Err(MediumError::BadGeometry(
                "capacity, page size and block size must be non-zero".into(),
            ));
        }
        if self.block_size % self.page_size != 0 {
            return Err(MediumError::BadGeometry(format!(
                "block size {} is not a multiple of page size {}",
                self.block_size, self.page_size
            )));
        }
        if self.capacity % self.block_size != 0 {
            return Err(MediumError::BadGeometry(format!(
                "capacity {} is not a multiple of block size {}",
                self.capacity, self.block_size
            )));
        }
        if self.endurance == 0 {
            return Err(MediumError::BadGeometry("endurance must be non-zero".into()));
        }
        Ok(())
    }

    /// Whether `addr` sits on a page boundary.
    #[must_use]
    pub fn is_page_aligned(&self, addr: u32) -> bool {
        addr % self.page_size == 0
    }

    /// Whether `addr` sits on an erase-block boundary.
    #[must_use]
    pub fn is_block_aligned(&self, addr: u32) -> bool {
        addr % self.block_size == 0
    }

    /// Erase-block index containing `addr`.
    #[must_use]
    pub fn block_index(&self, addr: u32) -> u32 {
        addr / self.block_size
    }

    /// Number of erase blocks on the medium.
    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.capacity / self.block_size
    }
}

/// I/O counters maintained by a medium implementation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediumDiagnostics {
    /// Completed read operations.
    pub reads: u64,
    /// Completed program operations.
    pub writes: u64,
    /// Completed erase operations.
    pub erases: u64,
    /// Bytes returned by reads.
    pub bytes_read: u64,
    /// Bytes accepted by programs.
    pub bytes_written: u64,
    /// Highest per-block erase count seen so far.
    pub max_erase_count: u32,
}

/// The byte-level storage contract the core consumes.
///
/// Semantics are bit-exact:
///
/// - `read` accepts arbitrary address and length within capacity.
/// - `program` demands a page-aligned address, a page-multiple length, and
///   every target byte in erase state.
/// - `erase` demands a block-aligned address, restores the whole block to
///   [`ERASED_BYTE`], counts the cycle and fails once endurance is spent.
pub trait StorageMedium: Send {
    /// Reports the medium geometry.
    fn geometry(&self) -> Geometry;

    /// Reads `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), MediumError>;

    /// Programs `data` starting at the page-aligned `addr`.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), MediumError>;

    /// Erases the block beginning at `addr`.
    fn erase(&mut self, addr: u32) -> Result<(), MediumError>;

    /// Erase cycles consumed by the given erase block.
    fn erase_count(&self, block_index: u32) -> u32;

    /// Snapshot of the I/O counters.
    fn diagnostics(&self) -> MediumDiagnostics;
}
