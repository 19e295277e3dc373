//! Error types for svarog-core.

use thiserror::Error;

use crate::block::BlockId;
use crate::config::ConfigError;
use crate::fault::FaultKind;

/// Errors surfaced by the storage-medium contract.
///
/// These map one-to-one onto the ways a byte-addressable EEPROM can refuse
/// an operation: bad addressing, alignment violations, programming over
/// non-erased cells, worn-out erase blocks, and injected power events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediumError {
    /// Geometry parameters are inconsistent (zero sizes, non-dividing units).
    #[error("invalid medium geometry: {0}")]
    BadGeometry(String),

    /// Access crosses the end of the medium.
    #[error("access out of range: addr={addr:#06x} len={len} capacity={capacity}")]
    OutOfRange {
        /// Start address of the rejected access.
        addr: u32,
        /// Length of the rejected access.
        len: usize,
        /// Medium capacity in bytes.
        capacity: u32,
    },

    /// Program start address is not page-aligned.
    #[error("program address {0:#06x} is not page-aligned")]
    UnalignedProgram(u32),

    /// Program length is not a whole number of pages.
    #[error("program length {0} is not a page multiple")]
    UnalignedLength(usize),

    /// Erase address is not erase-block-aligned.
    #[error("erase address {0:#06x} is not block-aligned")]
    UnalignedErase(u32),

    /// A target byte was not in erase state; the block needs an erase first.
    #[error("program target at {0:#06x} is not in erase state")]
    NotErased(u32),

    /// The erase block has reached its endurance limit.
    #[error("endurance exceeded on erase block {block} (limit {limit})")]
    EnduranceExceeded {
        /// Index of the worn-out erase block.
        block: u32,
        /// Configured endurance cycle limit.
        limit: u32,
    },

    /// A pre-write fault hook blocked the operation (e.g. erase timeout).
    #[error("write blocked by injected fault at {0:#06x}")]
    Blocked(u32),

    /// A post-write fault hook reported a power loss; bytes may be partial.
    #[error("power loss injected after write at {0:#06x}")]
    PowerLoss(u32),
}

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// No block with this id is registered.
    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    /// A block with this id is already registered.
    #[error("block {0} is already registered")]
    DuplicateBlock(BlockId),

    /// The block registry is at capacity.
    #[error("block registry full ({0} blocks)")]
    RegistryFull(usize),

    /// Registration is only allowed while no job is in flight.
    #[error("cannot register blocks while jobs are queued")]
    RegistrationLocked,

    /// A block configuration violates the slot layout rules.
    #[error("layout error: {0}")]
    Layout(String),

    /// The job queue is at capacity.
    #[error("job queue full")]
    QueueFull,

    /// The block rejects writes.
    #[error("block {0} is write-protected")]
    WriteProtected(BlockId),

    /// The operation requires a Dataset block.
    #[error("block {0} is not a dataset block")]
    NotDataset(BlockId),

    /// Dataset index outside `0..dataset_count`.
    #[error("dataset index {index} out of range for block {block} (count {count})")]
    DatasetIndexOutOfRange {
        /// Target block id.
        block: BlockId,
        /// Rejected index.
        index: u8,
        /// Configured dataset count.
        count: u8,
    },

    /// A seqlock snapshot did not stabilise within the retry bound.
    #[error("mirror read contended: gave up after {0} retries")]
    MirrorContended(u32),

    /// Caller buffer length does not match the mirror payload size.
    #[error("mirror size mismatch: expected {expected} bytes, got {got}")]
    MirrorSize {
        /// Mirror payload size.
        expected: usize,
        /// Caller buffer size.
        got: usize,
    },

    /// The fault configuration table is at capacity.
    #[error("fault configuration table full")]
    FaultTableFull,

    /// The fault kind has never been configured or enabled.
    #[error("fault {0:?} is not configured")]
    UnknownFault(FaultKind),

    /// Fault probability must be 0..=100.
    #[error("fault probability {0} out of range (0..=100)")]
    InvalidProbability(u8),

    /// Error reported by the storage medium driver.
    #[error("medium error: {0}")]
    Medium(#[from] MediumError),

    /// Configuration loading or validation error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for svarog-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownBlock(7);
        assert_eq!(err.to_string(), "unknown block 7");

        let err = Error::DatasetIndexOutOfRange {
            block: 3,
            index: 5,
            count: 4,
        };
        assert_eq!(
            err.to_string(),
            "dataset index 5 out of range for block 3 (count 4)"
        );
    }

    #[test]
    fn test_error_from_medium() {
        let medium = MediumError::UnalignedProgram(0x101);
        let err: Error = medium.into();
        assert!(matches!(err, Error::Medium(_)));
    }

    #[test]
    fn test_medium_error_display() {
        let err = MediumError::EnduranceExceeded {
            block: 2,
            limit: 100_000,
        };
        assert_eq!(
            err.to_string(),
            "endurance exceeded on erase block 2 (limit 100000)"
        );
    }
}
