//! # `Svarog` Core
//!
//! A non-volatile memory manager over simulated EEPROM, written in Rust.
//!
//! `Svarog` shields application code from the idiosyncrasies of
//! byte-addressable EEPROM: page-granular programming, block-granular
//! erase, limited endurance, transient bit errors and power interruption.
//! It owns the mapping between named logical blocks held as RAM mirrors
//! and their persistent slots, coordinates asynchronous jobs that move
//! data between them, and guarantees that a reader always obtains either
//! the last committed image or a defined fallback.
//!
//! ## Features
//!
//! - **Three block flavours**: Native, Redundant (primary + backup
//!   failover) and Dataset (round-robin multi-version)
//! - **CRC-protected slots**: CRC-8 / CRC-16-CCITT / CRC-32 per block
//! - **Priority job queue**: bounded, immediate-boost, FIFO within a
//!   priority class, timeout and retry book-keeping
//! - **Lock-free RAM mirrors**: seqlock snapshots for concurrent readers,
//!   with a versioned meta word as the ABA defence
//! - **Fault injection**: the P0 taxonomy (power loss, bit flips, CRC
//!   inversion, queue overflow, ...) with deterministic replay
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use svarog_core::{BlockConfig, CrcKind, JobResult, Svarog, SvarogConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut nvm = Svarog::new(SvarogConfig::default())?;
//!
//!     // One native block: 256 bytes, CRC-16, slot at offset 0.
//!     nvm.register_block(BlockConfig::new(0, 256, 0x0000).crc(CrcKind::Crc16))?;
//!
//!     // Requests are asynchronous: they queue a job and return.
//!     nvm.write_block_with(0, &[0xAA; 256])?;
//!
//!     // The dispatcher runs on the scheduler tick.
//!     while nvm.job_result(0)? == JobResult::Pending {
//!         nvm.main_function();
//!     }
//!
//!     // Consumers snapshot the RAM mirror, never the queue.
//!     let mut image = [0u8; 256];
//!     nvm.read_mirror(0, &mut image)?;
//!     assert_eq!(image, [0xAA; 256]);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
// Clippy lints configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(
    test,
    allow(
        clippy::large_stack_arrays,
        clippy::doc_markdown,
        clippy::uninlined_format_args
    )
)]

pub mod block;
pub mod config;
pub mod crc;
pub mod error;
pub mod fault;
pub mod layout;
pub mod manager;
pub mod medium;
pub mod memif;
pub mod mirror;
pub mod queue;
pub mod sched;

pub use block::{BlockConfig, BlockId, BlockState, BlockType, JobResult};
pub use config::{ConfigError, MediumConfig, MirrorConfig, QueueConfig, SvarogConfig};
pub use crc::CrcKind;
pub use error::{Error, MediumError, Result};
pub use fault::{FaultConfig, FaultKind, FaultStats};
pub use manager::{Diagnostics, JobNotifier, NullNotifier, Svarog};
pub use medium::{Geometry, MediumDiagnostics, SimEeprom, StorageMedium, ERASED_BYTE};
pub use mirror::{MirrorSeqlock, SeqlockStatsSnapshot, SEQLOCK_MAX_RETRIES};
pub use queue::{Job, JobKind, JobQueue, JobTarget};
pub use sched::{Clock, IrqGate, VirtualClock};
