//! Fault-injection framework.
//!
//! A bounded registry of fault configurations consulted from hook points
//! inside the memory-interface shim, the parity engine, the mirror accessors
//! and the job queue. With no faults enabled every hook is a no-op and the
//! core behaves identically to a build without the framework.
//!
//! Triggering is deterministic: the probability roll uses a seeded LCG so a
//! failing scenario replays bit-for-bit.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::block::BlockId;
use crate::crc::CrcKind;
use crate::error::{Error, Result};

/// Upper bound on simultaneously held fault configurations.
pub const FAULT_MAX_CONFIGS: usize = 16;

/// Extra ticks reported by the main-delay fault, modelling a dispatcher
/// invocation that ran long.
pub const MAIN_DELAY_TICKS: u64 = 50;

const LCG_SEED: u32 = 12345;

/// The fault taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// Power loss during a page program; the shim reports failure after the
    /// bytes (possibly partially) landed.
    PowerLossPageProgram,
    /// Power loss during the WriteAll phase specifically.
    PowerLossWriteAll,
    /// Single bit flip in a buffer returned by a read.
    BitFlipSingle,
    /// Bit flips across the first few bytes returned by a read.
    BitFlipMulti,
    /// Artificial delay added to the dispatcher tick.
    MainFunctionDelay,
    /// Erase/program blocked before it starts.
    EraseTimeout,
    /// Computed parity word inverted at engine exit.
    CrcInvert,
    /// Read-back verification buffer corrupted.
    WriteVerifyFail,
    /// RAM mirror overwritten before a mirror read.
    RamCorrupt,
    /// Forced enqueue failure.
    QueueOverflow,
}

/// One configured fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Which fault this entry configures.
    pub kind: FaultKind,
    /// Whether the fault currently fires.
    pub enabled: bool,
    /// Restrict firing to one block; `None` is the wildcard.
    ///
    /// Only hooks that know the block honour the filter (mirror corruption);
    /// medium-level hooks fire regardless of target.
    pub target_block: Option<BlockId>,
    /// Fire at most this many times; 0 means unlimited.
    pub trigger_limit: u16,
    /// Times this entry has fired since (re)configuration.
    pub triggered: u16,
    /// Probability of firing per opportunity; 0 means always.
    pub probability_percent: u8,
}

impl FaultConfig {
    fn new(kind: FaultKind) -> Self {
        Self {
            kind,
            enabled: false,
            target_block: None,
            trigger_limit: 0,
            triggered: 0,
            probability_percent: 0,
        }
    }
}

/// Aggregate injection statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultStats {
    /// Total faults actually injected.
    pub total_injected: u32,
}

/// The process-wide fault table.
#[derive(Debug)]
pub struct FaultRegistry {
    configs: Vec<FaultConfig>,
    stats: FaultStats,
    rng_state: u32,
}

impl Default for FaultRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultRegistry {
    /// Creates an empty registry with the deterministic seed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            configs: Vec::new(),
            stats: FaultStats::default(),
            rng_state: LCG_SEED,
        }
    }

    /// LCG roll in 0..1000.
    fn random_permille(&mut self) -> u16 {
        self.rng_state = self.rng_state.wrapping_mul(1_103_515_245).wrapping_add(12345);
        #[allow(clippy::cast_possible_truncation)] // bounded by % 1000
        {
            ((self.rng_state / 65536) % 1000) as u16
        }
    }

    fn find(&mut self, kind: FaultKind) -> Option<&mut FaultConfig> {
        self.configs.iter_mut().find(|c| c.kind == kind)
    }

    fn find_or_create(&mut self, kind: FaultKind) -> Result<&mut FaultConfig> {
        if let Some(idx) = self.configs.iter().position(|c| c.kind == kind) {
            return Ok(&mut self.configs[idx]);
        }
        if self.configs.len() >= FAULT_MAX_CONFIGS {
            return Err(Error::FaultTableFull);
        }
        self.configs.push(FaultConfig::new(kind));
        Ok(self.configs.last_mut().expect("just pushed"))
    }

    /// Enables a fault, creating a default configuration if needed.
    pub fn enable(&mut self, kind: FaultKind) -> Result<()> {
        let config = self.find_or_create(kind)?;
        config.enabled = true;
        info!(?kind, "fault enabled");
        Ok(())
    }

    /// Disables a fault.
    pub fn disable(&mut self, kind: FaultKind) -> Result<()> {
        match self.find(kind) {
            Some(config) => {
                config.enabled = false;
                info!(?kind, "fault disabled");
                Ok(())
            }
            None => Err(Error::UnknownFault(kind)),
        }
    }

    /// Whether the fault is currently enabled.
    #[must_use]
    pub fn is_enabled(&self, kind: FaultKind) -> bool {
        self.configs.iter().any(|c| c.kind == kind && c.enabled)
    }

    /// Configures targeting, trigger budget and probability for a fault.
    ///
    /// Resets the fired counter; does not change the enabled flag.
    pub fn configure(
        &mut self,
        kind: FaultKind,
        target_block: Option<BlockId>,
        trigger_limit: u16,
        probability_percent: u8,
    ) -> Result<()> {
        if probability_percent > 100 {
            return Err(Error::InvalidProbability(probability_percent));
        }
        let config = self.find_or_create(kind)?;
        config.target_block = target_block;
        config.trigger_limit = trigger_limit;
        config.probability_percent = probability_percent;
        config.triggered = 0;
        info!(
            ?kind,
            target = ?target_block,
            trigger_limit,
            probability_percent,
            "fault configured"
        );
        Ok(())
    }

    /// Snapshot of the injection statistics.
    #[must_use]
    pub fn stats(&self) -> FaultStats {
        self.stats
    }

    /// Clears the statistics and re-seeds the probability generator.
    pub fn reset_stats(&mut self) {
        self.stats = FaultStats::default();
        self.rng_state = LCG_SEED;
        info!("fault statistics reset");
    }

    /// Drops every configuration and clears the statistics.
    pub fn reset_all(&mut self) {
        self.configs.clear();
        self.reset_stats();
    }

    /// Current configuration of a fault, if any.
    #[must_use]
    pub fn config(&self, kind: FaultKind) -> Option<FaultConfig> {
        self.configs.iter().find(|c| c.kind == kind).copied()
    }

    /// Decides whether `kind` fires now, consuming a trigger and a roll.
    fn fire(&mut self, kind: FaultKind, block: Option<BlockId>) -> bool {
        let roll_needed;
        {
            let Some(config) = self.find(kind) else {
                return false;
            };
            if !config.enabled {
                return false;
            }
            if config.trigger_limit > 0 && config.triggered >= config.trigger_limit {
                return false;
            }
            if let (Some(target), Some(candidate)) = (config.target_block, block) {
                if target != candidate {
                    return false;
                }
            }
            roll_needed = config.probability_percent > 0;
        }

        if roll_needed {
            let roll = self.random_permille();
            let config = self.find(kind).expect("checked above");
            if roll >= u16::from(config.probability_percent) * 10 {
                return false;
            }
        }

        let config = self.find(kind).expect("checked above");
        config.triggered += 1;
        self.stats.total_injected += 1;
        true
    }

    // ---------------------------------------------------------------------
    // Hook points
    // ---------------------------------------------------------------------

    /// Post-read hook: may flip bits in the returned buffer.
    ///
    /// Returns whether the buffer was altered.
    pub fn after_read(&mut self, data: &mut [u8]) -> bool {
        if data.is_empty() {
            return false;
        }

        if self.fire(FaultKind::BitFlipSingle, None) {
            data[0] ^= 0x01;
            warn!("injected single bit flip at offset 0");
            return true;
        }

        if self.fire(FaultKind::BitFlipMulti, None) {
            let span = data.len().min(4);
            for byte in &mut data[..span] {
                *byte ^= 0xFF;
            }
            warn!(bytes = span, "injected multi-bit flip");
            return true;
        }

        false
    }

    /// Pre-write hook: returns `true` when the write must be blocked.
    pub fn before_write(&mut self, addr: u32) -> bool {
        if self.fire(FaultKind::EraseTimeout, None) {
            warn!(addr, "injected erase timeout");
            return true;
        }
        false
    }

    /// Post-write hook: returns `true` when a power loss is to be reported.
    ///
    /// `write_all_phase` selects the WriteAll-specific fault kind in
    /// addition to the general page-program one.
    pub fn after_write(&mut self, addr: u32, write_all_phase: bool) -> bool {
        if self.fire(FaultKind::PowerLossPageProgram, None) {
            warn!(addr, "injected power loss after page program");
            return true;
        }
        if write_all_phase && self.fire(FaultKind::PowerLossWriteAll, None) {
            warn!(addr, "injected power loss during WriteAll");
            return true;
        }
        false
    }

    /// CRC engine exit hook: may invert the computed parity word.
    #[must_use]
    pub fn on_crc(&mut self, crc: u32, kind: CrcKind) -> u32 {
        if self.fire(FaultKind::CrcInvert, None) {
            let inverted = !crc & kind.mask();
            warn!(
                computed = format_args!("{crc:#x}"),
                injected = format_args!("{inverted:#x}"),
                "injected CRC inversion"
            );
            return inverted;
        }
        crc
    }

    /// Post-verify hook: may corrupt the read-back buffer so the comparison
    /// fails. Returns whether the buffer was altered.
    pub fn on_verify(&mut self, readback: &mut [u8]) -> bool {
        if readback.is_empty() {
            return false;
        }
        if self.fire(FaultKind::WriteVerifyFail, None) {
            readback[0] = !readback[0];
            warn!("injected write-verify failure");
            return true;
        }
        false
    }

    /// Pre-mirror-read hook: returns `true` when the mirror payload is to be
    /// overwritten before the read.
    pub fn on_mirror_read(&mut self, block: BlockId) -> bool {
        if self.fire(FaultKind::RamCorrupt, Some(block)) {
            warn!(block, "injected RAM corruption");
            return true;
        }
        false
    }

    /// Enqueue hook: returns `true` when the enqueue must be rejected.
    pub fn on_enqueue(&mut self) -> bool {
        if self.fire(FaultKind::QueueOverflow, None) {
            warn!("injected queue overflow");
            return true;
        }
        false
    }

    /// Tick hook: extra ticks to add to the dispatcher's view of "now".
    pub fn main_delay(&mut self) -> Option<u64> {
        if self.fire(FaultKind::MainFunctionDelay, None) {
            warn!(ticks = MAIN_DELAY_TICKS, "injected MainFunction delay");
            return Some(MAIN_DELAY_TICKS);
        }
        None
    }
}
