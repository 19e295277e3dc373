//! The NVM manager: request surface, block registry and tick dispatcher.
//!
//! The manager is an owned value the host constructs and drives; there is
//! no global state. Requests record a job and return immediately;
//! completion is delivered on a later [`Svarog::main_function`] invocation
//! and polled through [`Svarog::job_result`].
//!
//! A read completion lands in the block's RAM mirror; consumers snapshot
//! it with [`Svarog::read_mirror`] (or a shared [`Svarog::mirror`] handle
//! from another thread), never through the job queue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::block::{self, BlockConfig, BlockEntry, BlockId, BlockState, BlockType, JobResult};
use crate::config::SvarogConfig;
use crate::error::{Error, Result};
use crate::fault::{FaultKind, FaultRegistry, FaultStats};
use crate::layout;
use crate::medium::{MediumDiagnostics, SimEeprom, StorageMedium};
use crate::memif::{FaultHandle, MemIf};
use crate::mirror::{MirrorSeqlock, SeqlockStatsSnapshot};
use crate::queue::{Job, JobKind, JobQueue, JobTarget};
use crate::sched::{Clock, IrqGate, VirtualClock};

/// Deadline for a queued single-block read, in ticks.
pub const READ_DEADLINE_TICKS: u64 = 2000;
/// Deadline for a queued single-block write, in ticks.
pub const WRITE_DEADLINE_TICKS: u64 = 3000;
/// Deadline for a queued `ReadAll`, in ticks.
pub const READ_ALL_DEADLINE_TICKS: u64 = 5000;
/// Deadline for a queued `WriteAll`, in ticks.
pub const WRITE_ALL_DEADLINE_TICKS: u64 = 10000;
/// Timeout strikes before a queued job is dropped.
pub const JOB_MAX_RETRIES: u8 = 3;

/// Pattern the RAM-corruption fault writes over a mirror.
const CORRUPT_PATTERN: u8 = 0xAA;

/// Completion callbacks, invoked from the dispatcher flow.
///
/// The host must not call the request API re-entrantly from inside a
/// callback. Both methods default to no-ops.
pub trait JobNotifier: Send {
    /// A job for `block` completed successfully.
    fn job_end(&mut self, _block: BlockId) {}

    /// A job for `block` failed.
    fn job_error(&mut self, _block: BlockId) {}
}

/// The default no-op notifier.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl JobNotifier for NullNotifier {}

/// Process-wide counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Jobs dispatched to completion (success or failure).
    pub jobs_processed: u64,
    /// Jobs that completed with a failure, plus jobs dropped on timeout.
    pub jobs_failed: u64,
    /// Timeout strikes recorded against queued jobs.
    pub jobs_retried: u64,
    /// Queue depth after the last dispatcher run.
    pub current_queue_depth: u64,
    /// Deepest the queue has ever been.
    pub max_queue_depth: u64,
    /// Rejected enqueues (capacity and injected overflows).
    pub queue_overflows: u64,
}

/// The NVM manager.
pub struct Svarog {
    config: SvarogConfig,
    blocks: Vec<BlockEntry>,
    queue: JobQueue,
    memif: MemIf,
    faults: FaultHandle,
    clock: Arc<dyn Clock>,
    gate: IrqGate,
    notifier: Box<dyn JobNotifier>,
    diag: Diagnostics,
    forced_overflows: u64,
    scratch: Vec<u8>,
}

impl std::fmt::Debug for Svarog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Svarog")
            .field("blocks", &self.blocks.len())
            .field("queue_depth", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl Svarog {
    /// Creates a manager over a fresh simulated medium and a virtual clock.
    pub fn new(config: SvarogConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(VirtualClock::new()))
    }

    /// Creates a manager over a fresh simulated medium and the given clock.
    pub fn with_clock(config: SvarogConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let medium = SimEeprom::new(config.medium.geometry())?;
        Self::with_parts(config, Box::new(medium), clock)
    }

    /// Creates a manager over an externally supplied medium and clock.
    pub fn with_parts(
        config: SvarogConfig,
        medium: Box<dyn StorageMedium>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let faults: FaultHandle = Arc::new(parking_lot::Mutex::new(FaultRegistry::new()));
        let memif = MemIf::new(medium, Arc::clone(&faults));
        let queue = JobQueue::new(config.queue.capacity);
        info!(
            capacity = config.medium.capacity,
            queue = config.queue.capacity,
            "manager initialised"
        );
        Ok(Self {
            config,
            blocks: Vec::new(),
            queue,
            memif,
            faults,
            clock,
            gate: IrqGate::new(),
            notifier: Box::new(NullNotifier),
            diag: Diagnostics::default(),
            forced_overflows: 0,
            scratch: Vec::new(),
        })
    }

    /// Installs the completion notifier.
    pub fn set_notifier(&mut self, notifier: Box<dyn JobNotifier>) {
        self.notifier = notifier;
    }

    /// Clears the registry, the queue, the diagnostics and the fault table.
    ///
    /// The medium keeps its contents; re-register blocks to use them again.
    pub fn reset(&mut self) {
        self.gate.with(|| self.queue.clear());
        self.blocks.clear();
        self.diag = Diagnostics::default();
        self.forced_overflows = 0;
        self.faults.lock().reset_all();
        info!("manager reset");
    }

    fn entry_index(&self, id: BlockId) -> Result<usize> {
        self.blocks
            .iter()
            .position(|e| e.cfg.block_id == id)
            .ok_or(Error::UnknownBlock(id))
    }

    /// Registers a block. Allowed only while no job is queued.
    pub fn register_block(&mut self, cfg: BlockConfig) -> Result<()> {
        if !self.queue.is_empty() {
            return Err(Error::RegistrationLocked);
        }
        if self.blocks.len() >= self.config.queue.max_blocks {
            return Err(Error::RegistryFull(self.config.queue.max_blocks));
        }
        if self.entry_index(cfg.block_id).is_ok() {
            return Err(Error::DuplicateBlock(cfg.block_id));
        }

        let geometry = self.memif.geometry();
        let slot_layout = layout::validate(&cfg, &geometry)?;

        // All registered slot regions must be pairwise disjoint.
        let new_regions = layout::regions(&cfg, &slot_layout);
        for existing in &self.blocks {
            for theirs in layout::regions(&existing.cfg, &existing.layout) {
                for ours in &new_regions {
                    if layout::overlaps(*ours, theirs) {
                        return Err(Error::Layout(format!(
                            "block {}: slot region {:#06x}+{} overlaps block {}",
                            cfg.block_id, ours.0, ours.1, existing.cfg.block_id
                        )));
                    }
                }
            }
        }

        info!(
            block = cfg.block_id,
            size = cfg.block_size,
            data = slot_layout.data_offset,
            crc = slot_layout.crc_offset,
            slot = slot_layout.slot_size,
            "block registered"
        );
        self.blocks.push(BlockEntry::new(
            cfg,
            slot_layout,
            self.config.mirror.max_read_retries,
        ));
        Ok(())
    }

    fn submit(&mut self, job: Job) -> Result<()> {
        if self.faults.lock().on_enqueue() {
            self.forced_overflows += 1;
            return Err(Error::QueueFull);
        }
        self.gate.with(|| self.queue.enqueue(job))
    }

    /// Requests an asynchronous load of the block from the medium.
    ///
    /// The payload lands in the RAM mirror once the job completes.
    pub fn read_block(&mut self, id: BlockId) -> Result<()> {
        let idx = self.entry_index(id)?;
        let entry = &self.blocks[idx];
        let job = Job {
            kind: JobKind::ReadBlock,
            target: JobTarget::Block(id),
            priority: entry.cfg.priority,
            immediate: entry.cfg.immediate,
            submit_tick: self.clock.now_ticks(),
            timeout_ticks: READ_DEADLINE_TICKS,
            retry_count: 0,
            max_retries: JOB_MAX_RETRIES,
        };
        self.submit(job)?;
        self.blocks[idx].result = JobResult::Pending;
        Ok(())
    }

    /// Requests an asynchronous flush of the RAM mirror to the medium.
    pub fn write_block(&mut self, id: BlockId) -> Result<()> {
        let idx = self.entry_index(id)?;
        let entry = &self.blocks[idx];
        if entry.cfg.write_protected {
            return Err(Error::WriteProtected(id));
        }
        let job = Job {
            kind: JobKind::WriteBlock,
            target: JobTarget::Block(id),
            priority: entry.cfg.priority,
            immediate: entry.cfg.immediate,
            submit_tick: self.clock.now_ticks(),
            timeout_ticks: WRITE_DEADLINE_TICKS,
            retry_count: 0,
            max_retries: JOB_MAX_RETRIES,
        };
        self.submit(job)?;
        self.blocks[idx].result = JobResult::Pending;
        Ok(())
    }

    /// Stores `data` in the RAM mirror and requests a flush.
    pub fn write_block_with(&mut self, id: BlockId, data: &[u8]) -> Result<()> {
        self.write_mirror(id, data)?;
        self.write_block(id)
    }

    /// Requests an asynchronous load of every registered block.
    pub fn read_all(&mut self) -> Result<()> {
        let job = Job {
            kind: JobKind::ReadAll,
            target: JobTarget::All,
            priority: 0,
            immediate: true,
            submit_tick: self.clock.now_ticks(),
            timeout_ticks: READ_ALL_DEADLINE_TICKS,
            retry_count: 0,
            max_retries: JOB_MAX_RETRIES,
        };
        self.submit(job)
    }

    /// Requests an asynchronous flush of every writable block.
    pub fn write_all(&mut self) -> Result<()> {
        let job = Job {
            kind: JobKind::WriteAll,
            target: JobTarget::All,
            priority: 0,
            immediate: true,
            submit_tick: self.clock.now_ticks(),
            timeout_ticks: WRITE_ALL_DEADLINE_TICKS,
            retry_count: 0,
            max_retries: JOB_MAX_RETRIES,
        };
        self.submit(job)
    }

    /// Latest result word for the block.
    pub fn job_result(&self, id: BlockId) -> Result<JobResult> {
        Ok(self.blocks[self.entry_index(id)?].result)
    }

    /// Observable state of the block.
    pub fn block_state(&self, id: BlockId) -> Result<BlockState> {
        Ok(self.blocks[self.entry_index(id)?].state)
    }

    /// Erase cycles this block has initiated.
    pub fn block_erase_count(&self, id: BlockId) -> Result<u32> {
        Ok(self.blocks[self.entry_index(id)?].erase_count)
    }

    /// Switches the live dataset copy without any I/O.
    pub fn set_data_index(&mut self, id: BlockId, index: u8) -> Result<()> {
        let idx = self.entry_index(id)?;
        let entry = &mut self.blocks[idx];
        let BlockType::Dataset { count } = entry.cfg.block_type else {
            return Err(Error::NotDataset(id));
        };
        if index >= count {
            return Err(Error::DatasetIndexOutOfRange {
                block: id,
                index,
                count,
            });
        }
        let previous = entry.active_index;
        entry.active_index = index;
        info!(block = id, from = previous, to = index, "dataset index switched");
        Ok(())
    }

    /// Live dataset copy index of a Dataset block.
    pub fn data_index(&self, id: BlockId) -> Result<u8> {
        let entry = &self.blocks[self.entry_index(id)?];
        match entry.cfg.block_type {
            BlockType::Dataset { .. } => Ok(entry.active_index),
            _ => Err(Error::NotDataset(id)),
        }
    }

    /// Snapshot of the block's RAM mirror into `buf`.
    ///
    /// Returns the mirror version the snapshot was taken at.
    pub fn read_mirror(&self, id: BlockId, buf: &mut [u8]) -> Result<u32> {
        let idx = self.entry_index(id)?;
        let entry = &self.blocks[idx];
        if self.faults.lock().on_mirror_read(id) {
            let _ = entry
                .mirror
                .write(&vec![CORRUPT_PATTERN; entry.cfg.block_size]);
        }
        entry.mirror.read(buf)
    }

    /// Publishes `data` into the block's RAM mirror.
    pub fn write_mirror(&self, id: BlockId, data: &[u8]) -> Result<()> {
        let idx = self.entry_index(id)?;
        self.blocks[idx].mirror.write(data)
    }

    /// Shared handle to the block's mirror for concurrent readers.
    pub fn mirror(&self, id: BlockId) -> Result<Arc<MirrorSeqlock>> {
        Ok(Arc::clone(&self.blocks[self.entry_index(id)?].mirror))
    }

    /// Seqlock statistics of the block's mirror.
    pub fn mirror_stats(&self, id: BlockId) -> Result<SeqlockStatsSnapshot> {
        Ok(self.blocks[self.entry_index(id)?].mirror.stats())
    }

    /// The dispatcher. Call once per scheduler tick.
    ///
    /// Sweeps timeouts, then drains the queue: every queued job is
    /// dispatched in this invocation. (A one-job-per-tick variant would
    /// bound per-tick latency; draining matches the reference behaviour.)
    pub fn main_function(&mut self) {
        let mut now = self.clock.now_ticks();
        if let Some(delay) = self.faults.lock().main_delay() {
            now += delay;
        }

        let sweep = self.gate.with(|| self.queue.check_timeouts(now));
        self.diag.jobs_retried += u64::from(sweep.retried);
        for job in sweep.dropped {
            self.diag.jobs_failed += 1;
            if let JobTarget::Block(id) = job.target {
                if let Ok(idx) = self.entry_index(id) {
                    self.blocks[idx].result = JobResult::NotOk;
                }
                self.notifier.job_error(id);
            }
        }

        loop {
            let Some(job) = self.gate.with(|| self.queue.dequeue()) else {
                break;
            };
            let ok = match (job.kind, job.target) {
                (JobKind::ReadBlock, JobTarget::Block(id)) => self.dispatch_read(id),
                (JobKind::WriteBlock, JobTarget::Block(id)) => self.dispatch_write(id),
                (JobKind::ReadAll, _) => self.dispatch_read_all(),
                (JobKind::WriteAll, _) => self.dispatch_write_all(),
                (kind, target) => {
                    error!(?kind, ?target, "malformed job");
                    false
                }
            };
            self.diag.jobs_processed += 1;
            if !ok {
                self.diag.jobs_failed += 1;
            }
        }
    }

    fn dispatch_read(&mut self, id: BlockId) -> bool {
        match self.entry_index(id) {
            Ok(idx) => self.dispatch_read_at(idx),
            Err(_) => {
                error!(block = id, "read job for unknown block");
                false
            }
        }
    }

    fn dispatch_read_at(&mut self, idx: usize) -> bool {
        let size = self.blocks[idx].cfg.block_size;
        let id = self.blocks[idx].cfg.block_id;
        debug!(block = id, size, "dispatching read");

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(size, 0);

        let outcome = block::read_block(&mut self.blocks[idx], &mut self.memif, &mut scratch[..size]);
        if outcome.has_payload() {
            // Publish the read result (or the ROM default) to consumers.
            let _ = self.blocks[idx].mirror.write(&scratch[..size]);
        }
        self.scratch = scratch;

        let ok = outcome.is_ok();
        self.blocks[idx].result = if ok { JobResult::Ok } else { JobResult::NotOk };
        if ok {
            self.notifier.job_end(id);
        } else {
            self.notifier.job_error(id);
        }
        ok
    }

    fn dispatch_write(&mut self, id: BlockId) -> bool {
        match self.entry_index(id) {
            Ok(idx) => self.dispatch_write_at(idx),
            Err(_) => {
                error!(block = id, "write job for unknown block");
                false
            }
        }
    }

    fn dispatch_write_at(&mut self, idx: usize) -> bool {
        let size = self.blocks[idx].cfg.block_size;
        let id = self.blocks[idx].cfg.block_id;
        debug!(block = id, size, "dispatching write");

        if self.faults.lock().on_mirror_read(id) {
            let _ = self.blocks[idx].mirror.write(&vec![CORRUPT_PATTERN; size]);
        }

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(size, 0);

        let ok = match self.blocks[idx].mirror.read(&mut scratch[..size]) {
            Ok(_) => block::write_block(&mut self.blocks[idx], &mut self.memif, &scratch[..size]),
            Err(err) => {
                error!(block = id, %err, "mirror snapshot failed before write");
                self.blocks[idx].state = BlockState::Invalid;
                false
            }
        };
        self.scratch = scratch;

        self.blocks[idx].result = if ok { JobResult::Ok } else { JobResult::NotOk };
        if ok {
            self.notifier.job_end(id);
        } else {
            self.notifier.job_error(id);
        }
        ok
    }

    fn dispatch_read_all(&mut self) -> bool {
        info!("ReadAll: loading all blocks in registration order");
        let mut all_ok = true;
        for idx in 0..self.blocks.len() {
            if !self.dispatch_read_at(idx) {
                warn!(block = self.blocks[idx].cfg.block_id, "ReadAll: block failed");
                all_ok = false;
            }
        }
        all_ok
    }

    fn dispatch_write_all(&mut self) -> bool {
        info!("WriteAll: flushing all writable blocks in registration order");
        self.memif.set_write_all_phase(true);
        let mut all_ok = true;
        for idx in 0..self.blocks.len() {
            if self.blocks[idx].cfg.write_protected {
                debug!(
                    block = self.blocks[idx].cfg.block_id,
                    "WriteAll: skipping write-protected block"
                );
                continue;
            }
            if !self.dispatch_write_at(idx) {
                warn!(block = self.blocks[idx].cfg.block_id, "WriteAll: block failed");
                all_ok = false;
            }
        }
        self.memif.set_write_all_phase(false);
        all_ok
    }

    /// Snapshot of the process-wide counters.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        let mut diag = self.diag;
        diag.current_queue_depth = self.queue.len() as u64;
        diag.max_queue_depth = self.queue.watermark() as u64;
        diag.queue_overflows = self.queue.overflows() + self.forced_overflows;
        diag
    }

    /// Driver-level I/O counters.
    #[must_use]
    pub fn medium_diagnostics(&self) -> MediumDiagnostics {
        self.memif.medium_diagnostics()
    }

    // ---------------------------------------------------------------------
    // Fault-injection surface (test-time entry points)
    // ---------------------------------------------------------------------

    /// Enables a fault kind.
    pub fn fault_enable(&self, kind: FaultKind) -> Result<()> {
        self.faults.lock().enable(kind)
    }

    /// Disables a fault kind.
    pub fn fault_disable(&self, kind: FaultKind) -> Result<()> {
        self.faults.lock().disable(kind)
    }

    /// Configures targeting, trigger budget and probability for a fault.
    pub fn fault_configure(
        &self,
        kind: FaultKind,
        target_block: Option<BlockId>,
        trigger_limit: u16,
        probability_percent: u8,
    ) -> Result<()> {
        self.faults
            .lock()
            .configure(kind, target_block, trigger_limit, probability_percent)
    }

    /// Snapshot of the injection statistics.
    #[must_use]
    pub fn fault_stats(&self) -> FaultStats {
        self.faults.lock().stats()
    }

    /// Clears the injection statistics and re-seeds the roll generator.
    pub fn fault_reset_stats(&self) {
        self.faults.lock().reset_stats();
    }

    /// Drops every fault configuration.
    pub fn fault_reset_all(&self) {
        self.faults.lock().reset_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::CrcKind;

    fn manager() -> Svarog {
        Svarog::new(SvarogConfig::default()).unwrap()
    }

    #[test]
    fn test_register_and_duplicate() {
        let mut nvm = manager();
        nvm.register_block(BlockConfig::new(0, 256, 0).crc(CrcKind::Crc16))
            .unwrap();
        let err = nvm.register_block(BlockConfig::new(0, 64, 0x0400));
        assert!(matches!(err, Err(Error::DuplicateBlock(0))));
    }

    #[test]
    fn test_overlapping_registration_rejected() {
        let mut nvm = manager();
        nvm.register_block(
            BlockConfig::new(0, 256, 0x1000)
                .crc(CrcKind::Crc16)
                .redundant(0x1400, None),
        )
        .unwrap();
        // The backup slot of block 0 occupies 0x1400.
        let err = nvm.register_block(BlockConfig::new(1, 256, 0x1400));
        assert!(matches!(err, Err(Error::Layout(_))));
    }

    #[test]
    fn test_registration_locked_while_jobs_queued() {
        let mut nvm = manager();
        nvm.register_block(BlockConfig::new(0, 256, 0).crc(CrcKind::Crc16))
            .unwrap();
        nvm.read_block(0).unwrap();
        let err = nvm.register_block(BlockConfig::new(1, 256, 0x0400));
        assert!(matches!(err, Err(Error::RegistrationLocked)));

        nvm.main_function();
        nvm.register_block(BlockConfig::new(1, 256, 0x0400)).unwrap();
    }

    #[test]
    fn test_result_pending_until_tick() {
        let mut nvm = manager();
        nvm.register_block(BlockConfig::new(0, 256, 0).crc(CrcKind::Crc16))
            .unwrap();
        nvm.write_block_with(0, &[0x42; 256]).unwrap();
        assert_eq!(nvm.job_result(0).unwrap(), JobResult::Pending);

        nvm.main_function();
        assert_eq!(nvm.job_result(0).unwrap(), JobResult::Ok);
        assert_eq!(nvm.block_state(0).unwrap(), BlockState::Valid);
    }

    #[test]
    fn test_write_protected_rejected_synchronously() {
        let mut nvm = manager();
        nvm.register_block(BlockConfig::new(0, 64, 0).write_protected())
            .unwrap();
        let err = nvm.write_block(0);
        assert!(matches!(err, Err(Error::WriteProtected(0))));
    }

    #[test]
    fn test_set_data_index_validation() {
        let mut nvm = manager();
        nvm.register_block(BlockConfig::new(0, 64, 0))
            .unwrap();
        nvm.register_block(BlockConfig::new(1, 64, 0x0400).dataset(3))
            .unwrap();

        assert!(matches!(
            nvm.set_data_index(0, 0),
            Err(Error::NotDataset(0))
        ));
        assert!(matches!(
            nvm.set_data_index(1, 3),
            Err(Error::DatasetIndexOutOfRange { .. })
        ));
        nvm.set_data_index(1, 2).unwrap();
    }

    #[test]
    fn test_unknown_block_errors() {
        let mut nvm = manager();
        assert!(matches!(nvm.read_block(9), Err(Error::UnknownBlock(9))));
        assert!(matches!(nvm.job_result(9), Err(Error::UnknownBlock(9))));
        assert!(matches!(nvm.block_state(9), Err(Error::UnknownBlock(9))));
    }

    #[test]
    fn test_forced_queue_overflow_fault() {
        let mut nvm = manager();
        nvm.register_block(BlockConfig::new(0, 64, 0)).unwrap();
        nvm.fault_enable(FaultKind::QueueOverflow).unwrap();

        let err = nvm.read_block(0);
        assert!(matches!(err, Err(Error::QueueFull)));
        assert_eq!(nvm.diagnostics().queue_overflows, 1);

        nvm.fault_disable(FaultKind::QueueOverflow).unwrap();
        nvm.read_block(0).unwrap();
    }

    #[test]
    fn test_diagnostics_counts() {
        let mut nvm = manager();
        nvm.register_block(BlockConfig::new(0, 256, 0).crc(CrcKind::Crc16))
            .unwrap();
        nvm.write_block_with(0, &[1; 256]).unwrap();
        nvm.read_block(0).unwrap();
        nvm.main_function();

        let diag = nvm.diagnostics();
        assert_eq!(diag.jobs_processed, 2);
        assert_eq!(diag.jobs_failed, 0);
        assert_eq!(diag.current_queue_depth, 0);
        assert_eq!(diag.max_queue_depth, 2);
    }

    #[test]
    fn test_notifier_callbacks() {
        #[derive(Default)]
        struct Recorder {
            ends: Vec<BlockId>,
            errors: Vec<BlockId>,
        }
        struct Sink(std::sync::Arc<parking_lot::Mutex<Recorder>>);
        impl JobNotifier for Sink {
            fn job_end(&mut self, block: BlockId) {
                self.0.lock().ends.push(block);
            }
            fn job_error(&mut self, block: BlockId) {
                self.0.lock().errors.push(block);
            }
        }

        let recorder = std::sync::Arc::new(parking_lot::Mutex::new(Recorder::default()));
        let mut nvm = manager();
        nvm.set_notifier(Box::new(Sink(std::sync::Arc::clone(&recorder))));

        nvm.register_block(BlockConfig::new(0, 256, 0).crc(CrcKind::Crc16))
            .unwrap();
        nvm.write_block_with(0, &[7; 256]).unwrap();
        nvm.main_function();

        // A read of a never-written block with no ROM default fails.
        nvm.register_block(BlockConfig::new(1, 256, 0x0400).crc(CrcKind::Crc16))
            .unwrap();
        nvm.read_block(1).unwrap();
        nvm.main_function();

        let recorder = recorder.lock();
        assert_eq!(recorder.ends, vec![0]);
        assert_eq!(recorder.errors, vec![1]);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut nvm = manager();
        nvm.register_block(BlockConfig::new(0, 64, 0)).unwrap();
        nvm.write_block_with(0, &[1; 64]).unwrap();
        nvm.reset();

        assert!(matches!(nvm.job_result(0), Err(Error::UnknownBlock(0))));
        assert_eq!(nvm.diagnostics().jobs_processed, 0);
    }
}
