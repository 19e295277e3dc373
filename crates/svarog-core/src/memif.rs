//! Memory-interface shim: the single serialised surface above the driver.
//!
//! Every physical I/O the core performs passes through here; there is no
//! bypass. The shim translates logical writes into aligned page programs
//! (padding the tail with erase-state filler), expands erases into
//! block-granular driver calls, and consults the fault hooks at the medium
//! boundary.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::MediumError;
use crate::fault::FaultRegistry;
use crate::medium::{Geometry, MediumDiagnostics, StorageMedium, ERASED_BYTE};

/// Shared handle to the fault registry.
///
/// The registry is consulted from the shim, the block engine and the
/// manager; a `parking_lot::Mutex` keeps the handle cheap to clone while
/// the single manager flow remains the only mutator.
pub type FaultHandle = Arc<Mutex<FaultRegistry>>;

/// The shim owning the only active storage job at any instant.
pub struct MemIf {
    medium: Box<dyn StorageMedium>,
    faults: FaultHandle,
    geometry: Geometry,
    write_all_phase: bool,
}

impl std::fmt::Debug for MemIf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemIf")
            .field("geometry", &self.geometry)
            .field("write_all_phase", &self.write_all_phase)
            .finish_non_exhaustive()
    }
}

impl MemIf {
    /// Wraps a driver and a fault registry.
    #[must_use]
    pub fn new(medium: Box<dyn StorageMedium>, faults: FaultHandle) -> Self {
        let geometry = medium.geometry();
        Self {
            medium,
            faults,
            geometry,
            write_all_phase: false,
        }
    }

    /// Medium geometry.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// The shared fault registry handle.
    #[must_use]
    pub fn faults(&self) -> &FaultHandle {
        &self.faults
    }

    /// Marks subsequent writes as belonging to a WriteAll dispatch.
    pub fn set_write_all_phase(&mut self, active: bool) {
        self.write_all_phase = active;
    }

    /// Reads `buf.len()` bytes at `addr`.
    ///
    /// The post-read fault hook runs after the bytes are in memory and may
    /// corrupt them.
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), MediumError> {
        self.medium.read(addr, buf)?;
        self.faults.lock().after_read(buf);
        Ok(())
    }

    /// Writes `data` at the page-aligned `addr`.
    ///
    /// The caller has arranged that the target pages are in erase state.
    /// The logical length is padded with erase-state filler to the page
    /// multiple before programming.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), MediumError> {
        if self.faults.lock().before_write(addr) {
            return Err(MediumError::Blocked(addr));
        }
        if !self.geometry.is_page_aligned(addr) {
            return Err(MediumError::UnalignedProgram(addr));
        }

        let page = self.geometry.page_size as usize;
        let padded_len = data.len().div_ceil(page) * page;
        if padded_len == data.len() {
            self.medium.program(addr, data)?;
        } else {
            let mut padded = vec![ERASED_BYTE; padded_len];
            padded[..data.len()].copy_from_slice(data);
            self.medium.program(addr, &padded)?;
        }

        if self.faults.lock().after_write(addr, self.write_all_phase) {
            // Power loss: the pages (possibly only some of them) are on the
            // medium, but the operation reports failure.
            error!(addr, "write failed: injected power loss");
            return Err(MediumError::PowerLoss(addr));
        }

        debug!(addr, len = data.len(), padded = padded_len, "wrote pages");
        Ok(())
    }

    /// Erases the block-aligned span `[addr, addr + len)`.
    pub fn erase(&mut self, addr: u32, len: u32) -> Result<(), MediumError> {
        if !self.geometry.is_block_aligned(addr) {
            return Err(MediumError::UnalignedErase(addr));
        }
        let block = self.geometry.block_size;
        let blocks = len.div_ceil(block);
        for i in 0..blocks {
            self.medium.erase(addr + i * block)?;
        }
        Ok(())
    }

    /// Erase cycles consumed by the erase block containing `addr`.
    #[must_use]
    pub fn erase_count_at(&self, addr: u32) -> u32 {
        self.medium.erase_count(self.geometry.block_index(addr))
    }

    /// Driver I/O counters.
    #[must_use]
    pub fn medium_diagnostics(&self) -> MediumDiagnostics {
        self.medium.diagnostics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultKind;
    use crate::medium::SimEeprom;

    fn shim() -> MemIf {
        let medium = SimEeprom::new(Geometry {
            capacity: 4096,
            page_size: 256,
            block_size: 1024,
            endurance: 1000,
        })
        .unwrap();
        MemIf::new(Box::new(medium), FaultHandle::default())
    }

    #[test]
    fn test_write_pads_to_page_multiple() {
        let mut shim = shim();
        shim.write(0, &[0x42; 100]).unwrap();

        let mut buf = [0u8; 256];
        shim.read(0, &mut buf).unwrap();
        assert!(buf[..100].iter().all(|&b| b == 0x42));
        assert!(buf[100..].iter().all(|&b| b == ERASED_BYTE));
        assert_eq!(shim.medium_diagnostics().bytes_written, 256);
    }

    #[test]
    fn test_write_rejects_unaligned_address() {
        let mut shim = shim();
        assert_eq!(
            shim.write(100, &[0u8; 4]),
            Err(MediumError::UnalignedProgram(100))
        );
    }

    #[test]
    fn test_erase_spans_blocks() {
        let mut shim = shim();
        shim.write(0, &[0x11; 256]).unwrap();
        shim.write(1024, &[0x22; 256]).unwrap();

        shim.erase(0, 2048).unwrap();

        let mut buf = [0u8; 2048];
        shim.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == ERASED_BYTE));
        assert_eq!(shim.erase_count_at(0), 1);
        assert_eq!(shim.erase_count_at(1024), 1);
    }

    #[test]
    fn test_blocked_write_fault() {
        let mut shim = shim();
        shim.faults().lock().enable(FaultKind::EraseTimeout).unwrap();

        assert_eq!(shim.write(0, &[0u8; 16]), Err(MediumError::Blocked(0)));
        // Nothing reached the medium.
        assert_eq!(shim.medium_diagnostics().writes, 0);
    }

    #[test]
    fn test_power_loss_after_write() {
        let mut shim = shim();
        shim.faults()
            .lock()
            .enable(FaultKind::PowerLossPageProgram)
            .unwrap();

        let err = shim.write(0, &[0x33; 256]).unwrap_err();
        assert_eq!(err, MediumError::PowerLoss(0));

        // The bytes landed even though the operation failed.
        shim.faults().lock().reset_all();
        let mut buf = [0u8; 256];
        shim.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0x33));
    }

    #[test]
    fn test_bit_flip_applies_after_read() {
        let mut shim = shim();
        shim.write(0, &[0x00; 256]).unwrap();

        shim.faults().lock().enable(FaultKind::BitFlipSingle).unwrap();
        let mut buf = [0u8; 8];
        shim.read(0, &mut buf).unwrap();
        assert_eq!(buf[0], 0x01);
    }
}
