//! RAM-backed EEPROM simulation.

use tracing::debug;

use super::{Geometry, MediumDiagnostics, StorageMedium, ERASED_BYTE};
use crate::error::MediumError;

/// Simulated EEPROM holding its cell array in RAM.
///
/// Models the constraints of a real part: programs only hit erased cells,
/// erases work on whole blocks, and every block carries an endurance
/// counter that eventually runs out.
#[derive(Debug)]
pub struct SimEeprom {
    geometry: Geometry,
    cells: Vec<u8>,
    erase_counts: Vec<u32>,
    diagnostics: MediumDiagnostics,
}

impl SimEeprom {
    /// Creates a fully erased medium with the given geometry.
    pub fn new(geometry: Geometry) -> Result<Self, MediumError> {
        geometry.validate()?;
        Ok(Self {
            geometry,
            cells: vec![ERASED_BYTE; geometry.capacity as usize],
            erase_counts: vec![0; geometry.block_count() as usize],
            diagnostics: MediumDiagnostics::default(),
        })
    }

    /// Reads a single cell without touching the diagnostics.
    ///
    /// Inspection helper for tests and power-cycle demos.
    #[must_use]
    pub fn peek(&self, addr: u32) -> u8 {
        self.cells[addr as usize]
    }

    /// Overwrites a single cell, bypassing program constraints.
    ///
    /// Models external corruption (radiation, interrupted programming);
    /// tests use it to damage specific slots.
    pub fn poke(&mut self, addr: u32, value: u8) {
        self.cells[addr as usize] = value;
    }

    fn check_range(&self, addr: u32, len: usize) -> Result<(), MediumError> {
        let end = u64::from(addr) + len as u64;
        if end > u64::from(self.geometry.capacity) {
            return Err(MediumError::OutOfRange {
                addr,
                len,
                capacity: self.geometry.capacity,
            });
        }
        Ok(())
    }
}

impl StorageMedium for SimEeprom {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), MediumError> {
        self.check_range(addr, buf.len())?;

        let start = addr as usize;
        buf.copy_from_slice(&self.cells[start..start + buf.len()]);

        self.diagnostics.reads += 1;
        self.diagnostics.bytes_read += buf.len() as u64;
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), MediumError> {
        self.check_range(addr, data.len())?;
        if !self.geometry.is_page_aligned(addr) {
            return Err(MediumError::UnalignedProgram(addr));
        }
        if data.len() % self.geometry.page_size as usize != 0 {
            return Err(MediumError::UnalignedLength(data.len()));
        }

        let start = addr as usize;
        for (offset, cell) in self.cells[start..start + data.len()].iter().enumerate() {
            if *cell != ERASED_BYTE {
                #[allow(clippy::cast_possible_truncation)] // offset < data.len() <= capacity
                return Err(MediumError::NotErased(addr + offset as u32));
            }
        }

        self.cells[start..start + data.len()].copy_from_slice(data);

        self.diagnostics.writes += 1;
        self.diagnostics.bytes_written += data.len() as u64;
        debug!(addr, len = data.len(), "programmed pages");
        Ok(())
    }

    fn erase(&mut self, addr: u32) -> Result<(), MediumError> {
        self.check_range(addr, self.geometry.block_size as usize)?;
        if !self.geometry.is_block_aligned(addr) {
            return Err(MediumError::UnalignedErase(addr));
        }

        let block = self.geometry.block_index(addr) as usize;
        if self.erase_counts[block] >= self.geometry.endurance {
            return Err(MediumError::EnduranceExceeded {
                block: block as u32,
                limit: self.geometry.endurance,
            });
        }

        let start = addr as usize;
        let len = self.geometry.block_size as usize;
        self.cells[start..start + len].fill(ERASED_BYTE);

        self.erase_counts[block] += 1;
        self.diagnostics.erases += 1;
        if self.erase_counts[block] > self.diagnostics.max_erase_count {
            self.diagnostics.max_erase_count = self.erase_counts[block];
        }
        debug!(addr, block, "erased block");
        Ok(())
    }

    fn erase_count(&self, block_index: u32) -> u32 {
        self.erase_counts
            .get(block_index as usize)
            .copied()
            .unwrap_or(0)
    }

    fn diagnostics(&self) -> MediumDiagnostics {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SimEeprom {
        SimEeprom::new(Geometry {
            capacity: 4096,
            page_size: 256,
            block_size: 1024,
            endurance: 3,
        })
        .unwrap()
    }

    #[test]
    fn test_new_medium_is_erased() {
        let mut medium = small();
        let mut buf = [0u8; 4096];
        medium.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == ERASED_BYTE));
    }

    #[test]
    fn test_program_requires_page_alignment() {
        let mut medium = small();
        let page = vec![0xAB; 256];
        assert_eq!(
            medium.program(1, &page),
            Err(MediumError::UnalignedProgram(1))
        );
        assert_eq!(
            medium.program(0, &page[..100]),
            Err(MediumError::UnalignedLength(100))
        );
        medium.program(0, &page).unwrap();
    }

    #[test]
    fn test_program_requires_erased_cells() {
        let mut medium = small();
        let page = vec![0x55; 256];
        medium.program(256, &page).unwrap();

        let err = medium.program(256, &page).unwrap_err();
        assert_eq!(err, MediumError::NotErased(256));
    }

    #[test]
    fn test_erase_restores_erase_state() {
        let mut medium = small();
        let page = vec![0x55; 256];
        medium.program(0, &page).unwrap();

        medium.erase(0).unwrap();

        let mut buf = [0u8; 1024];
        medium.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == ERASED_BYTE));
        assert_eq!(medium.erase_count(0), 1);
    }

    #[test]
    fn test_erase_requires_block_alignment() {
        let mut medium = small();
        assert_eq!(medium.erase(256), Err(MediumError::UnalignedErase(256)));
    }

    #[test]
    fn test_endurance_exhaustion() {
        let mut medium = small();
        for _ in 0..3 {
            medium.erase(1024).unwrap();
        }
        let err = medium.erase(1024).unwrap_err();
        assert_eq!(err, MediumError::EnduranceExceeded { block: 1, limit: 3 });
        // Other blocks are unaffected.
        medium.erase(0).unwrap();
    }

    #[test]
    fn test_out_of_range_access() {
        let mut medium = small();
        let mut buf = [0u8; 8];
        assert!(matches!(
            medium.read(4092, &mut buf),
            Err(MediumError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_diagnostics_counters() {
        let mut medium = small();
        let page = vec![0x11; 256];
        medium.program(0, &page).unwrap();
        let mut buf = [0u8; 16];
        medium.read(0, &mut buf).unwrap();
        medium.erase(0).unwrap();

        let diag = medium.diagnostics();
        assert_eq!(diag.writes, 1);
        assert_eq!(diag.bytes_written, 256);
        assert_eq!(diag.reads, 1);
        assert_eq!(diag.bytes_read, 16);
        assert_eq!(diag.erases, 1);
        assert_eq!(diag.max_erase_count, 1);
    }

    #[test]
    fn test_poke_models_external_corruption() {
        let mut medium = small();
        let page = vec![0x00; 256];
        medium.program(0, &page).unwrap();

        // External damage flips a cell; the driver faithfully returns it.
        medium.poke(3, 0x80);
        assert_eq!(medium.peek(3), 0x80);

        let mut buf = [0u8; 4];
        medium.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x00, 0x00, 0x80]);

        // A poked cell is not erase state, so programming over it fails.
        medium.erase(0).unwrap();
        medium.poke(0, 0x01);
        assert_eq!(medium.program(0, &page), Err(MediumError::NotErased(0)));
    }

    #[test]
    fn test_bad_geometry_rejected() {
        let err = SimEeprom::new(Geometry {
            capacity: 4096,
            page_size: 300,
            block_size: 1024,
            endurance: 100,
        })
        .unwrap_err();
        assert!(matches!(err, MediumError::BadGeometry(_)));
    }
}
