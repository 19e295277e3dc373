//! Scheduler contract: the monotonic tick source and the interrupt gate.
//!
//! The manager never owns a timebase. It reads ticks (1 tick = 1 ms,
//! conceptually) from a [`Clock`] the host supplies, and serialises queue
//! mutation against interrupt-context submitters through an [`IrqGate`].

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::ReentrantMutex;

/// Monotonic tick source.
///
/// Implementations must never go backwards. The default test timebase is
/// [`VirtualClock`]; a host integrating against real hardware provides its
/// own.
pub trait Clock: Send + Sync {
    /// Current tick count.
    fn now_ticks(&self) -> u64;
}

/// A manually advanced tick counter for simulation and tests.
#[derive(Debug, Default)]
pub struct VirtualClock {
    ticks: AtomicU64,
}

impl VirtualClock {
    /// Creates a clock at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::Release);
    }
}

impl Clock for VirtualClock {
    fn now_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

/// Nesting-safe mutual exclusion with interrupt context.
///
/// Models the `enter_critical`/`leave_critical` pair an embedded scheduler
/// exposes. Re-entrant so a notification callback running inside the gate
/// cannot deadlock the flow that invoked it.
#[derive(Debug, Default)]
pub struct IrqGate {
    inner: ReentrantMutex<()>,
}

impl IrqGate {
    /// Creates an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with the gate held.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock();
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_clock_advances() {
        let clock = VirtualClock::new();
        assert_eq!(clock.now_ticks(), 0);

        clock.advance(5);
        clock.advance(3);
        assert_eq!(clock.now_ticks(), 8);
    }

    #[test]
    fn test_irq_gate_is_reentrant() {
        let gate = IrqGate::new();
        let value = gate.with(|| gate.with(|| 42));
        assert_eq!(value, 42);
    }
}
