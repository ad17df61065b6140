//! Monotonic time source driving debounce, idle lock and the tick cadence.
use core::cell::Cell;

/// Millisecond clock provided by the board.
pub trait Clock {
    /// Milliseconds since boot. Must never go backwards.
    fn now_ms(&self) -> u64;

    /// Block for at least `ms` milliseconds.
    fn sleep_ms(&self, ms: u64);
}

/// Clock advanced only by sleeping or by hand. Used for simulation and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get().saturating_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
    }
}
