use std::{cell::Cell, rc::Rc};

use crate::hal::Monotonic;

/// The simulated microsecond counter shared by every peripheral on the board.
///
/// Reading the counter advances it by one microsecond, which stands in for
/// the time a busy-wait iteration takes on the real MCU. Peripherals that
/// model latency (the modem, the delay timer) push it forward explicitly.
#[derive(Clone, Default)]
pub struct MicroClock {
    now: Rc<Cell<u32>>,
}

impl MicroClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the counter at an arbitrary value, e.g. just below the wrap.
    pub fn starting_at(us: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(us)),
        }
    }

    /// The current time without advancing it
    pub fn peek(&self) -> u32 {
        self.now.get()
    }

    pub fn advance_us(&self, us: u32) {
        self.now.set(self.now.get().wrapping_add(us));
    }

    pub fn advance_ms(&self, ms: u32) {
        self.advance_us(ms.saturating_mul(1000));
    }
}

impl Monotonic for MicroClock {
    fn now_us(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(1));
        now
    }
}
