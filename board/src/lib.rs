//! A simulated animal-shelter controller board.
//!
//! Every peripheral shares one [`MicroClock`], so protocol timing, modem
//! latency and loop delays all happen on the same simulated timeline.

mod clock;
pub mod hal;
mod modem;
mod ranger;
mod temp_sensor;

use std::{convert::Infallible, time::Duration};

use embedded_hal::{blocking::delay::DelayMs, digital::v2::OutputPin};

pub use clock::MicroClock;
pub use modem::{AtModem, Delivery, ModemKind, SerialError};
pub use ranger::{RangerError, SimRanger, STATUS_PHASE_FAIL};
pub use temp_sensor::{frame, DhtLine, Response};

pub struct Board {
    /// The free-running microsecond counter
    pub clock: MicroClock,
    /// The temperature/humidity sensor's data line, implementing the embedded_hal digital traits
    pub dht_line: DhtLine,
    /// A time-of-flight sensor behind its vendor ranging API
    pub ranger: SimRanger,
    /// The heating relay output
    pub heater: HeaterRelay,
    /// A AT modem connected through a UART serial interface, implementing the embedded_hal::serial traits
    pub at_modem: AtModem,
    /// A timer for delaying execution that implements the embedded_hal DelayMs trait
    pub timer: Timer,
}

impl Board {
    pub fn new(modem: ModemKind) -> Self {
        let clock = MicroClock::new();
        Board {
            dht_line: DhtLine::new(clock.clone()),
            ranger: SimRanger::new(clock.clone()),
            heater: HeaterRelay::default(),
            at_modem: AtModem::new(modem, clock.clone()),
            timer: Timer::new(clock.clone()),
            clock,
        }
    }
}

/// A relay driven by a push-pull output.
#[derive(Debug, Default)]
pub struct HeaterRelay {
    energised: bool,
    switches: u32,
}

impl HeaterRelay {
    pub fn is_energised(&self) -> bool {
        self.energised
    }

    /// How often the relay changed state
    pub fn switch_count(&self) -> u32 {
        self.switches
    }

    fn drive(&mut self, energised: bool) {
        if self.energised != energised {
            self.switches += 1;
        }
        self.energised = energised;
    }
}

impl OutputPin for HeaterRelay {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

pub struct Timer {
    clock: MicroClock,
    realtime: bool,
}

impl Timer {
    pub fn new(clock: MicroClock) -> Self {
        Self {
            clock,
            realtime: true,
        }
    }

    /// A timer that only advances simulated time.
    pub fn simulated(clock: MicroClock) -> Self {
        Self {
            clock,
            realtime: false,
        }
    }
}

impl DelayMs<u32> for Timer {
    fn delay_ms(&mut self, ms: u32) {
        self.clock.advance_ms(ms);
        if self.realtime {
            std::thread::sleep(Duration::from_millis(ms as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_counts_transitions() {
        let mut relay = HeaterRelay::default();
        relay.set_high().unwrap();
        relay.set_high().unwrap();
        relay.set_low().unwrap();
        assert!(!relay.is_energised());
        assert_eq!(relay.switch_count(), 2);
    }

    #[test]
    fn simulated_timer_moves_the_clock() {
        let clock = MicroClock::new();
        let mut timer = Timer::simulated(clock.clone());
        timer.delay_ms(5);
        assert_eq!(clock.peek(), 5000);
    }
}
