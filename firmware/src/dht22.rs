//! Single-wire temperature/humidity sensor (DHT22/AM2302).
//!
//! ```txt
//!   host start        sensor ack       bit: 0          bit: 1
//! ──┐         ┌──┐      ┌──────┐      ┌────┐      ┌─────────┐
//!   │         │  │      │      │      │    │      │         │
//!   └─────────┘  └──────┘      └──────┘    └──────┘         └──
//!     1100us     30us  80us   80us   50us  26us  50us  70us
//! ```
//!
//! The host drives the start signal, then releases the line to the pull-up.
//! The sensor acknowledges and clocks out 40 bits, MSB first; the length of
//! each high phase is the bit value. Byte five is the 8-bit sum of the
//! other four.

use core::fmt::Debug;

use board::hal::{FlexPin, Monotonic};
use embedded_hal::digital::v2::{InputPin, OutputPin};
use log::debug;

use crate::{
    error::{DecodeError, Phase},
    reading::{Decicelsius, Permille},
    timing::{delay_us, wait_for, Wait},
};

const START_LOW_US: u32 = 1100;
const START_HIGH_US: u32 = 30;
const ACK_TIMEOUT_US: u32 = 100;
const BIT_START_TIMEOUT_US: u32 = 70;
const BIT_END_TIMEOUT_US: u32 = 100;
/// High phases longer than this are a `1`
const ONE_THRESHOLD_US: u32 = 40;

const FRAME_BITS: u8 = 40;

/// One successful acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub temperature: Decicelsius,
    pub humidity: Permille,
}

/// Verify the checksum of a raw frame and decode it.
pub fn decode_frame<E>(frame: [u8; 5]) -> Result<Measurement, DecodeError<E>> {
    let [h_hi, h_lo, t_hi, t_lo, expected] = frame;

    let actual = h_hi.wrapping_add(h_lo).wrapping_add(t_hi).wrapping_add(t_lo);
    if actual != expected {
        return Err(DecodeError::Checksum { expected, actual });
    }

    let humidity = u16::from_be_bytes([h_hi, h_lo]);
    // The top bit of the temperature is a sign, not part of the magnitude
    let magnitude = u16::from_be_bytes([t_hi & 0x7F, t_lo]) as i16;
    let temperature = if t_hi & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };

    Ok(Measurement {
        temperature: Decicelsius(temperature),
        humidity: Permille(humidity),
    })
}

pub struct Dht22<P, C> {
    pin: P,
    clock: C,
}

impl<P, C, E> Dht22<P, C>
where
    P: FlexPin + InputPin<Error = E> + OutputPin<Error = E>,
    C: Monotonic,
    E: Debug,
{
    pub fn new(pin: P, clock: C) -> Self {
        Self { pin, clock }
    }

    /// Run one complete acquisition.
    ///
    /// There is no retry; reads should be at least two seconds apart.
    pub fn read(&mut self) -> Result<Measurement, DecodeError<E>> {
        let frame = self.acquire().map_err(|err| {
            // Leave the line to the pull-up so the next start signal begins from idle
            self.pin.set_as_input();
            err
        })?;
        debug!("dht22 frame {frame:02x?}");
        decode_frame(frame)
    }

    fn acquire(&mut self) -> Result<[u8; 5], DecodeError<E>> {
        self.pin.set_as_output();
        self.pin.set_low().map_err(DecodeError::Pin)?;
        delay_us(&self.clock, START_LOW_US);
        self.pin.set_high().map_err(DecodeError::Pin)?;
        delay_us(&self.clock, START_HIGH_US);
        self.pin.set_as_input();

        self.wait_level(false, ACK_TIMEOUT_US, Phase::ResponseLow)?;
        self.wait_level(true, ACK_TIMEOUT_US, Phase::ResponseHigh)?;
        self.wait_level(false, ACK_TIMEOUT_US, Phase::DataStart)?;

        let mut frame = [0u8; 5];
        for bit in 0..FRAME_BITS {
            self.wait_level(true, BIT_START_TIMEOUT_US, Phase::BitStart(bit))?;
            let high_us = self.wait_level(false, BIT_END_TIMEOUT_US, Phase::BitEnd(bit))?;
            if high_us > ONE_THRESHOLD_US {
                frame[usize::from(bit / 8)] |= 0x80 >> (bit % 8);
            }
        }
        Ok(frame)
    }

    /// Wait until the line is at `high`, returning how long that took.
    fn wait_level(&self, high: bool, timeout_us: u32, phase: Phase) -> Result<u32, DecodeError<E>> {
        let pin = &self.pin;
        wait_for(&self.clock, timeout_us, || pin.is_high().map(|level| level == high)).map_err(
            |wait| match wait {
                Wait::Expired(_) => DecodeError::Timeout(phase),
                Wait::Failed(err) => DecodeError::Pin(err),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board::{frame, DhtLine, MicroClock, Response};
    use core::convert::Infallible;

    fn sensor(responses: impl IntoIterator<Item = Response>) -> Dht22<DhtLine, MicroClock> {
        let clock = MicroClock::new();
        Dht22::new(DhtLine::scripted(clock.clone(), responses), clock)
    }

    #[test]
    fn decodes_positive_frame() {
        let reading = decode_frame::<Infallible>([0x02, 0x8C, 0x01, 0x5F, 0xEE]).unwrap();
        assert_eq!(reading.humidity, Permille(652));
        assert_eq!(reading.temperature, Decicelsius(351));
    }

    #[test]
    fn sign_bit_negates_temperature() {
        let reading = decode_frame::<Infallible>([0x01, 0x90, 0x80, 0x65, 0x76]).unwrap();
        assert_eq!(reading.temperature, Decicelsius(-101));
        assert_eq!(reading.humidity, Permille(400));
    }

    #[test]
    fn checksum_is_truncated_sum() {
        // 0xFF + 0xFF + 0x00 + 0x03 = 0x201
        assert!(decode_frame::<Infallible>([0xFF, 0xFF, 0x00, 0x03, 0x01]).is_ok());
        assert_eq!(
            decode_frame::<Infallible>([0xFF, 0xFF, 0x00, 0x03, 0x02]),
            Err(DecodeError::Checksum {
                expected: 0x02,
                actual: 0x01
            })
        );
    }

    #[test]
    fn reads_frame_off_the_wire() {
        let mut dht = sensor([Response::Frame(frame(175, 553))]);
        let reading = dht.read().unwrap();
        assert_eq!(reading.temperature, Decicelsius(175));
        assert_eq!(reading.humidity, Permille(553));
    }

    #[test]
    fn reads_negative_and_extreme_values() {
        for (temperature, humidity) in [(-400, 0), (-1, 1000), (800, 999), (0, 65535)] {
            let mut dht = sensor([Response::Frame(frame(temperature, humidity))]);
            let reading = dht.read().unwrap();
            assert_eq!(reading.temperature, Decicelsius(temperature));
            assert_eq!(reading.humidity, Permille(humidity));
        }
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bytes = frame(175, 553);
        bytes[4] ^= 0x10;
        let mut dht = sensor([Response::Frame(bytes)]);
        assert!(matches!(dht.read(), Err(DecodeError::Checksum { .. })));
    }

    #[test]
    fn silent_sensor_times_out_waiting_for_response() {
        let mut dht = sensor([Response::Silent]);
        assert_eq!(dht.read(), Err(DecodeError::Timeout(Phase::ResponseLow)));
    }

    #[test]
    fn timeout_returns_line_to_input() {
        let mut dht = sensor([Response::Silent, Response::Frame(frame(210, 480))]);
        assert!(dht.read().is_err());
        // The following read starts cleanly
        assert_eq!(dht.read().unwrap().temperature, Decicelsius(210));
    }

    #[test]
    fn survives_clock_wrap_mid_read() {
        let clock = MicroClock::starting_at(u32::MAX - 2000);
        let line = DhtLine::scripted(clock.clone(), [Response::Frame(frame(-55, 612))]);
        let mut dht = Dht22::new(line, clock);
        assert_eq!(dht.read().unwrap().temperature, Decicelsius(-55));
    }
}
