//! A simulated DHT22-style temperature/humidity sensor on a single-wire line.

use std::{collections::VecDeque, convert::Infallible};

use embedded_hal::digital::v2::{InputPin, OutputPin};
use log::debug;
use rand::prelude::*;

use crate::{clock::MicroClock, hal::FlexPin};

/// Shortest start signal the sensor reacts to
const START_LOW_MIN_US: u32 = 1000;

// Waveform timings of the sensor side of the protocol
const RESPONSE_DELAY_US: u32 = 20;
const ACK_LOW_US: u32 = 80;
const ACK_HIGH_US: u32 = 80;
const BIT_LOW_US: u32 = 50;
const BIT_ZERO_HIGH_US: u32 = 26;
const BIT_ONE_HIGH_US: u32 = 70;

const TEMPERATURE_VARIANCE: i16 = 3;

/// What the sensor answers to the next start signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Transmit these five bytes, checksum included
    Frame([u8; 5]),
    /// Never pull the line low
    Silent,
}

/// Encode a reading the way the sensor puts it on the wire.
///
/// Both values are in tenths; negative temperatures set the top bit of the
/// third byte.
pub fn frame(temperature: i16, humidity: u16) -> [u8; 5] {
    let [h_hi, h_lo] = humidity.to_be_bytes();
    let [mut t_hi, t_lo] = temperature.unsigned_abs().to_be_bytes();
    if temperature < 0 {
        t_hi |= 0x80;
    }
    let checksum = h_hi
        .wrapping_add(h_lo)
        .wrapping_add(t_hi)
        .wrapping_add(t_lo);
    [h_hi, h_lo, t_hi, t_lo, checksum]
}

enum Source {
    /// A slowly drifting room climate with the occasional glitch
    Climate {
        rng: ThreadRng,
        temperature: i16,
        humidity: u16,
    },
    Scripted(VecDeque<Response>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Output,
    Input,
}

/// A burst the sensor is clocking out, as `(duration, level)` segments.
struct Transmission {
    start: u32,
    segments: Vec<(u32, bool)>,
}

impl Transmission {
    fn new(start: u32, bytes: [u8; 5]) -> Self {
        let mut segments = vec![
            (RESPONSE_DELAY_US, true),
            (ACK_LOW_US, false),
            (ACK_HIGH_US, true),
        ];
        for byte in bytes {
            for bit in (0..8).rev() {
                let high = if byte & (1 << bit) != 0 {
                    BIT_ONE_HIGH_US
                } else {
                    BIT_ZERO_HIGH_US
                };
                segments.push((BIT_LOW_US, false));
                segments.push((high, true));
            }
        }
        // The sensor pulls low once more before releasing the line
        segments.push((BIT_LOW_US, false));

        Self { start, segments }
    }

    fn level_at(&self, now: u32) -> bool {
        let mut offset = now.wrapping_sub(self.start);
        for &(duration, level) in &self.segments {
            if offset < duration {
                return level;
            }
            offset -= duration;
        }
        // Released, the pull-up holds the line high
        true
    }
}

/// The sensor's data line, as seen from the MCU pin it is wired to.
pub struct DhtLine {
    clock: MicroClock,
    mode: Mode,
    driven_high: bool,
    low_since: Option<u32>,
    armed: bool,
    transmission: Option<Transmission>,
    source: Source,
}

impl DhtLine {
    /// A sensor reporting a drifting room climate.
    pub fn new(clock: MicroClock) -> Self {
        Self::with_source(
            clock,
            Source::Climate {
                rng: rand::thread_rng(),
                temperature: 175,
                humidity: 550,
            },
        )
    }

    /// A sensor answering start signals with `responses`, in order.
    ///
    /// Once the script runs out the sensor stays silent.
    pub fn scripted(clock: MicroClock, responses: impl IntoIterator<Item = Response>) -> Self {
        Self::with_source(clock, Source::Scripted(responses.into_iter().collect()))
    }

    fn with_source(clock: MicroClock, source: Source) -> Self {
        Self {
            clock,
            mode: Mode::Input,
            driven_high: true,
            low_since: None,
            armed: false,
            transmission: None,
            source,
        }
    }

    fn next_response(&mut self) -> Response {
        match &mut self.source {
            Source::Scripted(queue) => queue.pop_front().unwrap_or(Response::Silent),
            Source::Climate {
                rng,
                temperature,
                humidity,
            } => {
                *temperature = (*temperature
                    + rng.gen_range(-TEMPERATURE_VARIANCE..=TEMPERATURE_VARIANCE))
                .clamp(100, 250);
                *humidity = (*humidity as i16 + rng.gen_range(-5..=5)).clamp(300, 900) as u16;

                let mut bytes = frame(*temperature, *humidity);
                // Oh no, electronics happened
                match rng.gen_range(0..200) {
                    1 => return Response::Silent,
                    2 => bytes[4] = bytes[4].wrapping_add(1),
                    _ => (),
                }
                Response::Frame(bytes)
            }
        }
    }

    fn level(&self) -> bool {
        match self.mode {
            Mode::Output => self.driven_high,
            Mode::Input => self
                .transmission
                .as_ref()
                .map_or(true, |t| t.level_at(self.clock.peek())),
        }
    }
}

impl OutputPin for DhtLine {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.driven_high {
            self.low_since = Some(self.clock.peek());
        }
        self.driven_high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if let (Some(since), Mode::Output) = (self.low_since.take(), self.mode) {
            let low_us = self.clock.peek().wrapping_sub(since);
            self.armed = low_us >= START_LOW_MIN_US;
            debug!("dht line: start signal low for {low_us}us");
        }
        self.driven_high = true;
        Ok(())
    }
}

impl InputPin for DhtLine {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(self.level())
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        Ok(!self.level())
    }
}

impl FlexPin for DhtLine {
    fn set_as_output(&mut self) {
        self.mode = Mode::Output;
        self.transmission = None;
        self.armed = false;
    }

    fn set_as_input(&mut self) {
        self.mode = Mode::Input;
        self.low_since = None;
        if !std::mem::take(&mut self.armed) {
            return;
        }
        self.transmission = match self.next_response() {
            Response::Frame(bytes) => Some(Transmission::new(self.clock.peek(), bytes)),
            Response::Silent => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_signal(line: &mut DhtLine, clock: &MicroClock, low_us: u32) {
        line.set_as_output();
        line.set_low().unwrap();
        clock.advance_us(low_us);
        line.set_high().unwrap();
        clock.advance_us(30);
        line.set_as_input();
    }

    #[test]
    fn frame_sets_sign_bit_and_checksum() {
        assert_eq!(frame(251, 652), [0x02, 0x8C, 0x00, 0xFB, 0x89]);
        assert_eq!(frame(-101, 0), [0x00, 0x00, 0x80, 0x65, 0xE5]);
    }

    #[test]
    fn answers_with_acknowledge_then_bits() {
        let clock = MicroClock::new();
        let mut line = DhtLine::scripted(clock.clone(), [Response::Frame([0x80, 0, 0, 0, 0x80])]);
        start_signal(&mut line, &clock, 1100);

        assert!(line.is_high().unwrap());
        clock.advance_us(RESPONSE_DELAY_US);
        assert!(line.is_low().unwrap());
        clock.advance_us(ACK_LOW_US);
        assert!(line.is_high().unwrap());
        clock.advance_us(ACK_HIGH_US);
        // First bit is a one: 50us low then 70us high
        assert!(line.is_low().unwrap());
        clock.advance_us(BIT_LOW_US + 60);
        assert!(line.is_high().unwrap());
        clock.advance_us(10);
        assert!(line.is_low().unwrap());
    }

    #[test]
    fn short_start_signal_is_ignored() {
        let clock = MicroClock::new();
        let mut line = DhtLine::scripted(clock.clone(), [Response::Frame([0; 5])]);
        start_signal(&mut line, &clock, 500);

        for _ in 0..400 {
            clock.advance_us(1);
            assert!(line.is_high().unwrap());
        }
    }

    #[test]
    fn silent_sensor_leaves_line_high() {
        let clock = MicroClock::new();
        let mut line = DhtLine::scripted(clock.clone(), [Response::Silent]);
        start_signal(&mut line, &clock, 1100);
        clock.advance_us(RESPONSE_DELAY_US + 10);
        assert!(line.is_high().unwrap());
    }
}
