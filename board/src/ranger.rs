//! A simulated time-of-flight distance sensor behind a vendor-style ranging API.

use std::collections::VecDeque;

use log::debug;
use rand::prelude::*;

use crate::{
    clock::MicroClock,
    hal::{DeviceMode, RangingApi, RangingMeasurement},
};

/// Range status the vendor API reports for a phase failure
pub const STATUS_PHASE_FAIL: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangerError {
    /// The device was used before `data_init`/`static_init`
    NotInitialised,
    /// A measurement was read while none was pending
    NoMeasurement,
}

enum Scene {
    /// Something moving in front of the sensor, now and then out of range
    Wandering { rng: ThreadRng, distance: u16 },
    Scripted(VecDeque<RangingMeasurement>),
}

pub struct SimRanger {
    clock: MicroClock,
    initialised: bool,
    mode: DeviceMode,
    budget_us: u32,
    running: bool,
    last_sample: u32,
    pending: Option<RangingMeasurement>,
    scene: Scene,
}

impl SimRanger {
    pub fn new(clock: MicroClock) -> Self {
        Self::with_scene(
            clock,
            Scene::Wandering {
                rng: rand::thread_rng(),
                distance: 900,
            },
        )
    }

    /// A sensor producing `samples` in order, one per timing budget.
    ///
    /// Once the script runs out no further samples become ready.
    pub fn scripted(
        clock: MicroClock,
        samples: impl IntoIterator<Item = RangingMeasurement>,
    ) -> Self {
        Self::with_scene(clock, Scene::Scripted(samples.into_iter().collect()))
    }

    fn with_scene(clock: MicroClock, scene: Scene) -> Self {
        Self {
            clock,
            initialised: false,
            mode: DeviceMode::SingleRanging,
            budget_us: 33_000,
            running: false,
            last_sample: 0,
            pending: None,
            scene,
        }
    }

    fn next_sample(&mut self) -> Option<RangingMeasurement> {
        match &mut self.scene {
            Scene::Scripted(queue) => queue.pop_front(),
            Scene::Wandering { rng, distance } => {
                *distance = (*distance as i32 + rng.gen_range(-80..=80)).clamp(30, 2000) as u16;
                let range_status = if rng.gen_range(0..20) == 0 {
                    STATUS_PHASE_FAIL
                } else {
                    0
                };
                Some(RangingMeasurement {
                    range_mm: *distance,
                    range_status,
                })
            }
        }
    }

    /// Latch a new sample once a full timing budget has passed.
    fn update(&mut self) {
        if !self.running || self.pending.is_some() {
            return;
        }
        let now = self.clock.peek();
        if now.wrapping_sub(self.last_sample) < self.budget_us {
            return;
        }
        self.last_sample = now;
        self.pending = self.next_sample();
        if self.mode == DeviceMode::SingleRanging {
            self.running = false;
        }
    }
}

impl RangingApi for SimRanger {
    type Error = RangerError;

    fn data_init(&mut self) -> Result<(), Self::Error> {
        self.running = false;
        self.pending = None;
        Ok(())
    }

    fn static_init(&mut self) -> Result<(), Self::Error> {
        self.initialised = true;
        Ok(())
    }

    fn set_device_mode(&mut self, mode: DeviceMode) -> Result<(), Self::Error> {
        if !self.initialised {
            return Err(RangerError::NotInitialised);
        }
        self.mode = mode;
        Ok(())
    }

    fn set_measurement_timing_budget_us(&mut self, budget_us: u32) -> Result<(), Self::Error> {
        if !self.initialised {
            return Err(RangerError::NotInitialised);
        }
        self.budget_us = budget_us;
        Ok(())
    }

    fn start_measurement(&mut self) -> Result<(), Self::Error> {
        if !self.initialised {
            return Err(RangerError::NotInitialised);
        }
        debug!(
            "ranger: {:?} started, budget {}us",
            self.mode, self.budget_us
        );
        self.running = true;
        self.last_sample = self.clock.peek();
        Ok(())
    }

    fn measurement_data_ready(&mut self) -> Result<bool, Self::Error> {
        self.update();
        Ok(self.pending.is_some())
    }

    fn ranging_measurement_data(&mut self) -> Result<RangingMeasurement, Self::Error> {
        self.pending.ok_or(RangerError::NoMeasurement)
    }

    fn clear_interrupt_mask(&mut self) -> Result<(), Self::Error> {
        self.pending = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(range_mm: u16) -> RangingMeasurement {
        RangingMeasurement {
            range_mm,
            range_status: 0,
        }
    }

    fn started(clock: &MicroClock, samples: Vec<RangingMeasurement>) -> SimRanger {
        let mut ranger = SimRanger::scripted(clock.clone(), samples);
        ranger.data_init().unwrap();
        ranger.static_init().unwrap();
        ranger
            .set_device_mode(DeviceMode::ContinuousRanging)
            .unwrap();
        ranger.start_measurement().unwrap();
        ranger
    }

    #[test]
    fn sample_ready_after_one_budget() {
        let clock = MicroClock::new();
        let mut ranger = started(&clock, vec![sample(420)]);

        assert!(!ranger.measurement_data_ready().unwrap());
        clock.advance_us(33_000);
        assert!(ranger.measurement_data_ready().unwrap());
        assert_eq!(ranger.ranging_measurement_data().unwrap().range_mm, 420);
    }

    #[test]
    fn pending_sample_held_until_cleared() {
        let clock = MicroClock::new();
        let mut ranger = started(&clock, vec![sample(420), sample(380)]);

        clock.advance_ms(100);
        assert!(ranger.measurement_data_ready().unwrap());
        clock.advance_ms(100);
        assert_eq!(ranger.ranging_measurement_data().unwrap().range_mm, 420);

        ranger.clear_interrupt_mask().unwrap();
        clock.advance_ms(33);
        assert!(ranger.measurement_data_ready().unwrap());
        assert_eq!(ranger.ranging_measurement_data().unwrap().range_mm, 380);
    }

    #[test]
    fn configuration_requires_init() {
        let clock = MicroClock::new();
        let mut ranger = SimRanger::scripted(clock, vec![]);
        assert_eq!(
            ranger.set_device_mode(DeviceMode::ContinuousRanging),
            Err(RangerError::NotInitialised)
        );
    }
}
