//! Time-of-flight distance sensor on top of its vendor ranging API.

use board::hal::{DeviceMode, RangingApi};
use log::{debug, warn};

use crate::error::RangingError;

/// Measurement timing budget, roughly 30 samples a second
pub const TIMING_BUDGET_US: u32 = 33_000;

pub struct Ranger<D> {
    device: D,
    distance_mm: u16,
}

impl<D: RangingApi> Ranger<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            distance_mm: 0,
        }
    }

    /// Put the sensor into continuous ranging and start measuring.
    pub fn initialize(&mut self) -> bool {
        match self.configure() {
            Ok(()) => true,
            Err(err) => {
                warn!("ranging sensor setup failed: {err:?}");
                false
            }
        }
    }

    fn configure(&mut self) -> Result<(), D::Error> {
        self.device.data_init()?;
        self.device.static_init()?;
        self.device.set_device_mode(DeviceMode::ContinuousRanging)?;
        self.device.set_measurement_timing_budget_us(TIMING_BUDGET_US)?;
        self.device.start_measurement()
    }

    /// Fetch a new sample if one is ready.
    ///
    /// The interrupt is cleared for every fetched sample, valid or not, so
    /// the sensor moves on to the next measurement.
    pub fn poll(&mut self) -> Result<u16, RangingError<D::Error>> {
        if !self
            .device
            .measurement_data_ready()
            .map_err(RangingError::Device)?
        {
            return Err(RangingError::NotReady);
        }

        let measurement = self.device.ranging_measurement_data();
        let cleared = self.device.clear_interrupt_mask();
        let measurement = measurement.map_err(RangingError::Device)?;
        cleared.map_err(RangingError::Device)?;

        if measurement.range_status != 0 {
            return Err(RangingError::InvalidStatus(measurement.range_status));
        }
        self.distance_mm = measurement.range_mm;
        Ok(measurement.range_mm)
    }

    /// The newest valid distance, or the previous one if there is none.
    pub fn read_distance(&mut self) -> u16 {
        match self.poll() {
            Ok(distance) => distance,
            Err(RangingError::NotReady) => {
                debug!("no new distance sample, keeping {}mm", self.distance_mm);
                self.distance_mm
            }
            Err(err) => {
                warn!("distance read failed: {err}");
                self.distance_mm
            }
        }
    }

    /// The last valid distance without touching the sensor
    pub fn distance_mm(&self) -> u16 {
        self.distance_mm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board::{hal::RangingMeasurement, MicroClock, SimRanger, STATUS_PHASE_FAIL};

    fn sample(range_mm: u16, range_status: u8) -> RangingMeasurement {
        RangingMeasurement {
            range_mm,
            range_status,
        }
    }

    fn ranger(clock: &MicroClock, samples: Vec<RangingMeasurement>) -> Ranger<SimRanger> {
        let mut ranger = Ranger::new(SimRanger::scripted(clock.clone(), samples));
        assert!(ranger.initialize());
        ranger
    }

    #[test]
    fn returns_new_sample_once_ready() {
        let clock = MicroClock::new();
        let mut ranger = ranger(&clock, vec![sample(650, 0)]);
        clock.advance_us(TIMING_BUDGET_US);
        assert_eq!(ranger.read_distance(), 650);
    }

    #[test]
    fn not_ready_keeps_previous_distance() {
        let clock = MicroClock::new();
        let mut ranger = ranger(&clock, vec![sample(650, 0)]);
        clock.advance_us(TIMING_BUDGET_US);
        assert_eq!(ranger.read_distance(), 650);

        for _ in 0..5 {
            assert_eq!(ranger.poll(), Err(RangingError::NotReady));
            assert_eq!(ranger.read_distance(), 650);
        }
    }

    #[test]
    fn invalid_status_is_skipped_and_cleared() {
        let clock = MicroClock::new();
        let mut ranger = ranger(
            &clock,
            vec![sample(400, 0), sample(8190, STATUS_PHASE_FAIL), sample(380, 0)],
        );
        clock.advance_us(TIMING_BUDGET_US);
        assert_eq!(ranger.read_distance(), 400);

        clock.advance_us(TIMING_BUDGET_US);
        assert_eq!(
            ranger.poll(),
            Err(RangingError::InvalidStatus(STATUS_PHASE_FAIL))
        );
        assert_eq!(ranger.distance_mm(), 400);

        clock.advance_us(TIMING_BUDGET_US);
        assert_eq!(ranger.read_distance(), 380);
    }

    #[test]
    fn uninitialised_sensor_is_never_ready() {
        let clock = MicroClock::new();
        let mut ranger = Ranger::new(SimRanger::scripted(clock.clone(), vec![sample(500, 0)]));
        clock.advance_ms(100);
        assert_eq!(ranger.read_distance(), 0);
    }
}
