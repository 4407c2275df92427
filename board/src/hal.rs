//! Traits the firmware is generic over, for the peripherals embedded-hal 0.2
//! does not cover.

use embedded_hal::digital::v2::{InputPin, OutputPin};

/// A free-running microsecond counter.
///
/// The counter wraps at `u32::MAX`; callers measure intervals with
/// `wrapping_sub` so a wrap in the middle of a wait is harmless.
pub trait Monotonic {
    fn now_us(&self) -> u32;
}

impl<T: Monotonic> Monotonic for &T {
    fn now_us(&self) -> u32 {
        T::now_us(*self)
    }
}

/// A GPIO that can switch between driving the line and sampling it.
///
/// Single-wire sensors share one data line between host and device, so the
/// host drives the start signal in output mode and hands the line over to
/// the pull-up in input mode.
pub trait FlexPin: InputPin + OutputPin {
    fn set_as_output(&mut self);
    fn set_as_input(&mut self);
}

/// Ranging modes supported by the time-of-flight sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    SingleRanging,
    ContinuousRanging,
}

/// One sample as reported by the ranging API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangingMeasurement {
    pub range_mm: u16,
    /// Vendor range status, `0` means the sample is valid
    pub range_status: u8,
}

/// The vendor ranging API of a time-of-flight distance sensor.
pub trait RangingApi {
    type Error: core::fmt::Debug;

    fn data_init(&mut self) -> Result<(), Self::Error>;
    fn static_init(&mut self) -> Result<(), Self::Error>;
    fn set_device_mode(&mut self, mode: DeviceMode) -> Result<(), Self::Error>;
    fn set_measurement_timing_budget_us(&mut self, budget_us: u32) -> Result<(), Self::Error>;
    fn start_measurement(&mut self) -> Result<(), Self::Error>;
    fn measurement_data_ready(&mut self) -> Result<bool, Self::Error>;
    fn ranging_measurement_data(&mut self) -> Result<RangingMeasurement, Self::Error>;
    fn clear_interrupt_mask(&mut self) -> Result<(), Self::Error>;
}
