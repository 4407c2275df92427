use core::fmt;

/// Temperature in tenths of a degree Celsius.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Decicelsius(pub i16);

/// Relative humidity in tenths of a percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Permille(pub u16);

/// Renders tenths as a one-decimal number, `-5` as `-0.5`.
fn write_tenths(f: &mut fmt::Formatter<'_>, negative: bool, tenths: u16) -> fmt::Result {
    let sign = if negative { "-" } else { "" };
    write!(f, "{sign}{}.{}", tenths / 10, tenths % 10)
}

impl fmt::Display for Decicelsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tenths(f, self.0 < 0, self.0.unsigned_abs())
    }
}

impl fmt::Display for Permille {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tenths(f, false, self.0)
    }
}

/// The latest good value of every sensor.
///
/// Each field is only overwritten by a successful read, so a failed read
/// leaves the previous value in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorReading {
    pub temperature: Decicelsius,
    pub humidity: Permille,
    pub distance_mm: u16,
}
