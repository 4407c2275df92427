//! Status snapshot serialisation for the two server flavours.

use core::fmt::{self, Write as _};

use heapless::String;

use crate::{control::HeatingState, reading::SensorReading};

pub const PAYLOAD_LEN: usize = 128;

pub type Payload = String<PAYLOAD_LEN>;

/// JSON layouts understood by the receiving servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSchema {
    /// `{"temp":17.5,"dist":650,"heat":1}`
    HttpJson,
    /// `{"temp":17.5,"humidity":55.0,"distance":650,"heating":"ON"}`
    TcpJson,
}

impl PayloadSchema {
    pub fn render(
        self,
        reading: &SensorReading,
        heating: HeatingState,
    ) -> Result<Payload, fmt::Error> {
        let mut out = Payload::new();
        match self {
            PayloadSchema::HttpJson => write!(
                out,
                "{{\"temp\":{},\"dist\":{},\"heat\":{}}}",
                reading.temperature,
                reading.distance_mm,
                u8::from(heating.is_on())
            )?,
            PayloadSchema::TcpJson => write!(
                out,
                "{{\"temp\":{},\"humidity\":{},\"distance\":{},\"heating\":\"{}\"}}",
                reading.temperature,
                reading.humidity,
                reading.distance_mm,
                heating
            )?,
        }
        Ok(out)
    }
}
