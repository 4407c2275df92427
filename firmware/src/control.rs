//! The read → decide → publish cycle.

use core::fmt::{self, Debug};

use board::hal::{FlexPin, Monotonic, RangingApi};
use embedded_hal::{
    blocking::delay::DelayMs,
    digital::v2::{InputPin, OutputPin},
};
use log::{info, warn};

use crate::{
    config::{DISTANCE_THRESHOLD_MM, TEMPERATURE_THRESHOLD},
    dht22::Dht22,
    error::StepError,
    modem::{AtLink, SessionOutcome, Transport},
    payload::PayloadSchema,
    ranging::Ranger,
    reading::SensorReading,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeatingState {
    On,
    #[default]
    Off,
}

impl HeatingState {
    pub fn is_on(self) -> bool {
        self == HeatingState::On
    }
}

impl fmt::Display for HeatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HeatingState::On => "ON",
            HeatingState::Off => "OFF",
        })
    }
}

/// Heat only when an animal is close to the sensor and the shelter is cold.
///
/// Both thresholds are exclusive; there is no hysteresis.
pub fn decide(reading: &SensorReading) -> HeatingState {
    if reading.distance_mm < DISTANCE_THRESHOLD_MM && reading.temperature < TEMPERATURE_THRESHOLD {
        HeatingState::On
    } else {
        HeatingState::Off
    }
}

/// Everything the controller knows, for the lifetime of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShelterState {
    pub reading: SensorReading,
    pub heating: HeatingState,
}

/// What happened during one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub reading: SensorReading,
    pub heating: HeatingState,
    /// Whether temperature and humidity were refreshed this cycle
    pub climate_fresh: bool,
    pub publish: SessionOutcome,
}

pub struct Controller<P, C, R, H, L, T> {
    dht: Dht22<P, C>,
    ranger: Ranger<R>,
    heater: H,
    link: L,
    transport: T,
    schema: PayloadSchema,
    interval_ms: u32,
    state: ShelterState,
}

impl<P, C, E, R, H, L, T> Controller<P, C, R, H, L, T>
where
    P: FlexPin + InputPin<Error = E> + OutputPin<Error = E>,
    C: Monotonic,
    E: Debug,
    R: RangingApi,
    H: OutputPin,
    H::Error: Debug,
    L: AtLink,
    T: Transport,
{
    pub fn new(
        dht: Dht22<P, C>,
        ranger: Ranger<R>,
        heater: H,
        link: L,
        transport: T,
        interval_ms: u32,
    ) -> Self {
        Self {
            dht,
            ranger,
            heater,
            link,
            schema: transport.schema(),
            transport,
            interval_ms,
            state: ShelterState::default(),
        }
    }

    pub fn state(&self) -> &ShelterState {
        &self.state
    }

    pub fn heater(&self) -> &H {
        &self.heater
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Start ranging and run the transport's one-time modem setup.
    pub fn initialize(&mut self) -> SessionOutcome {
        if !self.ranger.initialize() {
            warn!("running without distance readings");
        }
        let outcome = self.transport.setup(&mut self.link);
        if outcome.is_success() {
            info!("modem ready");
        } else {
            for step in outcome.failures() {
                warn!("modem setup step {} failed: {:?}", step.label, step.result);
            }
        }
        outcome
    }

    /// One pass of the loop: read sensors, switch the heater, publish.
    pub fn step(&mut self) -> CycleReport {
        let climate_fresh = self.read_climate();
        self.state.reading.distance_mm = self.ranger.read_distance();

        let heating = decide(&self.state.reading);
        self.switch_heater(heating);

        let reading = self.state.reading;
        info!(
            "temperature {}C humidity {}% distance {}mm heating {}",
            reading.temperature, reading.humidity, reading.distance_mm, heating
        );

        let publish = self.publish();
        if !publish.is_success() {
            for step in publish.failures() {
                warn!("publish step {} failed: {:?}", step.label, step.result);
            }
        }

        CycleReport {
            reading,
            heating,
            climate_fresh,
            publish,
        }
    }

    /// Cycle forever at the configured interval.
    pub fn run(&mut self, delay: &mut impl DelayMs<u32>) -> ! {
        loop {
            // Publishing is best effort, anything that failed gets retried next cycle
            let _ = self.step();
            delay.delay_ms(self.interval_ms);
        }
    }

    fn read_climate(&mut self) -> bool {
        match self.dht.read() {
            Ok(measurement) => {
                self.state.reading.temperature = measurement.temperature;
                self.state.reading.humidity = measurement.humidity;
                true
            }
            Err(err) => {
                warn!("climate read failed, keeping previous values: {err}");
                false
            }
        }
    }

    fn switch_heater(&mut self, heating: HeatingState) {
        let switched = match heating {
            HeatingState::On => self.heater.set_high(),
            HeatingState::Off => self.heater.set_low(),
        };
        if let Err(err) = switched {
            warn!("heater relay error: {err:?}");
        }
        self.state.heating = heating;
    }

    fn publish(&mut self) -> SessionOutcome {
        match self.schema.render(&self.state.reading, self.state.heating) {
            Ok(payload) => self.transport.publish(&mut self.link, &payload),
            Err(_) => {
                let mut outcome = SessionOutcome::new();
                outcome.record("render", Err(StepError::PayloadTooLong));
                outcome
            }
        }
    }
}
