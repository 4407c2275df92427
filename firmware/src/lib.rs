//! Animal shelter controller: reads a single-wire climate sensor and a
//! time-of-flight distance sensor, switches a heating relay and reports the
//! shelter's state through a serial AT modem.

#![deny(unsafe_code)]

pub mod config;
pub mod control;
pub mod dht22;
pub mod error;
pub mod modem;
pub mod payload;
pub mod ranging;
pub mod reading;
pub mod timing;

pub use control::{decide, Controller, CycleReport, HeatingState, ShelterState};
pub use reading::{Decicelsius, Permille, SensorReading};
