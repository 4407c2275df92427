//! Compile-time deployment settings.

use board::ModemKind;

use crate::{
    modem::{HttpOverGprs, TcpOverWifi, Uplink},
    reading::Decicelsius,
};

/// Heat only when something is closer than this
pub const DISTANCE_THRESHOLD_MM: u16 = 700;
/// Heat only when it is colder than this
pub const TEMPERATURE_THRESHOLD: Decicelsius = Decicelsius(180);

/// Carrier access point for the GPRS bearer
pub const APN: &str = "internet";
pub const HTTP_URL: &str = "http://192.168.1.50:8080/update";

pub const WIFI_SSID: &str = "shelter";
pub const WIFI_PASSWORD: &str = "shelter-password";
pub const TCP_HOST: &str = "192.168.1.50";
pub const TCP_PORT: u16 = 8080;

/// How the shelter reaches its server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// SIM800 modem, HTTP POST over GPRS
    Gprs,
    /// ESP8266 module, raw TCP over WiFi
    Wifi,
}

#[cfg(feature = "wifi")]
pub const PROFILE: Profile = Profile::Wifi;
#[cfg(not(feature = "wifi"))]
pub const PROFILE: Profile = Profile::Gprs;

impl Profile {
    pub const fn modem(self) -> ModemKind {
        match self {
            Profile::Gprs => ModemKind::Sim800,
            Profile::Wifi => ModemKind::Esp8266,
        }
    }

    /// Pause between cycles; GPRS sessions need longer to settle
    pub const fn loop_interval_ms(self) -> u32 {
        match self {
            Profile::Gprs => 5000,
            Profile::Wifi => 2000,
        }
    }

    pub const fn uplink(self) -> Uplink {
        match self {
            Profile::Gprs => Uplink::Http(HttpOverGprs::new(APN, HTTP_URL)),
            Profile::Wifi => Uplink::Tcp(TcpOverWifi::new(
                WIFI_SSID,
                WIFI_PASSWORD,
                TCP_HOST,
                TCP_PORT,
            )),
        }
    }
}
