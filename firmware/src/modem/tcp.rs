//! Raw TCP through an ESP8266 WiFi module.

use super::{command, AtLink, SessionOutcome, Transport};
use crate::payload::PayloadSchema;

const COMMAND_TIMEOUT_MS: u32 = 1000;
const JOIN_TIMEOUT_MS: u32 = 10_000;
const CONNECT_TIMEOUT_MS: u32 = 5000;
const PROMPT_TIMEOUT_MS: u32 = 2000;
const SEND_TIMEOUT_MS: u32 = 2000;

pub struct TcpOverWifi {
    ssid: &'static str,
    password: &'static str,
    host: &'static str,
    port: u16,
}

impl TcpOverWifi {
    pub const fn new(
        ssid: &'static str,
        password: &'static str,
        host: &'static str,
        port: u16,
    ) -> Self {
        Self {
            ssid,
            password,
            host,
            port,
        }
    }
}

impl Transport for TcpOverWifi {
    fn schema(&self) -> PayloadSchema {
        PayloadSchema::TcpJson
    }

    fn setup(&mut self, link: &mut impl AtLink) -> SessionOutcome {
        let mut outcome = SessionOutcome::new();
        outcome.record("at", link.exchange("AT", "OK", COMMAND_TIMEOUT_MS));
        outcome.record(
            "station mode",
            link.exchange("AT+CWMODE=1", "OK", COMMAND_TIMEOUT_MS),
        );
        outcome.record(
            "join",
            command(format_args!(
                "AT+CWJAP=\"{}\",\"{}\"",
                self.ssid, self.password
            ))
            .and_then(|cmd| link.exchange(&cmd, "WIFI GOT IP", JOIN_TIMEOUT_MS)),
        );
        outcome.record(
            "single link",
            link.exchange("AT+CIPMUX=0", "OK", COMMAND_TIMEOUT_MS),
        );
        outcome
    }

    fn publish(&mut self, link: &mut impl AtLink, payload: &str) -> SessionOutcome {
        let mut outcome = SessionOutcome::new();

        outcome.record(
            "connect",
            command(format_args!(
                "AT+CIPSTART=\"TCP\",\"{}\",{}",
                self.host, self.port
            ))
            .and_then(|cmd| link.exchange(&cmd, "CONNECT", CONNECT_TIMEOUT_MS)),
        );

        let announced = outcome.record(
            "announce",
            command(format_args!("AT+CIPSEND={}", payload.len()))
                .and_then(|cmd| link.send_line(&cmd))
                .and_then(|()| link.await_prompt(b'>', PROMPT_TIMEOUT_MS)),
        );
        if announced {
            outcome.record(
                "send",
                link.write_raw(payload.as_bytes())
                    .and_then(|()| link.expect("SEND OK", SEND_TIMEOUT_MS)),
            );
        }

        outcome.record("close", link.exchange("AT+CIPCLOSE", "OK", COMMAND_TIMEOUT_MS));
        outcome
    }
}
