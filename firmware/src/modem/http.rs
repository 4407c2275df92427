//! HTTP POST through a SIM800 GPRS bearer.

use super::{command, AtLink, SessionOutcome, Transport};
use crate::payload::PayloadSchema;

const COMMAND_TIMEOUT_MS: u32 = 1000;
const BEARER_OPEN_TIMEOUT_MS: u32 = 3000;
const ANNOUNCE_TIMEOUT_MS: u32 = 2000;
const POST_TIMEOUT_MS: u32 = 5000;
/// How long the modem waits for the announced body bytes
const UPLOAD_WINDOW_MS: u32 = 5000;

pub struct HttpOverGprs {
    apn: &'static str,
    url: &'static str,
}

impl HttpOverGprs {
    pub const fn new(apn: &'static str, url: &'static str) -> Self {
        Self { apn, url }
    }

    /// Configure and open the GPRS bearer.
    fn attach(&self, link: &mut impl AtLink, outcome: &mut SessionOutcome) {
        outcome.record(
            "bearer contype",
            link.exchange("AT+SAPBR=3,1,\"Contype\",\"GPRS\"", "OK", COMMAND_TIMEOUT_MS),
        );
        outcome.record(
            "bearer apn",
            command(format_args!("AT+SAPBR=3,1,\"APN\",\"{}\"", self.apn))
                .and_then(|cmd| link.exchange(&cmd, "OK", COMMAND_TIMEOUT_MS)),
        );
        outcome.record(
            "bearer open",
            link.exchange("AT+SAPBR=1,1", "OK", BEARER_OPEN_TIMEOUT_MS),
        );
    }
}

impl Transport for HttpOverGprs {
    fn schema(&self) -> PayloadSchema {
        PayloadSchema::HttpJson
    }

    fn setup(&mut self, link: &mut impl AtLink) -> SessionOutcome {
        let mut outcome = SessionOutcome::new();
        outcome.record("at", link.exchange("AT", "OK", COMMAND_TIMEOUT_MS));
        outcome.record("sim ready", link.exchange("AT+CPIN?", "READY", COMMAND_TIMEOUT_MS));
        self.attach(link, &mut outcome);
        outcome
    }

    fn publish(&mut self, link: &mut impl AtLink, payload: &str) -> SessionOutcome {
        let mut outcome = SessionOutcome::new();

        outcome.record(
            "registration",
            link.exchange("AT+CREG?", "+CREG: 0,1", COMMAND_TIMEOUT_MS),
        );
        // The modem keeps the bearer between sessions, only reattach if it dropped
        if !link.send_command("AT+SAPBR=2,1", "+SAPBR: 1,1", COMMAND_TIMEOUT_MS) {
            self.attach(link, &mut outcome);
        }

        outcome.record("http init", link.exchange("AT+HTTPINIT", "OK", COMMAND_TIMEOUT_MS));
        outcome.record(
            "http cid",
            link.exchange("AT+HTTPPARA=\"CID\",1", "OK", COMMAND_TIMEOUT_MS),
        );
        outcome.record(
            "http url",
            command(format_args!("AT+HTTPPARA=\"URL\",\"{}\"", self.url))
                .and_then(|cmd| link.exchange(&cmd, "OK", COMMAND_TIMEOUT_MS)),
        );
        outcome.record(
            "http content",
            link.exchange(
                "AT+HTTPPARA=\"CONTENT\",\"application/json\"",
                "OK",
                COMMAND_TIMEOUT_MS,
            ),
        );

        let announced = outcome.record(
            "http data",
            command(format_args!(
                "AT+HTTPDATA={},{}",
                payload.len(),
                UPLOAD_WINDOW_MS
            ))
            .and_then(|cmd| link.exchange(&cmd, "DOWNLOAD", ANNOUNCE_TIMEOUT_MS)),
        );
        // Without DOWNLOAD the modem would read the body as commands
        if announced {
            outcome.record(
                "upload",
                link.write_raw(payload.as_bytes())
                    .and_then(|()| link.expect("OK", COMMAND_TIMEOUT_MS)),
            );
        }

        outcome.record(
            "post",
            link.exchange("AT+HTTPACTION=1", "+HTTPACTION: 1,200", POST_TIMEOUT_MS),
        );
        outcome.record("http term", link.exchange("AT+HTTPTERM", "OK", COMMAND_TIMEOUT_MS));
        outcome
    }
}
