use embedded_hal::serial::{Read, Write};
use log::{debug, info, warn};
use rand::prelude::*;
use serde::Deserialize;
use std::collections::VecDeque;

use crate::clock::MicroClock;

/// Time the modem takes to answer an ordinary command
const COMMAND_LATENCY_MS: u32 = 20;
/// Time a POST takes to reach the server and come back
const HTTP_ACTION_LATENCY_MS: u32 = 600;
const WIFI_JOIN_LATENCY_MS: u32 = 1500;
/// Size of the modem's transmit FIFO towards the MCU
const RX_FIFO_LEN: usize = 1024;

const HTTP_STATUS_OK: u16 = 200;
const HTTP_STATUS_BAD_REQUEST: u16 = 400;
const HTTP_STATUS_NETWORK_ERROR: u16 = 601;

/// Which command set the modem speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemKind {
    /// GSM modem with a GPRS bearer and an HTTP client
    Sim800,
    /// WiFi module with a single TCP link
    Esp8266,
}

/// A payload that reached the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// URL for HTTP posts, `host:port` for TCP
    pub target: String,
    pub body: Vec<u8>,
}

impl Delivery {
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("<binary>")
    }
}

/// What the receiving server understands of a shelter report.
#[derive(Debug, Deserialize)]
struct ShelterData {
    temp: f64,
    #[serde(alias = "dist")]
    distance: u32,
    #[serde(alias = "heat")]
    heating: serde_json::Value,
    #[serde(default)]
    humidity: Option<f64>,
}

#[derive(Debug, Eq, PartialEq)]
enum State {
    Command,
    /// Waiting for the announced number of HTTP body bytes
    HttpData(usize),
    /// Waiting for the announced number of TCP bytes
    TcpSending(usize),
}

#[derive(Default)]
struct HttpSession {
    cid: Option<String>,
    url: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

#[derive(Default)]
struct Gprs {
    registered: bool,
    contype: Option<String>,
    apn: Option<String>,
    bearer_open: bool,
    http: Option<HttpSession>,
}

#[derive(Default)]
struct Wifi {
    station_mode: bool,
    joined: bool,
    multiplexed: bool,
    link: Option<String>,
}

/// A serial AT modem with a fake server on the far side of its network.
pub struct AtModem {
    kind: ModemKind,
    clock: MicroClock,
    write_buffer: Vec<u8>,
    read_buffer: VecDeque<u8>,
    overrun: bool,
    state: State,
    rng: ThreadRng,
    fault_percent: u8,
    gprs: Gprs,
    wifi: Wifi,
    deliveries: Vec<Delivery>,
}

impl AtModem {
    pub fn new(kind: ModemKind, clock: MicroClock) -> Self {
        Self {
            kind,
            clock,
            write_buffer: Vec::new(),
            read_buffer: VecDeque::new(),
            overrun: false,
            state: State::Command,
            rng: rand::thread_rng(),
            fault_percent: 3,
            gprs: Gprs {
                registered: true,
                ..Gprs::default()
            },
            wifi: Wifi::default(),
            deliveries: Vec::new(),
        }
    }

    /// Percentage of commands answered with `ERROR` regardless of their content.
    pub fn with_fault_rate(mut self, percent: u8) -> Self {
        self.fault_percent = percent.min(100);
        self
    }

    /// Payloads the remote end accepted, oldest first.
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    pub fn set_registered(&mut self, registered: bool) {
        self.gprs.registered = registered;
    }

    pub fn bearer_open(&self) -> bool {
        self.gprs.bearer_open
    }

    pub fn tcp_connected(&self) -> bool {
        self.wifi.link.is_some()
    }

    fn check_complete_command(&mut self) {
        loop {
            // The modem is waiting for raw payload bytes
            if let State::HttpData(count) | State::TcpSending(count) = self.state {
                if self.write_buffer.len() < count {
                    // Not enough bytes available yet
                    break;
                }

                let bytes: Vec<_> = self.write_buffer.drain(..count).collect();
                match self.state {
                    State::HttpData(_) => self.http_data_received(bytes),
                    _ => self.tcp_data_received(bytes),
                }
                self.state = State::Command;
                continue;
            }

            // Read a line
            let Some(index) = self.write_buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let mut complete_line: Vec<_> = self.write_buffer.drain(..=index).collect();
            complete_line.pop();
            if complete_line.last() == Some(&b'\r') {
                complete_line.pop();
            }
            if complete_line.is_empty() {
                continue;
            }

            match String::from_utf8(complete_line) {
                Ok(line) => {
                    debug!("modem <- {line}");
                    self.handle_command(&line);
                }
                Err(_) => self.write_error(),
            }
        }
    }

    fn handle_command(&mut self, cmd: &str) {
        // It's a slow modem
        self.clock.advance_ms(COMMAND_LATENCY_MS);

        if cmd == "AT" {
            self.write_ok();
            return;
        }

        let Some(body) = cmd.strip_prefix("AT+") else {
            self.write_error();
            return;
        };

        // Oh no, radio happened
        if self.rng.gen_range(0..100) < self.fault_percent {
            self.write_error();
            return;
        }

        let (name, args) = match body.find(|c: char| c == '=' || c == '?') {
            Some(split) => (&body[..split], &body[split..]),
            None => (body, ""),
        };
        let params = parameters(args);

        match self.kind {
            ModemKind::Sim800 => self.handle_sim800(name, args == "?", &params),
            ModemKind::Esp8266 => self.handle_esp8266(name, &params),
        }
    }

    fn handle_sim800(&mut self, name: &str, query: bool, params: &[String]) {
        match (name, query) {
            ("CPIN", true) => {
                self.write_line("+CPIN: READY");
                self.write_ok();
            }
            ("CREG", true) => {
                let stat = if self.gprs.registered { 1 } else { 2 };
                self.write_line(&format!("+CREG: 0,{stat}"));
                self.write_ok();
            }
            ("SAPBR", false) => self.handle_bearer(params),
            ("HTTPINIT", false) => {
                if self.gprs.http.is_some() {
                    self.write_error();
                } else {
                    self.gprs.http = Some(HttpSession::default());
                    self.write_ok();
                }
            }
            ("HTTPPARA", false) => {
                let (Some(session), [key, value]) = (self.gprs.http.as_mut(), params) else {
                    self.write_error();
                    return;
                };
                let slot = match key.as_str() {
                    "CID" => &mut session.cid,
                    "URL" => &mut session.url,
                    "CONTENT" => &mut session.content_type,
                    _ => {
                        self.write_error();
                        return;
                    }
                };
                *slot = Some(value.clone());
                self.write_ok();
            }
            ("HTTPDATA", false) => {
                let length = params.first().and_then(|p| p.parse::<usize>().ok());
                match (self.gprs.http.is_some(), length) {
                    (true, Some(length)) => {
                        self.state = State::HttpData(length);
                        self.write_line("DOWNLOAD");
                    }
                    _ => self.write_error(),
                }
            }
            ("HTTPACTION", false) => {
                if self.gprs.http.is_none() || params.first().map(String::as_str) != Some("1") {
                    self.write_error();
                    return;
                }
                self.write_ok();
                self.clock.advance_ms(HTTP_ACTION_LATENCY_MS);
                let status = self.http_post();
                self.write_line(&format!("+HTTPACTION: 1,{status},0"));
            }
            ("HTTPTERM", false) => {
                if self.gprs.http.take().is_some() {
                    self.write_ok();
                } else {
                    self.write_error();
                }
            }
            _ => self.write_error(),
        }
    }

    fn handle_bearer(&mut self, params: &[String]) {
        match params {
            [cmd, _cid, key, value] if cmd == "3" => {
                match key.as_str() {
                    "Contype" => self.gprs.contype = Some(value.clone()),
                    "APN" => self.gprs.apn = Some(value.clone()),
                    _ => {
                        self.write_error();
                        return;
                    }
                }
                self.write_ok();
            }
            [cmd, _cid] if cmd == "1" => {
                let configured =
                    self.gprs.contype.as_deref() == Some("GPRS") && self.gprs.apn.is_some();
                if self.gprs.bearer_open || !configured || !self.gprs.registered {
                    self.write_error();
                } else {
                    self.gprs.bearer_open = true;
                    self.write_ok();
                }
            }
            [cmd, _cid] if cmd == "0" => {
                self.gprs.bearer_open = false;
                self.write_ok();
            }
            [cmd, cid] if cmd == "2" => {
                let line = if self.gprs.bearer_open {
                    format!("+SAPBR: {cid},1,\"10.64.12.7\"")
                } else {
                    format!("+SAPBR: {cid},3,\"0.0.0.0\"")
                };
                self.write_line(&line);
                self.write_ok();
            }
            _ => self.write_error(),
        }
    }

    fn http_data_received(&mut self, bytes: Vec<u8>) {
        if let Some(session) = self.gprs.http.as_mut() {
            session.body = bytes;
        }
        self.write_ok();
    }

    fn http_post(&mut self) -> u16 {
        let Some(session) = self.gprs.http.as_ref() else {
            return HTTP_STATUS_NETWORK_ERROR;
        };
        let Some(url) = session.url.clone() else {
            return HTTP_STATUS_NETWORK_ERROR;
        };
        if !self.gprs.bearer_open || session.cid.as_deref() != Some("1") {
            return HTTP_STATUS_NETWORK_ERROR;
        }
        if session.content_type.as_deref() != Some("application/json") {
            return HTTP_STATUS_BAD_REQUEST;
        }

        let body = session.body.clone();
        if !self.server_accepts(&body) {
            return HTTP_STATUS_BAD_REQUEST;
        }
        self.deliveries.push(Delivery { target: url, body });
        HTTP_STATUS_OK
    }

    fn handle_esp8266(&mut self, name: &str, params: &[String]) {
        match name {
            "CWMODE" => {
                self.wifi.station_mode = params.first().map(String::as_str) == Some("1");
                self.write_ok();
            }
            "CWJAP" => {
                if !self.wifi.station_mode || params.len() != 2 {
                    self.write_line("+CWJAP:3");
                    self.write_line("FAIL");
                    return;
                }
                self.clock.advance_ms(WIFI_JOIN_LATENCY_MS);
                self.wifi.joined = true;
                self.write_line("WIFI CONNECTED");
                self.write_line("WIFI GOT IP");
                self.write_line("");
                self.write_ok();
            }
            "CIPMUX" => {
                self.wifi.multiplexed = params.first().map(String::as_str) == Some("1");
                self.write_ok();
            }
            "CIPSTART" => {
                if self.wifi.link.is_some() {
                    self.write_line("ALREADY CONNECTED");
                    self.write_error();
                    return;
                }
                let [kind, host, port] = params else {
                    self.write_error();
                    return;
                };
                if kind != "TCP" || !self.wifi.joined || self.wifi.multiplexed {
                    self.write_error();
                    return;
                }
                let Ok(port) = port.parse::<u16>() else {
                    self.write_error();
                    return;
                };
                self.wifi.link = Some(format!("{host}:{port}"));
                self.write_line("CONNECT");
                self.write_line("");
                self.write_ok();
            }
            "CIPSEND" => {
                let length = params.first().and_then(|p| p.parse::<usize>().ok());
                match (self.wifi.link.is_some(), length) {
                    (true, Some(length)) if length <= 2048 => {
                        self.state = State::TcpSending(length);
                        self.write_ok();
                        self.write_raw(b"> ");
                    }
                    (false, _) => {
                        self.write_line("link is not valid");
                        self.write_error();
                    }
                    _ => self.write_error(),
                }
            }
            "CIPCLOSE" => {
                if self.wifi.link.take().is_some() {
                    self.write_line("CLOSED");
                    self.write_ok();
                } else {
                    self.write_error();
                }
            }
            _ => self.write_error(),
        }
    }

    fn tcp_data_received(&mut self, bytes: Vec<u8>) {
        self.write_line("");
        self.write_line(&format!("Recv {} bytes", bytes.len()));
        self.write_line("");
        self.write_line("SEND OK");

        // The TCP server has no way to answer, it just drops what it can't read
        if self.server_accepts(&bytes) {
            if let Some(target) = self.wifi.link.clone() {
                self.deliveries.push(Delivery {
                    target,
                    body: bytes,
                });
            }
        }
    }

    fn server_accepts(&self, body: &[u8]) -> bool {
        match serde_json::from_slice::<ShelterData>(body) {
            Ok(data) => {
                info!(
                    "[SERVER] temperature: {:.1}C | distance: {}mm | heating: {} | humidity: {:?}",
                    data.temp, data.distance, data.heating, data.humidity
                );
                true
            }
            Err(e) => {
                warn!("[SERVER] rejected payload: {e}");
                false
            }
        }
    }

    fn write_error(&mut self) {
        self.write_line("ERROR");
    }

    fn write_ok(&mut self) {
        self.write_line("OK");
    }

    fn write_line(&mut self, line: &str) {
        self.write_raw(line.as_bytes());
        self.write_raw(b"\r\n");
    }

    fn write_raw(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.read_buffer.len() >= RX_FIFO_LEN {
                self.overrun = true;
                return;
            }
            self.read_buffer.push_back(byte);
        }
    }
}

/// Split `=a,"b",c` into `["a", "b", "c"]`.
fn parameters(args: &str) -> Vec<String> {
    let Some(list) = args.strip_prefix('=') else {
        return Vec::new();
    };
    list.split(',')
        .map(|p| p.trim().trim_matches('"').to_owned())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// Bytes were dropped because the MCU didn't read fast enough
    Overrun,
}

impl Read<u8> for AtModem {
    type Error = SerialError;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        if std::mem::take(&mut self.overrun) {
            return Err(nb::Error::Other(SerialError::Overrun));
        }
        if let Some(b) = self.read_buffer.pop_front() {
            Ok(b)
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl Write<u8> for AtModem {
    type Error = SerialError;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.write_buffer.push(word);
        self.check_complete_command();
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}
