//! AT-command sessions over a serial modem.
//!
//! Every step is a command/response exchange that either sees its expected
//! token or doesn't. Sessions are best effort: a failed step is recorded and
//! the remaining steps are still attempted, since the modem often recovers
//! on its own and the next publish starts from scratch anyway.

mod http;
mod tcp;

use core::fmt::{self, Debug, Write as _};

use board::hal::Monotonic;
use embedded_hal::serial::{Read, Write};
use heapless::{String, Vec};
use log::{debug, warn};

use crate::{
    error::StepError,
    payload::PayloadSchema,
    timing::{wait_for, Wait},
};

pub use http::HttpOverGprs;
pub use tcp::TcpOverWifi;

/// Bytes of reply kept while looking for the expected token
pub const RX_BUFFER_LEN: usize = 256;
/// Longest command line, terminator excluded
pub const COMMAND_LEN: usize = 128;
/// Most steps a single session records
pub const MAX_STEPS: usize = 16;

const TX_TIMEOUT_MS: u32 = 500;
/// Upper bound on stale bytes dropped before a command
const DRAIN_LIMIT: usize = 4 * RX_BUFFER_LEN;

/// A formatted AT command.
pub type Command = String<COMMAND_LEN>;

/// Format a command line, failing if it does not fit the command buffer.
pub fn command(args: fmt::Arguments<'_>) -> Result<Command, StepError> {
    let mut line = Command::new();
    line.write_fmt(args)
        .map_err(|_| StepError::CommandTooLong)?;
    Ok(line)
}

/// The exchanges a session is built from.
pub trait AtLink {
    /// Send `command` terminated by CR LF, dropping any unread reply first.
    fn send_line(&mut self, command: &str) -> Result<(), StepError>;

    /// Wait for `token` without sending anything.
    fn expect(&mut self, token: &str, timeout_ms: u32) -> Result<(), StepError>;

    /// Wait for a single prompt byte, e.g. `>` before raw data.
    fn await_prompt(&mut self, prompt: u8, timeout_ms: u32) -> Result<(), StepError>;

    /// Write raw bytes without a line terminator.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), StepError>;

    /// Send `command` and wait up to `timeout_ms` for a reply containing `expect`.
    fn exchange(&mut self, command: &str, expect: &str, timeout_ms: u32) -> Result<(), StepError> {
        self.send_line(command)?;
        self.expect(expect, timeout_ms)
    }

    /// Boolean form of [`AtLink::exchange`].
    fn send_command(&mut self, command: &str, expect: &str, timeout_ms: u32) -> bool {
        self.exchange(command, expect, timeout_ms).is_ok()
    }
}

/// A serial port with an AT modem on the other end.
pub struct AtPort<S, C> {
    serial: S,
    clock: C,
}

impl<S, C, E> AtPort<S, C>
where
    S: Read<u8, Error = E> + Write<u8, Error = E>,
    C: Monotonic,
    E: Debug,
{
    pub fn new(serial: S, clock: C) -> Self {
        Self { serial, clock }
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    fn transmit(&mut self, bytes: &[u8], timeout_ms: u32) -> Result<(), StepError> {
        for &byte in bytes {
            let serial = &mut self.serial;
            wait_for(&self.clock, timeout_ms.saturating_mul(1000), || {
                match serial.write(byte) {
                    Ok(()) => Ok(true),
                    Err(nb::Error::WouldBlock) => Ok(false),
                    Err(nb::Error::Other(err)) => Err(err),
                }
            })
            .map_err(|wait| match wait {
                Wait::Expired(_) => StepError::Timeout,
                Wait::Failed(err) => {
                    warn!("serial write failed: {err:?}");
                    StepError::Serial
                }
            })?;
        }
        Ok(())
    }

    /// Throw away whatever the modem said since the last exchange.
    fn discard_pending(&mut self) {
        let mut dropped = 0usize;
        for _ in 0..DRAIN_LIMIT {
            match self.serial.read() {
                Ok(_) => dropped += 1,
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(err)) => debug!("serial error while draining: {err:?}"),
            }
        }
        if dropped > 0 {
            debug!("discarded {dropped} stale bytes");
        }
    }

    /// Collect reply bytes until `done` is satisfied, the buffer fills or the
    /// timeout passes. Returns whether `done` was satisfied.
    fn receive(
        &mut self,
        timeout_ms: u32,
        mut done: impl FnMut(&[u8]) -> bool,
    ) -> Result<bool, StepError> {
        let mut reply: Vec<u8, RX_BUFFER_LEN> = Vec::new();
        let mut matched = false;
        let serial = &mut self.serial;
        let outcome = wait_for(&self.clock, timeout_ms.saturating_mul(1000), || {
            match serial.read() {
                Ok(byte) => {
                    // Stops on a full buffer below, so the push never fails
                    let _ = reply.push(byte);
                    matched = done(&reply);
                    Ok(matched || reply.is_full())
                }
                Err(nb::Error::WouldBlock) => Ok(false),
                Err(nb::Error::Other(err)) => Err(err),
            }
        });
        debug!(
            "modem -> {:?}",
            core::str::from_utf8(&reply).unwrap_or("<binary>")
        );

        match outcome {
            Ok(_) | Err(Wait::Expired(_)) => Ok(matched),
            Err(Wait::Failed(err)) => {
                warn!("serial read failed: {err:?}");
                Err(StepError::Serial)
            }
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

impl<S, C, E> AtLink for AtPort<S, C>
where
    S: Read<u8, Error = E> + Write<u8, Error = E>,
    C: Monotonic,
    E: Debug,
{
    fn send_line(&mut self, command: &str) -> Result<(), StepError> {
        self.discard_pending();
        debug!("modem <- {command}");
        self.transmit(command.as_bytes(), TX_TIMEOUT_MS)?;
        self.transmit(b"\r\n", TX_TIMEOUT_MS)
    }

    fn expect(&mut self, token: &str, timeout_ms: u32) -> Result<(), StepError> {
        let token = token.as_bytes();
        if self.receive(timeout_ms, |reply| contains(reply, token))? {
            Ok(())
        } else {
            Err(StepError::CommandMismatch)
        }
    }

    fn await_prompt(&mut self, prompt: u8, timeout_ms: u32) -> Result<(), StepError> {
        if self.receive(timeout_ms, |reply| reply.last() == Some(&prompt))? {
            Ok(())
        } else {
            Err(StepError::Timeout)
        }
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), StepError> {
        self.transmit(bytes, TX_TIMEOUT_MS)
    }
}

/// The result of one session step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub label: &'static str,
    pub result: Result<(), StepError>,
}

/// Every step a session attempted, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOutcome {
    steps: Vec<Step, MAX_STEPS>,
}

impl SessionOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step, passing back whether it succeeded.
    pub fn record(&mut self, label: &'static str, result: Result<(), StepError>) -> bool {
        if let Err(err) = result {
            debug!("step {label} failed: {err}");
        }
        if self.steps.push(Step { label, result }).is_err() {
            warn!("session outcome full, dropping step {label}");
        }
        result.is_ok()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_success(&self) -> bool {
        self.steps.iter().all(|step| step.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|step| step.result.is_err())
    }

    /// The step recorded under `label`, if any.
    pub fn step(&self, label: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.label == label)
    }
}

/// A way of getting a payload from the modem to the server.
pub trait Transport {
    /// The payload format the far end expects.
    fn schema(&self) -> PayloadSchema;

    /// One-time modem configuration at power-up.
    fn setup(&mut self, link: &mut impl AtLink) -> SessionOutcome;

    /// Deliver one payload.
    fn publish(&mut self, link: &mut impl AtLink, payload: &str) -> SessionOutcome;
}

/// The deployment's transport, chosen by configuration.
pub enum Uplink {
    Http(HttpOverGprs),
    Tcp(TcpOverWifi),
}

impl Transport for Uplink {
    fn schema(&self) -> PayloadSchema {
        match self {
            Uplink::Http(http) => http.schema(),
            Uplink::Tcp(tcp) => tcp.schema(),
        }
    }

    fn setup(&mut self, link: &mut impl AtLink) -> SessionOutcome {
        match self {
            Uplink::Http(http) => http.setup(link),
            Uplink::Tcp(tcp) => tcp.setup(link),
        }
    }

    fn publish(&mut self, link: &mut impl AtLink, payload: &str) -> SessionOutcome {
        match self {
            Uplink::Http(http) => http.publish(link, payload),
            Uplink::Tcp(tcp) => tcp.publish(link, payload),
        }
    }
}
