//! Operator console over the USB CDC port.
//!
//! Bytes from the host are assembled into lines here; each complete line runs
//! through the shared [`Console`] and its output is cut into packet-sized
//! frames for the USB task.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write;
use core::str;

use heapless::{String, Vec};
use isp_core::console::Console;
use isp_core::firmware::IspFirmware;
use isp_core::IspHardware;

use crate::config::{MAX_LINE_LEN, MAX_RESPONSE_LEN};
use crate::status;

/// Payload bytes carried by one USB packet.
pub const FRAME_CAPACITY: usize = 64;

pub const PROMPT: &str = "> ";

pub type ConsoleFrame = Vec<u8, FRAME_CAPACITY>;

/// Text produced for one line.
pub type ConsoleOutput = String<MAX_RESPONSE_LEN>;

/// Traffic from the USB task to the console task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConsoleEvent {
    Connected,
    Received(ConsoleFrame),
    Disconnected,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineError {
    /// Input exceeded [`MAX_LINE_LEN`]; the partial line was discarded.
    LineOverflow,
    InvalidUtf8,
}

/// Line discipline plus console state for one CDC session.
pub struct ConsoleSession {
    console: Console,
    buffer: Vec<u8, MAX_LINE_LEN>,
    connected: bool,
}

impl ConsoleSession {
    pub const fn new() -> Self {
        Self {
            console: Console::new(),
            buffer: Vec::new(),
            connected: false,
        }
    }

    /// Host opened the port: greet it with the current status.
    pub fn on_connect(&mut self, out: &mut ConsoleOutput) {
        self.connected = true;
        self.buffer.clear();
        status::set_console_attached(true);
        // A full buffer only truncates the greeting.
        let _ = write!(out, "isp console: {}\r\n{PROMPT}", status::snapshot());
    }

    pub fn on_disconnect(&mut self) {
        self.connected = false;
        self.buffer.clear();
        status::set_console_attached(false);
    }

    /// Feeds one byte. Returns `Ok(true)` once a complete line is waiting
    /// for [`ConsoleSession::execute`].
    pub fn push(&mut self, byte: u8) -> Result<bool, LineError> {
        if !self.connected {
            return Ok(false);
        }

        match byte {
            b'\r' | b'\n' => Ok(!self.buffer.is_empty()),
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(false)
            }
            value => self.buffer.push(value).map(|()| false).map_err(|_| {
                self.buffer.clear();
                LineError::LineOverflow
            }),
        }
    }

    /// Runs the buffered line and writes its output followed by a prompt.
    pub fn execute<H, const C: usize, const Q: usize>(
        &mut self,
        firmware: &mut IspFirmware<H, C, Q>,
        out: &mut ConsoleOutput,
    ) -> Result<(), LineError>
    where
        H: IspHardware,
    {
        let result = match str::from_utf8(&self.buffer) {
            Ok(line) => {
                if let Err(error) = self.console.execute(firmware, line, out) {
                    let _ = writeln!(out, "ERR {error}");
                }
                Ok(())
            }
            Err(_) => {
                let _ = writeln!(out, "ERR invalid utf-8");
                Err(LineError::InvalidUtf8)
            }
        };
        self.buffer.clear();
        let _ = out.push_str(PROMPT);
        result
    }
}

impl Default for ConsoleSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Cuts `text` into USB-sized frames, expanding `\n` to `\r\n`.
pub fn frames(text: &str) -> impl Iterator<Item = ConsoleFrame> + '_ {
    let mut bytes = text.bytes();
    let mut pending_lf = false;
    core::iter::from_fn(move || {
        let mut frame = ConsoleFrame::new();
        while !frame.is_full() {
            if pending_lf {
                pending_lf = false;
                let _ = frame.push(b'\n');
                continue;
            }
            let Some(byte) = bytes.next() else { break };
            if byte == b'\n' {
                let _ = frame.push(b'\r');
                pending_lf = true;
            } else {
                let _ = frame.push(byte);
            }
        }
        (!frame.is_empty()).then_some(frame)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use isp_core::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};
    use isp_core::firmware::{ContextSettings, NullHardware};
    use isp_core::machines::AeAlgorithm;
    use isp_core::sensor::SensorBackend;

    fn firmware() -> IspFirmware<NullHardware, 1, 32> {
        let mut firmware = IspFirmware::new(NullHardware::new());
        firmware
            .init([ContextSettings {
                sensor: SensorBackend::default(),
                ae: AeAlgorithm::default(),
                calibrations: dummy_calibrations().expect("defaults fit"),
                iso_base: DEFAULT_ISO_BASE_GAINS,
                isp_base: 0,
                event_budget: None,
            }])
            .expect("one context");
        firmware.process().expect("initialized");
        firmware
    }

    fn type_line(session: &mut ConsoleSession, line: &str) -> bool {
        let mut complete = false;
        for byte in line.bytes() {
            complete = session.push(byte).expect("fits");
        }
        complete
    }

    #[test]
    fn bytes_before_connect_are_ignored() {
        let mut session = ConsoleSession::new();
        assert!(!type_line(&mut session, "status\n"));
    }

    #[test]
    fn complete_lines_execute_with_a_prompt() {
        let mut firmware = firmware();
        let mut session = ConsoleSession::new();
        let mut out = ConsoleOutput::new();
        session.on_connect(&mut out);
        assert!(out.ends_with(PROMPT));

        assert!(type_line(&mut session, "get ae_mode\r"));
        out.clear();
        session.execute(&mut firmware, &mut out).expect("utf-8");
        assert_eq!(out.as_str(), "ae_mode = 0 (0x0)\n> ");
    }

    #[test]
    fn backspace_edits_and_errors_are_reported() {
        let mut firmware = firmware();
        let mut session = ConsoleSession::new();
        let mut out = ConsoleOutput::new();
        session.on_connect(&mut out);

        assert!(type_line(&mut session, "get ae_modx\x08e\n"));
        out.clear();
        session.execute(&mut firmware, &mut out).expect("utf-8");
        assert!(out.starts_with("ae_mode = "));

        assert!(type_line(&mut session, "frobnicate\n"));
        out.clear();
        session.execute(&mut firmware, &mut out).expect("utf-8");
        assert_eq!(out.as_str(), "ERR unknown command `frobnicate`\n> ");
    }

    #[test]
    fn overlong_lines_are_dropped() {
        let mut session = ConsoleSession::new();
        let mut out = ConsoleOutput::new();
        session.on_connect(&mut out);
        for _ in 0..MAX_LINE_LEN {
            assert_eq!(session.push(b'a'), Ok(false));
        }
        assert_eq!(session.push(b'a'), Err(LineError::LineOverflow));
        assert_eq!(session.push(b'\n'), Ok(false));
    }

    #[test]
    fn frames_expand_newlines_and_split() {
        let text = "ab\ncd";
        let collected: std::vec::Vec<ConsoleFrame> = frames(text).collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].as_slice(), b"ab\r\ncd");

        let long = "x".repeat(FRAME_CAPACITY * 2 + 1);
        let sizes: std::vec::Vec<usize> = frames(&long).map(|frame| frame.len()).collect();
        assert_eq!(sizes, [FRAME_CAPACITY, FRAME_CAPACITY, 1]);
    }
}
