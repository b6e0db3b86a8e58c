//! Text console shared by the emulator and the firmware's USB port.
//!
//! [`Console::execute`] parses one line, runs it against the firmware and
//! writes the human-readable result into any [`fmt::Write`] sink.

use core::fmt;

use crate::command::{self, Direction, Response};
use crate::firmware::{IspFirmware, IspHardware, LifecycleError};
use crate::irq::Irq;
use crate::param::ParamError;
use crate::telemetry::{EXPOSURE_HISTORY_CAPACITY, ExposureRecorder};

pub mod catalog;
pub mod grammar;

pub use grammar::{Command, ParseError, parse};

/// Interrupt lines raised at the end of a simulated frame.
pub const FRAME_END_VECTOR: u32 =
    Irq::FrameEnd.mask() | Irq::AeStats.mask() | Irq::AwbStats.mask() | Irq::AfStats.mask();

/// Errors surfaced while executing a console line.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleError<'a> {
    Parse(ParseError<'a>),
    /// The command surface refused the request.
    Rejected(Response),
    Lifecycle(LifecycleError),
    Param(ParamError),
    /// The output sink is full or closed.
    Output,
}

impl<'a> From<ParseError<'a>> for ConsoleError<'a> {
    fn from(error: ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl From<LifecycleError> for ConsoleError<'_> {
    fn from(error: LifecycleError) -> Self {
        Self::Lifecycle(error)
    }
}

impl From<ParamError> for ConsoleError<'_> {
    fn from(error: ParamError) -> Self {
        Self::Param(error)
    }
}

impl From<fmt::Error> for ConsoleError<'_> {
    fn from(_: fmt::Error) -> Self {
        Self::Output
    }
}

impl fmt::Display for ConsoleError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Parse(error) => error.fmt(f),
            ConsoleError::Rejected(response) => {
                write!(f, "{} ({})", response.status, response.ret)
            }
            ConsoleError::Lifecycle(error) => error.fmt(f),
            ConsoleError::Param(error) => write!(f, "{error:?}"),
            ConsoleError::Output => f.write_str("output overflow"),
        }
    }
}

/// Console state kept between lines.
pub struct Console<const HISTORY: usize = EXPOSURE_HISTORY_CAPACITY> {
    history: ExposureRecorder<HISTORY>,
}

impl<const HISTORY: usize> Console<HISTORY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            history: ExposureRecorder::new(),
        }
    }

    #[must_use]
    pub const fn history(&self) -> &ExposureRecorder<HISTORY> {
        &self.history
    }

    /// Parses and executes one line.
    pub fn execute<'a, H, W, const C: usize, const Q: usize>(
        &mut self,
        firmware: &mut IspFirmware<H, C, Q>,
        line: &'a str,
        out: &mut W,
    ) -> Result<(), ConsoleError<'a>>
    where
        H: IspHardware,
        W: fmt::Write,
    {
        let command = parse(line)?;
        isp_debug!("console: {}", line.trim_end());
        self.dispatch(firmware, command, out)
    }

    fn dispatch<'a, H, W, const C: usize, const Q: usize>(
        &mut self,
        firmware: &mut IspFirmware<H, C, Q>,
        command: Command<'a>,
        out: &mut W,
    ) -> Result<(), ConsoleError<'a>>
    where
        H: IspHardware,
        W: fmt::Write,
    {
        let ctx = firmware.active_context();
        match command {
            Command::Get(spec) => {
                let ret = checked(command::command(
                    firmware,
                    ctx,
                    spec.kind,
                    spec.id,
                    0,
                    Direction::Get,
                ))?;
                writeln!(out, "{} = {} ({:#x})", spec.name, ret, ret)?;
            }
            Command::Set(spec, value) => {
                checked(command::command(
                    firmware,
                    ctx,
                    spec.kind,
                    spec.id,
                    value,
                    Direction::Set,
                ))?;
                writeln!(out, "{} <- {}", spec.name, value)?;
            }
            Command::Cmd { kind, id, value } => {
                let direction = if value.is_some() {
                    Direction::Set
                } else {
                    Direction::Get
                };
                let response = command::command(
                    firmware,
                    ctx,
                    kind,
                    id,
                    value.unwrap_or_default(),
                    direction,
                );
                writeln!(out, "{} {:#x}", response.status, response.ret)?;
            }
            Command::Frame(count) => {
                for _ in 0..count {
                    self.step(firmware)?;
                }
                if let Some(sample) = self.history.latest() {
                    writeln!(out, "{sample}")?;
                }
            }
            Command::Status => self.status(firmware, out)?,
            Command::History => {
                for sample in self.history.oldest_first() {
                    writeln!(out, "{sample}")?;
                }
                if let Some(drift) = self.history.exposure_drift() {
                    writeln!(out, "drift {drift}")?;
                }
            }
            Command::Context(Some(index)) => {
                firmware.set_active_context(usize::from(index))?;
                self.history.clear();
                writeln!(out, "context {index} active")?;
            }
            Command::Context(None) => writeln!(
                out,
                "context {} of {}",
                firmware.active_context(),
                firmware.context_count()
            )?,
            Command::Help(topic) => help(topic, out)?,
        }
        Ok(())
    }

    /// Runs one frame through the active context: end of frame with fresh
    /// statistics, the queued work, then the next frame start.
    fn step<H, const C: usize, const Q: usize>(
        &mut self,
        firmware: &mut IspFirmware<H, C, Q>,
    ) -> Result<(), ConsoleError<'static>>
    where
        H: IspHardware,
    {
        let active = firmware.active_context();
        firmware.service_vector(active, FRAME_END_VECTOR);
        firmware.process()?;
        firmware.service_vector(active, Irq::FrameStart.mask());
        firmware.process()?;
        self.record(firmware)?;
        Ok(())
    }

    /// Samples the active context into the history after a frame driven
    /// outside the console. Returns `false` when the frame was already recorded.
    pub fn record<H, const C: usize, const Q: usize>(
        &mut self,
        firmware: &mut IspFirmware<H, C, Q>,
    ) -> Result<bool, ConsoleError<'static>>
    where
        H: IspHardware,
    {
        Ok(self.history.record(firmware.active_mut()?)?)
    }

    fn status<H, W, const C: usize, const Q: usize>(
        &mut self,
        firmware: &mut IspFirmware<H, C, Q>,
        out: &mut W,
    ) -> Result<(), ConsoleError<'static>>
    where
        H: IspHardware,
        W: fmt::Write,
    {
        let active = firmware.active_context();
        let count = firmware.context_count();
        let skipped = firmware.skipped_frames();
        let context = firmware.active_mut()?;
        let shared = context.shared();
        writeln!(
            out,
            "context {}/{} frame {} frozen {} skipped {}",
            active, count, shared.frame_id, shared.frozen, skipped
        )?;
        let sample = crate::telemetry::ExposureSample::capture(context)?;
        writeln!(out, "{sample}")?;
        Ok(())
    }
}

impl<const HISTORY: usize> Default for Console<HISTORY> {
    fn default() -> Self {
        Self::new()
    }
}

fn checked(response: Response) -> Result<u32, ConsoleError<'static>> {
    if response.is_success() {
        Ok(response.ret)
    } else {
        Err(ConsoleError::Rejected(response))
    }
}

fn help<W: fmt::Write>(topic: Option<&str>, out: &mut W) -> fmt::Result {
    match topic {
        None => {
            for spec in catalog::commands() {
                writeln!(out, "{:<24} {}", spec.usage, spec.summary)?;
            }
        }
        Some(topic) if topic.eq_ignore_ascii_case("params") => {
            for spec in catalog::params() {
                writeln!(out, "{:<24} {:#04x}/{:#04x}", spec.name, spec.kind, spec.id)?;
            }
        }
        Some(topic) => match catalog::find(topic) {
            Some(spec) => writeln!(out, "{}: {}", spec.usage, spec.summary)?,
            None => writeln!(out, "no help for `{topic}`")?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Status;
    use crate::command::tests::firmware;
    use heapless::String;

    fn run<const N: usize>(
        console: &mut Console<4>,
        firmware: &mut IspFirmware<crate::firmware::NullHardware, 2, 32>,
        line: &'static str,
        out: &mut String<N>,
    ) -> Result<(), ConsoleError<'static>> {
        out.clear();
        console.execute(firmware, line, out)
    }

    #[test]
    fn named_set_then_get() {
        let mut firmware = firmware();
        let mut console = Console::new();
        let mut out: String<128> = String::new();
        run(&mut console, &mut firmware, "set ae_mode 2", &mut out).expect("accepted");
        run(&mut console, &mut firmware, "get ae_mode", &mut out).expect("accepted");
        assert_eq!(out.as_str(), "ae_mode = 2 (0x2)\n");
    }

    #[test]
    fn rejections_carry_the_response() {
        let mut firmware = firmware();
        let mut console = Console::new();
        let mut out: String<128> = String::new();
        match run(&mut console, &mut firmware, "set revision 3", &mut out) {
            Err(ConsoleError::Rejected(response)) => {
                assert_eq!(response.status, Status::NotSupported);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            run(&mut console, &mut firmware, "get bogus", &mut out),
            Err(ConsoleError::Parse(ParseError::UnknownParam("bogus")))
        ));
    }

    #[test]
    fn raw_commands_print_status() {
        let mut firmware = firmware();
        let mut console = Console::new();
        let mut out: String<128> = String::new();
        run(&mut console, &mut firmware, "cmd 0x0c 0xff", &mut out).expect("printed");
        assert_eq!(out.as_str(), "NOT_EXISTS 0x0\n");
    }

    #[test]
    fn frames_feed_the_history() {
        let mut firmware = firmware();
        let mut console = Console::new();
        let mut out: String<256> = String::new();
        let before = firmware.active_mut().expect("active").shared().frame_id;
        run(&mut console, &mut firmware, "frame 6", &mut out).expect("frames run");
        let after = firmware.active_mut().expect("active").shared().frame_id;
        assert_eq!(after, before + 6);
        assert_eq!(console.history().len(), 4);
        assert_eq!(
            console.history().latest().map(|sample| sample.frame_id),
            Some(after)
        );
        assert!(out.starts_with("frame "));
    }

    #[test]
    fn context_switch_is_checked() {
        let mut firmware = firmware();
        let mut console = Console::new();
        let mut out: String<128> = String::new();
        run(&mut console, &mut firmware, "context 1", &mut out).expect("selected");
        assert_eq!(firmware.active_context(), 1);
        assert_eq!(
            run(&mut console, &mut firmware, "context 2", &mut out),
            Err(ConsoleError::Lifecycle(LifecycleError::BadContext(2)))
        );
        run(&mut console, &mut firmware, "context", &mut out).expect("printed");
        assert_eq!(out.as_str(), "context 1 of 2\n");
    }

    #[test]
    fn help_lists_every_command() {
        let mut firmware = firmware();
        let mut console = Console::new();
        let mut out: String<1024> = String::new();
        run(&mut console, &mut firmware, "help", &mut out).expect("printed");
        assert_eq!(out.lines().count(), catalog::commands().len());
        run(&mut console, &mut firmware, "help frame", &mut out).expect("printed");
        assert!(out.starts_with("frame [count]"));
    }

    #[test]
    fn small_sinks_report_overflow() {
        let mut firmware = firmware();
        let mut console = Console::new();
        let mut out: String<4> = String::new();
        assert_eq!(
            run(&mut console, &mut firmware, "status", &mut out),
            Err(ConsoleError::Output)
        );
    }
}
