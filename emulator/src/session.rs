use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use isp_core::calibration::CalibrationError;
use isp_core::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};
use isp_core::console::{self, Command, Console, ConsoleError, FRAME_END_VECTOR};
use isp_core::firmware::{ContextSettings, IspFirmware, LifecycleError, MAX_CONTEXTS};
use isp_core::irq::Irq;
use isp_core::logging::LogLevel;
use isp_core::machines::AeAlgorithm;
use isp_core::param::ParamError;
use isp_core::sensor::SensorBackend;
use isp_core::telemetry::ExposureSample;

use crate::scene::Scene;

/// Event queue depth per emulated context.
pub const QUEUE_DEPTH: usize = 64;

/// Address stride between emulated ISP instances.
const ISP_BASE_STRIDE: u32 = 0x1_0000;

pub type EmulatedFirmware = IspFirmware<Scene, MAX_CONTEXTS, QUEUE_DEPTH>;

const SCENE_USAGE: &str = "scene [brightness]       show or change the scene brightness, 0..=255";

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub brightness: u8,
    pub contexts: usize,
    pub transcript: Option<PathBuf>,
    /// Header written at the top of the transcript.
    pub title: &'static str,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            brightness: 128,
            contexts: 1,
            transcript: None,
            title: "ISP emulator transcript",
        }
    }
}

#[derive(Debug)]
pub enum SessionError {
    Io(io::Error),
    Lifecycle(LifecycleError),
    Calibration(CalibrationError),
    Param(ParamError),
    Console(ConsoleError<'static>),
}

impl From<io::Error> for SessionError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<LifecycleError> for SessionError {
    fn from(error: LifecycleError) -> Self {
        Self::Lifecycle(error)
    }
}

impl From<CalibrationError> for SessionError {
    fn from(error: CalibrationError) -> Self {
        Self::Calibration(error)
    }
}

impl From<ParamError> for SessionError {
    fn from(error: ParamError) -> Self {
        Self::Param(error)
    }
}

impl From<ConsoleError<'static>> for SessionError {
    fn from(error: ConsoleError<'static>) -> Self {
        Self::Console(error)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Io(error) => write!(f, "i/o: {error}"),
            SessionError::Lifecycle(error) => write!(f, "firmware: {error}"),
            SessionError::Calibration(error) => write!(f, "calibration: {error}"),
            SessionError::Param(error) => write!(f, "parameter: {error}"),
            SessionError::Console(error) => write!(f, "console: {error}"),
        }
    }
}

impl std::error::Error for SessionError {}

pub struct Session {
    firmware: EmulatedFirmware,
    console: Console,
    transcript: Option<TranscriptLogger>,
    started_at: Instant,
    log_level: LogLevel,
}

impl Session {
    pub fn new(config: &SessionConfig) -> Result<Self, SessionError> {
        let mut settings = Vec::with_capacity(config.contexts);
        for index in 0..config.contexts {
            settings.push(ContextSettings {
                sensor: SensorBackend::default(),
                ae: AeAlgorithm::default(),
                calibrations: dummy_calibrations()?,
                iso_base: DEFAULT_ISO_BASE_GAINS,
                isp_base: ISP_BASE_STRIDE.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX)),
                event_budget: None,
            });
        }

        let mut firmware = IspFirmware::new(Scene::new(config.brightness));
        firmware.init(settings)?;
        let handled = firmware.process()?;
        log::info!(
            "{} context(s) up, {} bring-up events handled",
            firmware.context_count(),
            handled
        );

        let log_level = firmware.active_mut()?.shared().log_level;
        let transcript = match &config.transcript {
            Some(path) => Some(TranscriptLogger::new(path, config.title)?),
            None => None,
        };

        Ok(Self {
            firmware,
            console: Console::new(),
            transcript,
            started_at: Instant::now(),
            log_level,
        })
    }

    /// One-line account of the session so far.
    pub fn summary(&self) -> String {
        format!(
            "{} frame(s) sampled, {} commit(s), {} skipped frame start(s)",
            self.console.history().len(),
            self.firmware.hardware().commits(),
            self.firmware.skipped_frames()
        )
    }

    /// Runs one console line and returns what it printed.
    pub fn handle_line(&mut self, line: &str) -> Result<Vec<String>, SessionError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let elapsed = self.started_at.elapsed();
        self.record(elapsed, TranscriptRole::Host, &[trimmed.to_string()])?;

        let lines = if let Some(rest) = scene_command(trimmed) {
            self.handle_scene(rest)
        } else if let Ok(Command::Frame(count)) = console::parse(trimmed) {
            match self.run_frames(count)? {
                Some(sample) => vec![sample.to_string()],
                None => Vec::new(),
            }
        } else {
            let mut out = String::new();
            let result = self.console.execute(&mut self.firmware, trimmed, &mut out);
            let mut lines: Vec<String> = out.lines().map(str::to_string).collect();
            match result {
                Ok(()) => {
                    if matches!(console::parse(trimmed), Ok(Command::Help(None))) {
                        lines.push(SCENE_USAGE.to_string());
                    }
                }
                Err(error) => lines.push(format!("ERR {error}")),
            }
            lines
        };

        self.sync_log_level();
        self.record(elapsed, TranscriptRole::Emulator, &lines)?;
        Ok(lines)
    }

    /// Drives `count` frames through the interrupt path, feeding each frame's
    /// exposure back into the scene.
    pub fn run_frames(&mut self, count: u32) -> Result<Option<ExposureSample>, SessionError> {
        let mut latest = None;
        for _ in 0..count {
            let base = self.active_base();
            self.firmware.hardware_mut().raise(base, FRAME_END_VECTOR);
            self.firmware.interrupt_handler()?;
            self.firmware.process()?;
            self.firmware.hardware_mut().raise(base, Irq::FrameStart.mask());
            self.firmware.interrupt_handler()?;
            self.firmware.process()?;

            let sample = ExposureSample::capture(self.firmware.active_mut()?)?;
            self.firmware.hardware_mut().expose(sample.exposure_log2);
            if self.console.record(&mut self.firmware)? {
                log::debug!("{sample}");
            }
            latest = Some(sample);
        }
        Ok(latest)
    }

    fn active_base(&self) -> u32 {
        let index = u32::try_from(self.firmware.active_context()).unwrap_or(u32::MAX);
        ISP_BASE_STRIDE.saturating_mul(index)
    }

    fn handle_scene(&mut self, argument: &str) -> Vec<String> {
        let scene = self.firmware.hardware_mut();
        if !argument.is_empty() {
            match argument.parse::<u8>() {
                Ok(brightness) => scene.set_brightness(brightness),
                Err(_) => return vec![format!("ERR brightness `{argument}` is not 0..=255")],
            }
        }
        vec![format!(
            "scene brightness {} luma {} streaming {} commits {}",
            scene.brightness(),
            scene.luma_bin(),
            scene.streaming(),
            scene.commits()
        )]
    }

    /// Mirrors the firmware's logger level onto the host logger when it changes.
    fn sync_log_level(&mut self) {
        let Some(context) = self.firmware.context(self.firmware.active_context()) else {
            return;
        };
        let level = context.shared().log_level;
        if level == self.log_level {
            return;
        }
        self.log_level = level;
        log::set_max_level(level_filter(level));
        log::info!("log level now {level:?}");
    }

    fn record(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        lines: &[String],
    ) -> Result<(), SessionError> {
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(elapsed, role, line)?;
            }
        }
        Ok(())
    }
}

fn scene_command(line: &str) -> Option<&str> {
    let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
    keyword
        .eq_ignore_ascii_case("scene")
        .then(|| rest.trim())
}

/// Host logger filter for a firmware logger level.
pub fn level_filter(level: LogLevel) -> log::LevelFilter {
    match level {
        LogLevel::Debug => log::LevelFilter::Debug,
        LogLevel::Info | LogLevel::Notice => log::LevelFilter::Info,
        LogLevel::Warning => log::LevelFilter::Warn,
        LogLevel::Error | LogLevel::Critical => log::LevelFilter::Error,
        LogLevel::Nothing => log::LevelFilter::Off,
    }
}

struct TranscriptLogger {
    writer: BufWriter<fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, title: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# {title}")?;
        writeln!(logger.writer, "# Timestamps are milliseconds since session start")?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(brightness: u8) -> Session {
        let config = SessionConfig {
            brightness,
            ..SessionConfig::default()
        };
        Session::new(&config).expect("session starts")
    }

    #[test]
    fn console_lines_are_answered() {
        let mut session = session(128);
        assert_eq!(
            session.handle_line("set ae_mode 2").expect("handled"),
            vec!["ae_mode <- 2".to_string()]
        );
        let lines = session.handle_line("get nothing").expect("handled");
        assert_eq!(lines, vec!["ERR unknown parameter `nothing`".to_string()]);
    }

    #[test]
    fn frames_run_through_the_interrupt_path() {
        let mut session = session(40);
        let lines = session.handle_line("frame 4").expect("handled");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("frame "));
        assert_eq!(session.console.history().len(), 4);
        assert!(session.firmware.hardware().commits() >= 4);
        assert!(session.summary().starts_with("4 frame(s) sampled, "));
    }

    #[test]
    fn scene_brightness_is_adjustable() {
        let mut session = session(10);
        let lines = session.handle_line("scene 200").expect("handled");
        assert!(lines[0].starts_with("scene brightness 200 "));
        let lines = session.handle_line("scene bright").expect("handled");
        assert!(lines[0].starts_with("ERR "));
    }

    #[test]
    fn help_mentions_the_scene() {
        let mut session = session(10);
        let lines = session.handle_line("help").expect("handled");
        assert_eq!(lines.last().map(String::as_str), Some(SCENE_USAGE));
    }

    #[test]
    fn logger_levels_map_onto_host_filters() {
        assert_eq!(level_filter(LogLevel::Debug), log::LevelFilter::Debug);
        assert_eq!(level_filter(LogLevel::Notice), log::LevelFilter::Info);
        assert_eq!(level_filter(LogLevel::Critical), log::LevelFilter::Error);
        assert_eq!(level_filter(LogLevel::Nothing), log::LevelFilter::Off);
    }
}
