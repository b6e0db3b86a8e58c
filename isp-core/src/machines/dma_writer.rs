//! Frame writer configuration for the FR and DS output pipes.

use crate::event::Event;
use crate::irq::{Irq, IrqMask};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::regs::DmaRegs;
use crate::sensor::Resolution;

use super::StateMachine;
use super::crop::CropGet;
use super::matrix_yuv::{MatrixYuvSet, PipeOutput};

/// Line strides are padded to this many bytes.
const LINE_ALIGN_BYTES: u32 = 16;

/// Output pipe of the ISP.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DmaPipe {
    #[default]
    Fr,
    Ds,
}

impl DmaPipe {
    pub const ALL: [DmaPipe; 2] = [DmaPipe::Fr, DmaPipe::Ds];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            DmaPipe::Fr => 0,
            DmaPipe::Ds => 1,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            DmaPipe::Fr => "fr",
            DmaPipe::Ds => "ds",
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(DmaPipe::Fr),
            1 => Some(DmaPipe::Ds),
            _ => None,
        }
    }

    const fn ready_event(self) -> Event {
        match self {
            DmaPipe::Fr => Event::FrameBufferFrReady,
            DmaPipe::Ds => Event::FrameBufferDsReady,
        }
    }
}

/// Pixel layout written to memory, numbered as on the command surface.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DmaFormat {
    #[default]
    Disable,
    Rgb32,
    A2r10g10b10,
    Rgb565,
    Rgb24,
    Gen32,
    Raw16,
    Raw12,
    Ayuv,
    Y410,
    Yuy2,
    Uyvy,
    Y210,
    Nv12Yuv,
    Nv12Yvu,
    Yv12Yu,
    Yv12Yv,
}

impl DmaFormat {
    const ALL: [DmaFormat; 17] = [
        DmaFormat::Disable,
        DmaFormat::Rgb32,
        DmaFormat::A2r10g10b10,
        DmaFormat::Rgb565,
        DmaFormat::Rgb24,
        DmaFormat::Gen32,
        DmaFormat::Raw16,
        DmaFormat::Raw12,
        DmaFormat::Ayuv,
        DmaFormat::Y410,
        DmaFormat::Yuy2,
        DmaFormat::Uyvy,
        DmaFormat::Y210,
        DmaFormat::Nv12Yuv,
        DmaFormat::Nv12Yvu,
        DmaFormat::Yv12Yu,
        DmaFormat::Yv12Yv,
    ];

    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|index| Self::ALL.get(index))
            .copied()
    }

    /// Bits per pixel of the primary plane.
    #[must_use]
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            DmaFormat::Disable => 0,
            DmaFormat::Nv12Yuv | DmaFormat::Nv12Yvu | DmaFormat::Yv12Yu | DmaFormat::Yv12Yv => 8,
            DmaFormat::Rgb565
            | DmaFormat::Raw16
            | DmaFormat::Raw12
            | DmaFormat::Yuy2
            | DmaFormat::Uyvy => 16,
            DmaFormat::Rgb24 => 24,
            DmaFormat::Y210 => 20,
            DmaFormat::Rgb32
            | DmaFormat::A2r10g10b10
            | DmaFormat::Gen32
            | DmaFormat::Ayuv
            | DmaFormat::Y410 => 32,
        }
    }

    /// Colour layout the pipe must produce for this format.
    #[must_use]
    pub const fn pipe_output(self) -> PipeOutput {
        match self {
            DmaFormat::Ayuv | DmaFormat::Y410 => PipeOutput::Yuv444,
            DmaFormat::Yuy2 | DmaFormat::Uyvy | DmaFormat::Y210 => PipeOutput::Yuv422,
            DmaFormat::Nv12Yuv | DmaFormat::Nv12Yvu | DmaFormat::Yv12Yu | DmaFormat::Yv12Yv => {
                PipeOutput::Yuv420
            }
            _ => PipeOutput::Rgb,
        }
    }

    #[must_use]
    pub const fn is_raw(self) -> bool {
        matches!(self, DmaFormat::Raw12 | DmaFormat::Raw16)
    }
}

/// Bytes per line, rounded up to the writer's alignment.
#[must_use]
pub fn line_offset(width: u16, format: DmaFormat) -> u32 {
    let bytes = (u32::from(width) * format.bits_per_pixel()).div_ceil(8);
    bytes.div_ceil(LINE_ALIGN_BYTES) * LINE_ALIGN_BYTES
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DmaWriterState {
    #[default]
    WaitForSensor,
    Init,
    WaitEvents,
    FrFinished,
    DsFinished,
    MetadataPrepared,
    BufReinit,
}

impl DmaWriterState {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DmaWriterGet {
    State,
    Vflip,
    ReaderOutput,
    ReaderOffsetX,
    ReaderOffsetY,
    /// Start of the visible window inside the reader's pipe buffer.
    ReaderAddress,
    FpsThrottle(DmaPipe),
    Format(DmaPipe),
    FramesWritten(DmaPipe),
    /// Frame id stamped on the last metadata record.
    MetadataFrameId,
    /// Full-resolution pipe writes sensor data without processing.
    RawBypass,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DmaWriterSet {
    Vflip(bool),
    ReaderOutput(DmaPipe),
    ReaderOffsetX(u32),
    ReaderOffsetY(u32),
    /// Write one frame in `factor`; zero is rejected.
    FpsThrottle(DmaPipe, u8),
    Format(DmaPipe, DmaFormat),
    Buffer(DmaPipe, u32),
    /// Pipe settings changed; reprogram on the next drain.
    PipeSetting,
    RawBypass(bool),
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct PipeState {
    format: DmaFormat,
    buffer: u32,
    fps_throttle: u8,
    frames_in: u32,
    frames_written: u32,
}

pub struct DmaWriterMachine {
    mask: IrqMask,
    state: DmaWriterState,
    vflip: bool,
    reader_output: DmaPipe,
    reader_offset_x: u32,
    reader_offset_y: u32,
    pipes: [PipeState; 2],
    metadata_frame_id: u32,
    raw_bypass: bool,
}

impl DmaWriterMachine {
    #[must_use]
    pub const fn new() -> Self {
        let pipe = PipeState {
            format: DmaFormat::Rgb32,
            buffer: 0,
            fps_throttle: 1,
            frames_in: 0,
            frames_written: 0,
        };
        Self {
            mask: IrqMask::repeating(Irq::FrameWriterFr.mask() | Irq::FrameWriterDs.mask()),
            state: DmaWriterState::WaitForSensor,
            vflip: false,
            reader_output: DmaPipe::Fr,
            reader_offset_x: 0,
            reader_offset_y: 0,
            pipes: [pipe; 2],
            metadata_frame_id: 0,
            raw_bypass: false,
        }
    }

    fn regs<'a>(env: &'a mut Env<'_>, pipe: DmaPipe) -> &'a mut DmaRegs {
        match pipe {
            DmaPipe::Fr => &mut env.shared.regs.dma_fr,
            DmaPipe::Ds => &mut env.shared.regs.dma_ds,
        }
    }

    /// Reprograms both writers from the current pipe output sizes.
    fn update_buffers(&mut self, env: &mut Env<'_>) {
        let active = Resolution::new(env.shared.regs.active_width, env.shared.regs.active_height);
        for pipe in DmaPipe::ALL {
            let size = match env.get(Get::Crop(CropGet::Output(pipe))) {
                Ok(ParamValue::Resolution(size)) => size,
                _ => active,
            };
            let settings = self.pipes[pipe.index()];
            let stride = line_offset(size.width, settings.format);
            let frame_bytes = stride * u32::from(size.height);

            let regs = Self::regs(env, pipe);
            regs.enable = settings.format != DmaFormat::Disable;
            regs.format = u8::try_from(settings.format.to_raw()).unwrap_or(0);
            regs.active_width = size.width;
            regs.active_height = size.height;
            regs.vflip = self.vflip;
            if self.vflip && frame_bytes != 0 {
                // Start at the last line and walk backwards.
                regs.base_address = settings.buffer.wrapping_add(frame_bytes - stride);
                regs.line_offset = stride.wrapping_neg();
            } else {
                regs.base_address = settings.buffer;
                regs.line_offset = stride;
            }
            isp_debug!(
                "{} writer {}x{} stride {} format {}",
                pipe.label(),
                size.width,
                size.height,
                stride,
                settings.format.to_raw()
            );
        }
        env.shared.regs.dma_reader_output = u8::try_from(self.reader_output.index()).unwrap_or(0);
        env.shared.regs.fr_raw_bypass = self.raw_bypass;
    }

    fn reader_address(&self, env: &Env<'_>) -> u32 {
        let pipe = self.reader_output;
        let regs = match pipe {
            DmaPipe::Fr => &env.shared.regs.dma_fr,
            DmaPipe::Ds => &env.shared.regs.dma_ds,
        };
        let stride = line_offset(regs.active_width, self.pipes[pipe.index()].format);
        self.pipes[pipe.index()]
            .buffer
            .wrapping_add(self.reader_offset_y.wrapping_mul(stride))
            .wrapping_add(self.reader_offset_x)
    }

    /// Runs `op` in a transient state and returns to waiting for events.
    fn transition(&mut self, via: DmaWriterState, op: impl FnOnce(&mut Self)) -> bool {
        self.state = via;
        op(self);
        self.state = DmaWriterState::WaitEvents;
        true
    }

    fn frame_written(&mut self, pipe: DmaPipe, env: &mut Env<'_>) {
        let settings = &mut self.pipes[pipe.index()];
        settings.frames_in = settings.frames_in.wrapping_add(1);
        let factor = u32::from(settings.fps_throttle.max(1));
        let skip = settings.frames_in % factor != 0;
        Self::regs(env, pipe).frame_write_cancel = skip;
        if !skip {
            env.raise(pipe.ready_event());
            if pipe == DmaPipe::Fr {
                env.raise(Event::FrameBufferMetadata);
            }
        }
    }
}

impl Default for DmaWriterMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for DmaWriterMachine {
    fn id(&self) -> MachineId {
        MachineId::DmaWriter
    }

    fn init(&mut self, _env: &mut Env<'_>) {
        *self = Self::new();
    }

    fn irq_mask(&mut self) -> Option<&mut IrqMask> {
        Some(&mut self.mask)
    }

    fn process_interrupt(&mut self, irq: Irq, env: &mut Env<'_>) {
        if self.state == DmaWriterState::WaitForSensor {
            return;
        }
        match irq {
            Irq::FrameWriterFr => self.frame_written(DmaPipe::Fr, env),
            Irq::FrameWriterDs => self.frame_written(DmaPipe::Ds, env),
            _ => {}
        }
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        let waiting = self.state == DmaWriterState::WaitEvents;
        match event {
            Event::SensorReady | Event::CropUpdated
                if waiting || self.state == DmaWriterState::WaitForSensor =>
            {
                self.transition(DmaWriterState::Init, |machine| machine.update_buffers(env))
            }
            Event::FrameBufReinit if waiting => {
                self.transition(DmaWriterState::BufReinit, |machine| machine.update_buffers(env))
            }
            Event::FrameBufferFrReady if waiting => {
                self.transition(DmaWriterState::FrFinished, |machine| {
                    let pipe = &mut machine.pipes[DmaPipe::Fr.index()];
                    pipe.frames_written = pipe.frames_written.wrapping_add(1);
                })
            }
            Event::FrameBufferDsReady if waiting => {
                self.transition(DmaWriterState::DsFinished, |machine| {
                    let pipe = &mut machine.pipes[DmaPipe::Ds.index()];
                    pipe.frames_written = pipe.frames_written.wrapping_add(1);
                })
            }
            Event::FrameBufferMetadata if waiting => {
                let frame_id = env.shared.frame_id;
                self.transition(DmaWriterState::MetadataPrepared, |machine| {
                    machine.metadata_frame_id = frame_id;
                })
            }
            Event::SensorNotReady if self.state != DmaWriterState::WaitForSensor => {
                self.state = DmaWriterState::WaitForSensor;
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::DmaWriter(request) = request else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            DmaWriterGet::State => self.state.to_raw(),
            DmaWriterGet::Vflip => return Ok(ParamValue::Bool(self.vflip)),
            DmaWriterGet::ReaderOutput => u32::try_from(self.reader_output.index()).unwrap_or(0),
            DmaWriterGet::ReaderOffsetX => self.reader_offset_x,
            DmaWriterGet::ReaderOffsetY => self.reader_offset_y,
            DmaWriterGet::ReaderAddress => self.reader_address(env),
            DmaWriterGet::FpsThrottle(pipe) => u32::from(self.pipes[pipe.index()].fps_throttle),
            DmaWriterGet::Format(pipe) => self.pipes[pipe.index()].format.to_raw(),
            DmaWriterGet::FramesWritten(pipe) => self.pipes[pipe.index()].frames_written,
            DmaWriterGet::MetadataFrameId => self.metadata_frame_id,
            DmaWriterGet::RawBypass => return Ok(ParamValue::Bool(self.raw_bypass)),
        };
        Ok(ParamValue::U32(value))
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::DmaWriter(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            DmaWriterSet::Vflip(on) => self.vflip = on,
            DmaWriterSet::ReaderOutput(pipe) => self.reader_output = pipe,
            DmaWriterSet::ReaderOffsetX(offset) => self.reader_offset_x = offset,
            DmaWriterSet::ReaderOffsetY(offset) => self.reader_offset_y = offset,
            DmaWriterSet::FpsThrottle(_, 0) => return Err(ParamError::BadArgument),
            DmaWriterSet::FpsThrottle(pipe, factor) => {
                self.pipes[pipe.index()].fps_throttle = factor;
            }
            DmaWriterSet::Format(pipe, format) => {
                self.pipes[pipe.index()].format = format;
                env.notify(Set::MatrixYuv(MatrixYuvSet::OutputFormat(
                    pipe,
                    format.pipe_output(),
                )));
                if pipe == DmaPipe::Fr {
                    self.raw_bypass = format.is_raw();
                    if self.raw_bypass {
                        isp_info!("fr output is raw, raw bypass enabled");
                    }
                }
            }
            DmaWriterSet::RawBypass(on) => self.raw_bypass = on,
            DmaWriterSet::Buffer(pipe, address) => self.pipes[pipe.index()].buffer = address,
            DmaWriterSet::PipeSetting => {
                env.raise(Event::FrameBufReinit);
                return Ok(());
            }
        }

        if self.state != DmaWriterState::WaitForSensor {
            self.update_buffers(env);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_offset_is_aligned() {
        assert_eq!(line_offset(1920, DmaFormat::Rgb32), 7680);
        assert_eq!(line_offset(1921, DmaFormat::Rgb32), 7696);
        assert_eq!(line_offset(1920, DmaFormat::Nv12Yuv), 1920);
        assert_eq!(line_offset(100, DmaFormat::Rgb24), 304);
        assert_eq!(line_offset(1920, DmaFormat::Disable), 0);
    }

    #[test]
    fn formats_map_to_pipe_outputs() {
        assert_eq!(DmaFormat::Rgb32.pipe_output(), PipeOutput::Rgb);
        assert_eq!(DmaFormat::Ayuv.pipe_output(), PipeOutput::Yuv444);
        assert_eq!(DmaFormat::Uyvy.pipe_output(), PipeOutput::Yuv422);
        assert_eq!(DmaFormat::Nv12Yvu.pipe_output(), PipeOutput::Yuv420);
    }

    #[test]
    fn only_raw_formats_bypass() {
        assert!(DmaFormat::Raw12.is_raw());
        assert!(DmaFormat::Raw16.is_raw());
        assert!(!DmaFormat::Gen32.is_raw());
    }

    #[test]
    fn command_numbering_round_trips() {
        assert_eq!(DmaFormat::from_raw(0x0D), Some(DmaFormat::Nv12Yuv));
        assert_eq!(DmaFormat::Yv12Yv.to_raw(), 0x10);
        assert_eq!(DmaFormat::from_raw(0x11), None);
    }
}
