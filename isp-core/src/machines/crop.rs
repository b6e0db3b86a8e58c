//! Crop and scaler geometry for the FR and DS output pipes.
//!
//! Settings are validated against the active resolution when they are written
//! but only reach the register file from the frame-writer interrupt (or when
//! the active resolution changes), so a frame never sees half a geometry.

use crate::event::Event;
use crate::irq::{Irq, IrqMask};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::regs::{CropRegs, ScalerRegs};
use crate::sensor::Resolution;

use super::StateMachine;
use super::dma_writer::DmaPipe;

/// Increments at or above this value would exceed the 16x downscale limit.
const TINC_LIMIT: u32 = 1 << 24;

/// Block addressed by the upper half of a packed resize command.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ResizeTarget {
    #[default]
    CropFr,
    CropDs,
    ScalerDs,
    ScalerFr,
}

impl ResizeTarget {
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            ResizeTarget::CropFr => 0,
            ResizeTarget::CropDs => 1,
            ResizeTarget::ScalerDs => 2,
            ResizeTarget::ScalerFr => 3,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(ResizeTarget::CropFr),
            1 => Some(ResizeTarget::CropDs),
            2 => Some(ResizeTarget::ScalerDs),
            3 => Some(ResizeTarget::ScalerFr),
            _ => None,
        }
    }

    const fn pipe(self) -> DmaPipe {
        match self {
            ResizeTarget::CropFr | ResizeTarget::ScalerFr => DmaPipe::Fr,
            ResizeTarget::CropDs | ResizeTarget::ScalerDs => DmaPipe::Ds,
        }
    }

    const fn is_crop(self) -> bool {
        matches!(self, ResizeTarget::CropFr | ResizeTarget::CropDs)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CropGet {
    ResizeType,
    /// `true` once the last run request reached the registers.
    Done(ResizeTarget),
    Enabled(ResizeTarget),
    XSize(ResizeTarget),
    YSize(ResizeTarget),
    XOffset(ResizeTarget),
    YOffset(ResizeTarget),
    /// Size leaving the crop and scaler of a pipe.
    Output(DmaPipe),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CropSet {
    ResizeType(ResizeTarget),
    /// Enables the block and schedules the geometry for the next frame.
    Run(ResizeTarget),
    XSize(ResizeTarget, u16),
    YSize(ResizeTarget, u16),
    XOffset(ResizeTarget, u16),
    YOffset(ResizeTarget, u16),
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct Window {
    enable: bool,
    done: bool,
    xoffset: u16,
    yoffset: u16,
    xsize: u16,
    ysize: u16,
}

/// Scaler phase increment in 12.20, computed without overflowing 32 bits.
fn scaler_tinc(from: u16, to: u16) -> u32 {
    if to == 0 {
        return u32::MAX;
    }
    let (from, to) = (u32::from(from), u32::from(to));
    if from >= 0x1000 {
        ((from << 18) / to) << 2
    } else {
        (from << 20) / to
    }
}

/// Filter coefficient set: 0 for 1:1 down to 3 for a quarter or less.
fn scaler_coefset(from: u16, to: u16) -> u8 {
    if to == 0 || u32::from(from) >= 3 * u32::from(to) {
        return 3;
    }
    u8::try_from((2 * u32::from(from) / u32::from(to)).saturating_sub(2)).unwrap_or(3)
}

/// Clamps a crop window into `active` and returns the size it leaves.
fn apply_crop(window: &mut Window, active: Resolution, regs: &mut CropRegs) -> Resolution {
    let mut out = active;
    if window.enable {
        let (width, height) = (active.width, active.height);
        if window.xoffset >= width {
            window.xoffset = width.saturating_sub(1);
        }
        if window.yoffset >= height {
            window.yoffset = height.saturating_sub(1);
        }
        if u32::from(window.xoffset) + u32::from(window.xsize) > u32::from(width) {
            window.xsize = width - window.xoffset;
        }
        if u32::from(window.yoffset) + u32::from(window.ysize) > u32::from(height) {
            window.ysize = height - window.yoffset;
        }
        regs.start_x = window.xoffset;
        regs.start_y = window.yoffset;
        regs.size_x = window.xsize;
        regs.size_y = window.ysize;
        out = Resolution::new(window.xsize, window.ysize);
    }
    regs.enable = window.enable;
    window.done = true;
    out
}

/// Clamps a scaler output into `input` and returns the size it leaves.
fn apply_scaler(window: &mut Window, input: Resolution, regs: &mut ScalerRegs) -> Resolution {
    let mut out = input;
    if window.enable {
        window.xsize = window.xsize.min(input.width);
        window.ysize = window.ysize.min(input.height);
        regs.width = input.width;
        regs.height = input.height;
        regs.image_resize_width = window.xsize;
        regs.image_resize_height = window.ysize;
        if window.xsize != 0 && window.ysize != 0 {
            regs.hfilt_tinc = scaler_tinc(input.width, window.xsize);
            regs.vfilt_tinc = scaler_tinc(input.height, window.ysize);
            regs.hfilt_coefset = scaler_coefset(input.width, window.xsize);
            regs.vfilt_coefset = scaler_coefset(input.height, window.ysize);
        } else {
            isp_error!(
                "scaler output {}x{} is invalid",
                window.xsize,
                window.ysize
            );
        }
        out = Resolution::new(window.xsize, window.ysize);
    }
    regs.enable = window.enable;
    window.done = true;
    out
}

pub struct CropMachine {
    mask: IrqMask,
    resize_type: ResizeTarget,
    /// Indexed by [`ResizeTarget::to_raw`].
    windows: [Window; 4],
    output: [Resolution; 2],
    /// Active window the sizes were last reset against.
    active: Resolution,
    need_updating: bool,
}

impl CropMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mask: IrqMask::repeating(Irq::FrameWriterFr.mask() | Irq::FrameWriterDs.mask()),
            resize_type: ResizeTarget::CropFr,
            windows: [Window {
                enable: false,
                done: false,
                xoffset: 0,
                yoffset: 0,
                xsize: 0,
                ysize: 0,
            }; 4],
            output: [Resolution::new(0, 0); 2],
            active: Resolution::new(0, 0),
            need_updating: false,
        }
    }

    fn window(&self, target: ResizeTarget) -> &Window {
        &self.windows[usize::from(target.to_raw())]
    }

    fn window_mut(&mut self, target: ResizeTarget) -> &mut Window {
        &mut self.windows[usize::from(target.to_raw())]
    }

    fn active(env: &Env<'_>) -> Resolution {
        Resolution::new(env.shared.regs.active_width, env.shared.regs.active_height)
    }

    fn reset_sizes(&mut self, active: Resolution) {
        for window in &mut self.windows {
            window.xsize = active.width;
            window.ysize = active.height;
        }
        self.output = [active; 2];
        self.active = active;
    }

    /// Checks a requested size against the active window and the crop in front.
    fn validate_size(
        &self,
        target: ResizeTarget,
        size: u16,
        active: Resolution,
        horizontal: bool,
    ) -> bool {
        if size == 0 {
            return false;
        }
        let from = if horizontal { active.width } else { active.height };
        let crop_target = match target.pipe() {
            DmaPipe::Fr => ResizeTarget::CropFr,
            DmaPipe::Ds => ResizeTarget::CropDs,
        };
        let crop = self.window(crop_target);
        let offset = if horizontal { crop.xoffset } else { crop.yoffset };
        let overflows = u32::from(offset) + u32::from(size) > u32::from(from);

        if target.is_crop() {
            // A window hanging off the edge is clamped later as long as it starts inside.
            return !overflows || from > offset;
        }

        let from = if crop.enable && overflows {
            from.saturating_sub(offset)
        } else {
            from
        };
        scaler_tinc(from, size) < TINC_LIMIT
    }

    fn update_pipe(&mut self, pipe: DmaPipe, env: &mut Env<'_>) {
        let active = Self::active(env);
        let regs = &mut env.shared.regs;
        let (crop, scaler, crop_regs, scaler_regs) = match pipe {
            DmaPipe::Fr => (
                ResizeTarget::CropFr,
                ResizeTarget::ScalerFr,
                &mut regs.crop_fr,
                &mut regs.scaler_fr,
            ),
            DmaPipe::Ds => (
                ResizeTarget::CropDs,
                ResizeTarget::ScalerDs,
                &mut regs.crop_ds,
                &mut regs.scaler_ds,
            ),
        };

        let cropped = apply_crop(self.window_mut(crop), active, crop_regs);
        let scaled = apply_scaler(self.window_mut(scaler), cropped, scaler_regs);
        self.output[pipe.index()] = scaled;

        let crop = *self.window(crop);
        isp_debug!(
            "{} geometry: crop {} at {},{} size {}x{}, output {}x{}",
            pipe.label(),
            crop.enable,
            crop.xoffset,
            crop.yoffset,
            crop.xsize,
            crop.ysize,
            scaled.width,
            scaled.height
        );
    }

    fn update_all(&mut self, env: &mut Env<'_>) {
        self.update_pipe(DmaPipe::Fr, env);
        self.update_pipe(DmaPipe::Ds, env);
        self.need_updating = false;
        env.raise(Event::CropUpdated);
    }

    fn set_size(
        &mut self,
        target: ResizeTarget,
        size: u16,
        horizontal: bool,
        env: &Env<'_>,
    ) -> Result<(), ParamError> {
        if !self.validate_size(target, size, Self::active(env), horizontal) {
            isp_warn!("{} size {} rejected", target.to_raw(), size);
            return Err(ParamError::BadArgument);
        }
        let window = self.window_mut(target);
        if horizontal {
            window.xsize = size;
        } else {
            window.ysize = size;
        }
        Ok(())
    }
}

impl Default for CropMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for CropMachine {
    fn id(&self) -> MachineId {
        MachineId::Crop
    }

    fn init(&mut self, env: &mut Env<'_>) {
        *self = Self::new();
        self.reset_sizes(Self::active(env));
    }

    fn irq_mask(&mut self) -> Option<&mut IrqMask> {
        Some(&mut self.mask)
    }

    fn process_interrupt(&mut self, irq: Irq, env: &mut Env<'_>) {
        if irq == Irq::FrameWriterFr && self.need_updating {
            self.update_all(env);
        }
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            Event::SensorReady => {
                let active = Self::active(env);
                if self.active != active {
                    self.reset_sizes(active);
                }
                self.update_all(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::Crop(request) = request else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            CropGet::ResizeType => u32::from(self.resize_type.to_raw()),
            CropGet::Done(target) => u32::from(self.window(target).done),
            CropGet::Enabled(target) => u32::from(self.window(target).enable),
            CropGet::XSize(target) => u32::from(self.window(target).xsize),
            CropGet::YSize(target) => u32::from(self.window(target).ysize),
            CropGet::XOffset(target) => u32::from(self.window(target).xoffset),
            CropGet::YOffset(target) => u32::from(self.window(target).yoffset),
            CropGet::Output(pipe) => return Ok(ParamValue::Resolution(self.output[pipe.index()])),
        };
        Ok(ParamValue::U32(value))
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::Crop(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            CropSet::ResizeType(target) => self.resize_type = target,
            CropSet::Run(target) => {
                let window = self.window_mut(target);
                window.enable = true;
                window.done = false;
                self.need_updating = true;
            }
            CropSet::XSize(target, size) => self.set_size(target, size, true, env)?,
            CropSet::YSize(target, size) => self.set_size(target, size, false, env)?,
            CropSet::XOffset(target, offset) | CropSet::YOffset(target, offset)
                if !target.is_crop() =>
            {
                isp_warn!("offset {} on scaler {} rejected", offset, target.to_raw());
                return Err(ParamError::BadArgument);
            }
            CropSet::XOffset(target, offset) => self.window_mut(target).xoffset = offset,
            CropSet::YOffset(target, offset) => self.window_mut(target).yoffset = offset,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_hanging_off_the_edge_is_clamped() {
        let mut window = Window {
            enable: true,
            xoffset: 1800,
            xsize: 200,
            ysize: 1080,
            ..Window::default()
        };
        let mut regs = CropRegs::default();
        let out = apply_crop(&mut window, Resolution::new(1920, 1080), &mut regs);
        assert_eq!(window.xsize, 120);
        assert_eq!(regs.size_x, 120);
        assert_eq!(regs.start_x, 1800);
        assert_eq!(out, Resolution::new(120, 1080));
        assert!(window.done);
    }

    #[test]
    fn offset_outside_the_frame_moves_to_the_last_pixel() {
        let mut window = Window {
            enable: true,
            xoffset: 5000,
            yoffset: 10,
            xsize: 64,
            ysize: 64,
            ..Window::default()
        };
        let mut regs = CropRegs::default();
        apply_crop(&mut window, Resolution::new(1920, 1080), &mut regs);
        assert_eq!(window.xoffset, 1919);
        assert_eq!(window.xsize, 1);
    }

    #[test]
    fn disabled_crop_passes_the_active_size_through() {
        let mut window = Window::default();
        let mut regs = CropRegs::default();
        let out = apply_crop(&mut window, Resolution::new(1280, 720), &mut regs);
        assert_eq!(out, Resolution::new(1280, 720));
        assert!(!regs.enable);
    }

    #[test]
    fn scaler_increments_and_coefficients() {
        assert_eq!(scaler_tinc(1920, 1920), 1 << 20);
        assert_eq!(scaler_tinc(1920, 960), 2 << 20);
        assert_eq!(scaler_tinc(0x1000, 0x800), 2 << 20);
        assert_eq!(scaler_coefset(1920, 1920), 0);
        assert_eq!(scaler_coefset(1920, 1280), 1);
        assert_eq!(scaler_coefset(1920, 640), 3);
    }

    #[test]
    fn validation_rejects_empty_and_oversized_requests() {
        let mut machine = CropMachine::new();
        let active = Resolution::new(1920, 1080);
        machine.reset_sizes(active);
        assert!(!machine.validate_size(ResizeTarget::CropFr, 0, active, true));
        assert!(machine.validate_size(ResizeTarget::CropFr, 1920, active, true));

        machine.window_mut(ResizeTarget::CropFr).xoffset = 1800;
        assert!(machine.validate_size(ResizeTarget::CropFr, 200, active, true));
        machine.window_mut(ResizeTarget::CropFr).xoffset = 1920;
        assert!(!machine.validate_size(ResizeTarget::CropFr, 200, active, true));

        // More than 16x downscale.
        assert!(!machine.validate_size(ResizeTarget::ScalerDs, 100, active, true));
        assert!(machine.validate_size(ResizeTarget::ScalerDs, 640, active, true));
    }

    #[test]
    fn raw_targets_round_trip() {
        for target in [
            ResizeTarget::CropFr,
            ResizeTarget::CropDs,
            ResizeTarget::ScalerDs,
            ResizeTarget::ScalerFr,
        ] {
            assert_eq!(ResizeTarget::from_raw(target.to_raw()), Some(target));
        }
        assert_eq!(ResizeTarget::from_raw(4), None);
    }
}
