//! Output colour-space conversion with brightness, contrast, saturation and hue.
//!
//! Each pipe gets one 3x3 matrix plus offsets, composed from the RGB to YUV
//! conversion (or identity for RGB outputs) and the user adjustments.

use crate::calibration::{CalibrationId, CalibrationSet};
use crate::event::Event;
use crate::math::direct_to_complement;
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::regs::YuvRegs;

use super::StateMachine;
use super::dma_writer::DmaPipe;

const NEUTRAL: u32 = 128;
const VIVID_SATURATION: u32 = 154;
const UNITY: i32 = 0x100;
/// Mid-scale chroma offset of the 10-bit output.
const CHROMA_ZERO: i32 = 512;
const OUTPUT_MAX: i32 = 1023;
const SEPIA_TINT: i32 = 40;

/// BT.709 RGB to YCbCr, 8.8 coefficients and 10-bit offsets.
const BT709: ([i16; 9], [u16; 3]) = (
    [54, 183, 18, -29, -99, 128, 128, -116, -12],
    [0, 512, 512],
);

/// Luma weights used by the monochrome RGB modes.
const LUMA_WEIGHTS: [i32; 3] = [54, 183, 19];

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ColorMode {
    #[default]
    Normal,
    BlackAndWhite,
    Negative,
    Sepia,
    Vivid,
}

impl ColorMode {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ColorMode::Normal),
            1 => Some(ColorMode::BlackAndWhite),
            2 => Some(ColorMode::Negative),
            3 => Some(ColorMode::Sepia),
            4 => Some(ColorMode::Vivid),
            _ => None,
        }
    }
}

/// Colour layout produced by a pipe.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PipeOutput {
    Yuv444,
    Yuv422,
    Yuv420,
    #[default]
    Rgb,
}

impl PipeOutput {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            PipeOutput::Yuv444 => 1,
            PipeOutput::Yuv422 => 2,
            PipeOutput::Yuv420 => 3,
            PipeOutput::Rgb => 4,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(PipeOutput::Yuv444),
            2 => Some(PipeOutput::Yuv422),
            3 => Some(PipeOutput::Yuv420),
            4 => Some(PipeOutput::Rgb),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MatrixYuvGet {
    ColorMode,
    Brightness,
    Contrast,
    Saturation,
    HueTheta,
    OutputFormat(DmaPipe),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MatrixYuvSet {
    ColorMode(ColorMode),
    /// 0..=255, 128 neutral.
    Brightness(u32),
    /// 0..=255, 128 neutral.
    Contrast(u32),
    /// 128 neutral, saturates at 255.
    Saturation(u32),
    /// Degrees, 0..=360.
    HueTheta(u32),
    OutputFormat(DmaPipe, PipeOutput),
    /// Reloads the conversion matrix from calibration.
    Reload,
}

/// Sine in 8.8 from Bhaskara's approximation, within 0.2% over the circle.
fn sin_8_8(degrees: u32) -> i32 {
    let degrees = degrees % 360;
    let (x, sign) = if degrees < 180 {
        (degrees, 1)
    } else {
        (degrees - 180, -1)
    };
    let x = i32::try_from(x).unwrap_or(0);
    let p = x * (180 - x);
    sign * (UNITY * 4 * p) / (40_500 - p)
}

fn cos_8_8(degrees: u32) -> i32 {
    sin_8_8(degrees + 90)
}

fn conversion_from_calibration(calibrations: &CalibrationSet) -> ([i16; 9], [u16; 3]) {
    let id = CalibrationId::RGB2YUV_CONVERSION;
    if calibrations.shape(id).is_none_or(|shape| shape.cells() < 12) {
        return BT709;
    }
    let mut coefficients = [0; 9];
    for (index, slot) in coefficients.iter_mut().enumerate() {
        *slot = direct_to_complement(calibrations.cell_or(id, index, 0));
    }
    let mut offsets = [0; 3];
    for (index, slot) in offsets.iter_mut().enumerate() {
        *slot = u16::try_from(calibrations.cell_or(id, 9 + index, 0)).unwrap_or(u16::MAX);
    }
    (coefficients, offsets)
}

fn narrow(value: i32) -> i16 {
    i16::try_from(value.clamp(i32::from(i16::MIN), i32::from(i16::MAX))).unwrap_or(0)
}

fn offset(value: i32) -> u16 {
    u16::try_from(value.clamp(0, OUTPUT_MAX)).unwrap_or(0)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Adjustments {
    mode: ColorMode,
    brightness: u32,
    contrast: u32,
    saturation: u32,
    hue_theta: u32,
}

impl Adjustments {
    fn brightness_offset(self) -> i32 {
        (i32::try_from(self.brightness).unwrap_or(0) - 128) * 4
    }

    fn contrast(self) -> i32 {
        i32::try_from(self.contrast).unwrap_or(0)
    }

    fn saturation(self) -> i32 {
        i32::try_from(self.saturation).unwrap_or(0)
    }
}

/// Matrix for a YUV pipe: conversion, then contrast on luma, hue rotation and
/// saturation on chroma, then the colour mode.
fn compose_yuv(conversion: ([i16; 9], [u16; 3]), adjust: Adjustments) -> YuvRegs {
    let (m, base) = conversion;
    let m = m.map(i32::from);
    let (sin, cos) = (sin_8_8(adjust.hue_theta), cos_8_8(adjust.hue_theta));
    let (contrast, saturation) = (adjust.contrast(), adjust.saturation());

    let mut out = [0_i32; 9];
    for col in 0..3 {
        let (y, u, v) = (m[col], m[3 + col], m[6 + col]);
        out[col] = y * contrast / 128;
        out[3 + col] = (cos * u - sin * v) / UNITY * saturation / 128;
        out[6 + col] = (sin * u + cos * v) / UNITY * saturation / 128;
    }
    let mut offsets = [
        i32::from(base[0]) + adjust.brightness_offset(),
        i32::from(base[1]),
        i32::from(base[2]),
    ];

    match adjust.mode {
        ColorMode::Normal | ColorMode::Vivid => {}
        ColorMode::BlackAndWhite => out[3..].fill(0),
        ColorMode::Negative => {
            for value in &mut out {
                *value = -*value;
            }
            offsets[0] = OUTPUT_MAX - offsets[0];
        }
        ColorMode::Sepia => {
            out[3..].fill(0);
            offsets[1] = CHROMA_ZERO - SEPIA_TINT;
            offsets[2] = CHROMA_ZERO + SEPIA_TINT;
        }
    }

    YuvRegs {
        enable: true,
        coefficients: out.map(narrow),
        offsets: offsets.map(offset),
    }
}

/// Matrix for an RGB pipe: contrast and brightness, then the colour mode.
fn compose_rgb(adjust: Adjustments) -> YuvRegs {
    let contrast = adjust.contrast();
    let mut out = [0_i32; 9];
    match adjust.mode {
        ColorMode::BlackAndWhite | ColorMode::Sepia => {
            for row in 0..3 {
                for col in 0..3 {
                    out[row * 3 + col] = LUMA_WEIGHTS[col] * contrast / 128;
                }
            }
        }
        _ => {
            for diagonal in [0, 4, 8] {
                out[diagonal] = UNITY * contrast / 128;
            }
        }
    }

    let brightness = adjust.brightness_offset();
    let mut offsets = [brightness; 3];
    match adjust.mode {
        ColorMode::Negative => {
            for value in &mut out {
                *value = -*value;
            }
            offsets = offsets.map(|value| OUTPUT_MAX - value);
        }
        ColorMode::Sepia => {
            offsets[0] += SEPIA_TINT;
            offsets[2] -= SEPIA_TINT;
        }
        _ => {}
    }

    YuvRegs {
        enable: true,
        coefficients: out.map(narrow),
        offsets: offsets.map(offset),
    }
}

pub struct MatrixYuvMachine {
    adjust: Adjustments,
    outputs: [PipeOutput; 2],
    conversion: ([i16; 9], [u16; 3]),
}

impl MatrixYuvMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            adjust: Adjustments {
                mode: ColorMode::Normal,
                brightness: NEUTRAL,
                contrast: NEUTRAL,
                saturation: NEUTRAL,
                hue_theta: 0,
            },
            outputs: [PipeOutput::Rgb; 2],
            conversion: BT709,
        }
    }

    fn update(&self, env: &mut Env<'_>) {
        for pipe in DmaPipe::ALL {
            let regs = match self.outputs[pipe.index()] {
                PipeOutput::Rgb => compose_rgb(self.adjust),
                _ => compose_yuv(self.conversion, self.adjust),
            };
            match pipe {
                DmaPipe::Fr => env.shared.regs.yuv_fr = regs,
                DmaPipe::Ds => env.shared.regs.yuv_ds = regs,
            }
        }
    }
}

impl Default for MatrixYuvMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for MatrixYuvMachine {
    fn id(&self) -> MachineId {
        MachineId::MatrixYuv
    }

    fn init(&mut self, env: &mut Env<'_>) {
        *self = Self::new();
        self.conversion = conversion_from_calibration(&env.shared.calibrations);
        self.update(env);
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            // The colour mode is static between commands, so frame end has nothing to redo.
            Event::FrameEnd => true,
            Event::SensorReady => {
                self.update(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::MatrixYuv(request) = request else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            MatrixYuvGet::ColorMode => self.adjust.mode.to_raw(),
            MatrixYuvGet::Brightness => self.adjust.brightness,
            MatrixYuvGet::Contrast => self.adjust.contrast,
            MatrixYuvGet::Saturation => self.adjust.saturation,
            MatrixYuvGet::HueTheta => self.adjust.hue_theta,
            MatrixYuvGet::OutputFormat(pipe) => self.outputs[pipe.index()].to_raw(),
        };
        Ok(ParamValue::U32(value))
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::MatrixYuv(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            MatrixYuvSet::ColorMode(mode) => {
                self.adjust.mode = mode;
                self.adjust.saturation = if mode == ColorMode::Vivid {
                    VIVID_SATURATION
                } else {
                    NEUTRAL
                };
            }
            MatrixYuvSet::Brightness(value) | MatrixYuvSet::Contrast(value) if value > 0xFF => {
                return Err(ParamError::BadArgument);
            }
            MatrixYuvSet::Brightness(value) => self.adjust.brightness = value,
            MatrixYuvSet::Contrast(value) => self.adjust.contrast = value,
            MatrixYuvSet::Saturation(value) => self.adjust.saturation = value.min(0xFF),
            MatrixYuvSet::HueTheta(value) if value > 360 => return Err(ParamError::BadArgument),
            MatrixYuvSet::HueTheta(value) => self.adjust.hue_theta = value,
            MatrixYuvSet::OutputFormat(pipe, output) => self.outputs[pipe.index()] = output,
            MatrixYuvSet::Reload => {
                self.conversion = conversion_from_calibration(&env.shared.calibrations);
            }
        }
        self.update(env);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neutral() -> Adjustments {
        MatrixYuvMachine::new().adjust
    }

    #[test]
    fn sine_approximation_hits_the_cardinal_points() {
        assert_eq!(sin_8_8(0), 0);
        assert_eq!(sin_8_8(90), 256);
        assert_eq!(sin_8_8(180), 0);
        assert_eq!(sin_8_8(270), -256);
        assert_eq!(cos_8_8(0), 256);
        assert_eq!(cos_8_8(360), 256);
        assert!((sin_8_8(30) - 128).abs() <= 1);
    }

    #[test]
    fn neutral_yuv_matrix_is_the_conversion() {
        let regs = compose_yuv(BT709, neutral());
        assert_eq!(regs.coefficients, BT709.0);
        assert_eq!(regs.offsets, BT709.1);
    }

    #[test]
    fn black_and_white_drops_chroma() {
        let adjust = Adjustments {
            mode: ColorMode::BlackAndWhite,
            ..neutral()
        };
        let regs = compose_yuv(BT709, adjust);
        assert_eq!(&regs.coefficients[3..], &[0; 6]);
        assert_eq!(&regs.coefficients[..3], &BT709.0[..3]);
    }

    #[test]
    fn half_turn_of_hue_inverts_chroma() {
        let adjust = Adjustments {
            hue_theta: 180,
            ..neutral()
        };
        let regs = compose_yuv(BT709, adjust);
        for col in 3..9 {
            assert_eq!(regs.coefficients[col], -BT709.0[col]);
        }
    }

    #[test]
    fn rgb_output_carries_brightness_as_offset() {
        let adjust = Adjustments {
            brightness: 160,
            ..neutral()
        };
        let regs = compose_rgb(adjust);
        assert_eq!(regs.coefficients, [256, 0, 0, 0, 256, 0, 0, 0, 256]);
        assert_eq!(regs.offsets, [128; 3]);
    }

    #[test]
    fn sign_magnitude_cells_decode() {
        assert_eq!(direct_to_complement(0x0100), 256);
        assert_eq!(direct_to_complement(0x8020), -32);
    }
}
