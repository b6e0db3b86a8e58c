//! Colour correction and saturation matrix, plus shading mesh strength.
//!
//! The correction matrix follows the light source detected by AWB. A change
//! of light source is not applied at once: the matrix blends from the old to
//! the new calibration over the number of frames AWB advertises. The blended
//! matrix is then multiplied by a saturation matrix whose strength comes from
//! a gain-modulated curve, unless the user pins either matrix.

use crate::calibration::{CalibrationId, CalibrationSet};
use crate::event::Event;
use crate::math::{
    ModulationEntry, blend_i32, calc_modulation_u16, complement_to_direct, direct_to_complement,
};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;

use super::awb::{AwbGet, LightSource};
use super::{StateMachine, total_gain_8_8};

/// Identity in signed 8.8.
pub const CCM_IDENTITY: [i16; 9] = [0x100, 0, 0, 0, 0x100, 0, 0, 0, 0x100];

/// Saturation target that leaves colours untouched.
pub const SATURATION_NEUTRAL: u32 = 128;
pub const SATURATION_MAX: u32 = 0xFF;
pub const SHADING_STRENGTH_MAX: u32 = 4096;

/// Rec.601 luma weights summing to 256.
const LUMA: [i32; 3] = [77, 150, 29];
const Q8: i32 = 0x100;

/// Mesh blend across the A, TL84 and D65 shading tables by colour temperature.
const SHADING_ALPHA_CURVE: [ModulationEntry; 3] = [
    ModulationEntry::new(2850, 0),
    ModulationEntry::new(4000, 128),
    ModulationEntry::new(6500, 255),
];

/// Parameters the user can pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColorManual {
    Ccm,
    Saturation,
    Shading,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColorMatrixGet {
    /// Light source whose CCM is the blend target.
    LightSource,
    LightSourcePrevious,
    ChangeFramesLeft,
    /// Matrix last written to hardware.
    Ccm,
    /// Manual matrix cell in sign-magnitude 8.8.
    Coefficient(u8),
    Manual(ColorManual),
    SaturationTarget,
    ShadingStrength,
    ShadingAlpha,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColorMatrixSet {
    Manual(ColorManual, bool),
    /// Manual matrix cell in sign-magnitude 8.8, row-major index `0..9`.
    Coefficient(u8, u32),
    SaturationTarget(u32),
    ShadingStrength(u32),
    /// Reloads the per-illuminant matrices from calibration.
    ChangeCcms,
    ShadingMeshReload,
}

/// Multiplies two row-major 3x3 matrices in 8.8.
fn multiply(a: &[i32; 9], b: &[i32; 9]) -> [i32; 9] {
    let mut out = [0; 9];
    for row in 0..3 {
        for col in 0..3 {
            out[row * 3 + col] = (0..3)
                .map(|k| a[row * 3 + k] * b[k * 3 + col])
                .sum::<i32>()
                / Q8;
        }
    }
    out
}

/// Saturation matrix for a 0..=255 target, 128 being neutral.
fn saturation_matrix(target: u32) -> [i32; 9] {
    let strength = i32::try_from(target.min(SATURATION_MAX) * 2).unwrap_or(Q8);
    let mut out = [0; 9];
    for row in 0..3 {
        for col in 0..3 {
            let diagonal = if row == col { strength } else { 0 };
            out[row * 3 + col] = LUMA[col] * (Q8 - strength) / Q8 + diagonal;
        }
    }
    out
}

fn widen(matrix: &[i16; 9]) -> [i32; 9] {
    matrix.map(i32::from)
}

fn narrow(matrix: &[i32; 9]) -> [i16; 9] {
    matrix.map(|value| {
        i16::try_from(value.clamp(i32::from(i16::MIN), i32::from(i16::MAX))).unwrap_or(0)
    })
}

fn ccm_from_calibration(calibrations: &CalibrationSet, source: LightSource) -> [i16; 9] {
    let id = match source {
        LightSource::A => CalibrationId::MT_ABSOLUTE_LS_A_CCM,
        LightSource::D40 => CalibrationId::MT_ABSOLUTE_LS_D40_CCM,
        LightSource::D50 | LightSource::Unknown => CalibrationId::MT_ABSOLUTE_LS_D50_CCM,
    };
    if calibrations.shape(id).is_none_or(|shape| shape.cells() < 9) {
        return CCM_IDENTITY;
    }
    let mut matrix = [0; 9];
    for (index, slot) in matrix.iter_mut().enumerate() {
        *slot = direct_to_complement(calibrations.cell_or(id, index, 0));
    }
    matrix
}

pub struct ColorMatrixMachine {
    ccm_a: [i16; 9],
    ccm_d40: [i16; 9],
    ccm_d50: [i16; 9],
    light_source: LightSource,
    light_source_previous: LightSource,
    /// Matrix the current blend starts from.
    blend_from: [i16; 9],
    correction: [i16; 9],
    applied: [i16; 9],
    change_frames: u32,
    change_frames_left: u32,
    manual_ccm: bool,
    manual_matrix: [i16; 9],
    manual_saturation: bool,
    saturation_target: u32,
    manual_shading: bool,
    manual_shading_strength: u32,
    shading_strength: u32,
    shading_alpha: u8,
}

impl ColorMatrixMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ccm_a: CCM_IDENTITY,
            ccm_d40: CCM_IDENTITY,
            ccm_d50: CCM_IDENTITY,
            light_source: LightSource::D50,
            light_source_previous: LightSource::D50,
            blend_from: CCM_IDENTITY,
            correction: CCM_IDENTITY,
            applied: CCM_IDENTITY,
            change_frames: 20,
            change_frames_left: 0,
            manual_ccm: false,
            manual_matrix: CCM_IDENTITY,
            manual_saturation: false,
            saturation_target: SATURATION_NEUTRAL,
            manual_shading: false,
            manual_shading_strength: SHADING_STRENGTH_MAX,
            shading_strength: SHADING_STRENGTH_MAX,
            shading_alpha: 0,
        }
    }

    fn target(&self, source: LightSource) -> [i16; 9] {
        match source {
            LightSource::A => self.ccm_a,
            LightSource::D40 => self.ccm_d40,
            LightSource::D50 | LightSource::Unknown => self.ccm_d50,
        }
    }

    fn change_ccms(&mut self, calibrations: &CalibrationSet) {
        self.ccm_a = ccm_from_calibration(calibrations, LightSource::A);
        self.ccm_d40 = ccm_from_calibration(calibrations, LightSource::D40);
        self.ccm_d50 = ccm_from_calibration(calibrations, LightSource::D50);
        self.correction = self.target(self.light_source);
        self.change_frames_left = 0;
    }

    /// Advances the light-source blend by one frame.
    fn step_correction(&mut self, source: LightSource, change_frames: u32) {
        if source != self.light_source {
            isp_debug!(
                "ccm light source {} -> {}",
                self.light_source.to_raw(),
                source.to_raw()
            );
            self.light_source_previous = self.light_source;
            self.light_source = source;
            self.blend_from = self.correction;
            self.change_frames = change_frames.max(1);
            self.change_frames_left = self.change_frames;
        }

        let target = self.target(self.light_source);
        if self.change_frames_left == 0 {
            self.correction = target;
            return;
        }
        self.change_frames_left -= 1;
        let alpha = (self.change_frames - self.change_frames_left) * 256 / self.change_frames;
        let from = widen(&self.blend_from);
        let to = widen(&target);
        let mut blended = [0; 9];
        for (slot, (a, b)) in blended.iter_mut().zip(from.iter().zip(to.iter())) {
            *slot = blend_i32(*a, *b, alpha);
        }
        self.correction = narrow(&blended);
    }

    fn update_shading(&mut self, env: &mut Env<'_>) {
        let gain = total_gain_8_8(env);
        self.shading_strength = if self.manual_shading {
            self.manual_shading_strength
        } else if env.shared.calibrations.contains(CalibrationId::MESH_SHADING_STRENGTH) {
            u32::from(calc_modulation_u16(
                gain,
                env.shared.calibrations.modulation(CalibrationId::MESH_SHADING_STRENGTH),
            ))
            .min(SHADING_STRENGTH_MAX)
        } else {
            SHADING_STRENGTH_MAX
        };

        let kelvin = env
            .get_u32(Get::Awb(AwbGet::Temperature))
            .map_or(5000, |hundreds| hundreds * 100);
        let kelvin = u16::try_from(kelvin).unwrap_or(u16::MAX);
        self.shading_alpha =
            u8::try_from(calc_modulation_u16(kelvin, SHADING_ALPHA_CURVE)).unwrap_or(u8::MAX);

        let color = &mut env.shared.regs.color;
        color.shading_strength = u16::try_from(self.shading_strength).unwrap_or(u16::MAX);
        color.shading_alpha = self.shading_alpha;
    }

    fn update(&mut self, env: &mut Env<'_>) {
        let source = env
            .get_u32(Get::Awb(AwbGet::LightSource))
            .ok()
            .and_then(LightSource::from_raw)
            .unwrap_or(self.light_source);
        let change_frames = env
            .get_u32(Get::Awb(AwbGet::LightSourceChangeFrames))
            .unwrap_or(self.change_frames);
        self.step_correction(source, change_frames);

        let gain = total_gain_8_8(env);
        let calibrations = &env.shared.calibrations;
        if !self.manual_saturation && calibrations.contains(CalibrationId::SATURATION_STRENGTH) {
            self.saturation_target = u32::from(calc_modulation_u16(
                gain,
                calibrations.modulation(CalibrationId::SATURATION_STRENGTH),
            ))
            .min(SATURATION_MAX);
        }

        // Above the threshold the correction is dropped to keep chroma noise down.
        let one_gain = calibrations.cell(CalibrationId::CCM_ONE_GAIN_THRESHOLD, 0);
        let correction = match one_gain {
            Some(threshold) if u32::from(gain) > threshold => CCM_IDENTITY,
            _ => self.correction,
        };

        self.applied = if self.manual_ccm {
            self.manual_matrix
        } else {
            let product = multiply(&saturation_matrix(self.saturation_target), &widen(&correction));
            narrow(&product)
        };
        env.shared.regs.color.ccm = self.applied;
        self.update_shading(env);
    }
}

impl Default for ColorMatrixMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for ColorMatrixMachine {
    fn id(&self) -> MachineId {
        MachineId::ColorMatrix
    }

    fn init(&mut self, env: &mut Env<'_>) {
        *self = Self::new();
        self.change_ccms(&env.shared.calibrations);
        self.applied = self.correction;
        env.shared.regs.color.ccm = self.applied;
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            Event::FrameEnd => {
                self.update(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::ColorMatrix(request) = request else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            ColorMatrixGet::LightSource => self.light_source.to_raw(),
            ColorMatrixGet::LightSourcePrevious => self.light_source_previous.to_raw(),
            ColorMatrixGet::ChangeFramesLeft => self.change_frames_left,
            ColorMatrixGet::Ccm => return Ok(ParamValue::Ccm(self.applied)),
            ColorMatrixGet::Coefficient(index) => {
                let cell = self
                    .manual_matrix
                    .get(usize::from(index))
                    .ok_or(ParamError::BadArgument)?;
                complement_to_direct(*cell)
            }
            ColorMatrixGet::Manual(ColorManual::Ccm) => return Ok(ParamValue::Bool(self.manual_ccm)),
            ColorMatrixGet::Manual(ColorManual::Saturation) => {
                return Ok(ParamValue::Bool(self.manual_saturation));
            }
            ColorMatrixGet::Manual(ColorManual::Shading) => {
                return Ok(ParamValue::Bool(self.manual_shading));
            }
            ColorMatrixGet::SaturationTarget => self.saturation_target,
            ColorMatrixGet::ShadingStrength => self.shading_strength,
            ColorMatrixGet::ShadingAlpha => u32::from(self.shading_alpha),
        };
        Ok(ParamValue::U32(value))
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::ColorMatrix(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            ColorMatrixSet::Manual(ColorManual::Ccm, on) => self.manual_ccm = on,
            ColorMatrixSet::Manual(ColorManual::Saturation, on) => self.manual_saturation = on,
            ColorMatrixSet::Manual(ColorManual::Shading, on) => self.manual_shading = on,
            ColorMatrixSet::Coefficient(index, raw) => {
                let cell = self
                    .manual_matrix
                    .get_mut(usize::from(index))
                    .ok_or(ParamError::BadArgument)?;
                *cell = direct_to_complement(raw & 0xFFFF);
            }
            ColorMatrixSet::SaturationTarget(value) => {
                self.saturation_target = value.min(SATURATION_MAX);
            }
            ColorMatrixSet::ShadingStrength(value) => {
                self.manual_shading_strength = value.min(SHADING_STRENGTH_MAX);
                if self.manual_shading {
                    self.update_shading(env);
                }
            }
            ColorMatrixSet::ChangeCcms => self.change_ccms(&env.shared.calibrations),
            ColorMatrixSet::ShadingMeshReload => self.update_shading(env),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_saturation_is_identity() {
        assert_eq!(narrow(&saturation_matrix(SATURATION_NEUTRAL)), CCM_IDENTITY);
    }

    #[test]
    fn zero_saturation_collapses_to_luma() {
        let matrix = saturation_matrix(0);
        for row in 0..3 {
            assert_eq!(&matrix[row * 3..row * 3 + 3], &LUMA);
        }
    }

    #[test]
    fn identity_product_keeps_the_correction() {
        let ccm = [0x1A0, -0x60, -0x40, -0x30, 0x150, -0x20, 0x10, -0x90, 0x180];
        assert_eq!(narrow(&multiply(&widen(&CCM_IDENTITY), &widen(&ccm))), ccm);
    }

    #[test]
    fn light_source_change_blends_over_the_advertised_frames() {
        let mut machine = ColorMatrixMachine::new();
        machine.ccm_a = [0x200, 0, 0, 0, 0x200, 0, 0, 0, 0x200];
        machine.step_correction(LightSource::A, 4);
        assert_eq!(machine.change_frames_left, 3);
        assert_eq!(machine.correction[0], 0x140);
        machine.step_correction(LightSource::A, 4);
        machine.step_correction(LightSource::A, 4);
        assert_eq!(machine.correction[0], 0x1C0);
        machine.step_correction(LightSource::A, 4);
        assert_eq!(machine.change_frames_left, 0);
        assert_eq!(machine.correction[0], 0x200);
        assert_eq!(machine.light_source_previous, LightSource::D50);
    }

    #[test]
    fn calibration_matrix_is_sign_magnitude() {
        let mut calibrations = CalibrationSet::new();
        calibrations
            .insert_u16_matrix(
                CalibrationId::MT_ABSOLUTE_LS_A_CCM,
                3,
                3,
                &[0x01A0, 0x8060, 0x8040, 0x8030, 0x0150, 0x8020, 0x0010, 0x8090, 0x0180],
            )
            .expect("insert");
        let ccm = ccm_from_calibration(&calibrations, LightSource::A);
        assert_eq!(ccm, [0x1A0, -0x60, -0x40, -0x30, 0x150, -0x20, 0x10, -0x90, 0x180]);
        assert_eq!(ccm_from_calibration(&calibrations, LightSource::D40), CCM_IDENTITY);
    }
}
