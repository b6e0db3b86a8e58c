//! Spatial (sinter), temporal (temper), chroma and defect-pixel noise
//! reduction.
//!
//! Strengths are recomputed on every `FrameEnd` by sampling calibration curves
//! at the current total gain. Each block can be frozen by its manual flag, in
//! which case the last target (or the value written over the bus) is kept.

use crate::calibration::CalibrationId;
use crate::event::Event;
use crate::math::{calc_modulation_u16, log2_int_to_fixed};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::regs::{NOISE_PROFILE_SIZE, RADIAL_LUT_SIZE};
use crate::sensor::WdrMode;

use super::cmos::CmosGet;
use super::iridix::IridixGet;
use super::{StateMachine, require_lut, total_gain_8_8};

const STRENGTH_TARGET_INIT: u8 = 15;
/// Noise level of the shortest exposure channel.
const NOISE_LEVEL_BASE: u8 = 64;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum NoiseReductionMode {
    #[default]
    On,
    Off,
}

impl NoiseReductionMode {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            NoiseReductionMode::On => 0,
            NoiseReductionMode::Off => 1,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(NoiseReductionMode::On),
            1 => Some(NoiseReductionMode::Off),
            _ => None,
        }
    }
}

/// Blocks that can be frozen independently.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NrBlock {
    Sinter,
    Temper,
    /// Raw front-end defect pixel correction.
    Dpc,
    Stitching,
}

impl NrBlock {
    const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NoiseReductionGet {
    Mode,
    Manual(NrBlock),
    SinterThreshold,
    TemperThreshold,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NoiseReductionSet {
    Mode(NoiseReductionMode),
    Manual(NrBlock, bool),
    /// Sinter target used while the block is manual.
    SinterThreshold(u32),
    TemperThreshold(u32),
    /// Reloads the static blocks from calibration.
    Reload,
}

/// Noise level per exposure channel, shortest first, for a WDR sensor with
/// `exposures` channels spread evenly over `ratio`.
fn wdr_noise_levels(exposures: u8, ratio: u32) -> [u8; 4] {
    let mut levels = [NOISE_LEVEL_BASE, 0, 0, 0];
    let steps = i32::from(exposures.clamp(2, 4)) - 1;
    // log2 in 8.8; the noise drop is 8 levels per stop.
    let ratio_log2 = log2_int_to_fixed(ratio.max(1), 8);
    for (channel, level) in levels.iter_mut().enumerate().skip(1) {
        let channel = i32::try_from(channel).unwrap_or(i32::MAX);
        if channel > steps {
            *level = NOISE_LEVEL_BASE;
            continue;
        }
        let drop = (8 * ratio_log2 * channel / steps) >> 8;
        let base = i32::from(NOISE_LEVEL_BASE);
        *level = u8::try_from((base - drop).clamp(0, base)).unwrap_or(0);
    }
    levels
}

fn saturate_u8(value: u16) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}

pub struct NoiseReductionMachine {
    mode: NoiseReductionMode,
    manual: [bool; 4],
    snr_target: u8,
    tnr_target: u8,
    snr_contrast: u8,
}

impl NoiseReductionMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: NoiseReductionMode::On,
            manual: [false; 4],
            snr_target: STRENGTH_TARGET_INIT,
            tnr_target: STRENGTH_TARGET_INIT,
            snr_contrast: 0,
        }
    }

    fn is_manual(&self, block: NrBlock) -> bool {
        self.manual[block.index()]
    }

    /// Loads the radial shading LUT and noise profile, which never change with gain.
    fn load_static(&self, env: &mut Env<'_>) {
        if require_lut(env, CalibrationId::SINTER_RADIAL_LUT) {
            let calibrations = &env.shared.calibrations;
            let mut lut = [0u8; RADIAL_LUT_SIZE];
            for (out, value) in lut
                .iter_mut()
                .zip(calibrations.cells(CalibrationId::SINTER_RADIAL_LUT))
            {
                *out = u8::try_from(value).unwrap_or(u8::MAX);
            }
            env.shared.regs.sinter.radial_lut = lut;
        }

        let params = CalibrationId::SINTER_RADIAL_PARAMS;
        if require_lut(env, params) {
            let calibrations = &env.shared.calibrations;
            let narrow = |index| u16::try_from(calibrations.cell_or(params, index, 0)).unwrap_or(0);
            let (enable, centre_x, centre_y, mult) = (narrow(0), narrow(1), narrow(2), narrow(3));
            let sinter = &mut env.shared.regs.sinter;
            sinter.radial_enable = enable != 0;
            sinter.radial_centre_x = centre_x;
            sinter.radial_centre_y = centre_y;
            sinter.radial_off_center_mult = mult;
        }

        if require_lut(env, CalibrationId::NOISE_PROFILE) {
            let mut profile = [0u8; NOISE_PROFILE_SIZE];
            for (out, value) in profile
                .iter_mut()
                .zip(env.shared.calibrations.cells(CalibrationId::NOISE_PROFILE))
            {
                *out = u8::try_from(value).unwrap_or(u8::MAX);
            }
            env.shared.regs.temper.noise_profile = profile;
        }
    }

    fn modulate(env: &Env<'_>, id: CalibrationId, x: u16) -> u16 {
        calc_modulation_u16(x, env.shared.calibrations.modulation(id))
    }

    fn update_dpc(&self, env: &mut Env<'_>, log2_gain: u16) {
        if self.is_manual(NrBlock::Dpc) {
            return;
        }
        let slope = Self::modulate(env, CalibrationId::DP_SLOPE, log2_gain);
        let threshold = Self::modulate(env, CalibrationId::DP_THRESHOLD, log2_gain);
        env.shared.regs.temper.dp_slope = slope;
        env.shared.regs.temper.dp_threshold = threshold;
    }

    fn update_stitching(&self, env: &mut Env<'_>, log2_gain: u16, wdr: WdrMode) {
        if self.is_manual(NrBlock::Stitching) || wdr != WdrMode::FsLin {
            return;
        }
        let np = Self::modulate(env, CalibrationId::STITCHING_LM_NP, log2_gain);
        let mov_mult = Self::modulate(env, CalibrationId::STITCHING_LM_MOV_MULT, log2_gain);
        let intensity =
            Self::modulate(env, CalibrationId::STITCHING_LM_MED_NOISE_INTENSITY, log2_gain);
        let mc_off_gain = env
            .shared
            .calibrations
            .cell_or(CalibrationId::FS_MC_OFF, 0, u32::MAX);

        let stitch = &mut env.shared.regs.stitch;
        stitch.lm_np_mult = np;
        stitch.lm_alpha_mov_slope = mov_mult;
        stitch.lm_med_noise_intensity_thresh = intensity;
        stitch.mcoff_mode_enable = u32::from(log2_gain) > mc_off_gain;
    }

    fn update_sinter(&mut self, env: &mut Env<'_>, log2_gain: u16) {
        if !self.is_manual(NrBlock::Sinter) {
            self.snr_target =
                saturate_u8(Self::modulate(env, CalibrationId::SINTER_STRENGTH, log2_gain));

            let contrast = env.get_u32(Get::Iridix(IridixGet::Contrast)).unwrap_or(256) >> 8;
            let contrast = u16::try_from(contrast).unwrap_or(u16::MAX);
            self.snr_contrast = saturate_u8(Self::modulate(
                env,
                CalibrationId::SINTER_STRENGTH_MC_CONTRAST,
                contrast,
            ));

            let strength1 = Self::modulate(env, CalibrationId::SINTER_STRENGTH1, log2_gain);
            let thresh1 = Self::modulate(env, CalibrationId::SINTER_THRESH1, log2_gain);
            let thresh4 = Self::modulate(env, CalibrationId::SINTER_THRESH4, log2_gain);
            let int_config = Self::modulate(env, CalibrationId::SINTER_INTCONFIG, log2_gain);

            let sinter = &mut env.shared.regs.sinter;
            sinter.strength1 = saturate_u8(strength1);
            sinter.thresh1 = saturate_u8(thresh1);
            sinter.thresh4 = saturate_u8(thresh4);
            sinter.int_config = saturate_u8(int_config);
        }
        env.shared.regs.sinter.strength = self.snr_target;
        env.shared.regs.sinter.strength4 = self.snr_contrast;
    }

    fn update_temper(&mut self, env: &mut Env<'_>, log2_gain: u16, wdr: WdrMode) {
        if !self.is_manual(NrBlock::Temper) {
            self.tnr_target =
                saturate_u8(Self::modulate(env, CalibrationId::TEMPER_STRENGTH, log2_gain));

            let levels = match wdr {
                WdrMode::FsLin => {
                    let exposures = env.sensor_info().sensor_exp_number;
                    let ratio = env.get_u32(Get::Cmos(CmosGet::ExposureRatio)).unwrap_or(1);
                    wdr_noise_levels(exposures, ratio)
                }
                WdrMode::Linear | WdrMode::Native => [NOISE_LEVEL_BASE, 0, 0, 0],
            };
            env.shared.regs.sinter.exposure_thresh = levels;
        }
        env.shared.regs.temper.strength = self.tnr_target;
    }

    fn update_cnr(env: &mut Env<'_>, log2_gain: u16) {
        let slope = Self::modulate(env, CalibrationId::CNR_UV_DELTA12_SLOPE, log2_gain);
        env.shared.regs.temper.cnr_uv_delta12_slope = slope;
    }

    fn switch_off(env: &mut Env<'_>) {
        let regs = &mut env.shared.regs;
        regs.sinter.strength = 0;
        regs.sinter.strength1 = 0;
        regs.sinter.strength4 = 0;
        regs.sinter.exposure_thresh = [0; 4];
        regs.temper.strength = 0;
        regs.temper.cnr_uv_delta12_slope = 0;
    }

    fn update(&mut self, env: &mut Env<'_>) {
        if self.mode == NoiseReductionMode::Off {
            Self::switch_off(env);
            return;
        }

        let log2_gain = total_gain_8_8(env);
        let wdr = env.sensor_info().mode.wdr_mode;
        self.update_dpc(env, log2_gain);
        self.update_stitching(env, log2_gain, wdr);
        self.update_sinter(env, log2_gain);
        self.update_temper(env, log2_gain, wdr);
        Self::update_cnr(env, log2_gain);
        isp_trace!(
            "nr gain {} sinter {} temper {}",
            log2_gain,
            self.snr_target,
            self.tnr_target
        );
    }
}

impl Default for NoiseReductionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for NoiseReductionMachine {
    fn id(&self) -> MachineId {
        MachineId::NoiseReduction
    }

    fn init(&mut self, env: &mut Env<'_>) {
        let manual = self.manual;
        *self = Self::new();
        self.manual = manual;
        self.load_static(env);
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
        let Get::NoiseReduction(request) = request else {
            return Err(ParamError::Unsupported);
        };

        Ok(match request {
            NoiseReductionGet::Mode => ParamValue::U32(self.mode.to_raw()),
            NoiseReductionGet::Manual(block) => ParamValue::Bool(self.is_manual(block)),
            NoiseReductionGet::SinterThreshold => ParamValue::U32(u32::from(self.snr_target)),
            NoiseReductionGet::TemperThreshold => ParamValue::U32(u32::from(self.tnr_target)),
        })
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::NoiseReduction(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            NoiseReductionSet::Mode(mode) => self.mode = mode,
            NoiseReductionSet::Manual(block, on) => self.manual[block.index()] = on,
            NoiseReductionSet::SinterThreshold(value) => {
                self.snr_target = u8::try_from(value).unwrap_or(u8::MAX);
            }
            NoiseReductionSet::TemperThreshold(value) => {
                self.tnr_target = u8::try_from(value).unwrap_or(u8::MAX);
            }
            NoiseReductionSet::Reload => self.load_static(env),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_exposure_levels_drop_eight_per_stop() {
        // Ratio 16 is four stops: 64 - 32.
        assert_eq!(wdr_noise_levels(2, 16), [64, 32, 64, 64]);
    }

    #[test]
    fn three_exposures_share_the_ratio() {
        assert_eq!(wdr_noise_levels(3, 16), [64, 48, 32, 64]);
    }

    #[test]
    fn huge_ratios_clamp_at_zero() {
        assert_eq!(wdr_noise_levels(2, 1 << 20), [64, 0, 64, 64]);
    }

    #[test]
    fn unity_ratio_keeps_the_base_level() {
        assert_eq!(wdr_noise_levels(4, 1), [64, 64, 64, 64]);
    }

    #[test]
    fn mode_codes_round_trip() {
        for mode in [NoiseReductionMode::On, NoiseReductionMode::Off] {
            assert_eq!(NoiseReductionMode::from_raw(mode.to_raw()), Some(mode));
        }
        assert_eq!(NoiseReductionMode::from_raw(2), None);
    }
}
