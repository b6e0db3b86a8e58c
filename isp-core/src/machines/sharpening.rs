//! Demosaic and output-pipe sharpening.

use crate::calibration::{CalibrationId, CalibrationSet};
use crate::event::Event;
use crate::math::calc_modulation_u16;
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::regs::SharpenRegs;

use super::{StateMachine, total_gain_8_8};

/// Multiplier that leaves the calibrated strengths untouched.
const SHARPENING_MULT_UNITY: u32 = 128;

/// Blocks with their own manual flag.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SharpenBlock {
    Demosaic,
    /// FR and DS output sharpeners.
    Sharpen,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SharpeningGet {
    /// Strength as last written through the command surface.
    Strength,
    Mult,
    Manual(SharpenBlock),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SharpeningSet {
    /// User strength, 0..=255 with 128 neutral.
    Strength(u32),
    /// Raw multiplier, 128 neutral.
    Mult(u32),
    Manual(SharpenBlock, bool),
    /// Reloads the static sharpener configuration.
    Init,
}

/// Maps the user strength onto the internal multiplier. Above neutral the
/// response follows a fourth power so the top of the range stays usable.
fn strength_to_mult(strength: u32) -> u32 {
    if strength <= SHARPENING_MULT_UNITY {
        return strength;
    }
    let strength = u64::from(strength);
    u32::try_from(strength.pow(4) / 0x20_0000).unwrap_or(u32::MAX)
}

/// Static part of a sharpener from its `SHARP_*_CONFIG` table.
fn sharpen_config(calibrations: &CalibrationSet, id: CalibrationId, regs: &mut SharpenRegs) {
    let cell = |index| u16::try_from(calibrations.cell_or(id, index, 0)).unwrap_or(u16::MAX);
    regs.alpha_undershoot = cell(0) & 0xFF;
    regs.clip_str_min = cell(1);
    regs.clip_str_max = cell(2);
    regs.luma_thresh_low = cell(3);
    regs.luma_thresh_high = cell(4);
    regs.luma_slope_low = cell(5);
    regs.luma_slope_high = cell(6);
    regs.enable = calibrations.contains(id);
}

pub struct SharpeningMachine {
    api_value: u32,
    mult: u32,
    manual_demosaic: bool,
    manual_sharpen: bool,
}

impl SharpeningMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            api_value: SHARPENING_MULT_UNITY,
            mult: SHARPENING_MULT_UNITY,
            manual_demosaic: false,
            manual_sharpen: false,
        }
    }

    fn load_config(env: &mut Env<'_>) {
        let shared = &mut *env.shared;
        sharpen_config(
            &shared.calibrations,
            CalibrationId::SHARP_FR_CONFIG,
            &mut shared.regs.sharpen_fr,
        );
        sharpen_config(
            &shared.calibrations,
            CalibrationId::SHARP_DS1_CONFIG,
            &mut shared.regs.sharpen_ds,
        );
    }

    fn update(&self, env: &mut Env<'_>) {
        let log2_gain = total_gain_8_8(env);
        let shared = &mut *env.shared;
        let calibrations = &shared.calibrations;
        let modulate = |id| calc_modulation_u16(log2_gain, calibrations.modulation(id));
        let scale = |value: u16| {
            let scaled = u32::from(value) * self.mult / SHARPENING_MULT_UNITY;
            u8::try_from(scaled).unwrap_or(u8::MAX)
        };

        if !self.manual_demosaic {
            let demosaic = &mut shared.regs.demosaic;
            demosaic.sharp_alt_d = scale(modulate(CalibrationId::SHARP_ALT_D));
            demosaic.sharp_alt_ud = scale(modulate(CalibrationId::SHARP_ALT_UD));
            demosaic.sharp_alt_du = u8::try_from(modulate(CalibrationId::SHARP_ALT_DU)).unwrap_or(u8::MAX);
            demosaic.uu_slope = u8::try_from(modulate(CalibrationId::DEMOSAIC_UU_SLOPE)).unwrap_or(u8::MAX);
            demosaic.uu_sh_slope =
                u8::try_from(modulate(CalibrationId::DEMOSAIC_UU_SH_SLOPE)).unwrap_or(u8::MAX);
            demosaic.fc_slope = u8::try_from(modulate(CalibrationId::DEMOSAIC_FC_SLOPE)).unwrap_or(u8::MAX);
        }

        if !self.manual_sharpen {
            shared.regs.sharpen_fr.strength = modulate(CalibrationId::SHARPEN_FR);
            shared.regs.sharpen_ds.strength = modulate(CalibrationId::SHARPEN_DS1);
        }
    }
}

impl Default for SharpeningMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for SharpeningMachine {
    fn id(&self) -> MachineId {
        MachineId::Sharpening
    }

    fn init(&mut self, env: &mut Env<'_>) {
        self.api_value = SHARPENING_MULT_UNITY;
        self.mult = SHARPENING_MULT_UNITY;
        env.raise(Event::SharpLutUpdate);
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            Event::FrameEnd => {
                self.update(env);
                true
            }
            Event::SharpLutUpdate => {
                Self::load_config(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::Sharpening(request) = request else {
            return Err(ParamError::Unsupported);
        };

        Ok(match request {
            SharpeningGet::Strength => ParamValue::U32(self.api_value),
            SharpeningGet::Mult => ParamValue::U32(self.mult),
            SharpeningGet::Manual(SharpenBlock::Demosaic) => ParamValue::Bool(self.manual_demosaic),
            SharpeningGet::Manual(SharpenBlock::Sharpen) => ParamValue::Bool(self.manual_sharpen),
        })
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::Sharpening(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            SharpeningSet::Strength(value) => {
                if value > 0xFF {
                    return Err(ParamError::BadArgument);
                }
                self.api_value = value;
                self.mult = strength_to_mult(value);
            }
            SharpeningSet::Mult(value) => self.mult = value,
            SharpeningSet::Manual(SharpenBlock::Demosaic, on) => self.manual_demosaic = on,
            SharpeningSet::Manual(SharpenBlock::Sharpen, on) => self.manual_sharpen = on,
            SharpeningSet::Init => Self::load_config(env),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_is_linear_up_to_neutral() {
        assert_eq!(strength_to_mult(0), 0);
        assert_eq!(strength_to_mult(64), 64);
        assert_eq!(strength_to_mult(128), 128);
    }

    #[test]
    fn strength_above_neutral_grows_quartically() {
        assert_eq!(strength_to_mult(129), 132);
        assert_eq!(strength_to_mult(255), 2016);
        assert!(strength_to_mult(200) > strength_to_mult(150));
    }

    #[test]
    fn config_table_fills_the_static_fields() {
        let mut calibrations = CalibrationSet::new();
        calibrations
            .insert_u16(CalibrationId::SHARP_FR_CONFIG, &[0x1F0, 10, 900, 100, 800, 3, 4])
            .expect("insert");
        let mut regs = SharpenRegs::default();
        sharpen_config(&calibrations, CalibrationId::SHARP_FR_CONFIG, &mut regs);
        assert!(regs.enable);
        assert_eq!(regs.alpha_undershoot, 0xF0);
        assert_eq!(regs.clip_str_max, 900);
        assert_eq!(regs.luma_slope_high, 4);

        let mut missing = SharpenRegs::default();
        sharpen_config(&calibrations, CalibrationId::SHARP_DS1_CONFIG, &mut missing);
        assert!(!missing.enable);
    }
}
