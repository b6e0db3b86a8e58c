//! Iridix local tone mapping.
//!
//! Runs on `UpdateIridix`, which AE raises after publishing a target. The
//! strength target follows the scene exposure between the "no strength" and
//! "full strength" limits and is smoothed by a running average; contrast,
//! dark enhancement and the global digital gain follow the smoothed strength.

use crate::calibration::{CalibrationId, CalibrationSet};
use crate::event::Event;
use crate::irq::{Irq, IrqMask};
use crate::math::LOG2_GAIN_SHIFT;
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;

use super::ae::AeGet;
use super::cmos::CmosGet;
use super::monitor::{MonitorAlgorithm, MonitorErrorReport, MonitorSet, MonitorStage};
use super::{StateMachine, require_lut};

const STRENGTH_TARGET_INIT: u16 = 0x80;
const DARK_ENH_INIT: u16 = 15_000;
const UNITY_8_8: u16 = 0x100;

/// Reads served by the Iridix machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IridixGet {
    /// Local contrast, 8.8.
    Contrast,
    Strength,
    DarkEnh,
    /// Global digital gain, 8.8.
    GlobalDg,
    Manual,
}

/// Writes served by the Iridix machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IridixSet {
    Manual(bool),
    /// Strength used while in manual mode.
    Strength(u16),
    /// Reloads the calibration-derived limits.
    Init,
}

/// Limits read from calibration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct IridixLimits {
    avg_coef: u32,
    strength_max: u16,
    strength_min: u16,
    ev_full_strength: u32,
    ev_no_strength: u32,
    dark_enh_min: u16,
    dark_enh_max: u16,
    contrast_min: u16,
    contrast_max: u16,
    max_gain: u16,
    global_dg_enabled: bool,
}

impl IridixLimits {
    fn from_calibration(calibrations: &CalibrationSet) -> Self {
        let cell = |id, index, default| calibrations.cell_or(id, index, default);
        let narrow = |value: u32| u16::try_from(value).unwrap_or(u16::MAX);
        let dk = CalibrationId::IRIDIX8_STRENGTH_DK_ENH_CONTROL;
        Self {
            avg_coef: cell(CalibrationId::IRIDIX_AVG_COEF, 0, 15).max(1),
            strength_max: narrow(cell(CalibrationId::IRIDIX_STRENGTH_MAXIMUM, 0, 255)),
            strength_min: narrow(cell(CalibrationId::IRIDIX_MIN_MAX_STR, 0, 0)),
            ev_full_strength: cell(CalibrationId::IRIDIX_EV_LIM_FULL_STR, 0, 0x1800),
            ev_no_strength: cell(CalibrationId::IRIDIX_EV_LIM_NO_STR, 0, 0x0800),
            dark_enh_min: narrow(cell(dk, 2, 2000)),
            dark_enh_max: narrow(cell(dk, 3, 30_000)),
            contrast_min: narrow(cell(dk, 11, 0x100)),
            contrast_max: narrow(cell(dk, 12, 0x200)),
            max_gain: narrow(cell(dk, 13, 0x100)),
            global_dg_enabled: cell(CalibrationId::AE_CONTROL, 7, 0) != 0,
        }
    }
}

fn lerp(min: u16, max: u16, strength: u16, full: u16) -> u16 {
    if full == 0 {
        return min;
    }
    let span = i32::from(max) - i32::from(min);
    let value = i32::from(min) + span * i32::from(strength) / i32::from(full);
    u16::try_from(value.clamp(0, i32::from(u16::MAX))).unwrap_or(min)
}

pub struct IridixMachine {
    mask: IrqMask,
    limits: IridixLimits,
    manual: bool,
    manual_strength: u16,
    strength_target: u16,
    strength_avg: u32,
    dark_enh: u16,
    contrast: u16,
    global_dg: u16,
    applied_pending: Option<u32>,
}

impl IridixMachine {
    #[must_use]
    pub fn new() -> Self {
        let limits = IridixLimits::from_calibration(&CalibrationSet::new());
        Self {
            mask: IrqMask::repeating(Irq::FrameStart.mask()),
            limits,
            manual: false,
            manual_strength: STRENGTH_TARGET_INIT,
            strength_target: STRENGTH_TARGET_INIT,
            strength_avg: u32::from(STRENGTH_TARGET_INIT) * limits.avg_coef,
            dark_enh: DARK_ENH_INIT,
            contrast: UNITY_8_8,
            global_dg: UNITY_8_8,
            applied_pending: None,
        }
    }

    fn load_calibration(&mut self, env: &mut Env<'_>) {
        for id in [
            CalibrationId::IRIDIX_STRENGTH_MAXIMUM,
            CalibrationId::IRIDIX_AVG_COEF,
            CalibrationId::IRIDIX8_STRENGTH_DK_ENH_CONTROL,
        ] {
            require_lut(env, id);
        }
        self.limits = IridixLimits::from_calibration(&env.shared.calibrations);
        self.strength_avg = u32::from(self.strength_target) * self.limits.avg_coef;
    }

    /// Strength for the given exposure, log2 in 8.8.
    fn target_for_exposure(&self, exposure_8_8: u32) -> u16 {
        let limits = &self.limits;
        let (no, full) = (limits.ev_no_strength, limits.ev_full_strength);
        if exposure_8_8 >= full {
            limits.strength_max
        } else if exposure_8_8 <= no || full <= no {
            limits.strength_min
        } else {
            let span = u32::from(limits.strength_max.saturating_sub(limits.strength_min));
            let offset = span * (exposure_8_8 - no) / (full - no);
            limits
                .strength_min
                .saturating_add(u16::try_from(offset).unwrap_or(u16::MAX))
        }
    }

    fn calculate(&mut self, env: &mut Env<'_>) {
        let ae_frame = env.get_u32(Get::Ae(AeGet::FrameId)).unwrap_or(0);
        if ae_frame != 0 {
            env.notify(Set::Monitor(MonitorSet::Report {
                algorithm: MonitorAlgorithm::Iridix,
                stage: MonitorStage::InputReady,
                frame_id: ae_frame,
            }));
            if env.shared.frame_id != ae_frame {
                isp_warn!(
                    "iridix update for frame {} runs in frame {}",
                    ae_frame,
                    env.shared.frame_id
                );
                env.notify(Set::Monitor(MonitorSet::Error(
                    MonitorErrorReport::IridixUpdateNotInVb,
                )));
            }
        }

        let strength = if self.manual {
            self.manual_strength
        } else {
            let exposure = env.get_i32(Get::Cmos(CmosGet::ExposureLog2)).unwrap_or(0);
            let exposure_8_8 = u32::try_from(exposure.max(0) >> (LOG2_GAIN_SHIFT - 8)).unwrap_or(0);
            self.strength_target = self.target_for_exposure(exposure_8_8);

            let coef = self.limits.avg_coef;
            self.strength_avg =
                self.strength_avg - self.strength_avg / coef + u32::from(self.strength_target);
            u16::try_from(self.strength_avg / coef).unwrap_or(u16::MAX)
        };

        let limits = self.limits;
        let full = limits.strength_max.max(1);
        self.dark_enh = lerp(limits.dark_enh_min, limits.dark_enh_max, strength, full);
        self.contrast = lerp(limits.contrast_min, limits.contrast_max, strength, full);
        self.global_dg = if limits.global_dg_enabled {
            lerp(UNITY_8_8, limits.max_gain.max(UNITY_8_8), strength, full)
        } else {
            UNITY_8_8
        };

        let regs = &mut env.shared.regs.iridix;
        regs.enable = true;
        regs.strength = strength;
        regs.dark_enh = self.dark_enh;
        regs.contrast = self.contrast;
        regs.global_dg = self.global_dg;

        if ae_frame != 0 {
            env.notify(Set::Monitor(MonitorSet::Report {
                algorithm: MonitorAlgorithm::Iridix,
                stage: MonitorStage::OutputReady,
                frame_id: ae_frame,
            }));
            self.applied_pending = Some(ae_frame);
        }
        isp_trace!("iridix strength {} contrast {}", strength, self.contrast);
    }
}

impl Default for IridixMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for IridixMachine {
    fn id(&self) -> MachineId {
        MachineId::Iridix
    }

    fn init(&mut self, env: &mut Env<'_>) {
        *self = Self::new();
        self.load_calibration(env);
    }

    fn irq_mask(&mut self) -> Option<&mut IrqMask> {
        Some(&mut self.mask)
    }

    fn process_interrupt(&mut self, irq: Irq, env: &mut Env<'_>) {
        if irq != Irq::FrameStart {
            return;
        }
        if let Some(frame_id) = self.applied_pending.take() {
            env.notify(Set::Monitor(MonitorSet::Report {
                algorithm: MonitorAlgorithm::Iridix,
                stage: MonitorStage::Applied,
                frame_id,
            }));
        }
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            Event::UpdateIridix => {
                self.calculate(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::Iridix(request) = request else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            IridixGet::Contrast => ParamValue::U32(u32::from(self.contrast)),
            IridixGet::Strength => ParamValue::U32(u32::from(self.strength_target)),
            IridixGet::DarkEnh => ParamValue::U32(u32::from(self.dark_enh)),
            IridixGet::GlobalDg => ParamValue::U32(u32::from(self.global_dg)),
            IridixGet::Manual => ParamValue::Bool(self.manual),
        };
        Ok(value)
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::Iridix(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            IridixSet::Manual(on) => self.manual = on,
            IridixSet::Strength(strength) => {
                self.manual_strength = strength.min(self.limits.strength_max);
            }
            IridixSet::Init => self.load_calibration(env),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_follows_exposure_between_limits() {
        let machine = IridixMachine::new();
        let limits = machine.limits;
        assert_eq!(machine.target_for_exposure(0), limits.strength_min);
        assert_eq!(
            machine.target_for_exposure(limits.ev_full_strength + 1),
            limits.strength_max
        );
        let middle = (limits.ev_full_strength + limits.ev_no_strength) / 2;
        let value = machine.target_for_exposure(middle);
        assert!(value > limits.strength_min && value < limits.strength_max);
    }

    #[test]
    fn lerp_spans_the_range() {
        assert_eq!(lerp(100, 200, 0, 255), 100);
        assert_eq!(lerp(100, 200, 255, 255), 200);
        assert_eq!(lerp(200, 100, 255, 255), 100);
        assert_eq!(lerp(7, 9, 3, 0), 7);
    }
}
