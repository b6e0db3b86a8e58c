//! Purple-fringe correction.
//!
//! The detection curves and radial shading come straight from calibration and
//! are loaded once; only the SAD threshold and slope follow total gain.

use crate::calibration::{CalibrationId, CalibrationSet};
use crate::event::Event;
use crate::math::calc_modulation_u16;
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::regs::{PF_CURVE_COUNT, PfCurve, PurpleFringeRegs, RADIAL_LUT_SIZE};

use super::{StateMachine, require_lut, total_gain_8_8};

/// Cells in `PF_CONFIG`.
const PF_CONFIG_CELLS: usize = 7 + 3 * PF_CURVE_COUNT + 1;

/// 12-bit register fields.
const FIELD_MASK: u16 = 0x0FFF;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PurpleFringeGet {
    SadThresh,
    SadSlope,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PurpleFringeSet {
    /// Reloads the static configuration and radial shading.
    Init,
}

/// Static part of the block from its `PF_CONFIG` table.
fn apply_config(calibrations: &CalibrationSet, regs: &mut PurpleFringeRegs) {
    let id = CalibrationId::PF_CONFIG;
    let cell = |index| u16::try_from(calibrations.cell_or(id, index, 0)).unwrap_or(u16::MAX);
    let field = |index| cell(index) & FIELD_MASK;
    let byte = |index| u8::try_from(cell(index) & 0xFF).unwrap_or(u8::MAX);

    regs.use_color_corrected_rgb = cell(0) & 0x01 != 0;
    regs.hue_strength = field(1);
    regs.sat_strength = field(2);
    regs.luma_strength = field(3);
    regs.purple_strength = field(4);
    regs.saturation_strength = byte(5);
    regs.sad_offset = field(6);
    for (index, curve) in regs.curves.iter_mut().enumerate() {
        let base = 7 + 3 * index;
        *curve = PfCurve {
            slope: field(base),
            offset: field(base + 1),
            thresh: field(base + 2),
        };
    }
    regs.debug_sel = byte(PF_CONFIG_CELLS - 1);
}

fn apply_radial(calibrations: &CalibrationSet, regs: &mut PurpleFringeRegs) {
    let mut lut = [0u8; RADIAL_LUT_SIZE];
    for (out, value) in lut
        .iter_mut()
        .zip(calibrations.cells(CalibrationId::PF_RADIAL_LUT))
    {
        *out = u8::try_from(value).unwrap_or(u8::MAX);
    }
    regs.radial_lut = lut;

    let params = CalibrationId::PF_RADIAL_PARAMS;
    let narrow = |index| u16::try_from(calibrations.cell_or(params, index, 0)).unwrap_or(0);
    regs.radial_centre_x = narrow(0);
    regs.radial_centre_y = narrow(1);
    regs.radial_off_center_mult = narrow(2);
}

#[derive(Default)]
pub struct PurpleFringeMachine;

impl PurpleFringeMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn load_static(env: &mut Env<'_>) {
        if require_lut(env, CalibrationId::PF_CONFIG) {
            let shared = &mut *env.shared;
            apply_config(&shared.calibrations, &mut shared.regs.purple_fringe);
        }
        if require_lut(env, CalibrationId::PF_RADIAL_LUT)
            && require_lut(env, CalibrationId::PF_RADIAL_PARAMS)
        {
            let shared = &mut *env.shared;
            apply_radial(&shared.calibrations, &mut shared.regs.purple_fringe);
        }
        isp_debug!("purple fringe configuration loaded");
    }

    fn update(env: &mut Env<'_>) {
        let log2_gain = total_gain_8_8(env);
        let shared = &mut *env.shared;
        let calibrations = &shared.calibrations;
        let regs = &mut shared.regs.purple_fringe;
        regs.sad_thresh =
            calc_modulation_u16(log2_gain, calibrations.modulation(CalibrationId::PF_SAD_THRESH));
        regs.sad_slope =
            calc_modulation_u16(log2_gain, calibrations.modulation(CalibrationId::PF_SAD_SLOPE));
    }
}

impl StateMachine for PurpleFringeMachine {
    fn id(&self) -> MachineId {
        MachineId::PurpleFringe
    }

    fn init(&mut self, env: &mut Env<'_>) {
        Self::load_static(env);
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            Event::FrameEnd => {
                Self::update(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::PurpleFringe(request) = request else {
            return Err(ParamError::Unsupported);
        };
        let regs = &env.shared.regs.purple_fringe;
        Ok(ParamValue::U32(u32::from(match request {
            PurpleFringeGet::SadThresh => regs.sad_thresh,
            PurpleFringeGet::SadSlope => regs.sad_slope,
        })))
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::PurpleFringe(request) = request else {
            return Err(ParamError::Unsupported);
        };
        match request {
            PurpleFringeSet::Init => Self::load_static(env),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};
    use crate::context::ContextShared;
    use crate::dispatcher::Dispatcher;
    use crate::machines::{AeAlgorithm, CmosGet};
    use crate::math::LOG2_GAIN_SHIFT;
    use crate::sensor::SensorBackend;

    #[test]
    fn config_table_masks_every_field() {
        let mut table = [0u16; PF_CONFIG_CELLS];
        table[0] = 0x03;
        table[1] = 0xF123;
        table[5] = 0x1FF;
        table[7] = 0x0400;
        table[9] = 0x0200;
        table[PF_CONFIG_CELLS - 2] = 0x0800;
        table[PF_CONFIG_CELLS - 1] = 2;
        let mut calibrations = CalibrationSet::new();
        calibrations
            .insert_u16(CalibrationId::PF_CONFIG, &table)
            .expect("insert");

        let mut regs = PurpleFringeRegs::default();
        apply_config(&calibrations, &mut regs);
        assert!(regs.use_color_corrected_rgb);
        assert_eq!(regs.hue_strength, 0x0123);
        assert_eq!(regs.saturation_strength, 0xFF);
        assert_eq!(
            regs.curves[0],
            PfCurve {
                slope: 0x0400,
                offset: 0,
                thresh: 0x0200
            }
        );
        assert_eq!(regs.curves[PF_CURVE_COUNT - 1].thresh, 0x0800);
        assert_eq!(regs.debug_sel, 2);
    }

    #[test]
    fn missing_radial_tables_leave_zeros() {
        let mut regs = PurpleFringeRegs::default();
        apply_radial(&CalibrationSet::new(), &mut regs);
        assert_eq!(regs, PurpleFringeRegs::default());
    }

    #[test]
    fn sad_curves_follow_gain_each_frame() {
        let shared = ContextShared::new(
            0,
            dummy_calibrations().expect("defaults fit"),
            DEFAULT_ISO_BASE_GAINS,
        );
        let mut dispatcher: Dispatcher<16> =
            Dispatcher::new(shared, SensorBackend::default(), AeAlgorithm::default())
                .expect("every machine registered");
        dispatcher.init();
        dispatcher.process_events(None);

        let regs = dispatcher.shared().regs.purple_fringe;
        assert!(regs.use_color_corrected_rgb);
        assert_eq!(regs.radial_centre_x, 960);

        dispatcher.raise(Event::FrameEnd);
        dispatcher.process_events(None);
        let total = dispatcher
            .get(Get::Cmos(CmosGet::TotalGainLog2))
            .and_then(ParamValue::as_i32)
            .expect("total gain");
        let log2_gain = u16::try_from(total.max(0) >> (LOG2_GAIN_SHIFT - 8)).expect("8.8 gain");
        let calibrations = &dispatcher.shared().calibrations;
        let thresh =
            calc_modulation_u16(log2_gain, calibrations.modulation(CalibrationId::PF_SAD_THRESH));
        let slope =
            calc_modulation_u16(log2_gain, calibrations.modulation(CalibrationId::PF_SAD_SLOPE));
        assert!((0x0100..=0x0400).contains(&thresh));

        let mut read = |request| {
            dispatcher
                .get(Get::PurpleFringe(request))
                .and_then(ParamValue::as_u32)
                .expect("readable")
        };
        assert_eq!(read(PurpleFringeGet::SadThresh), u32::from(thresh));
        assert_eq!(read(PurpleFringeGet::SadSlope), u32::from(slope));
    }
}
