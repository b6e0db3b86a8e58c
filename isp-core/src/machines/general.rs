//! Context-wide housekeeping.
//!
//! Fans a calibration reload out to every machine that caches calibration
//! data, tracks the sensor's WDR mode, serves the register window used by the
//! `TREGISTERS` commands and drives the dynamic gamma blend at frame start.

use crate::calibration::{CalibrationId, CalibrationSet};
use crate::event::Event;
use crate::irq::{Irq, IrqMask};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::regs::{GAMMA_SIZE, IspRegisters};
use crate::sensor::{SensorGet, SensorSet, WdrMode};

use super::ae::AeGet;
use super::cmos::CmosSet;
use super::color_matrix::ColorMatrixSet;
use super::iridix::IridixSet;
use super::matrix_yuv::MatrixYuvSet;
use super::monitor::{MonitorAlgorithm, MonitorSet, MonitorStage};
use super::noise_reduction::NoiseReductionSet;
use super::purple_fringe::PurpleFringeSet;
use super::sharpening::SharpeningSet;
use super::StateMachine;

/// Device behind the register window.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RegisterSource {
    #[default]
    Sensor,
    Lens,
    Isp,
}

impl RegisterSource {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            RegisterSource::Sensor => 0,
            RegisterSource::Lens => 1,
            RegisterSource::Isp => 2,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(RegisterSource::Sensor),
            1 => Some(RegisterSource::Lens),
            2 => Some(RegisterSource::Isp),
            _ => None,
        }
    }
}

/// Reads served by the general machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GeneralGet {
    WdrMode,
    RegisterAddress,
    /// Access width in bits.
    RegisterSize,
    RegisterSource,
    /// Reads the register at the current address through the current source.
    RegisterValue,
    DynamicGamma,
}

/// Writes served by the general machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GeneralSet {
    /// Re-reads calibration in every machine that caches it.
    ReloadCalibration,
    RegisterAddress(u32),
    /// One of 8, 16 or 32.
    RegisterSize(u32),
    RegisterSource(RegisterSource),
    /// Writes the register at the current address through the current source.
    RegisterValue(u32),
    DynamicGamma(bool),
}

/// Mask keeping the low `bits` of a register value.
const fn width_mask(bits: u8) -> u32 {
    match bits {
        8 => 0xFF,
        16 => 0xFFFF,
        _ => u32::MAX,
    }
}

/// Gamma entry for exposure `ev`, blending linearly between the two curves.
fn blend_gamma_entry(ev1: u16, ev2: u16, ev: u32, thresholds: (u32, u32)) -> u16 {
    let (lo, hi) = thresholds;
    if ev <= lo || hi <= lo {
        return ev1;
    }
    if ev >= hi {
        return ev2;
    }
    let span = i64::from(hi - lo);
    let offset = i64::from(ev - lo);
    let value = i64::from(ev1) + (i64::from(ev2) - i64::from(ev1)) * offset / span;
    u16::try_from(value).unwrap_or(ev1)
}

/// Copies a gamma table into the shadow LUT. Returns `false` on a size mismatch.
fn load_gamma(regs: &mut IspRegisters, calibrations: &CalibrationSet, id: CalibrationId) -> bool {
    let len = calibrations.shape(id).map_or(0, |shape| shape.cells());
    if len != GAMMA_SIZE {
        isp_error!(
            "gamma table {} has {} entries, expected {}",
            id.raw(),
            len,
            GAMMA_SIZE
        );
        return false;
    }
    for (slot, value) in regs.gamma.iter_mut().zip(calibrations.cells(id)) {
        *slot = u16::try_from(value).unwrap_or(u16::MAX);
    }
    true
}

pub struct GeneralMachine {
    mask: IrqMask,
    wdr_mode: WdrMode,
    register_address: u32,
    register_bits: u8,
    register_source: RegisterSource,
    dynamic_gamma: bool,
    return_default_gamma: bool,
    gamma_applied_pending: Option<u32>,
}

impl GeneralMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mask: IrqMask::repeating(Irq::FrameStart.mask() | Irq::FrameEnd.mask()),
            wdr_mode: WdrMode::Linear,
            register_address: 0,
            register_bits: 32,
            register_source: RegisterSource::Sensor,
            dynamic_gamma: false,
            return_default_gamma: false,
            gamma_applied_pending: None,
        }
    }

    fn reload_calibration(env: &mut Env<'_>) {
        isp_info!("reloading calibration in context {}", env.shared.context_id);
        for request in [
            Set::NoiseReduction(NoiseReductionSet::Reload),
            Set::Sharpening(SharpeningSet::Init),
            Set::PurpleFringe(PurpleFringeSet::Init),
            Set::Iridix(IridixSet::Init),
            Set::ColorMatrix(ColorMatrixSet::ShadingMeshReload),
            Set::ColorMatrix(ColorMatrixSet::ChangeCcms),
            Set::Cmos(CmosSet::Reload),
            Set::MatrixYuv(MatrixYuvSet::Reload),
        ] {
            env.notify(request);
        }
        Self::apply_default_gamma(env);
    }

    fn apply_default_gamma(env: &mut Env<'_>) {
        let shared = &mut *env.shared;
        load_gamma(&mut shared.regs, &shared.calibrations, CalibrationId::GAMMA);
    }

    fn dynamic_gamma_update(&mut self, env: &mut Env<'_>) {
        let calibrations = &env.shared.calibrations;
        let ev1_len = calibrations
            .shape(CalibrationId::GAMMA_EV1)
            .map_or(0, |shape| shape.cells());
        let ev2_len = calibrations
            .shape(CalibrationId::GAMMA_EV2)
            .map_or(0, |shape| shape.cells());
        if ev1_len != GAMMA_SIZE || ev2_len != GAMMA_SIZE {
            isp_error!(
                "dynamic gamma tables have {} and {} entries, expected {}",
                ev1_len,
                ev2_len,
                GAMMA_SIZE
            );
            return;
        }

        let thresholds = (
            calibrations.cell_or(CalibrationId::GAMMA_THRESHOLD, 0, 0),
            calibrations.cell_or(CalibrationId::GAMMA_THRESHOLD, 1, 0),
        );
        let ae_frame = env.get_u32(Get::Ae(AeGet::FrameId)).unwrap_or(0);
        let exposure = env.get_i32(Get::Ae(AeGet::ExposureLog2)).unwrap_or(0);
        let exposure = u32::try_from(exposure.max(0)).unwrap_or(0);
        if ae_frame != 0 {
            env.notify(Set::Monitor(MonitorSet::Report {
                algorithm: MonitorAlgorithm::Gamma,
                stage: MonitorStage::InputReady,
                frame_id: ae_frame,
            }));
        }

        let shared = &mut *env.shared;
        let curves = shared
            .calibrations
            .cells(CalibrationId::GAMMA_EV1)
            .zip(shared.calibrations.cells(CalibrationId::GAMMA_EV2));
        for (slot, (ev1, ev2)) in shared.regs.gamma.iter_mut().zip(curves) {
            let ev1 = u16::try_from(ev1).unwrap_or(u16::MAX);
            let ev2 = u16::try_from(ev2).unwrap_or(u16::MAX);
            *slot = blend_gamma_entry(ev1, ev2, exposure, thresholds);
        }
        isp_trace!(
            "dynamic gamma ev {} between {} and {}",
            exposure,
            thresholds.0,
            thresholds.1
        );

        if ae_frame != 0 {
            env.notify(Set::Monitor(MonitorSet::Report {
                algorithm: MonitorAlgorithm::Gamma,
                stage: MonitorStage::OutputReady,
                frame_id: ae_frame,
            }));
            self.gamma_applied_pending = Some(ae_frame);
        }
    }

    fn frame_start(&mut self, env: &mut Env<'_>) {
        if let Some(frame_id) = self.gamma_applied_pending.take() {
            env.notify(Set::Monitor(MonitorSet::Report {
                algorithm: MonitorAlgorithm::Gamma,
                stage: MonitorStage::Applied,
                frame_id,
            }));
        }

        if self.dynamic_gamma {
            self.dynamic_gamma_update(env);
            self.return_default_gamma = true;
        } else if self.return_default_gamma {
            Self::apply_default_gamma(env);
            self.return_default_gamma = false;
        }
    }

    fn sensor_ready(&mut self, env: &mut Env<'_>) {
        let info = env.sensor_info();
        if info.mode.wdr_mode != self.wdr_mode {
            isp_info!(
                "wdr mode {} -> {}",
                self.wdr_mode.to_raw(),
                info.mode.wdr_mode.to_raw()
            );
        }
        self.wdr_mode = info.mode.wdr_mode;
    }

    fn read_register(&self, env: &mut Env<'_>) -> Result<u32, ParamError> {
        match self.register_source {
            RegisterSource::Sensor => {
                let value = env.get_u32(Get::Sensor(SensorGet::Register(self.register_address)))?;
                Ok(value & width_mask(self.register_bits))
            }
            RegisterSource::Lens | RegisterSource::Isp => Err(ParamError::Unsupported),
        }
    }

    fn write_register(&self, value: u32, env: &mut Env<'_>) -> Result<(), ParamError> {
        match self.register_source {
            RegisterSource::Sensor => env.set(Set::Sensor(SensorSet::Register {
                address: self.register_address,
                value: value & width_mask(self.register_bits),
            })),
            RegisterSource::Lens | RegisterSource::Isp => Err(ParamError::Unsupported),
        }
    }
}

impl Default for GeneralMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for GeneralMachine {
    fn id(&self) -> MachineId {
        MachineId::General
    }

    fn init(&mut self, env: &mut Env<'_>) {
        *self = Self::new();
        self.sensor_ready(env);
    }

    fn irq_mask(&mut self) -> Option<&mut IrqMask> {
        Some(&mut self.mask)
    }

    fn process_interrupt(&mut self, irq: Irq, env: &mut Env<'_>) {
        match irq {
            Irq::FrameStart => self.frame_start(env),
            Irq::FrameEnd => env.raise(Event::FrameEnd),
            _ => {}
        }
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            Event::SensorReady => {
                self.sensor_ready(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::General(request) = request else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            GeneralGet::WdrMode => ParamValue::U32(self.wdr_mode.to_raw()),
            GeneralGet::RegisterAddress => ParamValue::U32(self.register_address),
            GeneralGet::RegisterSize => ParamValue::U32(u32::from(self.register_bits)),
            GeneralGet::RegisterSource => ParamValue::U32(self.register_source.to_raw()),
            GeneralGet::RegisterValue => ParamValue::U32(self.read_register(env)?),
            GeneralGet::DynamicGamma => ParamValue::Bool(self.dynamic_gamma),
        };
        Ok(value)
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::General(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            GeneralSet::ReloadCalibration => Self::reload_calibration(env),
            GeneralSet::RegisterAddress(address) => self.register_address = address,
            GeneralSet::RegisterSize(bits) => {
                self.register_bits = match bits {
                    8 => 8,
                    16 => 16,
                    32 => 32,
                    _ => return Err(ParamError::BadArgument),
                };
            }
            GeneralSet::RegisterSource(source) => self.register_source = source,
            GeneralSet::RegisterValue(value) => self.write_register(value, env)?,
            GeneralSet::DynamicGamma(on) => self.dynamic_gamma = on,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_sources_use_command_codes() {
        assert_eq!(RegisterSource::from_raw(0), Some(RegisterSource::Sensor));
        assert_eq!(RegisterSource::from_raw(2), Some(RegisterSource::Isp));
        assert_eq!(RegisterSource::from_raw(3), None);
        assert_eq!(RegisterSource::Lens.to_raw(), 1);
    }

    #[test]
    fn register_width_masks_the_value() {
        assert_eq!(0x1234_5678 & width_mask(8), 0x78);
        assert_eq!(0x1234_5678 & width_mask(16), 0x5678);
        assert_eq!(0x1234_5678 & width_mask(32), 0x1234_5678);
    }

    #[test]
    fn gamma_blend_clamps_outside_thresholds() {
        let thresholds = (100, 300);
        assert_eq!(blend_gamma_entry(1000, 2000, 50, thresholds), 1000);
        assert_eq!(blend_gamma_entry(1000, 2000, 400, thresholds), 2000);
        assert_eq!(blend_gamma_entry(1000, 2000, 200, thresholds), 1500);
        assert_eq!(blend_gamma_entry(2000, 1000, 150, thresholds), 1750);
    }

    #[test]
    fn degenerate_thresholds_keep_the_first_curve() {
        assert_eq!(blend_gamma_entry(10, 20, 500, (300, 300)), 10);
    }

    #[test]
    fn short_gamma_table_is_rejected() {
        let mut calibrations = CalibrationSet::new();
        calibrations
            .insert_u16(CalibrationId::GAMMA, &[0, 100, 200])
            .expect("room for gamma");
        let mut regs = IspRegisters::new();
        let before = regs.gamma;
        assert!(!load_gamma(&mut regs, &calibrations, CalibrationId::GAMMA));
        assert_eq!(regs.gamma, before);
    }

    #[test]
    fn full_gamma_table_is_copied() {
        let table: [u16; GAMMA_SIZE] = core::array::from_fn(|i| u16::try_from(i * 2).unwrap());
        let mut calibrations = CalibrationSet::new();
        calibrations
            .insert_u16(CalibrationId::GAMMA, &table)
            .expect("room for gamma");
        let mut regs = IspRegisters::new();
        assert!(load_gamma(&mut regs, &calibrations, CalibrationId::GAMMA));
        assert_eq!(regs.gamma, table);
    }
}
