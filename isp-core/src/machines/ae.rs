//! Auto-exposure.
//!
//! The AE statistics interrupt copies and decompresses the global histogram;
//! the `AeStatsReady` event then runs the compute strategy and forwards the
//! target to the CMOS machine, tagged with the frame id of the statistics it
//! came from. Strategies implement [`AeCore`] and are chosen at build time
//! through [`AeAlgorithm`].

use crate::calibration::{CalibrationId, CalibrationSet};
use crate::event::Event;
use crate::irq::{Irq, IrqMask};
use crate::math::{LOG2_GAIN_SHIFT, calc_modulation_u16, exp2_fixed, log2_fixed_to_fixed, log2_int_to_fixed};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::stats::{HISTOGRAM_BINS, ZONES, decompress_bin};

use super::cmos::{CmosGet, CmosSet};
use super::dma_writer::DmaWriterGet;
use super::iridix::IridixGet;
use super::monitor::{MonitorAlgorithm, MonitorSet, MonitorStage};
use super::roi::Roi;
use super::StateMachine;

/// Compensation value that leaves the target untouched.
pub const AE_COMPENSATION_NEUTRAL: u32 = 128;

#[allow(clippy::cast_possible_truncation)]
const LAST_BIN: u32 = HISTOGRAM_BINS as u32 - 1;

/// Convergence state reported over the command surface.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum AeState {
    #[default]
    Inactive,
    Searching,
    Converged,
}

impl AeState {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            AeState::Inactive => 0,
            AeState::Searching => 1,
            AeState::Converged => 2,
        }
    }
}

/// Overrides owned by the AE machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AeManual {
    Exposure,
    ExposureRatio,
}

/// Reads served by the AE machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AeGet {
    State,
    Roi,
    Compensation,
    Manual(AeManual),
    /// Target exposure, linear with six fractional bits.
    Exposure,
    ExposureRatio,
    ExposureLog2,
    /// Frame id of the statistics behind the last target.
    FrameId,
}

/// Writes served by the AE machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AeSet {
    Roi(u32),
    Compensation(u32),
    Manual(AeManual, bool),
    Exposure(u32),
    ExposureRatio(u32),
    /// Re-applies the ROI after an orientation change.
    RefreshRoi,
}

/// Layout of `AE_CONTROL`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AeControl {
    pub pi_coeff: u32,
    pub target_point: u32,
    pub tail_weight: u32,
    pub long_clip: u32,
    pub er_avg_coeff: u32,
    pub hi_target_prc: u32,
    pub hi_target_p: u32,
    pub enable_iridix_gdg: u32,
    pub tolerance: u32,
}

impl AeControl {
    #[must_use]
    pub fn from_calibration(calibrations: &CalibrationSet) -> Self {
        let cell = |index, default| calibrations.cell_or(CalibrationId::AE_CONTROL, index, default);
        Self {
            pi_coeff: cell(0, 64),
            target_point: cell(1, 220),
            tail_weight: cell(2, 64),
            long_clip: cell(3, 0),
            er_avg_coeff: cell(4, 8),
            hi_target_prc: cell(5, 5),
            hi_target_p: cell(6, 95),
            enable_iridix_gdg: cell(7, 0),
            tolerance: cell(8, 4),
        }
    }
}

/// Statistics handed to a strategy.
#[derive(Copy, Clone, Debug)]
pub struct AeStats<'a> {
    pub fullhist: &'a [u32],
    pub fullhist_sum: u32,
    pub zone_hist: &'a [u16],
}

/// Everything a strategy may consult besides the statistics.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AeMiscInfo {
    pub sensor_exp_number: u8,
    pub total_gain_log2: i32,
    pub max_exposure_log2: i32,
    pub max_exposure_ratio: u32,
    pub iridix_contrast: u32,
    pub exposure_log2: i32,
    pub exposure_ratio: u32,
    pub compensation: u32,
    pub manual_exposure: bool,
    pub manual_exposure_ratio: bool,
}

#[derive(Copy, Clone, Debug)]
pub struct AeInput<'a> {
    pub control: AeControl,
    pub misc: AeMiscInfo,
    pub calibrations: &'a CalibrationSet,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AeOutput {
    pub exposure_log2: i32,
    pub exposure_ratio: u32,
    pub converged: bool,
}

/// Exposure compute strategy.
pub trait AeCore {
    fn process(&mut self, stats: &AeStats<'_>, input: &AeInput<'_>) -> AeOutput;
}

/// Damped controller that drives the histogram mean to the target point.
#[derive(Copy, Clone, Debug, Default)]
pub struct BalancedAe {
    averaged_ratio: u32,
}

impl BalancedAe {
    /// Mean bin index of the histogram, 0..=1023.
    fn mean(stats: &AeStats<'_>) -> Option<u32> {
        if stats.fullhist_sum == 0 {
            return None;
        }
        let weighted: u64 = stats
            .fullhist
            .iter()
            .enumerate()
            .map(|(bin, count)| bin as u64 * u64::from(*count))
            .sum();
        u32::try_from(weighted / u64::from(stats.fullhist_sum)).ok()
    }

    /// Fraction of pixels, in percent, at or above bin `threshold`.
    fn tail_percent(stats: &AeStats<'_>, threshold: usize) -> u32 {
        let above: u64 = stats
            .fullhist
            .iter()
            .skip(threshold)
            .map(|count| u64::from(*count))
            .sum();
        u32::try_from(above * 100 / u64::from(stats.fullhist_sum.max(1))).unwrap_or(100)
    }

    fn target(input: &AeInput<'_>) -> u32 {
        let misc = &input.misc;
        let mut target = input.control.target_point;

        if misc.sensor_exp_number > 1 && input.calibrations.rows(CalibrationId::AE_CONTROL_HDR_TARGET) > 0 {
            let gain_8_8 = u16::try_from(misc.total_gain_log2.max(0) >> (LOG2_GAIN_SHIFT - 8))
                .unwrap_or(u16::MAX);
            target = u32::from(calc_modulation_u16(
                gain_8_8,
                input.calibrations.modulation(CalibrationId::AE_CONTROL_HDR_TARGET),
            ));
        }

        let correction = Self::correction(input);
        target = target * correction / 128;
        target = target * misc.compensation / AE_COMPENSATION_NEUTRAL;
        if input.control.enable_iridix_gdg != 0 && misc.iridix_contrast > 256 {
            target = target * 256 / misc.iridix_contrast;
        }
        target.clamp(1, LAST_BIN)
    }

    /// Target correction interpolated against the current exposure, 128 = 1.0.
    fn correction(input: &AeInput<'_>) -> u32 {
        let calibrations = input.calibrations;
        let points = calibrations
            .cells(CalibrationId::AE_EXPOSURE_CORRECTION)
            .zip(calibrations.cells(CalibrationId::AE_CORRECTION))
            .map(|(x, y)| {
                crate::math::ModulationEntry::new(
                    u16::try_from(x).unwrap_or(u16::MAX),
                    u16::try_from(y).unwrap_or(u16::MAX),
                )
            });
        let exposure_8_8 = u16::try_from(input.misc.exposure_log2.max(0) >> (LOG2_GAIN_SHIFT - 8))
            .unwrap_or(u16::MAX);
        match u32::from(calc_modulation_u16(exposure_8_8, points)) {
            0 => 128,
            value => value,
        }
    }
}

impl AeCore for BalancedAe {
    fn process(&mut self, stats: &AeStats<'_>, input: &AeInput<'_>) -> AeOutput {
        let misc = input.misc;
        let control = input.control;

        let ratio = if misc.sensor_exp_number > 1 {
            let max = misc.max_exposure_ratio.max(1);
            let coeff = control.er_avg_coeff.max(1);
            self.averaged_ratio = (self.averaged_ratio * (coeff - 1) + max) / coeff;
            self.averaged_ratio.clamp(1, max)
        } else {
            1
        };

        let Some(mean) = Self::mean(stats) else {
            return AeOutput {
                exposure_log2: misc.exposure_log2,
                exposure_ratio: ratio,
                converged: false,
            };
        };

        let target = Self::target(input);
        let mut error = log2_int_to_fixed(target, LOG2_GAIN_SHIFT)
            - log2_int_to_fixed(mean.max(1), LOG2_GAIN_SHIFT);

        let threshold = (HISTOGRAM_BINS * control.hi_target_p.min(100) as usize) / 100;
        if Self::tail_percent(stats, threshold) > control.hi_target_prc {
            // Too many pixels near clipping: bias the step downwards.
            let tail_step =
                -(control.tail_weight.min(256).cast_signed() << (LOG2_GAIN_SHIFT - 8));
            error = error.min(tail_step);
        }

        let tolerance = control.tolerance.min(256).cast_signed() << (LOG2_GAIN_SHIFT - 8);
        let converged = error.abs() <= tolerance;
        let step = if converged {
            0
        } else {
            let scaled = i64::from(error) * i64::from(control.pi_coeff.max(1)) / 256;
            i32::try_from(scaled).unwrap_or(0)
        };

        let exposure_log2 = (misc.exposure_log2 + step).clamp(0, misc.max_exposure_log2.max(0));
        AeOutput {
            exposure_log2,
            exposure_ratio: ratio,
            converged,
        }
    }
}

/// Strategies compiled into the firmware.
#[derive(Copy, Clone, Debug)]
pub enum AeAlgorithm {
    Balanced(BalancedAe),
}

impl Default for AeAlgorithm {
    fn default() -> Self {
        AeAlgorithm::Balanced(BalancedAe::default())
    }
}

impl AeCore for AeAlgorithm {
    fn process(&mut self, stats: &AeStats<'_>, input: &AeInput<'_>) -> AeOutput {
        match self {
            AeAlgorithm::Balanced(core) => core.process(stats, input),
        }
    }
}

pub struct AeMachine {
    mask: IrqMask,
    algorithm: AeAlgorithm,
    fullhist: [u32; HISTOGRAM_BINS],
    fullhist_sum: u32,
    zone_hist: [u16; ZONES],
    stats_frame_id: u32,
    output_frame_id: u32,
    roi: Roi,
    compensation: u32,
    manual_exposure: bool,
    manual_exposure_ratio: bool,
    exposure_log2: i32,
    exposure_ratio: u32,
    converged: bool,
}

impl AeMachine {
    #[must_use]
    pub const fn new(algorithm: AeAlgorithm) -> Self {
        Self {
            mask: IrqMask::repeating(Irq::AeStats.mask()),
            algorithm,
            fullhist: [0; HISTOGRAM_BINS],
            fullhist_sum: 0,
            zone_hist: [0; ZONES],
            stats_frame_id: 0,
            output_frame_id: 0,
            roi: Roi::FULL,
            compensation: AE_COMPENSATION_NEUTRAL,
            manual_exposure: false,
            manual_exposure_ratio: false,
            exposure_log2: 0,
            exposure_ratio: 1,
            converged: false,
        }
    }

    fn read_stats(&mut self, env: &mut Env<'_>) {
        let stats = &env.shared.stats;
        let mut sum: u32 = 0;
        for (out, raw) in self.fullhist.iter_mut().zip(stats.histogram.iter()) {
            *out = decompress_bin(*raw);
            sum = sum.saturating_add(*out);
        }
        self.fullhist_sum = sum;
        self.zone_hist = stats.zone_hist;
        self.stats_frame_id = stats.frame_id;

        env.notify(Set::Monitor(MonitorSet::Report {
            algorithm: MonitorAlgorithm::Ae,
            stage: MonitorStage::InputReady,
            frame_id: self.stats_frame_id,
        }));
        isp_trace!("ae input ready: frame {} sum {}", self.stats_frame_id, sum);
    }

    fn misc_info(&self, env: &mut Env<'_>) -> AeMiscInfo {
        let info = env.sensor_info();
        AeMiscInfo {
            sensor_exp_number: info.sensor_exp_number.max(1),
            total_gain_log2: env.get_i32(Get::Cmos(CmosGet::TotalGainLog2)).unwrap_or(0),
            max_exposure_log2: env.get_i32(Get::Cmos(CmosGet::MaxExposureLog2)).unwrap_or(0),
            max_exposure_ratio: env
                .get_u32(Get::Cmos(CmosGet::Control(super::CmosField::MaxExposureRatio)))
                .unwrap_or(1),
            iridix_contrast: env.get_u32(Get::Iridix(IridixGet::Contrast)).unwrap_or(256),
            exposure_log2: env
                .get_i32(Get::Cmos(CmosGet::ExposureLog2))
                .unwrap_or(self.exposure_log2),
            exposure_ratio: self.exposure_ratio,
            compensation: self.compensation,
            manual_exposure: self.manual_exposure,
            manual_exposure_ratio: self.manual_exposure_ratio,
        }
    }

    fn process_stats(&mut self, env: &mut Env<'_>) {
        let misc = self.misc_info(env);
        let output = {
            let input = AeInput {
                control: AeControl::from_calibration(&env.shared.calibrations),
                misc,
                calibrations: &env.shared.calibrations,
            };
            let stats = AeStats {
                fullhist: &self.fullhist,
                fullhist_sum: self.fullhist_sum,
                zone_hist: &self.zone_hist,
            };
            self.algorithm.process(&stats, &input)
        };

        if !self.manual_exposure {
            self.exposure_log2 = output.exposure_log2;
        }
        if !self.manual_exposure_ratio {
            self.exposure_ratio = output.exposure_ratio;
        }
        self.converged = output.converged;
        self.output_frame_id = self.stats_frame_id;

        env.notify(Set::Cmos(CmosSet::ExposureTarget {
            exposure_log2: self.exposure_log2,
            exposure_ratio: self.exposure_ratio,
            frame_id: self.stats_frame_id,
        }));

        if self.stats_frame_id != 0 {
            env.notify(Set::Monitor(MonitorSet::Report {
                algorithm: MonitorAlgorithm::Ae,
                stage: MonitorStage::OutputReady,
                frame_id: self.stats_frame_id,
            }));
        }
        isp_debug!(
            "ae target {} ratio {} converged {}",
            self.exposure_log2,
            self.exposure_ratio,
            self.converged
        );
        env.raise(Event::UpdateIridix);
    }

    fn apply_roi(&self, env: &mut Env<'_>) {
        let vflip = env
            .get_bool(Get::DmaWriter(DmaWriterGet::Vflip))
            .unwrap_or(false);
        env.shared.regs.ae_zone_weights = self.roi.flipped(vflip).zone_weights();
    }

    fn state(&self) -> AeState {
        if self.manual_exposure {
            AeState::Inactive
        } else if self.converged {
            AeState::Converged
        } else {
            AeState::Searching
        }
    }
}

impl Default for AeMachine {
    fn default() -> Self {
        Self::new(AeAlgorithm::default())
    }
}

impl StateMachine for AeMachine {
    fn id(&self) -> MachineId {
        MachineId::Ae
    }

    fn init(&mut self, env: &mut Env<'_>) {
        *self = Self::new(self.algorithm);
        self.apply_roi(env);
    }

    fn irq_mask(&mut self) -> Option<&mut IrqMask> {
        Some(&mut self.mask)
    }

    fn process_interrupt(&mut self, irq: Irq, env: &mut Env<'_>) {
        if irq == Irq::AeStats {
            self.read_stats(env);
            env.raise(Event::AeStatsReady);
        }
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            Event::AeStatsReady => {
                self.process_stats(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::Ae(request) = request else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            AeGet::State => ParamValue::U32(self.state().to_raw()),
            AeGet::Roi => ParamValue::U32(self.roi.to_raw()),
            AeGet::Compensation => ParamValue::U32(self.compensation),
            AeGet::Manual(AeManual::Exposure) => ParamValue::Bool(self.manual_exposure),
            AeGet::Manual(AeManual::ExposureRatio) => ParamValue::Bool(self.manual_exposure_ratio),
            AeGet::Exposure => ParamValue::U32(exp2_fixed(self.exposure_log2, LOG2_GAIN_SHIFT, 6)),
            AeGet::ExposureRatio => ParamValue::U32(self.exposure_ratio),
            AeGet::ExposureLog2 => ParamValue::I32(self.exposure_log2),
            AeGet::FrameId => ParamValue::U32(self.output_frame_id),
        };
        Ok(value)
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::Ae(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            AeSet::Roi(raw) => {
                let roi = Roi::from_raw(raw);
                if !roi.is_strictly_ordered() {
                    return Err(ParamError::BadArgument);
                }
                self.roi = roi;
                self.apply_roi(env);
            }
            AeSet::Compensation(value) => {
                self.compensation = value.min(0xFF);
            }
            AeSet::Manual(AeManual::Exposure, on) => self.manual_exposure = on,
            AeSet::Manual(AeManual::ExposureRatio, on) => self.manual_exposure_ratio = on,
            AeSet::Exposure(value) => {
                self.exposure_log2 = log2_fixed_to_fixed(value, 6, LOG2_GAIN_SHIFT).max(0);
                if self.manual_exposure {
                    env.notify(Set::Cmos(CmosSet::ExposureTarget {
                        exposure_log2: self.exposure_log2,
                        exposure_ratio: self.exposure_ratio,
                        frame_id: self.output_frame_id,
                    }));
                }
            }
            AeSet::ExposureRatio(value) => {
                self.exposure_ratio = value.max(1);
            }
            AeSet::RefreshRoi => self.apply_roi(env),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(calibrations: &CalibrationSet, exposure_log2: i32) -> AeInput<'_> {
        AeInput {
            control: AeControl::from_calibration(calibrations),
            misc: AeMiscInfo {
                sensor_exp_number: 1,
                max_exposure_log2: 20 << LOG2_GAIN_SHIFT,
                iridix_contrast: 256,
                exposure_log2,
                exposure_ratio: 1,
                compensation: AE_COMPENSATION_NEUTRAL,
                ..AeMiscInfo::default()
            },
            calibrations,
        }
    }

    fn flat_histogram(bin: usize) -> [u32; HISTOGRAM_BINS] {
        let mut hist = [0; HISTOGRAM_BINS];
        hist[bin] = 1000;
        hist
    }

    #[test]
    fn bright_scene_lowers_exposure() {
        let calibrations = CalibrationSet::new();
        let hist = flat_histogram(900);
        let stats = AeStats {
            fullhist: &hist,
            fullhist_sum: 1000,
            zone_hist: &[],
        };
        let start = 10 << LOG2_GAIN_SHIFT;
        let output = BalancedAe::default().process(&stats, &input(&calibrations, start));
        assert!(output.exposure_log2 < start);
        assert!(!output.converged);
    }

    #[test]
    fn dark_scene_raises_exposure_up_to_the_limit() {
        let calibrations = CalibrationSet::new();
        let hist = flat_histogram(10);
        let stats = AeStats {
            fullhist: &hist,
            fullhist_sum: 1000,
            zone_hist: &[],
        };
        let start = 19 << LOG2_GAIN_SHIFT;
        let mut core = BalancedAe::default();
        let mut exposure = start;
        for _ in 0..20 {
            exposure = core.process(&stats, &input(&calibrations, exposure)).exposure_log2;
        }
        assert_eq!(exposure, 20 << LOG2_GAIN_SHIFT);
    }

    #[test]
    fn on_target_scene_converges() {
        let calibrations = CalibrationSet::new();
        let control = AeControl::from_calibration(&calibrations);
        let hist = flat_histogram(control.target_point as usize);
        let stats = AeStats {
            fullhist: &hist,
            fullhist_sum: 1000,
            zone_hist: &[],
        };
        let start = 8 << LOG2_GAIN_SHIFT;
        let output = BalancedAe::default().process(&stats, &input(&calibrations, start));
        assert!(output.converged);
        assert_eq!(output.exposure_log2, start);
    }

    #[test]
    fn empty_statistics_keep_the_exposure() {
        let calibrations = CalibrationSet::new();
        let hist = [0; HISTOGRAM_BINS];
        let stats = AeStats {
            fullhist: &hist,
            fullhist_sum: 0,
            zone_hist: &[],
        };
        let output = BalancedAe::default().process(&stats, &input(&calibrations, 1234));
        assert_eq!(output.exposure_log2, 1234);
    }

    #[test]
    fn compensation_scales_the_target() {
        let calibrations = CalibrationSet::new();
        let mut brighter = input(&calibrations, 0);
        brighter.misc.compensation = 256;
        assert_eq!(
            BalancedAe::target(&brighter),
            2 * BalancedAe::target(&input(&calibrations, 0))
        );
    }
}
