//! Auto white balance.
//!
//! The AWB statistics interrupt snapshots the zone ratios; `AwbStatsReady`
//! then runs a gray-world estimate, maps it onto the calibrated colour
//! temperature curve and publishes white balance gains. The detected light
//! source only switches after it has been stable for a number of frames, and
//! the colour matrix follows it.

use heapless::Vec;

use crate::calibration::{CalibrationId, CalibrationSet};
use crate::event::Event;
use crate::irq::{Irq, IrqMask};
use crate::math::{ModulationEntry, calc_modulation_u16};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::regs::WbGains;
use crate::stats::{AwbZone, ZONES};

use super::monitor::{MonitorAlgorithm, MonitorSet, MonitorStage};
use super::{StateMachine, total_gain_8_8};

/// Frames a new light source must persist before it is adopted.
pub const LIGHT_SOURCE_DETECT_FRAMES: u8 = 15;
/// Frames the colour matrix takes to blend into a new light source.
pub const LIGHT_SOURCE_CHANGE_FRAMES: u32 = 35;

const TEMPERATURE_A: u16 = 2850;
const TEMPERATURE_D40: u16 = 4000;
const TEMPERATURE_D50: u16 = 5000;

/// Largest ratio change, in 4.8, still considered converged.
const CONVERGENCE_STEP: u16 = 4;
const CURVE_POINTS: usize = 16;
const UNITY_4_8: u16 = 0x100;
const GAIN_MAX_4_8: u16 = 0xFFF;

/// Temperature, R/G and B/G knots used when calibration carries no curve.
const DEFAULT_CURVE: [(u16, u16, u16); 4] = [
    (2850, 0x1A0, 0x090),
    (4000, 0x140, 0x0C0),
    (5000, 0x110, 0x0E0),
    (6500, 0x0E0, 0x110),
];

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum AwbMode {
    #[default]
    Auto,
    Manual,
    DayLight,
    Cloudy,
    Incandescent,
    Fluorescent,
    Twilight,
    Shade,
    WarmFluorescent,
}

impl AwbMode {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(AwbMode::Auto),
            1 => Some(AwbMode::Manual),
            2 => Some(AwbMode::DayLight),
            3 => Some(AwbMode::Cloudy),
            4 => Some(AwbMode::Incandescent),
            5 => Some(AwbMode::Fluorescent),
            6 => Some(AwbMode::Twilight),
            7 => Some(AwbMode::Shade),
            8 => Some(AwbMode::WarmFluorescent),
            _ => None,
        }
    }

    /// Fixed scene temperature of a preset, in kelvin.
    const fn preset_temperature(self) -> Option<u16> {
        match self {
            AwbMode::Auto | AwbMode::Manual => None,
            AwbMode::DayLight => Some(5000),
            AwbMode::Cloudy => Some(6000),
            AwbMode::Incandescent => Some(TEMPERATURE_A),
            AwbMode::Fluorescent => Some(TEMPERATURE_D40),
            AwbMode::Twilight => Some(4500),
            AwbMode::Shade => Some(7000),
            AwbMode::WarmFluorescent => Some(3000),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum AwbState {
    #[default]
    Inactive,
    Searching,
    Converged,
}

impl AwbState {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }
}

/// Illuminant classes the colour matrix carries a CCM for.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum LightSource {
    Unknown,
    A,
    D40,
    #[default]
    D50,
}

impl LightSource {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(LightSource::Unknown),
            1 => Some(LightSource::A),
            2 => Some(LightSource::D40),
            3 => Some(LightSource::D50),
            _ => None,
        }
    }

    /// Nearest class for a colour temperature in kelvin.
    #[must_use]
    pub const fn from_temperature(kelvin: u16) -> Self {
        if kelvin < (TEMPERATURE_A + TEMPERATURE_D40) / 2 {
            LightSource::A
        } else if kelvin < (TEMPERATURE_D40 + TEMPERATURE_D50) / 2 {
            LightSource::D40
        } else {
            LightSource::D50
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WbChannel {
    R,
    Gr,
    Gb,
    B,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AwbGet {
    Mode,
    State,
    /// Detected temperature in kelvin / 100.
    Temperature,
    LightSource,
    LightSourceChangeFrames,
    Manual,
    /// Applied gain, 4.8.
    Gain(WbChannel),
    /// Frame id of the statistics behind the last gains.
    FrameId,
    /// Spread of the zone R/G ratios, max over min in 8.8.
    MixLightContrast,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AwbSet {
    Mode(AwbMode),
    Manual(bool),
    /// Manual gain, 4.8.
    Gain(WbChannel, u32),
    /// Temperature in kelvin / 100; only accepted in manual mode.
    Temperature(u32),
}

/// Temperature curve as two interpolation tables sharing the temperature axis.
struct TemperatureCurve {
    rg_to_temp: Vec<ModulationEntry, CURVE_POINTS>,
    temp_to_rg: Vec<ModulationEntry, CURVE_POINTS>,
    temp_to_bg: Vec<ModulationEntry, CURVE_POINTS>,
}

impl TemperatureCurve {
    fn from_calibration(calibrations: &CalibrationSet) -> Self {
        let mut knots: Vec<(u16, u16, u16), CURVE_POINTS> = calibrations
            .cells(CalibrationId::COLOR_TEMP)
            .zip(calibrations.cells(CalibrationId::CT_RG_POS_CALC))
            .zip(calibrations.cells(CalibrationId::CT_BG_POS_CALC))
            .take(CURVE_POINTS)
            .map(|((temp, rg), bg)| {
                let narrow = |value: u32| u16::try_from(value).unwrap_or(u16::MAX);
                (narrow(temp), narrow(rg), narrow(bg))
            })
            .collect();
        if knots.len() < 2 {
            knots.clear();
            knots.extend_from_slice(&DEFAULT_CURVE).ok();
        }

        let mut curve = Self {
            rg_to_temp: knots.iter().map(|(t, rg, _)| ModulationEntry::new(*rg, *t)).collect(),
            temp_to_rg: knots.iter().map(|(t, rg, _)| ModulationEntry::new(*t, *rg)).collect(),
            temp_to_bg: knots.iter().map(|(t, _, bg)| ModulationEntry::new(*t, *bg)).collect(),
        };
        curve.rg_to_temp.sort_unstable_by_key(|entry| entry.x);
        curve.temp_to_rg.sort_unstable_by_key(|entry| entry.x);
        curve.temp_to_bg.sort_unstable_by_key(|entry| entry.x);
        curve
    }

    fn temperature(&self, rg: u16) -> u16 {
        calc_modulation_u16(rg, self.rg_to_temp.iter().copied())
    }

    fn ratios(&self, kelvin: u16) -> (u16, u16) {
        (
            calc_modulation_u16(kelvin, self.temp_to_rg.iter().copied()),
            calc_modulation_u16(kelvin, self.temp_to_bg.iter().copied()),
        )
    }
}

/// Count-weighted mean of the zone ratios, `None` when no zone qualified.
fn gray_world(zones: &[AwbZone]) -> Option<(u16, u16)> {
    let (mut rg, mut bg, mut total) = (0_u64, 0_u64, 0_u64);
    for zone in zones.iter().filter(|zone| zone.count > 0 && zone.rg > 0 && zone.bg > 0) {
        let weight = u64::from(zone.count);
        rg += u64::from(zone.rg) * weight;
        bg += u64::from(zone.bg) * weight;
        total += weight;
    }
    if total == 0 {
        return None;
    }
    Some((
        u16::try_from(rg / total).unwrap_or(u16::MAX),
        u16::try_from(bg / total).unwrap_or(u16::MAX),
    ))
}

/// Ratio between the warmest and coolest qualifying zone, 8.8. A single
/// illuminant keeps it close to unity.
fn mix_light_contrast(zones: &[AwbZone]) -> u32 {
    let mut ratios = zones
        .iter()
        .filter(|zone| zone.count > 0 && zone.rg > 0)
        .map(|zone| u32::from(zone.rg));
    let Some(first) = ratios.next() else {
        return 0;
    };
    let (low, high) = ratios.fold((first, first), |(low, high), rg| (low.min(rg), high.max(rg)));
    (high << 8) / low
}

/// Gain that brings a channel ratio back to unity, 4.8.
fn inverse_gain(ratio: u16) -> u16 {
    if ratio == 0 {
        return GAIN_MAX_4_8;
    }
    let gain = (u32::from(UNITY_4_8) << 8) / u32::from(ratio);
    u16::try_from(gain.min(u32::from(GAIN_MAX_4_8))).unwrap_or(GAIN_MAX_4_8)
}

pub struct AwbMachine {
    mask: IrqMask,
    mode: AwbMode,
    manual: bool,
    manual_gains: WbGains,
    gains: WbGains,
    rg_coef: u16,
    bg_coef: u16,
    temperature: u16,
    light_source: LightSource,
    candidate: LightSource,
    candidate_frames: u8,
    converged: bool,
    stats_frame_id: u32,
    output_frame_id: u32,
    applied_pending: Option<u32>,
    mix_light_contrast: u32,
    zones: [AwbZone; ZONES],
}

impl AwbMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mask: IrqMask::repeating(Irq::AwbStats.mask() | Irq::FrameStart.mask()),
            mode: AwbMode::Auto,
            manual: false,
            manual_gains: WbGains::UNITY,
            gains: WbGains::UNITY,
            rg_coef: UNITY_4_8,
            bg_coef: UNITY_4_8,
            temperature: TEMPERATURE_D50,
            light_source: LightSource::D50,
            candidate: LightSource::D50,
            candidate_frames: 0,
            converged: false,
            stats_frame_id: 0,
            output_frame_id: 0,
            applied_pending: None,
            mix_light_contrast: 0,
            zones: [AwbZone {
                rg: 0,
                bg: 0,
                count: 0,
            }; ZONES],
        }
    }

    fn read_stats(&mut self, env: &mut Env<'_>) {
        self.zones = env.shared.stats.awb_zones;
        self.stats_frame_id = env.shared.stats.frame_id;
        env.notify(Set::Monitor(MonitorSet::Report {
            algorithm: MonitorAlgorithm::Awb,
            stage: MonitorStage::InputReady,
            frame_id: self.stats_frame_id,
        }));
    }

    /// Adopts `candidate` once it has been seen for enough consecutive frames.
    fn track_light_source(&mut self, candidate: LightSource, immediate: bool) {
        if immediate || candidate == self.light_source {
            self.light_source = candidate;
            self.candidate = candidate;
            self.candidate_frames = 0;
            return;
        }
        if candidate == self.candidate {
            self.candidate_frames = self.candidate_frames.saturating_add(1);
        } else {
            self.candidate = candidate;
            self.candidate_frames = 1;
        }
        if self.candidate_frames >= LIGHT_SOURCE_DETECT_FRAMES {
            isp_info!("awb light source {} -> {}", self.light_source.to_raw(), candidate.to_raw());
            self.light_source = candidate;
            self.candidate_frames = 0;
        }
    }

    fn process_stats(&mut self, env: &mut Env<'_>) {
        let curve = TemperatureCurve::from_calibration(&env.shared.calibrations);
        self.mix_light_contrast = mix_light_contrast(&self.zones);

        if self.manual || self.mode == AwbMode::Manual {
            self.gains = self.manual_gains;
            self.converged = true;
        } else if let Some(kelvin) = self.mode.preset_temperature() {
            let (rg, bg) = curve.ratios(kelvin);
            self.rg_coef = rg;
            self.bg_coef = bg;
            self.temperature = kelvin;
            self.track_light_source(LightSource::from_temperature(kelvin), true);
            self.converged = true;
            self.gains = Self::gains_for(rg, bg, env);
        } else if let Some((rg, bg)) = gray_world(&self.zones) {
            let coef = env
                .shared
                .calibrations
                .cell_or(CalibrationId::AWB_AVG_COEF, 0, 4)
                .max(1);
            let smooth = |previous: u16, sample: u16| {
                let value = (u32::from(previous) * (coef - 1) + u32::from(sample)) / coef;
                u16::try_from(value).unwrap_or(u16::MAX)
            };
            let (rg_next, bg_next) = (smooth(self.rg_coef, rg), smooth(self.bg_coef, bg));
            self.converged = self.rg_coef.abs_diff(rg_next) < CONVERGENCE_STEP
                && self.bg_coef.abs_diff(bg_next) < CONVERGENCE_STEP;
            self.rg_coef = rg_next;
            self.bg_coef = bg_next;
            self.temperature = curve.temperature(rg_next);
            self.track_light_source(LightSource::from_temperature(self.temperature), false);
            self.gains = Self::gains_for(rg_next, bg_next, env);
        } else {
            isp_debug!("awb: no qualifying zones in frame {}", self.stats_frame_id);
            return;
        }

        env.shared.regs.wb_gains = self.gains;
        self.output_frame_id = self.stats_frame_id;
        if self.stats_frame_id != 0 {
            env.notify(Set::Monitor(MonitorSet::Report {
                algorithm: MonitorAlgorithm::Awb,
                stage: MonitorStage::OutputReady,
                frame_id: self.stats_frame_id,
            }));
            self.applied_pending = Some(self.stats_frame_id);
        }
        isp_trace!(
            "awb gains r {} b {} temperature {}",
            self.gains.r,
            self.gains.b,
            self.temperature
        );
    }

    fn gains_for(rg: u16, bg: u16, env: &mut Env<'_>) -> WbGains {
        let mut blue = inverse_gain(bg);
        if env.shared.calibrations.contains(CalibrationId::AWB_BG_MAX_GAIN) {
            let gain = total_gain_8_8(env);
            let limit = calc_modulation_u16(
                gain,
                env.shared.calibrations.modulation(CalibrationId::AWB_BG_MAX_GAIN),
            );
            if limit != 0 {
                blue = blue.min(limit);
            }
        }
        WbGains {
            r: inverse_gain(rg),
            gr: UNITY_4_8,
            gb: UNITY_4_8,
            b: blue,
        }
    }

    fn state(&self) -> AwbState {
        if self.manual || self.mode == AwbMode::Manual {
            AwbState::Inactive
        } else if self.converged {
            AwbState::Converged
        } else {
            AwbState::Searching
        }
    }
}

impl Default for AwbMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for AwbMachine {
    fn id(&self) -> MachineId {
        MachineId::Awb
    }

    fn init(&mut self, env: &mut Env<'_>) {
        *self = Self::new();
        let curve = TemperatureCurve::from_calibration(&env.shared.calibrations);
        let (rg, bg) = curve.ratios(TEMPERATURE_D50);
        self.rg_coef = rg;
        self.bg_coef = bg;
        self.gains = Self::gains_for(rg, bg, env);
        env.shared.regs.wb_gains = self.gains;
    }

    fn irq_mask(&mut self) -> Option<&mut IrqMask> {
        Some(&mut self.mask)
    }

    fn process_interrupt(&mut self, irq: Irq, env: &mut Env<'_>) {
        match irq {
            Irq::AwbStats => {
                self.read_stats(env);
                env.raise(Event::AwbStatsReady);
            }
            Irq::FrameStart => {
                if let Some(frame_id) = self.applied_pending.take() {
                    env.notify(Set::Monitor(MonitorSet::Report {
                        algorithm: MonitorAlgorithm::Awb,
                        stage: MonitorStage::Applied,
                        frame_id,
                    }));
                }
            }
            _ => {}
        }
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            Event::AwbStatsReady => {
                self.process_stats(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::Awb(request) = request else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            AwbGet::Mode => self.mode.to_raw(),
            AwbGet::State => self.state().to_raw(),
            AwbGet::Temperature => u32::from(self.temperature) / 100,
            AwbGet::LightSource => self.light_source.to_raw(),
            AwbGet::LightSourceChangeFrames => LIGHT_SOURCE_CHANGE_FRAMES,
            AwbGet::Manual => return Ok(ParamValue::Bool(self.manual)),
            AwbGet::Gain(channel) => u32::from(match channel {
                WbChannel::R => self.gains.r,
                WbChannel::Gr => self.gains.gr,
                WbChannel::Gb => self.gains.gb,
                WbChannel::B => self.gains.b,
            }),
            AwbGet::FrameId => self.output_frame_id,
            AwbGet::MixLightContrast => self.mix_light_contrast,
        };
        Ok(ParamValue::U32(value))
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::Awb(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            AwbSet::Mode(mode) => self.mode = mode,
            AwbSet::Manual(on) => self.manual = on,
            AwbSet::Gain(channel, value) => {
                let value = u16::try_from(value.min(u32::from(GAIN_MAX_4_8))).unwrap_or(GAIN_MAX_4_8);
                let slot = match channel {
                    WbChannel::R => &mut self.manual_gains.r,
                    WbChannel::Gr => &mut self.manual_gains.gr,
                    WbChannel::Gb => &mut self.manual_gains.gb,
                    WbChannel::B => &mut self.manual_gains.b,
                };
                *slot = value;
                if self.manual {
                    self.gains = self.manual_gains;
                    env.shared.regs.wb_gains = self.gains;
                }
            }
            AwbSet::Temperature(hundreds) => {
                if !self.manual {
                    return Err(ParamError::NotPermitted);
                }
                let kelvin = u16::try_from(hundreds.saturating_mul(100)).unwrap_or(u16::MAX);
                self.temperature = kelvin;
                self.track_light_source(LightSource::from_temperature(kelvin), true);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_world_weights_by_count() {
        let zones = [
            AwbZone { rg: 0x100, bg: 0x100, count: 3 },
            AwbZone { rg: 0x200, bg: 0x080, count: 1 },
            AwbZone { rg: 0x400, bg: 0x400, count: 0 },
        ];
        assert_eq!(gray_world(&zones), Some((0x140, 0x0E0)));
        assert_eq!(gray_world(&zones[2..]), None);
    }

    #[test]
    fn mixed_light_spreads_the_ratios() {
        let zones = [
            AwbZone { rg: 0x100, bg: 0x100, count: 4 },
            AwbZone { rg: 0x200, bg: 0x100, count: 4 },
            AwbZone { rg: 0x400, bg: 0x100, count: 0 },
        ];
        assert_eq!(mix_light_contrast(&zones), 0x200);
        assert_eq!(mix_light_contrast(&zones[..1]), 0x100);
        assert_eq!(mix_light_contrast(&[]), 0);
    }

    #[test]
    fn inverse_gain_restores_unity() {
        assert_eq!(inverse_gain(0x100), 0x100);
        assert_eq!(inverse_gain(0x080), 0x200);
        assert_eq!(inverse_gain(0), GAIN_MAX_4_8);
        assert_eq!(inverse_gain(1), GAIN_MAX_4_8);
    }

    #[test]
    fn temperature_classes() {
        assert_eq!(LightSource::from_temperature(2800), LightSource::A);
        assert_eq!(LightSource::from_temperature(4000), LightSource::D40);
        assert_eq!(LightSource::from_temperature(6500), LightSource::D50);
    }

    #[test]
    fn default_curve_is_monotonic_in_both_directions() {
        let curve = TemperatureCurve::from_calibration(&CalibrationSet::new());
        assert_eq!(curve.temperature(0x1A0), 2850);
        assert_eq!(curve.temperature(0x0E0), 6500);
        assert!(curve.temperature(0x120) > curve.temperature(0x150));
        let (rg, bg) = curve.ratios(5000);
        assert_eq!((rg, bg), (0x110, 0x0E0));
    }

    #[test]
    fn light_source_needs_a_stable_run_to_switch() {
        let mut machine = AwbMachine::new();
        for _ in 0..LIGHT_SOURCE_DETECT_FRAMES - 1 {
            machine.track_light_source(LightSource::A, false);
        }
        assert_eq!(machine.light_source, LightSource::D50);
        machine.track_light_source(LightSource::D40, false);
        assert_eq!(machine.candidate_frames, 1);
        for _ in 0..LIGHT_SOURCE_DETECT_FRAMES {
            machine.track_light_source(LightSource::A, false);
        }
        assert_eq!(machine.light_source, LightSource::A);
    }
}
