//! Exposure and gain control.
//!
//! The CMOS machine is the only writer of sensor integration time and gains.
//! AE publishes a target exposure (log2 of lines times gain); at frame end the
//! target is split into integration time, analog gain, sensor digital gain and
//! ISP digital gain, in that order, honouring each manual override. The split
//! is staged in the sensor driver and committed at the next frame start, and
//! the ISP digital gain follows once the sensor's apply delay has elapsed.

use heapless::{Deque, HistoryBuf};

use crate::calibration::{CalibrationId, CalibrationSet};
use crate::event::Event;
use crate::irq::{Irq, IrqMask};
use crate::math::{LOG2_GAIN_SHIFT, exp2_fixed, log2_fixed_to_fixed, log2_int_to_fixed, sqrt32};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::sensor::{SensorGet, SensorInfo, SensorSet};

use super::monitor::{MonitorAlgorithm, MonitorErrorReport, MonitorSet, MonitorStage};
use super::StateMachine;

/// Cells in the `CMOS_CONTROL` calibration table.
pub const CMOS_FIELD_COUNT: usize = 18;

/// Exposures remembered for [`CmosGet::History`].
pub const EXPOSURE_HISTORY_DEPTH: usize = 8;

/// Ceiling of the ISP digital gain field (16x).
pub const ISP_DGAIN_FIELD_MAX: u32 = 4 << GAIN_FIELD_FRAC;

/// Gain fields hold log2 values with five fractional bits.
const GAIN_FIELD_FRAC: u32 = 5;
const GAIN_FIELD_SHIFT: u32 = LOG2_GAIN_SHIFT - GAIN_FIELD_FRAC;

const PENDING_GAINS: usize = 4;

/// Entries of the exposure control block, in calibration order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CmosField {
    AntiflickerEnable,
    AntiFlickerFrequency,
    ManualIntegrationTime,
    ManualSensorAnalogGain,
    ManualSensorDigitalGain,
    ManualIspDigitalGain,
    ManualMaxIntegrationTime,
    MaxIntegrationTime,
    MaxSensorAnalogGain,
    MaxSensorDigitalGain,
    MaxIspDigitalGain,
    MaxExposureRatio,
    IntegrationTime,
    SensorAnalogGain,
    SensorDigitalGain,
    IspDigitalGain,
    AnalogGainLastPriority,
    AnalogGainReserve,
}

impl CmosField {
    pub const ALL: [CmosField; CMOS_FIELD_COUNT] = [
        CmosField::AntiflickerEnable,
        CmosField::AntiFlickerFrequency,
        CmosField::ManualIntegrationTime,
        CmosField::ManualSensorAnalogGain,
        CmosField::ManualSensorDigitalGain,
        CmosField::ManualIspDigitalGain,
        CmosField::ManualMaxIntegrationTime,
        CmosField::MaxIntegrationTime,
        CmosField::MaxSensorAnalogGain,
        CmosField::MaxSensorDigitalGain,
        CmosField::MaxIspDigitalGain,
        CmosField::MaxExposureRatio,
        CmosField::IntegrationTime,
        CmosField::SensorAnalogGain,
        CmosField::SensorDigitalGain,
        CmosField::IspDigitalGain,
        CmosField::AnalogGainLastPriority,
        CmosField::AnalogGainReserve,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            CmosField::AntiflickerEnable => "antiflicker-enable",
            CmosField::AntiFlickerFrequency => "antiflicker-frequency",
            CmosField::ManualIntegrationTime => "manual-integration-time",
            CmosField::ManualSensorAnalogGain => "manual-sensor-analog-gain",
            CmosField::ManualSensorDigitalGain => "manual-sensor-digital-gain",
            CmosField::ManualIspDigitalGain => "manual-isp-digital-gain",
            CmosField::ManualMaxIntegrationTime => "manual-max-integration-time",
            CmosField::MaxIntegrationTime => "max-integration-time",
            CmosField::MaxSensorAnalogGain => "max-sensor-analog-gain",
            CmosField::MaxSensorDigitalGain => "max-sensor-digital-gain",
            CmosField::MaxIspDigitalGain => "max-isp-digital-gain",
            CmosField::MaxExposureRatio => "max-exposure-ratio",
            CmosField::IntegrationTime => "integration-time",
            CmosField::SensorAnalogGain => "sensor-analog-gain",
            CmosField::SensorDigitalGain => "sensor-digital-gain",
            CmosField::IspDigitalGain => "isp-digital-gain",
            CmosField::AnalogGainLastPriority => "analog-gain-last-priority",
            CmosField::AnalogGainReserve => "analog-gain-reserve",
        }
    }
}

/// Fields the ISO gain override takes over and gives back.
const ISO_FIELDS: [CmosField; 6] = [
    CmosField::ManualSensorAnalogGain,
    CmosField::ManualSensorDigitalGain,
    CmosField::ManualIspDigitalGain,
    CmosField::SensorAnalogGain,
    CmosField::SensorDigitalGain,
    CmosField::IspDigitalGain,
];

/// Exposure control block. Gains are log2 with five fractional bits,
/// integration times are in lines.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CmosControl {
    values: [u32; CMOS_FIELD_COUNT],
}

impl CmosControl {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: [0; CMOS_FIELD_COUNT],
        }
    }

    /// Loads the block from `CMOS_CONTROL`; missing cells read as zero.
    #[must_use]
    pub fn from_calibration(calibrations: &CalibrationSet) -> Self {
        let mut control = Self::new();
        for field in CmosField::ALL {
            control.values[field.index()] =
                calibrations.cell_or(CalibrationId::CMOS_CONTROL, field.index(), 0);
        }
        control
    }

    #[must_use]
    pub const fn get(&self, field: CmosField) -> u32 {
        self.values[field.index()]
    }

    pub fn set(&mut self, field: CmosField, value: u32) {
        self.values[field.index()] = value;
    }

    #[must_use]
    pub const fn is_set(&self, field: CmosField) -> bool {
        self.values[field.index()] != 0
    }
}

/// One exposure as split across the sensor and the ISP.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ExposureSet {
    /// Frame whose statistics produced the target.
    pub frame_id: u32,
    pub exposure_log2: i32,
    pub exposure_ratio: u32,
    /// Short channel, or the only channel of a linear sensor.
    pub integration_time: u32,
    pub integration_time_medium: u32,
    pub integration_time_long: u32,
    pub again_log2: i32,
    pub dgain_log2: i32,
    pub isp_dgain_log2: i32,
}

impl ExposureSet {
    #[must_use]
    pub const fn total_gain_log2(&self) -> i32 {
        self.again_log2 + self.dgain_log2 + self.isp_dgain_log2
    }
}

/// Which exposure controls AE may move.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum AeMode {
    #[default]
    Auto,
    FullManual,
    ManualGain,
    ManualExposureTime,
}

impl AeMode {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            AeMode::Auto => 0,
            AeMode::FullManual => 1,
            AeMode::ManualGain => 2,
            AeMode::ManualExposureTime => 3,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(AeMode::Auto),
            1 => Some(AeMode::FullManual),
            2 => Some(AeMode::ManualGain),
            3 => Some(AeMode::ManualExposureTime),
            _ => None,
        }
    }

    /// `(manual integration time, manual gain)`.
    #[must_use]
    pub const fn flags(self) -> (bool, bool) {
        match self {
            AeMode::Auto => (false, false),
            AeMode::FullManual => (true, true),
            AeMode::ManualGain => (false, true),
            AeMode::ManualExposureTime => (true, false),
        }
    }

    #[must_use]
    pub const fn from_flags(manual_time: bool, manual_gain: bool) -> Self {
        match (manual_time, manual_gain) {
            (false, false) => AeMode::Auto,
            (true, true) => AeMode::FullManual,
            (false, true) => AeMode::ManualGain,
            (true, false) => AeMode::ManualExposureTime,
        }
    }
}

/// How the exposure is shared between integration time and gain.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ExposureStrategy {
    #[default]
    Balanced,
    /// Lets integration time grow up to the frame-rate-reducing limit.
    IntegrationPriority,
}

impl ExposureStrategy {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            ExposureStrategy::Balanced => 0,
            ExposureStrategy::IntegrationPriority => 1,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ExposureStrategy::Balanced),
            1 => Some(ExposureStrategy::IntegrationPriority),
            _ => None,
        }
    }
}

/// Linear gains, 8.8, that make up ISO 100 on this sensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IsoBaseGains {
    pub again: u32,
    pub dgain: u32,
    pub isp_dgain: u32,
}

impl Default for IsoBaseGains {
    fn default() -> Self {
        Self {
            again: 0x100,
            dgain: 0x100,
            isp_dgain: 0x100,
        }
    }
}

/// Reads served by the CMOS machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CmosGet {
    Control(CmosField),
    Controls,
    /// Exposure written by the last frame end.
    Exposure,
    /// `n` frame ends back, `0` being the latest.
    History(u8),
    TotalGainLog2,
    /// Total gain, linear 24.8.
    TotalGain,
    ExposureLog2,
    ExposureRatio,
    MaxExposureLog2,
    /// Integration time in microseconds.
    ExposureTime,
    ExposurePriority,
    IsoGain,
    AeMode,
    /// Manual total gain, linear 8.8.
    ManualGain,
    Strategy,
}

/// Writes served by the CMOS machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CmosSet {
    Control(CmosField, u32),
    ExposureTarget {
        exposure_log2: i32,
        exposure_ratio: u32,
        frame_id: u32,
    },
    AeMode(AeMode),
    ManualGain(u32),
    ExposureTime(u32),
    ExposurePriority(u32),
    IsoGain(u32),
    Strategy(ExposureStrategy),
    /// Re-reads the control block from calibration.
    Reload,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct Target {
    exposure_log2: i32,
    exposure_ratio: u32,
    frame_id: u32,
}

/// ISP digital gain waiting for the sensor to catch up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct PendingGain {
    apply_at: u32,
    isp_dgain_log2: i32,
    ae_frame_id: u32,
}

pub struct CmosMachine {
    mask: IrqMask,
    control: CmosControl,
    target: Target,
    current: ExposureSet,
    history: HistoryBuf<ExposureSet, EXPOSURE_HISTORY_DEPTH>,
    manual_gain_mode: bool,
    manual_gain: u32,
    strategy: ExposureStrategy,
    saved_max_integration_time: Option<u32>,
    iso_gain: u32,
    iso_saved: Option<CmosControl>,
    staged: bool,
    /// The staged writes were produced inside the blanking window.
    staged_in_vblank: bool,
    pending: Deque<PendingGain, PENDING_GAINS>,
    last_frame_start: Option<u32>,
}

impl CmosMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mask: IrqMask::repeating(Irq::FrameStart.mask()),
            control: CmosControl::new(),
            target: Target {
                exposure_log2: 0,
                exposure_ratio: 1,
                frame_id: 0,
            },
            current: ExposureSet {
                frame_id: 0,
                exposure_log2: 0,
                exposure_ratio: 1,
                integration_time: 0,
                integration_time_medium: 0,
                integration_time_long: 0,
                again_log2: 0,
                dgain_log2: 0,
                isp_dgain_log2: 0,
            },
            history: HistoryBuf::new(),
            manual_gain_mode: false,
            manual_gain: 0x100,
            strategy: ExposureStrategy::Balanced,
            saved_max_integration_time: None,
            iso_gain: 0,
            iso_saved: None,
            staged: false,
            staged_in_vblank: false,
            pending: Deque::new(),
            last_frame_start: None,
        }
    }

    /// Control block as currently applied.
    #[must_use]
    pub const fn control(&self) -> &CmosControl {
        &self.control
    }

    fn reload(&mut self, env: &mut Env<'_>) {
        self.control = CmosControl::from_calibration(&env.shared.calibrations);
        self.iso_gain = 0;
        self.iso_saved = None;
        self.saved_max_integration_time = None;
        self.strategy = ExposureStrategy::Balanced;
        let info = env.sensor_info();
        self.apply_sensor_limits(&info, true);
        isp_debug!("cmos control reloaded from calibration");
    }

    /// Brings the control block inside what the sensor supports. The first
    /// call after a reload also drops the integration-time ceiling to the
    /// full-frame-rate maximum.
    fn apply_sensor_limits(&mut self, info: &SensorInfo, initial: bool) {
        let time_ceiling = if initial {
            info.integration_time_max
        } else {
            info.integration_time_limit
        };
        let max_time = self.control.get(CmosField::MaxIntegrationTime);
        if max_time == 0 || max_time > time_ceiling {
            self.control.set(CmosField::MaxIntegrationTime, time_ceiling);
        }

        for field in [
            CmosField::MaxSensorAnalogGain,
            CmosField::MaxSensorDigitalGain,
            CmosField::MaxIspDigitalGain,
            CmosField::SensorAnalogGain,
            CmosField::SensorDigitalGain,
            CmosField::IspDigitalGain,
            CmosField::IntegrationTime,
        ] {
            let value = self.control.get(field);
            let clamped = self.clamp_field(field, value, info);
            self.control.set(field, clamped);
        }

        if self.control.get(CmosField::MaxExposureRatio) == 0 {
            self.control.set(CmosField::MaxExposureRatio, 1);
        }
    }

    fn clamp_field(&self, field: CmosField, value: u32, info: &SensorInfo) -> u32 {
        let clamped = match field {
            CmosField::IntegrationTime | CmosField::MaxIntegrationTime => {
                value.min(info.integration_time_limit)
            }
            CmosField::SensorAnalogGain => {
                value.min(self.control.get(CmosField::MaxSensorAnalogGain))
            }
            CmosField::MaxSensorAnalogGain => value.min(log2_to_gain_field(info.again_log2_max)),
            CmosField::SensorDigitalGain => {
                value.min(self.control.get(CmosField::MaxSensorDigitalGain))
            }
            CmosField::MaxSensorDigitalGain => value.min(log2_to_gain_field(info.dgain_log2_max)),
            CmosField::IspDigitalGain => value.min(self.control.get(CmosField::MaxIspDigitalGain)),
            CmosField::MaxIspDigitalGain => value.min(ISP_DGAIN_FIELD_MAX),
            _ => value,
        };
        if clamped != value {
            isp_debug!("cmos {} clamped {} -> {}", field.label(), value, clamped);
        }
        clamped
    }

    fn set_field(&mut self, field: CmosField, value: u32, env: &mut Env<'_>) {
        let info = env.sensor_info();
        let value = self.clamp_field(field, value, &info);
        self.control.set(field, value);
        if matches!(
            field,
            CmosField::AntiflickerEnable | CmosField::AntiFlickerFrequency
        ) {
            env.raise(Event::AntiflickerChanged);
        }
    }

    fn flicker_period(&self, info: &SensorInfo) -> Option<u32> {
        if !self.control.is_set(CmosField::AntiflickerEnable) {
            return None;
        }
        let frequency = self.control.get(CmosField::AntiFlickerFrequency);
        if frequency == 0 {
            return None;
        }
        let period = info.lines_per_second / frequency.saturating_mul(2);
        (period > 0).then_some(period)
    }

    /// Rounds down to a whole number of flicker periods when that is possible.
    fn flicker_free(&self, lines: u32, info: &SensorInfo) -> u32 {
        match self.flicker_period(info) {
            Some(period) if lines >= period => lines - lines % period,
            _ => lines,
        }
    }

    fn max_integration_time(&self, info: &SensorInfo) -> u32 {
        let max = self
            .control
            .get(CmosField::MaxIntegrationTime)
            .min(info.integration_time_limit)
            .max(info.integration_time_min);
        self.flicker_free(max, info)
    }

    fn gain_limits(&self, info: &SensorInfo) -> (i32, i32, i32) {
        let again = gain_field_log2(self.control.get(CmosField::MaxSensorAnalogGain))
            .min(info.again_log2_max)
            .max(0);
        let dgain = gain_field_log2(self.control.get(CmosField::MaxSensorDigitalGain))
            .min(info.dgain_log2_max)
            .max(0);
        let isp = gain_field_log2(self.control.get(CmosField::MaxIspDigitalGain));
        (again, dgain, isp)
    }

    /// Long/medium/short channels for a WDR sensor; a linear sensor uses one.
    fn partition(&self, long: u32, info: &SensorInfo) -> (u32, u32, u32) {
        if info.sensor_exp_number < 2 {
            return (long, long, long);
        }
        let min = info.integration_time_min.max(1);
        let max_ratio = self.control.get(CmosField::MaxExposureRatio).max(1);
        let ratio = self.target.exposure_ratio.clamp(1, max_ratio);
        let short = (long / ratio).max(min);
        let medium = if info.sensor_exp_number >= 3 {
            (long / sqrt32(ratio).max(1)).max(min)
        } else {
            short
        };
        (short, medium, long)
    }

    /// Splits the current target and stages it in the sensor driver.
    fn split_exposure(&mut self, env: &mut Env<'_>) {
        let info = env.sensor_info();
        let min_time = info.integration_time_min.max(1);
        let max_time = self.max_integration_time(&info).max(min_time);
        let exposure_log2 = self.target.exposure_log2;

        let long = if self.control.is_set(CmosField::ManualIntegrationTime) {
            self.control
                .get(CmosField::IntegrationTime)
                .clamp(min_time, max_time)
        } else {
            let lines = exp2_fixed(exposure_log2, LOG2_GAIN_SHIFT, 0).clamp(min_time, max_time);
            self.flicker_free(lines, &info)
        };

        let gain_log2 = if self.manual_gain_mode {
            log2_fixed_to_fixed(self.manual_gain, 8, LOG2_GAIN_SHIFT).max(0)
        } else {
            (exposure_log2 - log2_int_to_fixed(long, LOG2_GAIN_SHIFT)).max(0)
        };

        let (again_max, dgain_max, isp_max) = self.gain_limits(&info);
        let again = if self.control.is_set(CmosField::ManualSensorAnalogGain) {
            gain_field_log2(self.control.get(CmosField::SensorAnalogGain))
        } else {
            gain_log2.min(again_max)
        };
        let dgain = if self.control.is_set(CmosField::ManualSensorDigitalGain) {
            gain_field_log2(self.control.get(CmosField::SensorDigitalGain))
        } else {
            (gain_log2 - again).clamp(0, dgain_max)
        };

        let (short, medium, long) = self.partition(long, &info);
        let request = ExposureSet {
            frame_id: self.target.frame_id,
            exposure_log2,
            exposure_ratio: self.target.exposure_ratio,
            integration_time: short,
            integration_time_medium: medium,
            integration_time_long: long,
            again_log2: again,
            dgain_log2: dgain,
            isp_dgain_log2: 0,
        };

        let staged = env
            .set(Set::Sensor(SensorSet::StageExposure(request)))
            .and_then(|()| env.get(Get::Sensor(SensorGet::StagedExposure)))
            .and_then(ParamValue::as_exposure)
            .unwrap_or(request);

        let isp = if self.control.is_set(CmosField::ManualIspDigitalGain) {
            gain_field_log2(self.control.get(CmosField::IspDigitalGain))
        } else {
            (gain_log2 - staged.again_log2 - staged.dgain_log2).clamp(0, isp_max)
        };

        let mut applied = ExposureSet {
            isp_dgain_log2: isp,
            ..staged
        };
        applied.exposure_log2 =
            log2_int_to_fixed(applied.integration_time_long.max(1), LOG2_GAIN_SHIFT)
                + applied.total_gain_log2();

        self.publish_status(&applied);
        self.current = applied;
        self.history.write(applied);
        self.staged = true;
        self.staged_in_vblank = env.shared.in_vblank;
        isp_trace!(
            "cmos split frame {}: lines={} again={} dgain={} isp={}",
            applied.frame_id,
            applied.integration_time_long,
            applied.again_log2,
            applied.dgain_log2,
            applied.isp_dgain_log2
        );
    }

    /// Mirrors automatically chosen values into the control block so the
    /// command surface reads what is applied.
    fn publish_status(&mut self, applied: &ExposureSet) {
        let automatic = [
            (
                CmosField::ManualIntegrationTime,
                CmosField::IntegrationTime,
                applied.integration_time_long,
            ),
            (
                CmosField::ManualSensorAnalogGain,
                CmosField::SensorAnalogGain,
                log2_to_gain_field(applied.again_log2),
            ),
            (
                CmosField::ManualSensorDigitalGain,
                CmosField::SensorDigitalGain,
                log2_to_gain_field(applied.dgain_log2),
            ),
            (
                CmosField::ManualIspDigitalGain,
                CmosField::IspDigitalGain,
                log2_to_gain_field(applied.isp_dgain_log2),
            ),
        ];
        for (manual, field, value) in automatic {
            if !self.control.is_set(manual) {
                self.control.set(field, value);
            }
        }
    }

    fn frame_start(&mut self, env: &mut Env<'_>) {
        let frame_id = env.shared.frame_id;
        if let Some(previous) = self.last_frame_start {
            if frame_id.wrapping_sub(previous) > 1 {
                isp_warn!("cmos frame start delayed: {} -> {}", previous, frame_id);
                env.notify(Set::Monitor(MonitorSet::Error(MonitorErrorReport::CmosFsDelay)));
            }
        }
        self.last_frame_start = Some(frame_id);

        if self.staged {
            if !env.shared.in_vblank || !self.staged_in_vblank {
                isp_warn!("cmos update outside vertical blank");
                env.notify(Set::Monitor(MonitorSet::Error(
                    MonitorErrorReport::CmosUpdateNotInVb,
                )));
            }
            env.notify(Set::Sensor(SensorSet::Update));
            self.staged = false;

            let delay = u32::from(env.sensor_info().integration_time_apply_delay);
            if self.pending.is_full() {
                self.pending.pop_front();
            }
            let _ = self.pending.push_back(PendingGain {
                apply_at: frame_id.wrapping_add(delay),
                isp_dgain_log2: self.current.isp_dgain_log2,
                ae_frame_id: self.current.frame_id,
            });
        }

        while let Some(next) = self.pending.front().copied() {
            let late = frame_id.wrapping_sub(next.apply_at);
            if late >= 1 << 31 {
                break;
            }
            self.pending.pop_front();
            if late > 0 {
                isp_warn!("isp digital gain applied {} frames late", late);
                env.notify(Set::Monitor(MonitorSet::Error(
                    MonitorErrorReport::CmosDgainWrongTiming { diff: late },
                )));
            }
            let linear = exp2_fixed(next.isp_dgain_log2, LOG2_GAIN_SHIFT, 8);
            env.shared.regs.isp_digital_gain = u16::try_from(linear).unwrap_or(u16::MAX);
            if next.ae_frame_id != 0 {
                env.notify(Set::Monitor(MonitorSet::Report {
                    algorithm: MonitorAlgorithm::Ae,
                    stage: MonitorStage::Applied,
                    frame_id: next.ae_frame_id,
                }));
            }
        }
    }

    fn set_exposure_time(&mut self, micros: u32, env: &mut Env<'_>) -> Result<(), ParamError> {
        if !self.control.is_set(CmosField::IntegrationTime)
            || !self.control.is_set(CmosField::ManualIntegrationTime)
        {
            return Err(ParamError::NotPermitted);
        }
        let lines_per_second = u64::from(env.sensor_info().lines_per_second);
        let lines = u64::from(micros) * lines_per_second / 1_000_000;
        let lines = u32::try_from(lines).map_err(|_| ParamError::Unsupported)?;
        self.set_field(CmosField::IntegrationTime, lines, env);
        Ok(())
    }

    fn exposure_time(&self, env: &mut Env<'_>) -> u32 {
        let lines_per_second = u64::from(env.sensor_info().lines_per_second);
        if lines_per_second == 0 {
            return 0;
        }
        let micros =
            u64::from(self.control.get(CmosField::IntegrationTime)) * 1_000_000 / lines_per_second;
        u32::try_from(micros).unwrap_or(u32::MAX)
    }

    fn set_exposure_priority(&mut self, value: u32, env: &mut Env<'_>) -> Result<(), ParamError> {
        let info = env.sensor_info();
        let max = match value {
            0 => info.integration_time_max,
            1 => info.integration_time_limit,
            _ => return Err(ParamError::Unsupported),
        };
        self.control.set(CmosField::MaxIntegrationTime, max);
        Ok(())
    }

    fn set_strategy(&mut self, strategy: ExposureStrategy, env: &mut Env<'_>) {
        match strategy {
            ExposureStrategy::Balanced => {
                if let Some(saved) = self.saved_max_integration_time.take() {
                    self.control.set(CmosField::MaxIntegrationTime, saved);
                }
            }
            ExposureStrategy::IntegrationPriority => {
                if self.saved_max_integration_time.is_none() {
                    self.saved_max_integration_time =
                        Some(self.control.get(CmosField::MaxIntegrationTime));
                }
                let limit = env.sensor_info().integration_time_limit;
                self.control.set(CmosField::MaxIntegrationTime, limit);
            }
        }
        self.strategy = strategy;
    }

    fn set_iso_gain(&mut self, value: u32, env: &mut Env<'_>) -> Result<(), ParamError> {
        if value % 100 != 0 {
            return Err(ParamError::Unsupported);
        }

        if value == 0 {
            if let Some(saved) = self.iso_saved.take() {
                for field in ISO_FIELDS {
                    self.control.set(field, saved.get(field));
                }
            }
            self.iso_gain = 0;
            return Ok(());
        }

        let base = env.shared.iso_base;
        let max_again = gain_field_linear(self.control.get(CmosField::MaxSensorAnalogGain));
        if base.again == 0 || max_again / u64::from(base.again) == 0 {
            return Err(ParamError::Failed);
        }
        let max_dgain = gain_field_linear(self.control.get(CmosField::MaxSensorDigitalGain));
        let max_isp = gain_field_linear(self.control.get(CmosField::MaxIspDigitalGain));

        if self.iso_saved.is_none() {
            self.iso_saved = Some(self.control);
        }

        let multiplier = u64::from(value / 100);
        let mut again = u64::from(base.again) * multiplier;
        let mut dgain = u64::from(base.dgain);
        let mut isp = u64::from(base.isp_dgain);
        if again > max_again {
            let spill = (again << 8) / max_again;
            again = max_again;
            dgain = (dgain * spill) >> 8;
        }
        if max_dgain > 0 && dgain > max_dgain {
            let spill = (dgain << 8) / max_dgain;
            dgain = max_dgain;
            isp = (isp * spill) >> 8;
        }
        isp = isp.min(max_isp);

        self.control
            .set(CmosField::SensorAnalogGain, linear_gain_field(again));
        self.control
            .set(CmosField::SensorDigitalGain, linear_gain_field(dgain));
        self.control
            .set(CmosField::IspDigitalGain, linear_gain_field(isp));
        for manual in &ISO_FIELDS[..3] {
            self.control.set(*manual, 1);
        }
        self.iso_gain = value;
        isp_debug!("iso {} applied", value);
        Ok(())
    }

    fn history(&self, back: u8) -> Option<ExposureSet> {
        let back = usize::from(back);
        let len = self.history.len();
        if back >= len {
            return None;
        }
        self.history.oldest_ordered().nth(len - 1 - back).copied()
    }

    fn max_exposure_log2(&self, env: &mut Env<'_>) -> i32 {
        let info = env.sensor_info();
        let (again, dgain, isp) = self.gain_limits(&info);
        log2_int_to_fixed(self.max_integration_time(&info).max(1), LOG2_GAIN_SHIFT)
            + again
            + dgain
            + isp
    }
}

impl Default for CmosMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn gain_field_log2(value: u32) -> i32 {
    i32::try_from(value.min(0xFFFF)).unwrap_or(0) << GAIN_FIELD_SHIFT
}

fn log2_to_gain_field(log2: i32) -> u32 {
    u32::try_from(log2.max(0) >> GAIN_FIELD_SHIFT).unwrap_or(0)
}

/// Gain field as a linear 8.8 value.
fn gain_field_linear(value: u32) -> u64 {
    u64::from(exp2_fixed(gain_field_log2(value), LOG2_GAIN_SHIFT, 8))
}

fn linear_gain_field(linear: u64) -> u32 {
    let linear = u32::try_from(linear).unwrap_or(u32::MAX);
    u32::try_from(log2_fixed_to_fixed(linear, 8, GAIN_FIELD_FRAC).max(0)).unwrap_or(0)
}

impl StateMachine for CmosMachine {
    fn id(&self) -> MachineId {
        MachineId::Cmos
    }

    fn init(&mut self, env: &mut Env<'_>) {
        *self = Self::new();
        self.reload(env);
    }

    fn deinit(&mut self, _env: &mut Env<'_>) {
        self.pending.clear();
        self.staged = false;
        self.last_frame_start = None;
    }

    fn irq_mask(&mut self) -> Option<&mut IrqMask> {
        Some(&mut self.mask)
    }

    fn process_interrupt(&mut self, irq: Irq, env: &mut Env<'_>) {
        if irq == Irq::FrameStart {
            self.frame_start(env);
        }
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            Event::SensorReady => {
                let info = env.sensor_info();
                self.apply_sensor_limits(&info, false);
                self.last_frame_start = None;
                true
            }
            // A new flicker period re-rounds the staged exposure before the
            // next frame starts.
            Event::FrameEnd | Event::AntiflickerChanged => {
                self.split_exposure(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::Cmos(request) = request else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            CmosGet::Control(field) => ParamValue::U32(self.control.get(field)),
            CmosGet::Controls => ParamValue::CmosControl(self.control),
            CmosGet::Exposure => ParamValue::Exposure(self.current),
            CmosGet::History(back) => {
                ParamValue::Exposure(self.history(back).ok_or(ParamError::NotExists)?)
            }
            CmosGet::TotalGainLog2 => ParamValue::I32(self.current.total_gain_log2()),
            CmosGet::TotalGain => ParamValue::U32(exp2_fixed(
                self.current.total_gain_log2(),
                LOG2_GAIN_SHIFT,
                8,
            )),
            CmosGet::ExposureLog2 => ParamValue::I32(self.current.exposure_log2),
            CmosGet::ExposureRatio => ParamValue::U32(self.target.exposure_ratio),
            CmosGet::MaxExposureLog2 => ParamValue::I32(self.max_exposure_log2(env)),
            CmosGet::ExposureTime => ParamValue::U32(self.exposure_time(env)),
            CmosGet::ExposurePriority => {
                let max = env.sensor_info().integration_time_max;
                let integration_priority = self.control.get(CmosField::MaxIntegrationTime) != max;
                ParamValue::U32(u32::from(integration_priority))
            }
            CmosGet::IsoGain => ParamValue::U32(self.iso_gain),
            CmosGet::AeMode => ParamValue::U32(
                AeMode::from_flags(
                    self.control.is_set(CmosField::ManualIntegrationTime),
                    self.manual_gain_mode,
                )
                .to_raw(),
            ),
            CmosGet::ManualGain => ParamValue::U32(self.manual_gain),
            CmosGet::Strategy => ParamValue::U32(self.strategy.to_raw()),
        };
        Ok(value)
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::Cmos(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            CmosSet::Control(field, value) => {
                self.set_field(field, value, env);
                Ok(())
            }
            CmosSet::ExposureTarget {
                exposure_log2,
                exposure_ratio,
                frame_id,
            } => {
                let max_ratio = self.control.get(CmosField::MaxExposureRatio).max(1);
                self.target = Target {
                    exposure_log2,
                    exposure_ratio: exposure_ratio.clamp(1, max_ratio),
                    frame_id,
                };
                Ok(())
            }
            CmosSet::AeMode(mode) => {
                let (manual_time, manual_gain) = mode.flags();
                self.control
                    .set(CmosField::ManualIntegrationTime, u32::from(manual_time));
                self.manual_gain_mode = manual_gain;
                Ok(())
            }
            CmosSet::ManualGain(gain) => {
                if gain < 0x100 {
                    return Err(ParamError::BadArgument);
                }
                self.manual_gain = gain;
                Ok(())
            }
            CmosSet::ExposureTime(micros) => self.set_exposure_time(micros, env),
            CmosSet::ExposurePriority(value) => self.set_exposure_priority(value, env),
            CmosSet::IsoGain(value) => self.set_iso_gain(value, env),
            CmosSet::Strategy(strategy) => {
                self.set_strategy(strategy, env);
                Ok(())
            }
            CmosSet::Reload => {
                self.reload(env);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ae_mode_flags_round_trip() {
        for raw in 0..4 {
            let mode = AeMode::from_raw(raw).expect("valid mode");
            let (time, gain) = mode.flags();
            assert_eq!(AeMode::from_flags(time, gain), mode);
        }
        assert_eq!(AeMode::from_raw(4), None);
    }

    #[test]
    fn gain_fields_convert_between_scales() {
        assert_eq!(gain_field_log2(32), 1 << LOG2_GAIN_SHIFT);
        assert_eq!(log2_to_gain_field(3 << LOG2_GAIN_SHIFT), 96);
        assert_eq!(log2_to_gain_field(-5), 0);
        assert_eq!(gain_field_linear(0), 0x100);
        assert_eq!(gain_field_linear(64), 0x400);
        assert_eq!(linear_gain_field(0x200), 32);
        assert_eq!(linear_gain_field(0x80), 0);
    }

    #[test]
    fn control_block_reads_calibration_order() {
        let mut calibrations = CalibrationSet::new();
        let mut cells = [0u32; CMOS_FIELD_COUNT];
        cells[CmosField::MaxExposureRatio.index()] = 16;
        cells[CmosField::AntiFlickerFrequency.index()] = 50;
        calibrations
            .insert_u32(CalibrationId::CMOS_CONTROL, &cells)
            .expect("insert");

        let control = CmosControl::from_calibration(&calibrations);
        assert_eq!(control.get(CmosField::MaxExposureRatio), 16);
        assert_eq!(control.get(CmosField::AntiFlickerFrequency), 50);
        assert!(!control.is_set(CmosField::AntiflickerEnable));
    }

    #[test]
    fn wdr_partition_divides_by_ratio() {
        let mut machine = CmosMachine::new();
        machine.control.set(CmosField::MaxExposureRatio, 16);
        machine.target.exposure_ratio = 16;
        let info = SensorInfo {
            sensor_exp_number: 3,
            integration_time_min: 1,
            ..SensorInfo::default()
        };
        assert_eq!(machine.partition(1600, &info), (100, 400, 1600));

        let linear = SensorInfo {
            sensor_exp_number: 1,
            ..info
        };
        assert_eq!(machine.partition(1600, &linear), (1600, 1600, 1600));
    }

    #[test]
    fn antiflicker_rounds_to_whole_periods() {
        let mut machine = CmosMachine::new();
        machine.control.set(CmosField::AntiflickerEnable, 1);
        machine.control.set(CmosField::AntiFlickerFrequency, 50);
        let info = SensorInfo {
            lines_per_second: 33_750,
            ..SensorInfo::default()
        };
        // 33750 / 100 = 337 lines per period.
        assert_eq!(machine.flicker_free(1000, &info), 674);
        assert_eq!(machine.flicker_free(200, &info), 200);
    }

    #[test]
    fn antiflicker_change_restages_the_exposure() {
        use crate::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};
        use crate::context::ContextShared;
        use crate::dispatcher::Dispatcher;
        use crate::machines::AeAlgorithm;
        use crate::sensor::{DummyConfig, DummySensor, SensorBackend};

        let sensor = DummySensor::with_config(DummyConfig {
            lines_per_second: 33_750,
            integration_time_max: 1125,
            integration_time_limit: 1125,
            ..DummyConfig::default()
        });
        let shared = ContextShared::new(
            0,
            dummy_calibrations().expect("defaults fit"),
            DEFAULT_ISO_BASE_GAINS,
        );
        let mut dispatcher: Dispatcher<16> =
            Dispatcher::new(shared, SensorBackend::Dummy(sensor), AeAlgorithm::default())
                .expect("every machine registered");
        dispatcher.init();
        dispatcher.process_events(None);

        let target = CmosSet::ExposureTarget {
            exposure_log2: log2_int_to_fixed(1000, LOG2_GAIN_SHIFT),
            exposure_ratio: 1,
            frame_id: 0,
        };
        dispatcher.set(Set::Cmos(target)).expect("target");
        dispatcher
            .set(Set::Cmos(CmosSet::Control(CmosField::AntiFlickerFrequency, 50)))
            .expect("frequency");
        dispatcher
            .set(Set::Cmos(CmosSet::Control(CmosField::AntiflickerEnable, 1)))
            .expect("enable");
        assert!(!dispatcher.events().is_empty());
        dispatcher.process_events(None);

        let applied = dispatcher
            .get(Get::Cmos(CmosGet::Exposure))
            .and_then(ParamValue::as_exposure)
            .expect("exposure");
        // Two whole 337-line periods fit under the 1000-line target.
        assert_eq!(applied.integration_time_long, 674);
    }

    #[test]
    fn iso_gain_pins_the_gains_and_restores_on_zero() {
        use crate::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};
        use crate::context::ContextShared;
        use crate::dispatcher::Dispatcher;
        use crate::machines::AeAlgorithm;
        use crate::sensor::{DummyConfig, DummySensor, SensorBackend};

        // 16x analog ceiling.
        let sensor = DummySensor::with_config(DummyConfig {
            again_log2_max: 4 << LOG2_GAIN_SHIFT,
            ..DummyConfig::default()
        });
        let shared = ContextShared::new(
            0,
            dummy_calibrations().expect("defaults fit"),
            DEFAULT_ISO_BASE_GAINS,
        );
        let mut dispatcher: Dispatcher<16> =
            Dispatcher::new(shared, SensorBackend::Dummy(sensor), AeAlgorithm::default())
                .expect("every machine registered");
        dispatcher.init();
        dispatcher.process_events(None);
        let control = |dispatcher: &mut Dispatcher<16>, field| {
            dispatcher
                .get(Get::Cmos(CmosGet::Control(field)))
                .and_then(ParamValue::as_u32)
                .expect("control field")
        };
        let before = control(&mut dispatcher, CmosField::SensorAnalogGain);

        dispatcher
            .set(Set::Cmos(CmosSet::IsoGain(800)))
            .expect("iso within the analog ceiling");
        assert_eq!(
            dispatcher.get(Get::Cmos(CmosGet::IsoGain)),
            Ok(ParamValue::U32(800))
        );
        assert_eq!(control(&mut dispatcher, CmosField::ManualSensorAnalogGain), 1);
        // 8x analog gain is three stops in the 5-bit fractional field.
        assert_eq!(control(&mut dispatcher, CmosField::SensorAnalogGain), 3 << 5);

        dispatcher.set(Set::Cmos(CmosSet::IsoGain(0))).expect("restore");
        assert_eq!(control(&mut dispatcher, CmosField::ManualSensorAnalogGain), 0);
        assert_eq!(control(&mut dispatcher, CmosField::SensorAnalogGain), before);
    }
}
