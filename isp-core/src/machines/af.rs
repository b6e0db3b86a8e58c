//! Contrast auto focus.
//!
//! The lens is driven by position alone; the machine treats a context without
//! an `AF_LMS` table as having no lens and rejects every request except the
//! lens status query. Focus is found by sweeping the lens across the
//! calibrated range and settling on the sharpest position seen.

use crate::calibration::{CalibrationId, CalibrationSet};
use crate::event::Event;
use crate::irq::{Irq, IrqMask};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::stats::{AfZone, ZONES, ZONES_HOR, ZONES_VERT};

use super::StateMachine;
use super::dma_writer::DmaWriterGet;
use super::roi::Roi;

/// Default AF window, the centre ninth of the frame.
pub const AF_ROI_DEFAULT: Roi = Roi {
    x1: 85,
    y1: 85,
    x2: 171,
    y2: 171,
};

/// Manual positions are expressed on a 0..=256 scale across the lens range.
const MANUAL_POSITION_MAX: u32 = 256;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum AfMode {
    #[default]
    AutoSingle,
    AutoContinuous,
    Manual,
    Calibration,
}

impl AfMode {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(AfMode::AutoSingle),
            1 => Some(AfMode::AutoContinuous),
            2 => Some(AfMode::Manual),
            3 => Some(AfMode::Calibration),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum AfState {
    #[default]
    Inactive,
    Scan,
    Focused,
    Unfocused,
}

impl AfState {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }
}

/// Continuous-AF supervisor state.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CafState {
    #[default]
    NotRunning,
    Running,
    WaitingForSceneChange,
    WaitingForStableScene,
    FinishedFailed,
    FinishedSuccessful,
}

impl CafState {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AfGet {
    Mode,
    State,
    CafState,
    LensStatus,
    /// Current lens position on the 0..=255 manual scale.
    ManualPosition,
    /// ROI as last set, before any vflip mirroring.
    Roi,
    LensPosition,
    /// Weighted contrast of the last processed frame.
    Sharpness,
    Optic(LensOptic),
}

/// Optical characteristics of the lens, each scaled by 10000.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LensOptic {
    /// Diopters.
    MinFocusDistance,
    /// Diopters.
    HyperfocalDistance,
    /// Millimetres.
    FocalLength,
    /// F-number.
    Aperture,
}

impl LensOptic {
    const fn index(self) -> usize {
        self as usize
    }
}

/// Optics of the fixed-focal voice-coil module the lens table describes.
const DEFAULT_OPTICS: [u32; 4] = [100_000, 5_000, 40_000, 20_000];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AfSet {
    Mode(AfMode),
    ManualPosition(u32),
    Roi(u32),
    Refocus,
    InputRoiReload,
}

/// Lens limits and search tuning from the `AF_LMS` table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LensParams {
    pub pos_min: u32,
    pub pos_max: u32,
    pub search_positions: u32,
    pub skip_frames_init: u32,
    pub skip_frames_move: u32,
    /// Minimum `(best - worst) / best` in 1/256 for a scan to count as focused.
    pub dynamic_range_th: u32,
    /// Percent drop from the peak that ends a sweep early.
    pub exit_th: u32,
    /// Scene change, in 1/256 of the reference contrast, that wakes CAF.
    pub caf_trigger_th: u32,
    /// Frame-to-frame change, in 1/256, below which the scene is stable.
    pub caf_stable_th: u32,
    pub optics: [u32; 4],
}

impl LensParams {
    const POS_MIN: usize = 1;
    const POS_MAX: usize = 10;
    const SEARCH_POSITIONS: usize = 12;
    const SKIP_FRAMES_INIT: usize = 13;
    const SKIP_FRAMES_MOVE: usize = 14;
    const DYNAMIC_RANGE_TH: usize = 15;
    const EXIT_TH: usize = 17;
    const CAF_TRIGGER_TH: usize = 18;
    const CAF_STABLE_TH: usize = 19;

    /// `None` when the context carries no usable lens description.
    #[must_use]
    pub fn from_calibration(calibrations: &CalibrationSet) -> Option<Self> {
        let id = CalibrationId::AF_LMS;
        if !calibrations.contains(id) {
            return None;
        }
        let cell = |index| calibrations.cell_or(id, index, 0);
        let params = Self {
            pos_min: cell(Self::POS_MIN),
            pos_max: cell(Self::POS_MAX),
            search_positions: cell(Self::SEARCH_POSITIONS).max(2),
            skip_frames_init: cell(Self::SKIP_FRAMES_INIT),
            skip_frames_move: cell(Self::SKIP_FRAMES_MOVE),
            dynamic_range_th: cell(Self::DYNAMIC_RANGE_TH),
            exit_th: cell(Self::EXIT_TH).min(100),
            caf_trigger_th: cell(Self::CAF_TRIGGER_TH),
            caf_stable_th: cell(Self::CAF_STABLE_TH),
            optics: DEFAULT_OPTICS,
        };
        if params.pos_max <= params.pos_min {
            isp_error!(
                "af: lens range {}..{} is empty",
                params.pos_min,
                params.pos_max
            );
            return None;
        }
        Some(params)
    }

    #[must_use]
    pub const fn optic(&self, optic: LensOptic) -> u32 {
        self.optics[optic.index()]
    }

    /// Lens position for a 0..=256 manual setting.
    #[must_use]
    pub fn manual_target(&self, manual: u32) -> u32 {
        let range = u64::from(self.pos_max - self.pos_min);
        let offset = u64::from(manual.min(MANUAL_POSITION_MAX)) * range
            / u64::from(MANUAL_POSITION_MAX);
        self.pos_min + u32::try_from(offset).unwrap_or(u32::MAX - self.pos_min)
    }

    /// Inverse of [`Self::manual_target`], rounded and capped at 255.
    #[must_use]
    pub fn manual_position(&self, position: u32) -> u32 {
        let range = u64::from(self.pos_max - self.pos_min);
        let position = u64::from(position.clamp(self.pos_min, self.pos_max) - self.pos_min);
        let scaled = (((position << 8) + range / 2) / range).min(0xFF);
        u32::try_from(scaled).unwrap_or(0xFF)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ScanStep {
    Move(u32),
    Done { position: u32, focused: bool },
}

/// One sweep across the lens range.
#[derive(Copy, Clone, Debug)]
struct Scan {
    position: u32,
    step: u32,
    end: u32,
    best_value: u64,
    best_position: u32,
    worst_value: u64,
    early_exit: bool,
    exit_th: u32,
    dynamic_range_th: u32,
}

impl Scan {
    fn new(params: &LensParams, early_exit: bool) -> Self {
        let step = ((params.pos_max - params.pos_min) / (params.search_positions - 1)).max(1);
        Self {
            position: params.pos_min,
            step,
            end: params.pos_max,
            best_value: 0,
            best_position: params.pos_min,
            worst_value: u64::MAX,
            early_exit,
            exit_th: params.exit_th,
            dynamic_range_th: params.dynamic_range_th,
        }
    }

    /// Records the contrast measured at the current position.
    fn record(&mut self, sharpness: u64) -> ScanStep {
        if sharpness > self.best_value {
            self.best_value = sharpness;
            self.best_position = self.position;
        }
        self.worst_value = self.worst_value.min(sharpness);

        let past_peak = self.early_exit
            && self.best_value > 0
            && sharpness * 100 < self.best_value * u64::from(100 - self.exit_th);
        let next = self.position.saturating_add(self.step);
        if past_peak || next > self.end {
            return ScanStep::Done {
                position: self.best_position,
                focused: self.is_focused(),
            };
        }
        self.position = next;
        ScanStep::Move(next)
    }

    fn is_focused(&self) -> bool {
        self.best_value > 0
            && (self.best_value - self.worst_value) * 256
                >= self.best_value * u64::from(self.dynamic_range_th)
    }
}

/// Change from `reference` to `value` in 1/256 of the reference.
fn relative_change(reference: u64, value: u64) -> u64 {
    reference.abs_diff(value) * 256 / reference.max(1)
}

/// Contrast summed over the ROI, weighted by the calibrated zone profiles.
fn weighted_sharpness(zones: &[AfZone; ZONES], roi: Roi, calibrations: &CalibrationSet) -> u64 {
    let mut total = 0_u64;
    for row in 0..ZONES_VERT {
        let row_weight = calibrations.cell_or(CalibrationId::AF_ZONE_WGHT_VER, row, 1);
        for col in 0..ZONES_HOR {
            if !roi.contains_zone(col, row) {
                continue;
            }
            let weight = row_weight * calibrations.cell_or(CalibrationId::AF_ZONE_WGHT_HOR, col, 1);
            total += u64::from(zones[row * ZONES_HOR + col].contrast) * u64::from(weight);
        }
    }
    total
}

pub struct AfMachine {
    mask: IrqMask,
    lens: Option<LensParams>,
    mode: AfMode,
    state: AfState,
    caf_state: CafState,
    roi_api: u32,
    roi: Roi,
    manual: u32,
    position: u32,
    sharpness: u64,
    reference: u64,
    skip_frames: u32,
    refocus_required: bool,
    scan: Option<Scan>,
    zones: [AfZone; ZONES],
}

impl AfMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mask: IrqMask::new(),
            lens: None,
            mode: AfMode::AutoSingle,
            state: AfState::Inactive,
            caf_state: CafState::NotRunning,
            roi_api: AF_ROI_DEFAULT.to_raw(),
            roi: AF_ROI_DEFAULT,
            manual: 0,
            position: 0,
            sharpness: 0,
            reference: 0,
            skip_frames: 0,
            refocus_required: false,
            scan: None,
            zones: [AfZone { contrast: 0 }; ZONES],
        }
    }

    /// Checks the calibrated sensor margins and programs the metering window.
    fn config_input_roi(env: &mut Env<'_>) {
        let id = CalibrationId::AF_INPUT_ROI;
        if !env.shared.calibrations.contains(id) {
            return;
        }
        let border = |index| env.shared.calibrations.cell_or(id, index, 0);
        let (left, right, top, bottom) = (border(0), border(1), border(2), border(3));
        let active = env.sensor_info().active;
        let (width, height) = (u32::from(active.width), u32::from(active.height));
        if left + right >= width || top + bottom >= height {
            isp_error!(
                "af input roi borders {} {} {} {} exceed {}x{}",
                left,
                right,
                top,
                bottom,
                width,
                height
            );
            return;
        }
        let window = &mut env.shared.regs.af_window;
        let narrow = |value: u32| u16::try_from(value).unwrap_or(u16::MAX);
        window.horiz_start = narrow(left);
        window.horiz_end = narrow(width - (right + 1));
        window.vert_start = narrow(top);
        window.vert_end = narrow(height - (bottom + 1));
    }

    fn move_lens(&mut self, position: u32, settle: u32) {
        if position != self.position {
            isp_debug!("af lens {} -> {}", self.position, position);
            self.position = position;
            self.skip_frames = settle;
        }
    }

    fn start_scan(&mut self, lens: &LensParams) {
        let scan = Scan::new(lens, self.mode != AfMode::Calibration);
        self.move_lens(scan.position, lens.skip_frames_move);
        self.scan = Some(scan);
        self.state = AfState::Scan;
        if self.mode == AfMode::AutoContinuous {
            self.caf_state = CafState::Running;
        }
    }

    fn process_stats(&mut self, env: &mut Env<'_>) {
        let Some(lens) = self.lens else {
            return;
        };
        if self.skip_frames > 0 {
            self.skip_frames -= 1;
            return;
        }
        self.sharpness = weighted_sharpness(&self.zones, self.roi, &env.shared.calibrations);

        if self.mode == AfMode::Manual {
            if core::mem::take(&mut self.refocus_required) {
                self.scan = None;
                self.state = AfState::Inactive;
                self.caf_state = CafState::NotRunning;
                self.move_lens(lens.manual_target(self.manual), lens.skip_frames_move);
            }
            return;
        }

        if core::mem::take(&mut self.refocus_required) {
            self.start_scan(&lens);
            return;
        }

        if let Some(scan) = self.scan.as_mut() {
            match scan.record(self.sharpness) {
                ScanStep::Move(position) => {
                    if self.mode == AfMode::Calibration {
                        isp_info!("af calibration pos {} sharp {}", position, self.sharpness);
                    }
                    self.move_lens(position, lens.skip_frames_move);
                }
                ScanStep::Done { position, focused } => {
                    self.scan = None;
                    self.move_lens(position, lens.skip_frames_move);
                    self.state = if focused {
                        AfState::Focused
                    } else {
                        AfState::Unfocused
                    };
                    if self.mode == AfMode::AutoContinuous {
                        self.caf_state = if focused {
                            CafState::FinishedSuccessful
                        } else {
                            CafState::FinishedFailed
                        };
                    }
                }
            }
            return;
        }

        if self.mode == AfMode::AutoContinuous {
            self.supervise(&lens);
        }
    }

    /// Watches the settled scene and restarts the sweep once it has changed and
    /// come to rest again.
    fn supervise(&mut self, lens: &LensParams) {
        match self.caf_state {
            CafState::FinishedSuccessful | CafState::FinishedFailed | CafState::NotRunning => {
                self.reference = self.sharpness;
                self.caf_state = CafState::WaitingForSceneChange;
            }
            CafState::WaitingForSceneChange => {
                if relative_change(self.reference, self.sharpness) > u64::from(lens.caf_trigger_th) {
                    self.reference = self.sharpness;
                    self.caf_state = CafState::WaitingForStableScene;
                }
            }
            CafState::WaitingForStableScene => {
                if relative_change(self.reference, self.sharpness) < u64::from(lens.caf_stable_th) {
                    self.start_scan(lens);
                } else {
                    self.reference = self.sharpness;
                }
            }
            CafState::Running => {}
        }
    }
}

impl Default for AfMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for AfMachine {
    fn id(&self) -> MachineId {
        MachineId::Af
    }

    fn init(&mut self, env: &mut Env<'_>) {
        *self = Self::new();
        self.lens = LensParams::from_calibration(&env.shared.calibrations);
        match self.lens {
            Some(lens) => {
                self.position = lens.pos_min;
                self.skip_frames = lens.skip_frames_init;
                self.refocus_required = true;
                self.mask = IrqMask::repeating(Irq::AfStats.mask());
            }
            None => isp_info!("af: no lens description, auto focus disabled"),
        }
    }

    fn irq_mask(&mut self) -> Option<&mut IrqMask> {
        Some(&mut self.mask)
    }

    fn process_interrupt(&mut self, irq: Irq, env: &mut Env<'_>) {
        if irq == Irq::AfStats && self.lens.is_some() {
            self.zones = env.shared.stats.af_zones;
            env.raise(Event::AfStatsReady);
        }
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        if self.lens.is_none() {
            return false;
        }
        match event {
            Event::AfStatsReady => {
                self.process_stats(env);
                true
            }
            Event::AfRefocus => {
                self.refocus_required = true;
                true
            }
            Event::SensorReady => {
                Self::config_input_roi(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::Af(request) = request else {
            return Err(ParamError::Unsupported);
        };
        if request == AfGet::LensStatus {
            return Ok(ParamValue::Bool(self.lens.is_some()));
        }
        let Some(lens) = self.lens else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            AfGet::Mode => self.mode.to_raw(),
            AfGet::State => self.state.to_raw(),
            AfGet::CafState => self.caf_state.to_raw(),
            AfGet::LensStatus => u32::from(true),
            AfGet::ManualPosition => lens.manual_position(self.position),
            AfGet::Roi => self.roi_api,
            AfGet::LensPosition => self.position,
            AfGet::Sharpness => u32::try_from(self.sharpness).unwrap_or(u32::MAX),
            AfGet::Optic(optic) => lens.optic(optic),
        };
        Ok(ParamValue::U32(value))
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::Af(request) = request else {
            return Err(ParamError::Unsupported);
        };
        if self.lens.is_none() {
            isp_info!("af: not supported without a lens");
            return Err(ParamError::Unsupported);
        }

        match request {
            AfSet::Mode(mode) => {
                self.mode = mode;
                env.raise(Event::AfRefocus);
            }
            AfSet::ManualPosition(position) => {
                if position > MANUAL_POSITION_MAX {
                    return Err(ParamError::BadArgument);
                }
                self.manual = position;
                env.raise(Event::AfRefocus);
            }
            AfSet::Roi(raw) => {
                let roi = Roi::from_raw(raw);
                if !roi.is_ordered() {
                    return Err(ParamError::BadArgument);
                }
                let vflip = env
                    .get_bool(Get::DmaWriter(DmaWriterGet::Vflip))
                    .unwrap_or(false);
                self.roi_api = raw;
                self.roi = roi.flipped(vflip);
                env.raise(Event::AfRefocus);
            }
            AfSet::Refocus => env.raise(Event::AfRefocus),
            AfSet::InputRoiReload => Self::config_input_roi(env),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lens() -> LensParams {
        LensParams {
            pos_min: 1000,
            pos_max: 2000,
            search_positions: 11,
            skip_frames_init: 0,
            skip_frames_move: 0,
            dynamic_range_th: 32,
            exit_th: 25,
            caf_trigger_th: 40,
            caf_stable_th: 8,
            optics: DEFAULT_OPTICS,
        }
    }

    /// Contrast peaking at `peak` and falling off linearly.
    fn contrast_at(position: u32, peak: u32) -> u64 {
        u64::from(10_000_u32.saturating_sub(position.abs_diff(peak) * 10))
    }

    fn sweep(scan: &mut Scan, peak: u32) -> (u32, bool, usize) {
        let mut frames = 0;
        loop {
            frames += 1;
            match scan.record(contrast_at(scan.position, peak)) {
                ScanStep::Move(_) => {}
                ScanStep::Done { position, focused } => return (position, focused, frames),
            }
        }
    }

    #[test]
    fn manual_scale_round_trips() {
        let lens = lens();
        assert_eq!(lens.manual_target(0), 1000);
        assert_eq!(lens.manual_target(256), 2000);
        assert_eq!(lens.manual_target(1000), 2000);
        assert_eq!(lens.manual_position(lens.manual_target(128)), 128);
        assert_eq!(lens.manual_position(2000), 255);
        assert_eq!(lens.manual_position(0), 0);
    }

    #[test]
    fn manual_scale_handles_wide_lens_ranges() {
        let lens = LensParams {
            pos_min: 0,
            pos_max: 0x8000_0000,
            ..lens()
        };
        assert_eq!(lens.manual_target(256), 0x8000_0000);
        assert_eq!(lens.manual_target(128), 0x4000_0000);
        assert_eq!(lens.manual_position(0x4000_0000), 128);
    }

    #[test]
    fn sweep_settles_on_the_sharpest_position() {
        let mut scan = Scan::new(&lens(), true);
        let (position, _, frames) = sweep(&mut scan, 1400);
        assert_eq!(position, 1400);
        assert!(frames < 11);
    }

    #[test]
    fn calibration_sweep_visits_every_position() {
        let mut scan = Scan::new(&lens(), false);
        let (position, _, frames) = sweep(&mut scan, 1400);
        assert_eq!(position, 1400);
        assert_eq!(frames, 11);
    }

    #[test]
    fn flat_scene_is_unfocused() {
        let mut scan = Scan::new(&lens(), true);
        let mut outcome = None;
        for _ in 0..20 {
            if let ScanStep::Done { focused, .. } = scan.record(500) {
                outcome = Some(focused);
                break;
            }
        }
        assert_eq!(outcome, Some(false));
    }

    #[test]
    fn sharpness_only_counts_zones_inside_the_roi() {
        let mut zones = [AfZone { contrast: 1 }; ZONES];
        zones[0].contrast = 1_000;
        let calibrations = CalibrationSet::new();
        let centre = weighted_sharpness(&zones, AF_ROI_DEFAULT, &calibrations);
        let full = weighted_sharpness(&zones, Roi::FULL, &calibrations);
        assert!(centre < 1_000);
        assert_eq!(full, 1_000 + (ZONES as u64 - 1));
    }

    #[test]
    fn relative_change_is_scaled_to_the_reference() {
        assert_eq!(relative_change(1_000, 1_500), 128);
        assert_eq!(relative_change(0, 3), 768);
    }

    #[test]
    fn missing_lens_table_disables_af() {
        assert_eq!(LensParams::from_calibration(&CalibrationSet::new()), None);
    }
}
