//! Sensor driver boundary and the sensor state machine.
//!
//! Drivers implement [`SensorDriver`]; the closed [`SensorBackend`] enum selects
//! one at compile time so the machine never needs dynamic dispatch or
//! allocation.

use core::fmt;

use heapless::Vec;

mod dummy;
mod fsm;

pub use dummy::{DummyConfig, DummySensor, DummyRegister};
pub use fsm::{SensorGet, SensorMachine, SensorSet};

/// Upper bound on presets a driver may advertise.
pub const MAX_SENSOR_MODES: usize = 8;

/// Wide-dynamic-range operating mode of a preset.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum WdrMode {
    #[default]
    Linear,
    Native,
    FsLin,
}

impl WdrMode {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            WdrMode::Linear => 0,
            WdrMode::Native => 1,
            WdrMode::FsLin => 2,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(WdrMode::Linear),
            1 => Some(WdrMode::Native),
            2 => Some(WdrMode::FsLin),
            _ => None,
        }
    }
}

/// Width and height in pixels.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Resolution {
    pub width: u16,
    pub height: u16,
}

impl Resolution {
    #[must_use]
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// One preset advertised by a driver.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SensorMode {
    pub wdr_mode: WdrMode,
    /// Frames per second multiplied by 256.
    pub fps: u32,
    pub resolution: Resolution,
    pub exposures: u8,
    pub bits: u8,
}

/// Static and per-mode characteristics reported by a driver.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SensorParams {
    pub total: Resolution,
    pub active: Resolution,
    pub pixels_per_line: u16,
    /// Maximum analog gain, log2 with `LOG2_GAIN_SHIFT` fractional bits.
    pub again_log2_max: i32,
    /// Maximum sensor digital gain, log2 with `LOG2_GAIN_SHIFT` fractional bits.
    pub dgain_log2_max: i32,
    /// Smallest analog gain step worth allocating.
    pub again_accuracy: i32,
    /// Integration time bounds in lines.
    pub integration_time_min: u32,
    pub integration_time_max: u32,
    pub integration_time_long_max: u32,
    pub integration_time_limit: u32,
    pub day_light_integration_time_max: u16,
    /// Frames between a register write and its effect.
    pub integration_time_apply_delay: u8,
    pub isp_exposure_channel_delay: u8,
    pub xoffset: i32,
    pub yoffset: i32,
    pub lines_per_second: u32,
    pub sensor_exp_number: u8,
    pub modes: Vec<SensorMode, MAX_SENSOR_MODES>,
    pub mode: u8,
    /// Physical array size in mm x 10000.
    pub physical_width: u32,
    pub physical_height: u32,
    pub rggb_start: u8,
    pub is_tpg: bool,
}

impl SensorParams {
    /// Preset currently programmed into the sensor.
    #[must_use]
    pub fn current_mode(&self) -> Option<&SensorMode> {
        self.modes.get(usize::from(self.mode))
    }
}

/// Copyable summary of [`SensorParams`] for the parameter bus.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SensorInfo {
    pub total: Resolution,
    pub active: Resolution,
    pub again_log2_max: i32,
    pub dgain_log2_max: i32,
    pub integration_time_min: u32,
    pub integration_time_max: u32,
    pub integration_time_limit: u32,
    pub integration_time_apply_delay: u8,
    pub lines_per_second: u32,
    pub sensor_exp_number: u8,
    pub modes_num: u8,
    pub preset: u8,
    pub mode: SensorMode,
    pub physical_width: u32,
    pub physical_height: u32,
}

impl From<&SensorParams> for SensorInfo {
    fn from(params: &SensorParams) -> Self {
        Self {
            total: params.total,
            active: params.active,
            again_log2_max: params.again_log2_max,
            dgain_log2_max: params.dgain_log2_max,
            integration_time_min: params.integration_time_min,
            integration_time_max: params.integration_time_max,
            integration_time_limit: params.integration_time_limit,
            integration_time_apply_delay: params.integration_time_apply_delay,
            lines_per_second: params.lines_per_second,
            sensor_exp_number: params.sensor_exp_number,
            modes_num: u8::try_from(params.modes.len()).unwrap_or(u8::MAX),
            preset: params.mode,
            mode: params.current_mode().copied().unwrap_or_default(),
            physical_width: params.physical_width,
            physical_height: params.physical_height,
        }
    }
}

/// Integration times per exposure channel, in lines.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IntegrationTimes {
    pub short: u16,
    pub medium: u16,
    pub long: u16,
}

/// Failures reported by a sensor driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorError {
    /// Requested preset index is not advertised.
    UnsupportedMode(u8),
    /// Register address outside the driver's map.
    RegisterOutOfRange(u32),
    /// Bus transaction failed.
    Bus,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Operations a sensor driver provides to the firmware.
///
/// The `alloc_*` calls only stage values and return what will actually be
/// applied; nothing reaches the sensor until [`SensorDriver::update`] runs in
/// the vertical blank.
pub trait SensorDriver {
    fn alloc_analog_gain(&mut self, gain_log2: i32) -> i32;
    fn alloc_digital_gain(&mut self, gain_log2: i32) -> i32;
    fn alloc_integration_time(&mut self, times: &mut IntegrationTimes);
    fn update(&mut self);
    fn set_mode(&mut self, mode: u8) -> Result<(), SensorError>;
    fn start_streaming(&mut self);
    fn stop_streaming(&mut self);
    fn id(&self) -> u16;
    fn parameters(&self) -> &SensorParams;
    fn read_register(&mut self, address: u32) -> Result<u32, SensorError>;
    fn write_register(&mut self, address: u32, data: u32) -> Result<(), SensorError>;

    /// Bypasses any processing the sensor performs on-chip.
    fn disable_sensor_isp(&mut self) {}
}

/// Drivers compiled into the firmware.
#[derive(Clone, Debug)]
pub enum SensorBackend {
    Dummy(DummySensor),
}

impl Default for SensorBackend {
    fn default() -> Self {
        SensorBackend::Dummy(DummySensor::new())
    }
}

impl SensorBackend {
    fn driver(&self) -> &dyn SensorDriver {
        match self {
            SensorBackend::Dummy(sensor) => sensor,
        }
    }

    fn driver_mut(&mut self) -> &mut dyn SensorDriver {
        match self {
            SensorBackend::Dummy(sensor) => sensor,
        }
    }
}

impl SensorDriver for SensorBackend {
    fn alloc_analog_gain(&mut self, gain_log2: i32) -> i32 {
        self.driver_mut().alloc_analog_gain(gain_log2)
    }

    fn alloc_digital_gain(&mut self, gain_log2: i32) -> i32 {
        self.driver_mut().alloc_digital_gain(gain_log2)
    }

    fn alloc_integration_time(&mut self, times: &mut IntegrationTimes) {
        self.driver_mut().alloc_integration_time(times);
    }

    fn update(&mut self) {
        self.driver_mut().update();
    }

    fn set_mode(&mut self, mode: u8) -> Result<(), SensorError> {
        self.driver_mut().set_mode(mode)
    }

    fn start_streaming(&mut self) {
        self.driver_mut().start_streaming();
    }

    fn stop_streaming(&mut self) {
        self.driver_mut().stop_streaming();
    }

    fn id(&self) -> u16 {
        self.driver().id()
    }

    fn parameters(&self) -> &SensorParams {
        self.driver().parameters()
    }

    fn read_register(&mut self, address: u32) -> Result<u32, SensorError> {
        self.driver_mut().read_register(address)
    }

    fn write_register(&mut self, address: u32, data: u32) -> Result<(), SensorError> {
        self.driver_mut().write_register(address, data)
    }

    fn disable_sensor_isp(&mut self) {
        self.driver_mut().disable_sensor_isp();
    }
}
