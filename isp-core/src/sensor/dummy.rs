//! Reference driver with no hardware behind it.
//!
//! The default configuration advertises a single 1080p30 linear preset and no
//! sensor-side gain, so every gain request ends up in the ISP digital gain.
//! Host tools widen the limits through [`DummyConfig`] to exercise the full
//! exposure split.

use heapless::Vec;

use super::{
    IntegrationTimes, Resolution, SensorDriver, SensorError, SensorMode, SensorParams, WdrMode,
};

/// Identifier reported by sensors without an ID register.
pub const DUMMY_SENSOR_ID: u16 = 0xFFFF;

const REGISTER_COUNT: usize = 16;

/// Addresses of the emulated register map.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DummyRegister {
    IntegrationTime = 0,
    AnalogGain = 1,
    DigitalGain = 2,
    Streaming = 3,
    Mode = 4,
}

impl DummyRegister {
    #[must_use]
    pub const fn address(self) -> u32 {
        self as u32
    }
}

/// Tunable characteristics of the dummy sensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DummyConfig {
    pub again_log2_max: i32,
    pub dgain_log2_max: i32,
    pub again_accuracy: i32,
    pub lines_per_second: u32,
    pub integration_time_max: u32,
    pub integration_time_limit: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            again_log2_max: 0,
            dgain_log2_max: 0,
            again_accuracy: 0,
            lines_per_second: 0,
            integration_time_max: 1000,
            integration_time_limit: 1000,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct Staged {
    times: IntegrationTimes,
    again_log2: i32,
    dgain_log2: i32,
}

/// Sensor stand-in that records what the firmware asked of it.
#[derive(Clone, Debug)]
pub struct DummySensor {
    config: DummyConfig,
    params: SensorParams,
    staged: Staged,
    registers: [u32; REGISTER_COUNT],
    updates: u32,
}

impl DummySensor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DummyConfig::default())
    }

    #[must_use]
    pub fn with_config(config: DummyConfig) -> Self {
        let mut modes = Vec::new();
        let _ = modes.push(SensorMode {
            wdr_mode: WdrMode::Linear,
            fps: 30 * 256,
            resolution: Resolution::new(1920, 1080),
            exposures: 1,
            bits: 12,
        });

        let params = SensorParams {
            sensor_exp_number: 1,
            again_log2_max: config.again_log2_max,
            dgain_log2_max: config.dgain_log2_max,
            again_accuracy: config.again_accuracy,
            integration_time_apply_delay: 2,
            modes,
            ..SensorParams::default()
        };

        let mut sensor = Self {
            config,
            params,
            staged: Staged::default(),
            registers: [0; REGISTER_COUNT],
            updates: 0,
        };
        sensor.apply_mode(0);
        sensor
    }

    fn apply_mode(&mut self, mode: u8) {
        let params = &mut self.params;
        params.active = Resolution::new(1920, 1080);
        params.total = Resolution::new(2200, 1125);
        params.pixels_per_line = params.total.width;
        params.integration_time_min = 1;
        params.integration_time_max = self.config.integration_time_max;
        params.integration_time_limit = self.config.integration_time_limit;
        params.integration_time_long_max = self.config.integration_time_limit;
        params.mode = mode;
        params.lines_per_second = self.config.lines_per_second;
        params.sensor_exp_number = params
            .modes
            .get(usize::from(mode))
            .map_or(1, |preset| preset.exposures);
        self.registers[DummyRegister::Mode as usize] = u32::from(mode);
    }

    /// Number of times staged values were committed.
    #[must_use]
    pub const fn update_count(&self) -> u32 {
        self.updates
    }

    /// Integration time last committed to the register map.
    #[must_use]
    pub const fn applied_integration_time(&self) -> u32 {
        self.registers[DummyRegister::IntegrationTime as usize]
    }

    /// Whether the stream is running.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.registers[DummyRegister::Streaming as usize] != 0
    }
}

impl Default for DummySensor {
    fn default() -> Self {
        Self::new()
    }
}

fn quantize(gain_log2: i32, max: i32, accuracy: i32) -> i32 {
    let clamped = gain_log2.clamp(0, max.max(0));
    if accuracy > 0 {
        clamped - clamped % accuracy
    } else {
        clamped
    }
}

impl SensorDriver for DummySensor {
    fn alloc_analog_gain(&mut self, gain_log2: i32) -> i32 {
        self.staged.again_log2 = quantize(
            gain_log2,
            self.params.again_log2_max,
            self.params.again_accuracy,
        );
        self.staged.again_log2
    }

    fn alloc_digital_gain(&mut self, gain_log2: i32) -> i32 {
        self.staged.dgain_log2 = quantize(gain_log2, self.params.dgain_log2_max, 0);
        self.staged.dgain_log2
    }

    fn alloc_integration_time(&mut self, times: &mut IntegrationTimes) {
        let min = u16::try_from(self.params.integration_time_min).unwrap_or(u16::MAX);
        let max = u16::try_from(self.params.integration_time_limit).unwrap_or(u16::MAX);
        times.short = times.short.clamp(min, max);
        times.medium = times.medium.clamp(min, max);
        times.long = times.long.clamp(min, max);
        self.staged.times = *times;
    }

    fn update(&mut self) {
        self.registers[DummyRegister::IntegrationTime as usize] =
            u32::from(self.staged.times.short);
        self.registers[DummyRegister::AnalogGain as usize] = self.staged.again_log2.cast_unsigned();
        self.registers[DummyRegister::DigitalGain as usize] = self.staged.dgain_log2.cast_unsigned();
        self.updates = self.updates.wrapping_add(1);
    }

    fn set_mode(&mut self, mode: u8) -> Result<(), SensorError> {
        if usize::from(mode) >= self.params.modes.len() {
            return Err(SensorError::UnsupportedMode(mode));
        }
        self.apply_mode(mode);
        Ok(())
    }

    fn start_streaming(&mut self) {
        self.registers[DummyRegister::Streaming as usize] = 1;
    }

    fn stop_streaming(&mut self) {
        self.registers[DummyRegister::Streaming as usize] = 0;
    }

    fn id(&self) -> u16 {
        DUMMY_SENSOR_ID
    }

    fn parameters(&self) -> &SensorParams {
        &self.params
    }

    fn read_register(&mut self, address: u32) -> Result<u32, SensorError> {
        usize::try_from(address)
            .ok()
            .and_then(|index| self.registers.get(index))
            .copied()
            .ok_or(SensorError::RegisterOutOfRange(address))
    }

    fn write_register(&mut self, address: u32, data: u32) -> Result<(), SensorError> {
        let slot = usize::try_from(address)
            .ok()
            .and_then(|index| self.registers.get_mut(index))
            .ok_or(SensorError::RegisterOutOfRange(address))?;
        *slot = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::LOG2_GAIN_SHIFT;

    #[test]
    fn default_sensor_reports_reference_geometry() {
        let sensor = DummySensor::new();
        let params = sensor.parameters();
        assert_eq!(params.active, Resolution::new(1920, 1080));
        assert_eq!(params.total, Resolution::new(2200, 1125));
        assert_eq!(params.integration_time_max, 1000);
        assert_eq!(params.again_log2_max, 0);
        assert_eq!(params.modes.len(), 1);
        assert_eq!(sensor.id(), DUMMY_SENSOR_ID);
    }

    #[test]
    fn gains_are_clamped_and_quantized() {
        let mut sensor = DummySensor::with_config(DummyConfig {
            again_log2_max: 4 << LOG2_GAIN_SHIFT,
            again_accuracy: 1 << (LOG2_GAIN_SHIFT - 4),
            ..DummyConfig::default()
        });
        let step = 1 << (LOG2_GAIN_SHIFT - 4);
        assert_eq!(sensor.alloc_analog_gain(step + 5), step);
        assert_eq!(sensor.alloc_analog_gain(9 << LOG2_GAIN_SHIFT), 4 << LOG2_GAIN_SHIFT);
        assert_eq!(sensor.alloc_analog_gain(-3), 0);
        assert_eq!(sensor.alloc_digital_gain(1 << LOG2_GAIN_SHIFT), 0);
    }

    #[test]
    fn staged_values_land_on_update() {
        let mut sensor = DummySensor::new();
        let mut times = IntegrationTimes {
            short: 5000,
            medium: 0,
            long: 0,
        };
        sensor.alloc_integration_time(&mut times);
        assert_eq!(times.short, 1000);
        assert_eq!(sensor.applied_integration_time(), 0);

        sensor.update();
        assert_eq!(sensor.applied_integration_time(), 1000);
        assert_eq!(sensor.update_count(), 1);
    }

    #[test]
    fn unknown_modes_and_registers_are_rejected() {
        let mut sensor = DummySensor::new();
        assert_eq!(sensor.set_mode(3), Err(SensorError::UnsupportedMode(3)));
        assert_eq!(
            sensor.read_register(99),
            Err(SensorError::RegisterOutOfRange(99))
        );
        sensor.write_register(9, 0xAB).expect("in range");
        assert_eq!(sensor.read_register(9), Ok(0xAB));
    }
}
