use crate::event::Event;
use crate::machines::{ExposureSet, StateMachine};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;

use super::{IntegrationTimes, SensorBackend, SensorDriver, SensorInfo};

/// Reads served by the sensor machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorGet {
    Info,
    Streaming,
    /// Preset inspected by the `SENSOR_INFO_*` commands.
    InfoPreset,
    /// Mode table entry selected by [`SensorGet::InfoPreset`].
    InfoMode,
    Register(u32),
    /// Exposure as quantized by the driver, waiting for the next commit.
    StagedExposure,
}

/// Writes served by the sensor machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorSet {
    /// Selects the preset applied on the next hardware reset.
    Preset(u8),
    InfoPreset(u8),
    Streaming(bool),
    Register { address: u32, value: u32 },
    StageExposure(ExposureSet),
    /// Commits staged values to the sensor.
    Update,
}

/// Owns the sensor driver and its parameters.
#[derive(Debug)]
pub struct SensorMachine {
    backend: SensorBackend,
    streaming: bool,
    ready: bool,
    preset: u8,
    info_preset: u8,
    staged: ExposureSet,
}

impl SensorMachine {
    #[must_use]
    pub fn new(backend: SensorBackend) -> Self {
        Self {
            backend,
            streaming: false,
            ready: false,
            preset: 0,
            info_preset: 0,
            staged: ExposureSet::default(),
        }
    }

    /// Driver access for host tooling.
    #[must_use]
    pub fn backend(&self) -> &SensorBackend {
        &self.backend
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    fn modes_num(&self) -> u8 {
        u8::try_from(self.backend.parameters().modes.len()).unwrap_or(u8::MAX)
    }

    /// Programs the selected preset and publishes the new active window.
    fn configure(&mut self, env: &mut Env<'_>) -> Result<(), ParamError> {
        self.backend.set_mode(self.preset)?;
        let active = self.backend.parameters().active;
        env.shared.regs.active_width = active.width;
        env.shared.regs.active_height = active.height;
        isp_info!(
            "sensor preset {} configured: {}x{}",
            self.preset,
            active.width,
            active.height
        );
        Ok(())
    }

    fn reset(&mut self, env: &mut Env<'_>) {
        self.ready = false;
        env.raise(Event::SensorNotReady);

        let was_streaming = self.streaming;
        if was_streaming {
            self.backend.stop_streaming();
        }

        match self.configure(env) {
            Ok(()) => {
                self.ready = true;
                env.raise(Event::SensorReady);
            }
            Err(_) => {
                isp_error!("sensor preset {} could not be applied", self.preset);
            }
        }

        if was_streaming && self.ready {
            self.backend.start_streaming();
        }
    }

    fn stage(&mut self, request: ExposureSet) -> ExposureSet {
        let mut times = IntegrationTimes {
            short: saturate_u16(request.integration_time),
            medium: saturate_u16(request.integration_time_medium),
            long: saturate_u16(request.integration_time_long),
        };
        self.backend.alloc_integration_time(&mut times);
        let again_log2 = self.backend.alloc_analog_gain(request.again_log2);
        let dgain_log2 = self.backend.alloc_digital_gain(request.dgain_log2);

        self.staged = ExposureSet {
            integration_time: u32::from(times.short),
            integration_time_medium: u32::from(times.medium),
            integration_time_long: u32::from(times.long),
            again_log2,
            dgain_log2,
            ..request
        };
        self.staged
    }
}

fn saturate_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

impl StateMachine for SensorMachine {
    fn id(&self) -> MachineId {
        MachineId::Sensor
    }

    fn init(&mut self, env: &mut Env<'_>) {
        self.backend.disable_sensor_isp();
        self.preset = self.backend.parameters().mode;
        if self.configure(env).is_ok() {
            self.ready = true;
            env.raise(Event::SensorReady);
        }
    }

    fn deinit(&mut self, _env: &mut Env<'_>) {
        if self.streaming {
            self.backend.stop_streaming();
            self.streaming = false;
        }
        self.ready = false;
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        match event {
            Event::ResetSensorHw | Event::SensorSwReset => {
                self.reset(env);
                true
            }
            _ => false,
        }
    }

    fn get_param(&mut self, request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::Sensor(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            SensorGet::Info => Ok(ParamValue::Sensor(SensorInfo::from(
                self.backend.parameters(),
            ))),
            SensorGet::Streaming => Ok(ParamValue::Bool(self.streaming)),
            SensorGet::InfoPreset => Ok(ParamValue::U32(u32::from(self.info_preset))),
            SensorGet::InfoMode => self
                .backend
                .parameters()
                .modes
                .get(usize::from(self.info_preset))
                .copied()
                .map(ParamValue::Mode)
                .ok_or(ParamError::NotExists),
            SensorGet::Register(address) => {
                Ok(ParamValue::U32(self.backend.read_register(address)?))
            }
            SensorGet::StagedExposure => Ok(ParamValue::Exposure(self.staged)),
        }
    }

    fn set_param(&mut self, request: Set, _env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::Sensor(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            SensorSet::Preset(preset) => {
                if preset >= self.modes_num() {
                    return Err(ParamError::BadArgument);
                }
                self.preset = preset;
                Ok(())
            }
            SensorSet::InfoPreset(preset) => {
                if preset >= self.modes_num() {
                    return Err(ParamError::BadArgument);
                }
                self.info_preset = preset;
                Ok(())
            }
            SensorSet::Streaming(on) => {
                if on && !self.streaming {
                    self.backend.start_streaming();
                } else if !on && self.streaming {
                    self.backend.stop_streaming();
                }
                self.streaming = on;
                Ok(())
            }
            SensorSet::Register { address, value } => {
                self.backend.write_register(address, value)?;
                Ok(())
            }
            SensorSet::StageExposure(set) => {
                self.stage(set);
                Ok(())
            }
            SensorSet::Update => {
                self.backend.update();
                Ok(())
            }
        }
    }
}
