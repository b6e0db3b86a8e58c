#![allow(dead_code)]

use isp_core::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};
use isp_core::command::{self, Direction, Response};
use isp_core::console::FRAME_END_VECTOR;
use isp_core::firmware::{ContextSettings, InputPortMode, IspFirmware, IspHardware};
use isp_core::irq::Irq;
use isp_core::machines::AeAlgorithm;
use isp_core::regs::IspRegisters;
use isp_core::sensor::{DummyConfig, DummySensor, SensorBackend};
use isp_core::stats::{FrameStats, HISTOGRAM_BINS, ZONES, compress_bin};

pub type Firmware = IspFirmware<SceneHardware, 1, 64>;

/// Pixels counted per frame by the synthetic histogram.
const PIXELS: u32 = 1920 * 1080;

/// Hardware double that meters a flat scene of one luminance.
#[derive(Clone, Debug)]
pub struct SceneHardware {
    /// Histogram bin every pixel lands in, 0..1024.
    pub luma_bin: usize,
    pub port: InputPortMode,
    pub committed: Option<IspRegisters>,
}

impl SceneHardware {
    pub fn new(luma_bin: usize) -> Self {
        Self {
            luma_bin: luma_bin.min(HISTOGRAM_BINS - 1),
            port: InputPortMode::SafeStart,
            committed: None,
        }
    }
}

impl IspHardware for SceneHardware {
    fn take_irq_status(&mut self, _: u32) -> u32 {
        0
    }

    fn read_stats(&mut self, _: u32, stats: &mut FrameStats) {
        stats.histogram = [0; HISTOGRAM_BINS];
        stats.histogram[self.luma_bin] = compress_bin(PIXELS);
        let zone_mean = u16::try_from(self.luma_bin).expect("bin fits");
        stats.zone_hist = [zone_mean; ZONES];
        for zone in &mut stats.awb_zones {
            zone.rg = 0x100;
            zone.bg = 0x100;
            zone.count = PIXELS / u32::try_from(ZONES).expect("zones fit");
        }
        for zone in &mut stats.af_zones {
            zone.contrast = 1000;
        }
    }

    fn commit(&mut self, _: u32, regs: &IspRegisters) {
        self.committed = Some(regs.clone());
    }

    fn request_input_port(&mut self, _: u32, mode: InputPortMode) {
        self.port = mode;
    }

    fn input_port_status(&mut self, _: u32) -> InputPortMode {
        self.port
    }

    fn delay_ms(&mut self, _: u32) {}
}

pub fn settings() -> ContextSettings {
    ContextSettings {
        sensor: SensorBackend::default(),
        ae: AeAlgorithm::default(),
        calibrations: dummy_calibrations().expect("defaults fit"),
        iso_base: DEFAULT_ISO_BASE_GAINS,
        isp_base: 0,
        event_budget: None,
    }
}

/// Firmware with a single context that has finished sensor bring-up.
pub fn firmware(luma_bin: usize) -> Firmware {
    firmware_with_sensor(luma_bin, DummyConfig::default())
}

/// Same as [`firmware`] with a dummy sensor of the given limits.
pub fn firmware_with_sensor(luma_bin: usize, config: DummyConfig) -> Firmware {
    let mut firmware = IspFirmware::new(SceneHardware::new(luma_bin));
    let settings = ContextSettings {
        sensor: SensorBackend::Dummy(DummySensor::with_config(config)),
        ..settings()
    };
    firmware.init([settings]).expect("one context fits");
    firmware.process().expect("initialized");
    firmware
}

/// End of frame with statistics, the queued work, then the next frame start.
pub fn run_frame(firmware: &mut Firmware) {
    let active = firmware.active_context();
    firmware.service_vector(active, FRAME_END_VECTOR);
    firmware.process().expect("initialized");
    firmware.service_vector(active, Irq::FrameStart.mask());
    firmware.process().expect("initialized");
}

pub fn get(firmware: &mut Firmware, kind: u8, id: u8) -> Response {
    let ctx = firmware.active_context();
    command::command(firmware, ctx, kind, id, 0, Direction::Get)
}

pub fn set(firmware: &mut Firmware, kind: u8, id: u8, value: u32) -> Response {
    let ctx = firmware.active_context();
    command::command(firmware, ctx, kind, id, value, Direction::Set)
}
