//! Exposure telemetry for the firmware target.
//!
//! The ISP task samples the active context after each drained frame. Samples
//! land in the core's history ring; every [`TELEMETRY_LOG_INTERVAL`] frames a
//! summary goes out over defmt.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use isp_core::dispatcher::Dispatcher;
use isp_core::param::ParamError;
use isp_core::telemetry::{ExposureRecorder, ExposureSample};

use crate::config::TELEMETRY_LOG_INTERVAL;
use crate::status;

/// Frames kept for drift reporting.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

pub struct TelemetryRecorder {
    history: ExposureRecorder<TELEMETRY_RING_CAPACITY>,
    since_log: u32,
}

impl TelemetryRecorder {
    pub const fn new() -> Self {
        Self {
            history: ExposureRecorder::new(),
            since_log: 0,
        }
    }

    /// Samples `context` once per frame. Returns the sample when a summary
    /// is due.
    pub fn record<const Q: usize>(
        &mut self,
        context: &mut Dispatcher<Q>,
    ) -> Result<Option<ExposureSample>, ParamError> {
        if !self.history.record(context)? {
            return Ok(None);
        }
        let Some(&sample) = self.history.latest() else {
            return Ok(None);
        };
        status::record_exposure(sample.exposure_log2);

        self.since_log += 1;
        if self.since_log < TELEMETRY_LOG_INTERVAL {
            return Ok(None);
        }
        self.since_log = 0;
        log_summary(&sample, self.history.exposure_drift().unwrap_or(0));
        Ok(Some(sample))
    }

    pub fn history(&self) -> &ExposureRecorder<TELEMETRY_RING_CAPACITY> {
        &self.history
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "none")]
fn log_summary(sample: &ExposureSample, drift: i32) {
    defmt::info!(
        "frame {} exp_log2 {} gain_log2 {} int {}us ae {} drift {}",
        sample.frame_id,
        sample.exposure_log2,
        sample.gain_log2,
        sample.integration_us,
        sample.ae_state,
        drift
    );
}

#[cfg(not(target_os = "none"))]
fn log_summary(_: &ExposureSample, _: i32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use isp_core::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};
    use isp_core::console::FRAME_END_VECTOR;
    use isp_core::firmware::{ContextSettings, IspFirmware, NullHardware};
    use isp_core::irq::Irq;
    use isp_core::machines::AeAlgorithm;
    use isp_core::sensor::SensorBackend;

    #[test]
    fn summaries_follow_the_interval() {
        let mut firmware: IspFirmware<NullHardware, 1, 32> =
            IspFirmware::new(NullHardware::new());
        firmware
            .init([ContextSettings {
                sensor: SensorBackend::default(),
                ae: AeAlgorithm::default(),
                calibrations: dummy_calibrations().expect("defaults fit"),
                iso_base: DEFAULT_ISO_BASE_GAINS,
                isp_base: 0,
                event_budget: None,
            }])
            .expect("one context");
        firmware.process().expect("initialized");

        let mut telemetry = TelemetryRecorder::new();
        let mut summaries = 0;
        for _ in 0..TELEMETRY_LOG_INTERVAL * 2 {
            firmware.service_vector(0, FRAME_END_VECTOR);
            firmware.process().expect("initialized");
            firmware.service_vector(0, Irq::FrameStart.mask());
            firmware.process().expect("initialized");
            let context = firmware.active_mut().expect("active");
            if telemetry.record(context).expect("readable").is_some() {
                summaries += 1;
            }
            // A second sample of the same frame is ignored.
            let context = firmware.active_mut().expect("active");
            assert_eq!(telemetry.record(context), Ok(None));
        }
        assert_eq!(summaries, 2);
        assert_eq!(telemetry.history().len(), TELEMETRY_RING_CAPACITY);
    }
}
