//! Board-level constants and the per-context bring-up settings.

use isp_core::calibration::CalibrationError;
use isp_core::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};
use isp_core::firmware::ContextSettings;
use isp_core::machines::AeAlgorithm;
use isp_core::sensor::SensorBackend;

/// Camera pipelines served by this board.
pub const CONTEXTS: usize = 1;

/// Pending events each context can hold between interrupt and task.
pub const EVENT_QUEUE_DEPTH: usize = 32;

/// Base address of the first ISP instance's register window.
pub const ISP_BASE: u32 = 0x6000_0000;

/// Address stride between ISP instances.
pub const ISP_STRIDE: u32 = 0x0004_0000;

/// Events drained per pass so the console task is never starved.
pub const EVENT_BUDGET: usize = 16;

/// Frames between telemetry log lines.
pub const TELEMETRY_LOG_INTERVAL: u32 = 30;

/// Bytes accepted on one console line, excluding the terminator.
pub const MAX_LINE_LEN: usize = 96;

/// Bytes of console output buffered for one command.
pub const MAX_RESPONSE_LEN: usize = 1024;

/// Settings for context `index`, or `None` past the configured count.
pub fn context_settings(index: usize) -> Option<Result<ContextSettings, CalibrationError>> {
    if index >= CONTEXTS {
        return None;
    }
    let offset = u32::try_from(index).ok()?.checked_mul(ISP_STRIDE)?;
    Some(dummy_calibrations().map(|calibrations| ContextSettings {
        sensor: SensorBackend::default(),
        ae: AeAlgorithm::default(),
        calibrations,
        iso_base: DEFAULT_ISO_BASE_GAINS,
        isp_base: ISP_BASE + offset,
        event_budget: Some(EVENT_BUDGET),
    }))
}
