//! Synthetic sensor and ISP block used by the host emulator.
//!
//! The scene is a flat grey card lit at a fixed brightness. Its metered
//! luminance follows the exposure the firmware applied on the previous frame,
//! so auto exposure closes the loop the same way it does on silicon.

use std::collections::HashMap;

use isp_core::IspHardware;
use isp_core::firmware::InputPortMode;
use isp_core::math::LOG2_GAIN_SHIFT;
use isp_core::regs::IspRegisters;
use isp_core::stats::{FrameStats, HISTOGRAM_BINS, ZONES, compress_bin};

/// Exposure, in log2 fixed point, at which `brightness` maps to its own bin.
pub const REFERENCE_EXPOSURE_LOG2: i32 = 10 << LOG2_GAIN_SHIFT;

/// Pixels metered per frame.
const PIXELS: u32 = 1920 * 1080;

/// Contrast reported by every AF zone at best focus.
const PEAK_CONTRAST: u32 = 4000;

#[derive(Clone, Debug)]
pub struct Scene {
    brightness: u8,
    exposure_log2: i32,
    /// Latched interrupt lines per ISP base address.
    pending: HashMap<u32, u32>,
    port: InputPortMode,
    commits: u32,
}

impl Scene {
    pub fn new(brightness: u8) -> Self {
        Self {
            brightness,
            exposure_log2: REFERENCE_EXPOSURE_LOG2,
            pending: HashMap::new(),
            port: InputPortMode::SafeStop,
            commits: 0,
        }
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn set_brightness(&mut self, brightness: u8) {
        log::info!("scene brightness {} -> {}", self.brightness, brightness);
        self.brightness = brightness;
    }

    /// Feeds back the exposure the firmware settled on for the next frame.
    pub fn expose(&mut self, exposure_log2: i32) {
        self.exposure_log2 = exposure_log2;
    }

    /// Latches interrupt lines for the next `take_irq_status` of `isp_base`.
    pub fn raise(&mut self, isp_base: u32, vector: u32) {
        *self.pending.entry(isp_base).or_default() |= vector;
    }

    pub fn commits(&self) -> u32 {
        self.commits
    }

    pub fn streaming(&self) -> bool {
        self.port == InputPortMode::SafeStart
    }

    /// Histogram bin the whole card lands in under the current exposure.
    pub fn luma_bin(&self) -> usize {
        let base = u64::from(self.brightness) * 4;
        let delta = self.exposure_log2.saturating_sub(REFERENCE_EXPOSURE_LOG2);
        // Whole stops round down, leaving a non-negative fraction.
        let stops = delta >> LOG2_GAIN_SHIFT;
        let fraction = u64::from((delta & ((1 << LOG2_GAIN_SHIFT) - 1)).unsigned_abs());

        let scaled = if stops >= 0 {
            base.checked_shl(stops.unsigned_abs()).unwrap_or(u64::MAX)
        } else {
            base.checked_shr(stops.unsigned_abs()).unwrap_or(0)
        };
        let luma = scaled.saturating_add(scaled.saturating_mul(fraction) >> LOG2_GAIN_SHIFT);
        usize::try_from(luma).map_or(HISTOGRAM_BINS - 1, |luma| luma.min(HISTOGRAM_BINS - 1))
    }
}

impl IspHardware for Scene {
    fn take_irq_status(&mut self, isp_base: u32) -> u32 {
        self.pending.remove(&isp_base).unwrap_or(0)
    }

    fn read_stats(&mut self, _: u32, stats: &mut FrameStats) {
        let bin = self.luma_bin();
        stats.histogram = [0; HISTOGRAM_BINS];
        stats.histogram[bin] = compress_bin(PIXELS);
        stats.zone_hist = [u16::try_from(bin).unwrap_or(u16::MAX); ZONES];

        let per_zone = PIXELS / u32::try_from(ZONES).unwrap_or(1);
        for zone in &mut stats.awb_zones {
            zone.rg = 0x100;
            zone.bg = 0x100;
            zone.count = per_zone;
        }
        for zone in &mut stats.af_zones {
            zone.contrast = PEAK_CONTRAST;
        }
    }

    fn commit(&mut self, _: u32, regs: &IspRegisters) {
        self.commits = self.commits.wrapping_add(1);
        log::trace!(
            "commit #{}: dgain {:#x} crop {}x{}",
            self.commits,
            regs.isp_digital_gain,
            regs.crop_fr.size_x,
            regs.crop_fr.size_y
        );
    }

    fn request_input_port(&mut self, _: u32, mode: InputPortMode) {
        log::debug!("input port {mode:?}");
        self.port = mode;
    }

    fn input_port_status(&mut self, _: u32) -> InputPortMode {
        self.port
    }

    fn delay_ms(&mut self, _: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_exposure_maps_brightness_to_its_bin() {
        let scene = Scene::new(100);
        assert_eq!(scene.luma_bin(), 400);
    }

    #[test]
    fn one_stop_doubles_or_halves() {
        let mut scene = Scene::new(100);
        scene.expose(REFERENCE_EXPOSURE_LOG2 + (1 << LOG2_GAIN_SHIFT));
        assert_eq!(scene.luma_bin(), 800);
        scene.expose(REFERENCE_EXPOSURE_LOG2 - (1 << LOG2_GAIN_SHIFT));
        assert_eq!(scene.luma_bin(), 200);
        scene.expose(REFERENCE_EXPOSURE_LOG2 + (4 << LOG2_GAIN_SHIFT));
        assert_eq!(scene.luma_bin(), HISTOGRAM_BINS - 1);
    }

    #[test]
    fn pending_lines_are_taken_once() {
        let mut scene = Scene::new(0);
        scene.raise(0, 0b11);
        scene.raise(0, 0b100);
        scene.raise(0x1_0000, 0b1);
        assert_eq!(scene.take_irq_status(0), 0b111);
        assert_eq!(scene.take_irq_status(0), 0);
        assert_eq!(scene.take_irq_status(0x1_0000), 0b1);
    }
}
