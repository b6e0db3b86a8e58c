//! Shadow copy of the ISP configuration space.
//!
//! Machines only ever write here. The firmware commits the whole block to the
//! hardware at frame start, which keeps every register update inside the
//! vertical blank of the frame it belongs to.

use crate::stats::ZONES;

/// Entries in the radial noise-reduction shading LUT.
pub const RADIAL_LUT_SIZE: usize = 33;

/// Detection curves of the purple-fringe block: hue, saturation, two luma
/// ranges (each low then high) and the combined HSL curve.
pub const PF_CURVE_COUNT: usize = 9;

/// Entries in the noise profile table.
pub const NOISE_PROFILE_SIZE: usize = 8;

/// Entries in the RGB gamma LUT shared by both output pipes.
pub const GAMMA_SIZE: usize = 129;

/// Full-scale output of a gamma LUT entry.
pub const GAMMA_MAX: u16 = 0x0FFF;

/// Straight-line gamma used until calibration provides one.
#[allow(clippy::cast_possible_truncation)]
const fn linear_gamma() -> [u16; GAMMA_SIZE] {
    let mut lut = [0; GAMMA_SIZE];
    let mut i = 0;
    while i < GAMMA_SIZE {
        lut[i] = (i as u32 * GAMMA_MAX as u32 / (GAMMA_SIZE as u32 - 1)) as u16;
        i += 1;
    }
    lut
}

/// Per-channel black level offsets.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BlackLevel {
    pub r: u32,
    pub gr: u32,
    pub gb: u32,
    pub b: u32,
}

/// Static white balance gains, 4.8.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WbGains {
    pub r: u16,
    pub gr: u16,
    pub gb: u16,
    pub b: u16,
}

impl WbGains {
    pub const UNITY: Self = Self {
        r: 0x100,
        gr: 0x100,
        gb: 0x100,
        b: 0x100,
    };
}

impl Default for WbGains {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Colour correction and shading block.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ColorRegs {
    /// Row-major 3x3 matrix, signed 4.8.
    pub ccm: [i16; 9],
    pub shading_strength: u16,
    pub shading_alpha: u8,
}

/// Iridix tone-mapping block.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IridixRegs {
    pub enable: bool,
    pub strength: u16,
    pub dark_enh: u16,
    pub contrast: u16,
    pub global_dg: u16,
}

/// Sinter spatial noise reduction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SinterRegs {
    pub strength: u8,
    pub strength1: u8,
    pub strength4: u8,
    pub thresh1: u8,
    pub thresh4: u8,
    pub int_config: u8,
    /// Per-exposure thresholds for WDR stitching, shortest exposure first.
    pub exposure_thresh: [u8; 4],
    pub radial_enable: bool,
    pub radial_centre_x: u16,
    pub radial_centre_y: u16,
    pub radial_off_center_mult: u16,
    pub radial_lut: [u8; RADIAL_LUT_SIZE],
}

impl Default for SinterRegs {
    fn default() -> Self {
        Self {
            strength: 0,
            strength1: 0,
            strength4: 0,
            thresh1: 0,
            thresh4: 0,
            int_config: 0,
            exposure_thresh: [0; 4],
            radial_enable: false,
            radial_centre_x: 0,
            radial_centre_y: 0,
            radial_off_center_mult: 0,
            radial_lut: [0; RADIAL_LUT_SIZE],
        }
    }
}

/// One knee of a purple-fringe detection curve.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PfCurve {
    pub slope: u16,
    pub offset: u16,
    pub thresh: u16,
}

/// Purple-fringe correction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PurpleFringeRegs {
    pub use_color_corrected_rgb: bool,
    pub hue_strength: u16,
    pub sat_strength: u16,
    pub luma_strength: u16,
    pub purple_strength: u16,
    pub saturation_strength: u8,
    pub sad_offset: u16,
    /// Follows total gain.
    pub sad_thresh: u16,
    /// Follows total gain.
    pub sad_slope: u16,
    pub curves: [PfCurve; PF_CURVE_COUNT],
    pub debug_sel: u8,
    pub radial_centre_x: u16,
    pub radial_centre_y: u16,
    pub radial_off_center_mult: u16,
    pub radial_lut: [u8; RADIAL_LUT_SIZE],
}

impl Default for PurpleFringeRegs {
    fn default() -> Self {
        PURPLE_FRINGE_RESET
    }
}

/// Temporal noise reduction and chroma noise reduction.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TemperRegs {
    pub strength: u8,
    pub cnr_uv_delta12_slope: u16,
    pub noise_profile: [u8; NOISE_PROFILE_SIZE],
    pub dp_slope: u16,
    pub dp_threshold: u16,
}

/// WDR frame-stitching noise controls.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StitchRegs {
    pub lm_np_mult: u16,
    pub lm_alpha_mov_slope: u16,
    pub lm_med_noise_intensity_thresh: u16,
    /// Motion compensation is switched off above the calibrated gain.
    pub mcoff_mode_enable: bool,
}

/// Demosaic sharpening and false-colour controls.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DemosaicRegs {
    pub sharp_alt_d: u8,
    pub sharp_alt_ud: u8,
    pub sharp_alt_du: u8,
    pub uu_slope: u8,
    pub uu_sh_slope: u8,
    pub fc_slope: u8,
}

/// Output-pipe sharpening block.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SharpenRegs {
    pub enable: bool,
    pub strength: u16,
    pub luma_thresh_low: u16,
    pub luma_slope_low: u16,
    pub luma_thresh_high: u16,
    pub luma_slope_high: u16,
    pub clip_str_max: u16,
    pub clip_str_min: u16,
    pub alpha_undershoot: u16,
}

/// Crop window for an output pipe.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CropRegs {
    pub enable: bool,
    pub start_x: u16,
    pub start_y: u16,
    pub size_x: u16,
    pub size_y: u16,
}

/// Scaler geometry for an output pipe.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ScalerRegs {
    pub enable: bool,
    pub width: u16,
    pub height: u16,
    pub image_resize_width: u16,
    pub image_resize_height: u16,
    /// Horizontal increment, 12.20.
    pub hfilt_tinc: u32,
    /// Vertical increment, 12.20.
    pub vfilt_tinc: u32,
    pub hfilt_coefset: u8,
    pub vfilt_coefset: u8,
}

/// Colour-space conversion matrix for YUV outputs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct YuvRegs {
    pub enable: bool,
    /// Row-major 3x3 matrix, signed 4.8.
    pub coefficients: [i16; 9],
    pub offsets: [u16; 3],
}

/// DMA writer configuration for an output pipe.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DmaRegs {
    pub enable: bool,
    pub format: u8,
    pub active_width: u16,
    pub active_height: u16,
    pub line_offset: u32,
    pub base_address: u32,
    pub vflip: bool,
    pub frame_write_cancel: bool,
}

/// AF metering window in sensor pixels, inclusive.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MeteringWindow {
    pub horiz_start: u16,
    pub horiz_end: u16,
    pub vert_start: u16,
    pub vert_end: u16,
}

/// Video test generator, applied to every input channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TestPattern {
    pub enable: bool,
    /// Pattern index, `0..=TEST_PATTERN_MAX`.
    pub mode: u8,
}

/// Highest pattern index the generator knows.
pub const TEST_PATTERN_MAX: u8 = 5;

/// Complete shadow register file for one context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IspRegisters {
    pub black_level: BlackLevel,
    pub wb_gains: WbGains,
    /// ISP digital gain, 4.8 linear.
    pub isp_digital_gain: u16,
    pub color: ColorRegs,
    pub iridix: IridixRegs,
    pub sinter: SinterRegs,
    pub temper: TemperRegs,
    pub purple_fringe: PurpleFringeRegs,
    pub stitch: StitchRegs,
    pub demosaic: DemosaicRegs,
    pub sharpen_fr: SharpenRegs,
    pub sharpen_ds: SharpenRegs,
    pub crop_fr: CropRegs,
    pub crop_ds: CropRegs,
    pub scaler_fr: ScalerRegs,
    pub scaler_ds: ScalerRegs,
    pub yuv_fr: YuvRegs,
    pub yuv_ds: YuvRegs,
    pub dma_fr: DmaRegs,
    pub dma_ds: DmaRegs,
    /// DMA reader source: `0` full-resolution pipe, `1` downscaled pipe.
    pub dma_reader_output: u8,
    /// Full-resolution pipe skips processing and writes sensor data.
    pub fr_raw_bypass: bool,
    pub test_pattern: TestPattern,
    /// AE zone weights, 0..=15.
    pub ae_zone_weights: [u8; ZONES],
    pub af_window: MeteringWindow,
    pub gamma: [u16; GAMMA_SIZE],
    pub active_width: u16,
    pub active_height: u16,
}

impl IspRegisters {
    /// Power-on register values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            black_level: BlackLevel {
                r: 0,
                gr: 0,
                gb: 0,
                b: 0,
            },
            wb_gains: WbGains::UNITY,
            isp_digital_gain: 0x100,
            color: ColorRegs {
                ccm: [0x100, 0, 0, 0, 0x100, 0, 0, 0, 0x100],
                shading_strength: 0,
                shading_alpha: 0,
            },
            iridix: IridixRegs {
                enable: false,
                strength: 0,
                dark_enh: 0,
                contrast: 0,
                global_dg: 0x100,
            },
            sinter: SinterRegs {
                strength: 0,
                strength1: 0,
                strength4: 0,
                thresh1: 0,
                thresh4: 0,
                int_config: 0,
                exposure_thresh: [0; 4],
                radial_enable: false,
                radial_centre_x: 0,
                radial_centre_y: 0,
                radial_off_center_mult: 0,
                radial_lut: [0; RADIAL_LUT_SIZE],
            },
            temper: TemperRegs {
                strength: 0,
                cnr_uv_delta12_slope: 0,
                noise_profile: [0; NOISE_PROFILE_SIZE],
                dp_slope: 0,
                dp_threshold: 0,
            },
            purple_fringe: PURPLE_FRINGE_RESET,
            stitch: StitchRegs {
                lm_np_mult: 0,
                lm_alpha_mov_slope: 0,
                lm_med_noise_intensity_thresh: 0,
                mcoff_mode_enable: false,
            },
            demosaic: DemosaicRegs {
                sharp_alt_d: 0,
                sharp_alt_ud: 0,
                sharp_alt_du: 0,
                uu_slope: 0,
                uu_sh_slope: 0,
                fc_slope: 0,
            },
            sharpen_fr: SHARPEN_RESET,
            sharpen_ds: SHARPEN_RESET,
            crop_fr: CROP_RESET,
            crop_ds: CROP_RESET,
            scaler_fr: SCALER_RESET,
            scaler_ds: SCALER_RESET,
            yuv_fr: YUV_RESET,
            yuv_ds: YUV_RESET,
            dma_fr: DMA_RESET,
            dma_ds: DMA_RESET,
            dma_reader_output: 0,
            fr_raw_bypass: false,
            test_pattern: TestPattern {
                enable: false,
                mode: 0,
            },
            ae_zone_weights: [15; ZONES],
            af_window: MeteringWindow {
                horiz_start: 0,
                horiz_end: 0,
                vert_start: 0,
                vert_end: 0,
            },
            gamma: linear_gamma(),
            active_width: 0,
            active_height: 0,
        }
    }
}

impl Default for IspRegisters {
    fn default() -> Self {
        Self::new()
    }
}

const SHARPEN_RESET: SharpenRegs = SharpenRegs {
    enable: false,
    strength: 0,
    luma_thresh_low: 0,
    luma_slope_low: 0,
    luma_thresh_high: 0,
    luma_slope_high: 0,
    clip_str_max: 0,
    clip_str_min: 0,
    alpha_undershoot: 0,
};

const PURPLE_FRINGE_RESET: PurpleFringeRegs = PurpleFringeRegs {
    use_color_corrected_rgb: false,
    hue_strength: 0,
    sat_strength: 0,
    luma_strength: 0,
    purple_strength: 0,
    saturation_strength: 0,
    sad_offset: 0,
    sad_thresh: 0,
    sad_slope: 0,
    curves: [PfCurve {
        slope: 0,
        offset: 0,
        thresh: 0,
    }; PF_CURVE_COUNT],
    debug_sel: 0,
    radial_centre_x: 0,
    radial_centre_y: 0,
    radial_off_center_mult: 0,
    radial_lut: [0; RADIAL_LUT_SIZE],
};

const CROP_RESET: CropRegs = CropRegs {
    enable: false,
    start_x: 0,
    start_y: 0,
    size_x: 0,
    size_y: 0,
};

const SCALER_RESET: ScalerRegs = ScalerRegs {
    enable: false,
    width: 0,
    height: 0,
    image_resize_width: 0,
    image_resize_height: 0,
    hfilt_tinc: 1 << 20,
    vfilt_tinc: 1 << 20,
    hfilt_coefset: 0,
    vfilt_coefset: 0,
};

const YUV_RESET: YuvRegs = YuvRegs {
    enable: false,
    coefficients: [0; 9],
    offsets: [0; 3],
};

const DMA_RESET: DmaRegs = DmaRegs {
    enable: false,
    format: 0,
    active_width: 0,
    active_height: 0,
    line_offset: 0,
    base_address: 0,
    vflip: false,
    frame_write_cancel: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_gamma_is_a_full_scale_ramp() {
        let regs = IspRegisters::new();
        assert_eq!(regs.gamma[0], 0);
        assert_eq!(regs.gamma[GAMMA_SIZE - 1], GAMMA_MAX);
        assert!(regs.gamma.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn default_sinter_block_matches_reset_state() {
        let sinter = SinterRegs::default();
        assert_eq!(sinter, IspRegisters::new().sinter);
        assert!(sinter.radial_lut.iter().all(|&value| value == 0));
    }
}
