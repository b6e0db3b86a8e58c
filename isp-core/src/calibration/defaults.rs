//! Calibration shipped with the dummy sensor.
//!
//! Enough tables to run every algorithm end to end on a bench or in the
//! emulator. Values are tuned for a generic 12-bit Bayer sensor rather than a
//! particular part.

use crate::machines::IsoBaseGains;
use crate::math::{ModulationEntry, sqrt32};
use crate::regs::{GAMMA_MAX, GAMMA_SIZE};

use super::{CalibrationError, CalibrationId, CalibrationSet};

/// Gains the `SYSTEM_ISO_GAIN` override scales from.
pub const DEFAULT_ISO_BASE_GAINS: IsoBaseGains = IsoBaseGains {
    again: 0x100,
    dgain: 0x100,
    isp_dgain: 0x100,
};

/// `CMOS_CONTROL`, in [`CmosField`](crate::machines::CmosField) order. Gains are
/// log2 with five fractional bits; zero ceilings take the sensor limit.
pub const CMOS_CONTROL: [u32; 18] = [
    0, 50, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 0x80, 16, 0, 0, 0, 0, 0, 0,
];

/// `AE_CONTROL`: pi coefficient, target point, tail weight, long clip, error
/// averaging, high tail percentage and point, Iridix global gain, tolerance.
pub const AE_CONTROL: [u32; 9] = [64, 220, 64, 0, 8, 5, 95, 0, 4];

/// `AF_LMS`: lens positions (infinity to macro, 8.8), then search parameters.
pub const AF_LMS: [u32; 21] = [
    0, 0x0800, 0x1000, 0x1000, 0x1800, 0x2000, 0xD000, 0xD800, 0xE000, 0xE800, 0xF000, 0xF800,
    11, 2, 2, 0x20, 90, 25, 40, 8, 0,
];

/// `AWB` temperature curve: kelvin, R/G and B/G gray-point positions.
const COLOR_TEMP: [u16; 4] = [2850, 4000, 5000, 6500];
const CT_RG_POS_CALC: [u16; 4] = [0x1A0, 0x140, 0x110, 0x0E0];
const CT_BG_POS_CALC: [u16; 4] = [0x090, 0x0C0, 0x0E0, 0x110];

/// Per-illuminant colour correction, row-major sign-magnitude 8.8.
const CCM_A: [u16; 9] = [
    0x01A0, 0x8060, 0x8040, 0x8030, 0x0150, 0x8020, 0x0010, 0x8090, 0x0180,
];
const CCM_D40: [u16; 9] = [
    0x0180, 0x8050, 0x8030, 0x8028, 0x0140, 0x8018, 0x0008, 0x8070, 0x0168,
];
const CCM_D50: [u16; 9] = [
    0x0170, 0x8048, 0x8028, 0x8020, 0x0138, 0x8018, 0x0004, 0x8060, 0x015C,
];

/// `RGB2YUV_CONVERSION`: BT.709 limited range, sign-magnitude 8.8, then offsets.
const RGB2YUV: [u16; 12] = [
    47, 157, 16, 0x801A, 0x8057, 112, 112, 0x8066, 0x800A, 0x040, 0x200, 0x200,
];

/// `SHARP_*_CONFIG`: undershoot, clip min/max, luma thresholds and slopes.
const SHARP_CONFIG: [u16; 7] = [0x10, 10, 900, 100, 800, 3, 4];

/// `SINTER_RADIAL_PARAMS`: enable, centre x/y, off-centre multiplier.
const SINTER_RADIAL_PARAMS: [u16; 4] = [0, 960, 540, 0x2000];

/// `PF_CONFIG`: colour-corrected input flag, hue/sat/luma/purple strengths,
/// saturation strength, SAD offset, nine slope/offset/threshold curves and the
/// debug selector.
const PF_CONFIG: [u16; 35] = [
    1, 0x0800, 0x0800, 0x0800, 0x0C00, 0x80, 0x0010,
    0x0400, 0x0000, 0x0200, 0x0400, 0x0000, 0x0C00,
    0x0400, 0x0000, 0x0100, 0x0400, 0x0000, 0x0E00,
    0x0400, 0x0000, 0x0080, 0x0400, 0x0000, 0x0C00,
    0x0400, 0x0000, 0x0200, 0x0400, 0x0000, 0x0E00,
    0x0400, 0x0000, 0x0800,
    0,
];

/// `PF_RADIAL_PARAMS`: centre x/y, off-centre multiplier.
const PF_RADIAL_PARAMS: [u16; 3] = [960, 540, 0x2000];

const NOISE_PROFILE: [u8; 8] = [12, 16, 20, 24, 28, 32, 36, 40];

/// `GAMMA_THRESHOLD`: exposure log2 (18 fractional bits) of the low and high curve.
const GAMMA_THRESHOLD: [u32; 2] = [12 << 18, 18 << 18];

const fn knots<const N: usize>(points: [(u16, u16); N]) -> [ModulationEntry; N] {
    let mut out = [ModulationEntry::new(0, 0); N];
    let mut i = 0;
    while i < N {
        out[i] = ModulationEntry::new(points[i].0, points[i].1);
        i += 1;
    }
    out
}

/// Curves over total gain, log2 in 8.8.
const SINTER_STRENGTH: [ModulationEntry; 4] =
    knots([(0, 20), (0x0200, 40), (0x0400, 80), (0x0600, 120)]);
const SINTER_STRENGTH1: [ModulationEntry; 3] = knots([(0, 64), (0x0400, 128), (0x0600, 200)]);
const SINTER_STRENGTH_MC_CONTRAST: [ModulationEntry; 2] = knots([(0, 0), (0x0400, 0)]);
const SINTER_THRESH1: [ModulationEntry; 2] = knots([(0, 0), (0x0600, 16)]);
const SINTER_THRESH4: [ModulationEntry; 2] = knots([(0, 0), (0x0600, 24)]);
const SINTER_INTCONFIG: [ModulationEntry; 2] = knots([(0, 4), (0x0600, 12)]);
const TEMPER_STRENGTH: [ModulationEntry; 3] = knots([(0, 100), (0x0400, 120), (0x0600, 140)]);
const CNR_UV_DELTA12_SLOPE: [ModulationEntry; 2] = knots([(0, 1500), (0x0600, 3000)]);
const DP_SLOPE: [ModulationEntry; 2] = knots([(0, 170), (0x0600, 1800)]);
const DP_THRESHOLD: [ModulationEntry; 2] = knots([(0, 64), (0x0600, 200)]);
const STITCHING_LM_NP: [ModulationEntry; 2] = knots([(0, 540), (0x0600, 2000)]);
const STITCHING_LM_MOV_MULT: [ModulationEntry; 2] = knots([(0, 128), (0x0600, 0)]);
const STITCHING_LM_MED_NOISE_INTENSITY: [ModulationEntry; 2] = knots([(0, 32), (0x0600, 32)]);
const SHARP_ALT_D: [ModulationEntry; 3] = knots([(0, 60), (0x0400, 40), (0x0600, 20)]);
const SHARP_ALT_UD: [ModulationEntry; 3] = knots([(0, 50), (0x0400, 30), (0x0600, 10)]);
const SHARP_ALT_DU: [ModulationEntry; 3] = knots([(0, 70), (0x0400, 50), (0x0600, 30)]);
const DEMOSAIC_UU_SLOPE: [ModulationEntry; 2] = knots([(0, 180), (0x0600, 120)]);
const DEMOSAIC_UU_SH_SLOPE: [ModulationEntry; 2] = knots([(0, 160), (0x0600, 100)]);
const DEMOSAIC_FC_SLOPE: [ModulationEntry; 2] = knots([(0, 128), (0x0600, 128)]);
const SHARPEN_FR: [ModulationEntry; 3] = knots([(0, 60), (0x0400, 40), (0x0600, 20)]);
const SHARPEN_DS1: [ModulationEntry; 3] = knots([(0, 50), (0x0400, 30), (0x0600, 15)]);
const PF_SAD_THRESH: [ModulationEntry; 2] = knots([(0, 0x0100), (0x0600, 0x0400)]);
const PF_SAD_SLOPE: [ModulationEntry; 2] = knots([(0, 0x0800), (0x0600, 0x0200)]);
const SATURATION_STRENGTH: [ModulationEntry; 3] = knots([(0, 128), (0x0400, 110), (0x0600, 80)]);
const MESH_SHADING_STRENGTH: [ModulationEntry; 2] = knots([(0, 4096), (0x0600, 2048)]);
const AWB_BG_MAX_GAIN: [ModulationEntry; 2] = knots([(0, 0x0200), (0x0600, 0x0180)]);
const AE_CONTROL_HDR_TARGET: [ModulationEntry; 2] = knots([(0, 30), (0x0600, 16)]);

/// Gamma with exponent `1/2^k` built from repeated square roots, full scale at the top.
fn root_gamma(roots: u32) -> [u16; GAMMA_SIZE] {
    let top = u32::try_from(GAMMA_SIZE - 1).unwrap_or(1);
    core::array::from_fn(|index| {
        // Scale to 2^24 so every root keeps enough precision.
        let mut value = u32::try_from(index).unwrap_or(0) * (1 << 24) / top;
        for _ in 0..roots {
            value = sqrt32(value) << 12;
        }
        u16::try_from(u64::from(value) * u64::from(GAMMA_MAX) >> 24).unwrap_or(GAMMA_MAX)
    })
}

/// Builds the dummy sensor's calibration set.
pub fn dummy_calibrations() -> Result<CalibrationSet, CalibrationError> {
    let mut set = CalibrationSet::new();

    set.insert_u32(CalibrationId::CMOS_CONTROL, &CMOS_CONTROL)?;
    set.insert_u32(CalibrationId::AE_CONTROL, &AE_CONTROL)?;
    set.insert_modulation(CalibrationId::AE_CONTROL_HDR_TARGET, &AE_CONTROL_HDR_TARGET)?;
    set.insert_u16(CalibrationId::AE_EXPOSURE_CORRECTION, &[0, 0x0C00, 0x1400])?;
    set.insert_u16(CalibrationId::AE_CORRECTION, &[128, 128, 112])?;

    set.insert_u16(CalibrationId::COLOR_TEMP, &COLOR_TEMP)?;
    set.insert_u16(CalibrationId::CT_RG_POS_CALC, &CT_RG_POS_CALC)?;
    set.insert_u16(CalibrationId::CT_BG_POS_CALC, &CT_BG_POS_CALC)?;
    set.insert_u8(CalibrationId::AWB_AVG_COEF, &[4])?;
    set.insert_modulation(CalibrationId::AWB_BG_MAX_GAIN, &AWB_BG_MAX_GAIN)?;

    set.insert_u32(CalibrationId::AF_LMS, &AF_LMS)?;
    set.insert_u16(CalibrationId::AF_INPUT_ROI, &[0, 0, 0, 0])?;
    set.insert_u8(
        CalibrationId::AF_ZONE_WGHT_HOR,
        &[0, 0, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 0, 0],
    )?;
    set.insert_u8(
        CalibrationId::AF_ZONE_WGHT_VER,
        &[0, 0, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 0, 0],
    )?;

    set.insert_u16_matrix(CalibrationId::MT_ABSOLUTE_LS_A_CCM, 3, 3, &CCM_A)?;
    set.insert_u16_matrix(CalibrationId::MT_ABSOLUTE_LS_D40_CCM, 3, 3, &CCM_D40)?;
    set.insert_u16_matrix(CalibrationId::MT_ABSOLUTE_LS_D50_CCM, 3, 3, &CCM_D50)?;
    set.insert_modulation(CalibrationId::SATURATION_STRENGTH, &SATURATION_STRENGTH)?;
    set.insert_u16(CalibrationId::CCM_ONE_GAIN_THRESHOLD, &[0x0700])?;
    set.insert_modulation(CalibrationId::MESH_SHADING_STRENGTH, &MESH_SHADING_STRENGTH)?;

    set.insert_u8(CalibrationId::IRIDIX_AVG_COEF, &[15])?;
    set.insert_u8(CalibrationId::IRIDIX_STRENGTH_MAXIMUM, &[255])?;
    set.insert_u8(CalibrationId::IRIDIX_MIN_MAX_STR, &[0])?;
    set.insert_u32(CalibrationId::IRIDIX_EV_LIM_FULL_STR, &[0x1800])?;
    set.insert_u32(CalibrationId::IRIDIX_EV_LIM_NO_STR, &[0x0800])?;
    set.insert_u16(
        CalibrationId::IRIDIX8_STRENGTH_DK_ENH_CONTROL,
        &[
            15, 95, 2000, 30_000, 0, 0, 0, 0, 0, 0, 0, 0x100, 0x200, 0x180,
        ],
    )?;

    set.insert_modulation(CalibrationId::SINTER_STRENGTH, &SINTER_STRENGTH)?;
    set.insert_modulation(CalibrationId::SINTER_STRENGTH1, &SINTER_STRENGTH1)?;
    set.insert_modulation(
        CalibrationId::SINTER_STRENGTH_MC_CONTRAST,
        &SINTER_STRENGTH_MC_CONTRAST,
    )?;
    set.insert_modulation(CalibrationId::SINTER_THRESH1, &SINTER_THRESH1)?;
    set.insert_modulation(CalibrationId::SINTER_THRESH4, &SINTER_THRESH4)?;
    set.insert_modulation(CalibrationId::SINTER_INTCONFIG, &SINTER_INTCONFIG)?;
    set.insert_u8(CalibrationId::SINTER_RADIAL_LUT, &[0; 33])?;
    set.insert_u16(CalibrationId::SINTER_RADIAL_PARAMS, &SINTER_RADIAL_PARAMS)?;
    set.insert_u8(CalibrationId::NOISE_PROFILE, &NOISE_PROFILE)?;
    set.insert_modulation(CalibrationId::TEMPER_STRENGTH, &TEMPER_STRENGTH)?;
    set.insert_modulation(CalibrationId::CNR_UV_DELTA12_SLOPE, &CNR_UV_DELTA12_SLOPE)?;
    set.insert_modulation(CalibrationId::DP_SLOPE, &DP_SLOPE)?;
    set.insert_modulation(CalibrationId::DP_THRESHOLD, &DP_THRESHOLD)?;
    set.insert_modulation(CalibrationId::STITCHING_LM_NP, &STITCHING_LM_NP)?;
    set.insert_modulation(CalibrationId::STITCHING_LM_MOV_MULT, &STITCHING_LM_MOV_MULT)?;
    set.insert_modulation(
        CalibrationId::STITCHING_LM_MED_NOISE_INTENSITY,
        &STITCHING_LM_MED_NOISE_INTENSITY,
    )?;
    set.insert_u16(CalibrationId::FS_MC_OFF, &[0x0500])?;

    set.insert_u16(CalibrationId::SHARP_FR_CONFIG, &SHARP_CONFIG)?;
    set.insert_u16(CalibrationId::SHARP_DS1_CONFIG, &SHARP_CONFIG)?;
    set.insert_modulation(CalibrationId::SHARP_ALT_D, &SHARP_ALT_D)?;
    set.insert_modulation(CalibrationId::SHARP_ALT_UD, &SHARP_ALT_UD)?;
    set.insert_modulation(CalibrationId::SHARP_ALT_DU, &SHARP_ALT_DU)?;
    set.insert_modulation(CalibrationId::DEMOSAIC_UU_SLOPE, &DEMOSAIC_UU_SLOPE)?;
    set.insert_modulation(CalibrationId::DEMOSAIC_UU_SH_SLOPE, &DEMOSAIC_UU_SH_SLOPE)?;
    set.insert_modulation(CalibrationId::DEMOSAIC_FC_SLOPE, &DEMOSAIC_FC_SLOPE)?;
    set.insert_modulation(CalibrationId::SHARPEN_FR, &SHARPEN_FR)?;
    set.insert_modulation(CalibrationId::SHARPEN_DS1, &SHARPEN_DS1)?;

    set.insert_u16(CalibrationId::PF_CONFIG, &PF_CONFIG)?;
    set.insert_u8(CalibrationId::PF_RADIAL_LUT, &[0; 33])?;
    set.insert_u16(CalibrationId::PF_RADIAL_PARAMS, &PF_RADIAL_PARAMS)?;
    set.insert_modulation(CalibrationId::PF_SAD_THRESH, &PF_SAD_THRESH)?;
    set.insert_modulation(CalibrationId::PF_SAD_SLOPE, &PF_SAD_SLOPE)?;

    set.insert_u16(CalibrationId::RGB2YUV_CONVERSION, &RGB2YUV)?;

    set.insert_u16(CalibrationId::GAMMA, &root_gamma(1))?;
    set.insert_u16(CalibrationId::GAMMA_EV1, &root_gamma(2))?;
    set.insert_u16(CalibrationId::GAMMA_EV2, &root_gamma(1))?;
    set.insert_u32(CalibrationId::GAMMA_THRESHOLD, &GAMMA_THRESHOLD)?;

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines::{CmosControl, CmosField, LensParams};

    #[test]
    fn dummy_set_fits_the_arena() {
        let set = dummy_calibrations().expect("defaults fit");
        assert!(set.contains(CalibrationId::GAMMA));
        assert!(set.contains(CalibrationId::AF_LMS));
        assert_eq!(set.rows(CalibrationId::SINTER_STRENGTH), 4);
    }

    #[test]
    fn cmos_block_matches_field_order() {
        let set = dummy_calibrations().expect("defaults fit");
        let control = CmosControl::from_calibration(&set);
        assert_eq!(control.get(CmosField::AntiFlickerFrequency), 50);
        assert_eq!(control.get(CmosField::MaxExposureRatio), 16);
        assert!(!control.is_set(CmosField::ManualIntegrationTime));
    }

    #[test]
    fn lens_table_describes_a_usable_range() {
        let set = dummy_calibrations().expect("defaults fit");
        assert!(LensParams::from_calibration(&set).is_some());
    }

    #[test]
    fn gamma_curves_are_monotonic_and_full_scale() {
        for curve in [root_gamma(1), root_gamma(2)] {
            assert_eq!(curve[0], 0);
            assert!(curve[GAMMA_SIZE - 1] >= GAMMA_MAX - 2);
            assert!(curve.windows(2).all(|pair| pair[0] <= pair[1]));
        }
        assert!(root_gamma(2)[16] > root_gamma(1)[16]);
    }
}
