//! Stable numeric identifiers of the calibration tables.

use core::fmt;

/// Index of a calibration table inside a [`CalibrationSet`](super::CalibrationSet).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CalibrationId(u8);

/// Number of calibration slots per context.
pub const CALIBRATION_TOTAL_SIZE: usize = 127;

impl CalibrationId {
    pub const LIGHT_SRC: Self = Self(0x00);
    pub const RG_POS: Self = Self(0x01);
    pub const BG_POS: Self = Self(0x02);
    pub const MESH_RGBG_WEIGHT: Self = Self(0x03);
    pub const MESH_LS_WEIGHT: Self = Self(0x04);
    pub const MESH_COLOR_TEMPERATURE: Self = Self(0x05);
    pub const WB_STRENGTH: Self = Self(0x06);
    pub const SKY_LUX_TH: Self = Self(0x07);
    pub const CT_RG_POS_CALC: Self = Self(0x08);
    pub const CT_BG_POS_CALC: Self = Self(0x09);
    pub const COLOR_TEMP: Self = Self(0x0A);
    pub const CT65POS: Self = Self(0x0B);
    pub const CT40POS: Self = Self(0x0C);
    pub const CT30POS: Self = Self(0x0D);
    pub const EVTOLUX_EV_LUT: Self = Self(0x0E);
    pub const EVTOLUX_LUX_LUT: Self = Self(0x0F);
    pub const BLACK_LEVEL_R: Self = Self(0x10);
    pub const BLACK_LEVEL_GR: Self = Self(0x11);
    pub const BLACK_LEVEL_GB: Self = Self(0x12);
    pub const BLACK_LEVEL_B: Self = Self(0x13);
    pub const STATIC_WB: Self = Self(0x14);
    pub const MT_ABSOLUTE_LS_A_CCM: Self = Self(0x15);
    pub const MT_ABSOLUTE_LS_D40_CCM: Self = Self(0x16);
    pub const MT_ABSOLUTE_LS_D50_CCM: Self = Self(0x17);
    pub const SHADING_LS_A_R: Self = Self(0x18);
    pub const SHADING_LS_A_G: Self = Self(0x19);
    pub const SHADING_LS_A_B: Self = Self(0x1A);
    pub const SHADING_LS_TL84_R: Self = Self(0x1B);
    pub const SHADING_LS_TL84_G: Self = Self(0x1C);
    pub const SHADING_LS_TL84_B: Self = Self(0x1D);
    pub const SHADING_LS_D65_R: Self = Self(0x1E);
    pub const SHADING_LS_D65_G: Self = Self(0x1F);
    pub const SHADING_LS_D65_B: Self = Self(0x20);
    pub const AWB_WARMING_LS_A: Self = Self(0x21);
    pub const AWB_WARMING_LS_D50: Self = Self(0x22);
    pub const AWB_WARMING_LS_D75: Self = Self(0x23);
    pub const AWB_WARMING_CCT: Self = Self(0x24);
    pub const NOISE_PROFILE: Self = Self(0x25);
    pub const DEMOSAIC: Self = Self(0x26);
    pub const GAMMA: Self = Self(0x27);
    pub const IRIDIX_ASYMMETRY: Self = Self(0x28);
    pub const AWB_SCENE_PRESETS: Self = Self(0x29);
    pub const WDR_NP_LUT: Self = Self(0x2A);
    pub const DECOMPANDER0_MEM: Self = Self(0x2B);
    pub const DECOMPANDER1_MEM: Self = Self(0x2C);
    pub const AWB_MIX_LIGHT_PARAMETERS: Self = Self(0x2D);
    pub const SCALER_H_FILTER: Self = Self(0x2E);
    pub const SCALER_V_FILTER: Self = Self(0x2F);
    pub const STITCHING_LM_MED_NOISE_INTENSITY: Self = Self(0x30);
    pub const AWB_COLOUR_PREFERENCE: Self = Self(0x31);
    pub const PF_CONFIG: Self = Self(0x32);
    pub const PF_RADIAL_LUT: Self = Self(0x33);
    pub const PF_RADIAL_PARAMS: Self = Self(0x34);
    pub const SINTER_RADIAL_LUT: Self = Self(0x35);
    pub const SINTER_RADIAL_PARAMS: Self = Self(0x36);
    pub const AWB_BG_MAX_GAIN: Self = Self(0x37);
    pub const IRIDIX8_STRENGTH_DK_ENH_CONTROL: Self = Self(0x38);
    pub const CMOS_CONTROL: Self = Self(0x39);
    pub const CMOS_EXPOSURE_PARTITION_LUTS: Self = Self(0x3A);
    pub const STATUS_INFO: Self = Self(0x3B);
    pub const AUTO_LEVEL_CONTROL: Self = Self(0x3C);
    pub const DP_SLOPE: Self = Self(0x3D);
    pub const DP_THRESHOLD: Self = Self(0x3E);
    pub const STITCHING_LM_MOV_MULT: Self = Self(0x3F);
    pub const STITCHING_LM_NP: Self = Self(0x40);
    pub const STITCHING_MS_MOV_MULT: Self = Self(0x41);
    pub const STITCHING_MS_NP: Self = Self(0x42);
    pub const STITCHING_SVS_MOV_MULT: Self = Self(0x43);
    pub const STITCHING_SVS_NP: Self = Self(0x44);
    pub const EVTOLUX_PROBABILITY_ENABLE: Self = Self(0x45);
    pub const AWB_AVG_COEF: Self = Self(0x46);
    pub const IRIDIX_AVG_COEF: Self = Self(0x47);
    pub const IRIDIX_STRENGTH_MAXIMUM: Self = Self(0x48);
    pub const IRIDIX_MIN_MAX_STR: Self = Self(0x49);
    pub const IRIDIX_EV_LIM_FULL_STR: Self = Self(0x4A);
    pub const IRIDIX_EV_LIM_NO_STR: Self = Self(0x4B);
    pub const AE_CORRECTION: Self = Self(0x4C);
    pub const AE_EXPOSURE_CORRECTION: Self = Self(0x4D);
    pub const SINTER_STRENGTH: Self = Self(0x4E);
    pub const SINTER_STRENGTH1: Self = Self(0x4F);
    pub const SINTER_THRESH1: Self = Self(0x50);
    pub const SINTER_THRESH4: Self = Self(0x51);
    pub const SINTER_INTCONFIG: Self = Self(0x52);
    pub const SINTER_NOISE_PROFILE_CONFIG: Self = Self(0x53);
    pub const SHARP_FR_CONFIG: Self = Self(0x54);
    pub const SHARP_DS1_CONFIG: Self = Self(0x55);
    pub const CNR_CONFIG: Self = Self(0x56);
    pub const SHARP_ALT_D: Self = Self(0x57);
    pub const SHARP_ALT_UD: Self = Self(0x58);
    pub const SHARP_ALT_DU: Self = Self(0x59);
    pub const DEMOSAIC_CONFIG: Self = Self(0x5A);
    pub const DEMOSAIC_UU_SLOPE: Self = Self(0x5B);
    pub const DEMOSAIC_UU_SH_SLOPE: Self = Self(0x5C);
    pub const MESH_SHADING_STRENGTH: Self = Self(0x5D);
    pub const SATURATION_STRENGTH: Self = Self(0x5E);
    pub const CCM_ONE_GAIN_THRESHOLD: Self = Self(0x5F);
    pub const RGB2YUV_CONVERSION: Self = Self(0x60);
    pub const AWB_ZONE_WGHT_HOR: Self = Self(0x61);
    pub const AWB_ZONE_WGHT_VER: Self = Self(0x62);
    pub const SHARPEN_FR: Self = Self(0x63);
    pub const SHARPEN_DS1: Self = Self(0x64);
    pub const TEMPER_STRENGTH: Self = Self(0x65);
    pub const TEMPER_MOT_THRESH: Self = Self(0x66);
    pub const TEMPER_MOT_SLOPE: Self = Self(0x67);
    pub const TEMPER_NOISE_PROFILE_CONFIG: Self = Self(0x68);
    pub const SINTER_STRENGTH_MC_CONTRAST: Self = Self(0x69);
    pub const EXPOSURE_RATIO_ADJUSTMENT: Self = Self(0x6A);
    pub const CNR_UV_DELTA12_SLOPE: Self = Self(0x6B);
    pub const FS_MC_OFF: Self = Self(0x6C);
    pub const SINTER_SAD: Self = Self(0x6D);
    pub const AF_LMS: Self = Self(0x6E);
    pub const AF_INPUT_ROI: Self = Self(0x6F);
    pub const AF_LMS_EXIT_THRESHOLD: Self = Self(0x70);
    pub const AF_ZONE_WGHT_HOR: Self = Self(0x71);
    pub const AF_ZONE_WGHT_VER: Self = Self(0x72);
    pub const AE_CONTROL_HDR_TARGET: Self = Self(0x73);
    pub const AE_CONTROL: Self = Self(0x74);
    pub const CUSTOM_SETTINGS_CONTEXT: Self = Self(0x75);
    pub const GAMMA_EV1: Self = Self(0x76);
    pub const GAMMA_EV2: Self = Self(0x77);
    pub const GAMMA_THRESHOLD: Self = Self(0x78);
    pub const DEMOSAIC_FC_SLOPE: Self = Self(0x79);
    pub const PF_SAD_THRESH: Self = Self(0x7A);
    pub const PF_SAD_SLOPE: Self = Self(0x7B);
    pub const SINTER_MOTION_OFFSET_0: Self = Self(0x7C);
    pub const SINTER_MOTION_OFFSET_1: Self = Self(0x7D);
    pub const SINTER_MOTION_OFFSET_2: Self = Self(0x7E);

    /// Wraps a raw identifier, rejecting values outside the table range.
    #[must_use]
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < CALIBRATION_TOTAL_SIZE {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Raw identifier.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Slot index inside the calibration set.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates every identifier in slot order.
    pub fn all() -> impl Iterator<Item = CalibrationId> {
        (0..=u8::MAX).map_while(Self::new)
    }
}

impl fmt::Display for CalibrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cal#{:#04x}", self.0)
    }
}
