//! Numeric identifiers of the command surface.
//!
//! Values are part of the host protocol and never change.

/// Protocol revision reported by `FW_REVISION`.
pub const API_VERSION: u32 = 0x64;

// Command types.
pub const TGENERAL: u8 = 0x00;
pub const TSELFTEST: u8 = 0x01;
pub const TSENSOR: u8 = 0x02;
pub const TLENS: u8 = 0x03;
pub const TSYSTEM: u8 = 0x04;
pub const TISP_MODULES: u8 = 0x05;
pub const TSTATUS: u8 = 0x06;
pub const TIMAGE: u8 = 0x08;
pub const TALGORITHMS: u8 = 0x09;
pub const TSCENE_MODES: u8 = 0x0A;
pub const TREGISTERS: u8 = 0x0B;
pub const TMONITOR: u8 = 0x0C;

// TGENERAL
pub const CONTEXT_NUMBER: u8 = 0x00;
pub const ACTIVE_CONTEXT: u8 = 0x01;

// TSELFTEST
pub const FW_REVISION: u8 = 0x02;

// TSENSOR
pub const SENSOR_STREAMING: u8 = 0x03;
pub const SENSOR_SUPPORTED_PRESETS: u8 = 0x04;
pub const SENSOR_PRESET: u8 = 0x05;
pub const SENSOR_WDR_MODE: u8 = 0x06;
pub const SENSOR_FPS: u8 = 0x07;
pub const SENSOR_WIDTH: u8 = 0x08;
pub const SENSOR_HEIGHT: u8 = 0x09;
pub const SENSOR_EXPOSURES: u8 = 0x0A;
pub const SENSOR_INFO_PRESET: u8 = 0x0B;
pub const SENSOR_INFO_WDR_MODE: u8 = 0x0C;
pub const SENSOR_INFO_FPS: u8 = 0x0D;
pub const SENSOR_INFO_WIDTH: u8 = 0x0E;
pub const SENSOR_INFO_HEIGHT: u8 = 0x0F;
pub const SENSOR_INFO_BITS: u8 = 0x10;
pub const SENSOR_INFO_EXPOSURES: u8 = 0x11;
pub const SENSOR_LINES_PER_SECOND: u8 = 0x12;
pub const SENSOR_INTEGRATION_TIME_MIN: u8 = 0x13;
pub const SENSOR_INTEGRATION_TIME_LIMIT: u8 = 0x14;
pub const SENSOR_INFO_PHYSICAL_WIDTH: u8 = 0x15;
pub const SENSOR_INFO_PHYSICAL_HEIGHT: u8 = 0x16;

// TLENS
pub const LENS_INFO_MINFOCUS_DISTANCE: u8 = 0x17;
pub const LENS_INFO_HYPERFOCAL_DISTANCE: u8 = 0x18;
pub const LENS_INFO_FOCAL_LENGTH: u8 = 0x19;
pub const LENS_INFO_APERTURE: u8 = 0x1A;

// TSYSTEM
pub const SYSTEM_LOGGER_LEVEL: u8 = 0x1B;
pub const SYSTEM_LOGGER_MASK: u8 = 0x1C;
pub const BUFFER_DATA_TYPE: u8 = 0x1D;
pub const TEST_PATTERN_ENABLE: u8 = 0x1E;
pub const TEST_PATTERN_MODE: u8 = 0x1F;
pub const M2M_PROCESS_REQUEST: u8 = 0x20;
pub const TEMPER4_MODE: u8 = 0x21;
pub const TEMPER4_COMPRESS_PIXEL: u8 = 0x22;
pub const TEMPER4_COMPRESS_META: u8 = 0x23;
pub const SYSTEM_FREEZE_FIRMWARE: u8 = 0x24;
pub const SYSTEM_MANUAL_EXPOSURE: u8 = 0x25;
pub const SYSTEM_MANUAL_EXPOSURE_RATIO: u8 = 0x26;
pub const SYSTEM_MANUAL_INTEGRATION_TIME: u8 = 0x27;
pub const SYSTEM_MANUAL_MAX_INTEGRATION_TIME: u8 = 0x28;
pub const SYSTEM_MANUAL_SENSOR_ANALOG_GAIN: u8 = 0x29;
pub const SYSTEM_MANUAL_SENSOR_DIGITAL_GAIN: u8 = 0x2A;
pub const SYSTEM_MANUAL_ISP_DIGITAL_GAIN: u8 = 0x2B;
pub const SYSTEM_MANUAL_AWB: u8 = 0x2C;
pub const SYSTEM_MANUAL_CCM: u8 = 0x2D;
pub const SYSTEM_MANUAL_SATURATION: u8 = 0x2E;
pub const SYSTEM_EXPOSURE: u8 = 0x2F;
pub const SYSTEM_EXPOSURE_RATIO: u8 = 0x30;
pub const SYSTEM_MAX_EXPOSURE_RATIO: u8 = 0x31;
pub const SYSTEM_INTEGRATION_TIME: u8 = 0x32;
pub const SYSTEM_LONG_INTEGRATION_TIME: u8 = 0x33;
pub const SYSTEM_SHORT_INTEGRATION_TIME: u8 = 0x34;
pub const SYSTEM_MAX_INTEGRATION_TIME: u8 = 0x35;
pub const SYSTEM_SENSOR_ANALOG_GAIN: u8 = 0x36;
pub const SYSTEM_MAX_SENSOR_ANALOG_GAIN: u8 = 0x37;
pub const SYSTEM_SENSOR_DIGITAL_GAIN: u8 = 0x38;
pub const SYSTEM_MAX_SENSOR_DIGITAL_GAIN: u8 = 0x39;
pub const SYSTEM_ISP_DIGITAL_GAIN: u8 = 0x3A;
pub const SYSTEM_MAX_ISP_DIGITAL_GAIN: u8 = 0x3B;
pub const SYSTEM_AWB_RED_GAIN: u8 = 0x3C;
pub const SYSTEM_AWB_GREEN_EVEN_GAIN: u8 = 0x3D;
pub const SYSTEM_AWB_GREEN_ODD_GAIN: u8 = 0x3E;
pub const SYSTEM_AWB_BLUE_GAIN: u8 = 0x3F;
/// First of the nine `SYSTEM_CCM_MATRIX_*` ids, row-major `RR..BB`.
pub const SYSTEM_CCM_MATRIX_RR: u8 = 0x40;
pub const SYSTEM_CCM_MATRIX_BB: u8 = 0x48;
pub const SYSTEM_SATURATION_TARGET: u8 = 0x49;
pub const SYSTEM_ANTIFLICKER_ENABLE: u8 = 0x4A;
pub const SYSTEM_ANTI_FLICKER_FREQUENCY: u8 = 0x4B;
pub const SYSTEM_DYNAMIC_GAMMA_ENABLE: u8 = 0x4C;
pub const CALIBRATION_UPDATE: u8 = 0x4D;
/// Integration-priority split selection; absent from the numbered range.
pub const SYSTEM_EXPOSURE_PRIORITY: u8 = 0xC0;
/// ISO-style total gain target; absent from the numbered range.
pub const SYSTEM_ISO_GAIN: u8 = 0xC1;

// TISP_MODULES
pub const ISP_MODULES_MANUAL_IRIDIX: u8 = 0x4E;
pub const ISP_MODULES_MANUAL_SINTER: u8 = 0x4F;
pub const ISP_MODULES_MANUAL_TEMPER: u8 = 0x50;
pub const ISP_MODULES_MANUAL_AUTO_LEVEL: u8 = 0x51;
pub const ISP_MODULES_MANUAL_FRAME_STITCH: u8 = 0x52;
pub const ISP_MODULES_MANUAL_RAW_FRONTEND: u8 = 0x53;
pub const ISP_MODULES_MANUAL_BLACK_LEVEL: u8 = 0x54;
pub const ISP_MODULES_MANUAL_SHADING: u8 = 0x55;
pub const ISP_MODULES_MANUAL_DEMOSAIC: u8 = 0x56;
pub const ISP_MODULES_MANUAL_CNR: u8 = 0x57;
pub const ISP_MODULES_MANUAL_SHARPEN: u8 = 0x58;

// TSTATUS
pub const STATUS_INFO_EXPOSURE_LOG2: u8 = 0x59;
pub const STATUS_INFO_GAIN_ONES: u8 = 0x5A;
pub const STATUS_INFO_GAIN_LOG2: u8 = 0x5B;
pub const STATUS_INFO_AWB_MIX_LIGHT_CONTRAST: u8 = 0x5C;
pub const STATUS_INFO_AF_LENS_POS: u8 = 0x5D;
pub const STATUS_INFO_AF_FOCUS_VALUE: u8 = 0x5E;

// TIMAGE
pub const DMA_READER_OUTPUT: u8 = 0x66;
pub const FR_FORMAT_BASE_PLANE: u8 = 0x67;
pub const FR_RAW_BYPASS: u8 = 0x68;
pub const FR_FPS_THROTTLE_FACTOR: u8 = 0x69;
pub const DS1_FORMAT_BASE_PLANE: u8 = 0x6A;
pub const DS1_FPS_THROTTLE_FACTOR: u8 = 0x6B;
pub const ORIENTATION_VFLIP: u8 = 0x6C;
pub const IMAGE_RESIZE_TYPE: u8 = 0x6D;
pub const IMAGE_RESIZE_ENABLE: u8 = 0x6E;
pub const IMAGE_RESIZE_WIDTH: u8 = 0x6F;
pub const IMAGE_RESIZE_HEIGHT: u8 = 0x70;
pub const IMAGE_CROP_XOFFSET: u8 = 0x71;
pub const IMAGE_CROP_YOFFSET: u8 = 0x72;

// TALGORITHMS
pub const AF_LENS_STATUS: u8 = 0x73;
pub const AF_MODE: u8 = 0x74;
pub const AF_STATE: u8 = 0x75;
pub const CAF_STATE: u8 = 0x76;
pub const AF_ROI: u8 = 0x77;
pub const AF_MANUAL_CONTROL: u8 = 0x78;
pub const AE_MODE: u8 = 0x79;
pub const AE_STATE: u8 = 0x7A;
pub const AE_SPLIT_PRESET: u8 = 0x7B;
pub const AE_GAIN: u8 = 0x7C;
pub const AE_EXPOSURE: u8 = 0x7D;
pub const AE_ROI: u8 = 0x7E;
pub const AE_COMPENSATION: u8 = 0x7F;
pub const AWB_MODE: u8 = 0x80;
pub const AWB_STATE: u8 = 0x81;
pub const AWB_TEMPERATURE: u8 = 0x82;
pub const NOISE_REDUCTION_MODE: u8 = 0x83;

// TSCENE_MODES
pub const COLOR_MODE: u8 = 0x84;
pub const BRIGHTNESS_STRENGTH: u8 = 0x85;
pub const CONTRAST_STRENGTH: u8 = 0x86;
pub const SATURATION_STRENGTH: u8 = 0x87;
pub const SHARPENING_STRENGTH: u8 = 0x88;
pub const SHADING_STRENGTH: u8 = 0x89;
pub const HUE_THETA: u8 = 0x8A;

// TREGISTERS
pub const REGISTERS_ADDRESS: u8 = 0x8B;
pub const REGISTERS_SIZE: u8 = 0x8C;
pub const REGISTERS_SOURCE: u8 = 0x8D;
pub const REGISTERS_VALUE: u8 = 0x8E;

// TMONITOR
pub const MON_ERROR_CALIBRATION_LUT_NULL: u8 = 0x8F;
pub const MON_ERROR_CMOS_FS_DELAY: u8 = 0x90;
pub const MON_ERROR_CMOS_UPDATE_NOT_IN_VB: u8 = 0x91;
pub const MON_ERROR_CMOS_UPDATE_DGAIN_WRONG_TIMING: u8 = 0x92;
pub const MON_ERROR_IRIDIX_UPDATE_NOT_IN_VB: u8 = 0x93;
/// First id of the AE status block; AWB, gamma and Iridix follow.
pub const MON_STATUS_AE_RESET: u8 = 0x94;
/// Ids per algorithm block: reset followed by nine latency fields.
pub const MON_STATUS_BLOCK_LEN: u8 = 10;
pub const MON_STATUS_IRIDIX_DELAY_TARGET2APPLY_MAX: u8 = 0xBB;

// Values.
pub const OFF: u32 = 0;
pub const ON: u32 = 1;
pub const DISABLE: u32 = 0;
pub const ENABLE: u32 = 1;
pub const RUN: u32 = 0;
pub const DONE: u32 = 1;
pub const UPDATE: u32 = 0;
pub const LENS_SUCCESS: u32 = 0;
pub const LENS_FAILED: u32 = 1;
pub const NOISE_REDUCTION_OFF: u32 = 0;
pub const NOISE_REDUCTION_ON: u32 = 1;
/// Saturation applied with the vivid colour mode.
pub const SATURATION_VIVID: u32 = 154;
pub const SATURATION_NEUTRAL: u32 = 128;

// Buffer types.
pub const STATIC_CALIBRATIONS: u8 = 0;
pub const DYNAMIC_CALIBRATIONS: u8 = 1;
pub const FILE_TRANSFER: u8 = 2;
pub const DYNAMIC_STATE: u8 = 3;
