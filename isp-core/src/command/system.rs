//! `TSYSTEM`, `TISP_MODULES` and `TSTATUS`.

use super::calibration::describe;
use super::ids::{
    BUFFER_DATA_TYPE, CALIBRATION_UPDATE, DONE, ISP_MODULES_MANUAL_AUTO_LEVEL,
    ISP_MODULES_MANUAL_BLACK_LEVEL, ISP_MODULES_MANUAL_CNR, ISP_MODULES_MANUAL_DEMOSAIC,
    ISP_MODULES_MANUAL_FRAME_STITCH, ISP_MODULES_MANUAL_IRIDIX, ISP_MODULES_MANUAL_RAW_FRONTEND,
    ISP_MODULES_MANUAL_SHADING, ISP_MODULES_MANUAL_SHARPEN, ISP_MODULES_MANUAL_SINTER,
    ISP_MODULES_MANUAL_TEMPER, M2M_PROCESS_REQUEST, STATUS_INFO_AF_FOCUS_VALUE,
    STATUS_INFO_AF_LENS_POS, STATUS_INFO_AWB_MIX_LIGHT_CONTRAST, STATUS_INFO_EXPOSURE_LOG2,
    STATUS_INFO_GAIN_LOG2, STATUS_INFO_GAIN_ONES, SYSTEM_ANTI_FLICKER_FREQUENCY,
    SYSTEM_ANTIFLICKER_ENABLE, SYSTEM_AWB_BLUE_GAIN, SYSTEM_AWB_GREEN_EVEN_GAIN,
    SYSTEM_AWB_GREEN_ODD_GAIN, SYSTEM_AWB_RED_GAIN, SYSTEM_CCM_MATRIX_BB, SYSTEM_CCM_MATRIX_RR,
    SYSTEM_DYNAMIC_GAMMA_ENABLE, SYSTEM_EXPOSURE, SYSTEM_EXPOSURE_PRIORITY, SYSTEM_EXPOSURE_RATIO,
    SYSTEM_INTEGRATION_TIME, SYSTEM_ISO_GAIN, SYSTEM_ISP_DIGITAL_GAIN, SYSTEM_LOGGER_LEVEL,
    SYSTEM_LOGGER_MASK, SYSTEM_LONG_INTEGRATION_TIME, SYSTEM_MANUAL_AWB, SYSTEM_MANUAL_CCM,
    SYSTEM_MANUAL_EXPOSURE, SYSTEM_MANUAL_EXPOSURE_RATIO, SYSTEM_MANUAL_INTEGRATION_TIME,
    SYSTEM_MANUAL_ISP_DIGITAL_GAIN, SYSTEM_MANUAL_MAX_INTEGRATION_TIME,
    SYSTEM_MANUAL_SATURATION, SYSTEM_MANUAL_SENSOR_ANALOG_GAIN,
    SYSTEM_MANUAL_SENSOR_DIGITAL_GAIN, SYSTEM_MAX_EXPOSURE_RATIO, SYSTEM_MAX_INTEGRATION_TIME,
    SYSTEM_MAX_ISP_DIGITAL_GAIN, SYSTEM_MAX_SENSOR_ANALOG_GAIN, SYSTEM_MAX_SENSOR_DIGITAL_GAIN,
    SYSTEM_SATURATION_TARGET, SYSTEM_SENSOR_ANALOG_GAIN, SYSTEM_SENSOR_DIGITAL_GAIN,
    SYSTEM_SHORT_INTEGRATION_TIME, TEMPER4_COMPRESS_META, TEMPER4_COMPRESS_PIXEL, TEMPER4_MODE,
    TEST_PATTERN_ENABLE, TEST_PATTERN_MODE, UPDATE,
};
use super::{CommandError, CommandResult, Direction, ErrorValue, get_only, read, write};
use crate::dispatcher::Dispatcher;
use crate::logging::LogLevel;
use crate::machines::{
    AeGet, AeManual, AeSet, AfGet, AwbGet, AwbSet, CmosField, CmosGet, CmosSet, ColorManual,
    ColorMatrixGet, ColorMatrixSet, GeneralGet, GeneralSet, IridixGet, IridixSet,
    NoiseReductionGet, NoiseReductionSet, NrBlock, SharpenBlock, SharpeningGet, SharpeningSet,
    WbChannel,
};
use crate::math::{LOG2_GAIN_SHIFT, exp2_fixed};
use crate::param::{Get, Set};
use crate::regs::TEST_PATTERN_MAX;

/// Boolean flag owned by a machine: `get` reads it, `set` builds the write.
fn manual_flag<const Q: usize, F>(
    context: &mut Dispatcher<Q>,
    direction: Direction,
    value: u32,
    get: Get,
    set: F,
) -> CommandResult
where
    F: FnOnce(bool) -> Set,
{
    match direction {
        Direction::Get => read(context, get),
        Direction::Set => write(context, set(value != 0)),
    }
}

/// Scalar owned by a machine.
fn scalar<const Q: usize, F>(
    context: &mut Dispatcher<Q>,
    direction: Direction,
    value: u32,
    get: Get,
    set: F,
) -> CommandResult
where
    F: FnOnce(u32) -> Set,
{
    match direction {
        Direction::Get => read(context, get),
        Direction::Set => write(context, set(value)),
    }
}

fn cmos_flag<const Q: usize>(
    context: &mut Dispatcher<Q>,
    direction: Direction,
    value: u32,
    field: CmosField,
) -> CommandResult {
    manual_flag(context, direction, value, Get::Cmos(CmosGet::Control(field)), |on| {
        Set::Cmos(CmosSet::Control(field, u32::from(on)))
    })
}

fn cmos_value<const Q: usize>(
    context: &mut Dispatcher<Q>,
    direction: Direction,
    value: u32,
    field: CmosField,
) -> CommandResult {
    scalar(context, direction, value, Get::Cmos(CmosGet::Control(field)), |value| {
        Set::Cmos(CmosSet::Control(field, value))
    })
}

fn color_flag<const Q: usize>(
    context: &mut Dispatcher<Q>,
    direction: Direction,
    value: u32,
    block: ColorManual,
) -> CommandResult {
    manual_flag(
        context,
        direction,
        value,
        Get::ColorMatrix(ColorMatrixGet::Manual(block)),
        |on| Set::ColorMatrix(ColorMatrixSet::Manual(block, on)),
    )
}

fn awb_gain<const Q: usize>(
    context: &mut Dispatcher<Q>,
    direction: Direction,
    value: u32,
    channel: WbChannel,
) -> CommandResult {
    scalar(context, direction, value, Get::Awb(AwbGet::Gain(channel)), |gain| {
        Set::Awb(AwbSet::Gain(channel, gain))
    })
}

pub(super) fn handle<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult {
    match id {
        SYSTEM_LOGGER_LEVEL => match direction {
            Direction::Get => Ok(context.shared().log_level.to_raw()),
            Direction::Set => {
                let level = LogLevel::from_raw(value).ok_or(CommandError::NotSupported)?;
                context.shared_mut().log_level = level;
                Ok(0)
            }
        },
        SYSTEM_LOGGER_MASK => match direction {
            Direction::Get => Ok(context.shared().log_mask),
            Direction::Set => {
                context.shared_mut().log_mask = value;
                Ok(0)
            }
        },
        BUFFER_DATA_TYPE => get_only(direction, || {
            Ok(describe(&context.shared().calibrations, value))
        }),
        TEST_PATTERN_ENABLE => {
            let pattern = &mut context.shared_mut().regs.test_pattern;
            match direction {
                Direction::Get => Ok(u32::from(pattern.enable)),
                Direction::Set => {
                    pattern.enable = value != 0;
                    Ok(0)
                }
            }
        }
        TEST_PATTERN_MODE => {
            let pattern = &mut context.shared_mut().regs.test_pattern;
            match direction {
                Direction::Get => Ok(u32::from(pattern.mode)),
                Direction::Set => {
                    pattern.mode = u8::try_from(value)
                        .ok()
                        .filter(|mode| *mode <= TEST_PATTERN_MAX)
                        .ok_or(CommandError::Fail(ErrorValue::BadArgument))?;
                    Ok(0)
                }
            }
        }
        M2M_PROCESS_REQUEST | TEMPER4_MODE | TEMPER4_COMPRESS_PIXEL | TEMPER4_COMPRESS_META => {
            Err(CommandError::NotSupported)
        }
        SYSTEM_MANUAL_EXPOSURE | SYSTEM_MANUAL_EXPOSURE_RATIO => {
            let manual = if id == SYSTEM_MANUAL_EXPOSURE {
                AeManual::Exposure
            } else {
                AeManual::ExposureRatio
            };
            manual_flag(context, direction, value, Get::Ae(AeGet::Manual(manual)), |on| {
                Set::Ae(AeSet::Manual(manual, on))
            })
        }
        SYSTEM_MANUAL_INTEGRATION_TIME => {
            cmos_flag(context, direction, value, CmosField::ManualIntegrationTime)
        }
        SYSTEM_MANUAL_MAX_INTEGRATION_TIME => {
            cmos_flag(context, direction, value, CmosField::ManualMaxIntegrationTime)
        }
        SYSTEM_MANUAL_SENSOR_ANALOG_GAIN => {
            cmos_flag(context, direction, value, CmosField::ManualSensorAnalogGain)
        }
        SYSTEM_MANUAL_SENSOR_DIGITAL_GAIN => {
            cmos_flag(context, direction, value, CmosField::ManualSensorDigitalGain)
        }
        SYSTEM_MANUAL_ISP_DIGITAL_GAIN => {
            cmos_flag(context, direction, value, CmosField::ManualIspDigitalGain)
        }
        SYSTEM_MANUAL_AWB => manual_flag(context, direction, value, Get::Awb(AwbGet::Manual), |on| {
            Set::Awb(AwbSet::Manual(on))
        }),
        SYSTEM_MANUAL_CCM => color_flag(context, direction, value, ColorManual::Ccm),
        SYSTEM_MANUAL_SATURATION => color_flag(context, direction, value, ColorManual::Saturation),
        SYSTEM_EXPOSURE => scalar(context, direction, value, Get::Ae(AeGet::Exposure), |value| {
            Set::Ae(AeSet::Exposure(value))
        }),
        SYSTEM_EXPOSURE_RATIO => scalar(
            context,
            direction,
            value,
            Get::Ae(AeGet::ExposureRatio),
            |value| Set::Ae(AeSet::ExposureRatio(value)),
        ),
        SYSTEM_MAX_EXPOSURE_RATIO => {
            cmos_value(context, direction, value, CmosField::MaxExposureRatio)
        }
        SYSTEM_INTEGRATION_TIME => cmos_value(context, direction, value, CmosField::IntegrationTime),
        SYSTEM_MAX_INTEGRATION_TIME => {
            cmos_value(context, direction, value, CmosField::MaxIntegrationTime)
        }
        SYSTEM_LONG_INTEGRATION_TIME | SYSTEM_SHORT_INTEGRATION_TIME => get_only(direction, || {
            let exposure = context.get(Get::Cmos(CmosGet::Exposure))?.as_exposure()?;
            Ok(if id == SYSTEM_LONG_INTEGRATION_TIME {
                exposure.integration_time_long
            } else {
                exposure.integration_time
            })
        }),
        SYSTEM_SENSOR_ANALOG_GAIN => {
            cmos_value(context, direction, value, CmosField::SensorAnalogGain)
        }
        SYSTEM_MAX_SENSOR_ANALOG_GAIN => {
            cmos_value(context, direction, value, CmosField::MaxSensorAnalogGain)
        }
        SYSTEM_SENSOR_DIGITAL_GAIN => {
            cmos_value(context, direction, value, CmosField::SensorDigitalGain)
        }
        SYSTEM_MAX_SENSOR_DIGITAL_GAIN => {
            cmos_value(context, direction, value, CmosField::MaxSensorDigitalGain)
        }
        SYSTEM_ISP_DIGITAL_GAIN => cmos_value(context, direction, value, CmosField::IspDigitalGain),
        SYSTEM_MAX_ISP_DIGITAL_GAIN => {
            cmos_value(context, direction, value, CmosField::MaxIspDigitalGain)
        }
        SYSTEM_AWB_RED_GAIN => awb_gain(context, direction, value, WbChannel::R),
        SYSTEM_AWB_GREEN_EVEN_GAIN => awb_gain(context, direction, value, WbChannel::Gr),
        SYSTEM_AWB_GREEN_ODD_GAIN => awb_gain(context, direction, value, WbChannel::Gb),
        SYSTEM_AWB_BLUE_GAIN => awb_gain(context, direction, value, WbChannel::B),
        SYSTEM_CCM_MATRIX_RR..=SYSTEM_CCM_MATRIX_BB => {
            let index = id - SYSTEM_CCM_MATRIX_RR;
            scalar(
                context,
                direction,
                value,
                Get::ColorMatrix(ColorMatrixGet::Coefficient(index)),
                |value| Set::ColorMatrix(ColorMatrixSet::Coefficient(index, value)),
            )
        }
        SYSTEM_SATURATION_TARGET => scalar(
            context,
            direction,
            value,
            Get::ColorMatrix(ColorMatrixGet::SaturationTarget),
            |value| Set::ColorMatrix(ColorMatrixSet::SaturationTarget(value)),
        ),
        SYSTEM_ANTIFLICKER_ENABLE => {
            cmos_flag(context, direction, value, CmosField::AntiflickerEnable)
        }
        SYSTEM_ANTI_FLICKER_FREQUENCY => {
            cmos_value(context, direction, value, CmosField::AntiFlickerFrequency)
        }
        SYSTEM_DYNAMIC_GAMMA_ENABLE => manual_flag(
            context,
            direction,
            value,
            Get::General(GeneralGet::DynamicGamma),
            |on| Set::General(GeneralSet::DynamicGamma(on)),
        ),
        CALIBRATION_UPDATE => match direction {
            Direction::Get => Ok(DONE),
            Direction::Set if value == UPDATE => {
                write(context, Set::General(GeneralSet::ReloadCalibration))
            }
            Direction::Set => Err(CommandError::NotSupported),
        },
        SYSTEM_EXPOSURE_PRIORITY => scalar(
            context,
            direction,
            value,
            Get::Cmos(CmosGet::ExposurePriority),
            |value| Set::Cmos(CmosSet::ExposurePriority(value)),
        ),
        SYSTEM_ISO_GAIN => scalar(context, direction, value, Get::Cmos(CmosGet::IsoGain), |value| {
            Set::Cmos(CmosSet::IsoGain(value))
        }),
        _ => Err(CommandError::NotExists),
    }
}

pub(super) fn isp_modules<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult {
    match id {
        ISP_MODULES_MANUAL_IRIDIX => manual_flag(
            context,
            direction,
            value,
            Get::Iridix(IridixGet::Manual),
            |on| Set::Iridix(IridixSet::Manual(on)),
        ),
        ISP_MODULES_MANUAL_SINTER
        | ISP_MODULES_MANUAL_TEMPER
        | ISP_MODULES_MANUAL_FRAME_STITCH
        | ISP_MODULES_MANUAL_RAW_FRONTEND => {
            let block = match id {
                ISP_MODULES_MANUAL_SINTER => NrBlock::Sinter,
                ISP_MODULES_MANUAL_TEMPER => NrBlock::Temper,
                ISP_MODULES_MANUAL_FRAME_STITCH => NrBlock::Stitching,
                _ => NrBlock::Dpc,
            };
            manual_flag(
                context,
                direction,
                value,
                Get::NoiseReduction(NoiseReductionGet::Manual(block)),
                |on| Set::NoiseReduction(NoiseReductionSet::Manual(block, on)),
            )
        }
        ISP_MODULES_MANUAL_SHADING => color_flag(context, direction, value, ColorManual::Shading),
        ISP_MODULES_MANUAL_DEMOSAIC | ISP_MODULES_MANUAL_SHARPEN => {
            let block = if id == ISP_MODULES_MANUAL_DEMOSAIC {
                SharpenBlock::Demosaic
            } else {
                SharpenBlock::Sharpen
            };
            manual_flag(
                context,
                direction,
                value,
                Get::Sharpening(SharpeningGet::Manual(block)),
                |on| Set::Sharpening(SharpeningSet::Manual(block, on)),
            )
        }
        ISP_MODULES_MANUAL_AUTO_LEVEL | ISP_MODULES_MANUAL_BLACK_LEVEL | ISP_MODULES_MANUAL_CNR => {
            Err(CommandError::NotSupported)
        }
        _ => Err(CommandError::NotExists),
    }
}

/// Rounds a log2 gain to whole stops.
fn gain_stops(gain_log2: i32) -> u32 {
    let half = (1_i32 << (LOG2_GAIN_SHIFT - 1)) - 1;
    u32::try_from(gain_log2.saturating_add(half) >> LOG2_GAIN_SHIFT).unwrap_or(0)
}

pub(super) fn status<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: u8,
    direction: Direction,
) -> CommandResult {
    let request = match id {
        STATUS_INFO_EXPOSURE_LOG2
        | STATUS_INFO_GAIN_ONES
        | STATUS_INFO_GAIN_LOG2
        | STATUS_INFO_AWB_MIX_LIGHT_CONTRAST
        | STATUS_INFO_AF_LENS_POS
        | STATUS_INFO_AF_FOCUS_VALUE => id,
        _ => return Err(CommandError::NotExists),
    };
    if direction == Direction::Set {
        return Err(CommandError::NotPermitted);
    }

    match request {
        STATUS_INFO_EXPOSURE_LOG2 => {
            let exposure_log2 = context.get(Get::Cmos(CmosGet::ExposureLog2))?.as_i32()?;
            Ok(exposure_log2.cast_unsigned())
        }
        STATUS_INFO_GAIN_ONES => {
            let gain_log2 = context.get(Get::Cmos(CmosGet::TotalGainLog2))?.as_i32()?;
            Ok(exp2_fixed(gain_log2, LOG2_GAIN_SHIFT, 0))
        }
        STATUS_INFO_GAIN_LOG2 => {
            let gain_log2 = context.get(Get::Cmos(CmosGet::TotalGainLog2))?.as_i32()?;
            Ok(gain_stops(gain_log2))
        }
        STATUS_INFO_AWB_MIX_LIGHT_CONTRAST => read(context, Get::Awb(AwbGet::MixLightContrast)),
        STATUS_INFO_AF_LENS_POS => read(context, Get::Af(AfGet::LensPosition)),
        _ => read(context, Get::Af(AfGet::Sharpness)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::ids::{TISP_MODULES, TSTATUS, TSYSTEM};
    use super::super::tests::{firmware, get, set};
    use super::super::{Response, Status};
    use super::*;

    #[test]
    fn logger_level_accepts_known_levels_only() {
        let mut firmware = firmware();
        assert!(set(&mut firmware, TSYSTEM, SYSTEM_LOGGER_LEVEL, 1).is_success());
        assert_eq!(get(&mut firmware, TSYSTEM, SYSTEM_LOGGER_LEVEL).ret, 1);
        assert_eq!(
            set(&mut firmware, TSYSTEM, SYSTEM_LOGGER_LEVEL, 7).status,
            Status::NotSupported
        );
    }

    #[test]
    fn manual_flags_read_back() {
        let mut firmware = firmware();
        for id in [
            SYSTEM_MANUAL_EXPOSURE,
            SYSTEM_MANUAL_INTEGRATION_TIME,
            SYSTEM_MANUAL_AWB,
            SYSTEM_MANUAL_CCM,
        ] {
            assert_eq!(get(&mut firmware, TSYSTEM, id).ret, 0);
            assert!(set(&mut firmware, TSYSTEM, id, 1).is_success());
            assert_eq!(get(&mut firmware, TSYSTEM, id).ret, 1);
        }
        assert!(set(&mut firmware, TISP_MODULES, ISP_MODULES_MANUAL_SINTER, 1).is_success());
        assert_eq!(get(&mut firmware, TISP_MODULES, ISP_MODULES_MANUAL_SINTER).ret, 1);
        assert_eq!(
            get(&mut firmware, TISP_MODULES, ISP_MODULES_MANUAL_CNR).status,
            Status::NotSupported
        );
    }

    #[test]
    fn test_pattern_mode_is_bounded() {
        let mut firmware = firmware();
        assert!(set(&mut firmware, TSYSTEM, TEST_PATTERN_MODE, 5).is_success());
        assert_eq!(
            set(&mut firmware, TSYSTEM, TEST_PATTERN_MODE, 6),
            Response {
                status: Status::Fail,
                ret: ErrorValue::BadArgument.to_raw()
            }
        );
        assert_eq!(get(&mut firmware, TSYSTEM, TEST_PATTERN_MODE).ret, 5);
    }

    #[test]
    fn calibration_update_reports_done() {
        let mut firmware = firmware();
        assert_eq!(get(&mut firmware, TSYSTEM, CALIBRATION_UPDATE).ret, DONE);
        assert!(set(&mut firmware, TSYSTEM, CALIBRATION_UPDATE, UPDATE).is_success());
        assert_eq!(
            set(&mut firmware, TSYSTEM, M2M_PROCESS_REQUEST, 1).status,
            Status::NotSupported
        );
    }

    #[test]
    fn status_is_read_only() {
        let mut firmware = firmware();
        assert!(get(&mut firmware, TSTATUS, STATUS_INFO_GAIN_LOG2).is_success());
        assert_eq!(
            set(&mut firmware, TSTATUS, STATUS_INFO_GAIN_LOG2, 1).status,
            Status::NotPermitted
        );
        assert_eq!(get(&mut firmware, TSTATUS, 0x60).status, Status::NotExists);
    }

    #[test]
    fn gain_stops_round_to_nearest() {
        let one = 1 << LOG2_GAIN_SHIFT;
        assert_eq!(gain_stops(0), 0);
        assert_eq!(gain_stops(one), 1);
        assert_eq!(gain_stops(one + one / 2 + 1), 2);
        assert_eq!(gain_stops(one + one / 4), 1);
        assert_eq!(gain_stops(-one), 0);
    }
}
