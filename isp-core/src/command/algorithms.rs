//! `TALGORITHMS`: AF, AE, AWB and noise reduction modes.

use super::ids::{
    AE_COMPENSATION, AE_EXPOSURE, AE_GAIN, AE_MODE, AE_ROI, AE_SPLIT_PRESET, AE_STATE,
    AF_LENS_STATUS, AF_MANUAL_CONTROL, AF_MODE, AF_ROI, AF_STATE, AWB_MODE, AWB_STATE,
    AWB_TEMPERATURE, CAF_STATE, LENS_FAILED, LENS_SUCCESS, NOISE_REDUCTION_MODE,
    NOISE_REDUCTION_OFF, NOISE_REDUCTION_ON,
};
use super::{CommandError, CommandResult, Direction, ErrorValue, get_only, read, write};
use crate::dispatcher::Dispatcher;
use crate::machines::{
    AeGet, AeMode, AeSet, AfGet, AfMode, AfSet, AwbGet, AwbMode, AwbSet, CmosGet, CmosSet,
    ExposureStrategy, NoiseReductionGet, NoiseReductionMode, NoiseReductionSet,
};
use crate::param::{Get, Set};

/// Compensation is an 8-bit offset around 128.
const COMPENSATION_MAX: u32 = 255;

/// Smallest manual gain, 1.0 in 8.8.
const MANUAL_GAIN_MIN: u32 = 0x100;

pub(super) fn handle<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult {
    match (id, direction) {
        (AF_LENS_STATUS, _) => get_only(direction, || {
            let present = context.get(Get::Af(AfGet::LensStatus))?.as_bool()?;
            Ok(if present { LENS_SUCCESS } else { LENS_FAILED })
        }),
        (AF_MODE, Direction::Get) => read(context, Get::Af(AfGet::Mode)),
        (AF_MODE, Direction::Set) => {
            let mode = AfMode::from_raw(value).ok_or(CommandError::NotSupported)?;
            write(context, Set::Af(AfSet::Mode(mode)))
        }
        (AF_STATE, _) => get_only(direction, || read(context, Get::Af(AfGet::State))),
        (CAF_STATE, _) => get_only(direction, || read(context, Get::Af(AfGet::CafState))),
        (AF_ROI, Direction::Get) => read(context, Get::Af(AfGet::Roi)),
        (AF_ROI, Direction::Set) => write(context, Set::Af(AfSet::Roi(value))),
        (AF_MANUAL_CONTROL, Direction::Get) => read(context, Get::Af(AfGet::ManualPosition)),
        (AF_MANUAL_CONTROL, Direction::Set) => {
            write(context, Set::Af(AfSet::ManualPosition(value)))
        }

        (AE_MODE, Direction::Get) => read(context, Get::Cmos(CmosGet::AeMode)),
        (AE_MODE, Direction::Set) => {
            let mode = AeMode::from_raw(value).ok_or(CommandError::NotSupported)?;
            write(context, Set::Cmos(CmosSet::AeMode(mode)))
        }
        (AE_STATE, _) => get_only(direction, || read(context, Get::Ae(AeGet::State))),
        (AE_SPLIT_PRESET, Direction::Get) => read(context, Get::Cmos(CmosGet::Strategy)),
        (AE_SPLIT_PRESET, Direction::Set) => {
            let strategy = ExposureStrategy::from_raw(value).ok_or(CommandError::NotSupported)?;
            write(context, Set::Cmos(CmosSet::Strategy(strategy)))
        }
        (AE_GAIN, _) => ae_gain(context, value, direction),
        (AE_EXPOSURE, Direction::Get) => read(context, Get::Cmos(CmosGet::ExposureTime)),
        (AE_EXPOSURE, Direction::Set) => write(context, Set::Cmos(CmosSet::ExposureTime(value))),
        (AE_ROI, Direction::Get) => read(context, Get::Ae(AeGet::Roi)),
        (AE_ROI, Direction::Set) => write(context, Set::Ae(AeSet::Roi(value))),
        (AE_COMPENSATION, Direction::Get) => read(context, Get::Ae(AeGet::Compensation)),
        (AE_COMPENSATION, Direction::Set) => {
            if value > COMPENSATION_MAX {
                return Err(CommandError::NotSupported);
            }
            write(context, Set::Ae(AeSet::Compensation(value)))
        }

        (AWB_MODE, Direction::Get) => read(context, Get::Awb(AwbGet::Mode)),
        (AWB_MODE, Direction::Set) => {
            let mode = AwbMode::from_raw(value).ok_or(CommandError::NotSupported)?;
            write(context, Set::Awb(AwbSet::Mode(mode)))
        }
        (AWB_STATE, _) => get_only(direction, || read(context, Get::Awb(AwbGet::State))),
        (AWB_TEMPERATURE, Direction::Get) => read(context, Get::Awb(AwbGet::Temperature)),
        (AWB_TEMPERATURE, Direction::Set) => {
            write(context, Set::Awb(AwbSet::Temperature(value)))
        }

        (NOISE_REDUCTION_MODE, Direction::Get) => {
            let mode = read(context, Get::NoiseReduction(NoiseReductionGet::Mode))?;
            Ok(if mode == NoiseReductionMode::On.to_raw() {
                NOISE_REDUCTION_ON
            } else {
                NOISE_REDUCTION_OFF
            })
        }
        (NOISE_REDUCTION_MODE, Direction::Set) => {
            let mode = match value {
                NOISE_REDUCTION_OFF => NoiseReductionMode::Off,
                NOISE_REDUCTION_ON => NoiseReductionMode::On,
                _ => return Err(CommandError::NotSupported),
            };
            write(
                context,
                Set::NoiseReduction(NoiseReductionSet::Mode(mode)),
            )
        }
        _ => Err(CommandError::NotExists),
    }
}

/// Manual gain is only writable in a mode that fixes the gain. Reads report
/// the applied total gain otherwise.
fn ae_gain<const Q: usize>(
    context: &mut Dispatcher<Q>,
    value: u32,
    direction: Direction,
) -> CommandResult {
    let mode = read(context, Get::Cmos(CmosGet::AeMode))?;
    let (_, manual_gain) = AeMode::from_raw(mode).unwrap_or_default().flags();
    match direction {
        Direction::Get if manual_gain => read(context, Get::Cmos(CmosGet::ManualGain)),
        Direction::Get => read(context, Get::Cmos(CmosGet::TotalGain)),
        Direction::Set if !manual_gain => Err(CommandError::NotPermitted),
        Direction::Set if value < MANUAL_GAIN_MIN => {
            Err(CommandError::Fail(ErrorValue::BadArgument))
        }
        Direction::Set => write(context, Set::Cmos(CmosSet::ManualGain(value))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::ids::TALGORITHMS;
    use super::super::tests::{firmware, get, set};
    use super::super::{Response, Status};
    use super::*;

    #[test]
    fn ae_gain_follows_the_ae_mode() {
        let mut firmware = firmware();
        assert_eq!(
            set(&mut firmware, TALGORITHMS, AE_GAIN, 0x200).status,
            Status::NotPermitted
        );
        assert!(
            set(&mut firmware, TALGORITHMS, AE_MODE, AeMode::ManualGain.to_raw()).is_success()
        );
        assert_eq!(
            get(&mut firmware, TALGORITHMS, AE_MODE).ret,
            AeMode::ManualGain.to_raw()
        );
        assert_eq!(
            set(&mut firmware, TALGORITHMS, AE_GAIN, 0xFF),
            Response {
                status: Status::Fail,
                ret: ErrorValue::BadArgument.to_raw()
            }
        );
        assert!(set(&mut firmware, TALGORITHMS, AE_GAIN, 0x200).is_success());
        assert_eq!(get(&mut firmware, TALGORITHMS, AE_GAIN).ret, 0x200);
    }

    #[test]
    fn unknown_modes_are_not_supported() {
        let mut firmware = firmware();
        assert_eq!(
            set(&mut firmware, TALGORITHMS, AE_MODE, 4).status,
            Status::NotSupported
        );
        assert_eq!(
            set(&mut firmware, TALGORITHMS, AWB_MODE, 42).status,
            Status::NotSupported
        );
        assert_eq!(
            set(&mut firmware, TALGORITHMS, NOISE_REDUCTION_MODE, 2).status,
            Status::NotSupported
        );
        assert_eq!(
            set(&mut firmware, TALGORITHMS, AE_COMPENSATION, 256).status,
            Status::NotSupported
        );
    }

    #[test]
    fn noise_reduction_mode_round_trips() {
        let mut firmware = firmware();
        assert!(set(&mut firmware, TALGORITHMS, NOISE_REDUCTION_MODE, NOISE_REDUCTION_OFF).is_success());
        assert_eq!(
            get(&mut firmware, TALGORITHMS, NOISE_REDUCTION_MODE).ret,
            NOISE_REDUCTION_OFF
        );
        assert!(set(&mut firmware, TALGORITHMS, NOISE_REDUCTION_MODE, NOISE_REDUCTION_ON).is_success());
        assert_eq!(
            get(&mut firmware, TALGORITHMS, NOISE_REDUCTION_MODE).ret,
            NOISE_REDUCTION_ON
        );
    }

    #[test]
    fn state_queries_are_read_only() {
        let mut firmware = firmware();
        assert_eq!(
            get(&mut firmware, TALGORITHMS, AF_LENS_STATUS),
            Response::success(LENS_SUCCESS)
        );
        assert_eq!(
            set(&mut firmware, TALGORITHMS, AE_STATE, 0).status,
            Status::NotSupported
        );
        assert_eq!(
            set(&mut firmware, TALGORITHMS, AWB_STATE, 0).status,
            Status::NotSupported
        );
    }

    #[test]
    fn awb_temperature_needs_manual_mode() {
        let mut firmware = firmware();
        assert_eq!(
            set(&mut firmware, TALGORITHMS, AWB_TEMPERATURE, 50).status,
            Status::NotPermitted
        );
    }
}
