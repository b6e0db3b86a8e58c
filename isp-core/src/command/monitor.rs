//! `TMONITOR`: hazard counters and per-algorithm latency blocks.

use super::ids::{
    MON_ERROR_CALIBRATION_LUT_NULL, MON_ERROR_IRIDIX_UPDATE_NOT_IN_VB, MON_STATUS_AE_RESET,
    MON_STATUS_BLOCK_LEN, MON_STATUS_IRIDIX_DELAY_TARGET2APPLY_MAX,
};
use super::{CommandError, CommandResult, Direction, read, write};
use crate::dispatcher::Dispatcher;
use crate::machines::{MonitorAlgorithm, MonitorCounter, MonitorGet, MonitorSet, StatusField};
use crate::param::{Get, Set};

pub(super) fn handle<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult {
    match id {
        MON_ERROR_CALIBRATION_LUT_NULL..=MON_ERROR_IRIDIX_UPDATE_NOT_IN_VB => {
            let counter = MonitorCounter::ALL[usize::from(id - MON_ERROR_CALIBRATION_LUT_NULL)];
            match direction {
                Direction::Get => read(context, Get::Monitor(MonitorGet::Error(counter))),
                Direction::Set if value == 0 => {
                    write(context, Set::Monitor(MonitorSet::ResetError(counter)))
                }
                Direction::Set => Err(CommandError::NotSupported),
            }
        }
        MON_STATUS_AE_RESET..=MON_STATUS_IRIDIX_DELAY_TARGET2APPLY_MAX => {
            let offset = id - MON_STATUS_AE_RESET;
            let algorithm = MonitorAlgorithm::ALL[usize::from(offset / MON_STATUS_BLOCK_LEN)];
            match usize::from(offset % MON_STATUS_BLOCK_LEN) {
                0 => match direction {
                    Direction::Get => Ok(0),
                    Direction::Set => {
                        write(context, Set::Monitor(MonitorSet::ResetStatus(algorithm)))
                    }
                },
                field => match direction {
                    Direction::Get => read(
                        context,
                        Get::Monitor(MonitorGet::Status(algorithm, StatusField::ALL[field - 1])),
                    ),
                    Direction::Set => Err(CommandError::NotSupported),
                },
            }
        }
        _ => Err(CommandError::NotExists),
    }
}

#[cfg(test)]
mod tests {
    use super::super::ids::{MON_ERROR_CMOS_FS_DELAY, TMONITOR};
    use super::super::tests::{firmware, get, set};
    use super::super::{Response, Status};
    use super::*;
    use crate::machines::{MonitorErrorReport, MonitorStage};

    #[test]
    fn error_counters_reset_with_zero_only() {
        let mut firmware = firmware();
        let context = firmware.active_mut().expect("active context");
        context
            .set(Set::Monitor(MonitorSet::Error(MonitorErrorReport::CmosFsDelay)))
            .expect("report accepted");

        assert_eq!(
            get(&mut firmware, TMONITOR, MON_ERROR_CMOS_FS_DELAY),
            Response::success(1)
        );
        assert_eq!(
            set(&mut firmware, TMONITOR, MON_ERROR_CMOS_FS_DELAY, 1).status,
            Status::NotSupported
        );
        assert!(set(&mut firmware, TMONITOR, MON_ERROR_CMOS_FS_DELAY, 0).is_success());
        assert_eq!(get(&mut firmware, TMONITOR, MON_ERROR_CMOS_FS_DELAY).ret, 0);
    }

    #[test]
    fn status_blocks_are_addressed_by_offset() {
        let mut firmware = firmware();
        let context = firmware.active_mut().expect("active context");
        let frame_id = context.shared().frame_id;
        for stage in [
            MonitorStage::InputReady,
            MonitorStage::OutputReady,
            MonitorStage::Applied,
        ] {
            context
                .set(Set::Monitor(MonitorSet::Report {
                    algorithm: MonitorAlgorithm::Awb,
                    stage,
                    frame_id,
                }))
                .expect("report accepted");
        }

        let awb_reset = MON_STATUS_AE_RESET + MON_STATUS_BLOCK_LEN;
        assert_eq!(get(&mut firmware, TMONITOR, awb_reset).ret, 0);
        assert!(get(&mut firmware, TMONITOR, awb_reset + 1).is_success());
        assert_eq!(
            set(&mut firmware, TMONITOR, awb_reset + 1, 0).status,
            Status::NotSupported
        );
        assert!(set(&mut firmware, TMONITOR, awb_reset, 0).is_success());
        assert_eq!(
            get(&mut firmware, TMONITOR, MON_STATUS_IRIDIX_DELAY_TARGET2APPLY_MAX + 1).status,
            Status::NotExists
        );
    }
}
