//! Bulk buffer transfers.
//!
//! Both calibration buffer types carry the whole calibration set in the
//! [`CalibrationSet::export`](crate::calibration::CalibrationSet::export)
//! record format. An import is validated in full before any table changes.

use super::ids::{DYNAMIC_CALIBRATIONS, DYNAMIC_STATE, FILE_TRANSFER, STATIC_CALIBRATIONS};
use super::{CommandError, CommandResult, Direction, Response};
use crate::firmware::{IspFirmware, IspHardware};
use crate::machines::GeneralSet;
use crate::param::Set;

/// Exports into, or imports from, `data`. On success `ret` is the number of
/// bytes written for a read and the number of tables applied for a write.
pub fn buffer<H, const C: usize, const Q: usize>(
    firmware: &mut IspFirmware<H, C, Q>,
    ctx: usize,
    kind: u8,
    direction: Direction,
    data: &mut [u8],
) -> Response
where
    H: IspHardware,
{
    match transfer(firmware, ctx, kind, direction, data) {
        Ok(ret) => Response::success(ret),
        Err(error) => {
            let response = error.response();
            isp_warn!(
                "buffer {} rejected: {} ({})",
                kind,
                response.status.label(),
                response.ret
            );
            response
        }
    }
}

fn transfer<H, const C: usize, const Q: usize>(
    firmware: &mut IspFirmware<H, C, Q>,
    ctx: usize,
    kind: u8,
    direction: Direction,
    data: &mut [u8],
) -> CommandResult
where
    H: IspHardware,
{
    match kind {
        STATIC_CALIBRATIONS | DYNAMIC_CALIBRATIONS => {
            let context = firmware.context_checked(ctx)?;
            let count = match direction {
                Direction::Get => context.shared().calibrations.export(data)?,
                Direction::Set => {
                    let applied = context.shared_mut().calibrations.import(data)?;
                    context.set(Set::General(GeneralSet::ReloadCalibration))?;
                    isp_info!("imported {} calibration tables", applied);
                    applied
                }
            };
            Ok(u32::try_from(count).unwrap_or(u32::MAX))
        }
        FILE_TRANSFER | DYNAMIC_STATE => Err(CommandError::NotSupported),
        _ => Err(CommandError::NotExists),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::firmware;
    use super::super::{ErrorValue, Status};
    use super::*;
    use crate::calibration::CalibrationId;

    #[test]
    fn export_then_import_restores_edits() {
        let mut firmware = firmware();
        let len = firmware
            .active_mut()
            .expect("active")
            .shared()
            .calibrations
            .export_len();
        let mut image = [0u8; 12 * 1024];
        assert!(len <= image.len());
        let response = buffer(&mut firmware, 0, STATIC_CALIBRATIONS, Direction::Get, &mut image);
        assert_eq!(response, Response::success(u32::try_from(len).expect("small")));

        let id = CalibrationId::CMOS_CONTROL;
        let context = firmware.active_mut().expect("active");
        let original = context.shared().calibrations.cell(id, 1);
        let zeroed = [0u8; 72];
        context
            .shared_mut()
            .calibrations
            .update(id, &zeroed)
            .expect("same size");
        assert_eq!(context.shared().calibrations.cell(id, 1), Some(0));

        assert!(buffer(&mut firmware, 0, DYNAMIC_CALIBRATIONS, Direction::Set, &mut image[..len]).is_success());
        let context = firmware.active_mut().expect("active");
        assert_eq!(context.shared().calibrations.cell(id, 1), original);
    }

    #[test]
    fn truncated_import_changes_nothing() {
        let mut firmware = firmware();
        let mut image = [0u8; 12 * 1024];
        let len = usize::try_from(
            buffer(&mut firmware, 0, STATIC_CALIBRATIONS, Direction::Get, &mut image).ret,
        )
        .expect("fits");
        let mut edited = image;
        // First byte of the first table body.
        edited[6] ^= 0xFF;
        let response = buffer(
            &mut firmware,
            0,
            STATIC_CALIBRATIONS,
            Direction::Set,
            &mut edited[..len - 1],
        );
        assert_eq!(response.status, Status::Fail);
        assert_eq!(response.ret, ErrorValue::BadArgument.to_raw());

        let mut after = [0u8; 12 * 1024];
        buffer(&mut firmware, 0, STATIC_CALIBRATIONS, Direction::Get, &mut after);
        assert_eq!(after[..len], image[..len]);
    }

    #[test]
    fn small_export_buffer_is_wrong_size() {
        let mut firmware = firmware();
        let mut out = [0u8; 4];
        assert_eq!(
            buffer(&mut firmware, 0, STATIC_CALIBRATIONS, Direction::Get, &mut out).ret,
            ErrorValue::WrongSize.to_raw()
        );
    }

    #[test]
    fn other_buffers_are_not_supported() {
        let mut firmware = firmware();
        let mut data = [0u8; 4];
        for kind in [FILE_TRANSFER, DYNAMIC_STATE] {
            assert_eq!(
                buffer(&mut firmware, 0, kind, Direction::Get, &mut data).status,
                Status::NotSupported
            );
        }
        assert_eq!(
            buffer(&mut firmware, 0, 9, Direction::Get, &mut data).status,
            Status::NotExists
        );
    }
}
