//! Calibration table access.
//!
//! A table is read or replaced whole; the byte count must match its declared
//! geometry. A successful write reloads the machines that cache the table.

use super::{CommandError, CommandResult, Direction, Response};
use crate::calibration::{CalibrationId, CalibrationSet};
use crate::dispatcher::Dispatcher;
use crate::firmware::{IspFirmware, IspHardware};
use crate::machines::{
    AfSet, CmosSet, ColorMatrixSet, GeneralSet, IridixSet, PurpleFringeSet, SharpeningSet,
};
use crate::param::Set;

/// Reads or replaces table `table` of context `ctx`. On success `ret`
/// holds the number of bytes transferred.
pub fn calibration<H, const C: usize, const Q: usize>(
    firmware: &mut IspFirmware<H, C, Q>,
    ctx: usize,
    table: u8,
    direction: Direction,
    data: &mut [u8],
) -> Response
where
    H: IspHardware,
{
    match transfer(firmware, ctx, table, direction, data) {
        Ok(len) => Response::success(len),
        Err(error) => {
            let response = error.response();
            isp_warn!(
                "calibration table {} rejected: {} ({})",
                table,
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
    table: u8,
    direction: Direction,
    data: &mut [u8],
) -> CommandResult
where
    H: IspHardware,
{
    let id = CalibrationId::new(table).ok_or(CommandError::NotExists)?;
    let context = firmware.context_checked(ctx)?;
    let len = match direction {
        Direction::Get => context.shared().calibrations.read_into(id, data)?,
        Direction::Set => {
            context.shared_mut().calibrations.update(id, data)?;
            reload(context, id)?;
            data.len()
        }
    };
    Ok(u32::try_from(len).unwrap_or(u32::MAX))
}

/// Pushes a replaced table into the machine that caches it.
pub(super) fn reload<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: CalibrationId,
) -> Result<(), CommandError> {
    let request = match id {
        CalibrationId::SHARP_FR_CONFIG
        | CalibrationId::SHARP_DS1_CONFIG
        | CalibrationId::SHARP_ALT_D
        | CalibrationId::SHARP_ALT_UD
        | CalibrationId::SHARPEN_FR
        | CalibrationId::SHARPEN_DS1 => Set::Sharpening(SharpeningSet::Init),
        CalibrationId::PF_CONFIG
        | CalibrationId::PF_RADIAL_LUT
        | CalibrationId::PF_RADIAL_PARAMS => Set::PurpleFringe(PurpleFringeSet::Init),
        CalibrationId::MT_ABSOLUTE_LS_A_CCM
        | CalibrationId::MT_ABSOLUTE_LS_D40_CCM
        | CalibrationId::MT_ABSOLUTE_LS_D50_CCM => Set::ColorMatrix(ColorMatrixSet::ChangeCcms),
        CalibrationId::GAMMA
        | CalibrationId::DEMOSAIC
        | CalibrationId::NOISE_PROFILE
        | CalibrationId::SHADING_LS_A_R
        | CalibrationId::SHADING_LS_A_G
        | CalibrationId::SHADING_LS_A_B
        | CalibrationId::SHADING_LS_TL84_R
        | CalibrationId::SHADING_LS_TL84_G
        | CalibrationId::SHADING_LS_TL84_B
        | CalibrationId::SHADING_LS_D65_R
        | CalibrationId::SHADING_LS_D65_G
        | CalibrationId::SHADING_LS_D65_B => Set::General(GeneralSet::ReloadCalibration),
        CalibrationId::IRIDIX_ASYMMETRY => Set::Iridix(IridixSet::Init),
        CalibrationId::AF_INPUT_ROI => Set::Af(AfSet::InputRoiReload),
        CalibrationId::CMOS_CONTROL => Set::Cmos(CmosSet::Reload),
        _ => return Ok(()),
    };
    match context.set(request) {
        // Contexts without a lens have nothing to reload.
        Err(_) if id == CalibrationId::AF_INPUT_ROI => Ok(()),
        result => Ok(result?),
    }
}

/// Geometry of a table packed as `(width - 1) << 30 | rows << 15 | cols`, or
/// zero for an unknown table.
#[must_use]
pub fn describe(calibrations: &CalibrationSet, table: u32) -> u32 {
    u8::try_from(table)
        .ok()
        .and_then(CalibrationId::new)
        .and_then(|id| calibrations.shape(id))
        .map_or(0, |shape| {
            (u32::from(shape.width.saturating_sub(1)) << 30)
                | (u32::from(shape.rows) << 15)
                | u32::from(shape.cols)
        })
}

#[cfg(test)]
mod tests {
    use super::super::tests::firmware;
    use super::super::{ErrorValue, Status};
    use super::*;
    use crate::calibration::defaults::dummy_calibrations;

    #[test]
    fn short_write_leaves_the_table_alone() {
        let mut firmware = firmware();
        let id = CalibrationId::GAMMA;
        let before = {
            let context = firmware.active_mut().expect("active");
            let bytes = context.shared().calibrations.bytes(id).expect("gamma");
            let mut copy = [0u8; 512];
            copy[..bytes.len()].copy_from_slice(bytes);
            (copy, bytes.len())
        };

        let mut short = [0xAA; 512];
        let response = calibration(
            &mut firmware,
            0,
            id.raw(),
            Direction::Set,
            &mut short[..before.1 - 1],
        );
        assert_eq!(response.status, Status::Fail);
        assert_eq!(response.ret, ErrorValue::WrongSize.to_raw());

        let context = firmware.active_mut().expect("active");
        assert_eq!(
            context.shared().calibrations.bytes(id),
            Some(&before.0[..before.1])
        );
    }

    #[test]
    fn read_copies_the_whole_table() {
        let mut firmware = firmware();
        let id = CalibrationId::CMOS_CONTROL;
        let len = firmware
            .active_mut()
            .expect("active")
            .shared()
            .calibrations
            .bytes(id)
            .map(<[u8]>::len)
            .expect("cmos control");
        let mut out = [0u8; 256];
        let response = calibration(&mut firmware, 0, id.raw(), Direction::Get, &mut out[..len]);
        assert_eq!(response, Response::success(u32::try_from(len).expect("small")));
        assert!(calibration(&mut firmware, 0, id.raw(), Direction::Set, &mut out[..len]).is_success());
    }

    #[test]
    fn writes_land_in_the_addressed_context() {
        let mut firmware = firmware();
        let id = CalibrationId::CMOS_CONTROL;
        let mut table = [0u8; 256];
        let len = calibration(&mut firmware, 1, id.raw(), Direction::Get, &mut table).ret;
        let len = usize::try_from(len).expect("small");
        table[0] ^= 0x01;
        assert!(calibration(&mut firmware, 1, id.raw(), Direction::Set, &mut table[..len]).is_success());

        let second = firmware.context(1).expect("context 1").shared().calibrations.bytes(id);
        assert_eq!(second, Some(&table[..len]));
        let first = firmware.context(0).expect("context 0").shared().calibrations.bytes(id);
        assert_ne!(first, Some(&table[..len]));

        let mut out = [0u8; 4];
        assert_eq!(
            calibration(&mut firmware, 2, id.raw(), Direction::Get, &mut out).status,
            Status::Fail
        );
    }

    #[test]
    fn radial_write_reaches_the_purple_fringe_block() {
        let mut firmware = firmware();
        let id = CalibrationId::PF_RADIAL_PARAMS;
        let mut table = [0u8; 6];
        table[..2].copy_from_slice(&640u16.to_le_bytes());
        table[2..4].copy_from_slice(&360u16.to_le_bytes());
        table[4..].copy_from_slice(&0x1000u16.to_le_bytes());
        assert!(calibration(&mut firmware, 0, id.raw(), Direction::Set, &mut table).is_success());

        let regs = firmware.context(0).expect("context 0").shared().regs.purple_fringe;
        assert_eq!(regs.radial_centre_x, 640);
        assert_eq!(regs.radial_centre_y, 360);
        assert_eq!(regs.radial_off_center_mult, 0x1000);
    }

    #[test]
    fn unknown_tables_do_not_exist() {
        let mut firmware = firmware();
        let mut out = [0u8; 4];
        assert_eq!(
            calibration(&mut firmware, 0, 0xF0, Direction::Get, &mut out).status,
            Status::NotExists
        );
    }

    #[test]
    fn describe_packs_the_geometry() {
        let calibrations = dummy_calibrations().expect("defaults fit");
        let shape = calibrations.shape(CalibrationId::GAMMA).expect("gamma");
        let packed = describe(&calibrations, u32::from(CalibrationId::GAMMA.raw()));
        assert_eq!(packed & 0x7FFF, u32::from(shape.cols));
        assert_eq!((packed >> 15) & 0x7FFF, u32::from(shape.rows));
        assert_eq!(packed >> 30, u32::from(shape.width - 1));
        assert_eq!(describe(&calibrations, 0x1_00), 0);
    }
}
