//! `TSENSOR` and `TLENS`.

use super::ids::{
    LENS_INFO_APERTURE, LENS_INFO_FOCAL_LENGTH, LENS_INFO_HYPERFOCAL_DISTANCE,
    LENS_INFO_MINFOCUS_DISTANCE, OFF, ON, SENSOR_EXPOSURES, SENSOR_FPS, SENSOR_HEIGHT,
    SENSOR_INFO_BITS, SENSOR_INFO_EXPOSURES, SENSOR_INFO_FPS, SENSOR_INFO_HEIGHT,
    SENSOR_INFO_PHYSICAL_HEIGHT, SENSOR_INFO_PHYSICAL_WIDTH, SENSOR_INFO_PRESET,
    SENSOR_INFO_WDR_MODE, SENSOR_INFO_WIDTH, SENSOR_INTEGRATION_TIME_LIMIT,
    SENSOR_INTEGRATION_TIME_MIN, SENSOR_LINES_PER_SECOND, SENSOR_PRESET, SENSOR_STREAMING,
    SENSOR_SUPPORTED_PRESETS, SENSOR_WDR_MODE, SENSOR_WIDTH,
};
use super::{CommandError, CommandResult, Direction, ErrorValue, get_only, on_off, read, write};
use crate::dispatcher::Dispatcher;
use crate::event::Event;
use crate::firmware::{IspFirmware, IspHardware};
use crate::machines::{AfGet, LensOptic};
use crate::param::{Get, ParamError, ParamValue, Set};
use crate::sensor::{SensorGet, SensorInfo, SensorMode, SensorSet};

pub(super) fn handle<H, const C: usize, const Q: usize>(
    firmware: &mut IspFirmware<H, C, Q>,
    ctx: usize,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult
where
    H: IspHardware,
{
    match (id, direction) {
        (SENSOR_STREAMING, Direction::Get) => {
            let streaming = streaming(firmware.context_checked(ctx)?)?;
            Ok(if streaming { ON } else { OFF })
        }
        (SENSOR_STREAMING, Direction::Set) => set_streaming(firmware, ctx, value),
        (SENSOR_PRESET, Direction::Get) => Ok(u32::from(info(firmware.context_checked(ctx)?)?.preset)),
        (SENSOR_PRESET, Direction::Set) => set_preset(firmware, ctx, value),
        (SENSOR_INFO_PRESET, Direction::Get) => {
            read(firmware.context_checked(ctx)?, Get::Sensor(SensorGet::InfoPreset))
        }
        (SENSOR_INFO_PRESET, Direction::Set) => {
            let preset =
                u8::try_from(value).map_err(|_| CommandError::Fail(ErrorValue::BadArgument))?;
            write(
                firmware.context_checked(ctx)?,
                Set::Sensor(SensorSet::InfoPreset(preset)),
            )
        }
        (
            SENSOR_INFO_WDR_MODE | SENSOR_INFO_FPS | SENSOR_INFO_WIDTH | SENSOR_INFO_HEIGHT
            | SENSOR_INFO_BITS | SENSOR_INFO_EXPOSURES,
            _,
        ) => get_only(direction, || {
            let mode = info_mode(firmware.context_checked(ctx)?)?;
            Ok(match id {
                SENSOR_INFO_WDR_MODE => mode.wdr_mode.to_raw(),
                SENSOR_INFO_FPS => mode.fps,
                SENSOR_INFO_WIDTH => u32::from(mode.resolution.width),
                SENSOR_INFO_HEIGHT => u32::from(mode.resolution.height),
                SENSOR_INFO_BITS => u32::from(mode.bits),
                _ => u32::from(mode.exposures),
            })
        }),
        (
            SENSOR_SUPPORTED_PRESETS | SENSOR_WDR_MODE | SENSOR_FPS | SENSOR_WIDTH
            | SENSOR_HEIGHT | SENSOR_EXPOSURES | SENSOR_LINES_PER_SECOND
            | SENSOR_INTEGRATION_TIME_MIN | SENSOR_INTEGRATION_TIME_LIMIT
            | SENSOR_INFO_PHYSICAL_WIDTH | SENSOR_INFO_PHYSICAL_HEIGHT,
            _,
        ) => get_only(direction, || {
            let info = info(firmware.context_checked(ctx)?)?;
            Ok(info_field(&info, id))
        }),
        _ => Err(CommandError::NotExists),
    }
}

fn info_field(info: &SensorInfo, id: u8) -> u32 {
    match id {
        SENSOR_SUPPORTED_PRESETS => u32::from(info.modes_num),
        SENSOR_WDR_MODE => info.mode.wdr_mode.to_raw(),
        SENSOR_FPS => info.mode.fps,
        SENSOR_WIDTH => u32::from(info.active.width),
        SENSOR_HEIGHT => u32::from(info.active.height),
        SENSOR_EXPOSURES => u32::from(info.mode.exposures),
        SENSOR_LINES_PER_SECOND => info.lines_per_second,
        SENSOR_INTEGRATION_TIME_MIN => info.integration_time_min,
        SENSOR_INTEGRATION_TIME_LIMIT => info.integration_time_limit,
        SENSOR_INFO_PHYSICAL_WIDTH => info.physical_width,
        _ => info.physical_height,
    }
}

fn info<const Q: usize>(context: &mut Dispatcher<Q>) -> Result<SensorInfo, CommandError> {
    Ok(context.get(Get::Sensor(SensorGet::Info))?.as_sensor()?)
}

fn info_mode<const Q: usize>(context: &mut Dispatcher<Q>) -> Result<SensorMode, CommandError> {
    match context.get(Get::Sensor(SensorGet::InfoMode))? {
        ParamValue::Mode(mode) => Ok(mode),
        _ => Err(ParamError::TypeMismatch.into()),
    }
}

fn streaming<const Q: usize>(context: &mut Dispatcher<Q>) -> Result<bool, CommandError> {
    Ok(context.get(Get::Sensor(SensorGet::Streaming))?.as_bool()?)
}

/// Stopping halts the input port first; starting brings it back last.
fn set_streaming<H, const C: usize, const Q: usize>(
    firmware: &mut IspFirmware<H, C, Q>,
    ctx: usize,
    value: u32,
) -> CommandResult
where
    H: IspHardware,
{
    let streaming = streaming(firmware.context_checked(ctx)?)?;
    let enable = on_off(value)?;
    match (enable, streaming) {
        (false, true) => {
            firmware.safe_stop(ctx)?;
            write(
                firmware.context_checked(ctx)?,
                Set::Sensor(SensorSet::Streaming(false)),
            )?;
        }
        (true, false) => {
            write(
                firmware.context_checked(ctx)?,
                Set::Sensor(SensorSet::Streaming(true)),
            )?;
            firmware.safe_start(ctx)?;
        }
        _ => return Err(CommandError::NotSupported),
    }
    isp_info!("context {} sensor streaming {}", ctx, enable);
    Ok(0)
}

/// Applies a preset with the input port stopped around the sensor reset.
fn set_preset<H, const C: usize, const Q: usize>(
    firmware: &mut IspFirmware<H, C, Q>,
    ctx: usize,
    value: u32,
) -> CommandResult
where
    H: IspHardware,
{
    let modes = info(firmware.context_checked(ctx)?)?.modes_num;
    let preset = u8::try_from(value)
        .ok()
        .filter(|preset| *preset < modes)
        .ok_or(CommandError::Fail(ErrorValue::Unknown))?;

    write(firmware.context_checked(ctx)?, Set::Sensor(SensorSet::Preset(preset)))?;
    firmware.safe_stop(ctx)?;
    let context = firmware.context_checked(ctx)?;
    context.raise(Event::ResetSensorHw);
    context.process_events(None);
    firmware.safe_start(ctx)?;
    isp_info!("sensor preset {} applied", preset);
    Ok(0)
}

pub(super) fn lens<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: u8,
    direction: Direction,
) -> CommandResult {
    let optic = match id {
        LENS_INFO_MINFOCUS_DISTANCE => LensOptic::MinFocusDistance,
        LENS_INFO_HYPERFOCAL_DISTANCE => LensOptic::HyperfocalDistance,
        LENS_INFO_FOCAL_LENGTH => LensOptic::FocalLength,
        LENS_INFO_APERTURE => LensOptic::Aperture,
        _ => return Err(CommandError::NotExists),
    };
    get_only(direction, || read(context, Get::Af(AfGet::Optic(optic))))
}

#[cfg(test)]
mod tests {
    use super::super::ids::{TLENS, TSENSOR};
    use super::super::tests::{firmware, get, set};
    use super::super::{Response, Status};
    use super::*;

    #[test]
    fn streaming_toggles_once_per_direction() {
        let mut firmware = firmware();
        assert_eq!(get(&mut firmware, TSENSOR, SENSOR_STREAMING).ret, OFF);
        assert_eq!(
            set(&mut firmware, TSENSOR, SENSOR_STREAMING, OFF).status,
            Status::NotSupported
        );
        assert!(set(&mut firmware, TSENSOR, SENSOR_STREAMING, ON).is_success());
        assert_eq!(get(&mut firmware, TSENSOR, SENSOR_STREAMING).ret, ON);
        assert_eq!(
            set(&mut firmware, TSENSOR, SENSOR_STREAMING, ON).status,
            Status::NotSupported
        );
        assert!(set(&mut firmware, TSENSOR, SENSOR_STREAMING, OFF).is_success());
        assert_eq!(
            set(&mut firmware, TSENSOR, SENSOR_STREAMING, 7).status,
            Status::NotSupported
        );
    }

    #[test]
    fn sensor_geometry_is_read_only() {
        let mut firmware = firmware();
        assert_eq!(get(&mut firmware, TSENSOR, SENSOR_WIDTH), Response::success(1920));
        assert_eq!(get(&mut firmware, TSENSOR, SENSOR_HEIGHT), Response::success(1080));
        assert_eq!(get(&mut firmware, TSENSOR, SENSOR_SUPPORTED_PRESETS).ret, 1);
        assert_eq!(
            set(&mut firmware, TSENSOR, SENSOR_WIDTH, 640).status,
            Status::NotSupported
        );
        assert_eq!(get(&mut firmware, TSENSOR, SENSOR_INFO_WIDTH).ret, 1920);
    }

    #[test]
    fn unknown_preset_fails() {
        let mut firmware = firmware();
        assert_eq!(
            set(&mut firmware, TSENSOR, SENSOR_PRESET, 1).status,
            Status::Fail
        );
        assert!(set(&mut firmware, TSENSOR, SENSOR_PRESET, 0).is_success());
        assert_eq!(get(&mut firmware, TSENSOR, SENSOR_PRESET).ret, 0);
        assert_eq!(
            set(&mut firmware, TSENSOR, SENSOR_INFO_PRESET, 3).status,
            Status::Fail
        );
    }

    #[test]
    fn lens_optics_are_read_only() {
        let mut firmware = firmware();
        assert_eq!(
            get(&mut firmware, TLENS, LENS_INFO_FOCAL_LENGTH),
            Response::success(40_000)
        );
        assert_eq!(
            set(&mut firmware, TLENS, LENS_INFO_APERTURE, 1).status,
            Status::NotSupported
        );
        assert_eq!(get(&mut firmware, TLENS, 0x30).status, Status::NotExists);
    }
}
