//! `TIMAGE`, `TSCENE_MODES` and `TREGISTERS`.

use super::ids::{
    BRIGHTNESS_STRENGTH, COLOR_MODE, CONTRAST_STRENGTH, DISABLE, DMA_READER_OUTPUT,
    DS1_FORMAT_BASE_PLANE, DS1_FPS_THROTTLE_FACTOR, DONE, ENABLE, FR_FORMAT_BASE_PLANE,
    FR_FPS_THROTTLE_FACTOR, FR_RAW_BYPASS, HUE_THETA, IMAGE_CROP_XOFFSET, IMAGE_CROP_YOFFSET,
    IMAGE_RESIZE_ENABLE, IMAGE_RESIZE_HEIGHT, IMAGE_RESIZE_TYPE, IMAGE_RESIZE_WIDTH,
    ORIENTATION_VFLIP, REGISTERS_ADDRESS, REGISTERS_SIZE, REGISTERS_SOURCE, REGISTERS_VALUE, RUN,
    SATURATION_NEUTRAL, SATURATION_STRENGTH, SATURATION_VIVID, SHADING_STRENGTH,
    SHARPENING_STRENGTH,
};
use super::{CommandError, CommandResult, Direction, ErrorValue, read, write};
use crate::dispatcher::Dispatcher;
use crate::machines::{
    AeSet, AfGet, AfSet, ColorMatrixGet, ColorMatrixSet, ColorMode, CropGet, CropSet, DmaFormat,
    DmaPipe, DmaWriterGet, DmaWriterSet, GeneralGet, GeneralSet, MatrixYuvGet, MatrixYuvSet,
    RegisterSource, ResizeTarget, SharpeningGet, SharpeningSet,
};
use crate::param::{Get, Set};

/// Largest value accepted by the 8-bit scene strengths.
const STRENGTH_MAX: u32 = 255;
const HUE_THETA_MAX: u32 = 360;

const BAD_ARGUMENT: CommandError = CommandError::Fail(ErrorValue::BadArgument);

pub(super) fn handle<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult {
    match id {
        DMA_READER_OUTPUT => match direction {
            Direction::Get => read(context, Get::DmaWriter(DmaWriterGet::ReaderOutput)),
            Direction::Set => {
                let pipe = DmaPipe::from_raw(value).ok_or(CommandError::Fail(ErrorValue::Unknown))?;
                write(context, Set::DmaWriter(DmaWriterSet::ReaderOutput(pipe)))
            }
        },
        FR_FORMAT_BASE_PLANE | DS1_FORMAT_BASE_PLANE => {
            let pipe = if id == FR_FORMAT_BASE_PLANE {
                DmaPipe::Fr
            } else {
                DmaPipe::Ds
            };
            match direction {
                Direction::Get => read(context, Get::DmaWriter(DmaWriterGet::Format(pipe))),
                Direction::Set => {
                    let format = DmaFormat::from_raw(value).ok_or(CommandError::NotSupported)?;
                    write(context, Set::DmaWriter(DmaWriterSet::Format(pipe, format)))
                }
            }
        }
        FR_RAW_BYPASS => match direction {
            Direction::Get => read(context, Get::DmaWriter(DmaWriterGet::RawBypass)),
            Direction::Set => write(context, Set::DmaWriter(DmaWriterSet::RawBypass(value != 0))),
        },
        FR_FPS_THROTTLE_FACTOR | DS1_FPS_THROTTLE_FACTOR => {
            let pipe = if id == FR_FPS_THROTTLE_FACTOR {
                DmaPipe::Fr
            } else {
                DmaPipe::Ds
            };
            match direction {
                Direction::Get => read(context, Get::DmaWriter(DmaWriterGet::FpsThrottle(pipe))),
                Direction::Set => {
                    let factor = u8::try_from(value)
                        .map_err(|_| CommandError::Fail(ErrorValue::Unknown))?;
                    context
                        .set(Set::DmaWriter(DmaWriterSet::FpsThrottle(pipe, factor)))
                        .map_err(|_| CommandError::Fail(ErrorValue::Unknown))?;
                    Ok(0)
                }
            }
        }
        ORIENTATION_VFLIP => match direction {
            Direction::Get => {
                let flipped = context.get(Get::DmaWriter(DmaWriterGet::Vflip))?.as_bool()?;
                Ok(if flipped { ENABLE } else { DISABLE })
            }
            Direction::Set => {
                let flipped = match value {
                    ENABLE => true,
                    DISABLE => false,
                    _ => return Err(BAD_ARGUMENT),
                };
                write(context, Set::DmaWriter(DmaWriterSet::Vflip(flipped)))?;
                refresh_rois(context)?;
                Ok(0)
            }
        },
        IMAGE_RESIZE_TYPE => match direction {
            Direction::Get => read(context, Get::Crop(CropGet::ResizeType)),
            Direction::Set => {
                let target = u16::try_from(value)
                    .ok()
                    .and_then(ResizeTarget::from_raw)
                    .ok_or(BAD_ARGUMENT)?;
                write(context, Set::Crop(CropSet::ResizeType(target)))
            }
        },
        IMAGE_RESIZE_ENABLE
        | IMAGE_RESIZE_WIDTH
        | IMAGE_RESIZE_HEIGHT
        | IMAGE_CROP_XOFFSET
        | IMAGE_CROP_YOFFSET => resize(context, id, value, direction),
        _ => Err(CommandError::NotExists),
    }
}

/// Mirrors both metering windows after an orientation change. AF failures
/// are ignored since a context may have no lens.
fn refresh_rois<const Q: usize>(context: &mut Dispatcher<Q>) -> Result<(), CommandError> {
    if let Ok(roi) = context.get(Get::Af(AfGet::Roi)).and_then(|value| value.as_u32()) {
        let _ = context.set(Set::Af(AfSet::Roi(roi)));
    }
    context.set(Set::Ae(AeSet::RefreshRoi))?;
    Ok(())
}

/// Packed resize commands: the block in the upper half, the field below.
fn resize<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult {
    let [hi0, hi1, lo0, lo1] = value.to_be_bytes();
    let target = ResizeTarget::from_raw(u16::from_be_bytes([hi0, hi1])).ok_or(BAD_ARGUMENT)?;
    let field = u16::from_be_bytes([lo0, lo1]);
    let header = value & 0xFFFF_0000;

    let (get, set) = match id {
        IMAGE_RESIZE_ENABLE => (CropGet::Done(target), CropSet::Run(target)),
        IMAGE_RESIZE_WIDTH => (CropGet::XSize(target), CropSet::XSize(target, field)),
        IMAGE_RESIZE_HEIGHT => (CropGet::YSize(target), CropSet::YSize(target, field)),
        IMAGE_CROP_XOFFSET => (CropGet::XOffset(target), CropSet::XOffset(target, field)),
        _ => (CropGet::YOffset(target), CropSet::YOffset(target, field)),
    };

    match direction {
        Direction::Get => {
            let current = read(context, Get::Crop(get)).map_err(|_| BAD_ARGUMENT)?;
            let current = if id == IMAGE_RESIZE_ENABLE {
                if current != 0 { DONE } else { RUN }
            } else {
                current
            };
            Ok(header | current)
        }
        Direction::Set => {
            if id == IMAGE_RESIZE_ENABLE && u32::from(field) != RUN {
                return Err(BAD_ARGUMENT);
            }
            context.set(Set::Crop(set)).map_err(|_| BAD_ARGUMENT)?;
            Ok(0)
        }
    }
}

/// Strength-style scene values share the 8-bit bound.
fn strength(value: u32) -> Result<u32, CommandError> {
    if value > STRENGTH_MAX {
        return Err(CommandError::NotSupported);
    }
    Ok(value)
}

pub(super) fn scene_modes<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult {
    let (get, set) = match id {
        COLOR_MODE => {
            if direction == Direction::Set {
                let mode = ColorMode::from_raw(value).ok_or(CommandError::NotSupported)?;
                let saturation = if mode == ColorMode::Vivid {
                    SATURATION_VIVID
                } else {
                    SATURATION_NEUTRAL
                };
                context.set(Set::MatrixYuv(MatrixYuvSet::Saturation(saturation)))?;
                return write(context, Set::MatrixYuv(MatrixYuvSet::ColorMode(mode)));
            }
            return read(context, Get::MatrixYuv(MatrixYuvGet::ColorMode));
        }
        BRIGHTNESS_STRENGTH => (
            Get::MatrixYuv(MatrixYuvGet::Brightness),
            Set::MatrixYuv(MatrixYuvSet::Brightness(value)),
        ),
        CONTRAST_STRENGTH => (
            Get::MatrixYuv(MatrixYuvGet::Contrast),
            Set::MatrixYuv(MatrixYuvSet::Contrast(value)),
        ),
        SATURATION_STRENGTH => (
            Get::MatrixYuv(MatrixYuvGet::Saturation),
            Set::MatrixYuv(MatrixYuvSet::Saturation(value)),
        ),
        SHARPENING_STRENGTH => (
            Get::Sharpening(SharpeningGet::Strength),
            Set::Sharpening(SharpeningSet::Strength(value)),
        ),
        SHADING_STRENGTH => (
            Get::ColorMatrix(ColorMatrixGet::ShadingStrength),
            Set::ColorMatrix(ColorMatrixSet::ShadingStrength(value)),
        ),
        HUE_THETA => (
            Get::MatrixYuv(MatrixYuvGet::HueTheta),
            Set::MatrixYuv(MatrixYuvSet::HueTheta(value)),
        ),
        _ => return Err(CommandError::NotExists),
    };

    match direction {
        Direction::Get => read(context, get),
        Direction::Set => {
            if id == HUE_THETA {
                if value > HUE_THETA_MAX {
                    return Err(CommandError::NotSupported);
                }
            } else {
                strength(value)?;
            }
            write(context, set)
        }
    }
}

pub(super) fn registers<const Q: usize>(
    context: &mut Dispatcher<Q>,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult {
    let (get, set) = match id {
        REGISTERS_ADDRESS => (GeneralGet::RegisterAddress, GeneralSet::RegisterAddress(value)),
        REGISTERS_SIZE => (GeneralGet::RegisterSize, GeneralSet::RegisterSize(value)),
        REGISTERS_SOURCE => {
            let source = match direction {
                Direction::Set => {
                    RegisterSource::from_raw(value).ok_or(CommandError::NotSupported)?
                }
                Direction::Get => RegisterSource::default(),
            };
            (GeneralGet::RegisterSource, GeneralSet::RegisterSource(source))
        }
        REGISTERS_VALUE => (GeneralGet::RegisterValue, GeneralSet::RegisterValue(value)),
        _ => return Err(CommandError::NotExists),
    };
    match direction {
        Direction::Get => read(context, Get::General(get)),
        Direction::Set => write(context, Set::General(set)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::ids::{TIMAGE, TREGISTERS, TSCENE_MODES};
    use super::super::tests::{firmware, get, set};
    use super::super::{Response, Status};
    use super::*;

    #[test]
    fn resize_fields_carry_their_block() {
        let mut firmware = firmware();
        let crop_ds = u32::from(ResizeTarget::CropDs.to_raw()) << 16;
        assert!(set(&mut firmware, TIMAGE, IMAGE_RESIZE_WIDTH, crop_ds | 640).is_success());
        let response = command_get(&mut firmware, IMAGE_RESIZE_WIDTH, crop_ds);
        assert_eq!(response, Response::success(crop_ds | 640));
        assert_eq!(
            set(&mut firmware, TIMAGE, IMAGE_RESIZE_WIDTH, (7 << 16) | 640).status,
            Status::Fail
        );
    }

    fn command_get(
        firmware: &mut crate::firmware::IspFirmware<crate::firmware::NullHardware, 2, 32>,
        id: u8,
        value: u32,
    ) -> Response {
        super::super::command(firmware, 0, TIMAGE, id, value, Direction::Get)
    }

    #[test]
    fn resize_enable_only_accepts_run() {
        let mut firmware = firmware();
        assert_eq!(
            set(&mut firmware, TIMAGE, IMAGE_RESIZE_ENABLE, DONE),
            Response {
                status: Status::Fail,
                ret: ErrorValue::BadArgument.to_raw()
            }
        );
        assert!(set(&mut firmware, TIMAGE, IMAGE_RESIZE_ENABLE, RUN).is_success());
        assert_eq!(get(&mut firmware, TIMAGE, IMAGE_RESIZE_ENABLE).ret, RUN);
    }

    #[test]
    fn scaler_has_no_offsets() {
        let mut firmware = firmware();
        let scaler = u32::from(ResizeTarget::ScalerFr.to_raw()) << 16;
        assert_eq!(
            set(&mut firmware, TIMAGE, IMAGE_CROP_XOFFSET, scaler | 8).status,
            Status::Fail
        );
    }

    #[test]
    fn vflip_round_trips_and_rejects_other_values() {
        let mut firmware = firmware();
        assert!(set(&mut firmware, TIMAGE, ORIENTATION_VFLIP, ENABLE).is_success());
        assert_eq!(get(&mut firmware, TIMAGE, ORIENTATION_VFLIP).ret, ENABLE);
        assert_eq!(
            set(&mut firmware, TIMAGE, ORIENTATION_VFLIP, 2).status,
            Status::Fail
        );
    }

    #[test]
    fn throttle_and_formats() {
        let mut firmware = firmware();
        assert_eq!(
            set(&mut firmware, TIMAGE, FR_FPS_THROTTLE_FACTOR, 0),
            Response {
                status: Status::Fail,
                ret: ErrorValue::Unknown.to_raw()
            }
        );
        assert!(set(&mut firmware, TIMAGE, DS1_FPS_THROTTLE_FACTOR, 2).is_success());
        assert_eq!(get(&mut firmware, TIMAGE, DS1_FPS_THROTTLE_FACTOR).ret, 2);
        assert_eq!(
            set(&mut firmware, TIMAGE, FR_FORMAT_BASE_PLANE, 99).status,
            Status::NotSupported
        );
        assert_eq!(
            set(&mut firmware, TIMAGE, DMA_READER_OUTPUT, 2).status,
            Status::Fail
        );
    }

    #[test]
    fn vivid_colour_mode_raises_saturation() {
        let mut firmware = firmware();
        let vivid = ColorMode::Vivid.to_raw();
        assert!(set(&mut firmware, TSCENE_MODES, COLOR_MODE, vivid).is_success());
        assert_eq!(
            get(&mut firmware, TSCENE_MODES, SATURATION_STRENGTH).ret,
            SATURATION_VIVID
        );
        assert!(set(&mut firmware, TSCENE_MODES, COLOR_MODE, 0).is_success());
        assert_eq!(
            get(&mut firmware, TSCENE_MODES, SATURATION_STRENGTH).ret,
            SATURATION_NEUTRAL
        );
    }

    #[test]
    fn scene_strengths_are_bounded() {
        let mut firmware = firmware();
        assert_eq!(
            set(&mut firmware, TSCENE_MODES, BRIGHTNESS_STRENGTH, 256).status,
            Status::NotSupported
        );
        assert!(set(&mut firmware, TSCENE_MODES, HUE_THETA, 360).is_success());
        assert_eq!(
            set(&mut firmware, TSCENE_MODES, HUE_THETA, 361).status,
            Status::NotSupported
        );
    }

    #[test]
    fn register_source_is_validated() {
        let mut firmware = firmware();
        assert_eq!(
            set(&mut firmware, TREGISTERS, REGISTERS_SOURCE, 9).status,
            Status::NotSupported
        );
        assert!(set(&mut firmware, TREGISTERS, REGISTERS_ADDRESS, 0x40).is_success());
        assert_eq!(get(&mut firmware, TREGISTERS, REGISTERS_ADDRESS).ret, 0x40);
    }
}
