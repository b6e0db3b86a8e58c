mod support;

use isp_core::calibration::CalibrationId;
use isp_core::command::calibration::calibration;
use isp_core::command::ids::{
    AE_GAIN, AE_MODE, DONE, IMAGE_CROP_XOFFSET, IMAGE_RESIZE_ENABLE, IMAGE_RESIZE_WIDTH,
    MON_ERROR_CMOS_UPDATE_NOT_IN_VB, OFF, ON, RUN, SENSOR_HEIGHT, SENSOR_STREAMING, SENSOR_WIDTH,
    TALGORITHMS, TIMAGE, TMONITOR, TSENSOR,
};
use isp_core::command::{self, Direction, ErrorValue, Response, Status};
use isp_core::console::{Console, FRAME_END_VECTOR};
use isp_core::firmware::InputPortMode;
use isp_core::irq::Irq;
use isp_core::machines::{AeMode, ResizeTarget};

use support::{firmware, get, run_frame, set};

#[test]
fn manual_gain_is_released_by_auto_exposure() {
    let mut firmware = firmware(40);

    assert!(set(&mut firmware, TALGORITHMS, AE_MODE, AeMode::FullManual.to_raw()).is_success());
    assert!(set(&mut firmware, TALGORITHMS, AE_GAIN, 0x0200).is_success());
    assert_eq!(
        get(&mut firmware, TALGORITHMS, AE_GAIN),
        Response::success(0x0200)
    );

    assert!(set(&mut firmware, TALGORITHMS, AE_MODE, AeMode::Auto.to_raw()).is_success());
    for _ in 0..8 {
        run_frame(&mut firmware);
    }
    let gain = get(&mut firmware, TALGORITHMS, AE_GAIN);
    assert!(gain.is_success());
    assert_ne!(gain.ret, 0x0200);
}

#[test]
fn sensor_update_staged_after_blanking_is_reported() {
    let mut firmware = firmware(100);
    for _ in 0..4 {
        run_frame(&mut firmware);
    }
    let baseline = get(&mut firmware, TMONITOR, MON_ERROR_CMOS_UPDATE_NOT_IN_VB);
    assert!(baseline.is_success());

    // Work finished inside blanking commits cleanly.
    for _ in 0..2 {
        run_frame(&mut firmware);
    }
    assert_eq!(
        get(&mut firmware, TMONITOR, MON_ERROR_CMOS_UPDATE_NOT_IN_VB),
        baseline
    );

    // The frame end is still queued when the next frame starts, so the
    // exposure is split after blanking has closed.
    firmware.service_vector(0, FRAME_END_VECTOR);
    firmware.service_vector(0, Irq::FrameStart.mask());
    assert_eq!(firmware.skipped_frames(), 1);
    firmware.process().expect("initialized");
    firmware.service_vector(0, Irq::FrameStart.mask());
    firmware.process().expect("initialized");

    assert_eq!(
        get(&mut firmware, TMONITOR, MON_ERROR_CMOS_UPDATE_NOT_IN_VB).ret,
        baseline.ret + 1
    );
}

#[test]
fn crop_hanging_off_the_frame_is_clamped_on_run() {
    let mut firmware = firmware(512);
    assert_eq!(get(&mut firmware, TSENSOR, SENSOR_WIDTH).ret, 1920);
    assert_eq!(get(&mut firmware, TSENSOR, SENSOR_HEIGHT).ret, 1080);

    let crop_fr = u32::from(ResizeTarget::CropFr.to_raw()) << 16;
    assert!(set(&mut firmware, TIMAGE, IMAGE_CROP_XOFFSET, crop_fr | 1800).is_success());
    assert!(set(&mut firmware, TIMAGE, IMAGE_RESIZE_WIDTH, crop_fr | 200).is_success());
    assert!(set(&mut firmware, TIMAGE, IMAGE_RESIZE_ENABLE, crop_fr | RUN).is_success());

    firmware.service_vector(0, Irq::FrameWriterFr.mask());
    firmware.process().expect("initialized");

    let width = command::command(
        &mut firmware,
        0,
        TIMAGE,
        IMAGE_RESIZE_WIDTH,
        crop_fr,
        Direction::Get,
    );
    assert_eq!(width, Response::success(crop_fr | 120));
    let enable = command::command(
        &mut firmware,
        0,
        TIMAGE,
        IMAGE_RESIZE_ENABLE,
        crop_fr,
        Direction::Get,
    );
    assert_eq!(enable, Response::success(crop_fr | DONE));

    let regs = &firmware.active_mut().expect("active").shared().regs.crop_fr;
    assert!(regs.enable);
    assert_eq!(regs.start_x, 1800);
    assert_eq!(regs.size_x, 120);
    assert!(u32::from(regs.start_x) + u32::from(regs.size_x) <= 1920);
}

#[test]
fn short_calibration_write_leaves_the_table_unchanged() {
    let mut firmware = firmware(512);
    let id = CalibrationId::GAMMA;
    let mut before = [0u8; 512];
    let len = {
        let calibrations = &firmware.active_mut().expect("active").shared().calibrations;
        let bytes = calibrations.bytes(id).expect("gamma present");
        before[..bytes.len()].copy_from_slice(bytes);
        bytes.len()
    };

    let mut short = [0x5Au8; 512];
    let response = calibration(&mut firmware, 0, id.raw(), Direction::Set, &mut short[..len - 1]);
    assert_eq!(
        response,
        Response {
            status: Status::Fail,
            ret: ErrorValue::WrongSize.to_raw()
        }
    );

    let mut after = [0u8; 512];
    calibration(&mut firmware, 0, id.raw(), Direction::Get, &mut after[..len]);
    assert_eq!(after[..len], before[..len]);
}

#[test]
fn streaming_toggles_the_input_port() {
    let mut firmware = firmware(512);
    assert_eq!(get(&mut firmware, TSENSOR, SENSOR_STREAMING).ret, OFF);

    assert!(set(&mut firmware, TSENSOR, SENSOR_STREAMING, ON).is_success());
    assert_eq!(firmware.hardware().port, InputPortMode::SafeStart);
    assert_eq!(get(&mut firmware, TSENSOR, SENSOR_STREAMING).ret, ON);

    assert!(set(&mut firmware, TSENSOR, SENSOR_STREAMING, OFF).is_success());
    assert_eq!(firmware.hardware().port, InputPortMode::SafeStop);
    assert_eq!(get(&mut firmware, TSENSOR, SENSOR_STREAMING).ret, OFF);
}

#[test]
fn console_script_drives_a_session() {
    let mut firmware = firmware(100);
    let mut console: Console<8> = Console::new();
    let mut out: heapless::String<512> = heapless::String::new();

    for line in [
        "set ae_mode 0",
        "frame 3",
        "get ae_mode",
        "set brightness 140",
        "history",
        "status",
    ] {
        out.clear();
        console
            .execute(&mut firmware, line, &mut out)
            .unwrap_or_else(|error| panic!("`{line}` failed: {error}"));
    }
    assert_eq!(console.history().len(), 3);
    assert!(out.starts_with("context 0/1"));
}
