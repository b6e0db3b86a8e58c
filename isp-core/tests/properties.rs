mod support;

use isp_core::command::ids::{
    AE_SPLIT_PRESET, AWB_MODE, MON_STATUS_AE_RESET, SYSTEM_MAX_INTEGRATION_TIME,
    SYSTEM_MAX_SENSOR_ANALOG_GAIN, SYSTEM_SENSOR_ANALOG_GAIN, TALGORITHMS, TMONITOR, TSYSTEM,
};
use isp_core::event::{Event, EventQueue};
use isp_core::machines::AeGet;
use isp_core::param::Get;
use isp_core::sensor::DummyConfig;
use isp_core::stats::{compress_bin, decompress_bin};

use support::{firmware, firmware_with_sensor, get, run_frame, set};

#[test]
fn events_leave_in_arrival_order() {
    let queue: EventQueue<8> = EventQueue::new();
    let sent = [
        Event::FrameEnd,
        Event::AeStatsReady,
        Event::AwbStatsReady,
        Event::FrameEnd,
        Event::SharpLutUpdate,
    ];
    for event in sent {
        queue.push(event).expect("room left");
    }
    assert_eq!(queue.len(), sent.len());

    let mut received = heapless::Vec::<Event, 8>::new();
    while let Some(event) = queue.pop() {
        received.push(event).expect("room left");
    }
    assert_eq!(received.as_slice(), &sent);
    assert_eq!(queue.dropped(), 0);
}

#[test]
fn full_queue_drops_the_newest_event() {
    let queue: EventQueue<2> = EventQueue::new();
    queue.push(Event::FrameEnd).expect("room left");
    queue.push(Event::UpdateIridix).expect("room left");
    assert!(queue.push(Event::AfRefocus).is_err());
    assert_eq!(queue.dropped(), 1);
    assert_eq!(queue.pop(), Some(Event::FrameEnd));
    assert_eq!(queue.pop(), Some(Event::UpdateIridix));
    assert_eq!(queue.pop(), None);
}

#[test]
fn exposure_output_never_runs_ahead_of_the_frame() {
    let mut firmware = firmware(300);
    for _ in 0..5 {
        run_frame(&mut firmware);
    }
    let context = firmware.active_mut().expect("active");
    let frame_id = context.shared().frame_id;
    let ae_frame = context
        .get(Get::Ae(AeGet::FrameId))
        .and_then(|value| value.as_u32())
        .expect("ae frame id");
    assert_ne!(ae_frame, 0);
    assert!(ae_frame <= frame_id);
}

#[test]
fn monitor_latency_stays_within_its_bounds() {
    let mut firmware = firmware(300);
    for _ in 0..6 {
        run_frame(&mut firmware);
    }
    for triple in 0..3u8 {
        let base = MON_STATUS_AE_RESET + 1 + triple * 3;
        let min = get(&mut firmware, TMONITOR, base).ret;
        let cur = get(&mut firmware, TMONITOR, base + 1).ret;
        let max = get(&mut firmware, TMONITOR, base + 2).ret;
        assert!(min <= cur && cur <= max, "{min} <= {cur} <= {max}");
    }
}

#[test]
fn switching_split_preset_restores_max_integration_time() {
    let mut firmware = firmware_with_sensor(
        512,
        DummyConfig {
            integration_time_max: 800,
            integration_time_limit: 1200,
            ..DummyConfig::default()
        },
    );
    assert!(set(&mut firmware, TSYSTEM, SYSTEM_MAX_INTEGRATION_TIME, 600).is_success());
    assert_eq!(get(&mut firmware, TSYSTEM, SYSTEM_MAX_INTEGRATION_TIME).ret, 600);

    assert!(set(&mut firmware, TALGORITHMS, AE_SPLIT_PRESET, 1).is_success());
    assert_eq!(get(&mut firmware, TALGORITHMS, AE_SPLIT_PRESET).ret, 1);
    assert_eq!(get(&mut firmware, TSYSTEM, SYSTEM_MAX_INTEGRATION_TIME).ret, 1200);

    // Selecting the preset twice keeps the first saved ceiling.
    assert!(set(&mut firmware, TALGORITHMS, AE_SPLIT_PRESET, 1).is_success());
    assert!(set(&mut firmware, TALGORITHMS, AE_SPLIT_PRESET, 0).is_success());
    assert_eq!(get(&mut firmware, TSYSTEM, SYSTEM_MAX_INTEGRATION_TIME).ret, 600);
}

#[test]
fn analog_gain_is_capped_by_its_maximum() {
    let mut firmware = firmware(512);
    assert!(set(&mut firmware, TSYSTEM, SYSTEM_SENSOR_ANALOG_GAIN, u32::MAX).is_success());
    let gain = get(&mut firmware, TSYSTEM, SYSTEM_SENSOR_ANALOG_GAIN).ret;
    let max = get(&mut firmware, TSYSTEM, SYSTEM_MAX_SENSOR_ANALOG_GAIN).ret;
    assert_eq!(gain, max);
}

#[test]
fn reads_have_no_side_effects() {
    let mut firmware = firmware(512);
    for (kind, id) in [
        (TALGORITHMS, AWB_MODE),
        (TSYSTEM, SYSTEM_MAX_INTEGRATION_TIME),
        (TALGORITHMS, AE_SPLIT_PRESET),
    ] {
        let first = get(&mut firmware, kind, id);
        let queued = firmware.active_mut().expect("active").events().len();
        assert_eq!(get(&mut firmware, kind, id), first);
        assert_eq!(
            firmware.active_mut().expect("active").events().len(),
            queued
        );
    }
}

#[test]
fn compressed_bins_lose_only_low_bits() {
    for value in [0, 1, 0x0FFF, 0x1000, 0x1FFF, 0x2345, 1920 * 1080, 0x00FF_FFFF] {
        let restored = decompress_bin(compress_bin(value));
        assert!(restored <= value, "{value:#x} -> {restored:#x}");
        let kept = 32 - value.leading_zeros();
        if kept > 13 {
            assert!(value - restored < 1 << (kept - 13), "{value:#x}");
        } else {
            assert_eq!(restored, value);
        }
    }
}
