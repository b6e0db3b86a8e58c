#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status counters for the firmware target.
//!
//! The ISP task updates these atomics as frames go by so the console can
//! print a banner on connect without locking the firmware.

use portable_atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

/// Interrupt vectors taken from the ISP line.
static IRQ_COUNT: AtomicU32 = AtomicU32::new(0);
/// Events handled by the task-side drain.
static EVENTS_HANDLED: AtomicU32 = AtomicU32::new(0);
/// Frame id of the active context after the last drain.
static FRAME_ID: AtomicU32 = AtomicU32::new(0);
/// Frame starts skipped because the previous frame was still in flight.
static SKIPPED_FRAMES: AtomicU32 = AtomicU32::new(0);
/// Exposure of the last recorded frame, log2 fixed point.
static EXPOSURE_LOG2: AtomicI32 = AtomicI32::new(0);
/// Host has the console port open.
static CONSOLE_ATTACHED: AtomicBool = AtomicBool::new(false);
/// Set once bring-up finished without error.
static FIRMWARE_READY: AtomicBool = AtomicBool::new(false);

/// Point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub ready: bool,
    pub irq_count: u32,
    pub events_handled: u32,
    pub frame_id: u32,
    pub skipped_frames: u32,
    pub exposure_log2: i32,
    pub console_attached: bool,
}

impl core::fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "ready {} irqs {} events {} frame {} skipped {} exp_log2 {}",
            self.ready,
            self.irq_count,
            self.events_handled,
            self.frame_id,
            self.skipped_frames,
            self.exposure_log2
        )
    }
}

pub fn record_ready(ready: bool) {
    FIRMWARE_READY.store(ready, Ordering::Relaxed);
}

pub fn record_irq() {
    IRQ_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Records one drain pass of the event queues.
pub fn record_drain(handled: usize, frame_id: u32, skipped_frames: u32) {
    let handled = u32::try_from(handled).unwrap_or(u32::MAX);
    EVENTS_HANDLED.fetch_add(handled, Ordering::Relaxed);
    FRAME_ID.store(frame_id, Ordering::Relaxed);
    SKIPPED_FRAMES.store(skipped_frames, Ordering::Relaxed);
}

pub fn record_exposure(exposure_log2: i32) {
    EXPOSURE_LOG2.store(exposure_log2, Ordering::Relaxed);
}

pub fn set_console_attached(attached: bool) {
    CONSOLE_ATTACHED.store(attached, Ordering::Relaxed);
}

pub fn snapshot() -> StatusSnapshot {
    StatusSnapshot {
        ready: FIRMWARE_READY.load(Ordering::Relaxed),
        irq_count: IRQ_COUNT.load(Ordering::Relaxed),
        events_handled: EVENTS_HANDLED.load(Ordering::Relaxed),
        frame_id: FRAME_ID.load(Ordering::Relaxed),
        skipped_frames: SKIPPED_FRAMES.load(Ordering::Relaxed),
        exposure_log2: EXPOSURE_LOG2.load(Ordering::Relaxed),
        console_attached: CONSOLE_ATTACHED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_accumulate_and_frames_overwrite() {
        let before = snapshot().events_handled;
        record_drain(3, 10, 0);
        record_drain(2, 11, 1);
        record_exposure(-5);
        let snapshot = snapshot();
        assert!(snapshot.events_handled >= before + 5);
        assert_eq!(snapshot.frame_id, 11);
        assert_eq!(snapshot.skipped_frames, 1);
        assert_eq!(snapshot.exposure_log2, -5);
    }
}
