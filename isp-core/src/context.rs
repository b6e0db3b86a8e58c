//! State shared by every machine of one context.
//!
//! Each field has a single writer. Machines write their own register blocks and
//! read the statistics snapshot; the firmware owns the frame counter, the freeze
//! flag and the statistics copy.

use crate::calibration::CalibrationSet;
use crate::logging::LogLevel;
use crate::machines::IsoBaseGains;
use crate::regs::IspRegisters;
use crate::stats::FrameStats;

/// Per-context data that is not owned by a single machine.
#[derive(Clone, Debug)]
pub struct ContextShared {
    pub context_id: u8,
    pub calibrations: CalibrationSet,
    /// Shadow register file committed to hardware at frame start.
    pub regs: IspRegisters,
    pub stats: FrameStats,
    /// Incremented on every frame start.
    pub frame_id: u32,
    /// Set by `SYSTEM_FREEZE_FIRMWARE`.
    pub frozen: bool,
    pub log_level: LogLevel,
    pub log_mask: u32,
    /// Set by the frame-end interrupt, cleared once the next frame starts.
    pub in_vblank: bool,
    pub iso_base: IsoBaseGains,
}

impl ContextShared {
    #[must_use]
    pub fn new(context_id: u8, calibrations: CalibrationSet, iso_base: IsoBaseGains) -> Self {
        Self {
            context_id,
            calibrations,
            regs: IspRegisters::new(),
            stats: FrameStats::new(),
            frame_id: 0,
            frozen: false,
            log_level: LogLevel::default(),
            log_mask: 0,
            in_vblank: false,
            iso_base,
        }
    }
}
