//! Per-frame exposure telemetry.
//!
//! [`ExposureRecorder`] keeps the last few frames' exposure decisions in a
//! fixed-size ring so the firmware can log trends and the console can print
//! them without allocating.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::dispatcher::Dispatcher;
use crate::machines::{AeGet, AwbGet, CmosGet};
use crate::param::{Get, ParamError};

/// Frames retained by default.
pub const EXPOSURE_HISTORY_CAPACITY: usize = 16;

/// Exposure state sampled after one frame was processed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ExposureSample {
    pub frame_id: u32,
    /// Applied exposure, log2 with the CMOS fractional precision.
    pub exposure_log2: i32,
    /// Applied total gain, log2 with the CMOS fractional precision.
    pub gain_log2: i32,
    /// Integration time in microseconds.
    pub integration_us: u32,
    pub ae_state: u32,
    /// Colour temperature in kelvin / 100.
    pub temperature: u32,
}

impl ExposureSample {
    /// Reads the current values from `context`.
    pub fn capture<const Q: usize>(context: &mut Dispatcher<Q>) -> Result<Self, ParamError> {
        Ok(Self {
            frame_id: context.shared().frame_id,
            exposure_log2: context.get(Get::Cmos(CmosGet::ExposureLog2))?.as_i32()?,
            gain_log2: context.get(Get::Cmos(CmosGet::TotalGainLog2))?.as_i32()?,
            integration_us: context.get(Get::Cmos(CmosGet::ExposureTime))?.as_u32()?,
            ae_state: context.get(Get::Ae(AeGet::State))?.as_u32()?,
            temperature: context.get(Get::Awb(AwbGet::Temperature))?.as_u32()?,
        })
    }
}

impl fmt::Display for ExposureSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} exp_log2 {} gain_log2 {} int {}us ae {} temp {}00K",
            self.frame_id,
            self.exposure_log2,
            self.gain_log2,
            self.integration_us,
            self.ae_state,
            self.temperature
        )
    }
}

/// Ring of recent [`ExposureSample`]s.
pub struct ExposureRecorder<const CAPACITY: usize = EXPOSURE_HISTORY_CAPACITY> {
    ring: HistoryBuf<ExposureSample, CAPACITY>,
}

impl<const CAPACITY: usize> ExposureRecorder<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
        }
    }

    /// Samples `context` unless its frame was already recorded.
    ///
    /// Returns `Ok(false)` when the frame id has not moved since the last sample.
    pub fn record<const Q: usize>(
        &mut self,
        context: &mut Dispatcher<Q>,
    ) -> Result<bool, ParamError> {
        let frame_id = context.shared().frame_id;
        if self.latest().is_some_and(|sample| sample.frame_id == frame_id) {
            return Ok(false);
        }
        let sample = ExposureSample::capture(context)?;
        isp_trace!(
            "frame {}: exposure log2 {} gain log2 {}",
            sample.frame_id,
            sample.exposure_log2,
            sample.gain_log2
        );
        self.ring.write(sample);
        Ok(true)
    }

    /// Samples in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, ExposureSample> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&ExposureSample> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Change of the applied exposure between the oldest and newest sample.
    #[must_use]
    pub fn exposure_drift(&self) -> Option<i32> {
        let first = self.oldest_first().next()?;
        let last = self.latest()?;
        Some(last.exposure_log2.saturating_sub(first.exposure_log2))
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

impl<const CAPACITY: usize> Default for ExposureRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::firmware;

    #[test]
    fn one_sample_per_frame() {
        let mut firmware = firmware();
        let context = firmware.active_mut().expect("active");
        let mut recorder: ExposureRecorder<4> = ExposureRecorder::new();

        assert!(recorder.record(context).expect("sampled"));
        assert!(!recorder.record(context).expect("same frame"));
        assert_eq!(recorder.len(), 1);

        context.shared_mut().frame_id += 1;
        assert!(recorder.record(context).expect("sampled"));
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.exposure_drift(), Some(0));
    }

    #[test]
    fn ring_keeps_the_newest_frames() {
        let mut firmware = firmware();
        let context = firmware.active_mut().expect("active");
        let mut recorder: ExposureRecorder<3> = ExposureRecorder::new();
        for _ in 0..5 {
            context.shared_mut().frame_id += 1;
            recorder.record(context).expect("sampled");
        }
        let mut ids = recorder.oldest_first().map(|sample| sample.frame_id);
        let last = context.shared().frame_id;
        assert_eq!(ids.next(), Some(last - 2));
        assert_eq!(ids.next(), Some(last - 1));
        assert_eq!(ids.next(), Some(last));
        assert_eq!(ids.next(), None);

        recorder.clear();
        assert!(recorder.is_empty());
        assert_eq!(recorder.exposure_drift(), None);
    }
}
