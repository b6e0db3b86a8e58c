//! Pipeline latency tracking and hazard counters.
//!
//! Algorithms report when their input statistics arrived, when they produced
//! an output and when that output reached the hardware, each tagged with the
//! frame id of the statistics. The monitor turns those reports into
//! min/current/max latencies and keeps a count of timing hazards seen by the
//! exposure and tone-mapping paths.

use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;

use super::StateMachine;

/// Records kept per algorithm.
pub const TRACKING_DEPTH: usize = 8;

/// Algorithms whose pipeline latency is tracked.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MonitorAlgorithm {
    Ae,
    Awb,
    Gamma,
    Iridix,
}

impl MonitorAlgorithm {
    pub const ALL: [MonitorAlgorithm; 4] = [
        MonitorAlgorithm::Ae,
        MonitorAlgorithm::Awb,
        MonitorAlgorithm::Gamma,
        MonitorAlgorithm::Iridix,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            MonitorAlgorithm::Ae => "ae",
            MonitorAlgorithm::Awb => "awb",
            MonitorAlgorithm::Gamma => "gamma",
            MonitorAlgorithm::Iridix => "iridix",
        }
    }
}

/// Point in an algorithm's pipeline.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MonitorStage {
    InputReady,
    OutputReady,
    Applied,
}

/// Hazard counters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MonitorCounter {
    CalibrationLutNull,
    CmosFsDelay,
    CmosUpdateNotInVb,
    CmosDgainWrongTiming,
    IridixUpdateNotInVb,
}

impl MonitorCounter {
    pub const ALL: [MonitorCounter; 5] = [
        MonitorCounter::CalibrationLutNull,
        MonitorCounter::CmosFsDelay,
        MonitorCounter::CmosUpdateNotInVb,
        MonitorCounter::CmosDgainWrongTiming,
        MonitorCounter::IridixUpdateNotInVb,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// A hazard as reported by the machine that saw it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MonitorErrorReport {
    /// A calibration table the machine needed is missing.
    CalibrationLutNull { index: u32 },
    CmosFsDelay,
    CmosUpdateNotInVb,
    /// ISP digital gain landed `diff` frames after the sensor values.
    CmosDgainWrongTiming { diff: u32 },
    IridixUpdateNotInVb,
}

impl MonitorErrorReport {
    const fn counter(self) -> (MonitorCounter, Option<u32>) {
        match self {
            MonitorErrorReport::CalibrationLutNull { index } => {
                (MonitorCounter::CalibrationLutNull, Some(index))
            }
            MonitorErrorReport::CmosFsDelay => (MonitorCounter::CmosFsDelay, None),
            MonitorErrorReport::CmosUpdateNotInVb => (MonitorCounter::CmosUpdateNotInVb, None),
            MonitorErrorReport::CmosDgainWrongTiming { diff } => {
                (MonitorCounter::CmosDgainWrongTiming, Some(diff))
            }
            MonitorErrorReport::IridixUpdateNotInVb => (MonitorCounter::IridixUpdateNotInVb, None),
        }
    }
}

/// Latency figures exposed per algorithm.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StatusField {
    /// Frames between consecutive statistics inputs.
    FptMin,
    FptCur,
    FptMax,
    /// Frames from input to output.
    InToOutMin,
    InToOutCur,
    InToOutMax,
    /// Frames from output to hardware.
    OutToApplyMin,
    OutToApplyCur,
    OutToApplyMax,
}

impl StatusField {
    /// Command-surface order.
    pub const ALL: [StatusField; 9] = [
        StatusField::FptMin,
        StatusField::FptCur,
        StatusField::FptMax,
        StatusField::InToOutMin,
        StatusField::InToOutCur,
        StatusField::InToOutMax,
        StatusField::OutToApplyMin,
        StatusField::OutToApplyCur,
        StatusField::OutToApplyMax,
    ];
}

/// Reads served by the monitor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MonitorGet {
    Error(MonitorCounter),
    /// Last parameter reported with the counter: LUT index or timing diff.
    ErrorDetail(MonitorCounter),
    Status(MonitorAlgorithm, StatusField),
}

/// Writes served by the monitor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MonitorSet {
    Report {
        algorithm: MonitorAlgorithm,
        stage: MonitorStage,
        frame_id: u32,
    },
    Error(MonitorErrorReport),
    ResetError(MonitorCounter),
    ResetStatus(MonitorAlgorithm),
}

/// Running min/current/max of one latency.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LatencyStat {
    pub min: u32,
    pub cur: u32,
    pub max: u32,
    pub samples: u32,
}

impl LatencyStat {
    fn record(&mut self, value: u32) {
        if self.samples == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.cur = value;
        self.samples = self.samples.saturating_add(1);
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct FrameRecord {
    frame_id: u32,
    input_at: u32,
    output_at: Option<u32>,
    applied_at: Option<u32>,
}

#[derive(Copy, Clone, Debug, Default)]
struct Tracking {
    records: [Option<FrameRecord>; TRACKING_DEPTH],
    next: usize,
    last_input: Option<u32>,
    fpt: LatencyStat,
    in_to_out: LatencyStat,
    out_to_apply: LatencyStat,
}

impl Tracking {
    fn record_mut(&mut self, frame_id: u32) -> Option<&mut FrameRecord> {
        self.records
            .iter_mut()
            .flatten()
            .find(|record| record.frame_id == frame_id)
    }

    fn report(&mut self, stage: MonitorStage, frame_id: u32, now: u32) -> bool {
        match stage {
            MonitorStage::InputReady => {
                if let Some(previous) = self.last_input {
                    self.fpt.record(frame_id.wrapping_sub(previous));
                }
                self.last_input = Some(frame_id);
                self.records[self.next] = Some(FrameRecord {
                    frame_id,
                    input_at: now,
                    output_at: None,
                    applied_at: None,
                });
                self.next = (self.next + 1) % TRACKING_DEPTH;
                true
            }
            MonitorStage::OutputReady => {
                let Some(record) = self.record_mut(frame_id) else {
                    return false;
                };
                let delay = now.wrapping_sub(record.input_at);
                record.output_at = Some(now);
                self.in_to_out.record(delay);
                true
            }
            MonitorStage::Applied => {
                let Some(record) = self.record_mut(frame_id) else {
                    return false;
                };
                if record.applied_at.is_some() {
                    return true;
                }
                let Some(output_at) = record.output_at else {
                    return false;
                };
                record.applied_at = Some(now);
                self.out_to_apply.record(now.wrapping_sub(output_at));
                true
            }
        }
    }

    fn field(&self, field: StatusField) -> u32 {
        match field {
            StatusField::FptMin => self.fpt.min,
            StatusField::FptCur => self.fpt.cur,
            StatusField::FptMax => self.fpt.max,
            StatusField::InToOutMin => self.in_to_out.min,
            StatusField::InToOutCur => self.in_to_out.cur,
            StatusField::InToOutMax => self.in_to_out.max,
            StatusField::OutToApplyMin => self.out_to_apply.min,
            StatusField::OutToApplyCur => self.out_to_apply.cur,
            StatusField::OutToApplyMax => self.out_to_apply.max,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct HazardCounter {
    count: u32,
    detail: u32,
}

#[derive(Debug, Default)]
pub struct MonitorMachine {
    tracking: [Tracking; MonitorAlgorithm::ALL.len()],
    counters: [HazardCounter; MonitorCounter::ALL.len()],
}

impl MonitorMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latency statistics of one algorithm as `(fpt, in->out, out->apply)`.
    #[must_use]
    pub fn latencies(&self, algorithm: MonitorAlgorithm) -> (LatencyStat, LatencyStat, LatencyStat) {
        let tracking = &self.tracking[algorithm.index()];
        (tracking.fpt, tracking.in_to_out, tracking.out_to_apply)
    }

    fn count(&mut self, report: MonitorErrorReport) {
        let (counter, detail) = report.counter();
        let slot = &mut self.counters[counter.index()];
        slot.count = slot.count.saturating_add(1);
        if let Some(detail) = detail {
            slot.detail = detail;
        }
    }
}

impl StateMachine for MonitorMachine {
    fn id(&self) -> MachineId {
        MachineId::Monitor
    }

    fn init(&mut self, _env: &mut Env<'_>) {
        *self = Self::new();
    }

    fn get_param(&mut self, request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        let Get::Monitor(request) = request else {
            return Err(ParamError::Unsupported);
        };

        let value = match request {
            MonitorGet::Error(counter) => self.counters[counter.index()].count,
            MonitorGet::ErrorDetail(counter) => self.counters[counter.index()].detail,
            MonitorGet::Status(algorithm, field) => self.tracking[algorithm.index()].field(field),
        };
        Ok(ParamValue::U32(value))
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        let Set::Monitor(request) = request else {
            return Err(ParamError::Unsupported);
        };

        match request {
            MonitorSet::Report {
                algorithm,
                stage,
                frame_id,
            } => {
                let now = env.shared.frame_id;
                if !self.tracking[algorithm.index()].report(stage, frame_id, now) {
                    isp_debug!(
                        "monitor: {} report for untracked frame {}",
                        algorithm.label(),
                        frame_id
                    );
                }
            }
            MonitorSet::Error(report) => self.count(report),
            MonitorSet::ResetError(counter) => {
                self.counters[counter.index()] = HazardCounter::default();
            }
            MonitorSet::ResetStatus(algorithm) => {
                self.tracking[algorithm.index()] = Tracking::default();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_sets_every_bound() {
        let mut stat = LatencyStat::default();
        stat.record(3);
        assert_eq!((stat.min, stat.cur, stat.max), (3, 3, 3));
        stat.record(1);
        stat.record(2);
        assert_eq!((stat.min, stat.cur, stat.max), (1, 2, 3));
    }

    #[test]
    fn tracking_measures_each_leg() {
        let mut tracking = Tracking::default();
        assert!(tracking.report(MonitorStage::InputReady, 10, 10));
        assert!(tracking.report(MonitorStage::OutputReady, 10, 11));
        assert!(tracking.report(MonitorStage::Applied, 10, 13));
        assert!(tracking.report(MonitorStage::InputReady, 12, 12));

        assert_eq!(tracking.field(StatusField::InToOutCur), 1);
        assert_eq!(tracking.field(StatusField::OutToApplyCur), 2);
        assert_eq!(tracking.field(StatusField::FptCur), 2);
    }

    #[test]
    fn unknown_frames_are_not_tracked() {
        let mut tracking = Tracking::default();
        assert!(!tracking.report(MonitorStage::OutputReady, 4, 5));
        assert!(!tracking.report(MonitorStage::Applied, 4, 5));
        assert_eq!(tracking.in_to_out.samples, 0);
    }

    #[test]
    fn ring_forgets_oldest_records() {
        let mut tracking = Tracking::default();
        for frame in 0..=TRACKING_DEPTH as u32 {
            tracking.report(MonitorStage::InputReady, frame, frame);
        }
        assert!(!tracking.report(MonitorStage::OutputReady, 0, 20));
        assert!(tracking.report(MonitorStage::OutputReady, 1, 20));
    }

    #[test]
    fn counters_keep_last_detail() {
        let mut monitor = MonitorMachine::new();
        monitor.count(MonitorErrorReport::CmosDgainWrongTiming { diff: 2 });
        monitor.count(MonitorErrorReport::CmosDgainWrongTiming { diff: 5 });
        let slot = monitor.counters[MonitorCounter::CmosDgainWrongTiming.index()];
        assert_eq!(slot, HazardCounter { count: 2, detail: 5 });
    }
}
