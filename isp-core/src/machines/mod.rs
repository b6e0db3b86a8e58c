//! Per-domain state machines.
//!
//! Each machine implements [`StateMachine`]; the closed [`Machine`] enum lets
//! the registry hold all of them without allocation or trait objects. Every
//! hook has a default, so a machine only implements what it reacts to.

use crate::calibration::CalibrationId;
use crate::event::Event;
use crate::irq::{Irq, IrqMask};
use crate::param::{Get, MachineId, ParamError, ParamValue, Set};
use crate::registry::Env;
use crate::sensor::SensorMachine;

pub mod ae;
pub mod af;
pub mod awb;
pub mod cmos;
pub mod color_matrix;
pub mod crop;
pub mod dma_writer;
pub mod general;
pub mod iridix;
pub mod matrix_yuv;
pub mod monitor;
pub mod noise_reduction;
pub mod purple_fringe;
pub mod roi;
pub mod sharpening;

pub use ae::{AeAlgorithm, AeGet, AeMachine, AeManual, AeSet, AeState};
pub use af::{AfGet, AfMachine, AfMode, AfSet, AfState, CafState, LensOptic, LensParams};
pub use awb::{AwbGet, AwbMachine, AwbMode, AwbSet, AwbState, LightSource, WbChannel};
pub use cmos::{
    AeMode, CmosControl, CmosField, CmosGet, CmosMachine, CmosSet, ExposureSet, ExposureStrategy,
    IsoBaseGains,
};
pub use color_matrix::{ColorMatrixGet, ColorMatrixMachine, ColorMatrixSet, ColorManual};
pub use crop::{CropGet, CropMachine, CropSet, ResizeTarget};
pub use dma_writer::{DmaFormat, DmaPipe, DmaWriterGet, DmaWriterMachine, DmaWriterSet, DmaWriterState};
pub use general::{GeneralGet, GeneralMachine, GeneralSet, RegisterSource};
pub use iridix::{IridixGet, IridixMachine, IridixSet};
pub use matrix_yuv::{ColorMode, MatrixYuvGet, MatrixYuvMachine, MatrixYuvSet, PipeOutput};
pub use monitor::{
    MonitorAlgorithm, MonitorCounter, MonitorErrorReport, MonitorGet, MonitorMachine, MonitorSet,
    MonitorStage, StatusField,
};
pub use noise_reduction::{
    NoiseReductionGet, NoiseReductionMachine, NoiseReductionMode, NoiseReductionSet, NrBlock,
};
pub use purple_fringe::{PurpleFringeGet, PurpleFringeMachine, PurpleFringeSet};
pub use roi::Roi;
pub use sharpening::{SharpenBlock, SharpeningGet, SharpeningMachine, SharpeningSet};

/// Hooks the dispatcher drives. All of them run in task context and must not
/// block.
pub trait StateMachine {
    fn id(&self) -> MachineId;

    fn init(&mut self, _env: &mut Env<'_>) {}

    fn deinit(&mut self, _env: &mut Env<'_>) {}

    /// Interrupts the machine wants to see. `None` opts out entirely.
    fn irq_mask(&mut self) -> Option<&mut IrqMask> {
        None
    }

    fn process_interrupt(&mut self, _irq: Irq, _env: &mut Env<'_>) {}

    /// Returns `true` when the event changed the machine's state.
    fn process_event(&mut self, _event: Event, _env: &mut Env<'_>) -> bool {
        false
    }

    fn get_param(&mut self, _request: Get, _env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        Err(ParamError::Unsupported)
    }

    fn set_param(&mut self, _request: Set, _env: &mut Env<'_>) -> Result<(), ParamError> {
        Err(ParamError::Unsupported)
    }
}

/// Every machine a context can host.
#[allow(clippy::large_enum_variant)]
pub enum Machine {
    Sensor(SensorMachine),
    Cmos(CmosMachine),
    General(GeneralMachine),
    Ae(AeMachine),
    Awb(AwbMachine),
    Af(AfMachine),
    ColorMatrix(ColorMatrixMachine),
    PurpleFringe(PurpleFringeMachine),
    Iridix(IridixMachine),
    NoiseReduction(NoiseReductionMachine),
    Crop(CropMachine),
    Sharpening(SharpeningMachine),
    MatrixYuv(MatrixYuvMachine),
    DmaWriter(DmaWriterMachine),
    Monitor(MonitorMachine),
}

macro_rules! for_each_machine {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            Machine::Sensor($m) => $body,
            Machine::Cmos($m) => $body,
            Machine::General($m) => $body,
            Machine::Ae($m) => $body,
            Machine::Awb($m) => $body,
            Machine::Af($m) => $body,
            Machine::ColorMatrix($m) => $body,
            Machine::PurpleFringe($m) => $body,
            Machine::Iridix($m) => $body,
            Machine::NoiseReduction($m) => $body,
            Machine::Crop($m) => $body,
            Machine::Sharpening($m) => $body,
            Machine::MatrixYuv($m) => $body,
            Machine::DmaWriter($m) => $body,
            Machine::Monitor($m) => $body,
        }
    };
}

impl StateMachine for Machine {
    fn id(&self) -> MachineId {
        for_each_machine!(self, m => m.id())
    }

    fn init(&mut self, env: &mut Env<'_>) {
        for_each_machine!(self, m => m.init(env));
    }

    fn deinit(&mut self, env: &mut Env<'_>) {
        for_each_machine!(self, m => m.deinit(env));
    }

    fn irq_mask(&mut self) -> Option<&mut IrqMask> {
        for_each_machine!(self, m => m.irq_mask())
    }

    fn process_interrupt(&mut self, irq: Irq, env: &mut Env<'_>) {
        for_each_machine!(self, m => m.process_interrupt(irq, env));
    }

    fn process_event(&mut self, event: Event, env: &mut Env<'_>) -> bool {
        for_each_machine!(self, m => m.process_event(event, env))
    }

    fn get_param(&mut self, request: Get, env: &mut Env<'_>) -> Result<ParamValue, ParamError> {
        for_each_machine!(self, m => m.get_param(request, env))
    }

    fn set_param(&mut self, request: Set, env: &mut Env<'_>) -> Result<(), ParamError> {
        for_each_machine!(self, m => m.set_param(request, env))
    }
}

/// Returns `true` when the table is present, reporting it to the monitor otherwise.
pub(crate) fn require_lut(env: &mut Env<'_>, id: CalibrationId) -> bool {
    if env.shared.calibrations.contains(id) {
        return true;
    }
    isp_error!("calibration table {} missing", id.raw());
    env.notify(Set::Monitor(MonitorSet::Error(
        MonitorErrorReport::CalibrationLutNull {
            index: u32::from(id.raw()),
        },
    )));
    false
}

/// Total gain as log2 in 8.8, the abscissa of most modulation curves.
pub(crate) fn total_gain_8_8(env: &mut Env<'_>) -> u16 {
    let total = env
        .get_i32(Get::Cmos(CmosGet::TotalGainLog2))
        .unwrap_or(0);
    u16::try_from(total.max(0) >> (crate::math::LOG2_GAIN_SHIFT - 8)).unwrap_or(u16::MAX)
}
