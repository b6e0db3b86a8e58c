//! Typed parameter bus.
//!
//! Every request names exactly one owning machine through [`Get::owner`] and
//! [`Set::owner`]. The registry routes the request to that machine and hands it
//! a view of the others, so machines never hold references to each other.

use core::fmt;

use crate::calibration::CalibrationError;
use crate::machines::{
    AeGet, AeSet, AfGet, AfSet, AwbGet, AwbSet, CmosControl, CmosGet, CmosSet, ColorMatrixGet,
    ColorMatrixSet, CropGet, CropSet, DmaWriterGet, DmaWriterSet, ExposureSet, GeneralGet,
    GeneralSet, IridixGet, IridixSet, MatrixYuvGet, MatrixYuvSet, MonitorGet, MonitorSet,
    NoiseReductionGet, NoiseReductionSet, PurpleFringeGet, PurpleFringeSet, SharpeningGet,
    SharpeningSet,
};
use crate::sensor::{Resolution, SensorError, SensorGet, SensorInfo, SensorMode, SensorSet};

/// Number of machines in a context's registry.
pub const MACHINE_COUNT: usize = 15;

/// Identity of a state machine. Declaration order is registry order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum MachineId {
    Sensor,
    Cmos,
    General,
    Ae,
    Awb,
    Af,
    ColorMatrix,
    PurpleFringe,
    Iridix,
    NoiseReduction,
    Crop,
    Sharpening,
    MatrixYuv,
    DmaWriter,
    Monitor,
}

impl MachineId {
    /// Registry order.
    pub const ALL: [MachineId; MACHINE_COUNT] = [
        MachineId::Sensor,
        MachineId::Cmos,
        MachineId::General,
        MachineId::Ae,
        MachineId::Awb,
        MachineId::Af,
        MachineId::ColorMatrix,
        MachineId::PurpleFringe,
        MachineId::Iridix,
        MachineId::NoiseReduction,
        MachineId::Crop,
        MachineId::Sharpening,
        MachineId::MatrixYuv,
        MachineId::DmaWriter,
        MachineId::Monitor,
    ];

    /// Slot inside the registry.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            MachineId::Sensor => "sensor",
            MachineId::Cmos => "cmos",
            MachineId::General => "general",
            MachineId::Ae => "ae",
            MachineId::Awb => "awb",
            MachineId::Af => "af",
            MachineId::ColorMatrix => "color-matrix",
            MachineId::PurpleFringe => "purple-fringe",
            MachineId::Iridix => "iridix",
            MachineId::NoiseReduction => "noise-reduction",
            MachineId::Crop => "crop",
            MachineId::Sharpening => "sharpening",
            MachineId::MatrixYuv => "matrix-yuv",
            MachineId::DmaWriter => "dma-writer",
            MachineId::Monitor => "monitor",
        }
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Read request, routed to the machine owning the value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Get {
    Sensor(SensorGet),
    Cmos(CmosGet),
    General(GeneralGet),
    Ae(AeGet),
    Awb(AwbGet),
    Af(AfGet),
    ColorMatrix(ColorMatrixGet),
    PurpleFringe(PurpleFringeGet),
    Iridix(IridixGet),
    NoiseReduction(NoiseReductionGet),
    Crop(CropGet),
    Sharpening(SharpeningGet),
    MatrixYuv(MatrixYuvGet),
    DmaWriter(DmaWriterGet),
    Monitor(MonitorGet),
}

impl Get {
    #[must_use]
    pub const fn owner(&self) -> MachineId {
        match self {
            Get::Sensor(_) => MachineId::Sensor,
            Get::Cmos(_) => MachineId::Cmos,
            Get::General(_) => MachineId::General,
            Get::Ae(_) => MachineId::Ae,
            Get::Awb(_) => MachineId::Awb,
            Get::Af(_) => MachineId::Af,
            Get::ColorMatrix(_) => MachineId::ColorMatrix,
            Get::PurpleFringe(_) => MachineId::PurpleFringe,
            Get::Iridix(_) => MachineId::Iridix,
            Get::NoiseReduction(_) => MachineId::NoiseReduction,
            Get::Crop(_) => MachineId::Crop,
            Get::Sharpening(_) => MachineId::Sharpening,
            Get::MatrixYuv(_) => MachineId::MatrixYuv,
            Get::DmaWriter(_) => MachineId::DmaWriter,
            Get::Monitor(_) => MachineId::Monitor,
        }
    }
}

/// Write request, routed to the machine owning the value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Set {
    Sensor(SensorSet),
    Cmos(CmosSet),
    General(GeneralSet),
    Ae(AeSet),
    Awb(AwbSet),
    Af(AfSet),
    ColorMatrix(ColorMatrixSet),
    PurpleFringe(PurpleFringeSet),
    Iridix(IridixSet),
    NoiseReduction(NoiseReductionSet),
    Crop(CropSet),
    Sharpening(SharpeningSet),
    MatrixYuv(MatrixYuvSet),
    DmaWriter(DmaWriterSet),
    Monitor(MonitorSet),
}

impl Set {
    #[must_use]
    pub const fn owner(&self) -> MachineId {
        match self {
            Set::Sensor(_) => MachineId::Sensor,
            Set::Cmos(_) => MachineId::Cmos,
            Set::General(_) => MachineId::General,
            Set::Ae(_) => MachineId::Ae,
            Set::Awb(_) => MachineId::Awb,
            Set::Af(_) => MachineId::Af,
            Set::ColorMatrix(_) => MachineId::ColorMatrix,
            Set::PurpleFringe(_) => MachineId::PurpleFringe,
            Set::Iridix(_) => MachineId::Iridix,
            Set::NoiseReduction(_) => MachineId::NoiseReduction,
            Set::Crop(_) => MachineId::Crop,
            Set::Sharpening(_) => MachineId::Sharpening,
            Set::MatrixYuv(_) => MachineId::MatrixYuv,
            Set::DmaWriter(_) => MachineId::DmaWriter,
            Set::Monitor(_) => MachineId::Monitor,
        }
    }
}

/// Payload returned by a [`Get`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    U32(u32),
    I32(i32),
    Sensor(SensorInfo),
    Mode(SensorMode),
    Exposure(ExposureSet),
    Ccm([i16; 9]),
    CmosControl(CmosControl),
    Resolution(Resolution),
}

impl ParamValue {
    pub fn as_u32(self) -> Result<u32, ParamError> {
        match self {
            ParamValue::U32(value) => Ok(value),
            ParamValue::Bool(flag) => Ok(u32::from(flag)),
            _ => Err(ParamError::TypeMismatch),
        }
    }

    pub fn as_i32(self) -> Result<i32, ParamError> {
        match self {
            ParamValue::I32(value) => Ok(value),
            _ => Err(ParamError::TypeMismatch),
        }
    }

    pub fn as_bool(self) -> Result<bool, ParamError> {
        match self {
            ParamValue::Bool(flag) => Ok(flag),
            ParamValue::U32(value) => Ok(value != 0),
            _ => Err(ParamError::TypeMismatch),
        }
    }

    pub fn as_sensor(self) -> Result<SensorInfo, ParamError> {
        match self {
            ParamValue::Sensor(info) => Ok(info),
            _ => Err(ParamError::TypeMismatch),
        }
    }

    pub fn as_exposure(self) -> Result<ExposureSet, ParamError> {
        match self {
            ParamValue::Exposure(set) => Ok(set),
            _ => Err(ParamError::TypeMismatch),
        }
    }
}

/// Failures surfaced by the parameter bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParamError {
    /// No handler for the request, or the owner is already servicing one.
    Unsupported,
    /// The current mode forbids the request.
    NotPermitted,
    BadArgument,
    NotExists,
    Busy,
    /// Payload had an unexpected shape.
    TypeMismatch,
    Sensor(SensorError),
    Calibration(CalibrationError),
    Failed,
}

impl From<SensorError> for ParamError {
    fn from(error: SensorError) -> Self {
        ParamError::Sensor(error)
    }
}

impl From<CalibrationError> for ParamError {
    fn from(error: CalibrationError) -> Self {
        ParamError::Calibration(error)
    }
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines::{AeGet, CmosField, MonitorErrorReport, MonitorSet};

    #[test]
    fn registry_order_matches_discriminants() {
        for (index, id) in MachineId::ALL.iter().enumerate() {
            assert_eq!(id.index(), index);
        }
    }

    #[test]
    fn requests_name_their_owner() {
        assert_eq!(Get::Ae(AeGet::State).owner(), MachineId::Ae);
        assert_eq!(
            Get::Cmos(CmosGet::Control(CmosField::MaxIntegrationTime)).owner(),
            MachineId::Cmos
        );
        assert_eq!(
            Set::Monitor(MonitorSet::Error(MonitorErrorReport::CmosFsDelay)).owner(),
            MachineId::Monitor
        );
    }

    #[test]
    fn value_conversions_reject_other_shapes() {
        assert_eq!(ParamValue::U32(7).as_u32(), Ok(7));
        assert_eq!(ParamValue::Bool(true).as_u32(), Ok(1));
        assert_eq!(ParamValue::U32(0).as_bool(), Ok(false));
        assert_eq!(ParamValue::U32(1).as_i32(), Err(ParamError::TypeMismatch));
        assert_eq!(
            ParamValue::Ccm([0; 9]).as_u32(),
            Err(ParamError::TypeMismatch)
        );
    }
}
