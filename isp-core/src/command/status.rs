//! Result codes of the command surface.

use core::fmt;

use crate::calibration::CalibrationError;
use crate::firmware::LifecycleError;
use crate::param::ParamError;
use crate::sensor::SensorError;

/// Status byte returned with every command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    Success = 0,
    NotImplemented = 1,
    NotSupported = 2,
    NotPermitted = 3,
    NotExists = 4,
    Fail = 5,
}

impl Status {
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::NotImplemented => "NOT_IMPLEMENTED",
            Status::NotSupported => "NOT_SUPPORTED",
            Status::NotPermitted => "NOT_PERMITTED",
            Status::NotExists => "NOT_EXISTS",
            Status::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Detail carried in `ret` alongside [`Status::Fail`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorValue {
    Unknown = 0,
    BadArgument = 1,
    WrongSize = 2,
}

impl ErrorValue {
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }
}

/// Command outcome as seen by the host.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Response {
    pub status: Status,
    pub ret: u32,
}

impl Response {
    #[must_use]
    pub const fn success(ret: u32) -> Self {
        Self {
            status: Status::Success,
            ret,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, Status::Success)
    }
}

/// Why a command was rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandError<E = ()> {
    NotImplemented,
    NotSupported,
    NotPermitted,
    NotExists,
    Fail(ErrorValue),
    /// Failure of the layer carrying the command.
    Other(E),
}

impl<E> CommandError<E> {
    /// Maps the inner error type.
    pub fn map_other<F, M>(self, mapper: M) -> CommandError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            CommandError::NotImplemented => CommandError::NotImplemented,
            CommandError::NotSupported => CommandError::NotSupported,
            CommandError::NotPermitted => CommandError::NotPermitted,
            CommandError::NotExists => CommandError::NotExists,
            CommandError::Fail(value) => CommandError::Fail(value),
            CommandError::Other(err) => CommandError::Other(mapper(err)),
        }
    }

    /// Status and `ret` pair reported to the host. Transport failures surface
    /// as an unspecified failure.
    #[must_use]
    pub fn response(&self) -> Response {
        let (status, value) = match self {
            CommandError::NotImplemented => (Status::NotImplemented, ErrorValue::Unknown),
            CommandError::NotSupported => (Status::NotSupported, ErrorValue::Unknown),
            CommandError::NotPermitted => (Status::NotPermitted, ErrorValue::Unknown),
            CommandError::NotExists => (Status::NotExists, ErrorValue::Unknown),
            CommandError::Fail(value) => (Status::Fail, *value),
            CommandError::Other(_) => (Status::Fail, ErrorValue::Unknown),
        };
        Response {
            status,
            ret: value.to_raw(),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for CommandError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<ParamError> for CommandError {
    fn from(error: ParamError) -> Self {
        match error {
            ParamError::Unsupported => CommandError::NotSupported,
            ParamError::NotPermitted => CommandError::NotPermitted,
            ParamError::NotExists => CommandError::NotExists,
            ParamError::BadArgument | ParamError::Sensor(SensorError::UnsupportedMode(_)) => {
                CommandError::Fail(ErrorValue::BadArgument)
            }
            ParamError::Calibration(error) => error.into(),
            ParamError::Busy
            | ParamError::TypeMismatch
            | ParamError::Sensor(_)
            | ParamError::Failed => CommandError::Fail(ErrorValue::Unknown),
        }
    }
}

impl From<CalibrationError> for CommandError {
    fn from(error: CalibrationError) -> Self {
        match error {
            CalibrationError::NotExists(_) => CommandError::NotExists,
            CalibrationError::WrongSize { .. } => CommandError::Fail(ErrorValue::WrongSize),
            CalibrationError::ShapeMismatch(_) | CalibrationError::Malformed => {
                CommandError::Fail(ErrorValue::BadArgument)
            }
            CalibrationError::ArenaFull => CommandError::Fail(ErrorValue::Unknown),
        }
    }
}

impl From<LifecycleError> for CommandError {
    fn from(error: LifecycleError) -> Self {
        match error {
            LifecycleError::BadContext(_) => CommandError::Fail(ErrorValue::BadArgument),
            LifecycleError::NotInitialized => CommandError::NotPermitted,
            _ => CommandError::Fail(ErrorValue::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationId;

    #[test]
    fn bus_errors_map_onto_statuses() {
        assert_eq!(
            CommandError::from(ParamError::Unsupported).response().status,
            Status::NotSupported
        );
        assert_eq!(
            CommandError::from(ParamError::BadArgument).response(),
            Response {
                status: Status::Fail,
                ret: ErrorValue::BadArgument.to_raw()
            }
        );
        assert_eq!(
            CommandError::from(ParamError::Calibration(CalibrationError::WrongSize {
                expected: 4,
                actual: 3
            }))
            .response()
            .ret,
            ErrorValue::WrongSize.to_raw()
        );
        assert_eq!(
            CommandError::from(CalibrationError::NotExists(CalibrationId::GAMMA))
                .response()
                .status,
            Status::NotExists
        );
    }

    #[test]
    fn map_other_keeps_protocol_errors() {
        let error: CommandError<u8> = CommandError::Other(7);
        assert_eq!(error.map_other(u32::from), CommandError::Other(7_u32));
        let error: CommandError<u8> = CommandError::NotPermitted;
        assert_eq!(error.map_other(u32::from), CommandError::NotPermitted);
        assert_eq!(CommandError::Other(1_u8).response().status, Status::Fail);
    }
}
