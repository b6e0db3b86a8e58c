//! Logging shims shared by every module in the crate.
//!
//! Firmware builds enable the `defmt` feature, host tooling enables `log`, and
//! builds with neither compile the calls away. Arguments are limited to integers,
//! booleans and `&str` so both backends accept the same format strings.

#[cfg(feature = "defmt")]
#[doc(hidden)]
pub use defmt as backend;

#[cfg(all(feature = "log", not(feature = "defmt")))]
#[doc(hidden)]
pub use log as backend;

#[cfg(any(feature = "defmt", feature = "log"))]
macro_rules! isp_log {
    ($level:ident, $($arg:tt)*) => {
        $crate::logging::backend::$level!($($arg)*)
    };
}

#[cfg(not(any(feature = "defmt", feature = "log")))]
macro_rules! isp_log {
    ($level:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        $( let _ = &$arg; )*
    }};
}

macro_rules! isp_trace {
    ($($arg:tt)*) => { isp_log!(trace, $($arg)*) };
}

macro_rules! isp_debug {
    ($($arg:tt)*) => { isp_log!(debug, $($arg)*) };
}

macro_rules! isp_info {
    ($($arg:tt)*) => { isp_log!(info, $($arg)*) };
}

macro_rules! isp_warn {
    ($($arg:tt)*) => { isp_log!(warn, $($arg)*) };
}

macro_rules! isp_error {
    ($($arg:tt)*) => { isp_log!(error, $($arg)*) };
}

/// Verbosity levels accepted by the logger-level command.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    #[default]
    Error,
    Critical,
    Nothing,
}

impl LogLevel {
    /// Encodes the level using the command-surface numbering.
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Notice => 2,
            LogLevel::Warning => 3,
            LogLevel::Error => 4,
            LogLevel::Critical => 5,
            LogLevel::Nothing => 6,
        }
    }

    /// Decodes a command-surface level.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(LogLevel::Debug),
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Notice),
            3 => Some(LogLevel::Warning),
            4 => Some(LogLevel::Error),
            5 => Some(LogLevel::Critical),
            6 => Some(LogLevel::Nothing),
            _ => None,
        }
    }
}
