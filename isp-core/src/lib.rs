#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Control plane of the ISP shared by the MCU firmware and the host emulator.
//
// The crate avoids the standard library and dynamic allocation. Hardware
// access goes through `firmware::IspHardware` so each target supplies its own.

#[macro_use]
pub mod logging;

pub mod calibration;
pub mod command;
pub mod console;
pub mod context;
pub mod dispatcher;
pub mod event;
pub mod firmware;
pub mod irq;
pub mod machines;
pub mod math;
pub mod param;
pub mod registry;
pub mod regs;
pub mod sensor;
pub mod stats;
pub mod telemetry;

pub use command::{Direction, Response, Status};
pub use console::Console;
pub use dispatcher::Dispatcher;
pub use firmware::{ContextSettings, IspFirmware, IspHardware, NullHardware};
