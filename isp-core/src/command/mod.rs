//! Host command surface.
//!
//! A command is addressed by a type byte and an id byte and carries one `u32`
//! in each direction. [`command`] routes it to the addressed context, translates
//! the value into a typed bus request and folds the outcome into a
//! [`Response`]. The calibration and buffer entry points live in their own
//! modules.

use crate::dispatcher::Dispatcher;
use crate::firmware::{IspFirmware, IspHardware};
use crate::param::{Get, Set};

pub mod buffer;
pub mod calibration;
pub mod ids;
pub mod status;

mod algorithms;
mod image;
mod monitor;
mod sensor;
mod system;

pub use status::{CommandError, ErrorValue, Response, Status};

use ids::{ACTIVE_CONTEXT, API_VERSION, CONTEXT_NUMBER, FW_REVISION, OFF, ON};

/// Whether a command reads or writes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Set,
    Get,
}

impl Direction {
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            Direction::Set => 0,
            Direction::Get => 1,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Direction::Set),
            1 => Some(Direction::Get),
            _ => None,
        }
    }
}

/// Value returned in `ret` on success.
pub type CommandResult = Result<u32, CommandError>;

/// Executes one command against context `ctx`. An index past the last
/// context fails with `BadArgument`.
pub fn command<H, const C: usize, const Q: usize>(
    firmware: &mut IspFirmware<H, C, Q>,
    ctx: usize,
    kind: u8,
    id: u8,
    value: u32,
    direction: Direction,
) -> Response
where
    H: IspHardware,
{
    match dispatch(firmware, ctx, kind, id, value, direction) {
        Ok(ret) => Response::success(ret),
        Err(error) => {
            let response = error.response();
            isp_debug!(
                "command {}/{} on context {} rejected: {} ({})",
                kind,
                id,
                ctx,
                response.status.label(),
                response.ret
            );
            response
        }
    }
}

fn dispatch<H, const C: usize, const Q: usize>(
    firmware: &mut IspFirmware<H, C, Q>,
    ctx: usize,
    kind: u8,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult
where
    H: IspHardware,
{
    firmware.context_checked(ctx)?;
    match kind {
        ids::TGENERAL => general(firmware, id, value, direction),
        ids::TSELFTEST => match (id, direction) {
            (FW_REVISION, Direction::Get) => Ok(API_VERSION),
            (FW_REVISION, Direction::Set) => Err(CommandError::NotSupported),
            _ => Err(CommandError::NotExists),
        },
        ids::TSENSOR => sensor::handle(firmware, ctx, id, value, direction),
        ids::TSYSTEM if id == ids::SYSTEM_FREEZE_FIRMWARE => match direction {
            Direction::Get => {
                let frozen = firmware.context_checked(ctx)?.shared().frozen;
                Ok(u32::from(frozen))
            }
            Direction::Set => {
                firmware.freeze(ctx, value != 0)?;
                Ok(0)
            }
        },
        _ => {
            let context = firmware.context_checked(ctx)?;
            match kind {
                ids::TLENS => sensor::lens(context, id, direction),
                ids::TSYSTEM => system::handle(context, id, value, direction),
                ids::TISP_MODULES => system::isp_modules(context, id, value, direction),
                ids::TSTATUS => system::status(context, id, direction),
                ids::TIMAGE => image::handle(context, id, value, direction),
                ids::TALGORITHMS => algorithms::handle(context, id, value, direction),
                ids::TSCENE_MODES => image::scene_modes(context, id, value, direction),
                ids::TREGISTERS => image::registers(context, id, value, direction),
                ids::TMONITOR => monitor::handle(context, id, value, direction),
                _ => Err(CommandError::NotExists),
            }
        }
    }
}

fn general<H, const C: usize, const Q: usize>(
    firmware: &mut IspFirmware<H, C, Q>,
    id: u8,
    value: u32,
    direction: Direction,
) -> CommandResult
where
    H: IspHardware,
{
    match (id, direction) {
        (CONTEXT_NUMBER, Direction::Get) => Ok(count(firmware.context_count())),
        (CONTEXT_NUMBER, Direction::Set) => Err(CommandError::NotSupported),
        (ACTIVE_CONTEXT, Direction::Get) => Ok(count(firmware.active_context())),
        (ACTIVE_CONTEXT, Direction::Set) => {
            let index = usize::try_from(value)
                .map_err(|_| CommandError::Fail(ErrorValue::BadArgument))?;
            firmware.set_active_context(index)?;
            isp_info!("active context set to {}", value);
            Ok(0)
        }
        _ => Err(CommandError::NotExists),
    }
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Reads a scalar parameter.
fn read<const Q: usize>(context: &mut Dispatcher<Q>, request: Get) -> CommandResult {
    Ok(context.get(request)?.as_u32()?)
}

/// Writes a parameter; `ret` is zero.
fn write<const Q: usize>(context: &mut Dispatcher<Q>, request: Set) -> CommandResult {
    context.set(request)?;
    Ok(0)
}

/// Decodes an `ON`/`OFF` value; anything else is not supported.
fn on_off(value: u32) -> Result<bool, CommandError> {
    match value {
        OFF => Ok(false),
        ON => Ok(true),
        _ => Err(CommandError::NotSupported),
    }
}

/// Shorthand for handlers that only answer reads.
fn get_only<F>(direction: Direction, read: F) -> CommandResult
where
    F: FnOnce() -> CommandResult,
{
    match direction {
        Direction::Get => read(),
        Direction::Set => Err(CommandError::NotSupported),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::calibration::defaults::{DEFAULT_ISO_BASE_GAINS, dummy_calibrations};
    use crate::firmware::{ContextSettings, NullHardware};
    use crate::machines::AeAlgorithm;
    use crate::sensor::SensorBackend;

    pub(crate) fn firmware() -> IspFirmware<NullHardware, 2, 32> {
        let settings = ContextSettings {
            sensor: SensorBackend::default(),
            ae: AeAlgorithm::default(),
            calibrations: dummy_calibrations().expect("defaults fit"),
            iso_base: DEFAULT_ISO_BASE_GAINS,
            isp_base: 0,
            event_budget: None,
        };
        let mut firmware = IspFirmware::new(NullHardware::new());
        firmware
            .init([settings.clone(), ContextSettings { isp_base: 0x1000, ..settings }])
            .expect("two contexts fit");
        firmware.process().expect("initialized");
        firmware
    }

    pub(crate) fn get(firmware: &mut IspFirmware<NullHardware, 2, 32>, kind: u8, id: u8) -> Response {
        get_on(firmware, 0, kind, id)
    }

    pub(crate) fn get_on(
        firmware: &mut IspFirmware<NullHardware, 2, 32>,
        ctx: usize,
        kind: u8,
        id: u8,
    ) -> Response {
        command(firmware, ctx, kind, id, 0, Direction::Get)
    }

    pub(crate) fn set(
        firmware: &mut IspFirmware<NullHardware, 2, 32>,
        kind: u8,
        id: u8,
        value: u32,
    ) -> Response {
        set_on(firmware, 0, kind, id, value)
    }

    pub(crate) fn set_on(
        firmware: &mut IspFirmware<NullHardware, 2, 32>,
        ctx: usize,
        kind: u8,
        id: u8,
        value: u32,
    ) -> Response {
        command(firmware, ctx, kind, id, value, Direction::Set)
    }

    #[test]
    fn revision_is_read_only() {
        let mut firmware = firmware();
        assert_eq!(
            get(&mut firmware, ids::TSELFTEST, FW_REVISION),
            Response::success(API_VERSION)
        );
        assert_eq!(
            set(&mut firmware, ids::TSELFTEST, FW_REVISION, 1).status,
            Status::NotSupported
        );
    }

    #[test]
    fn unknown_addresses_do_not_exist() {
        let mut firmware = firmware();
        assert_eq!(get(&mut firmware, 0x07, 0).status, Status::NotExists);
        assert_eq!(get(&mut firmware, ids::TSYSTEM, 0xFF).status, Status::NotExists);
        assert_eq!(get(&mut firmware, ids::TGENERAL, 0x40).status, Status::NotExists);
    }

    #[test]
    fn active_context_switch_is_bounded() {
        let mut firmware = firmware();
        assert_eq!(get(&mut firmware, ids::TGENERAL, CONTEXT_NUMBER).ret, 2);
        assert!(set(&mut firmware, ids::TGENERAL, ACTIVE_CONTEXT, 1).is_success());
        assert_eq!(get(&mut firmware, ids::TGENERAL, ACTIVE_CONTEXT).ret, 1);
        assert_eq!(
            set(&mut firmware, ids::TGENERAL, ACTIVE_CONTEXT, 2),
            Response {
                status: Status::Fail,
                ret: ErrorValue::BadArgument.to_raw()
            }
        );
        assert_eq!(firmware.active_context(), 1);
    }

    #[test]
    fn commands_address_a_single_context() {
        let mut firmware = firmware();
        let before = get_on(&mut firmware, 0, ids::TALGORITHMS, ids::AE_COMPENSATION);
        assert!(before.is_success());
        let edited = if before.ret == 100 { 90 } else { 100 };

        assert!(set_on(&mut firmware, 1, ids::TALGORITHMS, ids::AE_COMPENSATION, edited).is_success());
        assert_eq!(
            get_on(&mut firmware, 1, ids::TALGORITHMS, ids::AE_COMPENSATION),
            Response::success(edited)
        );
        assert_eq!(
            get_on(&mut firmware, 0, ids::TALGORITHMS, ids::AE_COMPENSATION),
            before
        );

        assert!(set_on(&mut firmware, 1, ids::TSYSTEM, ids::SYSTEM_FREEZE_FIRMWARE, 1).is_success());
        assert!(firmware.context(1).expect("context 1").shared().frozen);
        assert!(!firmware.context(0).expect("context 0").shared().frozen);
        assert_eq!(firmware.active_context(), 0);
    }

    #[test]
    fn out_of_range_context_fails() {
        let mut firmware = firmware();
        let bad = Response {
            status: Status::Fail,
            ret: ErrorValue::BadArgument.to_raw(),
        };
        assert_eq!(get_on(&mut firmware, 2, ids::TALGORITHMS, ids::AE_COMPENSATION), bad);
        assert_eq!(get_on(&mut firmware, 2, ids::TGENERAL, CONTEXT_NUMBER), bad);
        assert_eq!(set_on(&mut firmware, 7, ids::TSENSOR, ids::SENSOR_STREAMING, ON), bad);
        assert_eq!(set_on(&mut firmware, 2, ids::TSYSTEM, ids::SYSTEM_FREEZE_FIRMWARE, 1), bad);
    }

    #[test]
    fn freeze_only_touches_the_addressed_context() {
        let mut firmware = firmware();
        assert!(set(&mut firmware, ids::TSYSTEM, ids::SYSTEM_FREEZE_FIRMWARE, 1).is_success());
        assert_eq!(get(&mut firmware, ids::TSYSTEM, ids::SYSTEM_FREEZE_FIRMWARE).ret, 1);
        assert!(firmware.context(0).expect("context 0").shared().frozen);
        assert!(!firmware.context(1).expect("context 1").shared().frozen);
    }

    #[test]
    fn commands_need_an_initialized_firmware() {
        let mut firmware: IspFirmware<NullHardware, 2, 32> = IspFirmware::new(NullHardware::new());
        assert_eq!(
            get(&mut firmware, ids::TALGORITHMS, ids::AE_MODE).status,
            Status::NotPermitted
        );
    }
}
