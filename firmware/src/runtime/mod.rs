use core::cell::RefCell;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt::Display2Format;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Pull;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use isp_core::firmware::IspFirmware;
use static_cell::StaticCell;

use crate::config::{self, CONTEXTS, EVENT_QUEUE_DEPTH};
use crate::console::{ConsoleEvent, ConsoleFrame};
use crate::hw::{BusIsp, Mmio};
use crate::status;
use crate::usb;

mod console_task;
mod isp_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type BoardFirmware = IspFirmware<BusIsp<Mmio>, CONTEXTS, EVENT_QUEUE_DEPTH>;

const CONSOLE_QUEUE_DEPTH: usize = 8;

/// Firmware state shared by the ISP and console tasks.
pub(super) static FIRMWARE: Mutex<CriticalSectionRawMutex, RefCell<BoardFirmware>> =
    Mutex::new(RefCell::new(IspFirmware::new(BusIsp::new(Mmio))));

pub(super) static CONSOLE_RX_QUEUE: Channel<
    CriticalSectionRawMutex,
    ConsoleEvent,
    CONSOLE_QUEUE_DEPTH,
> = Channel::new();
pub(super) static CONSOLE_TX_QUEUE: Channel<
    CriticalSectionRawMutex,
    ConsoleFrame,
    CONSOLE_QUEUE_DEPTH,
> = Channel::new();
pub(super) type ConsoleTxReceiver =
    embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, ConsoleFrame, CONSOLE_QUEUE_DEPTH>;

pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let hal::Peripherals {
        PA0,
        EXTI0,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(hal::Config::default());

    let settings = (0..CONTEXTS)
        .map_while(config::context_settings)
        .collect::<Result<heapless::Vec<_, CONTEXTS>, _>>();
    let ready = match settings {
        Ok(settings) => FIRMWARE.lock(|firmware| {
            let mut firmware = firmware.borrow_mut();
            match firmware.init(settings) {
                Ok(()) => true,
                Err(error) => {
                    defmt::error!("isp: bring-up failed: {}", Display2Format(&error));
                    false
                }
            }
        }),
        Err(error) => {
            defmt::error!("isp: calibration rejected: {}", Display2Format(&error));
            false
        }
    };
    status::record_ready(ready);
    defmt::info!("isp: {} context(s) ready={}", CONTEXTS, ready);

    let irq_line = ExtiInput::new(PA0, EXTI0, Pull::Down);

    defmt::unwrap!(spawner.spawn(usb_task::run(USB, PA12, PA11)));
    defmt::unwrap!(spawner.spawn(console_task::run()));
    if ready {
        defmt::unwrap!(spawner.spawn(isp_task::run(irq_line)));
    }

    core::future::pending::<()>().await;
}
