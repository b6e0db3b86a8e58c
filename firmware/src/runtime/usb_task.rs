use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::class::cdc_acm::Sender;
use embassy_usb::driver::{Driver, EndpointError};

use super::{CONSOLE_RX_QUEUE, CONSOLE_TX_QUEUE, ConsoleTxReceiver, USB_STORAGE};
use crate::console::{ConsoleEvent, ConsoleFrame};
use crate::usb::{self, UsbDeviceStrings};

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let usb::UsbConsole { mut device, port } =
        usb::UsbConsole::new(driver, storage, UsbDeviceStrings::default());

    embassy_futures::join::join(device.run(), run_console_interface(port)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn run_console_interface<D>(mut port: usb::CdcAcmHandle<D>) -> !
where
    D: Driver<'static>,
{
    let rx_queue = CONSOLE_RX_QUEUE.sender();
    let tx_queue = CONSOLE_TX_QUEUE.receiver();
    let mut ingress = [0u8; usb::PACKET_BUFFER_LEN];

    loop {
        port.wait_ready().await;
        // Output queued for a previous session is stale.
        CONSOLE_TX_QUEUE.clear();
        let mut pending_tx: Option<ConsoleFrame> = None;

        defmt::info!("usb: console connected");
        rx_queue.send(ConsoleEvent::Connected).await;

        let usb::CdcAcmHandle {
            sender,
            receiver,
            control,
        } = &mut port;

        loop {
            let outcome = select3(
                receiver.read_packet(&mut ingress),
                write_next(sender, &tx_queue, &mut pending_tx),
                control.control_changed(),
            )
            .await;

            match outcome {
                Either3::First(Ok(0)) | Either3::Second(Ok(())) => {}
                Either3::First(Ok(count)) => {
                    let mut frame = ConsoleFrame::new();
                    if frame.extend_from_slice(&ingress[..count]).is_err() {
                        defmt::warn!("usb: dropping console frame len={} (overflow)", count);
                        continue;
                    }
                    rx_queue.send(ConsoleEvent::Received(frame)).await;
                }
                Either3::First(Err(EndpointError::Disabled))
                | Either3::Second(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console interface disabled");
                    break;
                }
                Either3::First(Err(_)) => defmt::warn!("usb: console read error"),
                Either3::Second(Err(_)) => defmt::warn!("usb: console write error"),
                Either3::Third(()) => {
                    if !sender.dtr() {
                        defmt::warn!("usb: console host dropped DTR");
                        break;
                    }
                }
            }
        }

        rx_queue.send(ConsoleEvent::Disconnected).await;
    }
}

/// Writes the pending frame, fetching a new one from the queue first when
/// nothing is pending. The frame stays pending if the write fails.
async fn write_next<D>(
    sender: &mut Sender<'static, D>,
    tx_queue: &ConsoleTxReceiver,
    pending_tx: &mut Option<ConsoleFrame>,
) -> Result<(), EndpointError>
where
    D: Driver<'static>,
{
    let frame = match pending_tx {
        Some(frame) => frame,
        None => pending_tx.insert(tx_queue.receive().await),
    };
    sender.write_packet(frame).await?;
    *pending_tx = None;
    Ok(())
}
