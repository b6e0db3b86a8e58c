use defmt::Display2Format;
use embassy_stm32::exti::ExtiInput;

use super::FIRMWARE;
use crate::status;
use crate::telemetry::TelemetryRecorder;

/// Services the ISP interrupt line and drains the event queues.
#[embassy_executor::task]
pub async fn run(mut irq_line: ExtiInput<'static>) -> ! {
    let mut telemetry = TelemetryRecorder::new();

    loop {
        irq_line.wait_for_rising_edge().await;
        status::record_irq();

        let serviced = FIRMWARE.lock(|firmware| firmware.borrow_mut().interrupt_handler());
        if let Err(error) = serviced {
            defmt::warn!("isp: interrupt ignored: {}", Display2Format(&error));
            continue;
        }

        // One budgeted pass per lock so console commands interleave.
        loop {
            let handled = FIRMWARE.lock(|firmware| {
                let mut firmware = firmware.borrow_mut();
                let handled = firmware.process().unwrap_or(0);
                let frame_id = firmware
                    .context(firmware.active_context())
                    .map_or(0, |context| context.shared().frame_id);
                status::record_drain(handled, frame_id, firmware.skipped_frames());
                handled
            });
            if handled == 0 {
                break;
            }
            embassy_futures::yield_now().await;
        }

        FIRMWARE.lock(|firmware| {
            let mut firmware = firmware.borrow_mut();
            if let Ok(context) = firmware.active_mut()
                && let Err(error) = telemetry.record(context)
            {
                defmt::warn!("isp: telemetry read failed: {}", Display2Format(&error));
            }
        });
    }
}
