use super::{CONSOLE_RX_QUEUE, CONSOLE_TX_QUEUE, FIRMWARE};
use crate::console::{self, ConsoleEvent, ConsoleOutput, ConsoleSession, LineError};

/// Runs the line discipline and executes complete console lines.
#[embassy_executor::task]
pub async fn run() -> ! {
    let rx = CONSOLE_RX_QUEUE.receiver();
    let tx = CONSOLE_TX_QUEUE.sender();
    let mut session = ConsoleSession::new();
    let mut out = ConsoleOutput::new();

    loop {
        out.clear();
        match rx.receive().await {
            ConsoleEvent::Connected => session.on_connect(&mut out),
            ConsoleEvent::Disconnected => {
                session.on_disconnect();
                continue;
            }
            ConsoleEvent::Received(frame) => {
                for &byte in &frame {
                    match session.push(byte) {
                        Ok(true) => {
                            // Invalid input is already reported in `out`.
                            let _ = FIRMWARE.lock(|firmware| {
                                session.execute(&mut *firmware.borrow_mut(), &mut out)
                            });
                        }
                        Ok(false) => {}
                        Err(LineError::LineOverflow) => {
                            let _ = out.push_str("\nERR line too long\n> ");
                        }
                        Err(LineError::InvalidUtf8) => {}
                    }
                }
            }
        }

        for frame in console::frames(&out) {
            tx.send(frame).await;
        }
    }
}
