//! USB device topology: a single CDC ACM interface carrying the operator
//! console.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

/// User-visible strings advertised in the USB descriptors.
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceStrings {
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: Option<&'static str>,
}

impl Default for UsbDeviceStrings {
    fn default() -> Self {
        Self {
            manufacturer: "ISP Control",
            product: "ISP Control Plane",
            serial_number: None,
        }
    }
}

#[cfg(target_os = "none")]
pub use device::{CdcAcmHandle, MAX_PACKET_SIZE, PACKET_BUFFER_LEN, UsbConsole, UsbDeviceStorage};

#[cfg(target_os = "none")]
mod device {
    use embassy_usb::class::cdc_acm::{CdcAcmClass, ControlChanged, Receiver, Sender, State};
    use embassy_usb::driver::Driver;

    use super::UsbDeviceStrings;

    pub const MAX_PACKET_SIZE: u16 = 64;
    pub const PACKET_BUFFER_LEN: usize = 64;

    const CONTROL_BUFFER_LEN: usize = 64;
    const CONFIG_DESCRIPTOR_LEN: usize = 128;
    const BOS_DESCRIPTOR_LEN: usize = 64;
    const MSOS_DESCRIPTOR_LEN: usize = 0;

    /// Backing storage for the Embassy USB builder and the CDC class.
    pub struct UsbDeviceStorage {
        control_buf: [u8; CONTROL_BUFFER_LEN],
        config_descriptor: [u8; CONFIG_DESCRIPTOR_LEN],
        bos_descriptor: [u8; BOS_DESCRIPTOR_LEN],
        msos_descriptor: [u8; MSOS_DESCRIPTOR_LEN],
        console_state: State<'static>,
    }

    impl UsbDeviceStorage {
        pub fn new() -> Self {
            Self {
                control_buf: [0; CONTROL_BUFFER_LEN],
                config_descriptor: [0; CONFIG_DESCRIPTOR_LEN],
                bos_descriptor: [0; BOS_DESCRIPTOR_LEN],
                msos_descriptor: [0; MSOS_DESCRIPTOR_LEN],
                console_state: State::new(),
            }
        }
    }

    /// Split handles for the console interface.
    pub struct CdcAcmHandle<D: Driver<'static>> {
        pub sender: Sender<'static, D>,
        pub receiver: Receiver<'static, D>,
        pub control: ControlChanged<'static>,
    }

    /// The USB device together with its console port.
    pub struct UsbConsole<D: Driver<'static>> {
        pub device: embassy_usb::UsbDevice<'static, D>,
        pub port: CdcAcmHandle<D>,
    }

    impl<D> UsbConsole<D>
    where
        D: Driver<'static>,
    {
        pub fn new(
            driver: D,
            storage: &'static mut UsbDeviceStorage,
            strings: UsbDeviceStrings,
        ) -> Self {
            let mut config = embassy_usb::Config::new(0x1209, 0x0002);
            config.manufacturer = Some(strings.manufacturer);
            config.product = Some(strings.product);
            config.serial_number = strings.serial_number;
            config.max_packet_size_0 = 64;
            config.max_power = 100;

            let mut builder = embassy_usb::Builder::new(
                driver,
                config,
                &mut storage.config_descriptor,
                &mut storage.bos_descriptor,
                &mut storage.msos_descriptor,
                &mut storage.control_buf,
            );

            let class = CdcAcmClass::new(&mut builder, &mut storage.console_state, MAX_PACKET_SIZE);
            let (sender, receiver, control) = class.split_with_control();

            Self {
                device: builder.build(),
                port: CdcAcmHandle {
                    sender,
                    receiver,
                    control,
                },
            }
        }
    }

    impl<D> CdcAcmHandle<D>
    where
        D: Driver<'static>,
    {
        /// Waits until the host enables both endpoints and asserts DTR.
        pub async fn wait_ready(&mut self) {
            embassy_futures::join::join(
                self.receiver.wait_connection(),
                self.sender.wait_connection(),
            )
            .await;
            while !self.sender.dtr() {
                self.control.control_changed().await;
            }
        }
    }
}
