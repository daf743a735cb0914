use rusb::{Context, DeviceHandle, UsbContext};

use super::{Command, DeviceConfig, Response, Transport, RESPONSE_LEN};

// Control transfer quadruple shared by every command (HID SET_REPORT).
const REQUEST_TYPE: u8 = 0x21;
const REQUEST: u8 = 0x09;
const VALUE: u16 = 0x0200;
const INDEX: u16 = 0x0000;

/// Interface the kernel HID driver binds to.
const INTERFACE: u8 = 0;

#[derive(Debug)]
pub enum UsbTransportError {
    /// No attached device matches the configured vendor/product pair.
    DeviceNotFound,
    /// A kernel driver holds the interface and could not be detached.
    ///
    /// Only surfaced when [`DeviceConfig::abort_on_detach_failure`] is set;
    /// the default policy logs a warning and continues.
    DriverDetachFailed(rusb::Error),
    /// The device answered with fewer bytes than the protocol requires.
    ShortResponse(usize),
    /// Any other failure of the underlying USB stack.
    Usb(rusb::Error),
}

impl From<rusb::Error> for UsbTransportError {
    fn from(value: rusb::Error) -> Self {
        Self::Usb(value)
    }
}

/// A [`Transport`] over libusb via `rusb`.
///
/// Commands go out as control transfers, responses come back from the
/// interrupt-IN endpoint. Closing resets the device and releases the handle;
/// dropping an open transport does the same.
pub struct UsbTransport {
    handle: Option<DeviceHandle<Context>>,
    config: DeviceConfig,
}

impl UsbTransport {
    /// Locate the device by its vendor/product pair and prepare it for the
    /// session: detach a bound kernel driver, select the sole configuration,
    /// claim the interface.
    pub fn open(config: DeviceConfig) -> Result<Self, UsbTransportError> {
        let context = Context::new()?;

        let device = context
            .devices()?
            .iter()
            .find(|device| {
                device
                    .device_descriptor()
                    .map(|descriptor| {
                        descriptor.vendor_id() == config.vendor_id
                            && descriptor.product_id() == config.product_id
                    })
                    .unwrap_or(false)
            })
            .ok_or(UsbTransportError::DeviceNotFound)?;

        let mut handle = device.open()?;

        match handle.kernel_driver_active(INTERFACE) {
            Ok(true) => {
                if let Err(e) = handle.detach_kernel_driver(INTERFACE) {
                    if config.abort_on_detach_failure {
                        return Err(UsbTransportError::DriverDetachFailed(e));
                    }
                    log::warn!("failed to detach kernel driver from interface {INTERFACE}: {e}");
                }
            }
            Ok(false) => {}
            Err(e) => log::debug!("could not query kernel driver state: {e}"),
        }

        // The monitor exposes a single configuration.
        handle.set_active_configuration(1)?;
        handle.claim_interface(INTERFACE)?;

        log::debug!(
            "opened device {:04x}:{:04x} on bus {}",
            config.vendor_id,
            config.product_id,
            device.bus_number()
        );

        Ok(Self {
            handle: Some(handle),
            config,
        })
    }

    fn handle_mut(&mut self) -> Result<&mut DeviceHandle<Context>, UsbTransportError> {
        self.handle
            .as_mut()
            .ok_or(UsbTransportError::Usb(rusb::Error::NoDevice))
    }
}

impl Transport for UsbTransport {
    type SendError = UsbTransportError;
    type RecvError = UsbTransportError;
    type Error = UsbTransportError;

    fn send(&mut self, command: &Command) -> Result<(), UsbTransportError> {
        let timeout = self.config.timeout;
        let frame = command.to_frame();

        log::trace!("control out: {frame:02X?}");
        self.handle_mut()?
            .write_control(REQUEST_TYPE, REQUEST, VALUE, INDEX, &frame, timeout)?;

        Ok(())
    }

    fn recv(&mut self) -> Result<Response, UsbTransportError> {
        let endpoint = self.config.read_endpoint;
        let timeout = self.config.timeout;

        let mut buf = [0u8; RESPONSE_LEN];
        let n = self.handle_mut()?.read_interrupt(endpoint, &mut buf, timeout)?;
        if n != RESPONSE_LEN {
            return Err(UsbTransportError::ShortResponse(n));
        }

        log::trace!("interrupt in: {buf:02X?}");
        Ok(Response::from(buf))
    }

    fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.release_interface(INTERFACE) {
                log::debug!("failed to release interface {INTERFACE}: {e}");
            }
            if let Err(e) = handle.reset() {
                log::warn!("device reset failed: {e}");
            }
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.close();
    }
}
