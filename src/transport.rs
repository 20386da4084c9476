//! USB transport layer for the capture front end.

use std::time::Duration;

use rusb::{Context, DeviceHandle, UsbContext};

use crate::error::{Error, Result};
use crate::{BULK_EP, DEVICE_PID, DEVICE_VID};

/// Timeout for USB control transfers.
const CTRL_TIMEOUT: Duration = Duration::from_millis(500);

/// Vendor request: read an RF front-end register.
/// `value` selects the register as `(channel << 8) | address`.
pub const REQ_REG_READ: u8 = 0x41;

/// Control/bulk boundary the acquisition core drives.
///
/// Implemented by [`UsbTransport`] for real hardware; simulated adapters
/// implement it in tests and replay setups.
pub trait Transport: Send {
    /// Vendor control IN transfer.
    ///
    /// # Returns
    ///
    /// The number of bytes the device answered with.
    fn control_read(&self, request: u8, value: u16, index: u16, buf: &mut [u8]) -> Result<usize>;

    /// Wait for one bulk transfer to complete into `buf`.
    ///
    /// A wait exceeding `timeout` reports [`Error::TransferTimeout`], which
    /// the acquisition loop treats as retryable.
    fn read_transfer(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Cancel any in-flight transfers.
    fn cancel_all(&mut self);
}

/// USB device handle for the capture front end.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
}

impl UsbTransport {
    /// Open a front-end device by bus and port number.
    ///
    /// A negative selector matches any bus or port; the first device
    /// carrying the front end's vendor/product identifiers wins.
    ///
    /// # Returns
    ///
    /// - `Ok(UsbTransport)` if a device was found and opened
    /// - `Err(Error::DeviceNotFound)` if nothing matched
    pub fn open(bus: i32, port: i32) -> Result<Self> {
        let context = Context::new()?;
        let devices = context.devices()?;

        for device in devices.iter() {
            let desc = device.device_descriptor()?;

            if desc.vendor_id() != DEVICE_VID || desc.product_id() != DEVICE_PID {
                continue;
            }
            if bus >= 0 && i32::from(device.bus_number()) != bus {
                continue;
            }
            if port >= 0 && i32::from(device.port_number()) != port {
                continue;
            }
            return Self::open_device(&device);
        }

        Err(Error::DeviceNotFound)
    }

    /// List all connected front-end devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let context = Context::new()?;
        let devices = context.devices()?;
        let mut result = Vec::new();

        for device in devices.iter() {
            let desc = device.device_descriptor()?;

            if desc.vendor_id() == DEVICE_VID && desc.product_id() == DEVICE_PID {
                result.push(format!(
                    "Bus {:03} Port {:03}",
                    device.bus_number(),
                    device.port_number()
                ));
            }
        }

        Ok(result)
    }

    /// Open a device handle.
    ///
    /// 1. Open the USB device
    /// 2. Detach kernel driver (Linux only)
    /// 3. Set configuration to 1
    /// 4. Claim interface 0
    fn open_device(device: &rusb::Device<Context>) -> Result<Self> {
        let handle = device.open()?;

        #[cfg(target_os = "linux")]
        {
            if handle.kernel_driver_active(0).unwrap_or(false) {
                tracing::debug!("detaching kernel driver from interface 0");
                if let Err(e) = handle.detach_kernel_driver(0) {
                    tracing::warn!("failed to detach kernel driver: {}", e);
                }
            }
        }

        if let Err(e) = handle.set_active_configuration(1) {
            tracing::debug!("failed to set configuration (may already be set): {}", e);
        }

        handle.claim_interface(0)?;

        Ok(UsbTransport { handle })
    }
}

impl Transport for UsbTransport {
    fn control_read(&self, request: u8, value: u16, index: u16, buf: &mut [u8]) -> Result<usize> {
        // REQUEST_TYPE_VENDOR | RECIPIENT_DEVICE = 0xC0
        match self
            .handle
            .read_control(0xC0, request, value, index, buf, CTRL_TIMEOUT)
        {
            Ok(n) => Ok(n),
            Err(e) => {
                tracing::debug!(
                    "control IN transfer failed: req={}, val={}, idx={}, error={}",
                    request, value, index, e
                );
                Err(Error::Transport(e.to_string()))
            }
        }
    }

    fn read_transfer(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match self.handle.read_bulk(BULK_EP, buf, timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Err(Error::TransferTimeout),
            Err(e) => Err(Error::Usb(e)),
        }
    }

    fn cancel_all(&mut self) {
        // Nothing stays in flight between blocking bulk reads; clearing the
        // endpoint flushes whatever the device queued after the last one.
        if let Err(e) = self.handle.clear_halt(BULK_EP) {
            tracing::debug!("failed to clear bulk endpoint: {}", e);
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(0) {
            tracing::debug!("failed to release USB interface: {}", e);
        }
        tracing::debug!("front-end device closed");
    }
}
