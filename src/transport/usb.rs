//! USB Transportation.
use std::time::Duration;

use rusb::{Context, DeviceHandle, UsbContext};

use super::{Endpoint, Transport};
use crate::error::{Error, Result};

const ENDPOINT_OUT: u8 = 0x00;
const ENDPOINT_IN: u8 = 0x80;

const TIMEOUT_MS: u64 = 1000;

/// How to find and talk to the programmer.
#[derive(Debug, Clone)]
pub struct UsbConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub timeout: Duration,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x2129,
            product_id: 0x0202,
            timeout: Duration::from_millis(TIMEOUT_MS),
        }
    }
}

pub struct UsbTransport {
    device_handle: DeviceHandle<Context>,
    timeout: Duration,
}

impl UsbTransport {
    pub fn open_with_config(config: &UsbConfig) -> Result<UsbTransport> {
        let context = Context::new()?;

        let mut device_handle = context
            .open_device_with_vid_pid(config.vendor_id, config.product_id)
            .ok_or_else(|| {
                Error::command(format!(
                    "No AVRprog2 USB device found ({:04x}:{:04x})",
                    config.vendor_id, config.product_id
                ))
            })?;
        log::debug!("Found USB Device {:?}", device_handle.device());

        if device_handle.kernel_driver_active(0).unwrap_or(false) {
            device_handle.detach_kernel_driver(0)?;
        }
        device_handle.set_active_configuration(1)?;
        device_handle.claim_interface(0)?;

        Ok(UsbTransport {
            device_handle,
            timeout: config.timeout,
        })
    }

    pub fn open() -> Result<UsbTransport> {
        Self::open_with_config(&UsbConfig::default())
    }
}

impl Transport for UsbTransport {
    fn write(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<()> {
        let address = ENDPOINT_OUT | endpoint.number();
        let written = match endpoint {
            Endpoint::Control => self
                .device_handle
                .write_interrupt(address, data, self.timeout)?,
            Endpoint::Bulk => self.device_handle.write_bulk(address, data, self.timeout)?,
        };
        if written != data.len() {
            return Err(Error::command(format!(
                "short write on endpoint {}: {} of {} bytes",
                endpoint.number(),
                written,
                data.len()
            )));
        }
        Ok(())
    }

    fn read(&mut self, endpoint: Endpoint, max_len: usize) -> Result<Vec<u8>> {
        let address = ENDPOINT_IN | endpoint.number();
        let mut buf = vec![0u8; max_len];
        let result = match endpoint {
            Endpoint::Control => self
                .device_handle
                .read_interrupt(address, &mut buf, self.timeout),
            Endpoint::Bulk => self.device_handle.read_bulk(address, &mut buf, self.timeout),
        };
        let nread = match result {
            Ok(n) => n,
            // nothing ready yet, callers decide whether that is fatal
            Err(rusb::Error::Timeout) => 0,
            Err(e) => return Err(e.into()),
        };
        buf.truncate(nread);
        Ok(buf)
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        let _ = self.device_handle.release_interface(0);
    }
}
