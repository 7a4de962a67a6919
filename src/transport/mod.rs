//! Abstract programmer transport interface.
use crate::error::Result;
use crate::protocol::Command;

pub use self::usb::{UsbConfig, UsbTransport};

#[cfg(test)]
pub(crate) mod mock;
mod usb;

/// The two logical channels of the programmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Short command frames and their acknowledgements (endpoint 2).
    Control,
    /// Data blocks and memory chunks (endpoint 3).
    Bulk,
}

impl Endpoint {
    pub const fn number(self) -> u8 {
        match self {
            Endpoint::Control => 2,
            Endpoint::Bulk => 3,
        }
    }
}

/// Abstraction of the transport layer.
///
/// Both calls block until the transfer is done or the transport gives up;
/// timeouts are the transport's business.
pub trait Transport {
    fn write(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<()>;
    /// Read up to `max_len` bytes. The returned length is the real response length.
    fn read(&mut self, endpoint: Endpoint, max_len: usize) -> Result<Vec<u8>>;

    /// Send a command on the control channel without waiting for an answer.
    fn send(&mut self, cmd: Command) -> Result<()> {
        let req = cmd.into_raw()?;
        log::debug!("=> {}", hex::encode(&req));
        self.write(Endpoint::Control, &req)
    }

    /// Send a command and read its answer from the control channel.
    fn transfer(&mut self, cmd: Command, max_len: usize) -> Result<Vec<u8>> {
        self.send(cmd)?;
        let resp = self.read(Endpoint::Control, max_len)?;
        log::debug!("<= {}", hex::encode(&resp));
        Ok(resp)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<()> {
        (**self).write(endpoint, data)
    }

    fn read(&mut self, endpoint: Endpoint, max_len: usize) -> Result<Vec<u8>> {
        (**self).read(endpoint, max_len)
    }
}
