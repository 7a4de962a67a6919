//! Target device detection: socket selection, programmer activation,
//! presence probing and signature read.
use std::fmt;

use crate::codec;
use crate::constants::{ack, AUTO_DETECT, USB_TRANSFER_SIZE};
use crate::error::{Error, Result};
use crate::protocol::{Command, Exchange, ProgrammerAction};
use crate::session::{Session, Stage};
use crate::transport::{Endpoint, Transport};

/// Programming pins to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Socket {
    Index(u8),
    /// Try all sockets below `AUTO_DETECT` in ascending order.
    AutoDetect,
}

impl From<u8> for Socket {
    fn from(value: u8) -> Self {
        if value == AUTO_DETECT {
            Socket::AutoDetect
        } else {
            Socket::Index(value)
        }
    }
}

/// 24 bit device signature, e.g. 0x1e9502 for an ATmega32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(pub u32);

impl Signature {
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Signature(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    pub fn to_bytes(self) -> [u8; 3] {
        let [_, b0, b1, b2] = self.0.to_be_bytes();
        [b0, b1, b2]
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06x}", self.0)
    }
}

impl<T: Transport> Session<T> {
    /// Select the programming pins, enable them and check for a target.
    ///
    /// With `Socket::AutoDetect` every socket is probed first and the first
    /// one with a device is used. If the connect fails, the session is
    /// `NotConnected` afterwards, even if it was connected before.
    pub fn connect(&mut self, socket: impl Into<Socket>) -> Result<()> {
        self.stage = Stage::NotConnected;
        let socket = match socket.into() {
            Socket::Index(socket) => socket,
            Socket::AutoDetect => {
                log::info!("Autodetect programming pins...");
                match self.scan_sockets() {
                    Some(socket) => socket,
                    None => {
                        self.stage = Stage::NotConnected;
                        self.socket = None;
                        return Err(Error::command(
                            "No device found during autodetection of programming pins.",
                        ));
                    }
                }
            }
        };

        self.select_socket(socket)?;
        self.programmer(ProgrammerAction::Activate)?;
        self.detect_device(false)?;
        self.stage = Stage::Ready;
        log::info!("Device found in socket {}", socket);
        Ok(())
    }

    fn scan_sockets(&mut self) -> Option<u8> {
        (0..AUTO_DETECT).find(|&socket| self.try_socket(socket))
    }

    /// Probe one socket, leaving the programmer deactivated.
    /// Any failure counts as "no device".
    fn try_socket(&mut self, socket: u8) -> bool {
        let probe = |session: &mut Self| -> Result<bool> {
            session.select_socket(socket)?;
            session.programmer(ProgrammerAction::Activate)?;
            session.detect_device(true)
        };
        let found = probe(self);
        if let Err(e) = self.programmer(ProgrammerAction::Deactivate) {
            log::warn!("Deactivating programmer at socket {} failed: {}", socket, e);
        }
        match found {
            Ok(found) => {
                log::debug!("Socket {}: device present: {}", socket, found);
                found
            }
            Err(e) => {
                log::warn!("Probing socket {} failed: {}", socket, e);
                false
            }
        }
    }

    /// Tell the programmer which programming pins to use.
    pub fn select_socket(&mut self, socket: u8) -> Result<()> {
        codec::command_with_ack(
            &mut self.transport,
            Command::SelectSocket { socket },
            ack::SUCCESS,
            &format!("selecting socket {}", socket),
        )?;
        self.socket = Some(socket);
        self.stage = Stage::SocketSelected;
        Ok(())
    }

    /// Enable or disable the programming pins.
    pub fn programmer(&mut self, action: ProgrammerAction) -> Result<()> {
        codec::command_with_ack(
            &mut self.transport,
            Command::Programmer(action),
            ack::SUCCESS,
            "executing command 0101",
        )?;
        self.stage = match (action, self.socket) {
            (ProgrammerAction::Activate, _) => Stage::Activated,
            (ProgrammerAction::Deactivate, Some(_)) => Stage::SocketSelected,
            (ProgrammerAction::Deactivate, None) => Stage::NotConnected,
        };
        Ok(())
    }

    /// Check if a target answers in the selected socket.
    ///
    /// A present device answers `0x53 0x00`. In probe mode a wrong answer
    /// returns `false`, otherwise it is an error. Failures of the exchange
    /// itself are always errors.
    pub fn detect_device(&mut self, probe: bool) -> Result<bool> {
        codec::execute(&mut self.transport, Exchange::DetectDevice)?;

        let resp = self.transport.read(Endpoint::Bulk, USB_TRANSFER_SIZE)?;
        log::debug!("Detect device returned {}", hex::encode(&resp));

        match resp.as_slice() {
            [ack::DEVICE_PRESENT, _] => Ok(true),
            _ if probe => Ok(false),
            [_, _] => Err(Error::command(
                "Error while executing command 0301 (detect device): no device found",
            )),
            _ => Err(Error::command(format!(
                "Error while executing command 0301 (detect device): {} byte answer",
                resp.len()
            ))),
        }
    }

    /// Read the 3 byte device signature.
    pub fn get_device_signature(&mut self) -> Result<Signature> {
        self.ensure_ready("read device signature")?;
        codec::execute(&mut self.transport, Exchange::ReadSignature)?;

        let resp = self.transport.read(Endpoint::Bulk, USB_TRANSFER_SIZE)?;
        log::debug!("Get device signature returned {}", hex::encode(&resp));

        let bytes: [u8; 3] = resp.as_slice().try_into().map_err(|_| {
            Error::command(format!(
                "Error while reading device signature ({} bytes)",
                resp.len()
            ))
        })?;
        let signature = Signature::from_bytes(bytes);
        log::info!("Device signature: {}", signature);
        Ok(signature)
    }
}
