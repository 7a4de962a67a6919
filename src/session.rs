//! Programmer session: lifecycle, programmer info and shared helpers.
//!
//! Operation flow with the programmer:
//!
//! - read programmer name and version (done by [`Session::new`])
//! - select the programming pins and enable them, check that a target is
//!   present ([`Session::connect`])
//! - read the device signature, erase, read or write memories and fuses
//! - disable the programmer ([`Session::disconnect`], or on drop)
//!
//! A chunk is the unit sent to the programmer in one bulk transfer and holds
//! one or more device pages.

use crate::codec;
use crate::constants::ack;
use crate::error::{Error, Result};
use crate::protocol::{Command, InfoKind, ProgrammerAction};
use crate::retry::{PollPolicy, Sleep, ThreadSleep};
use crate::transport::Transport;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    NotConnected,
    SocketSelected,
    Activated,
    /// A target device answered in the selected socket.
    Ready,
}

/// A programmer session bound to one transport.
///
/// Every exchange is a blocking request/response; callers must not share a
/// session between threads without serializing all calls.
pub struct Session<T: Transport> {
    pub(crate) transport: T,
    pub(crate) stage: Stage,
    pub(crate) socket: Option<u8>,
    /// Set after a programmed flash chunk, cleared by a skipped one.
    pub(crate) continued_write: bool,
    pub(crate) poll: PollPolicy,
    pub(crate) sleeper: Box<dyn Sleep>,
    name: String,
    version: Vec<u8>,
}

impl<T: Transport> Session<T> {
    /// Bind a session to `transport` and read the programmer name and version.
    pub fn new(mut transport: T) -> Result<Self> {
        let name = transport.transfer(Command::Info(InfoKind::Name), 256)?;
        let name = String::from_utf8_lossy(&name)
            .trim_end_matches('\0')
            .to_string();
        log::debug!("Programmer Name: {}", name);

        let version = transport.transfer(Command::Info(InfoKind::Version), 256)?;
        log::debug!("Programmer Version: {}", hex::encode(&version));

        Ok(Session {
            transport,
            stage: Stage::NotConnected,
            socket: None,
            continued_write: false,
            poll: PollPolicy::default(),
            sleeper: Box::new(ThreadSleep),
            name,
            version,
        })
    }

    /// Replace the chunk read polling budget and delay.
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Replace how the chunk read poll waits between attempts.
    pub fn with_sleeper(mut self, sleeper: impl Sleep + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn programmer_name(&self) -> &str {
        &self.name
    }

    pub fn programmer_version(&self) -> &[u8] {
        &self.version
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The socket of the connected device, or the last selected one.
    pub fn socket(&self) -> Option<u8> {
        self.socket
    }

    pub fn is_ready(&self) -> bool {
        self.stage == Stage::Ready
    }

    pub fn dump_info(&self) {
        log::info!("Programmer: {}", self.name);
        log::info!("Programmer version: {}", hex::encode(&self.version));
        match self.socket {
            Some(socket) => log::info!("Socket: {} ({:?})", socket, self.stage),
            None => log::info!("Socket: none ({:?})", self.stage),
        }
    }

    /// Disable the programmer and forget the connected device.
    pub fn disconnect(&mut self) -> Result<()> {
        self.programmer(ProgrammerAction::Deactivate)?;
        self.stage = Stage::NotConnected;
        log::info!("Programmer deactivated");
        Ok(())
    }

    pub(crate) fn ensure_ready(&self, what: &str) -> Result<()> {
        if self.stage != Stage::Ready {
            return Err(Error::command(format!(
                "Cannot {}: no device connected ({:?})",
                what, self.stage
            )));
        }
        Ok(())
    }

    /// Sent by the vendor software before and after some operations.
    /// Answered with 0x01.
    pub(crate) fn delay(&mut self, ms: u8) -> Result<()> {
        codec::command_with_ack(
            &mut self.transport,
            Command::Delay { ms },
            ack::DELAY_DONE,
            &format!("delaying {}ms", ms),
        )
    }

    /// Only send chunk 512 and on after this.
    pub(crate) fn set_extended_address(&mut self) -> Result<()> {
        codec::command_with_ack(
            &mut self.transport,
            Command::ExtendedAddress,
            ack::SUCCESS,
            "executing command 0b01",
        )
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Err(e) = self.programmer(ProgrammerAction::Deactivate) {
            log::warn!("Deactivating programmer failed: {}", e);
        }
    }
}
