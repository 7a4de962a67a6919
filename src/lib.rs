//! AVRprog2 programmer protocol implementation.
//!
//! ```no_run
//! use avrprog::{MemoryKind, NoProgress, Session, Socket, UsbTransport};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut session = Session::new(UsbTransport::open()?)?;
//! session.connect(Socket::AutoDetect)?;
//! session.set_programming_speed(8_000_000)?;
//!
//! let image = avrprog::format::read_image("main.hex", MemoryKind::Flash)?;
//! session.chip_erase()?;
//! session.write_flash(&image, 128, &mut NoProgress)?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod constants;
pub mod device;
pub mod error;
pub mod format;
pub mod fuses;
pub mod memory;
pub mod progress;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod speed;
pub mod transport;

pub use self::device::{Signature, Socket};
pub use self::error::{Error, Result};
pub use self::fuses::FuseSet;
pub use self::memory::MemoryKind;
pub use self::progress::{IndicatifProgress, NoProgress, Progress};
pub use self::protocol::{Command, ProgrammerAction};
pub use self::retry::PollPolicy;
pub use self::session::{Session, Stage};
pub use self::speed::map_frequency_to_speed;
pub use self::transport::{Endpoint, Transport, UsbConfig, UsbTransport};
