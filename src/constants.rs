//! Protocol constants of the AVRprog2 programmer.
//!
//! Most values were observed on the wire and their exact meaning is not known,
//! so they are kept byte-exact.

use std::time::Duration;

/// Size of one transfer on the bulk channel.
pub const USB_TRANSFER_SIZE: usize = 256;
/// Size of the data block sent along with an execute command.
pub const DATA_COMMAND_SIZE: usize = 256;
/// Size of the setup header that precedes a data block.
pub const SETUP_COMMAND_SIZE: usize = 7;
/// Read size for acknowledgements, so that over-long answers are seen.
pub const MAX_ACK_SIZE: usize = 64;

pub const FLASH_WRITE_CHUNK_SIZE: usize = 256;
pub const EEPROM_WRITE_CHUNK_SIZE: usize = 64;

pub const EMPTY_FLASH_BYTE: u8 = 0xff;
pub const EMPTY_EEPROM_BYTE: u8 = 0xff;

/// Chunk index at which the programmer must switch to extended addressing.
pub const EXTENDED_ADDRESS_CHUNK: u32 = 512;

/// Socket value meaning "scan all sockets". Also the number of candidate sockets.
pub const AUTO_DETECT: u8 = 4;

/// Number of polls on the bulk channel before a chunk read is given up.
pub const MAX_READ_CYCLES: u32 = 100;
/// Sleep between two polls of a chunk read.
pub const READ_PAGE_DELAY: Duration = Duration::from_millis(1);

/// Delay value the programmer sends around erase/program/read operations.
pub const DEFAULT_DELAY_MS: u8 = 0x14;

/// Raw speed codes are below this value, frequencies in Hz are above.
pub const RAW_SPEED_LIMIT: u32 = 0x100;

pub mod ack {
    pub const SUCCESS: u8 = 0x00;
    pub const CHECKSUM_MISMATCH: u8 = 0x81;
    /// The delay command answers with 0x01 instead of `SUCCESS`.
    pub const DELAY_DONE: u8 = 0x01;
    /// First byte of the detect-device response when a target is present.
    pub const DEVICE_PRESENT: u8 = 0x53;
    /// First byte of a fuse read response.
    pub const FUSE_FRAME: u8 = 0xff;
}

pub mod commands {
    pub const PROGRAMMER: u8 = 0x01;
    pub const SETUP: u8 = 0x02;
    pub const EXECUTE: u8 = 0x03;
    pub const SELECT_SOCKET: u8 = 0x04;
    pub const SET_SPEED: u8 = 0x05;
    pub const WRITE_FLASH: u8 = 0x07;
    pub const READ_FLASH: u8 = 0x08;
    pub const WRITE_EEPROM: u8 = 0x09;
    pub const READ_EEPROM: u8 = 0x0a;
    pub const EXTENDED_ADDRESS: u8 = 0x0b;
    pub const DELAY: u8 = 0x0e;
    pub const INFO: u8 = 0x10;
}
