//! The underlying binary protocol of the AVRprog2 programmer.
//!
//! Short frames go to the control channel (endpoint 2); data blocks and
//! memory chunks go to the bulk channel (endpoint 3) and are always
//! `USB_TRANSFER_SIZE` bytes long.

use std::fmt;

use scroll::{Pwrite, LE};

use crate::constants::{commands, DATA_COMMAND_SIZE, EEPROM_WRITE_CHUNK_SIZE, SETUP_COMMAND_SIZE};
use crate::error::Result;

/// 16 bit wide sum of all bytes in `buffer`.
pub fn checksum(buffer: &[u8]) -> u16 {
    buffer
        .iter()
        .fold(0u16, |acc, &val| acc.wrapping_add(val as u16))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProgrammerAction {
    Deactivate = 0,
    Activate = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InfoKind {
    Name = 0,
    Version = 1,
}

/// AVRprog2 control channel command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Enable or disable the programming pins.
    /// Probably switches the analog switches on the board.
    Programmer(ProgrammerAction),
    /// Describes the sub-commands of the following data block.
    /// Always starts with `commands::SETUP`.
    Setup { header: [u8; SETUP_COMMAND_SIZE] },
    /// Run the sub-commands of the last data block.
    Execute { sub_commands: u8, checksum: u16 },
    /// Select the programming pins.
    SelectSocket { socket: u8 },
    /// Set the programming speed code, 0x01 is the fastest.
    SetSpeed { speed: u8 },
    /// Program the flash chunk that was just sent on the bulk channel.
    ///
    /// The meaning of `continued` is not exactly known; it is cleared for
    /// the first chunk and after skipped chunks.
    WriteFlash {
        checksum: u16,
        chunk: u16,
        page_size: u16,
        continued: bool,
    },
    /// Request a flash chunk. Only 24 bits of `chunk` are sent.
    ReadFlash { chunk: u32 },
    /// Program the EEPROM chunk that was just sent on the bulk channel.
    WriteEeprom { checksum: u16, address: u16 },
    /// Request an EEPROM chunk.
    ReadEeprom { chunk: u16 },
    /// Switch to extended addressing, needed from chunk 512 on.
    ExtendedAddress,
    /// Sent before and after erase/program/read operations.
    Delay { ms: u8 },
    /// Read programmer name or version.
    Info(InfoKind),
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Programmer(_) => commands::PROGRAMMER,
            Command::Setup { .. } => commands::SETUP,
            Command::Execute { .. } => commands::EXECUTE,
            Command::SelectSocket { .. } => commands::SELECT_SOCKET,
            Command::SetSpeed { .. } => commands::SET_SPEED,
            Command::WriteFlash { .. } => commands::WRITE_FLASH,
            Command::ReadFlash { .. } => commands::READ_FLASH,
            Command::WriteEeprom { .. } => commands::WRITE_EEPROM,
            Command::ReadEeprom { .. } => commands::READ_EEPROM,
            Command::ExtendedAddress => commands::EXTENDED_ADDRESS,
            Command::Delay { .. } => commands::DELAY,
            Command::Info(_) => commands::INFO,
        }
    }

    pub fn into_raw(self) -> Result<Vec<u8>> {
        match self {
            Command::Programmer(action) => Ok(vec![commands::PROGRAMMER, action as u8]),
            Command::Setup { header } => Ok(header.to_vec()),
            Command::Execute {
                sub_commands,
                checksum,
            } => {
                let mut buf = [commands::EXECUTE, sub_commands, 0x00, 0x00];
                buf.pwrite_with(checksum, 2, LE)?;
                Ok(buf.to_vec())
            }
            Command::SelectSocket { socket } => Ok(vec![commands::SELECT_SOCKET, socket]),
            Command::SetSpeed { speed } => Ok(vec![commands::SET_SPEED, speed]),
            Command::WriteFlash {
                checksum,
                chunk,
                page_size,
                continued,
            } => {
                // CMD, CHECKSUM, CONTINUED, 0, CHUNK, PAGE SIZE, 00 01 05
                let mut buf = [
                    commands::WRITE_FLASH,
                    0x00,
                    0x00,
                    0x01,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    0x01,
                    0x05,
                ];
                buf.pwrite_with(checksum, 1, LE)?;
                buf[3] = continued as u8;
                buf.pwrite_with(chunk, 5, LE)?;
                buf.pwrite_with(page_size, 7, LE)?;
                Ok(buf.to_vec())
            }
            Command::ReadFlash { chunk } => {
                let [b0, b1, b2, _] = chunk.to_le_bytes();
                Ok(vec![commands::READ_FLASH, 0x00, b0, b1, b2, 0x01])
            }
            Command::WriteEeprom { checksum, address } => {
                let mut buf = [
                    commands::WRITE_EEPROM,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    EEPROM_WRITE_CHUNK_SIZE as u8,
                    0x00,
                    0x09,
                ];
                buf.pwrite_with(checksum, 1, LE)?;
                buf.pwrite_with(address, 3, LE)?;
                Ok(buf.to_vec())
            }
            Command::ReadEeprom { chunk } => {
                let mut buf = [commands::READ_EEPROM, 0x00, 0x00, 0x00, 0x01];
                buf.pwrite_with(chunk, 2, LE)?;
                Ok(buf.to_vec())
            }
            Command::ExtendedAddress => Ok(vec![commands::EXTENDED_ADDRESS, 0x01]),
            Command::Delay { ms } => Ok(vec![commands::DELAY, ms]),
            Command::Info(kind) => Ok(vec![commands::INFO, kind as u8]),
        }
    }
}

/// A bulk channel data block, always `DATA_COMMAND_SIZE` bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DataBlock([u8; DATA_COMMAND_SIZE]);

impl DataBlock {
    /// `content` followed by zeros.
    pub fn new(content: &[u8]) -> Self {
        Self::padded(content, 0x00)
    }

    /// `content` followed by `fill`. Content beyond the block size is cut off.
    pub fn padded(content: &[u8], fill: u8) -> Self {
        let mut block = [fill; DATA_COMMAND_SIZE];
        let len = content.len().min(DATA_COMMAND_SIZE);
        block[..len].copy_from_slice(&content[..len]);
        DataBlock(block)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn checksum(&self) -> u16 {
        checksum(&self.0)
    }
}

impl fmt::Debug for DataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.0.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        write!(f, "DataBlock[{}]", hex::encode(&self.0[..used]))
    }
}

/// Fixed "setup + data block" exchanges, as sent by the vendor software.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    ChipErase,
    DetectDevice,
    ReadSignature,
    /// Read `count` fuse bytes.
    ReadFuses { count: u8 },
    /// Program the first `count` of low, high and extended fuse.
    WriteFuses {
        low: u8,
        high: u8,
        extended: u8,
        count: u8,
    },
}

impl Exchange {
    pub fn setup_header(&self) -> [u8; SETUP_COMMAND_SIZE] {
        let s = commands::SETUP;
        match self {
            Exchange::ChipErase => [s, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00],
            Exchange::DetectDevice => [s, 0x02, 0x00, 0x02, 0x00, 0x00, 0x00],
            Exchange::ReadSignature | Exchange::ReadFuses { .. } => {
                [s, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00]
            }
            Exchange::WriteFuses { .. } => [s, 0x04, 0x00, 0x00, 0x00, 0x09, 0x00],
        }
    }

    /// Value of the sub-command count in the execute frame.
    pub fn sub_commands(&self) -> u8 {
        match *self {
            Exchange::ChipErase => 4,
            Exchange::DetectDevice => 1,
            Exchange::ReadSignature => 3,
            // one extra for the framing byte of the response
            Exchange::ReadFuses { count } => count.wrapping_add(1),
            Exchange::WriteFuses { count, .. } => count,
        }
    }

    pub fn data_block(&self) -> DataBlock {
        match *self {
            Exchange::ChipErase => DataBlock::new(&[0xac, 0x80]),
            Exchange::DetectDevice => DataBlock::new(&[0xac, 0x53]),
            Exchange::ReadSignature => DataBlock::new(&[
                0x30, 0x00, 0x00, //
                0x30, 0x00, 0x01, //
                0x30, 0x00, 0x02,
            ]),
            Exchange::ReadFuses { .. } => DataBlock::new(&[
                0x58, 0x00, 0x00, //
                0x50, 0x00, 0x00, //
                0x58, 0x08, 0x00, //
                0x50, 0x08, 0x00,
            ]),
            Exchange::WriteFuses {
                low,
                high,
                extended,
                ..
            } => DataBlock::new(&[
                0xac, 0xa0, 0x00, low, //
                0xac, 0xa8, 0x00, high, //
                0xac, 0xa4, 0x00, extended,
            ]),
        }
    }
}
