//! Chunked flash and EEPROM transfers.
//!
//! Writes split the image into chunks and pad the last one with the empty
//! byte of the memory. Reads always fetch whole `USB_TRANSFER_SIZE` chunks.

use std::borrow::Cow;

use crate::codec;
use crate::constants::{
    ack, DEFAULT_DELAY_MS, EEPROM_WRITE_CHUNK_SIZE, EMPTY_EEPROM_BYTE, EMPTY_FLASH_BYTE,
    EXTENDED_ADDRESS_CHUNK, FLASH_WRITE_CHUNK_SIZE, MAX_ACK_SIZE, USB_TRANSFER_SIZE,
};
use crate::error::{Error, Result};
use crate::progress::Progress;
use crate::protocol::{Command, DataBlock, Exchange};
use crate::session::Session;
use crate::transport::{Endpoint, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Flash,
    Eeprom,
}

impl MemoryKind {
    /// Value of an erased memory cell.
    pub const fn fill_byte(self) -> u8 {
        match self {
            MemoryKind::Flash => EMPTY_FLASH_BYTE,
            MemoryKind::Eeprom => EMPTY_EEPROM_BYTE,
        }
    }
}

/// Split `data` into `chunk_size` chunks.
///
/// The remainder is copied into a last chunk filled up with `fill`. This
/// last chunk always exists, it is all `fill` when `data` is a multiple of
/// `chunk_size`.
pub fn split_chunks(data: &[u8], chunk_size: usize, fill: u8) -> Vec<Cow<'_, [u8]>> {
    let full = data.chunks_exact(chunk_size);
    let rest = full.remainder();

    let mut last = vec![fill; chunk_size];
    last[..rest.len()].copy_from_slice(rest);

    full.map(Cow::Borrowed)
        .chain(std::iter::once(Cow::Owned(last)))
        .collect()
}

/// Flash chunks with nothing but empty bytes need not be sent.
pub fn is_empty_chunk(chunk: &[u8]) -> bool {
    chunk.iter().all(|&b| b == EMPTY_FLASH_BYTE)
}

impl<T: Transport> Session<T> {
    pub fn chip_erase(&mut self) -> Result<()> {
        self.ensure_ready("erase chip")?;
        self.delay(DEFAULT_DELAY_MS)?;
        codec::execute(&mut self.transport, Exchange::ChipErase)?;
        self.delay(DEFAULT_DELAY_MS)?;

        log::info!("Chip erased");
        Ok(())
    }

    /// Program `image` into flash, starting at address 0.
    pub fn write_flash(
        &mut self,
        image: &[u8],
        page_size: u16,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        self.ensure_ready("write flash")?;
        self.delay(DEFAULT_DELAY_MS)?;

        let chunks = split_chunks(image, FLASH_WRITE_CHUNK_SIZE, EMPTY_FLASH_BYTE);
        let total = chunks.len();
        log::debug!("Writing {} bytes in {} flash chunks", image.len(), total);

        progress.start(total);
        for (index, chunk) in chunks.iter().enumerate() {
            let chunk_index = u16::try_from(index).map_err(|_| {
                Error::command(format!("flash image too large ({} bytes)", image.len()))
            })?;
            self.write_flash_chunk(chunk, chunk_index, page_size)?;
            progress.step(index + 1, total);
        }
        progress.finish();

        self.delay(DEFAULT_DELAY_MS)
    }

    /// Program one flash chunk.
    ///
    /// The chunk is sent on the bulk channel, followed by a command with its
    /// number and checksum. Empty chunks are skipped, except chunk 512.
    pub fn write_flash_chunk(&mut self, chunk: &[u8], index: u16, page_size: u16) -> Result<()> {
        if chunk.len() > FLASH_WRITE_CHUNK_SIZE {
            return Err(Error::command(format!(
                "flash chunk ({}) too long: {} bytes",
                index,
                chunk.len()
            )));
        }
        if u32::from(index) != EXTENDED_ADDRESS_CHUNK && is_empty_chunk(chunk) {
            log::trace!("Skipping empty flash chunk {}", index);
            self.continued_write = false;
            return Ok(());
        }

        let block = DataBlock::padded(chunk, EMPTY_FLASH_BYTE);
        let cmd = Command::WriteFlash {
            checksum: block.checksum(),
            chunk: index,
            page_size,
            continued: index != 0 && self.continued_write,
        };
        self.continued_write = true;

        self.transport.write(Endpoint::Bulk, block.as_bytes())?;
        // must directly precede the write frame
        if u32::from(index) == EXTENDED_ADDRESS_CHUNK {
            self.set_extended_address()?;
        }
        let resp = self.transport.transfer(cmd, MAX_ACK_SIZE)?;
        codec::check_ack(
            &resp,
            ack::SUCCESS,
            &format!("writing chunk ({}) to flash memory", index),
        )
    }

    /// Program `data` into EEPROM, starting at address 0.
    pub fn write_eeprom(&mut self, data: &[u8], progress: &mut dyn Progress) -> Result<()> {
        self.ensure_ready("write EEPROM")?;
        self.delay(DEFAULT_DELAY_MS)?;

        let chunks = split_chunks(data, EEPROM_WRITE_CHUNK_SIZE, EMPTY_EEPROM_BYTE);
        let total = chunks.len();
        log::debug!("Writing {} bytes in {} EEPROM chunks", data.len(), total);

        progress.start(total);
        for (index, chunk) in chunks.iter().enumerate() {
            let address = u16::try_from(index * EEPROM_WRITE_CHUNK_SIZE).map_err(|_| {
                Error::command(format!("EEPROM image too large ({} bytes)", data.len()))
            })?;
            self.write_eeprom_chunk(chunk, address)?;
            progress.step(index + 1, total);
        }
        progress.finish();

        self.delay(DEFAULT_DELAY_MS)
    }

    /// Program one EEPROM chunk at byte `address`.
    ///
    /// A full `USB_TRANSFER_SIZE` block is sent, only the first
    /// `EEPROM_WRITE_CHUNK_SIZE` bytes carry data. A short chunk is filled
    /// up with the empty EEPROM byte.
    pub fn write_eeprom_chunk(&mut self, chunk: &[u8], address: u16) -> Result<()> {
        if chunk.len() > EEPROM_WRITE_CHUNK_SIZE {
            return Err(Error::command(format!(
                "EEPROM chunk at 0x{:04x} too long: {} bytes",
                address,
                chunk.len()
            )));
        }
        let mut data = [EMPTY_EEPROM_BYTE; EEPROM_WRITE_CHUNK_SIZE];
        data[..chunk.len()].copy_from_slice(chunk);
        let block = DataBlock::new(&data);
        let cmd = Command::WriteEeprom {
            checksum: block.checksum(),
            address,
        };

        self.transport.write(Endpoint::Bulk, block.as_bytes())?;
        let resp = self.transport.transfer(cmd, MAX_ACK_SIZE)?;
        codec::check_ack(&resp, ack::SUCCESS, "writing chunk to EEPROM memory")
    }

    /// Read `size` bytes of flash, rounded up to whole chunks.
    pub fn read_flash(&mut self, size: usize, progress: &mut dyn Progress) -> Result<Vec<u8>> {
        self.ensure_ready("read flash")?;
        self.delay(DEFAULT_DELAY_MS)?;
        self.read_memory(size, MemoryKind::Flash, progress)
    }

    /// Read `size` bytes of EEPROM, rounded up to whole chunks.
    pub fn read_eeprom(&mut self, size: usize, progress: &mut dyn Progress) -> Result<Vec<u8>> {
        self.ensure_ready("read EEPROM")?;
        self.delay(DEFAULT_DELAY_MS)?;
        self.read_memory(size, MemoryKind::Eeprom, progress)
    }

    /// Read chunk after chunk into one buffer. The result is `size` rounded
    /// up to the next multiple of `USB_TRANSFER_SIZE`.
    pub fn read_memory(
        &mut self,
        size: usize,
        kind: MemoryKind,
        progress: &mut dyn Progress,
    ) -> Result<Vec<u8>> {
        let total = size.div_ceil(USB_TRANSFER_SIZE);
        let mut buffer = Vec::with_capacity(total * USB_TRANSFER_SIZE);

        progress.start(total);
        for index in 0..total {
            let chunk = self.read_memory_chunk(index as u32, kind)?;
            buffer.extend_from_slice(&chunk);
            progress.step(index + 1, total);
        }
        progress.finish();

        Ok(buffer)
    }

    /// Request one chunk and poll the bulk channel until it arrives.
    pub fn read_memory_chunk(&mut self, index: u32, kind: MemoryKind) -> Result<Vec<u8>> {
        let cmd = match kind {
            MemoryKind::Flash => Command::ReadFlash { chunk: index },
            MemoryKind::Eeprom => Command::ReadEeprom {
                chunk: u16::try_from(index)
                    .map_err(|_| Error::command(format!("EEPROM chunk {} out of range", index)))?,
            },
        };

        if index == EXTENDED_ADDRESS_CHUNK {
            self.set_extended_address()?;
        }
        self.transport.send(cmd)?;

        let policy = self.poll;
        let transport = &mut self.transport;
        let polled = policy.poll(self.sleeper.as_mut(), || {
            let resp = transport.read(Endpoint::Bulk, USB_TRANSFER_SIZE)?;
            Ok((resp.len() == USB_TRANSFER_SIZE).then_some(resp))
        })?;

        match polled {
            Some((chunk, tries)) => {
                if is_empty_chunk(&chunk) {
                    log::trace!("Read chunk ({}) after {} tries: empty chunk", index, tries);
                } else {
                    log::trace!(
                        "Read chunk ({}) after {} tries: {}",
                        index,
                        tries,
                        hex::encode(&chunk)
                    );
                }
                Ok(chunk)
            }
            None => Err(Error::command(format!("Error while reading chunk {}", index))),
        }
    }
}
