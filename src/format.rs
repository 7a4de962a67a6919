//! Memory image file formats
use std::path::Path;
use std::str;

use anyhow::Result;
use object::{
    Endianness,
    elf::{EM_AVR, FileHeader32, PT_LOAD},
    read::elf::{FileHeader, ProgramHeader},
};

use crate::memory::MemoryKind;

/// Start of the EEPROM section in the AVR ELF address space.
const ELF_EEPROM_START: u32 = 0x81_0000;
/// Start of the fuse section, which ends the EEPROM window.
const ELF_FUSE_START: u32 = 0x82_0000;
/// Start of the SRAM data section. Loadable data below it belongs to flash.
const ELF_DATA_START: u32 = 0x80_0000;

const IHEX_RECORD_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    PlainHex,
    IntelHex,
    Elf,
    Binary,
}

/// Read a flash or EEPROM image, starting at address 0.
///
/// Gaps between records or segments are filled with the empty byte of `kind`.
pub fn read_image<P: AsRef<Path>>(path: P, kind: MemoryKind) -> Result<Vec<u8>> {
    let p = path.as_ref();
    let raw = std::fs::read(p)?;

    let format = guess_format(p, &raw);
    log::info!("Read {} as {:?} format", p.display(), format);
    match format {
        ImageFormat::PlainHex => read_hex(str::from_utf8(&raw)?),
        ImageFormat::IntelHex => read_ihex(str::from_utf8(&raw)?, kind.fill_byte()),
        ImageFormat::Elf => read_elf(&raw, kind),
        ImageFormat::Binary => Ok(raw),
    }
}

/// Save a memory image read back from the device.
///
/// `.hex`, `.eep` and `.ihex` files are written as Intel HEX, anything else
/// as raw binary.
pub fn write_image<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let p = path.as_ref();
    if has_ihex_extension(p) || extension(p) == "eep" {
        std::fs::write(p, to_ihex(data)?)?;
        log::info!("Wrote {} bytes to {} as Intel HEX", data.len(), p.display());
    } else {
        std::fs::write(p, data)?;
        log::info!("Wrote {} bytes to {}", data.len(), p.display());
    }
    Ok(())
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .to_lowercase()
}

fn has_ihex_extension(path: &Path) -> bool {
    ["ihex", "ihe", "h86", "hex", "a43", "a90"].contains(&&*extension(path))
}

pub fn guess_format(path: &Path, raw: &[u8]) -> ImageFormat {
    if has_ihex_extension(path) || extension(path) == "eep" {
        return ImageFormat::IntelHex;
    }

    let is_text = |extra: &[u8]| {
        raw.iter()
            .all(|&c| c.is_ascii_hexdigit() || c.is_ascii_whitespace() || extra.contains(&c))
    };
    if raw.starts_with(&[0x7f, b'E', b'L', b'F']) {
        ImageFormat::Elf
    } else if raw.first() == Some(&b':') && is_text(b":") {
        ImageFormat::IntelHex
    } else if !raw.is_empty() && is_text(b"") {
        ImageFormat::PlainHex
    } else {
        ImageFormat::Binary
    }
}

/// Bytes written as hex digits, whitespace is ignored.
pub fn read_hex(data: &str) -> Result<Vec<u8>> {
    let digits: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(hex::decode(digits)?)
}

pub fn read_ihex(data: &str, fill: u8) -> Result<Vec<u8>> {
    use ihex::Record;

    let mut base_address = 0;

    let mut sections = vec![];
    for record in ihex::Reader::new(data) {
        let record = record?;
        use Record::*;
        match record {
            Data { offset, value } => {
                let offset = base_address + offset as u32;

                sections.push((offset, value));
            }
            EndOfFile => (),
            ExtendedSegmentAddress(address) => {
                base_address = (address as u32) * 16;
            }
            StartSegmentAddress { .. } => (),
            ExtendedLinearAddress(address) => {
                base_address = (address as u32) << 16;
            }
            StartLinearAddress(_) => (),
        };
    }
    merge_sections(sections, fill)
}

/// Extract the loadable segments of an AVR ELF file that belong to `kind`.
///
/// Segments are placed by their load address. EEPROM segments live at
/// 0x810000 and are moved down to address 0.
pub fn read_elf(elf_data: &[u8], kind: MemoryKind) -> Result<Vec<u8>> {
    let file_kind = object::FileKind::parse(elf_data)?;

    match file_kind {
        object::FileKind::Elf32 => (),
        _ => anyhow::bail!("cannot read file as ELF32 format"),
    }
    let elf_header = FileHeader32::<Endianness>::parse(elf_data)?;
    let endian = elf_header.endian()?;

    let machine = elf_header.e_machine(endian);
    if machine != EM_AVR {
        log::warn!("ELF file is not for AVR (machine {})", machine);
    }

    let mut sections = vec![];
    for segment in elf_header.program_headers(endian, elf_data)? {
        // The physical address is where the data is programmed to
        let p_paddr = segment.p_paddr(endian);
        let p_vaddr = segment.p_vaddr(endian);

        let segment_data = segment
            .data(endian, elf_data)
            .map_err(|_| anyhow::format_err!("Failed to access data for an ELF segment."))?;
        if segment_data.is_empty() || segment.p_type(endian) != PT_LOAD {
            continue;
        }

        let address = match kind {
            MemoryKind::Flash if p_paddr < ELF_DATA_START => p_paddr,
            MemoryKind::Eeprom if (ELF_EEPROM_START..ELF_FUSE_START).contains(&p_paddr) => {
                p_paddr - ELF_EEPROM_START
            }
            _ => {
                log::debug!("Skipping segment at {:#08x}", p_paddr);
                continue;
            }
        };
        log::info!(
            "Found loadable segment, physical address: {:#08x}, virtual address: {:#08x}, size: {:#x}",
            p_paddr,
            p_vaddr,
            segment_data.len()
        );
        sections.push((address, segment_data.to_vec()));
    }

    if sections.is_empty() {
        log::warn!("No {:?} data in ELF file", kind);
    }
    merge_sections(sections, kind.fill_byte())
}

/// Lay out `sections` in one image starting at address 0.
fn merge_sections(mut sections: Vec<(u32, Vec<u8>)>, fill: u8) -> Result<Vec<u8>> {
    sections.sort(); // order by start address

    let mut binary = vec![];
    for (addr, sect) in sections {
        let start = addr as usize;
        if start < binary.len() {
            anyhow::bail!("overlapping data at address {:#x}", start);
        }
        binary.resize(start, fill);
        binary.extend_from_slice(&sect);
    }
    log::debug!("Image size: {} bytes", binary.len());
    Ok(binary)
}

/// Encode `data` as Intel HEX starting at address 0.
pub fn to_ihex(data: &[u8]) -> Result<String> {
    use ihex::Record;

    let mut records = vec![];
    let mut segment = 0;
    for (i, chunk) in data.chunks(IHEX_RECORD_SIZE).enumerate() {
        let address = i * IHEX_RECORD_SIZE;
        let upper = (address >> 16) as u16;
        if upper != segment {
            records.push(Record::ExtendedLinearAddress(upper));
            segment = upper;
        }
        records.push(Record::Data {
            offset: address as u16,
            value: chunk.to_vec(),
        });
    }
    records.push(Record::EndOfFile);

    Ok(ihex::create_object_file_representation(&records)?)
}
