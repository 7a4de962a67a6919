//! Simulated programmer for exercising the protocol logic without hardware.
use std::collections::{HashMap, VecDeque};

use super::{Endpoint, Transport};
use crate::constants::{ack, commands, USB_TRANSFER_SIZE};
use crate::error::Result;

/// Answers like a programmer with a target in one of its sockets.
///
/// Every write is recorded. Control reads answer the last control frame:
/// scripted answers for an opcode are used first, then a default
/// acknowledgement. Bulk reads answer the last executed data block or the
/// last chunk read request.
pub(crate) struct MockProgrammer {
    pub writes: Vec<(Endpoint, Vec<u8>)>,
    pub control_reads: usize,
    pub bulk_reads: usize,
    scripted: HashMap<u8, VecDeque<Vec<u8>>>,
    bulk_scripted: VecDeque<Vec<u8>>,
    pub name: Vec<u8>,
    pub version: Vec<u8>,
    pub present_sockets: Vec<u8>,
    pub signature: [u8; 3],
    pub fuses: Vec<u8>,
    pub flash: Vec<u8>,
    pub eeprom: Vec<u8>,
    /// Empty polls before each chunk read is answered.
    pub busy_polls: usize,
    socket: Option<u8>,
    last_control: Vec<u8>,
    last_block: Vec<u8>,
    pending_busy: usize,
}

impl MockProgrammer {
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            control_reads: 0,
            bulk_reads: 0,
            scripted: HashMap::new(),
            bulk_scripted: VecDeque::new(),
            name: b"AVRprog2".to_vec(),
            version: vec![0x02, 0x01],
            present_sockets: vec![0],
            signature: [0x1e, 0x95, 0x02],
            fuses: vec![0xc0, 0xd9, 0xff],
            flash: Vec::new(),
            eeprom: Vec::new(),
            busy_polls: 0,
            socket: None,
            last_control: Vec::new(),
            last_block: Vec::new(),
            pending_busy: 0,
        }
    }

    /// Answer the next control read after `opcode` with `response`.
    pub fn script(&mut self, opcode: u8, response: &[u8]) {
        self.scripted
            .entry(opcode)
            .or_default()
            .push_back(response.to_vec());
    }

    /// Answer the next bulk read with `response`.
    pub fn script_bulk(&mut self, response: &[u8]) {
        self.bulk_scripted.push_back(response.to_vec());
    }

    pub fn socket(&self) -> Option<u8> {
        self.socket
    }

    pub fn control_frames(&self) -> Vec<Vec<u8>> {
        self.frames(Endpoint::Control)
    }

    pub fn bulk_frames(&self) -> Vec<Vec<u8>> {
        self.frames(Endpoint::Bulk)
    }

    fn frames(&self, endpoint: Endpoint) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|(ep, _)| *ep == endpoint)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Control frames with the given opcode, in order.
    pub fn frames_with(&self, opcode: u8) -> Vec<Vec<u8>> {
        self.control_frames()
            .into_iter()
            .filter(|f| f.first() == Some(&opcode))
            .collect()
    }

    pub fn clear(&mut self) {
        self.writes.clear();
        self.control_reads = 0;
        self.bulk_reads = 0;
    }

    fn default_ack(&self, opcode: u8) -> Vec<u8> {
        match opcode {
            commands::DELAY => vec![ack::DELAY_DONE],
            commands::INFO => match self.last_control.get(1) {
                Some(0) => self.name.clone(),
                _ => self.version.clone(),
            },
            _ => vec![ack::SUCCESS],
        }
    }

    fn memory_chunk(memory: &[u8], index: usize) -> Vec<u8> {
        let mut chunk = vec![0xff; USB_TRANSFER_SIZE];
        let start = index * USB_TRANSFER_SIZE;
        if start < memory.len() {
            let end = memory.len().min(start + USB_TRANSFER_SIZE);
            chunk[..end - start].copy_from_slice(&memory[start..end]);
        }
        chunk
    }

    fn bulk_answer(&mut self) -> Vec<u8> {
        match self.last_control.first().copied() {
            Some(commands::EXECUTE) => match self.last_block.get(..2) {
                Some([0xac, 0x53]) => {
                    if self.socket.is_some_and(|s| self.present_sockets.contains(&s)) {
                        vec![ack::DEVICE_PRESENT, 0x00]
                    } else {
                        vec![0x00, 0x00]
                    }
                }
                Some([0x30, _]) => self.signature.to_vec(),
                Some([0x58, _]) => {
                    let count = self.last_control[1].saturating_sub(1) as usize;
                    let mut resp = vec![ack::FUSE_FRAME];
                    resp.extend(self.fuses.iter().take(count));
                    resp
                }
                _ => Vec::new(),
            },
            Some(op @ (commands::READ_FLASH | commands::READ_EEPROM)) => {
                if self.pending_busy > 0 {
                    self.pending_busy -= 1;
                    return Vec::new();
                }
                let f = &self.last_control;
                if op == commands::READ_FLASH {
                    let index = f[2] as usize | (f[3] as usize) << 8 | (f[4] as usize) << 16;
                    Self::memory_chunk(&self.flash, index)
                } else {
                    let index = f[2] as usize | (f[3] as usize) << 8;
                    Self::memory_chunk(&self.eeprom, index)
                }
            }
            _ => Vec::new(),
        }
    }
}

impl Transport for MockProgrammer {
    fn write(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<()> {
        self.writes.push((endpoint, data.to_vec()));
        match endpoint {
            Endpoint::Control => {
                match data.first().copied() {
                    Some(commands::SELECT_SOCKET) => self.socket = data.get(1).copied(),
                    Some(commands::READ_FLASH | commands::READ_EEPROM) => {
                        self.pending_busy = self.busy_polls
                    }
                    _ => (),
                }
                // setup headers are not answered and don't change the context
                if data.first() != Some(&commands::SETUP) {
                    self.last_control = data.to_vec();
                }
            }
            Endpoint::Bulk => self.last_block = data.to_vec(),
        }
        Ok(())
    }

    fn read(&mut self, endpoint: Endpoint, max_len: usize) -> Result<Vec<u8>> {
        let mut resp = match endpoint {
            Endpoint::Control => {
                self.control_reads += 1;
                let opcode = self.last_control.first().copied().unwrap_or_default();
                match self.scripted.get_mut(&opcode).and_then(|q| q.pop_front()) {
                    Some(resp) => resp,
                    None => self.default_ack(opcode),
                }
            }
            Endpoint::Bulk => {
                self.bulk_reads += 1;
                match self.bulk_scripted.pop_front() {
                    Some(resp) => resp,
                    None => self.bulk_answer(),
                }
            }
        };
        resp.truncate(max_len);
        Ok(resp)
    }
}
