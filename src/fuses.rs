//! Fuse bytes.
use std::fmt;

use crate::codec;
use crate::constants::{ack, DEFAULT_DELAY_MS, USB_TRANSFER_SIZE};
use crate::error::{Error, Result};
use crate::protocol::Exchange;
use crate::session::Session;
use crate::transport::{Endpoint, Transport};

const MAX_FUSES: u8 = 3;

/// Low, high and extended fuse. Only the first `count` are used by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuseSet {
    pub low: u8,
    pub high: u8,
    pub extended: u8,
    count: u8,
}

impl FuseSet {
    /// Build from one to three bytes, in low, high, extended order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match *bytes {
            [low] => Ok(Self::new(low, 0xff, 0xff, 1)),
            [low, high] => Ok(Self::new(low, high, 0xff, 2)),
            [low, high, extended] => Ok(Self::new(low, high, extended, 3)),
            _ => Err(Error::command(format!(
                "expected 1 to {} fuse bytes, got {}",
                MAX_FUSES,
                bytes.len()
            ))),
        }
    }

    const fn new(low: u8, high: u8, extended: u8, count: u8) -> Self {
        FuseSet {
            low,
            high,
            extended,
            count,
        }
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn to_vec(&self) -> Vec<u8> {
        [self.low, self.high, self.extended][..self.count as usize].to_vec()
    }
}

impl fmt::Display for FuseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: Vec<String> = self.to_vec().iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "{}", bytes.join(","))
    }
}

impl<T: Transport> Session<T> {
    /// Program the fuses in one exchange.
    pub fn write_fuses(&mut self, fuses: &FuseSet) -> Result<()> {
        self.ensure_ready("write fuses")?;
        log::debug!("Set {} fuses: {}", fuses.count(), fuses);

        codec::execute(
            &mut self.transport,
            Exchange::WriteFuses {
                low: fuses.low,
                high: fuses.high,
                extended: fuses.extended,
                count: fuses.count(),
            },
        )?;
        log::info!("Fuses written: {}", fuses);
        Ok(())
    }

    /// Read `count` fuse bytes.
    ///
    /// The programmer answers with a 0xff framing byte followed by the fuses.
    /// `count` is 1 to 3.
    pub fn read_fuses(&mut self, count: u8) -> Result<Vec<u8>> {
        if !(1..=MAX_FUSES).contains(&count) {
            return Err(Error::command(format!(
                "expected 1 to {} fuse bytes, got {}",
                MAX_FUSES, count
            )));
        }
        self.ensure_ready("read fuses")?;
        self.delay(DEFAULT_DELAY_MS)?;

        codec::execute(&mut self.transport, Exchange::ReadFuses { count })?;
        let resp = self.transport.read(Endpoint::Bulk, USB_TRANSFER_SIZE)?;
        log::debug!("Read fuses returned {}", hex::encode(&resp));

        match resp.split_first() {
            Some((&ack::FUSE_FRAME, fuses)) if fuses.len() == count as usize => Ok(fuses.to_vec()),
            _ => Err(Error::command(format!(
                "Error while reading fuses (returned [{}])",
                hex::encode(&resp)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::commands;
    use crate::transport::mock::MockProgrammer;

    fn connected(mock: &mut MockProgrammer) -> Session<&mut MockProgrammer> {
        let mut session = Session::new(mock).unwrap();
        session.connect(0).unwrap();
        session.transport.clear();
        session
    }

    #[test]
    fn fuse_set_from_bytes() {
        let fuses = FuseSet::from_bytes(&[0xc0, 0xd9]).unwrap();
        assert_eq!(fuses.count(), 2);
        assert_eq!(fuses.to_vec(), [0xc0, 0xd9]);
        assert_eq!(fuses.to_string(), "c0,d9");
        assert!(FuseSet::from_bytes(&[]).is_err());
        assert!(FuseSet::from_bytes(&[0; 4]).is_err());
    }

    #[test]
    fn read_fuses_strips_framing_byte() {
        let mut mock = MockProgrammer::new();
        let mut session = connected(&mut mock);
        session.transport.script_bulk(&[0xff, 0xc0, 0xd9]);
        assert_eq!(session.read_fuses(2).unwrap(), [0xc0, 0xd9]);
        drop(session);

        // size + 1 sub-commands requested
        let exec = mock.frames_with(commands::EXECUTE);
        assert_eq!(exec[0][1], 3);
    }

    #[test]
    fn read_fuses_rejects_short_answer() {
        let mut mock = MockProgrammer::new();
        let mut session = connected(&mut mock);
        session.transport.script_bulk(&[0xff, 0xc0]);
        let err = session.read_fuses(2).unwrap_err();
        assert!(matches!(err, Error::Command(_)));
    }

    #[test]
    fn read_fuses_rejects_missing_frame() {
        let mut mock = MockProgrammer::new();
        let mut session = connected(&mut mock);
        session.transport.script_bulk(&[0x00, 0xc0, 0xd9]);
        assert!(session.read_fuses(2).is_err());
    }

    #[test]
    fn read_fuses_rejects_invalid_count() {
        let mut mock = MockProgrammer::new();
        let mut session = connected(&mut mock);
        for count in [0, 4, 255] {
            let err = session.read_fuses(count).unwrap_err();
            assert!(matches!(err, Error::Command(_)), "count {}", count);
        }
        drop(session);
        assert!(mock.frames_with(commands::DELAY).is_empty());
        assert!(mock.bulk_frames().is_empty());
    }

    #[test]
    fn read_fuses_from_simulated_device() {
        let mut mock = MockProgrammer::new();
        mock.fuses = vec![0xe1, 0x99, 0xfd];
        let mut session = connected(&mut mock);
        assert_eq!(session.read_fuses(3).unwrap(), [0xe1, 0x99, 0xfd]);
    }

    #[test]
    fn write_fuses_packs_one_block() {
        let mut mock = MockProgrammer::new();
        let mut session = connected(&mut mock);
        let fuses = FuseSet::from_bytes(&[0xc0, 0xd9]).unwrap();
        session.write_fuses(&fuses).unwrap();
        drop(session);

        let blocks = mock.bulk_frames();
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            &blocks[0][..12],
            &[0xac, 0xa0, 0x00, 0xc0, 0xac, 0xa8, 0x00, 0xd9, 0xac, 0xa4, 0x00, 0xff]
        );
        let setup = mock.frames_with(commands::SETUP);
        assert_eq!(setup, [vec![0x02, 0x04, 0x00, 0x00, 0x00, 0x09, 0x00]]);
        let exec = mock.frames_with(commands::EXECUTE);
        assert_eq!(exec[0][1], 2);
    }

    #[test]
    fn write_fuses_checksum_failure_is_retryable() {
        let mut mock = MockProgrammer::new();
        let mut session = connected(&mut mock);
        session.transport.script(commands::EXECUTE, &[0x81]);
        let fuses = FuseSet::from_bytes(&[0xc0]).unwrap();
        let err = session.write_fuses(&fuses).unwrap_err();
        assert!(err.is_retryable());
        // resending the identical exchange works
        session.write_fuses(&fuses).unwrap();
    }
}
