//! Setup + data block + execute exchanges, and acknowledgement checks.

use crate::constants::{ack, MAX_ACK_SIZE, SETUP_COMMAND_SIZE};
use crate::error::{Error, Result};
use crate::protocol::{Command, DataBlock, Exchange};
use crate::transport::{Endpoint, Transport};

/// Check a single byte acknowledgement against `expected`.
pub fn check_ack(resp: &[u8], expected: u8, what: &str) -> Result<()> {
    match resp {
        [code] if *code == expected => Ok(()),
        _ => Err(Error::command(format!(
            "Error while {} (returned [{}])",
            what,
            hex::encode(resp)
        ))),
    }
}

/// Send a command and require a single byte acknowledgement equal to `expected`.
pub fn command_with_ack<T: Transport + ?Sized>(
    transport: &mut T,
    cmd: Command,
    expected: u8,
    what: &str,
) -> Result<()> {
    let resp = transport.transfer(cmd, MAX_ACK_SIZE)?;
    check_ack(&resp, expected, what)
}

/// Classify the acknowledgement of an execute frame.
pub fn classify_execute_ack(resp: &[u8]) -> Result<()> {
    match resp {
        [ack::SUCCESS] => Ok(()),
        [ack::CHECKSUM_MISMATCH] => Err(Error::Checksum),
        _ => Err(Error::command(format!(
            "Error while sending execute command (returned [{}])",
            hex::encode(resp)
        ))),
    }
}

/// Send the setup header, then `block` on the bulk channel, then the execute
/// frame, and check its acknowledgement. No retry.
pub fn execute_command<T: Transport + ?Sized>(
    transport: &mut T,
    setup_header: [u8; SETUP_COMMAND_SIZE],
    sub_commands: u8,
    block: &DataBlock,
) -> Result<()> {
    transport.send(Command::Setup {
        header: setup_header,
    })?;
    transport.write(Endpoint::Bulk, block.as_bytes())?;

    let resp = transport.transfer(
        Command::Execute {
            sub_commands,
            checksum: block.checksum(),
        },
        MAX_ACK_SIZE,
    )?;
    classify_execute_ack(&resp)
}

/// Run one of the fixed vendor exchanges.
pub fn execute<T: Transport + ?Sized>(transport: &mut T, exchange: Exchange) -> Result<()> {
    log::trace!("execute {:?}", exchange);
    execute_command(
        transport,
        exchange.setup_header(),
        exchange.sub_commands(),
        &exchange.data_block(),
    )
}
