//! Programming speed.
//!
//! Speed codes measured with the vendor software:
//!
//! | MHz | code |
//! |-----|------|
//! | 1   | 0x4b |
//! | 2   | 0x23 |
//! | 4   | 0x0f |
//! | 6   | 0x08 |
//! | 8   | 0x05 |
//! | 10  | 0x03 |
//! | 12  | 0x02 |
//! | 16  | 0x01 |
//!
//! 0xff is the slowest, 0x01 the fastest setting.

use crate::codec;
use crate::constants::{ack, RAW_SPEED_LIMIT};
use crate::error::Result;
use crate::protocol::Command;
use crate::session::Session;
use crate::transport::Transport;

/// Map a target clock frequency in Hz to a speed code.
///
/// Values below 256 are already speed codes and are used as is.
pub fn map_frequency_to_speed(value: u32) -> u8 {
    let speed = if value < RAW_SPEED_LIMIT {
        value as f64
    } else {
        (97.83 * (value as f64 / 1_000_000.0).powf(-1.52)).round()
    };
    speed.clamp(1.0, 255.0) as u8
}

impl<T: Transport> Session<T> {
    /// Set the programming speed from a raw code or a target frequency in Hz.
    pub fn set_programming_speed(&mut self, frequency: u32) -> Result<()> {
        if frequency < RAW_SPEED_LIMIT {
            log::info!("Using raw frequency value for programming speed");
        }
        let speed = map_frequency_to_speed(frequency);
        log::info!("Set programming speed to {}", speed);

        codec::command_with_ack(
            &mut self.transport,
            Command::SetSpeed { speed },
            ack::SUCCESS,
            "setting programming speed",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::commands;
    use crate::error::Error;
    use crate::transport::mock::MockProgrammer;

    #[test]
    fn raw_codes_pass_through() {
        assert_eq!(map_frequency_to_speed(0x4b), 0x4b);
        assert_eq!(map_frequency_to_speed(255), 255);
        assert_eq!(map_frequency_to_speed(1), 1);
    }

    #[test]
    fn raw_zero_is_clamped() {
        assert_eq!(map_frequency_to_speed(0), 1);
    }

    #[test]
    fn frequencies_follow_fitted_curve() {
        // the curve is a fit of the table above, not exact
        assert_eq!(map_frequency_to_speed(1_000_000), 98);
        assert_eq!(map_frequency_to_speed(8_000_000), 4);
        assert_eq!(map_frequency_to_speed(10_000_000), 0x03);
        assert_eq!(map_frequency_to_speed(12_000_000), 0x02);
        assert_eq!(map_frequency_to_speed(16_000_000), 0x01);
    }

    #[test]
    fn computed_speeds_are_clamped() {
        // very slow clocks give huge codes
        assert_eq!(map_frequency_to_speed(256), 255);
        assert_eq!(map_frequency_to_speed(20_000), 255);
        // very fast clocks round to zero
        assert_eq!(map_frequency_to_speed(100_000_000), 1);
    }

    #[test]
    fn set_speed_sends_code_and_checks_ack() {
        let mut mock = MockProgrammer::new();
        let mut session = Session::new(&mut mock).unwrap();
        session.set_programming_speed(12_000_000).unwrap();
        drop(session);
        assert_eq!(mock.frames_with(commands::SET_SPEED), [vec![0x05, 0x02]]);

        let mut mock = MockProgrammer::new();
        mock.script(commands::SET_SPEED, &[0x01]);
        let mut session = Session::new(&mut mock).unwrap();
        let err = session.set_programming_speed(0x20).unwrap_err();
        assert!(matches!(err, Error::Command(_)));
    }
}
