//! Stored-measurement retrieval and decoding.

use crate::{
    log_vec,
    transport::{Bm58Command, Command, Response},
    Loggable,
};

/// The Get Record Count command.
///
/// The first response byte is the number of stored measurements (0-255).
pub struct GetRecordCount;

impl From<GetRecordCount> for Command {
    fn from(_: GetRecordCount) -> Self {
        Command::new(0xA2)
    }
}

impl Bm58Command for GetRecordCount {
    type Output = u8;

    fn parse_response(response: &Response) -> u8 {
        response.bytes()[0]
    }
}

/// The Get Record command for one 0-based result slot.
///
/// The device numbers records from 1 on the wire, so the transmitted
/// parameter is `slot + 1`.
pub struct GetRecord {
    slot: u8,
}

impl GetRecord {
    pub fn new(slot: u8) -> Self {
        Self { slot }
    }
}

impl From<GetRecord> for Command {
    fn from(value: GetRecord) -> Self {
        Command::with_param(0xA3, value.slot.wrapping_add(1))
    }
}

impl Bm58Command for GetRecord {
    type Output = Measurement;

    fn parse_response(response: &Response) -> Measurement {
        Measurement::from_response(response.bytes())
    }
}

/// One of the two logical users sharing the device memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserSlot {
    One,
    Two,
}

impl UserSlot {
    pub fn value(&self) -> u8 {
        match self {
            UserSlot::One => 1,
            UserSlot::Two => 2,
        }
    }
}

/// One decoded blood-pressure measurement.
///
/// Constructed once from a raw record and immutable thereafter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Measurement {
    /// Full calendar year. The device stores years as an offset from 2000.
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    /// Systolic pressure in mmHg. The wire value is offset by -25.
    pub systolic: u16,
    /// Diastolic pressure in mmHg. The wire value is offset by -25.
    pub diastolic: u16,
    /// Pulse in beats per minute.
    pub pulse: u8,
    /// Which of the two users the record belongs to.
    pub user_slot: UserSlot,
}

impl Measurement {
    /// Decode a raw 8-byte record.
    ///
    /// Total over all inputs: the device performs no range validation and
    /// neither does this function. Implausible calendar values pass through
    /// verbatim; whether to reject them is the consuming sink's call.
    pub fn from_response(data: &[u8; 8]) -> Self {
        // The high bit of the day byte carries the user slot. A value of
        // exactly 128 still belongs to user 1.
        let (user_slot, day) = if data[4] > 128 {
            (UserSlot::Two, data[4] - 128)
        } else {
            (UserSlot::One, data[4])
        };

        Self {
            year: 2000 + data[7] as u16,
            month: data[3],
            day,
            hour: data[5],
            minute: data[6],
            systolic: data[0] as u16 + 25,
            diastolic: data[1] as u16 + 25,
            pulse: data[2],
            user_slot,
        }
    }
}

impl Loggable for Measurement {
    fn as_log(&self) -> Vec<crate::fmt::LogItem> {
        log_vec![
            (0, "Measurement"),
            (
                1,
                "Date",
                format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
            ),
            (1, "Time", format!("{:02}:{:02}", self.hour, self.minute)),
            (1, "Systolic", format!("{} mmHg", self.systolic)),
            (1, "Diastolic", format!("{} mmHg", self.diastolic)),
            (1, "Pulse", format!("{} bpm", self.pulse)),
            (1, "User", self.user_slot.value()),
        ]
    }
}
