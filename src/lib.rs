//! bm58-rs: read stored measurements from a Beurer BM58 blood pressure
//! monitor over USB.
//!
//! The monitor keeps its measurements in on-device memory and streams them
//! out over a fixed request/response protocol: a five-command handshake that
//! yields the device identifier, a record-count query, one fetch command per
//! stored record (in ascending order, the device has no random access), and
//! a two-command termination.
//!
//! This library provides command serialization and record decoding (in the
//! [`ident`] and [`records`] modules), the session state machine ([`Bm58`]),
//! and a USB transport (in the [`transport`] module, behind the default
//! `usb` feature). Decoded records are handed to a [`sink::MeasurementSink`].
//!
//! # Example
//!
//! ```no_run
//! use bm58_rs::{transport::DeviceConfig, Bm58};
//!
//! let mut session = Bm58::connect(DeviceConfig::default()).unwrap();
//!
//! let identifier = session.initialize().unwrap();
//! println!("Identifier: '{identifier}'");
//!
//! let count = session.record_count().unwrap();
//! for slot in 0..count {
//!     let measurement = session.get_record(slot).unwrap();
//!     println!("{measurement:?}");
//! }
//!
//! session.terminate();
//! ```

pub mod transport;

mod error;
pub use error::{Bm58Error, SequenceViolation};

pub mod ident;
pub use ident::Identifier;

pub mod records;
pub use records::{Measurement, UserSlot};

pub mod sink;

mod fmt;
pub use fmt::{LogItem, LogOutput, Loggable, Logger};

#[cfg(test)]
mod tests;

use ident::HANDSHAKE_OPCODES;
use records::{GetRecord, GetRecordCount};
use transport::{Bm58Command, Command, Response, Transport, RESPONSE_LEN};

/// Termination opcodes, each sent as its own command with no read-back.
const TERMINATION_OPCODES: [u8; 2] = [0xF7, 0xF6];

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// The transport is open but the handshake has not run yet.
    Initialized,
    /// The handshake completed; records may be queried.
    Ready,
    /// A transport error occurred. Only [`Bm58::terminate`] is permitted.
    Failed,
    /// The session was terminated and the transport closed.
    Terminated,
}

/// A driver session over an exclusively owned transport.
///
/// The protocol is a stateful stream: the handshake runs first, then the
/// record-count query, then the record fetches in ascending order, then
/// termination. The session enforces that order (see [`SequenceViolation`]).
pub struct Bm58<T> {
    transport: T,
    state: SessionState,
    cursor: Option<RecordCursor>,
}

/// Tracks the 0-based result slot to hand out next.
struct RecordCursor {
    count: u8,
    next: u8,
}

impl<T> Bm58<T> {
    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Consume the session and hand back the transport.
    pub fn release(self) -> T {
        self.transport
    }
}

#[cfg(feature = "usb")]
impl Bm58<transport::UsbTransport> {
    /// Open the USB device described by `config` and wrap it in a session.
    pub fn connect(
        config: transport::DeviceConfig,
    ) -> Result<Self, transport::UsbTransportError> {
        Ok(Self::new(transport::UsbTransport::open(config)?))
    }
}

impl<T> Bm58<T>
where
    T: Transport,
{
    /// Wrap an already-open transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: SessionState::Initialized,
            cursor: None,
        }
    }

    /// Run the handshake and return the device identifier.
    ///
    /// The five handshake opcodes go out in their fixed order, each followed
    /// by one response read; the identifier is the printable content of the
    /// concatenated responses. Reordering breaks the device's framing.
    pub fn initialize(&mut self) -> Result<Identifier, Bm58Error<T::Error>> {
        self.ensure_state(SessionState::Initialized, "initialize")?;

        let mut raw = Vec::with_capacity(HANDSHAKE_OPCODES.len() * RESPONSE_LEN);
        for opcode in HANDSHAKE_OPCODES {
            let response = self.exchange(Command::new(opcode))?;
            raw.extend_from_slice(response.bytes());
        }

        self.state = SessionState::Ready;
        Ok(Identifier::from_raw(&raw))
    }

    /// Query how many measurements the device holds.
    ///
    /// Must run exactly once per session, after [`initialize`] and before
    /// any [`get_record`]. The device protocol falls out of sync otherwise,
    /// so the order is enforced here rather than left to the caller.
    ///
    /// [`initialize`]: Self::initialize
    /// [`get_record`]: Self::get_record
    pub fn record_count(&mut self) -> Result<u8, Bm58Error<T::Error>> {
        self.ensure_state(SessionState::Ready, "record_count")?;
        if self.cursor.is_some() {
            return Err(Bm58Error::InvalidSequence(
                SequenceViolation::CountAlreadyQueried,
            ));
        }

        let count = self.run(GetRecordCount)?;
        self.cursor = Some(RecordCursor { count, next: 0 });
        Ok(count)
    }

    /// Fetch and decode the record in 0-based `slot`.
    ///
    /// The device streams records sequentially: slots must be fetched in
    /// ascending order starting at 0, and an already-advanced slot cannot be
    /// fetched again.
    pub fn get_record(&mut self, slot: u8) -> Result<Measurement, Bm58Error<T::Error>> {
        self.ensure_state(SessionState::Ready, "get_record")?;

        let (count, next) = match self.cursor.as_ref() {
            Some(cursor) => (cursor.count, cursor.next),
            None => {
                return Err(Bm58Error::InvalidSequence(
                    SequenceViolation::CountNotQueried,
                ))
            }
        };

        if slot >= count {
            return Err(Bm58Error::InvalidSequence(SequenceViolation::PastEnd {
                count,
                requested: slot,
            }));
        }
        if slot != next {
            return Err(Bm58Error::InvalidSequence(SequenceViolation::OutOfOrder {
                expected: next,
                requested: slot,
            }));
        }

        let measurement = self.run(GetRecord::new(slot))?;

        if let Some(cursor) = self.cursor.as_mut() {
            cursor.next += 1;
        }

        Ok(measurement)
    }

    /// Iterate over the remaining stored measurements in fetch order.
    ///
    /// Issues the record-count query first if it has not run yet. Transport
    /// errors are logged and end the iteration; use [`record_count`] and
    /// [`get_record`] directly when errors need to be handled.
    ///
    /// [`record_count`]: Self::record_count
    /// [`get_record`]: Self::get_record
    pub fn records(&mut self) -> RecordsIter<'_, T> {
        RecordsIter { session: self }
    }

    /// Send the termination opcodes and close the transport.
    ///
    /// Idempotent: a second call issues no further device traffic. From the
    /// [`SessionState::Failed`] state the opcodes are skipped and the handle
    /// is released best-effort.
    pub fn terminate(&mut self) {
        match self.state {
            SessionState::Terminated => return,
            SessionState::Failed => {}
            _ => {
                for opcode in TERMINATION_OPCODES {
                    if let Err(e) = self.transport.send(&Command::new(opcode)) {
                        log::warn!("termination command 0x{opcode:02X} failed: {e:?}");
                        break;
                    }
                }
            }
        }

        self.transport.close();
        self.state = SessionState::Terminated;
    }

    fn run<C>(&mut self, command: C) -> Result<C::Output, Bm58Error<T::Error>>
    where
        C: Bm58Command,
    {
        let response = self.exchange(command.into())?;
        Ok(C::parse_response(&response))
    }

    /// One command/response round trip. A transport failure is absorbing:
    /// the session moves to [`SessionState::Failed`] and accepts no further
    /// protocol calls.
    fn exchange(&mut self, command: Command) -> Result<Response, Bm58Error<T::Error>> {
        match self.transport.send_recv(&command) {
            Ok(response) => Ok(response),
            Err(e) => {
                self.state = SessionState::Failed;
                Err(Bm58Error::Transport(e))
            }
        }
    }

    fn ensure_state(
        &self,
        expected: SessionState,
        operation: &'static str,
    ) -> Result<(), Bm58Error<T::Error>> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Bm58Error::InvalidSequence(SequenceViolation::WrongState {
                operation,
                state: self.state,
            }))
        }
    }
}

/// Sequential iterator over stored measurements, in ascending slot order.
pub struct RecordsIter<'a, T> {
    session: &'a mut Bm58<T>,
}

impl<T> Iterator for RecordsIter<'_, T>
where
    T: Transport,
{
    type Item = Measurement;

    fn next(&mut self) -> Option<Self::Item> {
        if self.session.cursor.is_none() {
            match self.session.record_count() {
                Ok(count) => log::debug!("device reports {count} stored records"),
                Err(e) => {
                    log::error!("record count query failed: {e:?}");
                    return None;
                }
            }
        }

        let slot = {
            let cursor = self.session.cursor.as_ref()?;
            if cursor.next >= cursor.count {
                return None;
            }
            cursor.next
        };

        match self.session.get_record(slot) {
            Ok(measurement) => Some(measurement),
            Err(e) => {
                log::error!("failed to fetch record {slot}: {e:?}");
                None
            }
        }
    }
}
